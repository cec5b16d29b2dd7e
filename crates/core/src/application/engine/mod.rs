// Job Engine - per-unit slots, installation and merging
//
// The engine is single-threaded by construction: every mutation happens
// through `&mut self` on one event-loop thread, so there are no locks here.
// External producers (IPC, timers) reach it through the driver's channel.

mod finish;
mod run_queue;
mod serialize;
mod status;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{
    algebra, Job, JobFlags, JobId, JobLink, JobResult, JobSnapshot, JobState, JobType, UnitName,
};
use crate::error::{EngineError, Result};
use crate::port::{
    EmergencyActionRunner, JobEvent, JobEventBus, JobEventKind, JobTimerService, MonotonicClock,
    UnitHandle,
};

/// Engine-wide defaults a manager would configure.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Applied when a unit declares no job timeout of its own.
    pub default_job_timeout: Option<u64>,
    /// Emit human-readable status banners alongside structured logs.
    pub status_messages: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_job_timeout: None,
            status_messages: true,
        }
    }
}

/// Bookkeeping counters; `n_installed_jobs` is cumulative and never
/// decreases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub n_installed_jobs: u32,
    pub n_running_jobs: u32,
    pub n_failed_jobs: u32,
}

/// Per-unit job slots. A unit owns at most one regular job and at most one
/// nop job; the two classes never share a slot.
struct UnitEntry {
    handle: Arc<dyn UnitHandle>,
    job: Option<JobId>,
    nop_job: Option<JobId>,
}

pub struct JobEngine {
    config: EngineConfig,
    clock: Arc<dyn MonotonicClock>,
    timers: Arc<dyn JobTimerService>,
    bus: Arc<dyn JobEventBus>,
    actions: Arc<dyn EmergencyActionRunner>,

    jobs: BTreeMap<JobId, Job>,
    units: HashMap<UnitName, UnitEntry>,
    run_queue: VecDeque<JobId>,
    dbus_job_queue: VecDeque<JobId>,
    job_links: Vec<JobLink>,

    next_job_id: JobId,
    stats: JobStats,
    n_reloading: u32,
    /// Deserialized jobs that finished while a live-reload was still in
    /// progress; their removal events go out when the reload completes.
    pending_finished_jobs: Vec<Job>,
}

impl JobEngine {
    pub fn new(
        config: EngineConfig,
        clock: Arc<dyn MonotonicClock>,
        timers: Arc<dyn JobTimerService>,
        bus: Arc<dyn JobEventBus>,
        actions: Arc<dyn EmergencyActionRunner>,
    ) -> Self {
        Self {
            config,
            clock,
            timers,
            bus,
            actions,
            jobs: BTreeMap::new(),
            units: HashMap::new(),
            run_queue: VecDeque::new(),
            dbus_job_queue: VecDeque::new(),
            job_links: Vec::new(),
            next_job_id: 1,
            stats: JobStats::default(),
            n_reloading: 0,
            pending_finished_jobs: Vec::new(),
        }
    }

    /// Install a new job for `unit`, reconciling it against the current slot
    /// occupant. Returns the id of the installed job, which is the incumbent's
    /// id whenever the request merged into work already in flight.
    pub fn install(
        &mut self,
        unit: Arc<dyn UnitHandle>,
        job_type: JobType,
        flags: JobFlags,
    ) -> Result<JobId> {
        let name = unit.name();
        let unit_state = unit.active_state();
        let collapsed = algebra::collapse(job_type, unit_state);
        self.ensure_unit_entry(&name, &unit);

        if collapsed == JobType::Nop {
            return self.install_nop(name, flags);
        }

        let mut superseded_conflict = false;
        loop {
            let Some(uj_id) = self.units.get(&name).and_then(|e| e.job) else {
                // Canceling a conflicting incumbent may have dropped the
                // whole unit entry; re-establish it before taking the slot.
                self.ensure_unit_entry(&name, &unit);
                let id = self.install_new(name, collapsed, flags);
                // A job whose effect already holds completes on the spot,
                // silently. A job that just superseded a conflicting
                // incumbent is reversing in-flight work and is never
                // redundant, whatever the unit state still says.
                if !superseded_conflict && algebra::is_redundant(collapsed, unit_state) {
                    self.finish_and_invalidate(id, JobResult::Done, true, true);
                }
                return Ok(id);
            };

            let (uj_type, uj_state, uj_irreversible) = {
                let uj = self.jobs.get(&uj_id).ok_or(EngineError::NoSuchJob(uj_id))?;
                (uj.job_type, uj.state, uj.irreversible)
            };

            if algebra::is_conflicting(uj_type, collapsed) {
                if uj_irreversible {
                    self.prune_unit(&name);
                    return Err(EngineError::IrreversibleConflict {
                        unit: name,
                        incumbent: uj_type,
                    });
                }
                debug!(
                    job_id = uj_id,
                    unit = %name,
                    incumbent = %uj_type,
                    requested = %collapsed,
                    "Canceling conflicting job"
                );
                // Non-recursive: superseding a job is a user action, not a
                // dependency failure.
                self.finish_and_invalidate(uj_id, JobResult::Canceled, false, false);
                superseded_conflict = true;
                continue;
            }

            let merged = algebra::merge_and_collapse(uj_type, collapsed, unit_state)
                .ok_or(crate::domain::DomainError::UnmergeableTypes(uj_type, collapsed))?;

            if uj_state == JobState::Waiting
                || (algebra::allows_late_merge(collapsed) && algebra::is_superset(uj_type, collapsed))
            {
                self.merge_into_installed(uj_id, merged, flags);
                if uj_state == JobState::Waiting {
                    // The merged type may pass the runnability check the old
                    // one failed.
                    self.add_to_run_queue(uj_id);
                }
                debug!(
                    job_id = uj_id,
                    unit = %name,
                    job_type = %merged,
                    "Merged into installed job"
                );
            } else {
                // The incumbent is already running something narrower (or a
                // reload that must see fresh configuration); fold the intent
                // in and dispatch the broader type again.
                self.merge_into_installed(uj_id, merged, flags);
                self.set_state(uj_id, JobState::Waiting);
                self.add_to_run_queue(uj_id);
                debug!(
                    job_id = uj_id,
                    unit = %name,
                    job_type = %merged,
                    "Merged into running job; re-dispatching"
                );
            }
            return Ok(uj_id);
        }
    }

    fn install_nop(&mut self, name: UnitName, flags: JobFlags) -> Result<JobId> {
        if let Some(existing) = self.units.get(&name).and_then(|e| e.nop_job) {
            self.merge_into_installed(existing, JobType::Nop, flags);
            debug!(job_id = existing, unit = %name, "Merged into installed nop job");
            return Ok(existing);
        }
        Ok(self.install_new(name, JobType::Nop, flags))
    }

    /// Place a freshly built job into its unit's slot and schedule it.
    fn install_new(&mut self, name: UnitName, job_type: JobType, flags: JobFlags) -> JobId {
        let id = self.allocate_job_id();
        let mut job = Job::new(id, name.clone(), job_type, flags);
        job.installed = true;
        self.jobs.insert(id, job);
        if let Some(entry) = self.units.get_mut(&name) {
            if job_type == JobType::Nop {
                entry.nop_job = Some(id);
            } else {
                entry.job = Some(id);
            }
        }
        self.stats.n_installed_jobs += 1;
        self.start_timer(id);
        self.queue_dbus(id);
        self.add_to_run_queue(id);
        info!(job_id = id, unit = %name, job_type = %job_type, "Installed new job");
        id
    }

    fn merge_into_installed(&mut self, id: JobId, merged_type: JobType, flags: JobFlags) {
        if let Some(j) = self.jobs.get_mut(&id) {
            j.job_type = merged_type;
            j.overriding |= flags.overriding;
            j.irreversible |= flags.irreversible;
            j.ignore_order |= flags.ignore_order;
        }
        self.queue_dbus(id);
    }

    /// Cancel an installed job. `recursive` also fails jobs depending on it.
    pub fn cancel(&mut self, id: JobId, recursive: bool) -> Result<()> {
        if !self.jobs.contains_key(&id) {
            return Err(EngineError::NoSuchJob(id));
        }
        self.finish_and_invalidate(id, JobResult::Canceled, recursive, false);
        Ok(())
    }

    pub fn add_subscriber(&mut self, id: JobId, client: &str) -> Result<()> {
        let j = self.jobs.get_mut(&id).ok_or(EngineError::NoSuchJob(id))?;
        if !j.subscribers.iter().any(|s| s == client) {
            j.subscribers.push(client.to_string());
        }
        Ok(())
    }

    /// Record that `subject`'s success logically depends on `object`.
    /// Links are bookkeeping for the transaction builder; scheduling never
    /// reads them.
    pub fn add_job_link(
        &mut self,
        subject: JobId,
        object: JobId,
        matters: bool,
        conflicts: bool,
    ) -> Result<()> {
        for side in [subject, object] {
            if !self.jobs.contains_key(&side) {
                return Err(EngineError::NoSuchJob(side));
            }
        }
        self.job_links.push(JobLink {
            subject,
            object,
            matters,
            conflicts,
        });
        Ok(())
    }

    pub fn job_links_for(&self, id: JobId) -> Vec<JobLink> {
        self.job_links
            .iter()
            .filter(|l| l.subject == id || l.object == id)
            .copied()
            .collect()
    }

    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub fn snapshot(&self, id: JobId) -> Option<JobSnapshot> {
        self.jobs.get(&id).map(Job::snapshot)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> + '_ {
        self.jobs.values()
    }

    pub fn unit_job(&self, name: &UnitName) -> Option<JobId> {
        self.units.get(name).and_then(|e| e.job)
    }

    pub fn unit_nop_job(&self, name: &UnitName) -> Option<JobId> {
        self.units.get(name).and_then(|e| e.nop_job)
    }

    pub fn stats(&self) -> JobStats {
        self.stats
    }

    /// Earliest deadline relevant to a job: the armed job timeout or the
    /// unit's own vtable-supplied deadline, whichever comes first.
    pub fn get_timeout(&self, id: JobId) -> Option<u64> {
        let j = self.jobs.get(&id)?;
        let unit_deadline = self.unit_handle(&j.unit).and_then(|h| h.deadline());
        match (j.timer_deadline, unit_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, b) => b,
        }
    }

    /// Drain queued new/changed notifications to the bus. Deferred while a
    /// live-reload is in progress.
    pub fn flush_events(&mut self) {
        if self.n_reloading > 0 {
            return;
        }
        while let Some(id) = self.dbus_job_queue.pop_front() {
            let Some(j) = self.jobs.get_mut(&id) else {
                continue; // removed before the flush; uninstall already signaled
            };
            j.in_dbus_queue = false;
            let kind = if j.sent_dbus_new_signal {
                JobEventKind::Changed
            } else {
                j.sent_dbus_new_signal = true;
                JobEventKind::New
            };
            let event = JobEvent {
                kind,
                id,
                unit: j.unit.clone(),
                object_path: j.object_path(),
                result: None,
            };
            self.bus.publish(event);
        }
    }

    // ------------------------------------------------------------------
    // Internal bookkeeping
    // ------------------------------------------------------------------

    fn ensure_unit_entry(&mut self, name: &UnitName, handle: &Arc<dyn UnitHandle>) {
        match self.units.get_mut(name) {
            Some(entry) => entry.handle = handle.clone(),
            None => {
                self.units.insert(
                    name.clone(),
                    UnitEntry {
                        handle: handle.clone(),
                        job: None,
                        nop_job: None,
                    },
                );
            }
        }
    }

    fn allocate_job_id(&mut self) -> JobId {
        let id = self.next_job_id;
        self.next_job_id = self.next_job_id.checked_add(1).unwrap_or(1);
        id
    }

    pub(crate) fn unit_handle(&self, name: &UnitName) -> Option<Arc<dyn UnitHandle>> {
        self.units.get(name).map(|e| e.handle.clone())
    }

    /// State transitions go through here so `n_running_jobs` stays exact.
    pub(crate) fn set_state(&mut self, id: JobId, state: JobState) {
        let Some(j) = self.jobs.get_mut(&id) else {
            return;
        };
        if j.state == state {
            return;
        }
        j.state = state;
        match state {
            JobState::Running => self.stats.n_running_jobs += 1,
            JobState::Waiting => {
                self.stats.n_running_jobs = self.stats.n_running_jobs.saturating_sub(1)
            }
        }
    }

    pub(crate) fn queue_dbus(&mut self, id: JobId) {
        if let Some(j) = self.jobs.get_mut(&id) {
            if !j.in_dbus_queue {
                j.in_dbus_queue = true;
                self.dbus_job_queue.push_back(id);
            }
        }
    }

    /// Start the job's clock and arm its timeout, if any.
    fn start_timer(&mut self, id: JobId) {
        let now = self.clock.now_usec();
        if let Some(j) = self.jobs.get_mut(&id) {
            j.begin_usec = now;
        }
        self.arm_timer_from_begin(id);
    }

    /// Arm the timeout relative to the job's (possibly preserved) begin
    /// timestamp. Also the re-arming path after deserialization.
    pub(crate) fn arm_timer_from_begin(&mut self, id: JobId) {
        let Some(j) = self.jobs.get(&id) else {
            return;
        };
        let timeout = self
            .unit_handle(&j.unit)
            .and_then(|h| h.job_timeout())
            .or(self.config.default_job_timeout);
        let Some(timeout) = timeout.filter(|t| *t > 0) else {
            return;
        };
        let deadline = j.begin_usec.saturating_add(timeout);
        if let Some(j) = self.jobs.get_mut(&id) {
            j.timer_deadline = Some(deadline);
        }
        self.timers.arm(id, deadline);
    }

    /// Detach a job from its slot, queues, timer and the id index. Emits the
    /// client-remove signal unless a live-reload suppresses it.
    pub(crate) fn uninstall(&mut self, id: JobId) -> Option<Job> {
        let mut j = self.jobs.remove(&id)?;
        if j.state == JobState::Running {
            self.stats.n_running_jobs = self.stats.n_running_jobs.saturating_sub(1);
        }

        if let Some(entry) = self.units.get_mut(&j.unit) {
            if j.job_type == JobType::Nop {
                if entry.nop_job == Some(id) {
                    entry.nop_job = None;
                }
            } else if entry.job == Some(id) {
                entry.job = None;
            }
        }
        let unit = j.unit.clone();
        self.prune_unit(&unit);

        if j.in_run_queue {
            self.run_queue.retain(|&q| q != id);
            j.in_run_queue = false;
        }
        if j.in_dbus_queue {
            self.dbus_job_queue.retain(|&q| q != id);
            j.in_dbus_queue = false;
        }
        self.job_links.retain(|l| l.subject != id && l.object != id);
        if j.timer_deadline.take().is_some() {
            self.timers.disarm(id);
        }
        j.installed = false;

        if self.n_reloading > 0 {
            debug!(job_id = id, unit = %j.unit, "Suppressing job removal signal during reload");
        } else {
            self.publish_removed(&mut j);
        }
        Some(j)
    }

    /// Removal is signaled eagerly; observers must always see a `new` first,
    /// so one is synthesized for jobs that never got flushed.
    pub(crate) fn publish_removed(&self, j: &mut Job) {
        if !j.sent_dbus_new_signal {
            j.sent_dbus_new_signal = true;
            self.bus.publish(JobEvent {
                kind: JobEventKind::New,
                id: j.id,
                unit: j.unit.clone(),
                object_path: j.object_path(),
                result: None,
            });
        }
        self.bus.publish(JobEvent {
            kind: JobEventKind::Removed,
            id: j.id,
            unit: j.unit.clone(),
            object_path: j.object_path(),
            result: j.result,
        });
    }

    /// Drop a unit entry once neither slot holds a job.
    fn prune_unit(&mut self, name: &UnitName) {
        if let Some(entry) = self.units.get(name) {
            if entry.job.is_none() && entry.nop_job.is_none() {
                self.units.remove(name);
            }
        }
    }
}
