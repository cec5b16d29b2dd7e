// Live-reload serialization
//
// Installed jobs cross a manager reload as a line-oriented key=value stream,
// one blank-line-terminated block per job. Unknown keys are logged and
// skipped so streams stay readable across versions.

use std::io::{BufRead, Write};

use tracing::{debug, warn};

use crate::domain::{Job, JobFlags, JobId, JobState, JobType, UnitName};
use crate::error::{EngineError, Result};
use crate::port::UnitRegistry;

use super::{JobEngine, UnitEntry};

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

fn parse_yes_no(v: &str) -> Result<bool> {
    match v {
        "yes" | "true" | "1" => Ok(true),
        "no" | "false" | "0" => Ok(false),
        _ => Err(EngineError::Deserialize(format!("not a boolean: {v:?}"))),
    }
}

impl JobEngine {
    /// Write every installed job to the stream.
    pub fn serialize<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        for (id, j) in &self.jobs {
            writeln!(w, "job-unit={}", j.unit)?;
            writeln!(w, "job-id={}", id)?;
            writeln!(w, "job-type={}", j.job_type)?;
            writeln!(w, "job-state={}", j.state)?;
            writeln!(w, "job-override={}", yes_no(j.overriding))?;
            writeln!(w, "job-irreversible={}", yes_no(j.irreversible))?;
            writeln!(
                w,
                "job-sent-dbus-new-signal={}",
                yes_no(j.sent_dbus_new_signal)
            )?;
            writeln!(w, "job-ignore-order={}", yes_no(j.ignore_order))?;
            if j.begin_usec > 0 {
                writeln!(w, "job-begin={}", j.begin_usec)?;
            }
            for s in &j.subscribers {
                writeln!(w, "subscribed={}", s)?;
            }
            writeln!(w)?;
        }
        Ok(())
    }

    /// Reinstate jobs from a serialized stream. Per-job problems (occupied
    /// slot, unresolvable unit, malformed field) are logged and skipped;
    /// only stream-level I/O errors abort.
    pub fn deserialize<R: BufRead>(&mut self, r: R, units: &dyn UnitRegistry) -> Result<()> {
        let mut fields: Vec<(String, String)> = Vec::new();
        for line in r.lines() {
            let line = line?;
            if line.is_empty() {
                if !fields.is_empty() {
                    if let Err(e) = self.install_deserialized(&fields, units) {
                        warn!(error = %e, "Skipping unreadable serialized job");
                    }
                    fields.clear();
                }
                continue;
            }
            match line.split_once('=') {
                Some((k, v)) => fields.push((k.to_string(), v.to_string())),
                None => warn!(line = %line, "Skipping malformed serialization line"),
            }
        }
        if !fields.is_empty() {
            if let Err(e) = self.install_deserialized(&fields, units) {
                warn!(error = %e, "Skipping unreadable serialized job");
            }
        }
        Ok(())
    }

    fn install_deserialized(
        &mut self,
        fields: &[(String, String)],
        units: &dyn UnitRegistry,
    ) -> Result<JobId> {
        let mut unit: Option<UnitName> = None;
        let mut id: Option<JobId> = None;
        let mut job_type: Option<JobType> = None;
        let mut state: Option<JobState> = None;
        let mut flags = JobFlags::default();
        let mut sent_dbus_new_signal = false;
        let mut begin_usec = 0u64;
        let mut subscribers = Vec::new();

        for (k, v) in fields {
            match k.as_str() {
                "job-unit" => unit = Some(UnitName::new(v.clone())),
                "job-id" => {
                    id = Some(v.parse().map_err(|_| {
                        EngineError::Deserialize(format!("bad job-id: {v:?}"))
                    })?)
                }
                "job-type" => job_type = Some(v.parse()?),
                "job-state" => state = Some(v.parse()?),
                "job-override" => flags.overriding = parse_yes_no(v)?,
                "job-irreversible" => flags.irreversible = parse_yes_no(v)?,
                "job-sent-dbus-new-signal" => sent_dbus_new_signal = parse_yes_no(v)?,
                "job-ignore-order" => flags.ignore_order = parse_yes_no(v)?,
                "job-begin" => {
                    begin_usec = v.parse().map_err(|_| {
                        EngineError::Deserialize(format!("bad job-begin: {v:?}"))
                    })?
                }
                "subscribed" => subscribers.push(v.clone()),
                other => debug!(key = other, "Ignoring unknown serialization key"),
            }
        }

        let missing = |what: &str| EngineError::Deserialize(format!("missing {what}"));
        let unit = unit.ok_or_else(|| missing("job-unit"))?;
        let id = id.ok_or_else(|| missing("job-id"))?;
        let job_type = job_type.ok_or_else(|| missing("job-type"))?;
        let state = state.ok_or_else(|| missing("job-state"))?;

        let handle = units
            .get(&unit)
            .ok_or_else(|| EngineError::NoSuchUnit(unit.clone()))?;

        let entry = self
            .units
            .entry(unit.clone())
            .or_insert_with(|| UnitEntry {
                handle,
                job: None,
                nop_job: None,
            });
        let slot = if job_type == JobType::Nop {
            &mut entry.nop_job
        } else {
            &mut entry.job
        };
        if slot.is_some() {
            return Err(EngineError::SlotOccupied(unit));
        }
        *slot = Some(id);

        let mut job = Job::new(id, unit.clone(), job_type, flags);
        job.state = state;
        job.installed = true;
        job.reloaded = true;
        job.sent_dbus_new_signal = sent_dbus_new_signal;
        job.begin_usec = begin_usec;
        job.subscribers = subscribers;
        self.jobs.insert(id, job);

        if state == JobState::Running {
            self.stats.n_running_jobs += 1;
        }
        // Never hand out an id the stream already claims.
        if self.next_job_id <= id {
            self.next_job_id = id.checked_add(1).unwrap_or(1);
        }

        debug!(job_id = id, unit = %unit, job_type = %job_type, "Reinstated serialized job");
        Ok(id)
    }

    /// After deserialization: re-arm timers from the preserved begin
    /// timestamps, requeue waiting jobs, and queue the first notification
    /// wave for jobs whose new-signal never went out.
    pub fn coldplug(&mut self) {
        let ids: Vec<JobId> = self.jobs.keys().copied().collect();
        for id in ids {
            self.arm_timer_from_begin(id);
            let Some(j) = self.jobs.get(&id) else {
                continue;
            };
            let (state, sent) = (j.state, j.sent_dbus_new_signal);
            if state == JobState::Waiting {
                self.add_to_run_queue(id);
            }
            if !sent {
                self.queue_dbus(id);
            }
        }
    }

    /// Enter the live-reload window: notifications are deferred until
    /// `finish_reload`.
    pub fn begin_reload(&mut self) {
        self.n_reloading += 1;
    }

    /// Leave the live-reload window and deliver what it held back: removal
    /// events for deserialized jobs that finished mid-reload.
    pub fn finish_reload(&mut self) {
        self.n_reloading = self.n_reloading.saturating_sub(1);
        if self.n_reloading > 0 {
            return;
        }
        for mut j in std::mem::take(&mut self.pending_finished_jobs) {
            self.publish_removed(&mut j);
        }
    }
}
