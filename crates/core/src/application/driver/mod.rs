// Engine Driver - adapts the single-threaded engine to a tokio event loop
//
// The engine itself is synchronous and lock-free; this driver owns it on one
// task. Clients talk to it over a command channel, the engine's timer port
// feeds a deadline set serviced with tokio timers, and queued notifications
// are flushed whenever the loop goes idle.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::application::engine::{EngineConfig, JobEngine};
use crate::domain::{JobFlags, JobId, JobResult, JobSnapshot, JobType};
use crate::error::EngineError;
use crate::port::{
    EmergencyActionRunner, JobEventBus, JobTimerService, MonotonicClock, UnitHandle,
};

pub enum EngineCommand {
    Install {
        unit: Arc<dyn UnitHandle>,
        job_type: JobType,
        flags: JobFlags,
        reply: oneshot::Sender<crate::error::Result<JobId>>,
    },
    Cancel {
        id: JobId,
        recursive: bool,
    },
    /// Unit completion callback, forwarded from wherever unit state machines
    /// run.
    Finish {
        id: JobId,
        result: JobResult,
        recursive: bool,
        already: bool,
    },
    Subscribe {
        id: JobId,
        client: String,
    },
    Snapshot {
        id: JobId,
        reply: oneshot::Sender<Option<JobSnapshot>>,
    },
}

enum TimerOp {
    Arm(JobId, u64),
    Disarm(JobId),
}

/// Timer port implementation that forwards arm/disarm requests into the
/// driver loop.
struct ChannelTimerService {
    tx: mpsc::UnboundedSender<TimerOp>,
}

impl JobTimerService for ChannelTimerService {
    fn arm(&self, job: JobId, deadline_usec: u64) {
        let _ = self.tx.send(TimerOp::Arm(job, deadline_usec));
    }

    fn disarm(&self, job: JobId) {
        let _ = self.tx.send(TimerOp::Disarm(job));
    }
}

/// Flips the driver into its wind-down sequence. Stopping is graceful:
/// commands and timer requests already in flight are applied and pending
/// notifications go out before the driver task returns. Dropping the switch
/// unflipped leaves the driver running until every handle is gone.
pub struct DriverShutdown {
    tx: watch::Sender<bool>,
}

impl DriverShutdown {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Cloneable client side of the driver.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    pub async fn install(
        &self,
        unit: Arc<dyn UnitHandle>,
        job_type: JobType,
        flags: JobFlags,
    ) -> crate::error::Result<JobId> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Install {
                unit,
                job_type,
                flags,
                reply,
            })
            .map_err(|_| EngineError::ShuttingDown)?;
        rx.await.map_err(|_| EngineError::ShuttingDown)?
    }

    pub fn cancel(&self, id: JobId, recursive: bool) {
        let _ = self.tx.send(EngineCommand::Cancel { id, recursive });
    }

    pub fn finish(&self, id: JobId, result: JobResult, recursive: bool, already: bool) {
        let _ = self.tx.send(EngineCommand::Finish {
            id,
            result,
            recursive,
            already,
        });
    }

    pub fn subscribe(&self, id: JobId, client: impl Into<String>) {
        let _ = self.tx.send(EngineCommand::Subscribe {
            id,
            client: client.into(),
        });
    }

    pub async fn snapshot(&self, id: JobId) -> Option<JobSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(EngineCommand::Snapshot { id, reply }).ok()?;
        rx.await.ok().flatten()
    }
}

pub struct EngineDriver {
    engine: JobEngine,
    rx: mpsc::UnboundedReceiver<EngineCommand>,
    timer_rx: mpsc::UnboundedReceiver<TimerOp>,
    shutdown_rx: watch::Receiver<bool>,
    clock: Arc<dyn MonotonicClock>,
    deadlines: BTreeSet<(u64, JobId)>,
    armed: HashMap<JobId, u64>,
}

impl EngineDriver {
    /// Wire up an engine behind a command channel. The returned driver must
    /// be `run` on a task for the handle to make progress.
    pub fn new(
        config: EngineConfig,
        clock: Arc<dyn MonotonicClock>,
        bus: Arc<dyn JobEventBus>,
        actions: Arc<dyn EmergencyActionRunner>,
    ) -> (EngineHandle, DriverShutdown, EngineDriver) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let timers = Arc::new(ChannelTimerService { tx: timer_tx });
        let engine = JobEngine::new(config, clock.clone(), timers, bus, actions);
        (
            EngineHandle { tx: cmd_tx },
            DriverShutdown { tx: shutdown_tx },
            EngineDriver {
                engine,
                rx: cmd_rx,
                timer_rx,
                shutdown_rx,
                clock,
                deadlines: BTreeSet::new(),
                armed: HashMap::new(),
            },
        )
    }

    /// Run until shut down or until every handle is dropped, then wind down.
    pub async fn run(mut self) {
        info!("Engine driver started");
        let mut shutdown_armed = true;
        loop {
            self.drain_timer_ops();
            let sleep_for = self
                .deadlines
                .iter()
                .next()
                .map(|&(deadline, _)| {
                    Duration::from_micros(deadline.saturating_sub(self.clock.now_usec()))
                });

            tokio::select! {
                changed = self.shutdown_rx.changed(), if shutdown_armed => {
                    match changed {
                        Ok(()) if *self.shutdown_rx.borrow() => {
                            info!("Engine driver shutting down");
                            break;
                        }
                        Ok(()) => {}
                        // The switch was dropped unflipped; keep running
                        // until the last handle goes away.
                        Err(_) => shutdown_armed = false,
                    }
                }
                maybe = self.rx.recv() => {
                    match maybe {
                        Some(cmd) => self.handle(cmd),
                        None => {
                            debug!("All engine handles dropped");
                            break;
                        }
                    }
                }
                _ = sleep_or_pend(sleep_for) => {
                    self.fire_due_timers();
                }
            }

            self.engine.run_queue_tick();
            self.drain_timer_ops();
            // Loop is about to go idle; let subscribers catch up.
            self.engine.flush_events();
        }
        self.wind_down();
        info!("Engine driver stopped");
    }

    /// Apply what was already in flight when the stop came: buffered
    /// commands, pending timer requests and one last dispatch round, then
    /// push out the remaining notifications so subscribers are not left
    /// with half a story.
    fn wind_down(&mut self) {
        self.rx.close();
        while let Ok(cmd) = self.rx.try_recv() {
            self.handle(cmd);
        }
        self.drain_timer_ops();
        self.fire_due_timers();
        self.engine.run_queue_tick();
        self.drain_timer_ops();
        self.engine.flush_events();
    }

    fn handle(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Install {
                unit,
                job_type,
                flags,
                reply,
            } => {
                let _ = reply.send(self.engine.install(unit, job_type, flags));
            }
            EngineCommand::Cancel { id, recursive } => {
                if let Err(e) = self.engine.cancel(id, recursive) {
                    debug!(job_id = id, error = %e, "Cancel request ignored");
                }
            }
            EngineCommand::Finish {
                id,
                result,
                recursive,
                already,
            } => self.engine.finish(id, result, recursive, already),
            EngineCommand::Subscribe { id, client } => {
                if let Err(e) = self.engine.add_subscriber(id, &client) {
                    debug!(job_id = id, error = %e, "Subscribe request ignored");
                }
            }
            EngineCommand::Snapshot { id, reply } => {
                let _ = reply.send(self.engine.snapshot(id));
            }
        }
    }

    fn drain_timer_ops(&mut self) {
        while let Ok(op) = self.timer_rx.try_recv() {
            match op {
                TimerOp::Arm(id, deadline) => {
                    if let Some(old) = self.armed.insert(id, deadline) {
                        self.deadlines.remove(&(old, id));
                    }
                    self.deadlines.insert((deadline, id));
                }
                TimerOp::Disarm(id) => {
                    if let Some(old) = self.armed.remove(&id) {
                        self.deadlines.remove(&(old, id));
                    }
                }
            }
        }
    }

    fn fire_due_timers(&mut self) {
        let now = self.clock.now_usec();
        loop {
            let Some(&(deadline, id)) = self.deadlines.iter().next() else {
                break;
            };
            if deadline > now {
                break;
            }
            self.deadlines.remove(&(deadline, id));
            self.armed.remove(&id);
            self.engine.on_job_timeout(id);
        }
    }
}

async fn sleep_or_pend(duration: Option<Duration>) {
    match duration {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}
