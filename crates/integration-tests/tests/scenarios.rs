//! End-to-end engine scenarios
//!
//! Each test drives a full client-visible flow against a synchronous engine
//! with mocked units, checking the events subscribers would observe.

use std::sync::Arc;

use dirigent_core::application::{EngineConfig, JobEngine};
use dirigent_core::domain::{
    ActiveState, EdgeKind, JobFlags, JobResult, JobState, JobType, UnitName,
};
use dirigent_core::port::actions::mocks::RecordingActionRunner;
use dirigent_core::port::bus::mocks::RecordingBus;
use dirigent_core::port::clock::mocks::MockClock;
use dirigent_core::port::timer::mocks::RecordingTimerService;
use dirigent_core::port::unit::mocks::MockUnit;
use dirigent_core::port::{JobEventKind, UnitHandle};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dirigent=debug")),
        )
        .with_test_writer()
        .try_init();
}

struct Harness {
    engine: JobEngine,
    bus: Arc<RecordingBus>,
    timers: Arc<RecordingTimerService>,
    clock: Arc<MockClock>,
}

fn harness() -> Harness {
    init_tracing();
    let bus = Arc::new(RecordingBus::new());
    let timers = Arc::new(RecordingTimerService::new());
    let clock = Arc::new(MockClock::new(1_000_000));
    let engine = JobEngine::new(
        EngineConfig::default(),
        clock.clone(),
        timers.clone(),
        bus.clone(),
        Arc::new(RecordingActionRunner::new()),
    );
    Harness {
        engine,
        bus,
        timers,
        clock,
    }
}

/// Slot and counter invariants that must hold in every reachable state.
fn assert_invariants(engine: &JobEngine) {
    let mut running = 0u32;
    for j in engine.jobs() {
        assert!(j.installed, "indexed job {} must be installed", j.id);
        if j.state == JobState::Running {
            running += 1;
        }
        if j.job_type == JobType::Nop {
            assert_eq!(engine.unit_nop_job(&j.unit), Some(j.id));
        } else {
            assert_eq!(engine.unit_job(&j.unit), Some(j.id));
        }
    }
    assert_eq!(engine.stats().n_running_jobs, running);
}

#[test]
fn scenario_simple_start() {
    let mut h = harness();
    let unit = Arc::new(MockUnit::new("u.service"));

    let id = h
        .engine
        .install(unit.clone(), JobType::Start, JobFlags::default())
        .unwrap();
    assert_eq!(h.engine.job(id).unwrap().state, JobState::Waiting);
    h.engine.flush_events();

    h.engine.run_queue_tick();
    assert_eq!(h.engine.job(id).unwrap().state, JobState::Running);
    assert_eq!(unit.start_calls(), 1);
    assert_invariants(&h.engine);
    h.engine.flush_events();

    // The unit reports it went active.
    unit.set_active_state(ActiveState::Active);
    h.engine.finish(id, JobResult::Done, true, false);

    assert!(h.engine.job(id).is_none());
    assert_eq!(
        h.bus.kinds_for(id),
        vec![
            JobEventKind::New,
            JobEventKind::Changed,
            JobEventKind::Removed
        ]
    );
    assert_eq!(h.engine.stats().n_failed_jobs, 0);
    assert_invariants(&h.engine);
}

#[test]
fn scenario_ordering_blocks_dispatch() {
    let mut h = harness();
    let a = Arc::new(MockUnit::new("a.service").with_edge(EdgeKind::Before, &["b.service"]));
    let b = Arc::new(MockUnit::new("b.service").with_edge(EdgeKind::After, &["a.service"]));

    let ja = h
        .engine
        .install(a.clone(), JobType::Start, JobFlags::default())
        .unwrap();
    let jb = h
        .engine
        .install(b.clone(), JobType::Start, JobFlags::default())
        .unwrap();

    h.engine.run_queue_tick();
    assert_eq!(h.engine.job(ja).unwrap().state, JobState::Running);
    assert_eq!(h.engine.job(jb).unwrap().state, JobState::Waiting);
    assert_eq!(b.start_calls(), 0);
    assert_invariants(&h.engine);

    h.engine.finish(ja, JobResult::Done, true, false);
    h.engine.run_queue_tick();
    assert_eq!(h.engine.job(jb).unwrap().state, JobState::Running);
    assert_eq!(b.start_calls(), 1);

    h.engine.finish(jb, JobResult::Done, true, false);
    assert!(h.engine.job(jb).is_none());
    assert_eq!(h.engine.stats().n_failed_jobs, 0);
    assert_invariants(&h.engine);
}

#[test]
fn scenario_conflict_cancels_incumbent() {
    let mut h = harness();
    // C is active with a running stop job; D requires C and has a start job
    // waiting in the wings.
    let c = Arc::new(
        MockUnit::new("c.service")
            .with_active_state(ActiveState::Active)
            .with_edge(EdgeKind::RequiredBy, &["d.service"]),
    );
    let d = Arc::new(MockUnit::new("d.service"));

    let stop = h
        .engine
        .install(c.clone(), JobType::Stop, JobFlags::default())
        .unwrap();
    h.engine.run_queue_tick();
    assert_eq!(h.engine.job(stop).unwrap().state, JobState::Running);

    let jd = h
        .engine
        .install(d, JobType::Start, JobFlags::default())
        .unwrap();

    let start = h
        .engine
        .install(c, JobType::Start, JobFlags::default())
        .unwrap();

    assert_ne!(start, stop, "conflict allocates a fresh job");
    assert!(h.engine.job(stop).is_none());
    assert_eq!(h.engine.job(start).unwrap().job_type, JobType::Start);

    // Cancellation is non-recursive: D's start job must not be failed as a
    // dependency of the superseded stop.
    assert!(h.engine.job(jd).is_some());

    let removed = h
        .bus
        .events()
        .into_iter()
        .find(|e| e.id == stop && e.kind == JobEventKind::Removed)
        .unwrap();
    assert_eq!(removed.result, Some(JobResult::Canceled));
    assert_invariants(&h.engine);
}

#[test]
fn scenario_late_merge_upgrades_running_job() {
    let mut h = harness();
    // Reinstate a verify-active job that was already running when the
    // manager reloaded, then ask for a start on the same unit.
    let d = Arc::new(MockUnit::new("d.service").with_active_state(ActiveState::Activating));
    let registry: std::collections::HashMap<UnitName, Arc<dyn UnitHandle>> =
        [(d.name(), d.clone() as Arc<dyn UnitHandle>)].into();

    let stream = "job-unit=d.service\n\
                  job-id=10\n\
                  job-type=verify-active\n\
                  job-state=running\n\
                  job-sent-dbus-new-signal=yes\n\
                  \n";
    h.engine
        .deserialize(std::io::Cursor::new(stream), &registry)
        .unwrap();
    assert_eq!(h.engine.job(10).unwrap().state, JobState::Running);

    let merged = h
        .engine
        .install(d, JobType::Start, JobFlags::default())
        .unwrap();

    // Same job id; the broader type wins and goes around again.
    assert_eq!(merged, 10);
    let j = h.engine.job(10).unwrap();
    assert_eq!(j.job_type, JobType::Start);
    assert_eq!(j.state, JobState::Waiting);
    assert!(j.in_run_queue);
    assert_invariants(&h.engine);
}

#[test]
fn scenario_restart_patching() {
    let mut h = harness();
    let e = Arc::new(MockUnit::new("e.service").with_active_state(ActiveState::Active));

    let id = h
        .engine
        .install(e.clone(), JobType::Restart, JobFlags::default())
        .unwrap();

    h.engine.run_queue_tick();
    assert_eq!(e.stop_calls(), 1);
    assert_eq!(e.start_calls(), 0);

    e.set_active_state(ActiveState::Inactive);
    h.engine.finish(id, JobResult::Done, true, false);

    // Same id, patched to start, queued exactly once.
    let j = h.engine.job(id).unwrap();
    assert_eq!(j.job_type, JobType::Start);
    assert_eq!(j.state, JobState::Waiting);
    assert_invariants(&h.engine);

    h.engine.run_queue_tick();
    assert_eq!(e.start_calls(), 1);
    assert_eq!(h.engine.job(id).unwrap().state, JobState::Running);

    e.set_active_state(ActiveState::Active);
    h.engine.finish(id, JobResult::Done, true, false);
    assert!(h.engine.job(id).is_none());
    assert_eq!(h.engine.stats().n_failed_jobs, 0);
}

#[test]
fn scenario_timeout_with_dependency_propagation() {
    let mut h = harness();
    let f = Arc::new(
        MockUnit::new("f.service")
            .with_job_timeout(1_000_000) // 1s
            .with_edge(EdgeKind::RequiredBy, &["g.service"])
            .with_edge(EdgeKind::Before, &["g.service"]),
    );
    let g = Arc::new(MockUnit::new("g.service").with_edge(EdgeKind::After, &["f.service"]));

    let jf = h
        .engine
        .install(f, JobType::Start, JobFlags::default())
        .unwrap();
    let jg = h
        .engine
        .install(g, JobType::Start, JobFlags::default())
        .unwrap();
    h.engine.run_queue_tick();
    assert_eq!(h.engine.job(jf).unwrap().state, JobState::Running);
    assert_eq!(h.engine.job(jg).unwrap().state, JobState::Waiting);
    assert_eq!(h.timers.deadline(jf), Some(2_000_000));

    // The event loop fires the deadline.
    h.clock.advance(1_000_000);
    h.engine.on_job_timeout(jf);

    assert!(h.engine.job(jf).is_none());
    assert!(h.engine.job(jg).is_none());

    let result_of = |id| {
        h.bus
            .events()
            .into_iter()
            .find(|e| e.id == id && e.kind == JobEventKind::Removed)
            .and_then(|e| e.result)
    };
    assert_eq!(result_of(jf), Some(JobResult::Timeout));
    assert_eq!(result_of(jg), Some(JobResult::Dependency));

    // F counts as failed; G's dependency result does not.
    assert_eq!(h.engine.stats().n_failed_jobs, 1);
    assert_invariants(&h.engine);
}

#[test]
fn scenario_redundant_start_is_silent_done() {
    let mut h = harness();
    let unit = Arc::new(MockUnit::new("u.service").with_active_state(ActiveState::Active));

    let id = h
        .engine
        .install(unit.clone(), JobType::Start, JobFlags::default())
        .unwrap();

    assert!(h.engine.job(id).is_none());
    assert_eq!(unit.start_calls(), 0, "no primitive runs for a redundant job");
    assert_eq!(
        h.bus.kinds_for(id),
        vec![JobEventKind::New, JobEventKind::Removed]
    );
    assert_invariants(&h.engine);
}

#[test]
fn scenario_irreversible_start_survives_stop_request() {
    let mut h = harness();
    let unit = Arc::new(MockUnit::new("u.service"));

    let start = h
        .engine
        .install(
            unit.clone(),
            JobType::Start,
            JobFlags {
                irreversible: true,
                ..Default::default()
            },
        )
        .unwrap();

    assert!(h
        .engine
        .install(unit, JobType::Stop, JobFlags::default())
        .is_err());
    assert_eq!(h.engine.job(start).unwrap().job_type, JobType::Start);
    assert_invariants(&h.engine);
}

#[test]
fn scenario_live_reload_round_trip() {
    let mut h = harness();
    let a = Arc::new(
        MockUnit::new("a.service")
            .with_job_timeout(5_000_000)
            .with_edge(EdgeKind::Before, &["b.service"]),
    );
    let b = Arc::new(MockUnit::new("b.service").with_edge(EdgeKind::After, &["a.service"]));

    let ja = h
        .engine
        .install(a.clone(), JobType::Start, JobFlags::default())
        .unwrap();
    let jb = h
        .engine
        .install(b.clone(), JobType::Start, JobFlags::default())
        .unwrap();
    h.engine.add_subscriber(ja, ":1.100").unwrap();
    h.engine.run_queue_tick();
    h.engine.flush_events();

    // Old manager instance serializes on its way out.
    let mut stream = Vec::new();
    h.engine.serialize(&mut stream).unwrap();

    // New instance deserializes, coldplugs, and carries on.
    let mut g = harness();
    let registry: std::collections::HashMap<UnitName, Arc<dyn UnitHandle>> = [
        (a.name(), a.clone() as Arc<dyn UnitHandle>),
        (b.name(), b.clone() as Arc<dyn UnitHandle>),
    ]
    .into();
    g.engine.begin_reload();
    g.engine
        .deserialize(std::io::Cursor::new(stream), &registry)
        .unwrap();
    g.engine.coldplug();
    g.engine.finish_reload();

    let ja2 = g.engine.job(ja).unwrap();
    assert_eq!(ja2.state, JobState::Running);
    assert!(ja2.reloaded);
    assert_eq!(ja2.subscribers, vec![":1.100"]);
    assert!(g.timers.is_armed(ja));
    assert_eq!(g.engine.job(jb).unwrap().state, JobState::Waiting);
    assert_eq!(g.engine.stats().n_running_jobs, 1);
    assert_invariants(&g.engine);

    // The surviving ordering relationship still gates b.
    g.engine.run_queue_tick();
    assert_eq!(g.engine.job(jb).unwrap().state, JobState::Waiting);
    g.engine.finish(ja, JobResult::Done, true, false);
    g.engine.run_queue_tick();
    assert_eq!(g.engine.job(jb).unwrap().state, JobState::Running);
}
