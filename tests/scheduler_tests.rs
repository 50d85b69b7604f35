//! Dispatch-cycle tests for the scheduler engine, driven step by step on a
//! simulated clock with a scripted controller.


use std::time::Duration;

use chrono::Utc;
use jobsched::error::SchedError;
use jobsched::process::ExitStatus;
use jobsched::scheduler::{EngineState, JobState};
use test_harness::{after, fake_engine, run_until_idle, submission, ControlEvent};

const TSLICE: Duration = Duration::from_millis(50);

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_single_short_job_runs_one_cycle() {
    let mut engine = fake_engine(1, 50, 10);
    let t0 = Utc::now();
    engine.submit(submission("true", 1), t0).unwrap();

    run_until_idle(&mut engine, t0);

    assert_eq!(engine.cycles(), 1);
    let entries = engine.history().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].wait_time, Duration::ZERO);
    assert_eq!(entries[0].start_time, t0);
    assert_eq!(entries[0].end_time, after(t0, TSLICE));
    assert_eq!(entries[0].exit_status, ExitStatus::Exited(0));
}

#[test]
fn test_lower_priority_value_dispatches_first() {
    let mut engine = fake_engine(1, 50, 10);
    let t0 = Utc::now();
    let slow = engine.submit(submission("job-a", 3), t0).unwrap();
    let urgent = engine.submit(submission("job-b", 1), t0).unwrap();

    run_until_idle(&mut engine, t0);

    assert_eq!(engine.controller().resumes(), vec![urgent.handle, slow.handle]);
    let entries = engine.history().entries();
    assert_eq!(entries[0].pid, urgent.handle);
    assert_eq!(entries[1].pid, slow.handle);
}

#[test]
fn test_equal_priority_dispatches_in_arrival_order() {
    let mut engine = fake_engine(1, 50, 10);
    let t0 = Utc::now();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            engine
                .submit(submission(&format!("job-{}", i), 2), after(t0, Duration::from_millis(i)))
                .unwrap()
                .handle
        })
        .collect();

    run_until_idle(&mut engine, t0);

    assert_eq!(engine.controller().resumes(), handles);
}

#[test]
fn test_preempted_job_yields_to_equal_priority() {
    let mut engine = fake_engine(1, 50, 10);
    let t0 = Utc::now();
    let a = engine.submit(submission("work 2", 4), t0).unwrap();
    let b = engine.submit(submission("work 2", 4), t0).unwrap();

    run_until_idle(&mut engine, t0);

    assert_eq!(
        engine.controller().resumes(),
        vec![a.handle, b.handle, a.handle, b.handle]
    );
}

#[test]
fn test_urgent_submission_overtakes_preempted_job() {
    let mut engine = fake_engine(1, 50, 10);
    let t0 = Utc::now();
    let long = engine.submit(submission("work 3", 5), t0).unwrap();

    engine.dispatch(t0);
    let t1 = after(t0, TSLICE);
    engine.reclaim(t1);
    let urgent = engine.submit(submission("true", 1), t1).unwrap();

    run_until_idle(&mut engine, t1);

    assert_eq!(
        engine.controller().resumes(),
        vec![long.handle, urgent.handle, long.handle, long.handle]
    );
}

// ============================================================================
// Concurrency limit and wait accounting
// ============================================================================

#[test]
fn test_running_batch_never_exceeds_ncpu() {
    let mut engine = fake_engine(2, 50, 20);
    let t0 = Utc::now();
    for i in 0..7 {
        engine.submit(submission(&format!("work {}", i % 3 + 1), 1), t0).unwrap();
    }

    let mut now = t0;
    while engine.admitted() > 0 {
        let started = engine.dispatch(now);
        assert!(started <= 2);
        assert!(engine.running().len() <= 2);
        now = after(now, TSLICE);
        engine.reclaim(now);
    }

    assert_eq!(engine.controller().max_running, 2);
    assert_eq!(engine.history().len(), 7);
}

#[test]
fn test_wait_time_charged_per_quantum_in_queue() {
    let mut engine = fake_engine(1, 50, 10);
    let t0 = Utc::now();
    let a = engine.submit(submission("work 2", 1), t0).unwrap();
    let b = engine.submit(submission("work 1", 1), t0).unwrap();

    run_until_idle(&mut engine, t0);

    let entries = engine.history().entries();
    let wait_of = |handle| {
        entries
            .iter()
            .find(|e| e.pid == handle)
            .map(|e| e.wait_time)
            .unwrap()
    };
    assert_eq!(wait_of(a.handle), TSLICE);
    assert_eq!(wait_of(b.handle), TSLICE);
    assert_eq!(engine.cycles(), 3);
}

#[test]
fn test_start_time_is_first_dispatch() {
    let mut engine = fake_engine(1, 50, 10);
    let t0 = Utc::now();
    engine.submit(submission("work 3", 1), t0).unwrap();
    engine.submit(submission("work 1", 1), t0).unwrap();

    run_until_idle(&mut engine, t0);

    let entries = engine.history().entries();
    let long = entries.iter().find(|e| e.command == "work 3").unwrap();
    assert_eq!(long.start_time, t0);
    assert_eq!(long.end_time, after(t0, TSLICE * 4));
    assert_eq!(long.turnaround(), TSLICE * 4);
}

// ============================================================================
// Admission
// ============================================================================

#[test]
fn test_capacity_exceeded_leaves_queue_unchanged() {
    let mut engine = fake_engine(1, 50, 2);
    let t0 = Utc::now();
    engine.submit(submission("job-a", 1), t0).unwrap();
    engine.submit(submission("job-b", 1), t0).unwrap();

    let err = engine.submit(submission("job-c", 1), t0).unwrap_err();

    assert!(matches!(err, SchedError::CapacityExceeded { capacity: 2 }));
    assert_eq!(engine.queue().len(), 2);
    assert_eq!(engine.controller().launches(), 2);
}

#[test]
fn test_capacity_counts_running_jobs() {
    let mut engine = fake_engine(1, 50, 2);
    let t0 = Utc::now();
    engine.submit(submission("work 2", 1), t0).unwrap();
    engine.submit(submission("work 2", 1), t0).unwrap();
    engine.dispatch(t0);
    assert_eq!(engine.queue().len(), 1);

    let err = engine.submit(submission("job-c", 1), t0).unwrap_err();
    assert!(matches!(err, SchedError::CapacityExceeded { .. }));
    assert_eq!(engine.controller().launches(), 2);
}

#[test]
fn test_launch_failure_drops_submission() {
    let mut engine = fake_engine(1, 50, 10);
    let t0 = Utc::now();

    let err = engine.submit(submission("unlaunchable", 1), t0).unwrap_err();
    assert!(matches!(err, SchedError::Launch { .. }));
    assert!(engine.queue().is_empty());

    engine.submit(submission("true", 1), t0).unwrap();
    run_until_idle(&mut engine, t0);
    assert_eq!(engine.history().len(), 1);
}

#[test]
fn test_admission_reports_job_identity() {
    let mut engine = fake_engine(1, 50, 10);
    let admission = engine.submit(submission("true", 7), Utc::now()).unwrap();

    let queued = engine.queue().front().unwrap();
    assert_eq!(queued.id, admission.job_id);
    assert_eq!(queued.handle, admission.handle);
    assert_eq!(queued.priority, 7);
    assert_eq!(queued.state, JobState::Queued);
}

// ============================================================================
// Completion
// ============================================================================

#[test]
fn test_abnormal_exit_is_recorded() {
    let mut engine = fake_engine(1, 50, 10);
    let t0 = Utc::now();
    engine.submit(submission("crash 2", 1), t0).unwrap();

    run_until_idle(&mut engine, t0);

    let entries = engine.history().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].exit_status, ExitStatus::Signaled(11));
    assert!(!entries[0].exit_status.is_success());
}

#[test]
fn test_every_admitted_job_is_recorded_once() {
    let mut engine = fake_engine(3, 50, 50);
    let t0 = Utc::now();
    for i in 0..12u32 {
        engine
            .submit(submission(&format!("work {}", i % 4 + 1), i % 5 + 1), t0)
            .unwrap();
    }

    run_until_idle(&mut engine, t0);

    let entries = engine.history().entries();
    assert_eq!(entries.len(), 12);
    for entry in entries {
        assert!(entry.start_time >= entry.submitted_at);
        assert!(entry.end_time >= entry.start_time);
    }
    let mut pids: Vec<_> = entries.iter().map(|e| e.pid).collect();
    pids.sort();
    pids.dedup();
    assert_eq!(pids.len(), 12);

    let summary = engine.history().summary();
    assert_eq!(summary.completed, 12);
    assert!(summary.mean_turnaround.is_some());
}

#[test]
fn test_exit_observed_mid_quantum_keeps_early_end_time() {
    let mut engine = fake_engine(1, 50, 10);
    let t0 = Utc::now();
    engine.submit(submission("true", 1), t0).unwrap();

    engine.dispatch(t0);
    let exited_at = after(t0, Duration::from_millis(10));
    assert_eq!(engine.observe_exits(exited_at), 1);
    assert_eq!(engine.observe_exits(after(t0, Duration::from_millis(20))), 0);
    engine.reclaim(after(t0, TSLICE));

    let entries = engine.history().entries();
    assert_eq!(entries[0].end_time, exited_at);
    assert_eq!(entries[0].turnaround(), Duration::from_millis(10));
    assert!(engine.running().is_empty());
}

#[test]
fn test_unfinished_job_is_paused_and_requeued() {
    let mut engine = fake_engine(1, 50, 10);
    let t0 = Utc::now();
    let job = engine.submit(submission("work 2", 1), t0).unwrap();

    engine.dispatch(t0);
    engine.reclaim(after(t0, TSLICE));

    assert_eq!(
        engine.controller().events,
        vec![
            ControlEvent::Launch(job.handle),
            ControlEvent::Resume(job.handle),
            ControlEvent::Pause(job.handle),
        ]
    );
    let queued = engine.queue().front().unwrap();
    assert_eq!(queued.state, JobState::Preempted);
    assert_eq!(queued.dispatches, 1);
    assert!(engine.history().is_empty());
}

// ============================================================================
// State machine and shutdown
// ============================================================================

#[test]
fn test_state_transitions_through_a_cycle() {
    let mut engine = fake_engine(1, 50, 10);
    let t0 = Utc::now();
    assert_eq!(engine.state(), EngineState::Idle);

    engine.submit(submission("work 2", 1), t0).unwrap();
    assert_eq!(engine.state(), EngineState::Idle);

    engine.dispatch(t0);
    assert_eq!(engine.state(), EngineState::Running);

    engine.reclaim(after(t0, TSLICE));
    assert_eq!(engine.state(), EngineState::Dispatching);

    engine.dispatch(after(t0, TSLICE));
    engine.reclaim(after(t0, TSLICE * 2));
    assert_eq!(engine.state(), EngineState::Idle);
}

#[test]
fn test_dispatch_on_empty_queue_stays_idle() {
    let mut engine = fake_engine(2, 50, 10);
    assert_eq!(engine.dispatch(Utc::now()), 0);
    assert_eq!(engine.state(), EngineState::Idle);
    assert!(engine.controller().events.is_empty());
}

#[test]
fn test_shutdown_terminates_only_queued_jobs() {
    let mut engine = fake_engine(1, 50, 10);
    let t0 = Utc::now();
    let running = engine.submit(submission("work 5", 1), t0).unwrap();
    let queued = engine.submit(submission("work 5", 2), t0).unwrap();
    engine.dispatch(t0);

    engine.shutdown();

    assert_eq!(engine.controller().terminated(), vec![queued.handle]);
    assert!(!engine.controller().terminated().contains(&running.handle));
    assert!(engine.queue().is_empty());
    assert_eq!(engine.state(), EngineState::Idle);
}
