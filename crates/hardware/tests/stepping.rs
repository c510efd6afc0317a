//! Terminate/resume/abort semantics of the stepping engine.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use hardware::drivers::InMemSteppers;
use hardware::timers::FakeTimer;
use hardware::{BreakAction, Error, StepperEngine, Steppers, SteppingSim};
use motion::{StepCommand, StepDir, Steps};

const BASE_DELAY_US: i64 = 1000;

/// One positive step on axis 0 per tick, `n` ticks long.
fn single_axis_stream(n: usize) -> Vec<StepCommand> {
    let mut command = StepCommand::default();
    command.axes[0] = StepDir { step: true, dir: true };
    vec![command; n]
}

struct Rig {
    steppers: Arc<InMemSteppers>,
    timer: Arc<FakeTimer>,
    engine: Arc<StepperEngine>,
}

/// Engine over in-memory steppers and a recording timer; `terminate(n)` is
/// issued from the step callback of tick `at_tick`.
fn rig_with_terminate_at(at_tick: usize, n: i64) -> Rig {
    let steppers = Arc::new(InMemSteppers::new());
    let timer = Arc::new(FakeTimer::new());
    let engine = Arc::new(StepperEngine::new(
        BASE_DELAY_US,
        steppers.clone() as Arc<dyn hardware::Steppers>,
        timer.clone() as Arc<dyn hardware::PulseTimer>,
    ));
    let calls = Arc::new(AtomicUsize::new(0));
    let trigger = engine.clone();
    steppers.set_step_callback(move |_| {
        if calls.fetch_add(1, Ordering::SeqCst) == at_tick {
            trigger.terminate(n);
        }
    });
    Rig {
        steppers,
        timer,
        engine,
    }
}

#[test]
fn terminate_and_resume_completes_with_the_documented_pacing() {
    let rig = rig_with_terminate_at(1, 5);
    let breaks = AtomicUsize::new(0);
    let break_tick = AtomicI64::new(-1);

    rig.engine
        .exec(&single_axis_stream(40), &mut |achieved, tick| {
            breaks.fetch_add(1, Ordering::SeqCst);
            break_tick.store(tick, Ordering::SeqCst);
            assert_eq!(achieved, Steps([tick as i32, 0, 0, 0]));
            BreakAction::Resume
        })
        .unwrap();

    assert_eq!(breaks.load(Ordering::SeqCst), 1);
    // terminate at tick 1 with n = 5 suspends at tick 1 + 5 + 1
    assert_eq!(break_tick.load(Ordering::SeqCst), 7);
    // resuming finishes the stream with the original tick count
    assert_eq!(rig.engine.tick_index(), 40);
    assert_eq!(rig.steppers.steps(), Steps([40, 0, 0, 0]));
    assert_eq!(rig.engine.steps_counter(), 40);

    // per-tick delays: nominal, ramp up by 1/1000 per tick, hold across the
    // suspension, ramp back down, nominal again
    let mut expected: Vec<i64> = vec![
        1000, 1000, 1001, 1002, 1003, 1004, 1005, 1005, 1004, 1003, 1002, 1001,
    ];
    expected.resize(40, 1000);
    assert_eq!(rig.timer.recorded(), expected);
}

#[test]
fn abort_reports_the_achieved_steps() {
    let rig = rig_with_terminate_at(1, 5);
    let err = rig
        .engine
        .exec(&single_axis_stream(40), &mut |_, _| BreakAction::Abort)
        .unwrap_err();
    match err {
        Error::Terminated { delta_steps } => assert_eq!(delta_steps, Steps([7, 0, 0, 0])),
        other => panic!("unexpected error {:?}", other),
    }
    // the break tick itself was never emitted
    assert_eq!(rig.engine.tick_index(), 7);
    assert_eq!(rig.steppers.steps(), Steps([7, 0, 0, 0]));
}

#[test]
fn terminate_without_ramp_suspends_on_the_next_tick() {
    let rig = rig_with_terminate_at(3, 0);
    let err = rig
        .engine
        .exec(&single_axis_stream(40), &mut |_, tick| {
            assert_eq!(tick, 4);
            BreakAction::Abort
        })
        .unwrap_err();
    assert!(matches!(err, Error::Terminated { .. }));
    assert_eq!(rig.engine.tick_index(), 4);
}

#[test]
fn reset_after_terminate_allows_a_clean_rerun() {
    let rig = rig_with_terminate_at(1, 2);
    let _ = rig
        .engine
        .exec(&single_axis_stream(10), &mut |_, _| BreakAction::Abort);
    rig.engine.reset_after_terminate();
    // the callback only fires on the recorded tick of the first run, so the
    // rerun completes uninterrupted
    rig.engine
        .exec(&single_axis_stream(10), &mut |_, _| BreakAction::Abort)
        .unwrap();
    assert_eq!(rig.engine.tick_index(), 10);
}

#[test]
fn hardware_failure_propagates_out_of_exec() {
    let steppers = Arc::new(InMemSteppers::new());
    let timer = Arc::new(FakeTimer::new());
    let engine = StepperEngine::new(
        BASE_DELAY_US,
        steppers.clone() as Arc<dyn hardware::Steppers>,
        timer as Arc<dyn hardware::PulseTimer>,
    );
    steppers.fail_next_step();
    let err = engine
        .exec(&single_axis_stream(4), &mut |_, _| BreakAction::Abort)
        .unwrap_err();
    assert!(matches!(err, Error::Hardware(_)));
}

#[test]
fn multi_count_commands_pace_one_wait_per_tick() {
    let steppers = Arc::new(InMemSteppers::new());
    let timer = Arc::new(FakeTimer::new());
    let engine = StepperEngine::new(
        BASE_DELAY_US,
        steppers.clone() as Arc<dyn hardware::Steppers>,
        timer.clone() as Arc<dyn hardware::PulseTimer>,
    );
    let mut command = StepCommand::default();
    command.axes[1] = StepDir { step: true, dir: false };
    command.count = 25;
    engine
        .exec(&[command], &mut |_, _| BreakAction::Abort)
        .unwrap();
    assert_eq!(engine.tick_index(), 25);
    assert_eq!(steppers.steps(), Steps([0, -25, 0, 0]));
    assert_eq!(timer.recorded().len(), 25);
    assert!(timer.recorded().iter().all(|&d| d == BASE_DELAY_US));
}

#[test]
fn simulation_executor_mirrors_the_engine_contract() {
    let sim = Arc::new(SteppingSim::new(Steps([5, 0, 0, 0])));
    let trigger = sim.clone();
    let calls = AtomicUsize::new(0);
    sim.set_callback(move |_| {
        if calls.fetch_add(1, Ordering::SeqCst) == 1 {
            trigger.terminate(0);
        }
    });
    let err = sim
        .exec(&single_axis_stream(40), &mut |_, tick| {
            assert_eq!(tick, 2);
            BreakAction::Abort
        })
        .unwrap_err();
    assert!(matches!(err, Error::Terminated { .. }));
    assert_eq!(sim.tick_index(), 2);
    // positions are relative to the starting steps
    assert_eq!(sim.current_steps(), Steps([7, 0, 0, 0]));
}

#[test]
fn simulation_executor_resumes_in_place() {
    let sim = Arc::new(SteppingSim::new(Steps::default()));
    let trigger = sim.clone();
    let calls = AtomicUsize::new(0);
    sim.set_callback(move |_| {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            trigger.terminate(3);
        }
    });
    let breaks = AtomicUsize::new(0);
    sim.exec(&single_axis_stream(12), &mut |_, _| {
        breaks.fetch_add(1, Ordering::SeqCst);
        BreakAction::Resume
    })
    .unwrap();
    assert_eq!(breaks.load(Ordering::SeqCst), 1);
    assert_eq!(sim.tick_index(), 12);
    assert_eq!(sim.current_steps(), Steps([12, 0, 0, 0]));
}
