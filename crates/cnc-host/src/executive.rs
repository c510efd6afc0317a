//! The executive loop: planning pipeline, partition dispatch and the
//! pause/resume/abort wiring.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, info, warn};

use gcode::planner::{
    expand_rapids, insert_transition_nodes, limit_linear_moves, simplify_path,
};
use gcode::program::{carry_feedrates, last_state_after, partition, remove_duplicates};
use gcode::{offsets, parse, synth, Block, Generator, PartitionedProgram, Program};
use hardware::{BreakAction, StepperEngine};
use motion::{Limits, MotorLayout, AXES};

use crate::config::Config;
use crate::machine::Machine;

/// Button dispensing pause (and, pressed again, resume).
pub const PAUSE_BUTTON: usize = 4;
/// Button aborting the program.
pub const STOP_BUTTON: usize = 3;

/// Ticks of deceleration ramp used for button-triggered suspensions.
const BUTTON_RAMP_TICKS: i64 = 1000;

/// Owns the planning pipeline and drives partitions through the stepping
/// engine and the M-code adapters.
pub struct Executive {
    config: Config,
    machine: Machine,
    layout: MotorLayout,
    limits: Limits,
    engine: Arc<StepperEngine>,
}

fn planning_state(limits: &Limits) -> Block {
    Block::from([('F', limits.min_no_accel_velocity())])
}

fn execution_state() -> Block {
    Block::from([('F', 0.5)])
}

impl Executive {
    pub fn new(config: Config, machine: Machine) -> Result<Self> {
        let layout = config.layout().context("unusable kinematic configuration")?;
        let limits = config.limits();
        let engine = Arc::new(StepperEngine::new(
            config.tick_duration_us,
            machine.steppers.clone(),
            machine.timer.clone(),
        ));
        Ok(Executive {
            config,
            machine,
            layout,
            limits,
            engine,
        })
    }

    pub fn engine(&self) -> &Arc<StepperEngine> {
        &self.engine
    }

    /// Runs the full pipeline over raw G-code text and returns the
    /// partitioned, machine-limited program ready for execution.
    pub fn prepare(&self, text: &str) -> Result<PartitionedProgram> {
        let program = parse::parse_program(text)?;
        let program = carry_feedrates(&program, &self.limits);
        let program = offsets::resolve_offsets(&program);
        let program = simplify_path(&program, self.config.douglas_peucker_marigin, &Block::new())?;
        debug!("{} blocks after simplification", program.len());
        let parts = partition(&program, &execution_state())?;
        let parts = insert_transition_nodes(&parts, &execution_state(), &self.limits)?;
        self.limit_partitions(parts)
    }

    /// Applies per-run machine limits and regroups the result.
    fn limit_partitions(&self, parts: PartitionedProgram) -> Result<PartitionedProgram> {
        let mut machine_state = planning_state(&self.limits);
        let mut prepared: Program = Vec::new();
        for part in &parts {
            if part.is_empty() {
                continue;
            }
            if part[0].contains('M') {
                for block in part {
                    if matches!(block.m(), Some(3) | Some(5) | Some(17) | Some(18)) {
                        prepared.push(block.clone());
                    } else {
                        warn!("unsupported M-code dropped: {}", block);
                    }
                }
                continue;
            }
            match part[0].g() {
                Some(0) => {
                    let run = expand_rapids(part, &self.limits, &machine_state)?;
                    machine_state = last_state_after(&run, &machine_state);
                    prepared.extend(run);
                }
                Some(1) => {
                    let run = limit_linear_moves(part, &self.limits, &machine_state)?;
                    machine_state = last_state_after(&run, &machine_state);
                    prepared.extend(run);
                }
                Some(4) => prepared.extend(part.iter().cloned()),
                other => {
                    warn!("unsupported G-family dropped: G{:?}", other);
                }
            }
        }
        let prepared =
            simplify_path(&prepared, self.config.douglas_peucker_marigin, &Block::new())?;
        let regrouped = partition(
            &remove_duplicates(&prepared, &Block::new()),
            &Block::from([('F', 1.0)]),
        )?;
        Ok(regrouped)
    }

    /// Plans and executes a whole program.
    pub fn run_program(&self, text: &str) -> Result<()> {
        let parts = self.prepare(text)?;
        self.execute(&parts)
    }

    /// Executes an already prepared partitioning.
    pub fn execute(&self, parts: &PartitionedProgram) -> Result<()> {
        let (decision_tx, decision_rx) = bounded::<BreakAction>(4);
        self.wire_buttons(&decision_tx);

        let mut machine_state = execution_state();
        let mut spindle_status: BTreeMap<usize, f64> = BTreeMap::new();
        let mut last_spindle_on_delay_ms: i64 = 7000;

        for part in parts {
            if part.is_empty() {
                continue;
            }
            if part[0].contains('M') {
                self.dispatch_m_codes(part, &mut spindle_status, &mut last_spindle_on_delay_ms)?;
            } else {
                self.run_motion_partition(
                    part,
                    &mut machine_state,
                    &spindle_status,
                    last_spindle_on_delay_ms,
                    &decision_rx,
                )?;
            }
            debug!("state: {}", machine_state);
        }
        info!("program finished");
        Ok(())
    }

    fn dispatch_m_codes(
        &self,
        part: &[Block],
        spindle_status: &mut BTreeMap<usize, f64>,
        last_spindle_on_delay_ms: &mut i64,
    ) -> Result<()> {
        for block in part {
            match block.m() {
                Some(17) => {
                    self.machine.steppers.enable(&[true; AXES])?;
                    warmup_wait(block, 200);
                }
                Some(18) => {
                    self.machine.steppers.enable(&[false; AXES])?;
                    warmup_wait(block, 200);
                }
                Some(3) => {
                    spindle_status.insert(0, 1.0);
                    self.machine.spindles.set_power(0, 1.0)?;
                    *last_spindle_on_delay_ms = warmup_wait(block, 3000);
                }
                Some(5) => {
                    spindle_status.insert(0, 0.0);
                    self.machine.spindles.set_power(0, 0.0)?;
                    warmup_wait(block, 3000);
                }
                other => warn!("unsupported M-code ignored: M{:?}", other),
            }
        }
        Ok(())
    }

    fn run_motion_partition(
        &self,
        part: &[Block],
        machine_state: &mut Block,
        spindle_status: &BTreeMap<usize, f64>,
        last_spindle_on_delay_ms: i64,
        decision_rx: &Receiver<BreakAction>,
    ) -> Result<()> {
        // dwell runs have no geometry; only the segment generator can
        // express them
        let generator = if part[0].g() == Some(4) {
            Generator::Segments
        } else {
            self.config.generator()
        };

        let state_before = machine_state.clone();
        let algebraic_end = last_state_after(part, machine_state);
        let mut tracked = machine_state.clone();
        let commands = synth::generate(
            generator,
            part,
            &self.layout,
            self.config.dt(),
            machine_state,
            &mut |state| tracked = state.clone(),
        )?;
        if algebraic_end.to_waypoint() != tracked.to_waypoint() {
            return Err(crate::Error::InvariantViolation {
                synthesized: tracked,
                replayed: algebraic_end,
            }
            .into());
        }
        *machine_state = tracked;
        debug!("executing {} step commands", commands.len());

        // a stop pressed between partitions still applies; stale resumes
        // must not leak into the next suspension
        let mut stop_pending = false;
        while let Ok(decision) = decision_rx.try_recv() {
            if decision == BreakAction::Abort {
                stop_pending = true;
            }
        }
        if stop_pending {
            self.shut_down(spindle_status);
            bail!("stop requested before the run started");
        }

        let result = self.engine.exec(&commands, &mut |steps_from_start, tick| {
            let absolute = steps_from_start + self.layout.to_steps(&state_before.to_distance());
            info!(
                "paused at tick {}, position {}",
                tick,
                self.layout.to_cartesian(&absolute)
            );
            for (&index, _) in spindle_status.iter() {
                let _ = self.machine.spindles.set_power(index, 0.0);
            }
            match decision_rx.recv() {
                Ok(BreakAction::Resume) => {
                    for (&index, &power) in spindle_status.iter() {
                        let _ = self.machine.spindles.set_power(index, power);
                        info!("waiting {} ms for spindle {}", last_spindle_on_delay_ms, index);
                        std::thread::sleep(Duration::from_millis(
                            last_spindle_on_delay_ms.max(0) as u64,
                        ));
                    }
                    BreakAction::Resume
                }
                Ok(BreakAction::Abort) | Err(_) => BreakAction::Abort,
            }
        });

        match result {
            Ok(()) => Ok(()),
            Err(error) => {
                warn!("execution stopped: {}", error);
                self.shut_down(spindle_status);
                Err(anyhow!(error).context("execution did not complete"))
            }
        }
    }

    /// Graceful shutdown: spindles off, steppers disabled, pending
    /// termination cleared.
    fn shut_down(&self, spindle_status: &BTreeMap<usize, f64>) {
        for (&index, _) in spindle_status.iter() {
            let _ = self.machine.spindles.set_power(index, 0.0);
        }
        let _ = self.machine.steppers.enable(&[false; AXES]);
        self.engine.reset_after_terminate();
    }

    fn wire_buttons(&self, decision_tx: &Sender<BreakAction>) {
        let paused = Arc::new(AtomicBool::new(false));

        let pause_engine = self.engine.clone();
        let pause_tx = decision_tx.clone();
        let pause_flag = paused.clone();
        self.machine.buttons.on_key(
            PAUSE_BUTTON,
            Arc::new(move |_, down| {
                if !down {
                    return;
                }
                if !pause_flag.swap(true, Ordering::SeqCst) {
                    info!("pause requested");
                    pause_engine.terminate(BUTTON_RAMP_TICKS);
                } else {
                    info!("resume requested");
                    pause_flag.store(false, Ordering::SeqCst);
                    let _ = pause_tx.try_send(BreakAction::Resume);
                }
            }),
        );

        let stop_engine = self.engine.clone();
        let stop_tx = decision_tx.clone();
        self.machine.buttons.on_key(
            STOP_BUTTON,
            Arc::new(move |_, down| {
                if !down {
                    return;
                }
                info!("stop requested");
                let _ = stop_tx.try_send(BreakAction::Abort);
                stop_engine.terminate(BUTTON_RAMP_TICKS);
            }),
        );
    }
}

/// Waits out a component start-up window: `P` in milliseconds, `X` in
/// seconds, or the given default. Returns the waited time in milliseconds.
fn warmup_wait(block: &Block, default_ms: i64) -> i64 {
    let ms = if let Some(p) = block.get('P') {
        p as i64
    } else if let Some(x) = block.get('X') {
        (x * 1000.0) as i64
    } else {
        default_ms
    };
    if ms > 0 {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }
    ms
}
