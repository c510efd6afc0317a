//! The step-command model.
//!
//! A [`StepCommand`] is the atomic unit the stepping engine executes: one
//! step/dir bit pair per axis, repeated `count` ticks. Commands with
//! identical bit patterns are merged by accumulating counts, capped so the
//! repeat never overflows the hardware-facing encoding.

use crate::{Steps, AXES};

/// Upper bound for the repeat count of a single command. Accumulation past
/// this starts a new command instead.
pub const MAX_REPEAT: u32 = 0x0FFF_FFFF;

/// Step and direction bits for one axis. `dir` true means the positive
/// direction.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct StepDir {
    pub step: bool,
    pub dir: bool,
}

impl StepDir {
    /// Signed step contribution of one application of this bit pair.
    pub fn delta(&self) -> i32 {
        if self.step {
            if self.dir {
                1
            } else {
                -1
            }
        } else {
            0
        }
    }
}

/// An atomic 4-axis step action repeated `count` ticks in a row.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StepCommand {
    pub axes: [StepDir; AXES],
    pub count: u32,
}

impl Default for StepCommand {
    fn default() -> Self {
        StepCommand {
            axes: [StepDir::default(); AXES],
            count: 1,
        }
    }
}

impl StepCommand {
    /// A command that steps no motor for `count` ticks; the encoding of G4.
    pub fn dwell(count: u32) -> Self {
        StepCommand {
            axes: [StepDir::default(); AXES],
            count,
        }
    }

    /// True when the step/dir bit patterns match; the repeat count is
    /// ignored. Merge-compatible commands may be run-length combined.
    pub fn same_pattern(&self, other: &StepCommand) -> bool {
        self.axes == other.axes
    }

    /// Signed per-axis movement of a single application of this command.
    pub fn tick_delta(&self) -> Steps {
        let mut out = Steps::default();
        for i in 0..AXES {
            out[i] = self.axes[i].delta();
        }
        out
    }
}

/// Appends commands to `out`, merging counts of merge-compatible neighbors.
/// A merge that would push the accumulated count past [`MAX_REPEAT`] starts
/// a new command instead, so no command ever exceeds the cap. Zero-count
/// commands are dropped.
pub fn append_merged(out: &mut Vec<StepCommand>, commands: &[StepCommand]) {
    for e in commands {
        if e.count == 0 {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.same_pattern(e) && e.count <= MAX_REPEAT.saturating_sub(last.count) => {
                last.count += e.count;
            }
            _ => out.push(*e),
        }
    }
}

/// Rebuilds a stream with runs of merge-compatible commands collapsed.
pub fn collapse_runs(commands: &[StepCommand]) -> Vec<StepCommand> {
    let mut out = Vec::with_capacity(commands.len());
    append_merged(&mut out, commands);
    out
}

/// Emits the commands needed to move motors from `from` to `to`, one step
/// per axis per tick, until every axis has arrived.
///
/// A no-op chase (`from == to`) still emits one all-idle command so each
/// invocation contributes at least one tick of pacing.
pub fn chase_steps(out: &mut Vec<StepCommand>, from: &Steps, to: &Steps) {
    let mut pos = *from;
    let mut pushed = 0;
    loop {
        let mut command = StepCommand::default();
        let mut moved = false;
        for i in 0..AXES {
            if to[i] > pos[i] {
                pos[i] += 1;
                command.axes[i] = StepDir { step: true, dir: true };
                moved = true;
            } else if to[i] < pos[i] {
                pos[i] -= 1;
                command.axes[i] = StepDir { step: true, dir: false };
                moved = true;
            }
        }
        if !moved {
            break;
        }
        pushed += 1;
        append_merged(out, &[command]);
    }
    if pushed == 0 {
        out.push(StepCommand::default());
    }
}

/// Convenience wrapper returning a fresh command list.
pub fn chase_steps_between(from: &Steps, to: &Steps) -> Vec<StepCommand> {
    let mut out = Vec::new();
    chase_steps(&mut out, from, to);
    out
}

/// Expands a stream into the motor position after every tick, relative to
/// the stream's starting point.
pub fn stream_positions(commands: &[StepCommand]) -> Vec<Steps> {
    let mut out = Vec::new();
    let mut pos = Steps::default();
    for c in commands {
        let delta = c.tick_delta();
        for _ in 0..c.count {
            pos = pos + delta;
            out.push(pos);
        }
    }
    out
}

/// Relative motor position after executing the first `ticks` ticks of the
/// stream. `ticks == 0` is the starting point.
pub fn position_after(commands: &[StepCommand], ticks: i64) -> Steps {
    let mut pos = Steps::default();
    let mut done: i64 = 0;
    for c in commands {
        let delta = c.tick_delta();
        for _ in 0..c.count {
            if done >= ticks {
                return pos;
            }
            pos = pos + delta;
            done += 1;
        }
    }
    pos
}

/// Total number of ticks the stream takes to execute.
pub fn total_ticks(commands: &[StepCommand]) -> u64 {
    commands.iter().map(|c| c.count as u64).sum()
}
