//! Programs, partitioning and machine-state replay.

use motion::Limits;

use crate::{Block, Error};

/// An ordered sequence of blocks; one parsed G-code program.
pub type Program = Vec<Block>;

/// A program segmented into maximal runs of blocks sharing one dispatch
/// family: all G0, all G1, all G4, or a single M-code.
pub type PartitionedProgram = Vec<Program>;

/// Machine state with the coordinate words pinned to zero.
fn zeroed_axes() -> Block {
    Block::from([('X', 0.0), ('Y', 0.0), ('Z', 0.0), ('A', 0.0)])
}

/// Replays the merge algebra over `program`, returning the machine state
/// after the last block.
///
/// G4 blocks preserve the state (a dwell moves nothing), and `M` words are
/// not latched across blocks of a different family.
pub fn last_state_after(program: &[Block], initial: &Block) -> Block {
    let mut result = zeroed_axes().merge(initial);
    for block in program {
        result.remove('M');
        let effective = if block.g() == Some(4) {
            Block::new()
        } else {
            block.clone()
        };
        result = result.merge(&effective);
    }
    result
}

/// Groups consecutive same-family G blocks together and isolates each
/// M block into its own run.
///
/// Blocks without a `G`/`M` word continue the preceding G run. The first
/// block of a G1 run is guaranteed to carry `F`: a run starting without one
/// is prefixed with a synthetic `{G1, F:<carried feedrate>}` block.
pub fn partition(program: &[Block], initial: &Block) -> Result<PartitionedProgram, Error> {
    let mut parts: PartitionedProgram = Vec::new();
    let mut current_state = zeroed_axes().merge(initial);
    for block in program {
        if parts.is_empty() {
            if block.contains('G') || block.contains('M') {
                parts.push(vec![block.clone()]);
            } else {
                return Err(Error::Program("the first command must be G or M".into()));
            }
        } else if block.contains('G') {
            let last = parts.last().expect("non-empty");
            let continues = last.last().map(|b| b.contains('G')).unwrap_or(false)
                && last.first().and_then(Block::g) == block.g();
            if continues {
                parts.last_mut().expect("non-empty").push(block.clone());
            } else {
                parts.push(vec![block.clone()]);
            }
        } else if block.contains('M') {
            parts.push(vec![block.clone()]);
        } else if parts.last().and_then(|p| p.first()).map(|b| b.contains('G')) == Some(true) {
            parts.last_mut().expect("non-empty").push(block.clone());
        } else {
            return Err(Error::Program(
                "cannot tell whether the command belongs to a G or M family".into(),
            ));
        }
        current_state = current_state.merge(block);

        // a fresh G1 run must open with an explicit feedrate
        let last = parts.last_mut().expect("non-empty");
        if last.len() == 1 && last[0].g() == Some(1) && !last[0].contains('F') {
            let carried = current_state.get('F').ok_or_else(|| {
                Error::Program("no feedrate available for the first G1 of a run".into())
            })?;
            let prefix = Block::from([('G', 1.0), ('F', carried)]);
            *last = vec![prefix, block.clone()];
        }
    }
    Ok(parts)
}

/// Removes G0/G1/G92 blocks that neither move any axis nor change the
/// feedrate; kept move blocks are reduced to their differing words plus `G`.
pub fn remove_duplicates(program: &[Block], initial: &Block) -> Program {
    let mut out = Vec::with_capacity(program.len());
    let mut current_state = zeroed_axes().merge(&Block::from([('F', 0.1)])).merge(initial);
    for block in program {
        let positional = !block.contains('M')
            && matches!(block.g(), Some(0) | Some(1) | Some(92));
        if positional {
            let new_state = current_state.merge(block);
            let moved = new_state.vector_to(&current_state).length() != 0.0;
            let refed = new_state.get('F') != current_state.get('F');
            if moved || refed {
                let mut reduced = new_state.diff(&current_state);
                if let Some(g) = new_state.get('G') {
                    reduced.set('G', g);
                }
                out.push(reduced);
            }
            current_state = new_state;
        } else {
            out.push(block.clone());
        }
    }
    out
}

/// Makes the feedrate explicit on every rapid and linear move: G0 blocks get
/// the largest per-axis velocity, G1 blocks inherit the last commanded `F`.
pub fn carry_feedrates(program: &[Block], limits: &Limits) -> Program {
    let mut out = program.to_vec();
    let mut previous_g1_feedrate = 0.1;
    for block in &mut out {
        match block.g() {
            Some(0) => block.set('F', limits.max_axis_velocity()),
            Some(1) => match block.get('F') {
                Some(f) => previous_g1_feedrate = f,
                None => block.set('F', previous_g1_feedrate),
            },
            _ => {}
        }
    }
    out
}

/// Renders a partitioned program back to G-code text, one group per
/// paragraph. Used for diagnostics and error reporting.
pub fn render_gcode(parts: &PartitionedProgram) -> String {
    let mut out = String::new();
    for group in parts {
        out.push_str(&format!("; group of size {}\n", group.len()));
        for block in group {
            out.push_str(&format!("{}\n", block));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use motion::Distance;

    fn b<const N: usize>(pairs: [(char, f64); N]) -> Block {
        Block::from(pairs)
    }

    #[test]
    fn grouping_splits_families() {
        let program = vec![
            b([('G', 0.0), ('X', 1.0)]),
            b([('G', 0.0), ('X', 2.0)]),
            b([('G', 1.0), ('X', 3.0), ('F', 10.0)]),
            b([('Y', 4.0)]),
            b([('M', 17.0)]),
            b([('G', 4.0), ('P', 100.0)]),
        ];
        let parts = partition(&program, &b([('F', 1.0)])).unwrap();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0].len(), 2);
        assert_eq!(parts[1].len(), 2, "bare Y block continues the G1 run");
        assert_eq!(parts[2], vec![b([('M', 17.0)])]);
        assert_eq!(parts[3].len(), 1);
    }

    #[test]
    fn first_block_must_carry_a_family() {
        let program = vec![b([('X', 1.0)])];
        assert!(partition(&program, &b([('F', 1.0)])).is_err());
    }

    #[test]
    fn block_after_m_without_family_is_ambiguous() {
        let program = vec![b([('M', 3.0)]), b([('X', 1.0)])];
        assert!(partition(&program, &b([('F', 1.0)])).is_err());
    }

    #[test]
    fn bare_g1_run_gets_a_synthetic_feedrate_prefix() {
        let program = vec![b([('G', 1.0), ('X', 5.0)])];
        let parts = partition(&program, &b([('F', 7.0)])).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0][0], b([('G', 1.0), ('F', 7.0)]));
        assert_eq!(parts[0][1], b([('G', 1.0), ('X', 5.0)]));
    }

    #[test]
    fn replay_tracks_position_and_drops_dwell() {
        let program = vec![
            b([('G', 0.0), ('X', 10.0)]),
            b([('G', 4.0), ('P', 500.0)]),
            b([('G', 1.0), ('Y', 3.0), ('F', 5.0)]),
            b([('M', 5.0)]),
        ];
        let state = last_state_after(&program, &Block::new());
        assert_eq!(state.to_distance(), Distance([10.0, 3.0, 0.0, 0.0]));
        assert_eq!(state.get('F'), Some(5.0));
        // the dwell's P never latched, the M word is the last block's own
        assert_eq!(state.get('P'), None);
        assert_eq!(state.m(), Some(5));
    }

    #[test]
    fn m_words_do_not_latch_across_blocks() {
        let program = vec![b([('M', 3.0)]), b([('G', 0.0), ('X', 1.0)])];
        let state = last_state_after(&program, &Block::new());
        assert_eq!(state.m(), None);
    }

    #[test]
    fn duplicates_are_removed_and_moves_reduced() {
        let program = vec![
            b([('G', 0.0), ('X', 10.0)]),
            b([('G', 0.0), ('X', 10.0)]), // no motion, no feedrate change
            b([('G', 1.0), ('X', 10.0), ('Y', 2.0), ('F', 4.0)]),
        ];
        let out = remove_duplicates(&program, &Block::new());
        assert_eq!(out.len(), 2);
        assert!(!out[1].contains('X'), "unchanged X must be dropped: {}", out[1]);
        assert_eq!(out[1].get('Y'), Some(2.0));
        assert_eq!(out[1].get('G'), Some(1.0));
    }

    #[test]
    fn feedrate_carrying() {
        let limits = Limits::new(
            Distance([100.0; 4]),
            Distance([220.0, 220.0, 110.0, 110.0]),
            Distance([2.0; 4]),
        );
        let program = vec![
            b([('G', 0.0), ('X', 1.0)]),
            b([('G', 1.0), ('X', 2.0), ('F', 42.0)]),
            b([('G', 1.0), ('X', 3.0)]),
        ];
        let out = carry_feedrates(&program, &limits);
        assert_eq!(out[0].get('F'), Some(220.0));
        assert_eq!(out[1].get('F'), Some(42.0));
        assert_eq!(out[2].get('F'), Some(42.0));
    }
}
