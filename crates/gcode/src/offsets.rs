//! G92 resolution: folding coordinate-system offsets into absolute
//! coordinates.

use motion::Distance;

use crate::{Block, Program};

/// Quantum for coordinate values, 1/1024 mm. Repeated G92 cycles otherwise
/// accumulate binary-fraction drift.
const QUANTUM: f64 = 1024.0;

fn quantize(v: f64) -> f64 {
    ((v * QUANTUM) as i64) as f64 / QUANTUM
}

/// Rewrites the program so that every coordinate is absolute and no G92
/// block remains.
///
/// Each G92 adjusts a running offset so the current position reads as the
/// stated values; subsequent coordinate words are shifted by that offset.
pub fn resolve_offsets(program: &[Block]) -> Program {
    let mut out = Vec::with_capacity(program.len());
    let mut shift = Distance::default();
    let mut current_state = Block::new();
    for block in program {
        let mut block = block.clone();
        for (k, v) in block.clone().iter() {
            block.set(k, quantize(v));
        }
        if block.g() == Some(92) {
            let new_pos = current_state.merge(&block).to_distance();
            let old_pos = current_state.to_distance();
            shift = shift + new_pos - old_pos;
            current_state = current_state.merge(&block);
        } else {
            for (i, letter) in ['X', 'Y', 'Z', 'A'].into_iter().enumerate() {
                if let Some(v) = block.get(letter) {
                    block.set(letter, v - shift[i]);
                }
            }
            current_state = current_state.merge(&block);
            out.push(block);
        }
        current_state.remove('G');
        current_state.remove('M');
    }
    out
}
