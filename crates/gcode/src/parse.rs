//! Line-oriented G-code parsing.
//!
//! A line is whitespace-insensitive and case-insensitive: every uppercase
//! letter starts a word, the following signed decimal literal is its value,
//! and `;` starts a comment running to the end of the line. Empty and
//! comment-only lines produce no block.

use crate::{Block, Error};

/// Parses one line into a block. Returns `Ok(None)` for lines that carry no
/// words. `line_no` is only used to tag errors.
pub fn parse_line(line_no: usize, line: &str) -> Result<Option<Block>, Error> {
    let fail = |reason: &str| Error::Parse {
        line: line_no,
        reason: reason.to_string(),
    };

    let mut words: Vec<(char, String)> = Vec::new();
    for raw in line.chars() {
        if raw == '\n' {
            return Err(fail("newline is not allowed inside a command"));
        }
        if raw == ' ' || raw == '\t' || raw == '\r' {
            continue;
        }
        if raw == ';' {
            break;
        }
        let c = raw.to_ascii_uppercase();
        if c.is_ascii_uppercase() {
            match words.iter_mut().find(|(k, _)| *k == c) {
                // a repeated letter restarts its value
                Some(entry) => entry.1.clear(),
                None => words.push((c, String::new())),
            }
        } else {
            match words.last_mut() {
                Some(entry) => entry.1.push(c),
                None => return Err(fail("a command cannot start with a number")),
            }
        }
    }

    if words.is_empty() {
        return Ok(None);
    }

    let mut block = Block::new();
    for (letter, literal) in words {
        let value: f64 = literal
            .parse()
            .map_err(|_| fail(&format!("'{}' is not a number (word {})", literal, letter)))?;
        block.set(letter, value);
    }
    Ok(Some(block))
}

/// Parses a whole program; blank and comment-only lines are skipped.
pub fn parse_program(text: &str) -> Result<crate::Program, Error> {
    let mut program = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if let Some(block) = parse_line(line_no, line)? {
            program.push(block);
        }
    }
    Ok(program)
}
