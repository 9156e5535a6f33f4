//! The input log and the text listings built from it.

use super::events::{Origin, OutcomeStatus};
use crate::buffer::{ScriptBuffer, SkipCause};
use crate::command::Verb;
use crate::scope::INDENT_UNIT;

/// One line the session processed, kept for `Show input` and `Save test`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRecord {
    pub origin: Origin,
    pub line: usize,
    pub depth: usize,
    pub text: String,
    /// `None` when the line did not parse.
    pub verb: Option<Verb>,
    pub status: OutcomeStatus,
    pub error: Option<String>,
}

impl InputRecord {
    /// Whether the line belongs in a saved script.
    pub fn is_savable(&self) -> bool {
        if matches!(self.origin, Origin::Required(_)) {
            return false;
        }
        match self.verb {
            Some(verb) if verb.is_interpreter() || verb.closes_scope() => return false,
            None => return false,
            Some(_) => {}
        }
        match &self.status {
            OutcomeStatus::Passed => true,
            OutcomeStatus::Skipped(SkipCause::ByDesign(_)) => true,
            OutcomeStatus::Skipped(_) | OutcomeStatus::Failed => false,
        }
    }

    fn marker(&self) -> char {
        if self.verb.is_some_and(|v| v.is_interpreter()) {
            return 'I';
        }
        match self.status {
            OutcomeStatus::Failed => 'E',
            OutcomeStatus::Skipped(_) => 'S',
            OutcomeStatus::Passed => ' ',
        }
    }

    fn indented(&self) -> String {
        format!("{}{}", " ".repeat(self.depth * INDENT_UNIT), self.text)
    }
}

/// The lines `Save test` writes, indented by nesting depth.
pub fn save_lines(log: &[InputRecord]) -> Vec<String> {
    log.iter()
        .filter(|r| r.is_savable())
        .map(InputRecord::indented)
        .collect()
}

/// Every line processed, marked `I` (interpreter), `E` (error) or `S` (skipped).
pub fn show_all_input(log: &[InputRecord]) -> Vec<String> {
    log.iter()
        .filter(|r| !matches!(r.origin, Origin::Required(_)))
        .map(|r| {
            let mut line = format!("{} {}", r.marker(), r.indented());
            if let Some(error) = &r.error {
                line.push_str(" - ");
                line.push_str(error);
            }
            line
        })
        .collect()
}

/// The commands of `buffer` that have not run yet, with breakpoints marked.
pub fn show_test(buffer: &ScriptBuffer) -> Vec<String> {
    let width = buffer
        .entries()
        .last()
        .map(|e| e.line.to_string().len())
        .unwrap_or(1);
    buffer
        .remaining()
        .iter()
        .map(|entry| {
            let marker = if entry.breakpoint { "B " } else { "  " };
            format!(
                "{marker}{:>width$}| {}{}",
                entry.line,
                " ".repeat(entry.depth() * INDENT_UNIT),
                entry.text
            )
        })
        .collect()
}
