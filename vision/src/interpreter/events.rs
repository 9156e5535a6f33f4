use crate::buffer::{SkipCause, PROMPT_BUFFER};
use crate::errors::VisionError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Where a command came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Prompt,
    Script(String),
    /// Run on behalf of a `Require`.
    Required(String),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Prompt => write!(f, "{PROMPT_BUFFER}"),
            Origin::Script(name) | Origin::Required(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    Passed,
    Failed,
    Skipped(SkipCause),
}

/// The result of one command.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub origin: Origin,
    pub line: usize,
    pub text: String,
    pub status: OutcomeStatus,
    pub elapsed: Duration,
    pub error: Option<VisionError>,
    /// The locator the command resolved, or was trying to.
    pub locator: Option<String>,
    /// Took longer than the acceptable wait.
    pub slow: bool,
}

impl Outcome {
    pub fn passed(&self) -> bool {
        self.status == OutcomeStatus::Passed
    }

    pub fn failed(&self) -> bool {
        self.status == OutcomeStatus::Failed
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.elapsed.as_secs_f64();
        match &self.status {
            OutcomeStatus::Passed => {
                write!(f, "{} - ({secs:.2} seconds)", self.text)?;
                if self.slow {
                    write!(f, " SLOW")?;
                }
                Ok(())
            }
            OutcomeStatus::Failed => {
                write!(f, "{} - FAILED ({secs:.2} seconds)", self.text)?;
                if let Some(error) = &self.error {
                    write!(f, "\n    {error}")?;
                }
                if let Some(locator) = &self.locator {
                    write!(f, "\n    while looking for {locator}")?;
                }
                Ok(())
            }
            OutcomeStatus::Skipped(cause) => {
                write!(f, "{} - NOT EXECUTED", self.text)?;
                match cause {
                    SkipCause::ByDesign(reason) => write!(f, " because {reason}"),
                    SkipCause::Skip => write!(f, " (skipped)"),
                    SkipCause::ScopeSkipped => write!(f, " (its scope did not run)"),
                    SkipCause::AfterError => write!(f, " (an earlier command failed)"),
                }
            }
        }
    }
}

/// A question the interpreter is waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// A file literal is missing: create it now or accept the failure.
    CreateOrAccept { name: String, path: PathBuf },
    /// Collecting the contents of a file literal, one line at a time.
    FileLine {
        line: usize,
        name: String,
        path: PathBuf,
    },
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prompt::CreateOrAccept { .. } => {
                write!(f, "(C)reate the file\nor (A)ccept the error.\n(C)reate or (A)ccept?")
            }
            Prompt::FileLine { line, name, path } => write!(
                f,
                "Line {line} of {}, type {} to stop input:",
                path.display(),
                end_of_file(name)
            ),
        }
    }
}

/// The line that ends file literal input.
pub fn end_of_file(name: &str) -> String {
    format!("<End of {name}>")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    Breakpoint,
    Error,
    Step,
    EndOfScript,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} not executed",
            self.passed, self.failed, self.skipped
        )
    }
}

/// What a submitted line produced, in order.
#[derive(Debug, Clone)]
pub enum Event {
    Outcome(Outcome),
    Listing(Vec<String>),
    Message(String),
    Prompt(Prompt),
    Paused {
        script: String,
        line: Option<usize>,
        reason: PauseReason,
    },
    Finished(RunSummary),
    Goodbye,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: OutcomeStatus) -> Outcome {
        Outcome {
            origin: Origin::Prompt,
            line: 1,
            text: "Click the 'Go' button".to_string(),
            status,
            elapsed: Duration::from_millis(1250),
            error: None,
            locator: None,
            slow: false,
        }
    }

    #[test]
    fn test_outcome_lines() {
        assert_eq!(
            outcome(OutcomeStatus::Passed).to_string(),
            "Click the 'Go' button - (1.25 seconds)"
        );
        assert_eq!(
            outcome(OutcomeStatus::Skipped(SkipCause::ByDesign("it is slow".into()))).to_string(),
            "Click the 'Go' button - NOT EXECUTED because it is slow"
        );
        let mut failed = outcome(OutcomeStatus::Failed);
        failed.error = Some(VisionError::AssertionFailed("nope".into()));
        assert!(failed.to_string().starts_with("Click the 'Go' button - FAILED"));
        assert!(failed.to_string().contains("nope"));
    }

    #[test]
    fn test_prompts() {
        let path = PathBuf::from("upload/foo");
        let ask = Prompt::CreateOrAccept {
            name: "foo".into(),
            path: path.clone(),
        };
        assert!(ask.to_string().ends_with("(C)reate or (A)ccept?"));
        let line = Prompt::FileLine {
            line: 2,
            name: "foo".into(),
            path,
        };
        assert_eq!(
            line.to_string(),
            "Line 2 of upload/foo, type <End of foo> to stop input:"
        );
    }
}
