//! Line-oriented console over any async reader and writer.

use crate::errors::VisionError;
use crate::interpreter::{Event, Interpreter, PauseReason, RunState};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

pub const RESUME_HINT: &str =
    "Get things into position that it will work, and type 'Run test' to resume.";

const PROMPT: &str = "> ";

pub struct Console {
    interpreter: Interpreter,
}

impl Console {
    pub fn new(interpreter: Interpreter) -> Self {
        Self { interpreter }
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn into_interpreter(self) -> Interpreter {
        self.interpreter
    }

    /// Feed lines to the interpreter until `Quit` or end of input.
    pub async fn run<R, W>(&mut self, reader: R, mut writer: W) -> Result<(), VisionError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        writer.write_all(PROMPT.as_bytes()).await?;
        writer.flush().await?;

        while let Some(line) = lines.next_line().await? {
            match self.interpreter.submit(&line).await {
                Ok(events) => {
                    for event in &events {
                        writer.write_all(render(event).as_bytes()).await?;
                    }
                }
                Err(VisionError::SessionClosed) => break,
                Err(e) if e.is_structural() => {
                    writer
                        .write_all(format!("FAILED TO PARSE: {e}\n").as_bytes())
                        .await?;
                }
                Err(e) => writer.write_all(format!("{e}\n").as_bytes()).await?,
            }

            match self.interpreter.state() {
                RunState::Quit => break,
                RunState::AwaitingFileLiteralDecision | RunState::AwaitingFileLiteralContent => {}
                _ => writer.write_all(PROMPT.as_bytes()).await?,
            }
            writer.flush().await?;
        }
        debug!("Console input ended in state {:?}", self.interpreter.state());
        writer.flush().await?;
        Ok(())
    }
}

/// The text printed for one event, newline-terminated.
pub fn render(event: &Event) -> String {
    let mut text = match event {
        Event::Outcome(outcome) => outcome.to_string(),
        Event::Listing(lines) => lines.join("\n"),
        Event::Message(message) => message.clone(),
        Event::Prompt(prompt) => format!("{prompt} "),
        Event::Paused {
            script,
            line,
            reason,
        } => match (reason, line) {
            (PauseReason::Error, _) => RESUME_HINT.to_string(),
            (PauseReason::Breakpoint, Some(line)) => {
                format!("Stopped at the breakpoint on line {line} of {script}")
            }
            (PauseReason::Step, Some(line)) => format!("Stopped after line {line} of {script}"),
            (_, _) => format!("End of {script}"),
        },
        Event::Finished(summary) => format!("Finished: {summary}"),
        Event::Goodbye => "Goodbye".to_string(),
    };
    if !matches!(event, Event::Prompt(_)) {
        text.push('\n');
    }
    text
}
