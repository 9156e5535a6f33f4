//! The run state machine.
//!
//! Everything the user types goes through [`Interpreter::submit`]. Element
//! commands run immediately against the prompt buffer, interpreter verbs
//! steer the active script, and the two file-literal questions are explicit
//! states that the next submitted line answers.

mod events;
mod executor;
mod listing;

pub use events::{end_of_file, Event, Origin, Outcome, OutcomeStatus, PauseReason, Prompt, RunSummary};
pub use executor::RequireRecord;
pub use listing::{save_lines, show_all_input, show_test, InputRecord};

use crate::buffer::{EntryStatus, ScriptBuffer, SkipCause};
use crate::command::{Command, Verb};
use crate::config::InterpreterConfig;
use crate::context::ContextStore;
use crate::dispatcher::ActionDispatcher;
use crate::errors::VisionError;
use crate::parser::parse_line;
use crate::store::ScriptStore;
use executor::{EntryResult, Executor, RunContext};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    /// Stopped on a breakpoint, after `Next command`, or on an error.
    /// `Run test` resumes.
    PausedAtBreakpoint,
    AwaitingFileLiteralDecision,
    AwaitingFileLiteralContent,
    Finished,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Pause on breakpoints and errors; ask about missing file literals.
    Interactive,
    /// Run to the end; the first error skips everything after it.
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunLimit {
    ToEnd,
    One,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntrySite {
    Script { buffer: usize, index: usize },
    Prompt { index: usize },
}

/// The file literal being asked about or collected.
#[derive(Debug, Clone)]
struct PendingFile {
    site: EntrySite,
    name: String,
    path: PathBuf,
    lines: Vec<String>,
    resume: Option<RunLimit>,
}

pub struct Interpreter {
    exec: Executor,
    buffers: Vec<ScriptBuffer>,
    active: Option<usize>,
    prompt: ScriptBuffer,
    state: RunState,
    mode: RunMode,
    pending_file: Option<PendingFile>,
    /// The breakpoint the run last stopped at, so resuming passes it.
    paused_at: Option<(usize, usize)>,
    typed_lines: usize,
}

impl Interpreter {
    pub fn new(
        dispatcher: Arc<dyn ActionDispatcher>,
        store: Arc<dyn ScriptStore>,
        config: InterpreterConfig,
    ) -> Self {
        let mode = if config.interactive {
            RunMode::Interactive
        } else {
            RunMode::Finish
        };
        Self {
            exec: Executor::new(dispatcher, store, config),
            buffers: Vec::new(),
            active: None,
            prompt: ScriptBuffer::interactive(),
            state: RunState::Idle,
            mode,
            pending_file: None,
            paused_at: None,
            typed_lines: 0,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.exec.config
    }

    pub fn contexts(&self) -> &ContextStore {
        &self.exec.contexts
    }

    pub fn input_log(&self) -> &[InputRecord] {
        &self.exec.log
    }

    pub fn requirement(&self, path: &str) -> Option<&RequireRecord> {
        self.exec.requires.get(path)
    }

    pub fn active_buffer(&self) -> Option<&ScriptBuffer> {
        self.active.and_then(|i| self.buffers.get(i))
    }

    pub fn prompt_buffer(&self) -> &ScriptBuffer {
        &self.prompt
    }

    /// Process one line of user input.
    ///
    /// Lines that do not parse or nest are rejected with an error and change
    /// nothing; everything else reports through the returned events.
    #[instrument(level = "debug", skip(self), fields(state = ?self.state))]
    pub async fn submit(&mut self, line: &str) -> Result<Vec<Event>, VisionError> {
        match self.state {
            RunState::Quit => Err(VisionError::SessionClosed),
            RunState::AwaitingFileLiteralDecision => self.file_decision(line).await,
            RunState::AwaitingFileLiteralContent => self.file_content(line).await,
            _ => self.command(line).await,
        }
    }

    /// Load `path` and run it to the end in the current mode.
    pub async fn run_script(&mut self, path: &str) -> Result<Vec<Event>, VisionError> {
        let mut events = self.load(path).await?;
        events.extend(self.run(RunLimit::ToEnd).await?);
        Ok(events)
    }

    async fn command(&mut self, line: &str) -> Result<Vec<Event>, VisionError> {
        let text = line.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        self.typed_lines += 1;
        let command = parse_line(text, self.typed_lines)?;

        if command.verb.is_interpreter() {
            let result = self.interpreter_verb(&command).await;
            self.exec.log.push(InputRecord {
                origin: Origin::Prompt,
                line: self.typed_lines,
                depth: 0,
                text: command.text.clone(),
                verb: Some(command.verb),
                status: if result.is_ok() {
                    OutcomeStatus::Passed
                } else {
                    OutcomeStatus::Failed
                },
                error: result.as_ref().err().map(|e| e.to_string()),
            });
            return result;
        }

        let index = self.prompt.push_command(command, self.typed_lines)?;
        self.run_prompt_entry(index).await
    }

    async fn run_prompt_entry(&mut self, index: usize) -> Result<Vec<Event>, VisionError> {
        let ctx = self.prompt_context();
        let result = self.exec.run_entry(&mut self.prompt, index, &ctx).await;
        let mut events = self.exec.take_events();
        match result {
            EntryResult::Failed(_) => {
                if let Some(id) = self.prompt.entry(index).and_then(|e| e.placement.opened) {
                    self.prompt.abandon_scope(id);
                }
                self.prompt.advance();
            }
            EntryResult::NeedsFile { name, path } => {
                events.push(self.ask_about_file(EntrySite::Prompt { index }, name, path, None));
            }
            EntryResult::Done | EntryResult::Skipped => {}
        }
        Ok(events)
    }

    /// Commands typed while a script is paused inside a scope run in that
    /// scope, and are logged at its depth so `Save test` nests them there.
    fn prompt_context(&self) -> RunContext {
        let active = self.active_buffer();
        RunContext {
            origin: Origin::Prompt,
            interactive: self.mode == RunMode::Interactive,
            typed: true,
            fallback_root: active.and_then(ScriptBuffer::innermost_root),
            depth_offset: active.map_or(0, |b| b.runtime_scopes().len()),
        }
    }

    fn script_context(&self, buffer: usize) -> RunContext {
        RunContext {
            origin: Origin::Script(self.buffers[buffer].name().to_string()),
            interactive: self.mode == RunMode::Interactive,
            typed: false,
            fallback_root: None,
            depth_offset: 0,
        }
    }

    async fn interpreter_verb(&mut self, command: &Command) -> Result<Vec<Event>, VisionError> {
        match command.verb {
            Verb::LoadTest => self.load(command.literal().unwrap_or_default()).await,
            Verb::RunTest => self.run(RunLimit::ToEnd).await,
            Verb::NextCommand => self.run(RunLimit::One).await,
            Verb::Finish => {
                info!("Switching to Finish mode");
                self.mode = RunMode::Finish;
                if self.active.is_some() {
                    self.run(RunLimit::ToEnd).await
                } else {
                    self.state = RunState::Finished;
                    Ok(vec![Event::Finished(RunSummary::default())])
                }
            }
            Verb::Skip => {
                let count = match command.literal() {
                    Some(n) => n.trim().parse::<usize>().map_err(|_| {
                        VisionError::InvalidCommand(format!("{n:?} is not a number of commands"))
                    })?,
                    None => 1,
                };
                let buffer = self.active_mut()?;
                buffer.skip(count)?;
                Ok(vec![Event::Message(format!("Skipping the next {count} command(s)"))])
            }
            Verb::Break => self.toggle_breakpoint(command.literal().unwrap_or_default()),
            Verb::SaveTest => self.save(command.literal()).await,
            Verb::ShowTest => Ok(vec![Event::Listing(show_test(self.active_ref()?))]),
            Verb::ShowInput => Ok(vec![Event::Listing(save_lines(&self.exec.log))]),
            Verb::ShowAllInput => Ok(vec![Event::Listing(show_all_input(&self.exec.log))]),
            Verb::ShowContext => Ok(vec![Event::Listing(
                self.exec
                    .contexts
                    .entries()
                    .map(|(name, entry)| {
                        format!(
                            "{name}: {} ({})",
                            entry.handle.description, entry.handle.element
                        )
                    })
                    .collect(),
            )]),
            Verb::Quit => {
                info!("Session ended");
                self.state = RunState::Quit;
                Ok(vec![Event::Goodbye])
            }
            other => Err(VisionError::InvalidCommand(format!(
                "\"{other}\" is not an interpreter command"
            ))),
        }
    }

    fn active_ref(&self) -> Result<&ScriptBuffer, VisionError> {
        self.active_buffer()
            .ok_or_else(|| VisionError::InvalidCommand("No test is loaded".to_string()))
    }

    fn active_mut(&mut self) -> Result<&mut ScriptBuffer, VisionError> {
        self.active
            .and_then(|i| self.buffers.get_mut(i))
            .ok_or_else(|| VisionError::InvalidCommand("No test is loaded".to_string()))
    }

    async fn load(&mut self, path: &str) -> Result<Vec<Event>, VisionError> {
        if let Some(existing) = self.buffers.iter().position(|b| b.name() == path) {
            self.active = Some(existing);
            self.paused_at = None;
            if self.state != RunState::Finished {
                self.state = RunState::Idle;
            }
            return Ok(vec![Event::Message(format!("Switched to {path}"))]);
        }

        let source = self.exec.store.read_script(path).await?;
        let buffer = ScriptBuffer::from_source(path, &source);
        let message = format!("Loaded {path}: {} commands", buffer.entries().len());
        info!("{message}");
        self.buffers.push(buffer);
        self.active = Some(self.buffers.len() - 1);
        self.paused_at = None;
        self.state = RunState::Idle;
        Ok(vec![Event::Message(message)])
    }

    fn toggle_breakpoint(&mut self, target: &str) -> Result<Vec<Event>, VisionError> {
        let target = target.trim();
        let (buffer, spec) = match target.rsplit_once(':') {
            Some((file, line)) => {
                let index = self
                    .buffers
                    .iter()
                    .position(|b| b.name() == file)
                    .ok_or_else(|| VisionError::InvalidCommand(format!("{file} is not loaded")))?;
                (&mut self.buffers[index], line.trim())
            }
            None => (self.active_mut()?, target),
        };

        if let Ok(line) = spec.parse::<usize>() {
            let set = buffer.toggle_breakpoint_line(line)?;
            let verb = if set { "set" } else { "cleared" };
            return Ok(vec![Event::Message(format!(
                "Breakpoint {verb} on line {line} of {}",
                buffer.name()
            ))]);
        }
        match Verb::from_keyword(spec) {
            Some(verb) => {
                let count = buffer.toggle_breakpoint_verb(verb);
                Ok(vec![Event::Message(format!(
                    "Toggled {count} breakpoint(s) on \"{verb}\" in {}",
                    buffer.name()
                ))])
            }
            None => Err(VisionError::InvalidCommand(format!(
                "{spec:?} is neither a line number nor a verb"
            ))),
        }
    }

    async fn save(&mut self, path: Option<&str>) -> Result<Vec<Event>, VisionError> {
        let path = match path {
            Some(p) => p.to_string(),
            None => self.active_ref()?.name().to_string(),
        };
        let lines = save_lines(&self.exec.log);
        let mut contents = lines.join("\n");
        contents.push('\n');
        self.exec.store.write_script(&path, &contents).await?;
        info!("Saved {} lines to {path}", lines.len());
        Ok(vec![Event::Message(format!(
            "Saved {} commands to {path}",
            lines.len()
        ))])
    }

    async fn run(&mut self, limit: RunLimit) -> Result<Vec<Event>, VisionError> {
        let Some(b) = self.active else {
            return Err(VisionError::InvalidCommand("No test is loaded".to_string()));
        };
        self.state = RunState::Running;
        let ctx = self.script_context(b);
        let mut events = Vec::new();

        loop {
            let Some(index) = self.buffers[b].next_index() else {
                events.extend(self.end_of_script(b).await);
                break;
            };

            let entry = &self.buffers[b].entries()[index];
            if self.mode == RunMode::Interactive
                && limit == RunLimit::ToEnd
                && entry.breakpoint
                && self.paused_at != Some((b, index))
            {
                debug!("Breakpoint at line {}", entry.line);
                events.push(Event::Paused {
                    script: self.buffers[b].name().to_string(),
                    line: Some(entry.line),
                    reason: PauseReason::Breakpoint,
                });
                self.paused_at = Some((b, index));
                self.state = RunState::PausedAtBreakpoint;
                break;
            }
            self.paused_at = None;
            let line = entry.line;

            let result = self.exec.run_entry(&mut self.buffers[b], index, &ctx).await;
            events.extend(self.exec.take_events());
            match result {
                EntryResult::Skipped => {}
                EntryResult::Done if limit == RunLimit::One => {
                    events.push(self.pause(b, line, PauseReason::Step));
                    break;
                }
                EntryResult::Done => {}
                EntryResult::Failed(_) if self.mode == RunMode::Interactive => {
                    events.push(self.pause(b, line, PauseReason::Error));
                    break;
                }
                EntryResult::Failed(_) => {
                    let buffer = &mut self.buffers[b];
                    let skipped = buffer.skip_rest(SkipCause::AfterError);
                    debug!("{skipped} command(s) not executed after the failure");
                    events.extend(self.end_of_script(b).await);
                    break;
                }
                EntryResult::NeedsFile { name, path } => {
                    let site = EntrySite::Script { buffer: b, index };
                    events.push(self.ask_about_file(site, name, path, Some(limit)));
                    break;
                }
            }
        }
        Ok(events)
    }

    fn pause(&mut self, buffer: usize, line: usize, reason: PauseReason) -> Event {
        self.state = RunState::PausedAtBreakpoint;
        Event::Paused {
            script: self.buffers[buffer].name().to_string(),
            line: Some(line),
            reason,
        }
    }

    async fn end_of_script(&mut self, b: usize) -> Vec<Event> {
        let mut events = Vec::new();
        if let Err(e) = self.exec.close_all(&mut self.buffers[b]).await {
            events.push(Event::Message(format!("Could not leave the open scopes: {e}")));
        }
        if self.mode == RunMode::Finish {
            let summary = summarize(&self.buffers[b]);
            info!("{} finished: {summary}", self.buffers[b].name());
            self.state = RunState::Finished;
            events.push(Event::Finished(summary));
        } else {
            self.state = RunState::Idle;
            events.push(Event::Paused {
                script: self.buffers[b].name().to_string(),
                line: None,
                reason: PauseReason::EndOfScript,
            });
        }
        events
    }

    fn ask_about_file(
        &mut self,
        site: EntrySite,
        name: String,
        path: PathBuf,
        resume: Option<RunLimit>,
    ) -> Event {
        self.state = RunState::AwaitingFileLiteralDecision;
        // The entry reruns once the file exists; its breakpoint is already passed.
        if let EntrySite::Script { buffer, index } = site {
            self.paused_at = Some((buffer, index));
        }
        self.pending_file = Some(PendingFile {
            site,
            name: name.clone(),
            path: path.clone(),
            lines: Vec::new(),
            resume,
        });
        Event::Prompt(Prompt::CreateOrAccept { name, path })
    }

    async fn file_decision(&mut self, line: &str) -> Result<Vec<Event>, VisionError> {
        let Some(pending) = self.pending_file.clone() else {
            self.state = RunState::Idle;
            return Ok(Vec::new());
        };
        match line.trim().chars().next().map(|c| c.to_ascii_lowercase()) {
            Some('c') => {
                self.state = RunState::AwaitingFileLiteralContent;
                Ok(vec![Event::Prompt(Prompt::FileLine {
                    line: 1,
                    name: pending.name,
                    path: pending.path,
                })])
            }
            Some('a') => {
                self.pending_file = None;
                let error = VisionError::FileLiteralMissing {
                    name: pending.name,
                    path: pending.path,
                };
                let ctx = match pending.site {
                    EntrySite::Script { buffer, index } => {
                        let ctx = self.script_context(buffer);
                        self.exec
                            .reject_entry(&mut self.buffers[buffer], index, &ctx, error);
                        ctx
                    }
                    EntrySite::Prompt { index } => {
                        let ctx = self.prompt_context();
                        self.exec.reject_entry(&mut self.prompt, index, &ctx, error);
                        ctx
                    }
                };
                debug!("Accepted a missing file literal in {}", ctx.origin);
                let mut events = self.exec.take_events();
                events.extend(self.resume(pending.resume).await?);
                Ok(events)
            }
            _ => Ok(vec![
                Event::Message("Please answer C or A".to_string()),
                Event::Prompt(Prompt::CreateOrAccept {
                    name: pending.name,
                    path: pending.path,
                }),
            ]),
        }
    }

    async fn file_content(&mut self, line: &str) -> Result<Vec<Event>, VisionError> {
        let Some(pending) = self.pending_file.as_mut() else {
            self.state = RunState::Idle;
            return Ok(Vec::new());
        };
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim() != end_of_file(&pending.name) {
            pending.lines.push(line.to_string());
            return Ok(vec![Event::Prompt(Prompt::FileLine {
                line: pending.lines.len() + 1,
                name: pending.name.clone(),
                path: pending.path.clone(),
            })]);
        }

        let Some(pending) = self.pending_file.take() else {
            return Ok(Vec::new());
        };
        let mut contents = pending.lines.join("\n");
        contents.push('\n');
        self.exec.store.write_upload(&pending.name, &contents).await?;
        info!("Created {} ({} lines)", pending.path.display(), pending.lines.len());

        let mut events = vec![Event::Message(format!(
            "Created {}",
            pending.path.display()
        ))];
        match pending.site {
            EntrySite::Prompt { index } => {
                self.state = RunState::Idle;
                events.extend(self.run_prompt_entry(index).await?);
            }
            EntrySite::Script { .. } => events.extend(self.resume(pending.resume).await?),
        }
        Ok(events)
    }

    async fn resume(&mut self, limit: Option<RunLimit>) -> Result<Vec<Event>, VisionError> {
        match limit {
            Some(limit) => self.run(limit).await,
            None => {
                self.state = RunState::Idle;
                Ok(Vec::new())
            }
        }
    }
}

fn summarize(buffer: &ScriptBuffer) -> RunSummary {
    let mut summary = RunSummary::default();
    for entry in buffer.entries() {
        match entry.status {
            EntryStatus::Executed => summary.passed += 1,
            EntryStatus::Error => summary.failed += 1,
            EntryStatus::Skipped(_) | EntryStatus::Pending => summary.skipped += 1,
        }
    }
    summary
}
