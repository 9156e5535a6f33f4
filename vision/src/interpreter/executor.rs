//! Runs single buffer entries against the dispatcher.
//!
//! The executor owns everything that outlives one script: the dispatcher,
//! the store, the context cache, which requirements have run and the input
//! log. Buffers are passed in so the interpreter can keep several loaded.

use super::events::{Event, Origin, Outcome, OutcomeStatus};
use super::listing::InputRecord;
use crate::buffer::{BufferEntry, EntryStatus, RuntimeScope, ScriptBuffer, SkipCause};
use crate::command::{Command, NounKind, Verb};
use crate::config::InterpreterConfig;
use crate::context::{ContextStore, Handle};
use crate::dispatcher::{
    ActionArgs, ActionDispatcher, ActionKind, ActionOutcome, ElementRef, FocusTarget,
};
use crate::duration::parse_duration;
use crate::errors::{AutomationError, VisionError};
use crate::resolve::{normalize, Resolver};
use crate::scope::{Placement, ScopeBinding, ScopeId, ScopeKind};
use crate::store::ScriptStore;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// A required script that has been run this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireRecord {
    pub has_run: bool,
    /// The page that was current before the script first ran.
    pub anchor_url: String,
}

/// How the entries of one buffer are being run.
#[derive(Debug, Clone)]
pub(crate) struct RunContext {
    pub origin: Origin,
    /// Missing file literals prompt instead of failing.
    pub interactive: bool,
    /// Typed at the prompt rather than read from a script.
    pub typed: bool,
    /// Root used when the buffer itself has no open scope.
    pub fallback_root: Option<ElementRef>,
    /// Scopes already open around this buffer, added to each logged depth.
    pub depth_offset: usize,
}

#[derive(Debug)]
pub(crate) enum EntryResult {
    Done,
    Skipped,
    Failed(VisionError),
    NeedsFile { name: String, path: PathBuf },
}

pub(crate) struct Executor {
    pub dispatcher: Arc<dyn ActionDispatcher>,
    pub store: Arc<dyn ScriptStore>,
    pub config: InterpreterConfig,
    pub resolver: Resolver,
    pub contexts: ContextStore,
    pub requires: HashMap<String, RequireRecord>,
    pub log: Vec<InputRecord>,
    events: Vec<Event>,
    requiring: Vec<String>,
}

impl Executor {
    pub fn new(
        dispatcher: Arc<dyn ActionDispatcher>,
        store: Arc<dyn ScriptStore>,
        config: InterpreterConfig,
    ) -> Self {
        let resolver = Resolver::new(dispatcher.clone()).with_poll_interval(config.poll_interval());
        Self {
            dispatcher,
            store,
            config,
            resolver,
            contexts: ContextStore::new(),
            requires: HashMap::new(),
            log: Vec::new(),
            events: Vec::new(),
            requiring: Vec::new(),
        }
    }

    /// Outcomes produced since the last call.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Run the entry at `index`. Success and skips advance the cursor; a
    /// failure leaves it on the entry for the caller's error policy.
    pub async fn run_entry(
        &mut self,
        buffer: &mut ScriptBuffer,
        index: usize,
        ctx: &RunContext,
    ) -> EntryResult {
        let Some(entry) = buffer.entry(index).cloned() else {
            return EntryResult::Skipped;
        };
        let started = Instant::now();

        if let Err(e) = self.close_scopes(buffer, &entry.placement.closed).await {
            return self.fail(buffer, index, &entry, ctx, e, started.elapsed());
        }
        if let EntryStatus::Skipped(cause) = &entry.status {
            return self.skip(buffer, index, &entry, ctx, cause.clone());
        }
        let command = match &entry.parsed {
            Ok(command) => command,
            Err(e) => return self.fail(buffer, index, &entry, ctx, e.clone(), started.elapsed()),
        };
        if let Some(cause) = skip_cause(buffer, &entry.placement, command) {
            return self.skip(buffer, index, &entry, ctx, cause);
        }

        let upload = match command.file_literal() {
            Some(name) => match self.store.read_upload(name).await {
                Ok(Some(_)) => Some(self.store.upload_path(name)),
                Ok(None) if ctx.interactive => {
                    return EntryResult::NeedsFile {
                        name: name.to_string(),
                        path: self.store.upload_path(name),
                    }
                }
                Ok(None) => {
                    let e = VisionError::FileLiteralMissing {
                        name: name.to_string(),
                        path: self.store.upload_path(name),
                    };
                    return self.fail(buffer, index, &entry, ctx, e, started.elapsed());
                }
                Err(e) => return self.fail(buffer, index, &entry, ctx, e, started.elapsed()),
            },
            None => None,
        };

        match self
            .execute(buffer, &entry.placement, command, ctx, upload)
            .await
        {
            Ok(()) => {
                buffer.set_status(index, EntryStatus::Executed, None);
                buffer.advance();
                self.report(&entry, ctx, OutcomeStatus::Passed, None, started.elapsed());
                EntryResult::Done
            }
            Err(e) => self.fail(buffer, index, &entry, ctx, e, started.elapsed()),
        }
    }

    /// Record `error` against the entry and move past it.
    pub fn reject_entry(
        &mut self,
        buffer: &mut ScriptBuffer,
        index: usize,
        ctx: &RunContext,
        error: VisionError,
    ) {
        if let Some(entry) = buffer.entry(index).cloned() {
            self.fail(buffer, index, &entry, ctx, error, Duration::ZERO);
            buffer.advance();
        }
    }

    fn skip(
        &mut self,
        buffer: &mut ScriptBuffer,
        index: usize,
        entry: &BufferEntry,
        ctx: &RunContext,
        cause: SkipCause,
    ) -> EntryResult {
        buffer.set_status(index, EntryStatus::Skipped(cause.clone()), None);
        buffer.advance();
        self.report(entry, ctx, OutcomeStatus::Skipped(cause), None, Duration::ZERO);
        EntryResult::Skipped
    }

    fn fail(
        &mut self,
        buffer: &mut ScriptBuffer,
        index: usize,
        entry: &BufferEntry,
        ctx: &RunContext,
        error: VisionError,
        elapsed: Duration,
    ) -> EntryResult {
        buffer.set_status(index, EntryStatus::Error, Some(error.clone()));
        self.report(entry, ctx, OutcomeStatus::Failed, Some(error.clone()), elapsed);
        EntryResult::Failed(error)
    }

    fn report(
        &mut self,
        entry: &BufferEntry,
        ctx: &RunContext,
        status: OutcomeStatus,
        error: Option<VisionError>,
        elapsed: Duration,
    ) {
        let slow = status == OutcomeStatus::Passed && elapsed > self.config.acceptable_wait();
        match &status {
            OutcomeStatus::Passed if slow => warn!(
                "{}:{} took {:.2}s, longer than the acceptable {:?}",
                ctx.origin,
                entry.line,
                elapsed.as_secs_f64(),
                self.config.acceptable_wait()
            ),
            OutcomeStatus::Passed => info!("{}:{} {}", ctx.origin, entry.line, entry.text),
            OutcomeStatus::Failed => warn!(
                "{}:{} {} failed: {}",
                ctx.origin,
                entry.line,
                entry.text,
                error.as_ref().map(|e| e.to_string()).unwrap_or_default()
            ),
            OutcomeStatus::Skipped(cause) => {
                debug!("{}:{} skipped ({cause:?})", ctx.origin, entry.line)
            }
        }

        let locator = match status {
            OutcomeStatus::Failed => entry
                .parsed
                .as_ref()
                .ok()
                .and_then(Command::locator_description),
            _ => None,
        };
        self.log.push(InputRecord {
            origin: ctx.origin.clone(),
            line: entry.line,
            depth: entry.depth() + ctx.depth_offset,
            text: entry.text.clone(),
            verb: entry.verb(),
            status: status.clone(),
            error: error.as_ref().map(|e| e.to_string()),
        });
        self.events.push(Event::Outcome(Outcome {
            origin: ctx.origin.clone(),
            line: entry.line,
            text: entry.text.clone(),
            status,
            elapsed,
            error,
            locator,
            slow,
        }));
    }

    async fn execute(
        &mut self,
        buffer: &mut ScriptBuffer,
        placement: &Placement,
        command: &Command,
        ctx: &RunContext,
        upload: Option<PathBuf>,
    ) -> Result<(), VisionError> {
        let root = buffer
            .innermost_root()
            .or_else(|| ctx.fallback_root.clone())
            .unwrap_or_else(ElementRef::document);
        let within = command
            .within
            .unwrap_or_else(|| self.config.default_within());

        match command.verb {
            Verb::Test => return self.open_test(buffer, placement, command, &root, within).await,
            Verb::Require => return self.open_require(buffer, placement, command, ctx).await,
            // Closing happened before the entry ran.
            Verb::EndTest | Verb::EndRequire => return Ok(()),
            Verb::Navigate => return self.navigate(command.literal().unwrap_or_default()).await,
            Verb::GoBack => {
                self.dispatcher
                    .perform_action(&ElementRef::document(), ActionKind::GoBack, &ActionArgs::default())
                    .await?;
                return Ok(());
            }
            Verb::Wait => {
                let pause = parse_duration(command.literal().unwrap_or_default())
                    .map_err(|e| VisionError::InvalidCommand(e.to_string()))?;
                tokio::time::sleep(pause).await;
                return Ok(());
            }
            Verb::Switch | Verb::Close => return self.focus(command).await,
            Verb::ShouldNotExist => {
                return self
                    .resolver
                    .resolve_absent(&command.nouns, &root, &self.contexts, within)
                    .await
            }
            verb if verb.is_interpreter() => {
                return Err(VisionError::InvalidCommand(format!(
                    "\"{verb}\" can only be typed at the prompt"
                )))
            }
            _ => {}
        }

        let handle = match command.verb {
            Verb::ShouldExist => self.target(command, &root, within).await?,
            Verb::ShouldContain
            | Verb::ShouldContainExactly
            | Verb::ShouldNotContain
            | Verb::ShouldBeChecked
            | Verb::ShouldNotBeChecked => self.verify(command, &root, within).await?,
            _ => {
                let handle = self.target(command, &root, within).await?;
                self.act(command, &handle, upload).await?;
                handle
            }
        };

        if let Some(name) = &command.binding {
            self.contexts.bind(name, handle, buffer.scope_names())?;
        }
        Ok(())
    }

    async fn target(
        &self,
        command: &Command,
        root: &ElementRef,
        within: Duration,
    ) -> Result<Handle, VisionError> {
        if command.nouns.is_empty() {
            return Ok(Handle::document());
        }
        self.resolver
            .resolve_chain(&command.nouns, root, &self.contexts, within)
            .await
    }

    #[instrument(level = "debug", skip(self, command, handle, upload), fields(verb = %command.verb))]
    async fn act(
        &self,
        command: &Command,
        handle: &Handle,
        upload: Option<PathBuf>,
    ) -> Result<(), VisionError> {
        let literal = command.literal().map(str::to_string);
        let (action, args) = match command.verb {
            Verb::Click => (ActionKind::Click, ActionArgs::default()),
            Verb::Hover => (ActionKind::Hover, ActionArgs::default()),
            Verb::Clear => (ActionKind::Clear, ActionArgs::default()),
            Verb::Type => (ActionKind::Type, ActionArgs { text: literal, ..Default::default() }),
            Verb::Push => (ActionKind::Push, ActionArgs { text: literal, ..Default::default() }),
            Verb::Capture => (ActionKind::Capture, ActionArgs { text: literal, ..Default::default() }),
            Verb::Select => (
                ActionKind::Select,
                ActionArgs {
                    text: literal,
                    ordinal: command.ordinal,
                    path: None,
                },
            ),
            Verb::EnterFile => (ActionKind::EnterFile, ActionArgs { path: upload, ..Default::default() }),
            Verb::Accept => (ActionKind::Accept, ActionArgs::default()),
            Verb::Dismiss => (ActionKind::Dismiss, ActionArgs::default()),
            other => {
                return Err(VisionError::InvalidCommand(format!(
                    "\"{other}\" does not act on an element"
                )))
            }
        };
        debug!("{action:?} on {} ({})", handle.description, handle.element);
        self.dispatcher
            .perform_action(&handle.element, action, &args)
            .await?;
        Ok(())
    }

    /// Resolve and check an assertion, polling both until the deadline.
    async fn verify(
        &self,
        command: &Command,
        root: &ElementRef,
        within: Duration,
    ) -> Result<Handle, VisionError> {
        let deadline = Instant::now() + within;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let handle = self
                .resolver
                .resolve_chain(&command.nouns, root, &self.contexts, remaining)
                .await?;
            let failure = match self.check(command, &handle).await {
                Ok(()) => return Ok(handle),
                Err(VisionError::AssertionFailed(message)) => message,
                Err(e) => return Err(e),
            };
            if Instant::now() + self.resolver.poll_interval() > deadline {
                return Err(VisionError::AssertionFailed(failure));
            }
            tokio::time::sleep(self.resolver.poll_interval()).await;
        }
    }

    async fn check(&self, command: &Command, handle: &Handle) -> Result<(), VisionError> {
        match command.verb {
            Verb::ShouldBeChecked | Verb::ShouldNotBeChecked => {
                let wanted = command.verb == Verb::ShouldBeChecked;
                match self.read(&handle.element, ActionKind::ReadChecked).await? {
                    ActionOutcome::Checked(actual) if actual == wanted => Ok(()),
                    ActionOutcome::Checked(_) => Err(VisionError::AssertionFailed(format!(
                        "{} is {}",
                        handle.description,
                        if wanted { "not checked" } else { "checked" }
                    ))),
                    other => Err(unexpected(ActionKind::ReadChecked, other)),
                }
            }
            _ => {
                let expected = normalize(command.literal().unwrap_or_default());
                let actual = match self.read(&handle.element, ActionKind::ReadText).await? {
                    ActionOutcome::Text(text) => normalize(&text),
                    other => return Err(unexpected(ActionKind::ReadText, other)),
                };
                let (holds, complaint) = match command.verb {
                    Verb::ShouldContainExactly => (actual == expected, "is not exactly"),
                    Verb::ShouldNotContain => (!actual.contains(&expected), "contains"),
                    _ => (actual.contains(&expected), "does not contain"),
                };
                if holds {
                    Ok(())
                } else {
                    Err(VisionError::AssertionFailed(format!(
                        "{} reads {actual:?}, which {complaint} {expected:?}",
                        handle.description
                    )))
                }
            }
        }
    }

    async fn read(&self, element: &ElementRef, action: ActionKind) -> Result<ActionOutcome, VisionError> {
        Ok(self
            .dispatcher
            .perform_action(element, action, &ActionArgs::default())
            .await?)
    }

    async fn navigate(&self, target: &str) -> Result<(), VisionError> {
        let url = if target.starts_with('?') || target.starts_with('/') {
            let current = self.dispatcher.current_url().await?;
            join_url(&current, target)
        } else {
            absolute_url(target)
        };
        info!("Navigating to {url}");
        self.dispatcher.navigate_to(&url).await?;
        Ok(())
    }

    async fn focus(&self, command: &Command) -> Result<(), VisionError> {
        let noun = command.target();
        let target = match noun {
            Some(n) => match (&n.literal, n.ordinal) {
                (Some(name), _) => FocusTarget::Named(name.clone()),
                (None, Some(index)) => FocusTarget::Index(index),
                (None, None) => FocusTarget::Default,
            },
            None => FocusTarget::Default,
        };
        match (command.verb, noun.map(|n| &n.kind)) {
            (Verb::Close, _) => self.dispatcher.close_window(&target).await?,
            (_, Some(NounKind::Frame)) => self.dispatcher.switch_frame(&target).await?,
            _ => self.dispatcher.switch_window(&target).await?,
        }
        Ok(())
    }

    async fn open_test(
        &mut self,
        buffer: &mut ScriptBuffer,
        placement: &Placement,
        command: &Command,
        root: &ElementRef,
        within: Duration,
    ) -> Result<(), VisionError> {
        let binding = placement
            .opened
            .and_then(|id| buffer.tree().get(id))
            .map(|scope| scope.binding.clone())
            .unwrap_or(ScopeBinding::Inherit);
        let handle = match &binding {
            ScopeBinding::Chain(chain) => {
                self.resolver
                    .resolve_chain(chain, root, &self.contexts, within)
                    .await?
            }
            ScopeBinding::Global => Handle::document(),
            ScopeBinding::Inherit => Handle {
                element: root.clone(),
                kind: NounKind::Context,
                description: "the current scope".to_string(),
                document_order: 0,
            },
        };

        let name = command.scope_name();
        let implicit = command
            .target()
            .is_some_and(|n| !n.is_context())
            .then(|| name.clone())
            .flatten();
        if let Some(context) = command.binding.clone().or(implicit) {
            self.contexts
                .bind(&context, handle.clone(), buffer.scope_names())?;
        }

        if let Some(id) = placement.opened {
            buffer.open_runtime(RuntimeScope {
                id,
                kind: ScopeKind::Test,
                name,
                root: handle.element,
                return_url: None,
            });
        }
        Ok(())
    }

    async fn open_require(
        &mut self,
        buffer: &mut ScriptBuffer,
        placement: &Placement,
        command: &Command,
        ctx: &RunContext,
    ) -> Result<(), VisionError> {
        let path = command.literal().unwrap_or_default().to_string();
        if self.requires.get(&path).is_some_and(|r| r.has_run) {
            if ctx.typed && ctx.interactive {
                return Err(VisionError::RequireConflict(path));
            }
            info!("Requirement {path} is already met");
            return Ok(());
        }

        let anchor = self.dispatcher.current_url().await?;
        self.run_required(&path).await?;
        self.requires.insert(
            path.clone(),
            RequireRecord {
                has_run: true,
                anchor_url: anchor.clone(),
            },
        );

        if let Some(id) = placement.opened {
            buffer.open_runtime(RuntimeScope {
                id,
                kind: ScopeKind::Require,
                name: Some(path),
                root: ElementRef::document(),
                return_url: Some(anchor),
            });
        }
        Ok(())
    }

    /// Run a required script to completion with no prompts or pauses.
    fn run_required<'a>(
        &'a mut self,
        path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), VisionError>> + Send + 'a>> {
        Box::pin(async move {
            if self.requiring.iter().any(|p| p == path) {
                return Err(VisionError::Script(format!(
                    "{path} requires itself through {}",
                    self.requiring.join(" -> ")
                )));
            }
            info!("Running required script {path}");
            let source = self.store.read_script(path).await?;
            let mut buffer = ScriptBuffer::from_source(path, &source);
            let ctx = RunContext {
                origin: Origin::Required(path.to_string()),
                interactive: false,
                typed: false,
                fallback_root: None,
                depth_offset: 0,
            };

            self.requiring.push(path.to_string());
            let mut result = Ok(());
            while let Some(index) = buffer.next_index() {
                match self.run_entry(&mut buffer, index, &ctx).await {
                    EntryResult::Done | EntryResult::Skipped => {}
                    EntryResult::Failed(e) => {
                        result = Err(e);
                        break;
                    }
                    EntryResult::NeedsFile { name, path } => {
                        result = Err(VisionError::FileLiteralMissing { name, path });
                        break;
                    }
                }
            }
            self.requiring.pop();
            result?;
            self.close_all(&mut buffer).await
        })
    }

    async fn close_scopes(
        &mut self,
        buffer: &mut ScriptBuffer,
        ids: &[ScopeId],
    ) -> Result<(), VisionError> {
        for id in ids {
            for scope in buffer.close_runtime(*id) {
                self.leave(scope).await?;
            }
        }
        Ok(())
    }

    /// Close every scope still open in `buffer`, innermost first.
    pub async fn close_all(&mut self, buffer: &mut ScriptBuffer) -> Result<(), VisionError> {
        for scope in buffer.close_all_runtime() {
            self.leave(scope).await?;
        }
        Ok(())
    }

    async fn leave(&self, scope: RuntimeScope) -> Result<(), VisionError> {
        debug!("Leaving {:?} scope {:?}", scope.kind, scope.name);
        if let Some(url) = scope.return_url {
            self.dispatcher.navigate_to(&url).await?;
        }
        Ok(())
    }
}

/// Why an entry should not run, if it should not.
fn skip_cause(buffer: &ScriptBuffer, placement: &Placement, command: &Command) -> Option<SkipCause> {
    if let Some(missing) = placement.path.iter().find(|id| !buffer.is_open(**id)) {
        return Some(match buffer.tree().skip_reason(*missing) {
            Some(reason) => SkipCause::ByDesign(reason.to_string()),
            None => SkipCause::ScopeSkipped,
        });
    }
    command.skip_reason.clone().map(SkipCause::ByDesign)
}

fn unexpected(action: ActionKind, outcome: ActionOutcome) -> VisionError {
    AutomationError::Internal(format!("{action:?} answered with {outcome:?}")).into()
}

fn absolute_url(target: &str) -> String {
    if target.contains("://") {
        target.to_string()
    } else {
        format!("https://{target}")
    }
}

/// Apply a `?query` or `/path` target to the current URL.
fn join_url(current: &str, target: &str) -> String {
    if let Some(query) = target.strip_prefix('?') {
        let base = current.split(['?', '#']).next().unwrap_or(current);
        return format!("{base}?{query}");
    }
    let origin_end = current
        .find("://")
        .map(|scheme| {
            let host_start = scheme + 3;
            current[host_start..]
                .find('/')
                .map_or(current.len(), |slash| host_start + slash)
        })
        .unwrap_or(current.len());
    format!("{}{target}", &current[..origin_end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_url() {
        assert_eq!(absolute_url("example.test/login"), "https://example.test/login");
        assert_eq!(absolute_url("http://localhost:8080"), "http://localhost:8080");
    }

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://example.test/search?q=old#top", "?q=new"),
            "https://example.test/search?q=new"
        );
        assert_eq!(
            join_url("https://example.test/a/b?x=1", "/c"),
            "https://example.test/c"
        );
        assert_eq!(join_url("https://example.test", "/c"), "https://example.test/c");
    }
}
