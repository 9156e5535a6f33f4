use crate::command::{Command, Verb};
use crate::dispatcher::ElementRef;
use crate::errors::VisionError;
use crate::parser::parse_line;
use crate::scope::{split_indent, IndentPolicy, Placement, ScopeId, ScopeKind, ScopeTracker, ScopeTree};
use tracing::debug;

pub const PROMPT_BUFFER: &str = "<interactive>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipCause {
    /// Passed over with `Skip`.
    Skip,
    /// Inside a scope that never opened.
    ScopeSkipped,
    /// Not reached because an earlier command failed in Finish mode.
    AfterError,
    /// Marked `is skipped because ...`, directly or through its scope.
    ByDesign(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    Pending,
    Executed,
    Skipped(SkipCause),
    Error,
}

#[derive(Debug, Clone)]
pub struct BufferEntry {
    pub line: usize,
    pub text: String,
    pub parsed: Result<Command, VisionError>,
    pub placement: Placement,
    pub status: EntryStatus,
    pub breakpoint: bool,
    pub error: Option<VisionError>,
}

impl BufferEntry {
    pub fn verb(&self) -> Option<Verb> {
        self.parsed.as_ref().ok().map(|c| c.verb)
    }

    pub fn depth(&self) -> usize {
        self.placement.depth
    }
}

/// A scope whose opening command has run.
#[derive(Debug, Clone)]
pub struct RuntimeScope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub name: Option<String>,
    pub root: ElementRef,
    /// Where to navigate back to when the scope closes.
    pub return_url: Option<String>,
}

/// One loaded script (or the prompt) with its run position.
#[derive(Debug, Clone)]
pub struct ScriptBuffer {
    name: String,
    entries: Vec<BufferEntry>,
    cursor: usize,
    tracker: ScopeTracker,
    runtime: Vec<RuntimeScope>,
}

impl ScriptBuffer {
    /// Parse a whole script. Lines that fail to parse or nest are kept as
    /// errors so the run reports them where they occur.
    pub fn from_source(name: &str, source: &str) -> Self {
        let mut buffer = Self::empty(name, IndentPolicy::Strict);
        for (i, raw) in source.lines().enumerate() {
            let line = i + 1;
            if raw.trim().is_empty() {
                continue;
            }
            let entry = buffer.place_source_line(raw, line);
            buffer.entries.push(entry);
        }
        debug!(
            "Loaded {} with {} commands and {} scopes",
            name,
            buffer.entries.len(),
            buffer.tracker.tree().len()
        );
        buffer
    }

    /// The buffer commands typed at the prompt are appended to.
    pub fn interactive() -> Self {
        Self::empty(PROMPT_BUFFER, IndentPolicy::Implicit)
    }

    fn empty(name: &str, policy: IndentPolicy) -> Self {
        Self {
            name: name.to_string(),
            entries: Vec::new(),
            cursor: 0,
            tracker: ScopeTracker::new(policy),
            runtime: Vec::new(),
        }
    }

    fn place_source_line(&mut self, raw: &str, line: usize) -> BufferEntry {
        let (depth, text) = match split_indent(raw, line) {
            Ok(split) => split,
            Err(e) => return self.broken_entry(line, raw.trim(), 0, e),
        };
        let command = match parse_line(&text, line) {
            Ok(c) if c.verb.is_interpreter() => {
                let e = VisionError::parse(
                    line,
                    format!("\"{}\" can only be typed at the prompt", c.verb),
                );
                return self.broken_entry(line, &text, depth, e);
            }
            Ok(c) => c,
            Err(e) => return self.broken_entry(line, &text, depth, e),
        };
        match self.tracker.place(line, depth, &command) {
            Ok(placement) => BufferEntry {
                line,
                text,
                parsed: Ok(command),
                placement,
                status: EntryStatus::Pending,
                breakpoint: false,
                error: None,
            },
            Err(e) => self.broken_entry(line, &text, depth, e),
        }
    }

    fn broken_entry(&self, line: usize, text: &str, depth: usize, error: VisionError) -> BufferEntry {
        let open = self.tracker.open_scopes();
        BufferEntry {
            line,
            text: text.to_string(),
            parsed: Err(error),
            placement: Placement {
                depth,
                path: open[..depth.min(open.len())].to_vec(),
                closed: Vec::new(),
                opened: None,
            },
            status: EntryStatus::Pending,
            breakpoint: false,
            error: None,
        }
    }

    /// Append a command typed at the prompt. Nesting errors reject it.
    pub fn push_command(&mut self, command: Command, line: usize) -> Result<usize, VisionError> {
        let placement = self.tracker.place(line, 0, &command)?;
        self.entries.push(BufferEntry {
            line,
            text: command.text.clone(),
            parsed: Ok(command),
            placement,
            status: EntryStatus::Pending,
            breakpoint: false,
            error: None,
        });
        Ok(self.entries.len() - 1)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[BufferEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&BufferEntry> {
        self.entries.get(index)
    }

    pub fn tree(&self) -> &ScopeTree {
        self.tracker.tree()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Index of the next entry to run, if any remain.
    pub fn next_index(&self) -> Option<usize> {
        (self.cursor < self.entries.len()).then_some(self.cursor)
    }

    pub fn remaining(&self) -> &[BufferEntry] {
        &self.entries[self.cursor.min(self.entries.len())..]
    }

    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1).min(self.entries.len());
    }

    pub fn set_status(&mut self, index: usize, status: EntryStatus, error: Option<VisionError>) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.status = status;
            entry.error = error;
        }
    }

    /// Mark the next `count` unsettled entries as skipped.
    pub fn skip(&mut self, count: usize) -> Result<Vec<usize>, VisionError> {
        let targets: Vec<usize> = (self.cursor..self.entries.len())
            .filter(|i| matches!(self.entries[*i].status, EntryStatus::Pending | EntryStatus::Error))
            .take(count)
            .collect();
        if targets.len() < count {
            return Err(VisionError::InvalidCommand(format!(
                "Cannot skip {count} commands: only {} remain in {}",
                targets.len(),
                self.name
            )));
        }
        for i in &targets {
            self.entries[*i].status = EntryStatus::Skipped(SkipCause::Skip);
        }
        Ok(targets)
    }

    /// Everything still pending after the cursor is skipped and the run ends.
    pub fn skip_rest(&mut self, cause: SkipCause) -> usize {
        let start = (self.cursor + 1).min(self.entries.len());
        let mut count = 0;
        for entry in &mut self.entries[start..] {
            if entry.status == EntryStatus::Pending {
                entry.status = EntryStatus::Skipped(cause.clone());
                count += 1;
            }
        }
        self.cursor = self.entries.len();
        count
    }

    /// Toggle the breakpoint on the entry written on `line`; returns the new state.
    pub fn toggle_breakpoint_line(&mut self, line: usize) -> Result<bool, VisionError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.line == line)
            .ok_or_else(|| {
                VisionError::InvalidCommand(format!("{} has no command on line {line}", self.name))
            })?;
        entry.breakpoint = !entry.breakpoint;
        Ok(entry.breakpoint)
    }

    /// Toggle breakpoints on every remaining entry using `verb`; returns how many.
    pub fn toggle_breakpoint_verb(&mut self, verb: Verb) -> usize {
        let start = self.cursor.min(self.entries.len());
        let mut count = 0;
        for entry in &mut self.entries[start..] {
            if entry.verb() == Some(verb) {
                entry.breakpoint = !entry.breakpoint;
                count += 1;
            }
        }
        count
    }

    /// Undo the opening of `id` at the prompt when its command failed.
    pub fn abandon_scope(&mut self, id: ScopeId) -> bool {
        self.tracker.abandon(id)
    }

    pub fn runtime_scopes(&self) -> &[RuntimeScope] {
        &self.runtime
    }

    pub fn is_open(&self, id: ScopeId) -> bool {
        self.runtime.iter().any(|s| s.id == id)
    }

    pub fn open_runtime(&mut self, scope: RuntimeScope) {
        self.runtime.push(scope);
    }

    /// Close `id` and anything opened inside it, innermost first.
    pub fn close_runtime(&mut self, id: ScopeId) -> Vec<RuntimeScope> {
        match self.runtime.iter().position(|s| s.id == id) {
            Some(pos) => self.runtime.drain(pos..).rev().collect(),
            None => Vec::new(),
        }
    }

    pub fn close_all_runtime(&mut self) -> Vec<RuntimeScope> {
        self.runtime.drain(..).rev().collect()
    }

    /// Root of the innermost open scope.
    pub fn innermost_root(&self) -> Option<ElementRef> {
        self.runtime.last().map(|s| s.root.clone())
    }

    pub fn scope_names(&self) -> Vec<String> {
        self.runtime.iter().filter_map(|s| s.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "\
Navigate 'example.test'
Test the 'Login' table
    Type 'selenium' in the 'Username' textfield
    Click the 'Go' button

Click the 'Logout' link
";

    #[test]
    fn test_loads_lines_with_placement() {
        let buffer = ScriptBuffer::from_source("login.vision", SCRIPT);
        assert_eq!(buffer.entries().len(), 5);
        let typed = &buffer.entries()[2];
        assert_eq!(typed.line, 3);
        assert_eq!(typed.depth(), 1);
        assert_eq!(typed.placement.path.len(), 1);
        let logout = &buffer.entries()[4];
        assert_eq!(logout.line, 6);
        assert_eq!(logout.placement.closed.len(), 1);
    }

    #[test]
    fn test_bad_lines_are_kept_as_errors() {
        let buffer = ScriptBuffer::from_source(
            "bad.vision",
            "Click the 'Go' button\n  Click the 'x' button\nWobble\nRun test\n",
        );
        let entries = buffer.entries();
        assert!(matches!(entries[1].parsed, Err(VisionError::StructuralIndent { line: 2, .. })));
        assert!(matches!(entries[2].parsed, Err(VisionError::Parse { line: 3, .. })));
        assert!(matches!(entries[3].parsed, Err(VisionError::Parse { line: 4, .. })));
    }

    #[test]
    fn test_skip_marks_exactly_k() {
        let mut buffer = ScriptBuffer::from_source("login.vision", SCRIPT);
        buffer.advance();
        let skipped = buffer.skip(2).unwrap();
        assert_eq!(skipped, vec![1, 2]);
        assert_eq!(buffer.entries()[0].status, EntryStatus::Pending);
        assert_eq!(buffer.entries()[3].status, EntryStatus::Pending);
        assert!(buffer.skip(5).is_err());
        assert_eq!(buffer.entries()[3].status, EntryStatus::Pending);
    }

    #[test]
    fn test_breakpoints() {
        let mut buffer = ScriptBuffer::from_source("login.vision", SCRIPT);
        assert!(buffer.toggle_breakpoint_line(4).unwrap());
        assert!(!buffer.toggle_breakpoint_line(4).unwrap());
        assert!(buffer.toggle_breakpoint_line(5).is_err());
        assert_eq!(buffer.toggle_breakpoint_verb(Verb::Click), 2);
        assert!(buffer.entries()[3].breakpoint);
        assert!(buffer.entries()[4].breakpoint);
    }

    #[test]
    fn test_skip_rest_leaves_current_entry() {
        let mut buffer = ScriptBuffer::from_source("login.vision", SCRIPT);
        buffer.advance();
        buffer.set_status(1, EntryStatus::Error, None);
        assert_eq!(buffer.skip_rest(SkipCause::AfterError), 3);
        assert_eq!(buffer.entries()[1].status, EntryStatus::Error);
        assert_eq!(
            buffer.entries()[4].status,
            EntryStatus::Skipped(SkipCause::AfterError)
        );
        assert_eq!(buffer.next_index(), None);
    }

    #[test]
    fn test_prompt_buffer_nests_implicitly() {
        let mut prompt = ScriptBuffer::interactive();
        let test = parse_line("Test 'typed'", 1).unwrap();
        let click = parse_line("Click the 'Go' button", 2).unwrap();
        prompt.push_command(test, 1).unwrap();
        let idx = prompt.push_command(click, 2).unwrap();
        assert_eq!(prompt.entry(idx).unwrap().depth(), 1);
        let end = parse_line("End require", 3).unwrap();
        assert!(prompt.push_command(end, 3).is_err());
        assert_eq!(prompt.entries().len(), 2);
    }
}
