//! Indentation-driven scope nesting.
//!
//! Script files nest `Test` and `Require` blocks by indenting their bodies one
//! [`INDENT_UNIT`] deeper. The tracker is a plain stack machine: each line's
//! depth is compared with the open stack, scopes are closed on dedent or by
//! `End test` / `End require`, and a rejected line leaves the stack untouched.

use crate::command::{Command, NounSpec, Verb};
use crate::errors::VisionError;
use serde::Serialize;

/// Spaces per nesting level. Tabs count as one level each.
pub const INDENT_UNIT: usize = 4;

/// Split a raw line into its nesting depth and the command text.
pub fn split_indent(raw: &str, line: usize) -> Result<(usize, String), VisionError> {
    let trimmed = raw.trim_start_matches([' ', '\t']);
    let spaces: usize = raw[..raw.len() - trimmed.len()]
        .chars()
        .map(|c| if c == '\t' { INDENT_UNIT } else { 1 })
        .sum();
    if spaces % INDENT_UNIT != 0 {
        return Err(VisionError::indent(
            line,
            format!("Indentation of {spaces} spaces is not a multiple of {INDENT_UNIT}"),
        ));
    }
    Ok((spaces / INDENT_UNIT, trimmed.trim_end().to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ScopeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScopeKind {
    Test,
    Require,
}

impl ScopeKind {
    fn of(verb: Verb) -> Option<ScopeKind> {
        match verb {
            Verb::Test | Verb::EndTest => Some(ScopeKind::Test),
            Verb::Require | Verb::EndRequire => Some(ScopeKind::Require),
            _ => None,
        }
    }
}

/// What a scope's body is resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeBinding {
    /// The enclosing scope's root.
    Inherit,
    /// A noun chain searched inside the enclosing scope's root.
    Chain(Vec<NounSpec>),
    /// The document root, whatever encloses the scope.
    Global,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub name: Option<String>,
    pub binding: ScopeBinding,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    pub line: usize,
    pub skip_reason: Option<String>,
}

/// Every scope a buffer has opened, indexed by [`ScopeId`].
#[derive(Debug, Clone, Default)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
}

impl ScopeTree {
    pub fn get(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// The first skip reason found walking outwards from `id`.
    pub fn skip_reason(&self, id: ScopeId) -> Option<&str> {
        let mut current = self.get(id);
        while let Some(scope) = current {
            if let Some(reason) = &scope.skip_reason {
                return Some(reason);
            }
            current = scope.parent.and_then(|p| self.get(p));
        }
        None
    }

    fn open(&mut self, parent: Option<ScopeId>, command: &Command, line: usize) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        let kind = ScopeKind::of(command.verb).unwrap_or(ScopeKind::Test);
        let binding = match kind {
            ScopeKind::Require => ScopeBinding::Global,
            ScopeKind::Test if command.nouns.is_empty() => ScopeBinding::Inherit,
            ScopeKind::Test => ScopeBinding::Chain(command.nouns.clone()),
        };
        self.scopes.push(Scope {
            id,
            kind,
            name: command.scope_name(),
            binding,
            parent,
            children: Vec::new(),
            line,
            skip_reason: command.skip_reason.clone(),
        });
        if let Some(parent) = parent.and_then(|p| self.scopes.get_mut(p.0)) {
            parent.children.push(id);
        }
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndentPolicy {
    /// Script files: depth must match the open stack exactly.
    Strict,
    /// The prompt: indentation is ignored and only `End ...` closes a scope.
    Implicit,
}

/// Where an accepted line sits.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Placement {
    /// Nesting depth used when the line is written back out.
    pub depth: usize,
    /// Scopes enclosing the line, outermost first.
    pub path: Vec<ScopeId>,
    /// Scopes this line closes, innermost first.
    pub closed: Vec<ScopeId>,
    /// The scope this line opens, for `Test` and `Require`.
    pub opened: Option<ScopeId>,
}

#[derive(Debug, Clone)]
pub struct ScopeTracker {
    policy: IndentPolicy,
    tree: ScopeTree,
    open: Vec<ScopeId>,
}

impl ScopeTracker {
    pub fn new(policy: IndentPolicy) -> Self {
        Self {
            policy,
            tree: ScopeTree::default(),
            open: Vec::new(),
        }
    }

    pub fn policy(&self) -> IndentPolicy {
        self.policy
    }

    pub fn tree(&self) -> &ScopeTree {
        &self.tree
    }

    pub fn open_scopes(&self) -> &[ScopeId] {
        &self.open
    }

    /// Place a parsed line at `depth`. On error nothing changes.
    pub fn place(
        &mut self,
        line: usize,
        depth: usize,
        command: &Command,
    ) -> Result<Placement, VisionError> {
        let (mut open, mut closed, depth) = match self.policy {
            IndentPolicy::Strict => {
                if depth > self.open.len() {
                    let message = if self.open.is_empty() {
                        "Unexpected indent: only the body of a test or require is indented"
                            .to_string()
                    } else {
                        format!(
                            "Unexpected indent: expected at most {} levels",
                            self.open.len()
                        )
                    };
                    return Err(VisionError::indent(line, message));
                }
                let mut open = self.open.clone();
                let closed: Vec<ScopeId> = open.drain(depth..).rev().collect();
                (open, closed, depth)
            }
            IndentPolicy::Implicit => (self.open.clone(), Vec::new(), self.open.len()),
        };

        let mut depth = depth;
        if command.verb.closes_scope() {
            let kind = ScopeKind::of(command.verb).unwrap_or(ScopeKind::Test);
            let wanted = command.literal();
            let matches = |id: &ScopeId| {
                self.tree.get(*id).is_some_and(|scope| {
                    scope.kind == kind
                        && wanted.map_or(true, |name| scope.name.as_deref() == Some(name))
                })
            };
            if let Some(position) = open.iter().rposition(|id| matches(id)) {
                if self.policy == IndentPolicy::Strict && position + 1 != open.len() {
                    if let Some(inner) = open.last().and_then(|id| self.tree.get(*id)) {
                        return Err(VisionError::indent(
                            line,
                            format!(
                                "\"{}\" would leave the scope opened on line {} unfinished",
                                command.verb, inner.line
                            ),
                        ));
                    }
                }
                closed.extend(open.drain(position..).rev());
                depth = open.len();
            } else if !closed.last().is_some_and(|id| matches(id)) {
                // An `End` written at the parent's depth ends the block its dedent just closed.
                let what = match kind {
                    ScopeKind::Test => "test",
                    ScopeKind::Require => "require",
                };
                let message = match wanted {
                    Some(name) => format!("There is no open {what} named {name:?} to end"),
                    None => format!("There is no open {what} to end"),
                };
                return Err(VisionError::indent(line, message));
            }
        }

        let path = open.clone();
        let opened = if command.verb.opens_scope() {
            let id = self.tree.open(path.last().copied(), command, line);
            open.push(id);
            Some(id)
        } else {
            None
        };

        self.open = open;
        Ok(Placement {
            depth,
            path,
            closed,
            opened,
        })
    }

    /// Forget a scope that was just opened, if nothing has been opened inside it.
    pub fn abandon(&mut self, id: ScopeId) -> bool {
        if self.open.last() == Some(&id) {
            self.open.pop();
            true
        } else {
            false
        }
    }
}
