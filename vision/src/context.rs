use crate::command::NounKind;
use crate::dispatcher::ElementRef;
use crate::errors::{ResolutionError, VisionError};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

pub const GLOBAL_CONTEXT: &str = "global";

/// A resolved element, cloned out of the resolver for callers to keep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Handle {
    pub element: ElementRef,
    pub kind: NounKind,
    pub description: String,
    pub document_order: usize,
}

impl Handle {
    pub fn document() -> Self {
        Self {
            element: ElementRef::document(),
            kind: NounKind::Context,
            description: "the page".to_string(),
            document_order: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextEntry {
    pub handle: Handle,
    /// Names of the scopes that were open when the context was bound, outermost first.
    pub scope_chain: Vec<String>,
}

/// Named handles for the lifetime of one interpreter session.
///
/// Entries are never invalidated; binding a name again replaces it.
#[derive(Debug, Clone)]
pub struct ContextStore {
    entries: BTreeMap<String, ContextEntry>,
    global: ContextEntry,
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextStore {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            global: ContextEntry {
                handle: Handle::document(),
                scope_chain: Vec::new(),
            },
        }
    }

    pub fn bind(
        &mut self,
        name: &str,
        handle: Handle,
        scope_chain: Vec<String>,
    ) -> Result<(), VisionError> {
        if is_global(name) {
            return Err(VisionError::InvalidCommand(
                "The \"global\" context cannot be rebound".to_string(),
            ));
        }
        debug!(context = name, element = %handle.element, "binding context");
        self.entries.insert(
            name.to_string(),
            ContextEntry {
                handle,
                scope_chain,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&ContextEntry, ResolutionError> {
        if is_global(name) {
            return Ok(&self.global);
        }
        self.entries
            .get(name)
            .ok_or_else(|| ResolutionError::UndefinedContext(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        is_global(name) || self.entries.contains_key(name)
    }

    /// Every context, `global` first and the rest by name.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ContextEntry)> {
        std::iter::once((GLOBAL_CONTEXT, &self.global))
            .chain(self.entries.iter().map(|(k, v)| (k.as_str(), v)))
    }
}

fn is_global(name: &str) -> bool {
    name.trim().eq_ignore_ascii_case(GLOBAL_CONTEXT)
}
