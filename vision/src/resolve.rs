//! Noun resolution: turning a noun chain into one element.
//!
//! Each noun kind has a fixed list of places its label may be found, most
//! specific first. A search runs an exact pass over every level and, only if
//! that found nothing anywhere, a prefix pass. The first level with any
//! candidates wins. Ordinals and before/after references then pick one
//! candidate in document order. The whole chain is retried until it resolves
//! or the command's deadline passes.

use crate::command::{describe_chain, NounKind, NounSpec, Side};
use crate::context::{ContextStore, Handle};
use crate::dispatcher::{
    ActionDispatcher, Candidate, ElementRef, LabelQuery, MatchMode, SearchLevel,
};
use crate::errors::{AutomationError, ResolutionError, VisionError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

// Used when a command has no `within`
pub const DEFAULT_WITHIN: Duration = Duration::from_secs(15);

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Label search levels for a kind, most specific first.
///
/// Kinds that are not found by label (alerts, contexts, frames, windows,
/// raw locators and cells) have no levels.
pub fn search_levels(kind: &NounKind) -> &'static [SearchLevel] {
    use SearchLevel::*;
    match kind {
        NounKind::Checkbox | NounKind::RadioButton => {
            &[NativeLabel, AdjacentText, PrecedingCell, Legend]
        }
        NounKind::Textfield | NounKind::Textarea | NounKind::Dropdown | NounKind::FileInput => {
            &[NativeLabel, SameBlock, PreviousCell, PreviousRow, Legend]
        }
        NounKind::Button | NounKind::Link => &[OwnText, Title],
        NounKind::Text => &[OwnText],
        NounKind::Image => &[AltText, Title],
        NounKind::Box => &[Legend],
        NounKind::Table => &[Legend, Caption],
        NounKind::Row => &[CellText, WidgetValue],
        NounKind::Cell
        | NounKind::Alert
        | NounKind::Context
        | NounKind::Frame
        | NounKind::Window
        | NounKind::RawLocator(_) => &[],
    }
}

/// Collapse runs of whitespace so labels compare the way they render.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Clone)]
pub struct Resolver {
    dispatcher: Arc<dyn ActionDispatcher>,
    poll_interval: Duration,
}

impl Resolver {
    pub fn new(dispatcher: Arc<dyn ActionDispatcher>) -> Self {
        Self {
            dispatcher,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Resolve `chain` against `root`, retrying until `within` has passed.
    #[instrument(level = "debug", skip(self, chain, contexts), fields(chain = %describe_chain(chain)))]
    pub async fn resolve_chain(
        &self,
        chain: &[NounSpec],
        root: &ElementRef,
        contexts: &ContextStore,
        within: Duration,
    ) -> Result<Handle, VisionError> {
        let deadline = Instant::now() + within;
        let description = describe_chain(chain);
        loop {
            let last = match self.resolve_once(chain, root, contexts).await {
                Ok(handle) => return Ok(handle),
                Err(e) => retryable(e)?,
            };
            if Instant::now() + self.poll_interval > deadline {
                debug!("Resolution of {description} gave up: {last}");
                return Err(match last {
                    ambiguous @ ResolutionError::Ambiguous { .. } => ambiguous.into(),
                    _ => ResolutionError::Timeout {
                        waited: within,
                        description,
                    }
                    .into(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Wait until `chain` no longer resolves to anything.
    #[instrument(level = "debug", skip(self, chain, contexts), fields(chain = %describe_chain(chain)))]
    pub async fn resolve_absent(
        &self,
        chain: &[NounSpec],
        root: &ElementRef,
        contexts: &ContextStore,
        within: Duration,
    ) -> Result<(), VisionError> {
        let deadline = Instant::now() + within;
        loop {
            match self.resolve_once(chain, root, contexts).await {
                Err(VisionError::Resolution(ResolutionError::NotFound(_))) => return Ok(()),
                Err(VisionError::Automation(AutomationError::ElementNotFound(_)))
                | Err(VisionError::Automation(AutomationError::ElementDetached(_))) => {
                    return Ok(())
                }
                Err(e @ VisionError::AlertBlocking(_))
                | Err(e @ VisionError::Resolution(ResolutionError::UndefinedContext(_))) => {
                    return Err(e)
                }
                Ok(_) | Err(_) => {}
            }
            if Instant::now() + self.poll_interval > deadline {
                return Err(VisionError::AssertionFailed(format!(
                    "{} still exists after {within:?}",
                    describe_chain(chain)
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One attempt at the whole chain, outermost noun first.
    pub async fn resolve_once(
        &self,
        chain: &[NounSpec],
        root: &ElementRef,
        contexts: &ContextStore,
    ) -> Result<Handle, VisionError> {
        let (inner, outer_context) = match chain.split_last() {
            Some((last, rest)) if last.is_context() => (rest, Some(last)),
            _ => (chain, None),
        };

        let mut current = match outer_context {
            Some(ctx) => {
                let name = ctx.literal.as_deref().unwrap_or_default();
                contexts.get(name)?.handle.clone()
            }
            None => Handle {
                element: root.clone(),
                kind: NounKind::Context,
                description: "the current scope".to_string(),
                document_order: 0,
            },
        };

        if let [noun] = inner {
            if noun.kind == NounKind::Alert {
                return self.resolve_alert(noun).await;
            }
        }
        if inner.is_empty() {
            return Ok(current);
        }

        if self
            .dispatcher
            .alert_state()
            .await
            .map_err(VisionError::from)?
            .is_some()
        {
            return Err(VisionError::AlertBlocking(describe_chain(chain)));
        }

        for noun in inner.iter().rev() {
            current = self.resolve_noun(noun, &current.element).await?;
        }
        Ok(current)
    }

    async fn resolve_alert(&self, noun: &NounSpec) -> Result<Handle, VisionError> {
        let alert = self.dispatcher.alert_state().await?;
        let description = noun.to_string();
        let matches = |text: &str| {
            noun.literal
                .as_deref()
                .map_or(true, |wanted| normalize(text).contains(&normalize(wanted)))
        };
        match alert {
            Some(info) if matches(&info.text) => Ok(Handle {
                element: ElementRef::alert(),
                kind: NounKind::Alert,
                description,
                document_order: 0,
            }),
            _ => Err(ResolutionError::NotFound(description).into()),
        }
    }

    /// Resolve one noun inside `root`.
    async fn resolve_noun(&self, noun: &NounSpec, root: &ElementRef) -> Result<Handle, VisionError> {
        if noun.kind == NounKind::Cell {
            return self.resolve_cell(noun, root).await;
        }

        let candidates = self.search(noun, root).await?;
        let reference = match &noun.positional {
            Some(pos) => {
                let order = self.reference_order(&pos.reference, root).await?;
                Some((pos.side, order))
            }
            None => None,
        };
        let chosen = select(noun, candidates, reference)?;
        debug!(
            "Resolved {} to {} (document order {})",
            noun, chosen.element, chosen.document_order
        );
        Ok(Handle {
            element: chosen.element,
            kind: noun.kind.clone(),
            description: noun.to_string(),
            document_order: chosen.document_order,
        })
    }

    /// Document position of a before/after reference, found in the same root.
    async fn reference_order(&self, reference: &NounSpec, root: &ElementRef) -> Result<usize, VisionError> {
        if reference.kind == NounKind::Cell {
            return Ok(self.resolve_cell(reference, root).await?.document_order);
        }
        let candidates = self.search(reference, root).await?;
        Ok(select(reference, candidates, None)?.document_order)
    }

    /// Candidates for one noun from the first level that has any.
    async fn search(&self, noun: &NounSpec, root: &ElementRef) -> Result<Vec<Candidate>, VisionError> {
        let Some(label) = noun.literal.as_deref().map(normalize) else {
            return self
                .find(root, &noun.kind, &LabelQuery::direct(), MatchMode::Exact)
                .await;
        };
        self.search_levels(root, &noun.kind, &label, search_levels(&noun.kind))
            .await
    }

    async fn search_levels(
        &self,
        root: &ElementRef,
        kind: &NounKind,
        label: &str,
        levels: &[SearchLevel],
    ) -> Result<Vec<Candidate>, VisionError> {
        for mode in [MatchMode::Exact, MatchMode::Prefix] {
            for level in levels {
                let query = LabelQuery::label(label, *level);
                let found = self.find(root, kind, &query, mode).await?;
                if !found.is_empty() {
                    debug!("{} {kind:?} candidate(s) for {label:?} at {level:?} ({mode:?})", found.len());
                    return Ok(found);
                }
            }
        }
        Ok(Vec::new())
    }

    /// A cell is found through its column: the header labelled with the cell's
    /// literal (the ordinal picks among headers), then the cell of `row` that
    /// lines up best under that header.
    async fn resolve_cell(&self, noun: &NounSpec, row: &ElementRef) -> Result<Handle, VisionError> {
        let description = noun.to_string();
        let header = match noun.literal.as_deref().map(normalize) {
            Some(label) => {
                let headers = self
                    .search_levels(row, &NounKind::Cell, &label, &[SearchLevel::ColumnHeader])
                    .await?;
                Some(select(noun, headers, None)?)
            }
            None => None,
        };

        let cells = match &header {
            Some(h) => {
                self.find(
                    row,
                    &NounKind::Cell,
                    &LabelQuery::aligned_under(h.element.clone()),
                    MatchMode::Exact,
                )
                .await?
            }
            None => {
                let all = self
                    .find(row, &NounKind::Cell, &LabelQuery::direct(), MatchMode::Exact)
                    .await?;
                vec![select(noun, all, None)?]
            }
        };

        // Aligned cells come back best-aligned first.
        let cell = cells
            .into_iter()
            .next()
            .ok_or_else(|| ResolutionError::NotFound(description.clone()))?;
        Ok(Handle {
            element: cell.element,
            kind: NounKind::Cell,
            description,
            document_order: cell.document_order,
        })
    }

    async fn find(
        &self,
        root: &ElementRef,
        kind: &NounKind,
        query: &LabelQuery,
        mode: MatchMode,
    ) -> Result<Vec<Candidate>, VisionError> {
        Ok(self
            .dispatcher
            .find_candidates(root, kind, query, mode)
            .await?)
    }
}

/// Pick one candidate: document order, then before/after, then the ordinal.
fn select(
    noun: &NounSpec,
    mut candidates: Vec<Candidate>,
    reference: Option<(Side, usize)>,
) -> Result<Candidate, ResolutionError> {
    candidates.sort_by_key(|c| c.document_order);
    if let Some((side, position)) = reference {
        candidates.retain(|c| match side {
            Side::Before => c.document_order < position,
            Side::After => c.document_order > position,
        });
    }

    let description = noun.to_string();
    if let Some(ordinal) = noun.ordinal {
        let index = ordinal.saturating_sub(1) as usize;
        let count = candidates.len();
        return candidates.into_iter().nth(index).ok_or_else(|| {
            ResolutionError::NotFound(format!("{description} (only {count} found)"))
        });
    }

    match candidates.len() {
        0 => Err(ResolutionError::NotFound(description)),
        1 => Ok(candidates.remove(0)),
        count if reference.is_some() => {
            // With a reference, the nearest candidate on the requested side wins.
            let nearest = match reference.map(|(side, _)| side) {
                Some(Side::Before) => candidates.pop(),
                _ => Some(candidates.remove(0)),
            };
            nearest.ok_or(ResolutionError::Ambiguous { description, count })
        }
        count => Err(ResolutionError::Ambiguous { description, count }),
    }
}

/// NotFound and Ambiguous are retried; anything else ends resolution.
fn retryable(error: VisionError) -> Result<ResolutionError, VisionError> {
    match error {
        VisionError::Resolution(e @ ResolutionError::NotFound(_))
        | VisionError::Resolution(e @ ResolutionError::Ambiguous { .. }) => Ok(e),
        VisionError::Automation(AutomationError::ElementNotFound(msg))
        | VisionError::Automation(AutomationError::ElementDetached(msg)) => {
            Ok(ResolutionError::NotFound(msg))
        }
        other => Err(other),
    }
}
