//! The seam between the interpreter and a real browser.
//!
//! The core never looks at page structure itself: every element lookup and
//! every action goes through an [`ActionDispatcher`]. A backend (a WebDriver
//! client, a headless browser, or the in-memory page the tests use) only has
//! to answer these calls.

use crate::command::NounKind;
use crate::errors::AutomationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Opaque handle to something in the page, minted by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementRef(String);

impl ElementRef {
    const DOCUMENT: &'static str = "document";
    const ALERT: &'static str = "alert";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The root of the current page; what the `global` context resolves to.
    pub fn document() -> Self {
        Self(Self::DOCUMENT.to_string())
    }

    /// The browser-level alert, while one is open.
    pub fn alert() -> Self {
        Self(Self::ALERT.to_string())
    }

    pub fn id(&self) -> &str {
        &self.0
    }

    pub fn is_document(&self) -> bool {
        self.0 == Self::DOCUMENT
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a label is looked for relative to the widget it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchLevel {
    /// A `<label for=...>` pointing at the widget, or one wrapping it.
    NativeLabel,
    /// Text directly beside a checkbox or radio button.
    AdjacentText,
    /// The nearest earlier cell in the widget's row.
    PrecedingCell,
    /// Text in the same block element.
    SameBlock,
    /// The cell before the widget's cell.
    PreviousCell,
    /// The row above the widget's row.
    PreviousRow,
    /// The legend of the nearest enclosing fieldset.
    Legend,
    /// The element's own visible text.
    OwnText,
    Title,
    AltText,
    Caption,
    /// Any cell of a row.
    CellText,
    /// The value of a widget inside a row.
    WidgetValue,
    /// A header cell of the table containing the root.
    ColumnHeader,
    /// Cells of the root row ordered by how well they line up under the anchor.
    AlignedUnder,
    /// Every element of the kind; no label involved.
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchMode {
    Exact,
    Prefix,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelQuery {
    pub text: Option<String>,
    pub level: SearchLevel,
    pub anchor: Option<ElementRef>,
}

impl LabelQuery {
    pub fn direct() -> Self {
        Self {
            text: None,
            level: SearchLevel::Direct,
            anchor: None,
        }
    }

    pub fn label(text: impl Into<String>, level: SearchLevel) -> Self {
        Self {
            text: Some(text.into()),
            level,
            anchor: None,
        }
    }

    pub fn aligned_under(anchor: ElementRef) -> Self {
        Self {
            text: None,
            level: SearchLevel::AlignedUnder,
            anchor: Some(anchor),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub element: ElementRef,
    pub document_order: usize,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertInfo {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Click,
    Hover,
    Clear,
    Type,
    Select,
    Push,
    EnterFile,
    Capture,
    Accept,
    Dismiss,
    GoBack,
    ReadText,
    ReadChecked,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionArgs {
    pub text: Option<String>,
    pub ordinal: Option<u32>,
    pub path: Option<PathBuf>,
}

impl ActionArgs {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionOutcome {
    Done,
    Text(String),
    Checked(bool),
}

/// Which frame or window to switch to or close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusTarget {
    /// The top-level document, or the first window.
    Default,
    Named(String),
    /// 1-based, in the order the browser reports them.
    Index(u32),
}

#[async_trait::async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Candidates for `kind` under `root` whose label at `query.level` matches,
    /// in document order.
    async fn find_candidates(
        &self,
        root: &ElementRef,
        kind: &NounKind,
        query: &LabelQuery,
        mode: MatchMode,
    ) -> Result<Vec<Candidate>, AutomationError>;

    async fn perform_action(
        &self,
        element: &ElementRef,
        action: ActionKind,
        args: &ActionArgs,
    ) -> Result<ActionOutcome, AutomationError>;

    async fn alert_state(&self) -> Result<Option<AlertInfo>, AutomationError>;

    async fn navigate_to(&self, url: &str) -> Result<(), AutomationError>;

    async fn current_url(&self) -> Result<String, AutomationError>;

    async fn switch_window(&self, target: &FocusTarget) -> Result<(), AutomationError>;

    async fn switch_frame(&self, target: &FocusTarget) -> Result<(), AutomationError>;

    async fn close_window(&self, target: &FocusTarget) -> Result<(), AutomationError>;
}
