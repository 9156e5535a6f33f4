//! The parsed form of one line of a Vision script.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
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
    ShouldExist,
    ShouldNotExist,
    ShouldContain,
    ShouldContainExactly,
    ShouldNotContain,
    ShouldBeChecked,
    ShouldNotBeChecked,
    Navigate,
    GoBack,
    Wait,
    Switch,
    Close,
    Test,
    EndTest,
    Require,
    EndRequire,
    LoadTest,
    RunTest,
    SaveTest,
    ShowTest,
    ShowInput,
    ShowAllInput,
    ShowContext,
    Skip,
    Break,
    NextCommand,
    Finish,
    Quit,
}

/// Whether a verb needs, tolerates or rejects a piece of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    Optional,
    Forbidden,
}

impl Verb {
    pub const ALL: [Verb; 38] = [
        Verb::Click,
        Verb::Hover,
        Verb::Clear,
        Verb::Type,
        Verb::Select,
        Verb::Push,
        Verb::EnterFile,
        Verb::Capture,
        Verb::Accept,
        Verb::Dismiss,
        Verb::ShouldExist,
        Verb::ShouldNotExist,
        Verb::ShouldContain,
        Verb::ShouldContainExactly,
        Verb::ShouldNotContain,
        Verb::ShouldBeChecked,
        Verb::ShouldNotBeChecked,
        Verb::Navigate,
        Verb::GoBack,
        Verb::Wait,
        Verb::Switch,
        Verb::Close,
        Verb::Test,
        Verb::EndTest,
        Verb::Require,
        Verb::EndRequire,
        Verb::LoadTest,
        Verb::RunTest,
        Verb::SaveTest,
        Verb::ShowTest,
        Verb::ShowInput,
        Verb::ShowAllInput,
        Verb::ShowContext,
        Verb::Skip,
        Verb::Break,
        Verb::NextCommand,
        Verb::Finish,
        Verb::Quit,
    ];

    pub fn keyword(&self) -> &'static str {
        match self {
            Verb::Click => "click",
            Verb::Hover => "hover over",
            Verb::Clear => "clear",
            Verb::Type => "type",
            Verb::Select => "select",
            Verb::Push => "push",
            Verb::EnterFile => "enter file",
            Verb::Capture => "capture",
            Verb::Accept => "accept",
            Verb::Dismiss => "dismiss",
            Verb::ShouldExist => "should exist",
            Verb::ShouldNotExist => "should not exist",
            Verb::ShouldContain => "should contain",
            Verb::ShouldContainExactly => "should contain exactly",
            Verb::ShouldNotContain => "should not contain",
            Verb::ShouldBeChecked => "should be checked",
            Verb::ShouldNotBeChecked => "should not be checked",
            Verb::Navigate => "navigate",
            Verb::GoBack => "go back",
            Verb::Wait => "wait",
            Verb::Switch => "switch",
            Verb::Close => "close",
            Verb::Test => "test",
            Verb::EndTest => "end test",
            Verb::Require => "require",
            Verb::EndRequire => "end require",
            Verb::LoadTest => "load test",
            Verb::RunTest => "run test",
            Verb::SaveTest => "save test",
            Verb::ShowTest => "show test",
            Verb::ShowInput => "show input",
            Verb::ShowAllInput => "show all input",
            Verb::ShowContext => "show context",
            Verb::Skip => "skip",
            Verb::Break => "break",
            Verb::NextCommand => "next command",
            Verb::Finish => "finish",
            Verb::Quit => "quit",
        }
    }

    /// Look a verb up by its keyword, ignoring case and surrounding whitespace.
    pub fn from_keyword(keyword: &str) -> Option<Verb> {
        let wanted = keyword
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        if wanted == "hover" {
            return Some(Verb::Hover);
        }
        Verb::ALL.into_iter().find(|v| v.keyword() == wanted)
    }

    /// Verbs that steer the interpreter and may only be typed at the prompt.
    pub fn is_interpreter(&self) -> bool {
        matches!(
            self,
            Verb::LoadTest
                | Verb::RunTest
                | Verb::SaveTest
                | Verb::ShowTest
                | Verb::ShowInput
                | Verb::ShowAllInput
                | Verb::ShowContext
                | Verb::Skip
                | Verb::Break
                | Verb::NextCommand
                | Verb::Finish
                | Verb::Quit
        )
    }

    pub fn opens_scope(&self) -> bool {
        matches!(self, Verb::Test | Verb::Require)
    }

    pub fn closes_scope(&self) -> bool {
        matches!(self, Verb::EndTest | Verb::EndRequire)
    }

    pub fn literal_rule(&self) -> Requirement {
        use Requirement::*;
        match self {
            Verb::Type
            | Verb::Select
            | Verb::Push
            | Verb::ShouldContain
            | Verb::ShouldContainExactly
            | Verb::ShouldNotContain
            | Verb::Navigate
            | Verb::Wait
            | Verb::Require
            | Verb::LoadTest
            | Verb::Break => Required,
            Verb::Capture
            | Verb::Test
            | Verb::EndTest
            | Verb::EndRequire
            | Verb::SaveTest
            | Verb::Skip => Optional,
            _ => Forbidden,
        }
    }

    pub fn file_literal_rule(&self) -> Requirement {
        match self {
            Verb::EnterFile => Requirement::Required,
            _ => Requirement::Forbidden,
        }
    }

    pub fn noun_rule(&self) -> Requirement {
        use Requirement::*;
        match self {
            Verb::Click
            | Verb::Hover
            | Verb::Clear
            | Verb::Type
            | Verb::Select
            | Verb::EnterFile
            | Verb::Accept
            | Verb::Dismiss
            | Verb::ShouldExist
            | Verb::ShouldNotExist
            | Verb::ShouldContain
            | Verb::ShouldContainExactly
            | Verb::ShouldNotContain
            | Verb::ShouldBeChecked
            | Verb::ShouldNotBeChecked
            | Verb::Switch
            | Verb::Close => Required,
            Verb::Push | Verb::Capture | Verb::Test => Optional,
            _ => Forbidden,
        }
    }

    /// Only `select` takes an ordinal of its own, picking among matching options.
    pub fn takes_ordinal(&self) -> bool {
        matches!(self, Verb::Select)
    }

    /// Whether the verb can act on the innermost (target) noun of a chain.
    pub fn accepts_target(&self, kind: &NounKind) -> bool {
        use NounKind::*;
        if let RawLocator(_) = kind {
            return !self.is_kind_specific();
        }
        match self.kind_restriction(kind) {
            Some(allowed) => allowed,
            None => match self {
                Verb::ShouldExist | Verb::ShouldNotExist => {
                    kind.is_page_element() || *kind == Alert
                }
                Verb::Test => kind.is_page_element() || *kind == Context,
                _ => kind.is_page_element(),
            },
        }
    }

    fn is_kind_specific(&self) -> bool {
        self.kind_restriction(&NounKind::Text).is_some()
    }

    /// `None` for verbs that act on any page element.
    fn kind_restriction(&self, kind: &NounKind) -> Option<bool> {
        use NounKind::*;
        let allowed = match self {
            Verb::Clear | Verb::Type => matches!(kind, Textfield | Textarea),
            Verb::Select => matches!(kind, Dropdown),
            Verb::EnterFile => matches!(kind, FileInput | Textfield | Textarea),
            Verb::Accept | Verb::Dismiss => matches!(kind, Alert),
            Verb::ShouldBeChecked | Verb::ShouldNotBeChecked => {
                matches!(kind, Checkbox | RadioButton)
            }
            Verb::Switch => matches!(kind, Frame | Window),
            Verb::Close => matches!(kind, Window),
            _ => return None,
        };
        Some(allowed)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

/// An attribute or xpath expression written in braces, e.g. `{id=login}` or `{//form[1]}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RawLocator {
    Attribute { name: String, value: String },
    XPath(String),
}

impl fmt::Display for RawLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawLocator::Attribute { name, value } => write!(f, "{{{name}={value}}}"),
            RawLocator::XPath(path) => write!(f, "{{{path}}}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NounKind {
    Alert,
    Box,
    Button,
    Checkbox,
    Context,
    Dropdown,
    Image,
    Link,
    RadioButton,
    Text,
    Textarea,
    Textfield,
    Frame,
    Window,
    Cell,
    Row,
    Table,
    FileInput,
    RawLocator(RawLocator),
}

impl NounKind {
    pub fn name(&self) -> &'static str {
        match self {
            NounKind::Alert => "alert",
            NounKind::Box => "box",
            NounKind::Button => "button",
            NounKind::Checkbox => "checkbox",
            NounKind::Context => "context",
            NounKind::Dropdown => "dropdown",
            NounKind::Image => "image",
            NounKind::Link => "link",
            NounKind::RadioButton => "radio button",
            NounKind::Text => "text",
            NounKind::Textarea => "textarea",
            NounKind::Textfield => "textfield",
            NounKind::Frame => "frame",
            NounKind::Window => "window",
            NounKind::Cell => "cell",
            NounKind::Row => "row",
            NounKind::Table => "table",
            NounKind::FileInput => "file input",
            NounKind::RawLocator(_) => "element",
        }
    }

    /// Kinds that live in the page's element tree and can be searched for.
    pub fn is_page_element(&self) -> bool {
        !matches!(
            self,
            NounKind::Alert | NounKind::Context | NounKind::Frame | NounKind::Window
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Positional {
    pub side: Side,
    pub reference: Box<NounSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NounSpec {
    pub kind: NounKind,
    pub literal: Option<String>,
    pub ordinal: Option<u32>,
    pub positional: Option<Positional>,
}

impl NounSpec {
    pub fn new(kind: NounKind) -> Self {
        Self {
            kind,
            literal: None,
            ordinal: None,
            positional: None,
        }
    }

    pub fn with_literal(mut self, literal: impl Into<String>) -> Self {
        self.literal = Some(literal.into());
        self
    }

    pub fn with_ordinal(mut self, ordinal: u32) -> Self {
        self.ordinal = Some(ordinal);
        self
    }

    pub fn is_context(&self) -> bool {
        self.kind == NounKind::Context
    }
}

impl fmt::Display for NounSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "the")?;
        if let Some(o) = self.ordinal {
            write!(f, " {}", ordinal_suffix(o))?;
        }
        if let Some(lit) = &self.literal {
            write!(f, " {lit:?}")?;
        }
        match &self.kind {
            NounKind::RawLocator(raw) => write!(f, " {raw} element")?,
            kind => write!(f, " {}", kind.name())?,
        }
        if let Some(pos) = &self.positional {
            let side = match pos.side {
                Side::Before => "before",
                Side::After => "after",
            };
            write!(f, " {side} {}", pos.reference)?;
        }
        Ok(())
    }
}

/// Render a chain the way it was written, innermost noun first.
pub fn describe_chain(chain: &[NounSpec]) -> String {
    chain
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(" in ")
}

pub fn ordinal_suffix(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Literal(String),
    File(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub verb: Verb,
    /// Written order: innermost noun first, outermost last.
    pub nouns: Vec<NounSpec>,
    pub value: Option<Value>,
    pub ordinal: Option<u32>,
    pub within: Option<Duration>,
    pub binding: Option<String>,
    pub skip_reason: Option<String>,
    pub comment: Option<String>,
    /// The source line without its indentation.
    pub text: String,
}

impl Command {
    pub fn new(verb: Verb, text: impl Into<String>) -> Self {
        Self {
            verb,
            nouns: Vec::new(),
            value: None,
            ordinal: None,
            within: None,
            binding: None,
            skip_reason: None,
            comment: None,
            text: text.into(),
        }
    }

    pub fn literal(&self) -> Option<&str> {
        match &self.value {
            Some(Value::Literal(s)) => Some(s),
            _ => None,
        }
    }

    pub fn file_literal(&self) -> Option<&str> {
        match &self.value {
            Some(Value::File(s)) => Some(s),
            _ => None,
        }
    }

    /// The noun the verb acts on.
    pub fn target(&self) -> Option<&NounSpec> {
        self.nouns.first()
    }

    /// Name of the scope a `Test` or `Require` opens: the literal, else the target's label.
    pub fn scope_name(&self) -> Option<String> {
        self.literal()
            .map(str::to_string)
            .or_else(|| self.target().and_then(|n| n.literal.clone()))
    }

    pub fn locator_description(&self) -> Option<String> {
        if self.nouns.is_empty() {
            None
        } else {
            Some(describe_chain(&self.nouns))
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}
