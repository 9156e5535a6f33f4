//! Grammar for Vision command lines.
//!
//! A line is a verb followed by noun phrases and modifiers:
//!
//! ```text
//! Select the 2nd "Red" item from the "Color" dropdown within "5"
//! Type "selenium" in the "Username" textfield in the "Login" table
//! Click the {id=submit} after the "Terms" checkbox as "go"
//! ```
//!
//! Literals and ordinals right after the verb belong to the verb. A noun's
//! literal and ordinal follow it, or precede it when the phrase starts with
//! `the`.

use crate::command::{Command, NounKind, NounSpec, Positional, Requirement, Side, Value, Verb};
use crate::duration::parse_duration;
use crate::errors::VisionError;
use crate::lexer::{tokenize, Token};
use tracing::debug;

/// Longest keyword in the vocabulary, in words ("should not be checked").
const MAX_PHRASE_WORDS: usize = 4;

#[derive(Debug, Clone, PartialEq)]
enum Item {
    Verb(Verb),
    Noun(NounKind),
    Literal(String),
    File(String),
    Ordinal(u32),
    The,
    Before,
    After,
    Within,
    As,
    IsSkipped,
    Because,
}

enum Lexeme {
    Item(Item),
    Sugar,
}

fn lookup(phrase: &str) -> Option<Lexeme> {
    let item = match phrase {
        "to" | "in" | "for" | "with" | "new" | "item" | "from" | "on" | "into" | "it"
        | "and get" => return Some(Lexeme::Sugar),

        "the" => Item::The,
        "before" => Item::Before,
        "after" => Item::After,
        "within" => Item::Within,
        "as" => Item::As,
        "is skipped" => Item::IsSkipped,
        "because" | "so that" => Item::Because,

        "first" => Item::Ordinal(1),
        "second" => Item::Ordinal(2),
        "third" => Item::Ordinal(3),
        "fourth" => Item::Ordinal(4),
        "fifth" => Item::Ordinal(5),
        "sixth" => Item::Ordinal(6),
        "seventh" => Item::Ordinal(7),
        "eighth" => Item::Ordinal(8),
        "ninth" => Item::Ordinal(9),
        "tenth" => Item::Ordinal(10),

        "alert" => Item::Noun(NounKind::Alert),
        "box" => Item::Noun(NounKind::Box),
        "button" => Item::Noun(NounKind::Button),
        "checkbox" => Item::Noun(NounKind::Checkbox),
        "context" => Item::Noun(NounKind::Context),
        "dropdown" => Item::Noun(NounKind::Dropdown),
        "image" => Item::Noun(NounKind::Image),
        "link" => Item::Noun(NounKind::Link),
        "radio button" => Item::Noun(NounKind::RadioButton),
        "text" => Item::Noun(NounKind::Text),
        "textarea" => Item::Noun(NounKind::Textarea),
        "textfield" => Item::Noun(NounKind::Textfield),
        "frame" => Item::Noun(NounKind::Frame),
        "window" => Item::Noun(NounKind::Window),
        "cell" => Item::Noun(NounKind::Cell),
        "row" => Item::Noun(NounKind::Row),
        "table" => Item::Noun(NounKind::Table),
        "file input" => Item::Noun(NounKind::FileInput),

        "hover" => Item::Verb(Verb::Hover),
        other => Item::Verb(Verb::from_keyword(other)?),
    };
    Some(Lexeme::Item(item))
}

/// Turn tokens into grammar items, matching multi-word keywords longest first.
fn lex(tokens: Vec<Token>, line: usize) -> Result<Vec<Item>, VisionError> {
    let mut items = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Literal(s) => items.push(Item::Literal(s.clone())),
            Token::FileLiteral(s) => items.push(Item::File(s.clone())),
            Token::Ordinal(n) => items.push(Item::Ordinal(*n)),
            Token::Locator(raw) => items.push(Item::Noun(NounKind::RawLocator(raw.clone()))),
            Token::Word(_) => {
                let run: Vec<String> = tokens[i..]
                    .iter()
                    .take(MAX_PHRASE_WORDS)
                    .map_while(|t| match t {
                        Token::Word(w) => Some(w.to_lowercase()),
                        _ => None,
                    })
                    .collect();
                let matched = (1..=run.len())
                    .rev()
                    .find_map(|n| lookup(&run[..n].join(" ")).map(|lexeme| (n, lexeme)));
                match matched {
                    Some((n, lexeme)) => {
                        if let Lexeme::Item(item) = lexeme {
                            items.push(item);
                        }
                        i += n;
                        continue;
                    }
                    None => {
                        return Err(VisionError::parse(
                            line,
                            format!("I don't understand the word {:?}", run[0]),
                        ))
                    }
                }
            }
        }
        i += 1;
    }
    Ok(items)
}

struct Cursor {
    items: Vec<Item>,
    pos: usize,
}

impl Cursor {
    fn peek(&self) -> Option<&Item> {
        self.items.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Item> {
        self.items.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Item> {
        let item = self.items.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn next_literal(&mut self) -> Option<String> {
        match self.peek() {
            Some(Item::Literal(_)) => match self.next() {
                Some(Item::Literal(s)) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Modifiers collected for whichever word they end up belonging to.
#[derive(Default)]
struct Modifiers {
    literal: Option<String>,
    file: Option<String>,
    ordinal: Option<u32>,
}

impl Modifiers {
    fn is_empty(&self) -> bool {
        self.literal.is_none() && self.file.is_none() && self.ordinal.is_none()
    }

    fn take(&mut self, item: Item, line: usize) -> Result<(), VisionError> {
        match item {
            Item::Literal(s) if self.literal.is_none() => self.literal = Some(s),
            Item::File(s) if self.file.is_none() => self.file = Some(s),
            Item::Ordinal(n) if self.ordinal.is_none() => self.ordinal = Some(n),
            Item::Literal(s) => {
                return Err(VisionError::parse(line, format!("Unexpected extra literal {s:?}")))
            }
            Item::File(s) => {
                return Err(VisionError::parse(line, format!("Unexpected extra file literal <{s}>")))
            }
            Item::Ordinal(_) => return Err(VisionError::parse(line, "Unexpected extra ordinal")),
            other => {
                return Err(VisionError::parse(line, format!("Unexpected {other:?}")))
            }
        }
        Ok(())
    }
}

fn is_modifier(item: Option<&Item>) -> bool {
    matches!(
        item,
        Some(Item::Literal(_)) | Some(Item::File(_)) | Some(Item::Ordinal(_))
    )
}

/// Parse one line of Vision. `text` must already have its indentation removed.
pub fn parse_line(text: &str, line: usize) -> Result<Command, VisionError> {
    let text = text.trim();
    let tokens = tokenize(text).map_err(|msg| VisionError::parse(line, msg))?;
    let items = lex(tokens, line)?;
    let mut cur = Cursor { items, pos: 0 };

    let verb = match cur.next() {
        Some(Item::Verb(v)) => v,
        Some(other) => {
            return Err(VisionError::parse(
                line,
                format!("A command must start with a verb, not {other:?}"),
            ))
        }
        None => return Err(VisionError::parse(line, "The line is empty")),
    };
    let mut command = Command::new(verb, text);

    // Verb modifiers come straight after the verb.
    let mut verb_mods = Modifiers::default();
    while is_modifier(cur.peek()) {
        if let Some(item) = cur.next() {
            verb_mods.take(item, line)?;
        }
    }

    let mut skipped = false;
    let mut reason: Option<String> = None;

    while let Some(item) = cur.next() {
        match item {
            Item::The => {
                let mut pre = Modifiers::default();
                while is_modifier(cur.peek()) {
                    if let Some(m) = cur.next() {
                        pre.take(m, line)?;
                    }
                }
                match cur.peek() {
                    Some(Item::Noun(_)) => {
                        let noun = noun_phrase(&mut cur, pre, line)?;
                        command.nouns.push(noun);
                    }
                    // `Select the 2nd "Red" item from ...`: the phrase had no noun,
                    // so its modifiers belong to the verb.
                    _ if command.nouns.is_empty() && verb_mods.is_empty() && !pre.is_empty() => {
                        verb_mods = pre;
                    }
                    _ => {
                        return Err(VisionError::parse(
                            line,
                            "Expected a noun after \"the\"",
                        ))
                    }
                }
            }
            Item::Noun(_) => {
                cur.pos -= 1;
                let noun = noun_phrase(&mut cur, Modifiers::default(), line)?;
                command.nouns.push(noun);
            }
            Item::Literal(name) if matches!(cur.peek(), Some(Item::Noun(NounKind::Context))) => {
                cur.next();
                command
                    .nouns
                    .push(NounSpec::new(NounKind::Context).with_literal(name));
            }
            Item::Before | Item::After => {
                let side = if item == Item::Before {
                    Side::Before
                } else {
                    Side::After
                };
                let reference = reference_phrase(&mut cur, line)?;
                let Some(last) = command.nouns.last_mut() else {
                    return Err(VisionError::parse(
                        line,
                        "\"before\" and \"after\" must follow the noun they narrow",
                    ));
                };
                if last.positional.is_some() {
                    return Err(VisionError::parse(line, "A noun can only have one before/after"));
                }
                last.positional = Some(Positional {
                    side,
                    reference: Box::new(reference),
                });
            }
            Item::Within => {
                let Some(lit) = cur.next_literal() else {
                    return Err(VisionError::parse(line, "\"within\" needs a quoted number of seconds"));
                };
                if command.within.is_some() {
                    return Err(VisionError::parse(line, "\"within\" given twice"));
                }
                let duration = parse_duration(&lit)
                    .map_err(|e| VisionError::parse(line, format!("Bad \"within\" value: {e}")))?;
                command.within = Some(duration);
            }
            Item::As => {
                let Some(name) = cur.next_literal() else {
                    return Err(VisionError::parse(line, "\"as\" needs a quoted context name"));
                };
                if command.binding.is_some() {
                    return Err(VisionError::parse(line, "\"as\" given twice"));
                }
                if name.trim().eq_ignore_ascii_case("global") {
                    return Err(VisionError::parse(line, "The \"global\" context cannot be rebound"));
                }
                command.binding = Some(name);
            }
            Item::IsSkipped => {
                if skipped {
                    return Err(VisionError::parse(line, "\"is skipped\" given twice"));
                }
                skipped = true;
            }
            Item::Because => {
                let Some(why) = cur.next_literal() else {
                    return Err(VisionError::parse(
                        line,
                        "\"because\" and \"so that\" need a quoted reason",
                    ));
                };
                if reason.is_some() {
                    return Err(VisionError::parse(line, "Only one reason may be given"));
                }
                reason = Some(why);
            }
            Item::Verb(v) => {
                return Err(VisionError::parse(
                    line,
                    format!("Only one verb is allowed per line, found \"{v}\" as well"),
                ))
            }
            Item::Literal(s) => {
                return Err(VisionError::parse(
                    line,
                    format!("The literal {s:?} must come right after the verb or its noun"),
                ))
            }
            Item::File(s) => {
                return Err(VisionError::parse(
                    line,
                    format!("The file literal <{s}> must come right after the verb"),
                ))
            }
            Item::Ordinal(_) => {
                return Err(VisionError::parse(
                    line,
                    "An ordinal must come right before or after its noun",
                ))
            }
        }
    }

    if skipped {
        match reason {
            Some(r) => command.skip_reason = Some(r),
            None => {
                return Err(VisionError::parse(
                    line,
                    "\"is skipped\" needs a reason: add because \"...\" or so that \"...\"",
                ))
            }
        }
    } else {
        command.comment = reason;
    }

    command.value = match (verb_mods.literal, verb_mods.file) {
        (Some(_), Some(_)) => {
            return Err(VisionError::parse(
                line,
                "A verb takes either a literal or a file literal, not both",
            ))
        }
        (Some(l), None) => Some(Value::Literal(l)),
        (None, Some(f)) => Some(Value::File(f)),
        (None, None) => None,
    };
    command.ordinal = verb_mods.ordinal;

    validate(&command, line)?;
    debug!(line, verb = %command.verb, nouns = command.nouns.len(), "parsed command");
    Ok(command)
}

/// A noun followed by any of its own trailing modifiers.
fn noun_phrase(cur: &mut Cursor, mut mods: Modifiers, line: usize) -> Result<NounSpec, VisionError> {
    let kind = match cur.next() {
        Some(Item::Noun(kind)) => kind,
        _ => return Err(VisionError::parse(line, "Expected a noun")),
    };
    let prefixed = !mods.is_empty();
    while !prefixed && is_modifier(cur.peek()) {
        // `... button "Login" context` leaves the literal to the context reference
        if matches!(cur.peek(), Some(Item::Literal(_)))
            && matches!(cur.peek_at(1), Some(Item::Noun(NounKind::Context)))
        {
            break;
        }
        if let Some(item) = cur.next() {
            mods.take(item, line)?;
        }
    }
    if let Some(f) = mods.file {
        return Err(VisionError::parse(
            line,
            format!("A noun cannot take the file literal <{f}>"),
        ));
    }
    Ok(NounSpec {
        kind,
        literal: mods.literal,
        ordinal: mods.ordinal,
        positional: None,
    })
}

/// The single noun named after `before` or `after`.
fn reference_phrase(cur: &mut Cursor, line: usize) -> Result<NounSpec, VisionError> {
    let mut pre = Modifiers::default();
    if cur.peek() == Some(&Item::The) {
        cur.next();
        while is_modifier(cur.peek()) {
            if let Some(m) = cur.next() {
                pre.take(m, line)?;
            }
        }
    }
    match cur.peek() {
        Some(Item::Noun(kind)) if kind.is_page_element() => noun_phrase(cur, pre, line),
        _ => Err(VisionError::parse(
            line,
            "\"before\" and \"after\" must be followed by a widget on the page",
        )),
    }
}

fn check_requirement(
    rule: Requirement,
    present: bool,
    verb: Verb,
    what: &str,
    line: usize,
) -> Result<(), VisionError> {
    match (rule, present) {
        (Requirement::Required, false) => Err(VisionError::parse(
            line,
            format!("\"{verb}\" needs {what}"),
        )),
        (Requirement::Forbidden, true) => Err(VisionError::parse(
            line,
            format!("\"{verb}\" does not take {what}"),
        )),
        _ => Ok(()),
    }
}

fn validate(command: &Command, line: usize) -> Result<(), VisionError> {
    let verb = command.verb;
    check_requirement(verb.literal_rule(), command.literal().is_some(), verb, "a quoted literal", line)?;
    check_requirement(
        verb.file_literal_rule(),
        command.file_literal().is_some(),
        verb,
        "a file literal",
        line,
    )?;
    check_requirement(verb.noun_rule(), !command.nouns.is_empty(), verb, "a noun", line)?;

    if command.ordinal.is_some() && !verb.takes_ordinal() {
        return Err(VisionError::parse(
            line,
            format!("\"{verb}\" does not take an ordinal; put it before or after the noun"),
        ));
    }

    if let Some(target) = command.target() {
        if !verb.accepts_target(&target.kind) {
            return Err(VisionError::parse(
                line,
                format!("\"{verb}\" cannot be used on {target}"),
            ));
        }
    }

    let last = command.nouns.len().saturating_sub(1);
    for (i, noun) in command.nouns.iter().enumerate() {
        match &noun.kind {
            NounKind::Context => {
                if i != last {
                    return Err(VisionError::parse(line, "A context must be the outermost noun"));
                }
                if noun.literal.is_none() {
                    return Err(VisionError::parse(line, "A context needs a quoted name"));
                }
                if noun.ordinal.is_some() || noun.positional.is_some() {
                    return Err(VisionError::parse(line, "A context cannot take an ordinal or position"));
                }
            }
            NounKind::Alert | NounKind::Frame | NounKind::Window if command.nouns.len() > 1 => {
                return Err(VisionError::parse(
                    line,
                    format!("The {} cannot be combined with other nouns", noun.kind.name()),
                ));
            }
            NounKind::Cell => {
                let next = command.nouns.get(i + 1);
                if !matches!(next, Some(n) if n.kind == NounKind::Row) {
                    return Err(VisionError::parse(line, "A cell must be followed by the row it is in"));
                }
            }
            NounKind::RawLocator(_) if noun.literal.is_some() => {
                return Err(VisionError::parse(line, "A {locator} cannot also take a literal"));
            }
            _ => {}
        }
        if i > 0 && !noun.kind.is_page_element() && noun.kind != NounKind::Context {
            return Err(VisionError::parse(
                line,
                format!("The {} cannot contain other widgets", noun.kind.name()),
            ));
        }
    }

    if command.binding.is_some() && command.nouns.is_empty() {
        return Err(VisionError::parse(line, "\"as\" needs a noun to bind"));
    }

    match verb {
        Verb::Test if command.literal().is_none() && command.nouns.is_empty() => {
            return Err(VisionError::parse(line, "\"test\" needs a name or a noun"));
        }
        Verb::Wait => {
            if let Some(lit) = command.literal() {
                parse_duration(lit)
                    .map_err(|e| VisionError::parse(line, format!("Bad wait value: {e}")))?;
            }
        }
        Verb::Skip => {
            if let Some(lit) = command.literal() {
                match lit.trim().parse::<usize>() {
                    Ok(n) if n > 0 => {}
                    _ => {
                        return Err(VisionError::parse(
                            line,
                            format!("\"skip\" needs a positive count, not {lit:?}"),
                        ))
                    }
                }
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::RawLocator;
    use std::time::Duration;

    fn parse(text: &str) -> Command {
        match parse_line(text, 1) {
            Ok(c) => c,
            Err(e) => panic!("Expected {text:?} to parse, but got {e}"),
        }
    }

    fn parse_err(text: &str) -> String {
        match parse_line(text, 7) {
            Err(VisionError::Parse { line, message }) => {
                assert_eq!(line, 7);
                message
            }
            other => panic!("Expected a parse error for {text:?}, but got {other:?}"),
        }
    }

    #[test]
    fn test_simple_click() {
        let cmd = parse("Click the \"Save\" button");
        assert_eq!(cmd.verb, Verb::Click);
        assert_eq!(cmd.nouns, vec![NounSpec::new(NounKind::Button).with_literal("Save")]);
        assert_eq!(cmd.value, None);
        assert_eq!(cmd.text, "Click the \"Save\" button");
    }

    #[test]
    fn test_modifiers_after_noun_without_the() {
        let cmd = parse("Click button 'Save' 2nd");
        assert_eq!(
            cmd.nouns,
            vec![NounSpec::new(NounKind::Button).with_literal("Save").with_ordinal(2)]
        );
    }

    #[test]
    fn test_chain_is_written_innermost_first() {
        let cmd = parse("Type 'selenium' in the 'Username' textfield in the 'Login' table");
        assert_eq!(cmd.literal(), Some("selenium"));
        assert_eq!(cmd.nouns.len(), 2);
        assert_eq!(cmd.nouns[0].kind, NounKind::Textfield);
        assert_eq!(cmd.nouns[1].kind, NounKind::Table);
        assert_eq!(cmd.nouns[1].literal.as_deref(), Some("Login"));
    }

    #[test]
    fn test_select_the_flip_attaches_to_verb() {
        let cmd = parse("Select the 2nd \"Red\" item from the \"Color\" dropdown");
        assert_eq!(cmd.verb, Verb::Select);
        assert_eq!(cmd.literal(), Some("Red"));
        assert_eq!(cmd.ordinal, Some(2));
        assert_eq!(cmd.nouns, vec![NounSpec::new(NounKind::Dropdown).with_literal("Color")]);
    }

    #[test]
    fn test_case_and_sugar_are_ignored() {
        let cmd = parse("CLICK on the 'Go' LINK, and get it!");
        assert_eq!(cmd.verb, Verb::Click);
        assert_eq!(cmd.nouns[0].kind, NounKind::Link);
    }

    #[test]
    fn test_multi_word_keywords() {
        assert_eq!(parse("Should not be checked the 'Agree' checkbox").verb, Verb::ShouldNotBeChecked);
        assert_eq!(parse("Should contain exactly 'x' the 'Name' text").verb, Verb::ShouldContainExactly);
        assert_eq!(parse("Click the 'Yes' radio button").nouns[0].kind, NounKind::RadioButton);
        assert_eq!(parse("Show all input").verb, Verb::ShowAllInput);
        assert_eq!(parse("Hover over the 'Menu' link").verb, Verb::Hover);
    }

    #[test]
    fn test_context_reference_and_binding() {
        let cmd = parse("Click the 'Save' button in the 'form' context as 'saver'");
        assert_eq!(cmd.nouns.len(), 2);
        assert!(cmd.nouns[1].is_context());
        assert_eq!(cmd.binding.as_deref(), Some("saver"));

        let bare = parse("Click button 'Save' in \"form\" context");
        assert_eq!(bare.nouns[0].literal.as_deref(), Some("Save"));
        assert_eq!(bare.nouns[1].literal.as_deref(), Some("form"));
    }

    #[test]
    fn test_positional_reference() {
        let cmd = parse("Click the 'Edit' link after the 'Bob' text");
        let pos = cmd.nouns[0].positional.as_ref().unwrap();
        assert_eq!(pos.side, Side::After);
        assert_eq!(pos.reference.kind, NounKind::Text);
        assert_eq!(cmd.nouns.len(), 1);
    }

    #[test]
    fn test_within_and_comment() {
        let cmd = parse("Click the 'Go' button within '2' because 'the page is slow'");
        assert_eq!(cmd.within, Some(Duration::from_secs(2)));
        assert_eq!(cmd.comment.as_deref(), Some("the page is slow"));
        assert_eq!(cmd.skip_reason, None);
    }

    #[test]
    fn test_is_skipped_requires_reason() {
        let msg = parse_err("Click the 'Go' button is skipped");
        assert!(msg.contains("is skipped"));
        let cmd = parse("Click the 'Go' button is skipped so that 'we can ship'");
        assert_eq!(cmd.skip_reason.as_deref(), Some("we can ship"));
    }

    #[test]
    fn test_literal_rules() {
        parse_err("Click 'Save' the button");
        parse_err("Type in the 'Name' textfield");
        parse_err("Type 'x' in the 'Go' button");
        parse_err("Enter file in the 'Upload' file input");
        let cmd = parse("Enter file <cv.txt> in the 'Upload' file input");
        assert_eq!(cmd.file_literal(), Some("cv.txt"));
    }

    #[test]
    fn test_alert_only_with_alert_verbs() {
        parse("Accept the alert");
        parse("Should exist the 'Are you sure' alert");
        parse_err("Click the alert");
        parse_err("Accept the 'OK' button");
        parse_err("Accept the alert in the 'x' table");
    }

    #[test]
    fn test_cell_needs_row() {
        parse("Should contain 'Paid' the 'Status' cell in the 'Invoice 7' row");
        let msg = parse_err("Click the 'Status' cell in the 'Invoices' table");
        assert!(msg.contains("row"));
    }

    #[test]
    fn test_raw_locator() {
        let cmd = parse("Click the {id=submit} in the 'Login' table");
        assert_eq!(
            cmd.nouns[0].kind,
            NounKind::RawLocator(RawLocator::Attribute {
                name: "id".into(),
                value: "submit".into()
            })
        );
        parse_err("Type 'x' in the {id=name}");
    }

    #[test]
    fn test_rejections() {
        parse_err("the 'Save' button");
        parse_err("Click the 'Save' button and click the 'Go' button");
        parse_err("Frobnicate the 'Save' button");
        parse_err("Click the 'Save' button as 'global'");
        parse_err("Click the 'Save' button within 'soon'");
        parse_err("Navigate");
        parse_err("Skip 'zero'");
        parse_err("Click the 'Save' button in 'nowhere'");
        parse_err("Click the 'x' button in the 'y' context in the 'Login' table");
    }

    #[test]
    fn test_structure_verbs() {
        let test = parse("Test the 'Login' table as 'login'");
        assert_eq!(test.verb, Verb::Test);
        assert_eq!(test.scope_name().as_deref(), Some("Login"));
        assert_eq!(parse("Test 'checkout flow'").scope_name().as_deref(), Some("checkout flow"));
        assert_eq!(parse("End test").verb, Verb::EndTest);
        assert_eq!(parse("Require 'login.vision'").literal(), Some("login.vision"));
        parse_err("Test");
    }
}
