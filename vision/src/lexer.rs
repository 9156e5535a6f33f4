use crate::command::RawLocator;
use once_cell::sync::Lazy;
use regex::Regex;

static ORDINAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d+)(st|nd|rd|th)$").expect("valid ordinal regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Text between matching single or double quotes.
    Literal(String),
    /// `<name>`: a file in the upload directory.
    FileLiteral(String),
    /// `{name=value}` or `{//xpath}`.
    Locator(RawLocator),
    Word(String),
    Ordinal(u32),
}

/// Split one line (indentation already removed) into tokens.
///
/// Anything that is not alphanumeric, `_`, a quote, or a bracket separates
/// words and is otherwise dropped.
pub fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    let mut current = String::new();

    while let Some(ch) = chars.next() {
        match ch {
            '"' | '\'' => {
                flush_word(&mut current, &mut tokens)?;
                let mut literal = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ch {
                        closed = true;
                        break;
                    }
                    literal.push(c);
                }
                if !closed {
                    return Err(format!("Unterminated literal starting with {ch}{literal}"));
                }
                tokens.push(Token::Literal(literal));
            }
            '<' => {
                flush_word(&mut current, &mut tokens)?;
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '>' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(format!("Unterminated file literal <{name}"));
                }
                if name.is_empty()
                    || !name
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
                {
                    return Err(format!(
                        "File literal <{name}> may only contain letters, digits, '_' and '.'"
                    ));
                }
                tokens.push(Token::FileLiteral(name));
            }
            '{' => {
                flush_word(&mut current, &mut tokens)?;
                let mut body = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        // `\}` keeps a literal brace inside the expression
                        '\\' if chars.peek() == Some(&'}') => {
                            body.push('}');
                            chars.next();
                        }
                        '}' => {
                            closed = true;
                            break;
                        }
                        c => body.push(c),
                    }
                }
                if !closed {
                    return Err(format!("Unterminated locator {{{body}"));
                }
                tokens.push(Token::Locator(parse_locator(&body)?));
            }
            '>' | '}' => {
                return Err(format!("Unexpected '{ch}' without a matching opening bracket"));
            }
            c if c.is_alphanumeric() || c == '_' => current.push(c),
            _ => flush_word(&mut current, &mut tokens)?,
        }
    }
    flush_word(&mut current, &mut tokens)?;

    Ok(tokens)
}

fn flush_word(current: &mut String, tokens: &mut Vec<Token>) -> Result<(), String> {
    if current.is_empty() {
        return Ok(());
    }
    let word = std::mem::take(current);
    if let Some(caps) = ORDINAL_RE.captures(&word) {
        let n: u32 = caps[1]
            .parse()
            .map_err(|_| format!("Ordinal {word} is too large"))?;
        if n == 0 {
            return Err("Ordinals start at 1st".to_string());
        }
        tokens.push(Token::Ordinal(n));
    } else {
        tokens.push(Token::Word(word));
    }
    Ok(())
}

fn parse_locator(body: &str) -> Result<RawLocator, String> {
    let body = body.trim();
    if body.starts_with('/') || body.starts_with("./") || body.starts_with('(') {
        return Ok(RawLocator::XPath(body.to_string()));
    }
    match body.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            Ok(RawLocator::Attribute {
                name: name.trim().to_string(),
                value: value.to_string(),
            })
        }
        _ => Err(format!(
            "Locator {{{body}}} must be an attribute (name=value) or an xpath"
        )),
    }
}
