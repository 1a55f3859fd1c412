//! A small CSS selector subset: compound selectors built from a tag name,
//! `.class`, `#id` and `[attr]` / `[attr="value"]` parts, combined into a
//! comma-separated list. Commas and brackets inside quoted attribute values
//! are part of the value. Combinators are not supported.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unsupported character {found:?} at {position} in {input:?}")]
    Unexpected {
        input: String,
        position: usize,
        found: char,
    },
    #[error("unterminated attribute selector in {0:?}")]
    Unterminated(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeMatch {
    Present,
    Equals(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompoundSelector {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: Vec<(String, AttributeMatch)>,
}

/// Matches when any of its alternatives matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    alternatives: Vec<CompoundSelector>,
    source: String,
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let alternatives = split_alternatives(input)
            .into_iter()
            .map(|part| parse_compound(part.trim(), input))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            alternatives,
            source: input.trim().to_string(),
        })
    }

    /// `[name]`
    pub fn has_attribute(name: &str) -> Self {
        Self {
            alternatives: vec![CompoundSelector {
                attributes: vec![(name.to_string(), AttributeMatch::Present)],
                ..CompoundSelector::default()
            }],
            source: format!("[{}]", name),
        }
    }

    pub fn alternatives(&self) -> &[CompoundSelector] {
        &self.alternatives
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn parse_compound(part: &str, input: &str) -> Result<CompoundSelector, SelectorError> {
    if part.is_empty() {
        return Err(SelectorError::Empty);
    }

    let chars: Vec<char> = part.chars().collect();
    let mut compound = CompoundSelector::default();
    let mut i = 0;

    let read_ident = |start: usize| -> (String, usize) {
        let mut end = start;
        while end < chars.len() && is_ident_char(chars[end]) {
            end += 1;
        }
        (chars[start..end].iter().collect(), end)
    };

    if chars[0] == '*' {
        i = 1;
    } else if is_ident_char(chars[0]) {
        let (tag, end) = read_ident(0);
        compound.tag = Some(tag.to_ascii_lowercase());
        i = end;
    }

    while i < chars.len() {
        match chars[i] {
            '.' | '#' => {
                let (name, end) = read_ident(i + 1);
                if name.is_empty() {
                    return Err(unexpected(input, part, i));
                }
                if chars[i] == '.' {
                    compound.classes.push(name);
                } else {
                    compound.id = Some(name);
                }
                i = end;
            }
            '[' => {
                let close = attribute_end(&chars, i)
                    .ok_or_else(|| SelectorError::Unterminated(input.to_string()))?;
                let body: String = chars[i + 1..close].iter().collect();
                compound.attributes.push(parse_attribute(&body));
                i = close + 1;
            }
            _ => return Err(unexpected(input, part, i)),
        }
    }

    Ok(compound)
}

/// Splits on commas that sit outside `[...]` and outside quotes, so
/// `[aria-label="a,b"]` stays one alternative.
fn split_alternatives(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_brackets = false;
    let mut quote: Option<char> = None;

    for (index, c) in input.char_indices() {
        match (quote, c) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') if in_brackets => quote = Some(c),
            (None, '[') => in_brackets = true,
            (None, ']') => in_brackets = false,
            (None, ',') if !in_brackets => {
                parts.push(&input[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

/// Index of the `]` closing the attribute selector opened at `open`,
/// skipping brackets inside quoted values.
fn attribute_end(chars: &[char], open: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (index, &c) in chars.iter().enumerate().skip(open + 1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, ']') => return Some(index),
            _ => {}
        }
    }
    None
}

fn parse_attribute(body: &str) -> (String, AttributeMatch) {
    match body.split_once('=') {
        Some((name, value)) => {
            let value = value.trim();
            let unquoted = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            (
                name.trim().to_string(),
                AttributeMatch::Equals(unquoted.to_string()),
            )
        }
        None => (body.trim().to_string(), AttributeMatch::Present),
    }
}

fn unexpected(input: &str, part: &str, index: usize) -> SelectorError {
    SelectorError::Unexpected {
        input: input.to_string(),
        position: index,
        found: part.chars().nth(index).unwrap_or(' '),
    }
}
