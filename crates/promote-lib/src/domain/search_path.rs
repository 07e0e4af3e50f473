//! Parser for content store search paths.
//!
//! A search path is a `/`-separated list of steps, each an element type with
//! optional bracketed predicates:
//!
//! ```text
//! /content/folder[@name='Sales']/folder[@name='Q1']/module[@name='Orders']
//! ```
//!
//! Only `@name` predicates matter here. Named steps become folder segments,
//! except the last one, which names the target object. Quoted literals may use
//! single or double quotes; a doubled quote inside a literal is an escaped
//! quote.

use std::fmt;
use thiserror::Error;

/// Target name the content store uses for "no module selected".
pub const EMPTY_SENTINEL: &str = "Empty";

/// Errors that can occur while parsing a search path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchPathError {
    /// A quoted literal is never closed.
    #[error("unterminated quoted literal starting at offset {offset}")]
    UnterminatedQuote {
        /// Byte offset of the opening quote.
        offset: usize,
    },

    /// A predicate bracket is never closed.
    #[error("unclosed predicate bracket starting at offset {offset}")]
    UnclosedBracket {
        /// Byte offset of the `[`.
        offset: usize,
    },

    /// A `]` closes nothing.
    #[error("unexpected ']' at offset {offset}")]
    UnexpectedBracket {
        /// Byte offset of the `]`.
        offset: usize,
    },

    /// An `@name` predicate has no quoted value.
    #[error("malformed @name predicate in step '{step}'")]
    NamePredicate {
        /// The offending step.
        step: String,
    },
}

/// One `/`-separated step of a search path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Element type, e.g. `folder`, `module`, `content`.
    pub element: String,
    /// Value of the `@name` predicate, if present.
    pub name: Option<String>,
}

/// What the last named step of a path refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathTarget {
    /// A named object.
    Object(String),
    /// The `Empty` sentinel: nothing is referenced.
    Empty,
    /// The path carries no `@name` predicate at all (e.g. `storeID("...")`).
    Unnamed,
}

/// A parsed search path: folder names from the outermost folder inwards, then the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPath {
    /// Named steps before the last one.
    pub folders: Vec<String>,
    /// The last named step.
    pub target: PathTarget,
}

impl SearchPath {
    /// Parse a search path string.
    ///
    /// # Errors
    ///
    /// Returns [`SearchPathError`] if a literal or bracket is left open, or an
    /// `@name` predicate has no quoted value.
    pub fn parse(input: &str) -> Result<Self, SearchPathError> {
        let steps = parse_steps(input)?;
        Ok(Self::from_steps(&steps))
    }

    /// Split named steps into folders and target.
    fn from_steps(steps: &[Step]) -> Self {
        let mut names: Vec<String> = steps.iter().filter_map(|s| s.name.clone()).collect();
        let target = match names.pop() {
            Some(name) if name == EMPTY_SENTINEL => PathTarget::Empty,
            Some(name) => PathTarget::Object(name),
            None => PathTarget::Unnamed,
        };
        Self {
            folders: names,
            target,
        }
    }

    /// The outermost folder, which is expected to be a main folder.
    #[must_use]
    pub fn main_folder(&self) -> Option<&str> {
        self.folders.first().map(String::as_str)
    }

    /// Folders between the main folder and the target.
    #[must_use]
    pub fn inner_folders(&self) -> &[String] {
        self.folders.get(1..).unwrap_or_default()
    }
}

impl fmt::Display for SearchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for folder in &self.folders {
            write!(f, "/{folder}")?;
        }
        match &self.target {
            PathTarget::Object(name) => write!(f, "/{name}"),
            PathTarget::Empty => write!(f, "/<{EMPTY_SENTINEL}>"),
            PathTarget::Unnamed => write!(f, "/<unnamed>"),
        }
    }
}

/// Split a search path into its steps.
///
/// # Errors
///
/// See [`SearchPath::parse`].
pub fn parse_steps(input: &str) -> Result<Vec<Step>, SearchPathError> {
    split_top_level(input, '/')?
        .into_iter()
        .filter(|(_, raw)| !raw.trim().is_empty())
        .map(|(offset, raw)| parse_step(offset, raw))
        .collect()
}

/// Split on `separator` outside of quotes and brackets, keeping each piece's offset.
fn split_top_level(input: &str, separator: char) -> Result<Vec<(usize, &str)>, SearchPathError> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut quote: Option<(char, usize)> = None;
    let mut bracket: Option<usize> = None;
    let mut chars = input.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if let Some((q, _)) = quote {
            if c == q {
                // A doubled quote stays inside the literal
                if chars.peek().is_some_and(|&(_, next)| next == q) {
                    chars.next();
                } else {
                    quote = None;
                }
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some((c, i)),
            '[' if bracket.is_none() => bracket = Some(i),
            ']' if bracket.is_some() => bracket = None,
            ']' => return Err(SearchPathError::UnexpectedBracket { offset: i }),
            _ if c == separator && bracket.is_none() => {
                pieces.push((start, input.get(start..i).unwrap_or_default()));
                start = i.saturating_add(c.len_utf8());
            }
            _ => {}
        }
    }

    if let Some((_, offset)) = quote {
        return Err(SearchPathError::UnterminatedQuote { offset });
    }
    if let Some(offset) = bracket {
        return Err(SearchPathError::UnclosedBracket { offset });
    }
    pieces.push((start, input.get(start..).unwrap_or_default()));
    Ok(pieces)
}

/// Parse one step starting at byte `offset` of the whole path.
fn parse_step(offset: usize, raw: &str) -> Result<Step, SearchPathError> {
    let (element, predicates) = raw
        .find('[')
        .and_then(|i| raw.split_at_checked(i))
        .unwrap_or((raw, ""));

    let mut name = None;
    for predicate in predicates_of(offset, predicates)? {
        let Some(rest) = predicate.trim().strip_prefix("@name") else {
            continue;
        };
        let value = rest
            .trim_start()
            .strip_prefix('=')
            .and_then(|v| read_literal(v.trim()))
            .ok_or_else(|| SearchPathError::NamePredicate {
                step: raw.trim().to_owned(),
            })?;
        name = Some(value);
    }

    Ok(Step {
        element: element.trim().to_owned(),
        name,
    })
}

/// Bodies of the `[...]` groups at the start of `input`.
fn predicates_of(offset: usize, input: &str) -> Result<Vec<&str>, SearchPathError> {
    let mut bodies = Vec::new();
    let mut rest = input;
    while let Some((before, after)) = rest.split_once('[') {
        let bracket_at = offset
            .saturating_add(input.len().saturating_sub(rest.len()))
            .saturating_add(before.len());
        let (body, closed) = closing_bracket(after)
            .and_then(|end| after.split_at_checked(end))
            .ok_or(SearchPathError::UnclosedBracket { offset: bracket_at })?;
        bodies.push(body);
        rest = closed.strip_prefix(']').unwrap_or(closed);
    }
    Ok(bodies)
}

/// Byte offset of the `]` closing a predicate body, skipping quoted literals.
fn closing_bracket(body: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut chars = body.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match quote {
            Some(q) if c == q => {
                if chars.peek().is_some_and(|&(_, next)| next == q) {
                    chars.next();
                } else {
                    quote = None;
                }
            }
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == ']' => return Some(i),
            None => {}
        }
    }
    None
}

/// Read a quoted literal that makes up the whole of `input`, unescaping doubled quotes.
fn read_literal(input: &str) -> Option<String> {
    let mut chars = input.chars().peekable();
    let quote = chars.next().filter(|c| *c == '\'' || *c == '"')?;
    let mut value = String::new();
    while let Some(c) = chars.next() {
        if c == quote {
            if chars.peek() == Some(&quote) {
                chars.next();
                value.push(quote);
            } else {
                return chars.all(char::is_whitespace).then_some(value);
            }
        } else {
            value.push(c);
        }
    }
    None
}
