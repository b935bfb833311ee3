//! Path grammar for addressing locations inside a JSON tree.
//!
//! Grammar:
//! ```text
//! Path      ::= '$'? Segment*
//! Segment   ::= '.' Name | '[' Bracket ']' | Name        (bare Name only first)
//! Name      ::= any chars except '.' and '['             ('*' and '**' are wildcards)
//! Bracket   ::= '*' | '**' | Digits | Quoted | Literal
//! Quoted    ::= '\'' ... '\'' | '"' ... '"'              (backslash escapes the next char)
//! ```
//!
//! The canonical [`Display`](std::fmt::Display) form is used for deduplication
//! and error messages: `a[0].x`, `["a.b"]`, `[*]`, `[**]`, and `$` for the root.

use std::fmt;
use std::str::FromStr;

use sitepipe_types::TransformError;

/// One step of a [`JsonPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Property(String),
    Index(usize),
    /// `*`: every child of the current node.
    Wildcard,
    /// `**`: the current node and every descendant.
    RecursiveWildcard,
}

impl Segment {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Segment::Wildcard | Segment::RecursiveWildcard)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

impl JsonPath {
    /// The empty path, addressing the whole document.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Parse a path string.
    pub fn parse(input: &str) -> Result<Self, TransformError> {
        let segments = Parser::new(input).parse()?;
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether `prefix` addresses this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &JsonPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    pub fn has_wildcards(&self) -> bool {
        self.segments.iter().any(Segment::is_wildcard)
    }

    /// A new path with `segment` appended.
    pub fn child(&self, segment: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    /// Append every segment of `relative` to this path.
    pub fn join(&self, relative: &JsonPath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(relative.segments.iter().cloned());
        Self { segments }
    }
}

impl FromStr for JsonPath {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "$"
        && name != "*"
        && name != "**"
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '$' | '@'))
}

fn write_quoted(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    f.write_str("[\"")?;
    for c in name.chars() {
        if c == '"' || c == '\\' {
            f.write_str("\\")?;
        }
        write!(f, "{c}")?;
    }
    f.write_str("\"]")
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("$");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Property(name) if is_plain_name(name) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                }
                Segment::Property(name) => write_quoted(f, name)?,
                Segment::Index(index) => write!(f, "[{index}]")?,
                Segment::Wildcard => f.write_str("[*]")?,
                Segment::RecursiveWildcard => f.write_str("[**]")?,
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        let trimmed = input.trim();
        Self {
            input: trimmed,
            chars: trimmed.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn error(&self, message: impl Into<String>) -> TransformError {
        TransformError::Syntax {
            path: self.input.to_string(),
            message: message.into(),
        }
    }

    fn parse(&mut self) -> Result<Vec<Segment>, TransformError> {
        let mut segments = Vec::new();

        // `$` is the root marker only when it stands alone; `$schema` is a name.
        if self.peek() == Some('$')
            && matches!(self.chars.get(1), None | Some('.') | Some('['))
        {
            self.pos = 1;
        }

        if let Some(c) = self.peek() {
            if c != '.' && c != '[' {
                segments.push(self.bare()?);
            }
        }

        while let Some(c) = self.peek() {
            match c {
                '.' => {
                    self.pos += 1;
                    match self.peek() {
                        None => return Err(self.error("trailing '.'")),
                        Some('.') | Some('[') => {
                            return Err(self.error(format!(
                                "expected a property name after '.' at offset {}",
                                self.pos
                            )))
                        }
                        Some(_) => segments.push(self.bare()?),
                    }
                }
                '[' => {
                    self.pos += 1;
                    segments.push(self.bracket()?);
                }
                other => {
                    return Err(self.error(format!(
                        "unexpected '{other}' at offset {}",
                        self.pos
                    )))
                }
            }
        }

        Ok(segments)
    }

    fn bare(&mut self) -> Result<Segment, TransformError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '.' || c == '[' {
                break;
            }
            if c == ']' {
                return Err(self.error(format!("unmatched ']' at offset {}", self.pos)));
            }
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        Ok(match name.as_str() {
            "" => return Err(self.error("empty property name")),
            "*" => Segment::Wildcard,
            "**" => Segment::RecursiveWildcard,
            _ => Segment::Property(name),
        })
    }

    fn bracket(&mut self) -> Result<Segment, TransformError> {
        if let Some(quote @ ('\'' | '"')) = self.peek() {
            self.pos += 1;
            let name = self.quoted(quote)?;
            if self.peek() != Some(']') {
                return Err(self.error(format!(
                    "expected ']' after quoted name at offset {}",
                    self.pos
                )));
            }
            self.pos += 1;
            return Ok(Segment::Property(name));
        }

        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == ']' {
                break;
            }
            self.pos += 1;
        }
        if self.peek().is_none() {
            return Err(self.error("unterminated '['"));
        }
        let token: String = self.chars[start..self.pos].iter().collect();
        self.pos += 1;

        let token = token.trim();
        if token.is_empty() {
            return Err(self.error("empty brackets"));
        }
        match token {
            "*" => Ok(Segment::Wildcard),
            "**" => Ok(Segment::RecursiveWildcard),
            t if t.chars().all(|c| c.is_ascii_digit()) => t
                .parse::<usize>()
                .map(Segment::Index)
                .map_err(|_| self.error(format!("index '{t}' is too large"))),
            t if t.starts_with('-') && t[1..].chars().all(|c| c.is_ascii_digit()) && t.len() > 1 => {
                Err(self.error(format!("negative index '{t}'")))
            }
            t => Ok(Segment::Property(t.to_string())),
        }
    }

    fn quoted(&mut self, quote: char) -> Result<String, TransformError> {
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated quoted name")),
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c) => {
                            out.push(c);
                            self.pos += 1;
                        }
                        None => return Err(self.error("dangling escape")),
                    }
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }
}
