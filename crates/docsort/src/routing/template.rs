//! `{placeholder}` templates for destination folders and file names.

use thiserror::Error;

use crate::error::RoutingError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed folder or filename template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateSyntaxError {
    #[error("unclosed '{{' at position {0}")]
    Unclosed(usize),

    #[error("unmatched '}}' at position {0}")]
    UnmatchedClose(usize),

    #[error("empty placeholder at position {0}")]
    EmptyPlaceholder(usize),

    #[error("invalid placeholder name '{0}' (letters, digits, '_' and '-' only)")]
    InvalidName(String),
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateSyntaxError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        match inner {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => return Err(TemplateSyntaxError::Unclosed(pos)),
                            _ => name.push(inner),
                        }
                    }
                    if !closed {
                        return Err(TemplateSyntaxError::Unclosed(pos));
                    }
                    let name = name.trim().to_string();
                    if name.is_empty() {
                        return Err(TemplateSyntaxError::EmptyPlaceholder(pos));
                    }
                    if !name
                        .chars()
                        .all(|ch| ch.is_alphanumeric() || ch == '_' || ch == '-')
                    {
                        return Err(TemplateSyntaxError::InvalidName(name));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name));
                }
                '}' => return Err(TemplateSyntaxError::UnmatchedClose(pos)),
                _ => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Placeholder names in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Text outside placeholders, concatenated.
    pub fn literal_text(&self) -> String {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Literal(text) => Some(text.as_str()),
                Segment::Placeholder(_) => None,
            })
            .collect()
    }

    /// Substitutes every placeholder with its sanitized value.
    ///
    /// A placeholder whose value is missing or sanitizes to nothing is an error.
    pub fn render<F>(&self, mut lookup: F) -> Result<String, RoutingError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let value = lookup(name)
                        .map(|v| sanitize_value(&v))
                        .filter(|v| !v.is_empty())
                        .ok_or_else(|| RoutingError::UnresolvedPlaceholder {
                            placeholder: name.clone(),
                            template: self.source.clone(),
                        })?;
                    out.push_str(&value);
                }
            }
        }
        Ok(out)
    }
}

/// Makes a substituted value safe to use inside a single path component.
///
/// Whitespace and `\ / : * ? " < > |` become `_`, control characters are dropped,
/// runs of `_` collapse and leading or trailing `_` are trimmed. Case is preserved.
pub fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        let mapped = if c.is_whitespace()
            || matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
        {
            '_'
        } else if c.is_control() {
            continue;
        } else {
            c
        };
        if mapped == '_' && out.ends_with('_') {
            continue;
        }
        out.push(mapped);
    }
    out.trim_matches('_').to_string()
}
