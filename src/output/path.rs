//! Destination path templates
//!
//! A template is a `/`-separated list of segments with placeholders:
//!
//! | Placeholder   | Value                                   |
//! |---------------|-----------------------------------------|
//! | `{id}`        | work identifier                         |
//! | `{title}`     | work title                              |
//! | `{author}`    | author display name                     |
//! | `{author_id}` | author identifier, `unknown` if absent  |
//! | `{page}`      | zero-based page index                   |
//! | `{file_name}` | file name suggested by the service      |
//! | `{ext}`       | extension of `file_name`, `bin` if none |
//!
//! # Usage Example
//!
//! ```rust
//! use artwork_crawler::output::PathTemplate;
//! use artwork_crawler::{ContentId, SubPart, WorkItem};
//!
//! let template = PathTemplate::parse("{author}/{id}_p{page}.{ext}").unwrap();
//! let part = SubPart::new(0, "https://img.example/1_p0.png", "1_p0.png");
//! let item = WorkItem::new(ContentId::new(1), "Sunset", "a/b", vec![part.clone()]);
//!
//! let path = template.render(&item, &part).unwrap();
//! assert_eq!(path, std::path::PathBuf::from("a_b/1_p0.png"));
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::{OutputError, OutputResult};
use crate::{SubPart, WorkItem};

/// Template used when none is configured
pub const DEFAULT_TEMPLATE: &str = "{id}_p{page}.{ext}";

/// Cleans a substituted value before it becomes part of a path
pub type Sanitizer = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Sanitizer that only neutralises path separators and dot segments
pub fn default_sanitizer() -> Sanitizer {
    Arc::new(|value: &str| {
        let cleaned: String = value
            .chars()
            .map(|c| match c {
                '/' | '\\' | '\0' => '_',
                c => c,
            })
            .collect();
        if cleaned == "." || cleaned == ".." {
            "_".to_string()
        } else {
            cleaned
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    Title,
    Author,
    AuthorId,
    Page,
    FileName,
    Ext,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "id" => Self::Id,
            "title" => Self::Title,
            "author" => Self::Author,
            "author_id" => Self::AuthorId,
            "page" => Self::Page,
            "file_name" => Self::FileName,
            "ext" => Self::Ext,
            _ => return None,
        })
    }

    fn value(&self, item: &WorkItem, part: &SubPart) -> String {
        match self {
            Self::Id => item.id.to_string(),
            Self::Title => item.title.clone(),
            Self::Author => item.author.clone(),
            Self::AuthorId => item
                .author_id
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            Self::Page => part.index.to_string(),
            Self::FileName => part.file_name.clone(),
            Self::Ext => part.extension().unwrap_or("bin").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Field(Field),
}

/// Parsed destination path template
#[derive(Clone)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Vec<Token>>,
    sanitizer: Sanitizer,
}

impl PathTemplate {
    /// Parse a template using [`default_sanitizer`]
    ///
    /// # Errors
    /// Returns [`OutputError::InvalidTemplate`] for unknown or unterminated
    /// placeholders, empty segments, absolute templates or `..` segments
    pub fn parse(template: &str) -> OutputResult<Self> {
        if template.starts_with('/') || template.starts_with('\\') {
            return Err(OutputError::InvalidTemplate(format!(
                "'{template}' must be relative"
            )));
        }

        let segments = template
            .split('/')
            .map(|segment| parse_segment(template, segment))
            .collect::<OutputResult<Vec<_>>>()?;

        Ok(Self {
            source: template.to_string(),
            segments,
            sanitizer: default_sanitizer(),
        })
    }

    /// Replace the sanitizer applied to substituted values
    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    /// Template text
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Relative path of a sub-part
    ///
    /// # Errors
    /// Returns [`OutputError::InvalidPath`] if a segment renders empty or to a
    /// dot segment
    pub fn render(&self, item: &WorkItem, part: &SubPart) -> OutputResult<PathBuf> {
        let mut path = PathBuf::new();
        for segment in &self.segments {
            let rendered: String = segment
                .iter()
                .map(|token| match token {
                    Token::Literal(text) => text.clone(),
                    Token::Field(field) => (self.sanitizer)(&field.value(item, part)),
                })
                .collect();

            if rendered.is_empty() || rendered == "." || rendered == ".." {
                return Err(OutputError::InvalidPath(format!(
                    "template '{}' renders segment '{}' for work {} page {}",
                    self.source, rendered, item.id, part.index
                )));
            }
            path.push(rendered);
        }
        Ok(path)
    }
}

impl Default for PathTemplate {
    fn default() -> Self {
        Self {
            source: DEFAULT_TEMPLATE.to_string(),
            segments: vec![vec![
                Token::Field(Field::Id),
                Token::Literal("_p".to_string()),
                Token::Field(Field::Page),
                Token::Literal(".".to_string()),
                Token::Field(Field::Ext),
            ]],
            sanitizer: default_sanitizer(),
        }
    }
}

impl fmt::Debug for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathTemplate")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

fn parse_segment(template: &str, segment: &str) -> OutputResult<Vec<Token>> {
    if segment.is_empty() || segment == "." || segment == ".." {
        return Err(OutputError::InvalidTemplate(format!(
            "'{template}' contains an empty or dot segment"
        )));
    }

    let mut tokens = Vec::new();
    let mut rest = segment;
    while let Some(open) = rest.find('{') {
        if open > 0 {
            tokens.push(Token::Literal(rest[..open].to_string()));
        }
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            OutputError::InvalidTemplate(format!("'{template}' has an unterminated placeholder"))
        })?;
        let name = &after[..close];
        let field = Field::parse(name).ok_or_else(|| {
            OutputError::InvalidTemplate(format!(
                "'{template}' uses unknown placeholder '{{{name}}}'"
            ))
        })?;
        tokens.push(Token::Field(field));
        rest = &after[close + 1..];
    }
    if !rest.is_empty() {
        tokens.push(Token::Literal(rest.to_string()));
    }
    Ok(tokens)
}
