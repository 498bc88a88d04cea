use serde::{Deserialize, Serialize};

use crate::error::RuleError;

/// Kind of content a source provides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Text,
    Audio,
}

impl SourceKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "text" => Some(Self::Text),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }
}

/// Field rules shared by the search and explore list pages.
///
/// Every rule is optional: an absent rule leaves the field empty, and
/// only `book_list`, `name` and `book_url` gate whether an entry is
/// produced at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BookListRules {
    pub book_list: Option<String>,
    pub name: Option<String>,
    pub author: Option<String>,
    pub book_url: Option<String>,
    pub kind: Option<String>,
    pub cover_url: Option<String>,
    pub intro: Option<String>,
    pub last_chapter: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InfoRules {
    pub name: Option<String>,
    pub author: Option<String>,
    pub intro: Option<String>,
    pub kind: Option<String>,
    pub cover_url: Option<String>,
    pub last_chapter: Option<String>,
    pub toc_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TocRules {
    pub chapter_list: Option<String>,
    pub chapter_name: Option<String>,
    pub chapter_url: Option<String>,
    pub is_volume: Option<String>,
    pub next_toc_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentRules {
    pub content: Option<String>,
    pub next_content_url: Option<String>,
    /// Ordered `pattern##replacement` regex entries applied to every
    /// extracted content page.
    pub replace_regex: Vec<String>,
}

/// Configuration for one book-providing site.
///
/// Owned by the caller's persistence layer; the engine holds a read
/// reference for the duration of an operation and never mutates it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BookSource {
    /// Base URL of the site; the fallback base for relative rule URLs.
    pub source_url: String,
    pub source_name: String,
    pub kind: SourceKind,
    /// Whether this source's pages require a rendered (browser) fetch.
    pub rendered: bool,
    /// Search URL template; `{{key}}` and `{{page}}` are interpolated.
    pub search_url: Option<String>,
    /// Header-generation rule: an inline JSON map, or an evaluator
    /// expression yielding one.
    pub header_rule: Option<String>,
    pub search: BookListRules,
    pub explore: BookListRules,
    pub info: InfoRules,
    pub toc: TocRules,
    pub content: ContentRules,
}

impl BookSource {
    pub fn from_json(raw: &str) -> Result<Self, RuleError> {
        serde_json::from_str(raw).map_err(|err| RuleError(format!("invalid source json: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_kind_variants() {
        assert_eq!(SourceKind::parse("text"), Some(SourceKind::Text));
        assert_eq!(SourceKind::parse(" AUDIO "), Some(SourceKind::Audio));
        assert_eq!(SourceKind::parse(""), Some(SourceKind::Text));
        assert_eq!(SourceKind::parse("video"), None);
    }

    #[test]
    fn from_json_fills_absent_groups_with_defaults() {
        let source = BookSource::from_json(
            r#"{
                "source_url": "https://books.example",
                "source_name": "example",
                "search_url": "/search?q={{key}}",
                "search": {"book_list": "rows:book|", "name": "col:1", "book_url": "col:2"}
            }"#,
        )
        .unwrap();

        assert_eq!(source.source_url, "https://books.example");
        assert_eq!(source.kind, SourceKind::Text);
        assert!(!source.rendered);
        assert_eq!(source.search.book_list.as_deref(), Some("rows:book|"));
        assert!(source.toc.chapter_list.is_none());
        assert!(source.content.replace_regex.is_empty());
    }

    #[test]
    fn from_json_rejects_malformed_input() {
        let err = BookSource::from_json("{not json").unwrap_err();
        assert!(err.to_string().contains("invalid source json"));
    }
}
