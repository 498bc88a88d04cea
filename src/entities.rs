use serde::{Deserialize, Serialize};

use crate::source::SourceKind;

/// A book identified by its canonical detail-page URL.
///
/// Created from a [`SearchResult`] the user picked, then enriched in
/// place by the info resolver. Persistence is the caller's concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Book {
    pub url: String,
    pub name: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intro: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_chapter: Option<String>,
    /// Table-of-contents URL; defaults to `url` when the detail page
    /// doubles as the toc page.
    pub toc_url: String,
    pub source_kind: SourceKind,
    /// Raw detail-page body, cached against `url`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info_html: Option<String>,
    /// Raw toc-page body, cached against `toc_url`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toc_html: Option<String>,
}

impl Book {
    pub(crate) fn cached_info_html(&self) -> Option<&str> {
        self.info_html.as_deref().filter(|html| !html.is_empty())
    }

    pub(crate) fn cached_toc_html(&self) -> Option<&str> {
        self.toc_html.as_deref().filter(|html| !html.is_empty())
    }
}

/// List-display subset of a book, produced by the search and explore
/// resolvers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub name: String,
    pub author: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intro: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_chapter: Option<String>,
    pub source_kind: SourceKind,
}

impl SearchResult {
    /// Promote a picked list entry to a full book record.
    pub fn into_book(self) -> Book {
        Book {
            url: self.url,
            name: self.name,
            author: self.author,
            intro: self.intro,
            kind: self.kind,
            cover_url: self.cover_url,
            last_chapter: self.last_chapter,
            toc_url: String::new(),
            source_kind: self.source_kind,
            info_html: None,
            toc_html: None,
        }
    }
}

/// One entry of a book's ordered chapter list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    /// Contiguous position within the book, assigned after the whole
    /// toc chain has been resolved.
    pub index: u32,
    pub title: String,
    pub url: String,
    /// Marks a non-content heading such as a volume title.
    pub is_volume: bool,
}
