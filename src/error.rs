use thiserror::Error;

/// Pipeline stage a resolve failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Search,
    Explore,
    BookInfo,
    ChapterList,
    Content,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Search => "search",
            Self::Explore => "explore",
            Self::BookInfo => "book info",
            Self::ChapterList => "chapter list",
            Self::Content => "content",
        };
        f.write_str(name)
    }
}

/// A structurally malformed rule expression or rule URL.
///
/// Always a source configuration bug: surfaced immediately, never
/// retried. Absent or non-matching rules are `None` outcomes instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed rule: {0}")]
pub struct RuleError(pub String);

/// Transport-level failure. Not retried internally; callers may retry
/// the whole operation.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("rendered fetch of {url} failed: {message}")]
    Rendered { url: String, message: String },

    #[error("source requires rendered fetch but no rendered fetcher is configured")]
    RenderedUnavailable,

    #[error("failed to build http client: {0}")]
    Client(String),
}

/// Top-level error for the five orchestrated operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Extraction produced no usable result where one was required,
    /// e.g. an empty chapter list.
    #[error("{stage} resolved no usable result: {message}")]
    Resolve { stage: Stage, message: String },
}

impl Error {
    pub(crate) fn resolve(stage: Stage, message: impl Into<String>) -> Self {
        Self::Resolve {
            stage,
            message: message.into(),
        }
    }
}
