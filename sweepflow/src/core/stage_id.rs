//! Closed set of pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One phase of the content pipeline.
///
/// The chain order is fixed: fetch, scrape, summarize, tag. Stages are
/// coupled through the shared work store, not through in-memory handoff,
/// so every stage runs on every pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Discover new article URLs.
    #[serde(alias = "fetch_urls")]
    Fetch,
    /// Extract article content for discovered URLs.
    #[serde(alias = "scraper", alias = "scrape_content")]
    Scrape,
    /// Produce summaries for scraped articles.
    #[serde(alias = "summarizer", alias = "summarize_articles")]
    Summarize,
    /// Attach tags to summarized articles.
    #[serde(alias = "tagging", alias = "tag_articles")]
    Tag,
}

impl StageId {
    /// All stages in chain order.
    pub const CHAIN: [Self; 4] = [Self::Fetch, Self::Scrape, Self::Summarize, Self::Tag];

    /// Position of the stage in the chain.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Fetch => 0,
            Self::Scrape => 1,
            Self::Summarize => 2,
            Self::Tag => 3,
        }
    }

    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Scrape => "scrape",
            Self::Summarize => "summarize",
            Self::Tag => "tag",
        }
    }

    /// Directory under the scripts root that holds this stage's implementations.
    #[must_use]
    pub const fn script_dir(self) -> &'static str {
        match self {
            Self::Fetch => "fetch_urls",
            Self::Scrape => "scraper",
            Self::Summarize => "summarizer",
            Self::Tag => "tagging",
        }
    }

    /// Returns true if this stage reports a count of newly discovered items.
    #[must_use]
    pub const fn reports_new_items(self) -> bool {
        matches!(self, Self::Fetch)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stage name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage '{0}' (expected one of: fetch, scrape, summarize, tag)")]
pub struct UnknownStage(pub String);

impl FromStr for StageId {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fetch" | "fetch_urls" => Ok(Self::Fetch),
            "scrape" | "scraper" | "scrape_content" => Ok(Self::Scrape),
            "summarize" | "summarizer" | "summarize_articles" => Ok(Self::Summarize),
            "tag" | "tagging" | "tag_articles" => Ok(Self::Tag),
            _ => Err(UnknownStage(s.to_string())),
        }
    }
}
