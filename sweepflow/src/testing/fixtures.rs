//! Test fixtures for stage tables and script directories.

use std::path::{Path, PathBuf};

use crate::config::{StageConfig, StageTable};
use crate::core::StageId;

/// A stage table with the production implementation layout.
///
/// Fetch and scrape have a single implementation; summarize has a primary
/// and two fallbacks; tag has a primary and one fallback.
#[must_use]
pub fn content_pipeline_table() -> StageTable {
    stage_table(
        &["fetch_urls_feedparser"],
        &["scrape_puppeteer"],
        &[
            "summarizer_groq_llama8b",
            "summarizer_claude_haiku",
            "summarizer_gemini_flash",
        ],
        &["tagging_groq_llama8b", "tagging_claude_haiku"],
    )
}

/// Builds a table from one implementation list per stage, in chain order.
#[must_use]
pub fn stage_table(fetch: &[&str], scrape: &[&str], summarize: &[&str], tag: &[&str]) -> StageTable {
    let configs = [
        StageConfig::from_list(StageId::Fetch, fetch.iter().copied()),
        StageConfig::from_list(StageId::Scrape, scrape.iter().copied()),
        StageConfig::from_list(StageId::Summarize, summarize.iter().copied()),
        StageConfig::from_list(StageId::Tag, tag.iter().copied()),
    ];
    match StageTable::new(configs) {
        Ok(table) => table,
        Err(e) => unreachable!("all stages supplied: {e}"),
    }
}

/// Writes an executable shell script at `<root>/<stage dir>/<name>`.
///
/// # Panics
///
/// Panics if the file cannot be written.
#[cfg(unix)]
#[allow(clippy::unwrap_used)]
pub fn write_script(root: &Path, stage: StageId, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let dir = root.join(stage.script_dir());
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}
