//! Terminal formatting for search results, resources, and chat turns.

use std::fmt::Write as _;

use crossterm::style::Stylize;
use docseek_client::{ConversationTurn, StreamReport};
use docseek_core::{ChunkDetail, HealthResponse, Resource, SearchResult, Source};

/// Longest passage preview printed for a result.
const PREVIEW_CHARS: usize = 240;

/// Shorten `text` to at most `max` characters, collapsing whitespace.
pub fn preview(text: &str, max: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut.trim_end())
}

/// One numbered search result.
pub fn search_result(index: usize, result: &SearchResult) -> String {
    format!(
        "{} {} {}\n    {}",
        format!("{index:>3}.").bold(),
        format!("{} p.{}", result.file_name(), result.page_number()).cyan(),
        format!("(rerank {:.3}, vector {:.3})", result.rerank_score, result.vector_score).dark_grey(),
        preview(&result.text, PREVIEW_CHARS)
    )
}

/// Summary line after a page of search results.
pub fn search_footer(shown: usize, total: usize, has_more: bool, time_ms: Option<f64>) -> String {
    let mut line = format!("{shown} of {total} results");
    if let Some(ms) = time_ms {
        let _ = write!(line, " in {ms:.0} ms");
    }
    if has_more {
        line.push_str(", more available");
    }
    line.dark_grey().to_string()
}

/// One resource row.
pub fn resource(resource: &Resource) -> String {
    let uploaded = resource.uploaded_at_utc().map_or_else(
        || resource.uploaded_at.clone(),
        |at| at.format("%Y-%m-%d %H:%M").to_string(),
    );
    format!(
        "{}  {}  {} chunks  {}",
        resource.resource_id.as_str().dark_grey(),
        resource.filename.as_str().bold(),
        resource.num_chunks,
        uploaded
    )
}

/// One chunk of a resource.
pub fn chunk(chunk: &ChunkDetail) -> String {
    format!(
        "{} {}\n    {}",
        format!("p.{}", chunk.page_number).cyan(),
        chunk.chunk_id.as_str().dark_grey(),
        preview(&chunk.text, PREVIEW_CHARS)
    )
}

/// Backend health report.
pub fn health(health: &HealthResponse) -> String {
    let mut out = format!("status: {}\n", health.status);
    for (service, ready) in &health.services {
        let mark = if *ready { "ready".green() } else { "down".red() };
        let _ = writeln!(out, "  {service}: {mark}");
    }
    let _ = write!(out, "indexed chunks: {}", health.index.total_chunks);
    out
}

/// Citation list printed under an answer.
pub fn sources(sources: &[Source]) -> String {
    let mut out = String::new();
    for (i, source) in sources.iter().enumerate() {
        let _ = writeln!(
            out,
            "  [{}] {} p.{} ({:.2})",
            i + 1,
            source.file_name,
            source.page_number,
            source.score
        );
    }
    out
}

/// Text appended to `turn` since `printed` bytes were shown.
pub fn new_text(turn: &ConversationTurn, printed: usize) -> &str {
    turn.content.get(printed..).unwrap_or_default()
}

/// Trailer printed after an answer finishes.
pub fn turn_trailer(turn: &ConversationTurn, report: &StreamReport) -> String {
    let mut out = String::new();
    if let Some(query) = &turn.rewritten_query {
        let _ = writeln!(out, "{}", format!("searched for: {query}").dark_grey());
    }
    if let Some(list) = turn.sources.as_deref().filter(|s| !s.is_empty()) {
        let _ = writeln!(out, "{}", "sources:".dark_grey());
        out.push_str(&sources(list));
    }
    let dropped = report.diagnostics.dropped();
    if dropped > 0 {
        let _ = writeln!(
            out,
            "{}",
            format!("({dropped} malformed frames skipped)").dark_grey()
        );
    }
    out
}
