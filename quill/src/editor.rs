//! Idempotent document edits via hidden HTML-comment markers.
//!
//! Managed sections are wrapped in `<!-- AI-{NAME}-START -->` /
//! `<!-- AI-{NAME}-END -->` pairs. Applying a section twice with the same body
//! is a textual no-op; applying with a new body replaces only the body; and a
//! user who deletes the markers takes ownership of the section for good (when
//! `respect_user_ownership` is on).
//!
//! These markers are part of the wire contract: documents edited by earlier
//! deployments already contain them and must be recognized.

/// Managed section names and their canonical placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// Stored near the top of the document.
    Summary,
    /// Stored at the bottom, after a `---` separator.
    SearchTerms,
}

/// Byte window scanned for existing markers. Keeps repeated applies cheap on
/// large documents.
const SUMMARY_SCAN_BYTES: usize = 5 * 1024;
const SEARCH_TERMS_SCAN_BYTES: usize = 10 * 1024;

impl Section {
    pub fn name(&self) -> &'static str {
        match self {
            Section::Summary => "SUMMARY",
            Section::SearchTerms => "SEARCH-TERMS",
        }
    }

    pub fn start_marker(&self) -> String {
        format!("<!-- AI-{}-START -->", self.name())
    }

    pub fn end_marker(&self) -> String {
        format!("<!-- AI-{}-END -->", self.name())
    }

    /// The legacy, marker-less shape of this section from before the marker
    /// protocol. Detected so user-owned copies are not clobbered.
    fn legacy_prefix(&self) -> &'static str {
        match self {
            Section::Summary => "> **Summary**:",
            Section::SearchTerms => "**Search terms**:",
        }
    }
}

/// Result of one apply: the new text, the body the section previously held
/// (when markers were found), and whether the text changed at all.
#[derive(Debug, Clone)]
pub struct ApplyResult {
    pub text: String,
    pub previous_body: Option<String>,
    pub changed: bool,
}

/// Inserts or replaces the named section so that the final text contains
/// exactly one marked block with `body` inside.
pub fn apply_section(
    text: &str,
    section: Section,
    body: &str,
    respect_user_ownership: bool,
) -> ApplyResult {
    let start_marker = section.start_marker();
    let end_marker = section.end_marker();
    let block = render_block(section, body);

    match find_marker_pair(text, section, &start_marker, &end_marker) {
        MarkerScan::Pair { start, end } => {
            let previous = text[start + start_marker.len()..end]
                .trim_matches('\n')
                .to_string();
            let mut out = String::with_capacity(text.len());
            out.push_str(&text[..start]);
            out.push_str(&block);
            out.push_str(&text[end + end_marker.len()..]);
            let out = collapse_newlines(&out);
            let changed = out != text;
            ApplyResult {
                text: out,
                previous_body: Some(previous),
                changed,
            }
        }
        MarkerScan::Malformed => {
            tracing::warn!(section = section.name(), "single orphan marker, treating as absent");
            insert_fresh(text, section, &block, respect_user_ownership)
        }
        MarkerScan::Absent => insert_fresh(text, section, &block, respect_user_ownership),
    }
}

enum MarkerScan {
    /// Start and end found in order: byte offsets of each marker's start.
    Pair { start: usize, end: usize },
    /// Only one of the two markers present.
    Malformed,
    Absent,
}

fn scan_window(text: &str, section: Section) -> (usize, usize) {
    let len = text.len();
    match section {
        Section::Summary => (0, clamp_to_char_boundary(text, SUMMARY_SCAN_BYTES.min(len))),
        Section::SearchTerms => (
            clamp_to_char_boundary(text, len.saturating_sub(SEARCH_TERMS_SCAN_BYTES)),
            len,
        ),
    }
}

fn clamp_to_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx.min(text.len())
}

fn find_marker_pair(
    text: &str,
    section: Section,
    start_marker: &str,
    end_marker: &str,
) -> MarkerScan {
    let (window_start, window_end) = scan_window(text, section);
    let window = &text[window_start..window_end];

    let start = window.find(start_marker).map(|i| i + window_start);
    match start {
        Some(start) => {
            // The end marker may sit past the scan window for a long body.
            match text[start..].find(end_marker) {
                Some(rel) => {
                    let end = start + rel;
                    if text[end + end_marker.len()..].contains(start_marker) {
                        tracing::warn!(
                            section = section.name(),
                            "multiple marker pairs, replacing the first"
                        );
                    }
                    MarkerScan::Pair { start, end }
                }
                None => MarkerScan::Malformed,
            }
        }
        None => {
            if window.contains(end_marker) {
                MarkerScan::Malformed
            } else {
                MarkerScan::Absent
            }
        }
    }
}

fn render_block(section: Section, body: &str) -> String {
    format!(
        "{}\n{}\n{}",
        section.start_marker(),
        body.trim_matches('\n'),
        section.end_marker()
    )
}

fn insert_fresh(
    text: &str,
    section: Section,
    block: &str,
    respect_user_ownership: bool,
) -> ApplyResult {
    if let Some(without_legacy) = find_and_remove_legacy(text, section) {
        if respect_user_ownership {
            // The user owns their unmarked copy; leave the document alone.
            return ApplyResult {
                text: text.to_string(),
                previous_body: None,
                changed: false,
            };
        }
        return insert_at_canonical_location(&without_legacy, section, block);
    }
    insert_at_canonical_location(text, section, block)
}

/// Returns the text with the legacy section line removed, or `None` when no
/// legacy pattern exists.
fn find_and_remove_legacy(text: &str, section: Section) -> Option<String> {
    let prefix = section.legacy_prefix();
    match section {
        Section::Summary => {
            // Legacy summary: the document's first line.
            let first_line_end = text.find('\n').unwrap_or(text.len());
            if text[..first_line_end].trim_start().starts_with(prefix) {
                Some(collapse_newlines(text[first_line_end..].trim_start_matches('\n')))
            } else {
                None
            }
        }
        Section::SearchTerms => {
            let (window_start, _) = scan_window(text, section);
            let tail = &text[window_start..];
            let mut offset = 0usize;
            for line in tail.split_inclusive('\n') {
                if line.trim_start().starts_with(prefix) {
                    let abs_start = window_start + offset;
                    let abs_end = abs_start + line.len();
                    let mut out = String::with_capacity(text.len());
                    out.push_str(&text[..abs_start]);
                    out.push_str(&text[abs_end..]);
                    return Some(collapse_newlines(&out));
                }
                offset += line.len();
            }
            None
        }
    }
}

fn insert_at_canonical_location(text: &str, section: Section, block: &str) -> ApplyResult {
    let out = match section {
        Section::Summary => {
            if text.trim().is_empty() {
                format!("{block}\n")
            } else {
                format!("{block}\n\n{text}")
            }
        }
        Section::SearchTerms => {
            let trimmed = text.trim_end();
            if trimmed.is_empty() {
                format!("{block}\n")
            } else {
                format!("{trimmed}\n\n---\n\n{block}\n")
            }
        }
    };
    ApplyResult {
        text: out,
        previous_body: None,
        changed: true,
    }
}

/// Collapses runs of three or more newlines to exactly two. Applied after any
/// edit that removes text.
pub fn collapse_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = 0usize;
    for c in text.chars() {
        if c == '\n' {
            run += 1;
            if run <= 2 {
                out.push(c);
            }
        } else {
            run = 0;
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY_A: &str = "> **Summary**: Old.";
    const BODY_B: &str = "> **Summary**: New.";

    #[test]
    fn fresh_summary_inserted_at_top() {
        let r = apply_section("Body text.", Section::Summary, BODY_A, true);
        assert!(r.changed);
        assert!(r.text.starts_with("<!-- AI-SUMMARY-START -->\n> **Summary**: Old.\n<!-- AI-SUMMARY-END -->\n\nBody text."));
        assert!(r.previous_body.is_none());
    }

    #[test]
    fn fresh_search_terms_appended_after_separator() {
        let r = apply_section(
            "Body text.\n",
            Section::SearchTerms,
            "**Search terms**: pooling, pgbouncer",
            true,
        );
        assert!(r.text.starts_with("Body text."));
        assert!(r.text.contains("\n\n---\n\n<!-- AI-SEARCH-TERMS-START -->"));
        assert!(r.text.ends_with("<!-- AI-SEARCH-TERMS-END -->\n"));
    }

    #[test]
    fn reapply_same_body_is_textual_noop() {
        let once = apply_section("Body.", Section::Summary, BODY_A, true);
        let twice = apply_section(&once.text, Section::Summary, BODY_A, true);
        assert_eq!(once.text, twice.text);
        assert!(!twice.changed);
        assert_eq!(twice.previous_body.as_deref(), Some(BODY_A));
    }

    #[test]
    fn reapply_with_new_body_replaces_only_the_block() {
        let once = apply_section("Body.", Section::Summary, BODY_A, true);
        let twice = apply_section(&once.text, Section::Summary, BODY_B, true);
        let direct = apply_section("Body.", Section::Summary, BODY_B, true);
        assert_eq!(twice.text, direct.text);
        assert_eq!(twice.previous_body.as_deref(), Some(BODY_A));
        assert!(twice.text.contains("New."));
        assert!(!twice.text.contains("Old."));
    }

    #[test]
    fn user_owned_legacy_summary_is_left_alone() {
        let text = "> **Summary**: Mine, hands off.\n\nBody.";
        let r = apply_section(text, Section::Summary, BODY_B, true);
        assert!(!r.changed);
        assert_eq!(r.text, text);
    }

    #[test]
    fn legacy_summary_replaced_when_ownership_disabled() {
        let text = "> **Summary**: Stale generated copy.\n\nBody.";
        let r = apply_section(text, Section::Summary, BODY_B, false);
        assert!(r.changed);
        assert!(r.text.contains("<!-- AI-SUMMARY-START -->"));
        assert!(r.text.contains("New."));
        assert!(!r.text.contains("Stale generated copy."));
    }

    #[test]
    fn orphan_start_marker_treated_as_absent() {
        let text = "<!-- AI-SUMMARY-START -->\nno end marker\n\nBody.";
        let r = apply_section(text, Section::Summary, BODY_A, true);
        // A fresh block is inserted at the top; the orphan line survives as text.
        assert!(r.text.starts_with("<!-- AI-SUMMARY-START -->\n> **Summary**: Old.\n<!-- AI-SUMMARY-END -->"));
    }

    #[test]
    fn first_of_multiple_pairs_is_replaced() {
        let text = "<!-- AI-SUMMARY-START -->\none\n<!-- AI-SUMMARY-END -->\n\nmiddle\n\n<!-- AI-SUMMARY-START -->\ntwo\n<!-- AI-SUMMARY-END -->";
        let r = apply_section(text, Section::Summary, BODY_B, true);
        assert_eq!(r.previous_body.as_deref(), Some("one"));
        assert!(r.text.contains("New."));
        assert!(r.text.contains("two"));
    }

    #[test]
    fn summary_outside_scan_window_not_found() {
        let mut text = "x".repeat(6 * 1024);
        text.push_str("\n<!-- AI-SUMMARY-START -->\ndeep\n<!-- AI-SUMMARY-END -->\n");
        let r = apply_section(&text, Section::Summary, BODY_A, true);
        // Markers beyond the first 5 KB are invisible; a fresh block lands on top.
        assert!(r.text.starts_with("<!-- AI-SUMMARY-START -->"));
        assert!(r.previous_body.is_none());
    }

    #[test]
    fn search_terms_found_within_tail_window() {
        let mut text = "x".repeat(20 * 1024);
        text.push_str("\n\n---\n\n<!-- AI-SEARCH-TERMS-START -->\nold terms\n<!-- AI-SEARCH-TERMS-END -->\n");
        let r = apply_section(&text, Section::SearchTerms, "new terms", true);
        assert_eq!(r.previous_body.as_deref(), Some("old terms"));
        assert!(r.text.contains("new terms"));
        assert!(!r.text.contains("old terms"));
    }

    #[test]
    fn collapse_newlines_caps_runs_at_two() {
        assert_eq!(collapse_newlines("a\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_newlines("a\n\nb"), "a\n\nb");
        assert_eq!(collapse_newlines("a\nb"), "a\nb");
    }

    #[test]
    fn empty_document_gets_block_only() {
        let r = apply_section("", Section::Summary, BODY_A, true);
        assert_eq!(
            r.text,
            "<!-- AI-SUMMARY-START -->\n> **Summary**: Old.\n<!-- AI-SUMMARY-END -->\n"
        );
    }
}
