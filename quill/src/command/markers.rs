//! Marker-line edits on document text: removal after success, and the
//! `/ai-file` <-> `?ai-file` conversion used by the guidance loop.

use crate::editor::collapse_newlines;

/// Removes the first line exactly equal to `raw`, then collapses newline runs.
/// Returns the text unchanged when the line is absent (e.g. the user edited it
/// between fetch and update).
pub fn remove_marker_line(text: &str, raw: &str) -> String {
    let mut removed = false;
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        if !removed && line.trim_end_matches(['\n', '\r']) == raw {
            removed = true;
            continue;
        }
        out.push_str(line);
    }
    if removed {
        collapse_newlines(&out)
    } else {
        out
    }
}

/// Removes every `/ai-file` and `?ai-file` marker line in one pass. A
/// successful filing run must leave neither: the pending breadcrumb and the
/// re-promoted command are cleaned up together.
pub fn remove_filing_markers(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut removed = false;
    for line in text.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);
        if is_filing_marker(content) {
            removed = true;
            continue;
        }
        out.push_str(line);
    }
    if removed {
        collapse_newlines(&out)
    } else {
        out
    }
}

/// Replaces the first line exactly equal to `raw` with `replacement` (which
/// may span multiple lines). Used by inline answers.
pub fn replace_marker_line(text: &str, raw: &str, replacement: &str) -> String {
    let mut replaced = false;
    let mut out = String::with_capacity(text.len() + replacement.len());
    for line in text.split_inclusive('\n') {
        if !replaced && line.trim_end_matches(['\n', '\r']) == raw {
            replaced = true;
            out.push_str(replacement);
            out.push_str(&line[line.trim_end_matches(['\n', '\r']).len()..]);
            continue;
        }
        out.push_str(line);
    }
    out
}

/// Rewrites the `/ai-file` marker line to `?ai-file` in place, preserving any
/// guidance after the marker. The conversion is the persistent record of a
/// low-confidence attempt.
pub fn convert_file_to_pending(text: &str, raw: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut converted = false;
    for line in text.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);
        if !converted && content == raw {
            if let Some(rest) = content.strip_prefix("/ai-file") {
                out.push_str("?ai-file");
                out.push_str(rest);
                out.push_str(&line[content.len()..]);
                converted = true;
                continue;
            }
        }
        out.push_str(line);
    }
    out
}

fn is_filing_marker(line: &str) -> bool {
    for prefix in ["/ai-file", "?ai-file"] {
        if let Some(rest) = line.strip_prefix(prefix) {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                return true;
            }
        }
    }
    false
}
