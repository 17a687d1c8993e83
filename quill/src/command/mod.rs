//! Command detection: find user-typed markers in document text and parse them
//! into dispatchable commands.
//!
//! Commands are ephemeral; the marker line in the document text is the
//! persistent representation. `?ai-file` is detected but never executed: it is
//! the breadcrumb a low-confidence filing attempt leaves behind.

mod markers;

pub use markers::{
    convert_file_to_pending, remove_filing_markers, remove_marker_line, replace_marker_line,
};

use regex::Regex;

/// Every marker the detector recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// `/ai <question>`: answer a question as a comment.
    Ask,
    /// `/ai-file [guidance]`: file the document into a collection.
    File,
    /// `?ai-file [guidance]`: pending low-confidence filing; never executed.
    FilePending,
    /// `/summarize`: insert or refresh the summary block.
    Summarize,
    /// `/enhance-title`: rewrite a vague title.
    EnhanceTitle,
    /// `/related`: post related documents as a comment.
    Related,
}

impl CommandKind {
    /// The marker as the user types it.
    pub fn marker(&self) -> &'static str {
        match self {
            CommandKind::Ask => "/ai",
            CommandKind::File => "/ai-file",
            CommandKind::FilePending => "?ai-file",
            CommandKind::Summarize => "/summarize",
            CommandKind::EnhanceTitle => "/enhance-title",
            CommandKind::Related => "/related",
        }
    }

    /// Inverse of [`marker`](Self::marker); used to map config strings.
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "/ai" => Some(CommandKind::Ask),
            "/ai-file" => Some(CommandKind::File),
            "?ai-file" => Some(CommandKind::FilePending),
            "/summarize" => Some(CommandKind::Summarize),
            "/enhance-title" => Some(CommandKind::EnhanceTitle),
            "/related" => Some(CommandKind::Related),
            _ => None,
        }
    }

    /// Short slug used in task and checkpoint IDs.
    pub fn slug(&self) -> &'static str {
        match self {
            CommandKind::Ask => "qa",
            CommandKind::File => "file",
            CommandKind::FilePending => "file-pending",
            CommandKind::Summarize => "summarize",
            CommandKind::EnhanceTitle => "title",
            CommandKind::Related => "related",
        }
    }

    /// Whether this command is ever dispatched to a handler.
    pub fn executable(&self) -> bool {
        !matches!(self, CommandKind::FilePending)
    }
}

/// One detected command: kind, the full matched line, the trimmed argument
/// string, and the zero-based line number.
#[derive(Debug, Clone)]
pub struct Command {
    pub kind: CommandKind,
    pub raw: String,
    pub args: String,
    pub line: usize,
}

/// Line-anchored detector. Compile once, share per process.
pub struct CommandDetector {
    ask: Regex,
    file: Regex,
    pending: Regex,
    summarize: Regex,
    enhance_title: Regex,
    related: Regex,
}

impl Default for CommandDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandDetector {
    pub fn new() -> Self {
        Self {
            ask: Regex::new(r"^/ai\s+(.+)$").expect("ask pattern"),
            file: Regex::new(r"^/ai-file(?:\s+(.*))?$").expect("file pattern"),
            pending: Regex::new(r"^\?ai-file(?:\s+(.*))?$").expect("pending pattern"),
            summarize: Regex::new(r"^/summarize\s*$").expect("summarize pattern"),
            enhance_title: Regex::new(r"^/enhance-title\s*$").expect("enhance-title pattern"),
            related: Regex::new(r"^/related\s*$").expect("related pattern"),
        }
    }

    /// All commands in the document, in line order.
    pub fn detect(&self, text: &str) -> Vec<Command> {
        let mut found = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            if let Some(cmd) = self.match_line(line, line_no) {
                found.push(cmd);
            }
        }
        found
    }

    fn match_line(&self, line: &str, line_no: usize) -> Option<Command> {
        let make = |kind: CommandKind, args: Option<&str>| Command {
            kind,
            raw: line.to_string(),
            args: args.unwrap_or("").trim().to_string(),
            line: line_no,
        };

        if let Some(caps) = self.ask.captures(line) {
            return Some(make(CommandKind::Ask, caps.get(1).map(|m| m.as_str())));
        }
        if let Some(caps) = self.file.captures(line) {
            return Some(make(CommandKind::File, caps.get(1).map(|m| m.as_str())));
        }
        if let Some(caps) = self.pending.captures(line) {
            return Some(make(
                CommandKind::FilePending,
                caps.get(1).map(|m| m.as_str()),
            ));
        }
        if self.summarize.is_match(line) {
            return Some(make(CommandKind::Summarize, None));
        }
        if self.enhance_title.is_match(line) {
            return Some(make(CommandKind::EnhanceTitle, None));
        }
        if self.related.is_match(line) {
            return Some(make(CommandKind::Related, None));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_question_with_argument() {
        let d = CommandDetector::new();
        let found = d.detect("intro\n/ai What is our deployment process?\nrest");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, CommandKind::Ask);
        assert_eq!(found[0].args, "What is our deployment process?");
        assert_eq!(found[0].line, 1);
    }

    #[test]
    fn bare_ai_without_question_is_not_a_command() {
        let d = CommandDetector::new();
        assert!(d.detect("/ai").is_empty());
        assert!(d.detect("/ai   ").is_empty());
    }

    #[test]
    fn file_guidance_is_optional() {
        let d = CommandDetector::new();
        let bare = d.detect("/ai-file");
        assert_eq!(bare[0].kind, CommandKind::File);
        assert_eq!(bare[0].args, "");

        let guided = d.detect("/ai-file backend implementation");
        assert_eq!(guided[0].args, "backend implementation");
    }

    #[test]
    fn pending_marker_detected_but_not_executable() {
        let d = CommandDetector::new();
        let found = d.detect("?ai-file previous guidance");
        assert_eq!(found[0].kind, CommandKind::FilePending);
        assert!(!found[0].kind.executable());
    }

    #[test]
    fn argumentless_commands_reject_arguments() {
        let d = CommandDetector::new();
        assert_eq!(d.detect("/summarize")[0].kind, CommandKind::Summarize);
        assert_eq!(d.detect("/enhance-title")[0].kind, CommandKind::EnhanceTitle);
        assert_eq!(d.detect("/related")[0].kind, CommandKind::Related);
        assert!(d.detect("/summarize everything please").is_empty());
    }

    #[test]
    fn mid_line_markers_are_ignored() {
        let d = CommandDetector::new();
        assert!(d.detect("see /ai-file for details").is_empty());
        assert!(d.detect("  /summarize").is_empty());
    }

    #[test]
    fn multiple_commands_in_line_order() {
        let d = CommandDetector::new();
        let text = "/summarize\n\nbody\n\n/ai what is this?\n/related";
        let found = d.detect(text);
        let kinds: Vec<_> = found.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![CommandKind::Summarize, CommandKind::Ask, CommandKind::Related]
        );
    }

    #[test]
    fn dual_filing_markers_both_detected() {
        let d = CommandDetector::new();
        let text = "/ai-file backend\n?ai-file old breadcrumb\nbody";
        let found = d.detect(text);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].kind, CommandKind::File);
        assert_eq!(found[1].kind, CommandKind::FilePending);
    }
}
