//! Persistent state for the assistant: separate crate with its own SQLite storage.
//!
//! Owns every durable table the pipeline relies on:
//! - **question_state**: answered-question dedup (hash -> comment id).
//! - **dead_letter_queue**: tasks whose retries are exhausted, with their last checkpoint.
//! - **task_checkpoints**: step flags for multi-step tasks, deleted on success.
//! - **overflow_events**: webhook events spilled when the in-memory queue was full.
//! - **failed_webhook_events**: events awaiting timed reprocessing.
//! - **command_log**: best-effort audit of detected commands (never load-bearing).
//! - **catchup_state**: single row recording the last completed catch-up scan.
//!
//! One process owns the database file; writers are serialized behind the
//! connection mutex, readers share it.

mod store;

pub use store::{
    CatchupState, CommandStatus, DlqEntry, FailedEvent, OverflowEvent, QuestionState,
    ReprocessStrategy, Store, StoreError,
};
