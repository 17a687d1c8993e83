//! Quill: assistant core for a hosted wiki workspace.
//!
//! Watches documents for user-typed command markers (`/ai`, `/ai-file`,
//! `/summarize`, `/enhance-title`, `/related`), executes AI-assisted operations,
//! and writes results back as document edits and comments.
//!
//! The crate is organized around the event pipeline:
//! webhook event -> worker pool -> [`processor::EventProcessor`] -> command
//! detection -> handler dispatch -> idempotent document mutation.
//!
//! External collaborators are capability traits: [`outline::WorkspaceClient`]
//! for the wiki API and [`ai::AiClient`] for the completion provider. Both ship
//! HTTP implementations and first-class mocks.

pub mod ai;
pub mod command;
pub mod comments;
pub mod dedupe;
pub mod editor;
pub mod error;
pub mod event;
pub mod handlers;
pub mod outline;
pub mod processor;
pub mod ratelimit;
pub mod recovery;
pub mod taxonomy;
pub mod worker;

pub use error::Error;
pub use event::WebhookEvent;
