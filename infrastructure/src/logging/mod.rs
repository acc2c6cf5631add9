//! Structured conversation logging.
//!
//! Provides [`JsonlConversationLogger`], an append-only JSONL writer
//! implementing the [`ConversationLogger`](harness_application::ConversationLogger)
//! port.

mod jsonl_logger;

pub use jsonl_logger::JsonlConversationLogger;
