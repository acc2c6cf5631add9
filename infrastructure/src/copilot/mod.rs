//! Copilot CLI adapter
//!
//! Speaks Content-Length framed JSON-RPC 2.0 to a `copilot --server`
//! process and implements the session engine's connection ports.

pub mod client;
pub mod error;
pub mod history;
pub mod protocol;
pub mod router;
pub mod transport;

pub use client::{ClientOptions, ClientState, CopilotClient};
pub use error::CopilotError;
pub use protocol::{ModelInfo, PingResult};
pub use router::MessageRouter;
