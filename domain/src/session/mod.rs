//! Session domain.
//!
//! - [`entities::Message`]: a single message within a session
//! - [`transcript::Transcript`]: append-only, causally ordered message log
//! - [`turn::TurnPhase`]: per-turn state machine
//! - [`event::SessionEvent`]: raw backend events

pub mod entities;
pub mod event;
pub mod transcript;
pub mod turn;
