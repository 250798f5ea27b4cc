//! Tablekeep Shared - Wire protocol shared by the engine and participants
//!
//! This crate contains everything both ends of a session connection need:
//! - WebSocket message types (ClientMessage, ServerMessage)
//! - Roles, join errors and error codes
//! - `Replica`, the participant-side copy of a session kept current by patches
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - serde, serde_json, uuid, thiserror, tracing
//! 2. **No authority** - replicas never decide anything; they only apply
//!    what the engine committed

pub mod messages;
pub mod replica;
pub mod responses;

// =============================================================================
// WebSocket Message Types
// =============================================================================
pub use messages::{ClientMessage, ServerMessage};

// =============================================================================
// Replica Tracking
// =============================================================================
pub use replica::{Replica, ReplicaError, ReplicaUpdate};

// =============================================================================
// Response Types
// =============================================================================
pub use responses::{rejection_codes, ErrorCode, JoinError, ParticipantRole};
