//! Tablekeep Engine library.
//!
//! Authoritative session state for a shared tabletop: participants propose
//! actions, handlers contributed by the core and by extensions validate and
//! execute them, and every accepted action reaches all participants as one
//! versioned patch batch.
//!
//! ## Structure
//!
//! - `registry/` - owner-tagged, priority-ordered action handlers
//! - `lifecycle` - turn/encounter/session resets of document state
//! - `pipeline/` - the per-session mutation queue and approval flow
//! - `use_cases/` - core handlers (encounters, tokens, session reset)
//! - `extensions` - the registration API for extensions
//! - `sessions` - one pipeline per active session
//! - `infrastructure/` - ports, adapters, config and telemetry
//! - `api/` - WebSocket entry point
//! - `app` - application composition

pub mod api;
pub mod app;
pub mod extensions;
pub mod infrastructure;
pub mod lifecycle;
pub mod pipeline;
pub mod registry;
pub mod sessions;
pub mod use_cases;

pub use app::App;
