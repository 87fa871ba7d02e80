//! Tournaments module
//!
//! Lifecycle, membership and the authorization gate around every relation
//! mutation.

pub mod gate;
pub mod service;

// Re-export commonly used types
pub use gate::{GateError, RelationGate};
pub use service::TournamentService;
