//! attendd: the attendance-matching daemon.
//!
//! Images arrive per connection, are matched against a cached reference
//! population on a fixed CPU pool, and the results fan back out: a private
//! response to the submitter and a broadcast of any attendance changes to
//! every connection. See [`pipeline::submit_image_for_matching`] for the
//! entry point and [`context::AppContext`] for lifecycle.

use uuid::Uuid;

pub mod attendance;
pub mod cache;
pub mod config;
pub mod consumers;
pub mod context;
pub mod error;
pub mod ledger;
pub mod pipeline;
pub mod pool;
pub mod registry;
pub mod relay;
pub mod store;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

/// Identifies one live client connection.
pub type ConnectionId = Uuid;
/// Identifies one submitted matching task.
pub type TaskId = Uuid;

pub use context::{AppContext, Collaborators};
pub use pipeline::submit_image_for_matching;
