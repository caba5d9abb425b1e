//! attend-core — face embedding matching and wire message shapes.
//!
//! Pure domain logic: cosine similarity over embeddings, best-match
//! selection against a reference population, and the serde shapes the
//! pipeline delivers to connections. No I/O, no async.

pub mod matching;
pub mod messages;
pub mod types;

pub use matching::{find_matches, DEFAULT_SIMILARITY_THRESHOLD};
pub use types::{compare, BoundingBox, DetectedFace, Embedding, MatchResult, ReferenceIdentity};
