pub mod comment;
pub mod group;
pub mod post;
pub mod social_graph;
pub mod user;

/// Row identifier. Assigned in insertion order by every store backend.
pub type Id = i64;
