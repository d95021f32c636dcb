//! Storage layer for Silent Refactor - JSONL persistence with in-memory caching.
//!
//! Jobs, repositories and events are stored as whole records. Job transitions
//! are persisted with a compare-and-swap on the record revision.

mod events;
mod jobs;
mod jsonl;
mod repositories;
mod traits;

pub use events::{EVENTS_COLLECTION, EventStore};
pub use jobs::{JOBS_COLLECTION, JobStore};
pub use jsonl::JsonlStorage;
pub use repositories::{REPOSITORIES_COLLECTION, RepositoryStore};
pub use traits::{Filter, FilterOp, HasId, Storage};
