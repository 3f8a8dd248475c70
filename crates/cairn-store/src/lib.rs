//! Content-addressed key-value storage for cairn.
//!
//! A [`Store`] keeps values in an append-only data file and hands back the
//! [`Score`] (content digest) of each value as its key. Writing the same
//! bytes twice stores them once. Every read is checked against its score,
//! so corrupted bytes are reported instead of returned.
//!
//! # Files
//!
//! A store named `X` lives in the configured root directory as:
//!
//! - `X.data` -- the data log (required)
//! - `X.idx` -- an index snapshot (optional; rebuilt from `X.data` when
//!   missing, stale or damaged)
//!
//! # Concurrency
//!
//! A `Store` is `Send + Sync` and can be shared through an `Arc`. Writes,
//! rebuilds and close are serialized by an internal lock; reads run
//! concurrently with each other and see every write that has returned.

pub mod config;
pub mod error;
pub mod naming;
pub mod store;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use naming::{NameGenerator, RandomNames};
pub use store::Store;

pub use cairn_log::SyncMode;
pub use cairn_types::{make_score, Score};
