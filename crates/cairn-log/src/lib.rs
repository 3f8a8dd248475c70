//! Append-only data log for cairn.
//!
//! A data file is a bare sequence of frames, with no header, footer or
//! padding:
//!
//! ```text
//! [4 bytes: length of score + payload (big-endian u32)]
//! [16 bytes: score of the payload]
//! [N bytes: payload]
//! ```
//!
//! The [`Index`] mapping scores to payload addresses lives in memory and is
//! always reproducible by scanning the data file front to back. A
//! [`snapshot`] of it may be persisted next to the data file to skip that
//! scan at startup, but it is never trusted over the log itself.
//!
//! [`Datalog`] owns the file handles and is the only type here that appends
//! to or reads from a data file.

pub mod datalog;
pub mod error;
pub mod frame;
pub mod index;
pub mod scan;
pub mod snapshot;

pub use datalog::{Datalog, SyncMode};
pub use error::{IoContext, LogError, LogResult, SnapshotError};
pub use frame::{encode_frame, FRAME_HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use index::Index;
pub use scan::{FrameScanner, ScannedFrame};
