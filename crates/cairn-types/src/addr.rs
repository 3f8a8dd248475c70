use serde::{Deserialize, Serialize};

use crate::score::Score;

/// Width of a frame's big-endian length prefix.
pub const LENGTH_PREFIX_SIZE: u64 = 4;

/// Location of a record's payload inside a data file.
///
/// `offset` points at the first payload byte, past the length prefix and
/// the embedded score; `length` counts payload bytes only. Addresses are
/// only produced by an append or by a log scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Addr {
    pub offset: u64,
    pub length: u64,
}

impl Addr {
    /// Bytes in front of a payload: length prefix plus embedded score.
    pub const HEADER_SIZE: u64 = LENGTH_PREFIX_SIZE + Score::SIZE as u64;

    /// Address of the payload of a frame starting at `frame_start`.
    pub fn for_frame(frame_start: u64, payload_len: u64) -> Self {
        Self {
            offset: frame_start + Self::HEADER_SIZE,
            length: payload_len,
        }
    }

    /// Offset one past the end of the enclosing frame.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// Offset of the enclosing frame's length prefix.
    pub fn frame_start(&self) -> u64 {
        self.offset - Self::HEADER_SIZE
    }
}
