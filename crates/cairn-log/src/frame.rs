use cairn_types::{Addr, Score};

use crate::error::{LogError, LogResult};

/// Bytes before a payload: 4-byte length prefix plus the embedded score.
pub const FRAME_HEADER_SIZE: usize = Addr::HEADER_SIZE as usize;

/// Largest payload whose frame length still fits the u32 prefix.
pub const MAX_PAYLOAD_SIZE: u64 = u32::MAX as u64 - Score::SIZE as u64;

/// Encode `payload` and its score into an on-disk frame.
///
/// The length prefix covers score and payload, not itself.
pub fn encode_frame(score: &Score, payload: &[u8]) -> LogResult<Vec<u8>> {
    let payload_len = payload.len() as u64;
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(LogError::FrameTooLarge {
            len: Score::SIZE as u64 + payload_len,
        });
    }
    let prefix = (Score::SIZE as u64 + payload_len) as u32;

    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&prefix.to_be_bytes());
    buf.extend_from_slice(score.as_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Split a frame header into its body length and embedded score.
pub(crate) fn decode_header(header: &[u8; FRAME_HEADER_SIZE]) -> (u32, Score) {
    let mut prefix = [0u8; 4];
    prefix.copy_from_slice(&header[..4]);
    let mut score = [0u8; Score::SIZE];
    score.copy_from_slice(&header[4..]);
    (u32::from_be_bytes(prefix), Score::from_raw(score))
}
