use std::io::{self, Read};

use cairn_types::{Addr, Score};

use crate::frame::{decode_header, FRAME_HEADER_SIZE};

/// One complete frame found by a [`FrameScanner`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScannedFrame {
    pub score: Score,
    pub addr: Addr,
}

/// Lazy, single forward pass over a framed byte source.
///
/// Yields the score and payload address of each complete frame and skips
/// payload bytes without buffering them. The scan ends at a clean end of
/// input, or at the first frame that is incomplete or has a length prefix
/// too small to hold a score. In the latter two cases the remaining bytes
/// are a torn tail: they were never fully committed and are not reported
/// as an error.
pub struct FrameScanner<R> {
    reader: R,
    position: u64,
    torn_tail: bool,
    done: bool,
}

impl<R: Read> FrameScanner<R> {
    /// Scan `reader` from the start of a data file.
    pub fn new(reader: R) -> Self {
        Self::starting_at(reader, 0)
    }

    /// Scan `reader`, which is already positioned at file offset `base`.
    ///
    /// `base` must be a frame boundary; addresses are reported relative to
    /// the start of the file.
    pub fn starting_at(reader: R, base: u64) -> Self {
        Self {
            reader,
            position: base,
            torn_tail: false,
            done: false,
        }
    }

    /// File offset one past the last complete frame seen so far.
    pub fn valid_len(&self) -> u64 {
        self.position
    }

    /// Whether the scan stopped at an incomplete or malformed trailing frame.
    pub fn torn_tail(&self) -> bool {
        self.torn_tail
    }

    fn stop_torn(&mut self) -> Option<io::Result<ScannedFrame>> {
        self.torn_tail = true;
        self.done = true;
        None
    }
}

impl<R: Read> Iterator for FrameScanner<R> {
    type Item = io::Result<ScannedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut header = [0u8; FRAME_HEADER_SIZE];
        match read_full(&mut self.reader, &mut header) {
            Ok(0) => {
                self.done = true;
                return None;
            }
            Ok(n) if n < FRAME_HEADER_SIZE => return self.stop_torn(),
            Ok(_) => {}
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        }

        let (body_len, score) = decode_header(&header);
        let Some(payload_len) = u64::from(body_len).checked_sub(Score::SIZE as u64) else {
            return self.stop_torn();
        };

        let skipped = match io::copy(&mut (&mut self.reader).take(payload_len), &mut io::sink()) {
            Ok(n) => n,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        if skipped < payload_len {
            return self.stop_torn();
        }

        let addr = Addr::for_frame(self.position, payload_len);
        self.position = addr.end();
        Some(Ok(ScannedFrame { score, addr }))
    }
}

/// Fill `buf` as far as the reader allows; returns the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
