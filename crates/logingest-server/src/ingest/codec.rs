//! Line framing for uploaded log files
//!
//! Splits a byte stream into lines on `\n`, `\r\n` or a lone `\r`. Invalid
//! UTF-8 is replaced rather than rejected, so one bad byte costs at most one
//! unparseable line.
//!
//! A line longer than `max_length` is not buffered: its bytes are dropped as
//! they arrive and the line comes out as [`LineFrame::Overlong`].

use bytes::{Buf, BytesMut};
use std::io;
use tokio_util::codec::Decoder;

/// Default upper bound for one line (1 MiB).
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// One framed line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineFrame {
    Line(String),
    /// A line over the length limit; only its size is kept.
    Overlong { bytes: usize },
}

#[derive(Debug)]
pub struct LineCodec {
    /// Bytes before this index are known to hold no separator.
    next_index: usize,
    max_length: usize,
    /// Inside an overlong line, dropping bytes until the next separator.
    discarding: bool,
    discarded: usize,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_BYTES)
    }
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length,
            discarding: false,
            discarded: 0,
        }
    }

    fn take_line(&mut self, buf: &mut BytesMut, len: usize, separator_len: usize) -> LineFrame {
        let line = buf.split_to(len);
        buf.advance(separator_len);
        self.next_index = 0;

        if self.discarding || len > self.max_length {
            let bytes = self.discarded + len;
            self.discarding = false;
            self.discarded = 0;
            return LineFrame::Overlong { bytes };
        }

        LineFrame::Line(String::from_utf8_lossy(&line).into_owned())
    }

    fn discard(&mut self, buf: &mut BytesMut, len: usize) {
        buf.advance(len);
        self.discarded += len;
        self.discarding = true;
        self.next_index = 0;
    }
}

impl Decoder for LineCodec {
    type Item = LineFrame;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<LineFrame>, io::Error> {
        let start = self.next_index.min(buf.len());
        let found = buf[start..]
            .iter()
            .position(|b| *b == b'\n' || *b == b'\r')
            .map(|offset| start + offset);

        let Some(idx) = found else {
            if self.discarding || buf.len() > self.max_length {
                self.discard(buf, buf.len());
            } else {
                self.next_index = buf.len();
            }
            return Ok(None);
        };

        let separator_len = match (buf[idx], buf.get(idx + 1)) {
            (b'\n', _) => 1,
            (_, Some(b'\n')) => 2,
            (_, Some(_)) => 1,
            // CR at the end of the buffer: the next read decides whether it is CRLF
            (_, None) => {
                if self.discarding || idx > self.max_length {
                    self.discard(buf, idx);
                } else {
                    self.next_index = idx;
                }
                return Ok(None);
            },
        };

        Ok(Some(self.take_line(buf, idx, separator_len)))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<LineFrame>, io::Error> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }

        if buf.is_empty() {
            if self.discarding {
                return Ok(Some(self.take_line(buf, 0, 0)));
            }
            return Ok(None);
        }

        let len = buf.len();
        let separator_len = usize::from(buf[len - 1] == b'\r');
        Ok(Some(self.take_line(buf, len - separator_len, separator_len)))
    }
}
