//! Message framing for the relay wire format
//!
//! Every frame is a text payload followed by a single terminator byte.
//! A frame is at most `max_message_size` bytes, terminator included.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::constants::{MESSAGE_TERMINATOR, QUIT_SENTINEL};
use crate::error::Result;

/// One decoded text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub content: String,
}

impl Message {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Decode a frame body (terminator already stripped)
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::new(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Whether this message is the session-ending sentinel
    pub fn is_sentinel(&self) -> bool {
        self.content == QUIT_SENTINEL
    }

    pub fn as_frame(&self) -> Vec<u8> {
        encode_frame(&self.content)
    }
}

/// Encode text as a terminated frame
pub fn encode_frame(text: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(text.len() + 1);
    frame.extend_from_slice(text.as_bytes());
    frame.push(MESSAGE_TERMINATOR);
    frame
}

/// Reads terminated frames from a byte stream
pub struct FrameReader<R> {
    inner: BufReader<R>,
    max_message_size: usize,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, max_message_size: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            max_message_size,
            buffer: Vec::with_capacity(max_message_size),
        }
    }

    /// Read the next non-empty message.
    ///
    /// Returns `Ok(None)` once the peer has closed the stream. A frame that
    /// fills the buffer without a terminator is delivered as-is; the
    /// remainder is read as the next frame.
    ///
    /// Cancel safe: a partially read frame stays buffered for the next call.
    pub async fn next_message(&mut self) -> Result<Option<Message>> {
        loop {
            let complete = self.fill_frame().await?;

            if self.buffer.is_empty() {
                if complete {
                    // Bare terminator, nothing to deliver
                    continue;
                }
                return Ok(None);
            }

            let message = Message::from_bytes(&self.buffer);
            self.buffer.clear();
            return Ok(Some(message));
        }
    }

    /// Fill `buffer` with one frame body. Returns whether a terminator was seen.
    async fn fill_frame(&mut self) -> Result<bool> {
        let limit = self.max_message_size - 1;

        while self.buffer.len() < limit {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                return Ok(false);
            }

            let room = limit - self.buffer.len();
            let window = &available[..available.len().min(room)];

            match window.iter().position(|&b| b == MESSAGE_TERMINATOR) {
                Some(pos) => {
                    self.buffer.extend_from_slice(&window[..pos]);
                    self.inner.consume(pos + 1);
                    return Ok(true);
                }
                None => {
                    let taken = window.len();
                    self.buffer.extend_from_slice(window);
                    self.inner.consume(taken);
                }
            }
        }

        // Full frame body; swallow a terminator that immediately follows it
        let available = self.inner.fill_buf().await?;
        if available.first() == Some(&MESSAGE_TERMINATOR) {
            self.inner.consume(1);
        }
        Ok(true)
    }
}
