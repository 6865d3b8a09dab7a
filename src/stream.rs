//! Streaming reader: turns arbitrarily chunked input into messages.
//!
//! Every input byte ends up in exactly one emitted message: a decoded frame, a checksum-failed
//! frame, or a garbage message collecting the bytes skipped while resynchronizing.

use crate::frame::{Frame, FrameRead};
use crate::message::{InvalidReason, Message};
use bytes::{Buf, BytesMut};
use std::sync::Arc;
use tracing::{debug, trace};

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Default cap on accumulated garbage before it is emitted as its own message.
pub const DEFAULT_MAX_GARBAGE_LEN: usize = 1024;

/// Configuration for the streaming reader.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Consecutive garbage bytes collected into one message at most. Default: 1024.
    pub max_garbage_len: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_garbage_len: DEFAULT_MAX_GARBAGE_LEN,
        }
    }
}

pub struct StreamReader {
    frame: Arc<Frame>,
    backlog: BytesMut,
    garbage: Vec<u8>,
    config: ReaderConfig,
}

impl StreamReader {
    pub fn new(frame: Arc<Frame>) -> Self {
        Self::with_config(frame, ReaderConfig::default())
    }

    pub fn with_config(frame: Arc<Frame>, config: ReaderConfig) -> Self {
        Self {
            frame,
            backlog: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            garbage: Vec::new(),
            config,
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Bytes received but not yet attributed to any message.
    pub fn pending(&self) -> usize {
        self.backlog.len() + self.garbage.len()
    }

    /// Append `bytes` and decode as many messages as possible.
    ///
    /// With `is_final` the remaining backlog is resolved completely: an incomplete frame start
    /// is skipped byte by byte like any other garbage, and collected garbage is flushed.
    pub fn read_data(&mut self, bytes: &[u8], is_final: bool) -> Vec<Message> {
        self.backlog.extend_from_slice(bytes);
        let mut out = Vec::new();
        while !self.backlog.is_empty() {
            match self.frame.read_one(&self.backlog) {
                FrameRead::Message { message, consumed }
                | FrameRead::ChecksumFailure { message, consumed }
                    if consumed > 0 =>
                {
                    self.flush_garbage(&mut out);
                    out.push(message);
                    self.backlog.advance(consumed);
                }
                FrameRead::NotEnoughData { missing } if !is_final => {
                    trace!(missing, pending = self.backlog.len(), "waiting for more data");
                    break;
                }
                FrameRead::Garbage { reason } => {
                    trace!(%reason, "skipping garbage byte");
                    self.skip_byte(&mut out);
                }
                _ => self.skip_byte(&mut out),
            }
        }
        if is_final {
            self.flush_garbage(&mut out);
        }
        out
    }

    fn skip_byte(&mut self, out: &mut Vec<Message>) {
        self.garbage.push(self.backlog[0]);
        self.backlog.advance(1);
        if self.garbage.len() >= self.config.max_garbage_len.max(1) {
            self.flush_garbage(out);
        }
    }

    fn flush_garbage(&mut self, out: &mut Vec<Message>) {
        if self.garbage.is_empty() {
            return;
        }
        debug!(len = self.garbage.len(), "emitting garbage");
        out.push(Message::invalid(InvalidReason::Garbage, &self.garbage));
        self.garbage.clear();
    }
}
