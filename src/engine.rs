//! Engine: a protocol loaded from its description, with a streaming reader attached.

use crate::error::{DefinitionError, Result};
use crate::factory::MessageFactory;
use crate::frame::Frame;
use crate::message::Message;
use crate::parser::parse;
use crate::resolve::resolve;
use crate::stream::{ReaderConfig, StreamReader};
use std::sync::Arc;

pub struct Engine {
    name: String,
    frame: Arc<Frame>,
    reader: StreamReader,
}

impl Engine {
    /// Parse and resolve a protocol description.
    pub fn from_dsl(source: &str) -> std::result::Result<Self, DefinitionError> {
        let resolved = resolve(&parse(source)?)?;
        Ok(Self::new(resolved.name, resolved.frame))
    }

    pub fn new(name: impl Into<String>, frame: Frame) -> Self {
        let frame = Arc::new(frame);
        Engine {
            name: name.into(),
            reader: StreamReader::new(Arc::clone(&frame)),
            frame,
        }
    }

    /// Replace the reader configuration; any buffered input is dropped.
    pub fn with_config(mut self, config: ReaderConfig) -> Self {
        self.reader = StreamReader::with_config(Arc::clone(&self.frame), config);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn factory(&self) -> &MessageFactory {
        self.frame.factory()
    }

    /// Feed a chunk of the input stream; see [`StreamReader::read_data`].
    pub fn read_data(&mut self, bytes: &[u8], is_final: bool) -> Vec<Message> {
        self.reader.read_data(bytes, is_final)
    }

    /// Bytes buffered by the reader and not yet emitted.
    pub fn pending(&self) -> usize {
        self.reader.pending()
    }

    /// Drop buffered input.
    pub fn reset(&mut self) {
        self.reader = StreamReader::with_config(Arc::clone(&self.frame), self.reader.config().clone());
    }

    /// Serialize `msg` with every frame layer.
    pub fn write(&self, msg: &Message) -> Result<Vec<u8>> {
        self.frame.write(msg)
    }

    pub fn create_message(&self, key: &str, idx: usize) -> Option<Message> {
        self.frame.create_message(key, idx)
    }

    pub fn create_all_messages(&self) -> Vec<Message> {
        self.frame.create_all_messages()
    }
}
