//! Frame: the transport layer stack wrapped around every message.
//!
//! Layers are kept in nesting order, outermost first; each layer wraps all layers after it.
//! Reading walks the stack recursively over absolute positions in the candidate buffer, so a
//! size layer can bound everything inside it and a checksum layer can cover the exact bytes its
//! inner layers consumed. Writing mirrors the same recursion.

pub mod checksum;

pub use checksum::ChecksumAlgo;

use crate::error::{CodecError, DefinitionError, Result};
use crate::factory::MessageFactory;
use crate::field::{mask, Field, IntField, IntWidth};
use crate::message::{InvalidReason, Message, MessageClass, MsgId};
use crate::value::Value;
use std::sync::Arc;
use tracing::{debug, trace};

/// Where a checksum sits relative to the bytes it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumPlacement {
    /// After the covered bytes.
    Suffix,
    /// Before the covered bytes; patched in place on write.
    Prefix,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    /// Fixed marker; the field's default value is the expected marker.
    Sync { field: IntField },
    /// Byte count of the inner layers; `max` rejects absurd lengths as garbage.
    Size { field: IntField, max: Option<usize> },
    /// Message id, an integer or an enum field.
    Id { field: Field },
    /// Side-channel value stored in the message's transport fields (optionally its version).
    Transport { field: IntField, version: bool },
    Checksum {
        field: IntField,
        algo: ChecksumAlgo,
        placement: ChecksumPlacement,
    },
    /// The message's own fields.
    Payload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub kind: LayerKind,
}

impl Layer {
    pub fn new(name: impl Into<String>, kind: LayerKind) -> Self {
        Layer {
            name: name.into(),
            kind,
        }
    }
}

/// Outcome of one decode attempt at the start of a buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameRead {
    /// A complete frame of `consumed` bytes (regular or raw-data message).
    Message { message: Message, consumed: usize },
    /// The buffer holds the start of a frame; at least `missing` more bytes are needed.
    NotEnoughData { missing: usize },
    /// The buffer does not start with a frame.
    Garbage { reason: String },
    /// A complete frame whose checksum did not match; the message is marked invalid.
    ChecksumFailure { message: Message, consumed: usize },
}

#[derive(Default)]
struct ReadState {
    message: Option<Message>,
    transport: Vec<(String, IntField, bool)>,
    /// End of a checksum-failed frame, widened by enclosing size layers.
    consumed_to: Option<usize>,
}

impl ReadState {
    fn set_transport(&mut self, name: &str, field: IntField, version: bool) {
        match self.transport.iter_mut().find(|(n, _, _)| n == name) {
            Some(slot) => {
                slot.1 = field;
                slot.2 = version;
            }
            None => self.transport.push((name.to_string(), field, version)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    name: String,
    layers: Vec<Layer>,
    factory: Arc<MessageFactory>,
    sized: bool,
}

impl Frame {
    /// Build a frame; `layers` are in nesting order and must end with the payload.
    ///
    /// Without a size layer the payload is bounded only by the input at hand, so no message may
    /// read to the end of its input, and unknown ids are garbage rather than raw data.
    pub fn new(
        name: impl Into<String>,
        layers: Vec<Layer>,
        factory: Arc<MessageFactory>,
    ) -> std::result::Result<Self, DefinitionError> {
        let name = name.into();
        let err = |reason: &str| DefinitionError::Frame {
            frame: name.clone(),
            reason: reason.to_string(),
        };
        if !matches!(layers.last().map(|l| &l.kind), Some(LayerKind::Payload)) {
            return Err(err("the payload must be the innermost layer"));
        }
        let count = |pred: fn(&LayerKind) -> bool| layers.iter().filter(|l| pred(&l.kind)).count();
        if count(|k| matches!(k, LayerKind::Payload)) != 1 {
            return Err(err("exactly one payload layer required"));
        }
        if count(|k| matches!(k, LayerKind::Id { .. })) != 1 {
            return Err(err("exactly one id layer required"));
        }
        let mut sized = false;
        for layer in &layers {
            match &layer.kind {
                LayerKind::Sync { field } if !matches!(field.width(), IntWidth::Fixed(_)) => {
                    return Err(err("sync marker must be a fixed-width integer"));
                }
                LayerKind::Size { .. } => sized = true,
                LayerKind::Id { field } if !matches!(field, Field::Int(_) | Field::Enum(_)) => {
                    return Err(err("id must be an integer or enum"));
                }
                LayerKind::Checksum {
                    placement: ChecksumPlacement::Prefix,
                    ..
                } if !sized => {
                    return Err(err("a prefix checksum must be enclosed by a size layer"));
                }
                _ => {}
            }
        }
        if !sized {
            if let Some(m) = factory.prototypes().iter().find(|m| m.reads_to_end()) {
                return Err(err(&format!(
                    "message `{}` reads to the end of its input and needs a size layer",
                    m.name()
                )));
            }
        }
        Ok(Frame {
            name,
            layers,
            factory,
            sized,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn factory(&self) -> &MessageFactory {
        &self.factory
    }

    pub fn create_message(&self, key: &str, idx: usize) -> Option<Message> {
        self.factory.create_by_str(key, idx)
    }

    pub fn create_all_messages(&self) -> Vec<Message> {
        self.factory.create_all()
    }

    /// Try to decode one frame from the start of `buf`.
    pub fn read_one(&self, buf: &[u8]) -> FrameRead {
        let mut st = ReadState::default();
        match self.read_layer(0, buf, 0, buf.len(), &mut st) {
            Ok(consumed) => match st.message {
                Some(mut message) => {
                    message.set_frame_bytes(&buf[..consumed]);
                    trace!(frame = %self.name, msg = message.name(), consumed, "frame decoded");
                    FrameRead::Message { message, consumed }
                }
                None => FrameRead::Garbage {
                    reason: "frame produced no message".into(),
                },
            },
            Err(CodecError::NotEnoughData { missing }) => FrameRead::NotEnoughData { missing },
            Err(CodecError::ChecksumFailure { computed, received }) => {
                match (st.message, st.consumed_to) {
                    (Some(mut message), Some(consumed)) => {
                        debug!(
                            frame = %self.name,
                            computed,
                            received,
                            consumed,
                            "checksum mismatch"
                        );
                        message.set_class(MessageClass::Invalid(InvalidReason::ChecksumFailure));
                        message.set_frame_bytes(&buf[..consumed]);
                        FrameRead::ChecksumFailure { message, consumed }
                    }
                    _ => FrameRead::Garbage {
                        reason: "checksum mismatch".into(),
                    },
                }
            }
            Err(e) => FrameRead::Garbage {
                reason: e.to_string(),
            },
        }
    }

    fn read_layer(
        &self,
        idx: usize,
        buf: &[u8],
        pos: usize,
        end: usize,
        st: &mut ReadState,
    ) -> Result<usize> {
        let Some(layer) = self.layers.get(idx) else {
            return Ok(pos);
        };
        match &layer.kind {
            LayerKind::Sync { field } => {
                let mut f = field.clone();
                let next = read_at(&mut f, buf, pos, end)?;
                if f.value() != field.default_value() {
                    return Err(CodecError::ProtocolError(format!(
                        "sync mismatch: {:#x}",
                        f.value()
                    )));
                }
                self.read_layer(idx + 1, buf, next, end, st)
            }
            LayerKind::Size { field, max } => {
                let mut f = field.clone();
                let start = read_at(&mut f, buf, pos, end)?;
                let len = usize::try_from(f.value()).map_err(|_| {
                    CodecError::ProtocolError(format!("negative frame size {}", f.value()))
                })?;
                if let Some(max) = max {
                    if len > *max {
                        return Err(CodecError::ProtocolError(format!(
                            "frame size {} exceeds maximum {}",
                            len, max
                        )));
                    }
                }
                let avail = end - start;
                if avail < len {
                    return Err(CodecError::NotEnoughData {
                        missing: len - avail,
                    });
                }
                let inner_end = start + len;
                match self.read_layer(idx + 1, buf, start, inner_end, st) {
                    Ok(_) => Ok(inner_end),
                    Err(CodecError::NotEnoughData { missing }) => Err(CodecError::ProtocolError(
                        format!("frame content overruns its size by {} byte(s)", missing),
                    )),
                    Err(e @ CodecError::ChecksumFailure { .. }) => {
                        st.consumed_to = Some(inner_end);
                        Err(e)
                    }
                    Err(e) => Err(e),
                }
            }
            LayerKind::Id { field } => {
                let mut f = field.clone();
                let next = read_at(&mut f, buf, pos, end)?;
                let id = MsgId(f.value().as_u64().unwrap_or_default());
                let count = self.factory.count(id);
                if count == 0 && !self.sized {
                    return Err(CodecError::InvalidMsgId(id.0));
                }
                if count == 0 {
                    debug!(frame = %self.name, %id, "unknown message id, keeping raw data");
                    st.message = Some(Message::raw_data(id));
                    return self.read_layer(idx + 1, buf, next, end, st);
                }
                for i in 0..count {
                    st.message = self.factory.create(id, i);
                    match self.read_layer(idx + 1, buf, next, end, st) {
                        Err(CodecError::InvalidMessageData(reason)) if i + 1 < count => {
                            trace!(%id, index = i, %reason, "trying next message type for id");
                        }
                        other => return other,
                    }
                }
                Err(CodecError::InvalidMsgId(id.0))
            }
            LayerKind::Transport { field, version } => {
                let mut f = field.clone();
                let next = read_at(&mut f, buf, pos, end)?;
                st.set_transport(&layer.name, f, *version);
                self.read_layer(idx + 1, buf, next, end, st)
            }
            LayerKind::Payload => {
                let mut message = st.message.take().ok_or_else(|| {
                    CodecError::ProtocolError("no message type for payload".into())
                })?;
                for (name, f, version) in &st.transport {
                    message.set_transport_field(name, Field::Int(f.clone()));
                    if *version {
                        message.set_version(f.value() as u64);
                    }
                }
                let mut src = &buf[pos..end];
                let res = message.read(&mut src);
                st.message = Some(message);
                res?;
                Ok(end - src.len())
            }
            LayerKind::Checksum {
                field,
                algo,
                placement,
            } => {
                let width = field.length();
                let (covered, after, received) = match placement {
                    ChecksumPlacement::Suffix => {
                        let inner_end = self.read_layer(idx + 1, buf, pos, end, st)?;
                        let mut f = field.clone();
                        let after = read_at(&mut f, buf, inner_end, end)?;
                        (&buf[pos..inner_end], after, f.value())
                    }
                    ChecksumPlacement::Prefix => {
                        let mut f = field.clone();
                        let inner_start = read_at(&mut f, buf, pos, end)?;
                        let inner_end = self.read_layer(idx + 1, buf, inner_start, end, st)?;
                        (&buf[inner_start..inner_end], inner_end, f.value())
                    }
                };
                let bits = width as u32 * 8;
                let computed = algo.compute(covered) & mask(bits);
                let received = received as u64 & mask(bits);
                if computed != received {
                    st.consumed_to = Some(after);
                    return Err(CodecError::ChecksumFailure { computed, received });
                }
                Ok(after)
            }
        }
    }

    /// Serialize `msg` with every layer.
    pub fn write(&self, msg: &Message) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.length(msg));
        self.write_layer(0, msg, &mut out)?;
        Ok(out)
    }

    fn write_layer(&self, idx: usize, msg: &Message, out: &mut Vec<u8>) -> Result<()> {
        let Some(layer) = self.layers.get(idx) else {
            return Ok(());
        };
        match &layer.kind {
            LayerKind::Sync { field } => {
                field.write(out)?;
                self.write_layer(idx + 1, msg, out)
            }
            LayerKind::Size { field, max } => {
                let predicted = self.length_from(idx + 1, msg);
                if let Some(max) = max {
                    if predicted > *max {
                        return Err(CodecError::BufferOverflow(format!(
                            "frame size {} exceeds maximum {}",
                            predicted, max
                        )));
                    }
                }
                let mut f = field.clone();
                f.set_value(predicted as i64);
                f.write(out)?;
                let start = out.len();
                self.write_layer(idx + 1, msg, out)?;
                let written = out.len() - start;
                if written != predicted {
                    return Err(CodecError::InvalidMessageData(format!(
                        "size layer predicted {} byte(s), {} written",
                        predicted, written
                    )));
                }
                Ok(())
            }
            LayerKind::Id { field } => {
                let mut f = field.clone();
                f.set_value(&Value::Int(msg.id().0 as i64));
                f.write(out)?;
                self.write_layer(idx + 1, msg, out)
            }
            LayerKind::Transport { field, version } => {
                self.transport_value(&layer.name, field, *version, msg)
                    .write(out)?;
                self.write_layer(idx + 1, msg, out)
            }
            LayerKind::Payload => msg.write(out),
            LayerKind::Checksum {
                field,
                algo,
                placement,
            } => {
                let bits = field.length() as u32 * 8;
                match placement {
                    ChecksumPlacement::Suffix => {
                        let start = out.len();
                        self.write_layer(idx + 1, msg, out)?;
                        let mut f = field.clone();
                        f.set_value((algo.compute(&out[start..]) & mask(bits)) as i64);
                        f.write(out)
                    }
                    ChecksumPlacement::Prefix => {
                        let at = out.len();
                        let mut f = field.clone();
                        f.set_value(0);
                        f.write(out)?;
                        let start = out.len();
                        self.write_layer(idx + 1, msg, out)?;
                        f.set_value((algo.compute(&out[start..]) & mask(bits)) as i64);
                        let mut patch = Vec::with_capacity(start - at);
                        f.write(&mut patch)?;
                        out[at..start].copy_from_slice(&patch);
                        Ok(())
                    }
                }
            }
        }
    }

    fn transport_value(&self, name: &str, field: &IntField, version: bool, msg: &Message) -> IntField {
        let mut f = field.clone();
        if version && msg.is_version_dependent() {
            f.set_value(msg.version() as i64);
        } else if let Some(v) = msg.transport_field(name).and_then(|t| t.value().as_i64()) {
            f.set_value(v);
        }
        f
    }

    /// Total serialized frame length for `msg`.
    pub fn length(&self, msg: &Message) -> usize {
        self.length_from(0, msg)
    }

    fn length_from(&self, idx: usize, msg: &Message) -> usize {
        let Some(layer) = self.layers.get(idx) else {
            return 0;
        };
        let inner = self.length_from(idx + 1, msg);
        let own = match &layer.kind {
            LayerKind::Sync { field } | LayerKind::Checksum { field, .. } => field.length(),
            LayerKind::Size { field, .. } => {
                let mut f = field.clone();
                f.set_value(inner as i64);
                f.length()
            }
            LayerKind::Id { field } => {
                let mut f = field.clone();
                f.set_value(&Value::Int(msg.id().0 as i64));
                f.length()
            }
            LayerKind::Transport { field, version } => {
                self.transport_value(&layer.name, field, *version, msg).length()
            }
            LayerKind::Payload => msg.length(),
        };
        own + inner
    }
}

/// Read `field` from `buf[pos..end]`, returning the position after it.
fn read_at(field: &mut impl ReadAt, buf: &[u8], pos: usize, end: usize) -> Result<usize> {
    let mut src = &buf[pos..end];
    field.read_from(&mut src)?;
    Ok(end - src.len())
}

trait ReadAt {
    fn read_from(&mut self, src: &mut &[u8]) -> Result<()>;
}

impl ReadAt for IntField {
    fn read_from(&mut self, src: &mut &[u8]) -> Result<()> {
        self.read(src)
    }
}

impl ReadAt for Field {
    fn read_from(&mut self, src: &mut &[u8]) -> Result<()> {
        self.read(src)
    }
}
