//! Error taxonomy: runtime codec statuses and protocol-definition errors.
//!
//! Decode/encode problems are [`CodecError`] values returned through `Result`; nothing in the
//! hot path panics. [`ErrorStatus`] is the flat status view of the same taxonomy, with
//! `Success`, for callers that only need to classify an outcome. Mistakes in a protocol
//! description (bit widths that do not add up, dangling references, bad presence rules) are
//! [`DefinitionError`]s raised while building fields, messages or frames.

/// Error produced while reading or writing fields, messages and frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Input ended early; more bytes may complete the read.
    #[error("not enough data: {missing} more byte(s) required")]
    NotEnoughData { missing: usize },
    /// Structurally malformed content (unknown variant tag, list length overrun, strict value check).
    #[error("invalid message data: {0}")]
    InvalidMessageData(String),
    /// The candidate frame is not a frame at all (sync mismatch, impossible length).
    #[error("protocol error: {0}")]
    ProtocolError(String),
    /// Frame checksum did not match the transmitted one.
    #[error("checksum mismatch: computed {computed:#x}, received {received:#x}")]
    ChecksumFailure { computed: u64, received: u64 },
    /// Value does not fit its serialized width, or output exceeds a declared bound.
    #[error("buffer overflow: {0}")]
    BufferOverflow(String),
    /// No message type is registered for the id.
    #[error("invalid message id {0}")]
    InvalidMsgId(u64),
}

impl CodecError {
    pub fn status(&self) -> ErrorStatus {
        match self {
            CodecError::NotEnoughData { .. } => ErrorStatus::NotEnoughData,
            CodecError::InvalidMessageData(_) => ErrorStatus::InvalidMessageData,
            CodecError::ProtocolError(_) => ErrorStatus::ProtocolError,
            CodecError::ChecksumFailure { .. } => ErrorStatus::ChecksumFailure,
            CodecError::BufferOverflow(_) => ErrorStatus::BufferOverflow,
            CodecError::InvalidMsgId(_) => ErrorStatus::InvalidMsgId,
        }
    }

    /// Wrap an inner `NotEnoughData` into a structural error; used where the input is already
    /// bounded by a declared length, so running short means the content is malformed.
    pub(crate) fn bounded(self, what: &str) -> CodecError {
        match self {
            CodecError::NotEnoughData { missing } => CodecError::InvalidMessageData(format!(
                "{}: content overruns declared length by {} byte(s)",
                what, missing
            )),
            other => other,
        }
    }
}

/// Flat status of a codec operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorStatus {
    Success,
    NotEnoughData,
    InvalidMessageData,
    ProtocolError,
    ChecksumFailure,
    BufferOverflow,
    InvalidMsgId,
}

impl ErrorStatus {
    pub fn of<T>(result: &Result<T>) -> ErrorStatus {
        match result {
            Ok(_) => ErrorStatus::Success,
            Err(e) => e.status(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Error in a protocol description: caught while composing fields, messages and frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("duplicate name: {0}")]
    Duplicate(String),
    #[error("unknown reference: {0}")]
    UnknownRef(String),
    #[error("bitfield `{name}`: members use {used} bit(s), storage holds {declared}")]
    BitWidthMismatch {
        name: String,
        used: u32,
        declared: u32,
    },
    #[error("message `{message}`: {reason}")]
    Message { message: String, reason: String },
    #[error("frame `{frame}`: {reason}")]
    Frame { frame: String, reason: String },
    #[error("invalid definition: {0}")]
    Invalid(String),
}
