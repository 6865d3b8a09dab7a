//! # commskit: declarative binary protocol codec
//!
//! Composable field codecs, a transport frame layer stack, a message factory and a streaming
//! reader that turns arbitrarily chunked byte input into decoded messages. Protocols are
//! described in a small DSL (PEST grammar) or built directly from the field types.
//!
//! ## Field kinds
//!
//! - Integers: `u8`..`i64`, `uint(n)` / `int(n)` for N-byte widths, `varuint(min, max)` /
//!   `varint(min, max)` base-128
//! - Enums, bitmasks (named bits, reserved pattern), `float` / `double`
//! - `string<..>`, `bytes<..>`, `list<T, ..>` with `fixed(n)`, `count(T)`, `length(T)` or `rest`
//! - Bitfields, structs (bundles, optionally with a `remaining_length` member),
//!   `optional<T>`, variants
//!
//! ## Example DSL
//!
//! ```text
//! protocol "demo";
//! endian big;
//!
//! enum MsgId: u8 { Ping = 1, Data = 2 }
//! bitmask Flags: u8 { extra = 0 }
//!
//! frame Frame {
//!   sync: sync(u16, 0xabcd);
//!   size: size(u16);
//!   id: id(MsgId);
//!   payload;
//!   cs: checksum(u16, crc16, over = size);
//! }
//!
//! message Ping = MsgId.Ping "Ping" {
//!   seq: u16;
//! }
//!
//! message Data = MsgId.Data {
//!   flags: Flags;
//!   value: i32 [-1000..1000] scale(1/10) units("m");
//!   extra: u8 if flags.extra;
//!   name: string<count(u8)>;
//! }
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = commskit::Engine::from_dsl(&source)?;
//! for msg in engine.read_data(&chunk, false) {
//!     println!("{}", commskit::dump::dump_message(&msg));
//! }
//! ```

pub mod ast;
pub mod dump;
pub mod engine;
pub mod error;
pub mod factory;
pub mod field;
pub mod frame;
pub mod message;
pub mod parser;
pub mod resolve;
pub mod stream;
pub mod value;

pub use engine::Engine;
pub use error::{CodecError, DefinitionError, ErrorStatus};
pub use factory::MessageFactory;
pub use field::{Field, FieldKind, FieldVisitor};
pub use frame::{Frame, FrameRead, Layer, LayerKind};
pub use message::{InvalidReason, Message, MessageClass, MsgId, Presence};
pub use parser::parse;
pub use resolve::{resolve, ResolvedProtocol};
pub use stream::{ReaderConfig, StreamReader};
pub use value::Value;
