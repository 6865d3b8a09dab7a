//! Abstract Syntax Tree for the protocol description language.

/// Root protocol definition.
#[derive(Debug, Clone, Default)]
pub struct Protocol {
    pub name: Option<String>,
    pub endian: Option<EndianSpec>,
    pub enums: Vec<EnumDecl>,
    pub bitmasks: Vec<BitmaskDecl>,
    pub structs: Vec<StructDecl>,
    pub bitfields: Vec<BitfieldDecl>,
    pub variants: Vec<VariantDecl>,
    pub frames: Vec<FrameDecl>,
    pub messages: Vec<MessageDecl>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndianSpec {
    Big,
    Little,
}

/// Integer storage type: `u8`..`i64`, `uint(n)` / `int(n)`, `varuint(min, max)` / `varint(min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntType {
    Fixed { bytes: usize, signed: bool },
    Var { min: usize, max: usize, signed: bool },
}

#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub name: String,
    pub storage: IntType,
    pub strict: bool,
    pub values: Vec<(String, i64)>,
}

#[derive(Debug, Clone)]
pub struct BitmaskDecl {
    pub name: String,
    pub storage: IntType,
    /// `(mask, value)` the reserved bits must match.
    pub reserved: Option<(u64, u64)>,
    pub strict: bool,
    pub bits: Vec<(String, u32)>,
}

#[derive(Debug, Clone)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
}

#[derive(Debug, Clone)]
pub struct BitfieldDecl {
    pub name: String,
    pub storage: IntType,
    pub fields: Vec<FieldDecl>,
}

#[derive(Debug, Clone)]
pub struct VariantDecl {
    pub name: String,
    /// Struct names, each starting with its tag member.
    pub alternatives: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FrameDecl {
    pub name: String,
    /// Layers in wire order.
    pub layers: Vec<LayerDecl>,
}

#[derive(Debug, Clone)]
pub struct LayerDecl {
    pub name: String,
    pub spec: LayerSpec,
}

#[derive(Debug, Clone)]
pub enum LayerSpec {
    Sync {
        ty: IntType,
        value: i64,
    },
    Size {
        ty: IntType,
        offset: i64,
        max: Option<usize>,
    },
    Id {
        ty: TypeSpec,
    },
    Transport {
        ty: IntType,
        version: bool,
    },
    Checksum {
        ty: IntType,
        algo: String,
        /// First layer covered by a suffix checksum.
        over: Option<String>,
    },
    Payload,
}

#[derive(Debug, Clone)]
pub struct MessageDecl {
    pub name: String,
    pub id: MsgIdRef,
    pub display: Option<String>,
    pub versioned: bool,
    pub fields: Vec<FieldDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsgIdRef {
    Number(u64),
    /// `Enum.Item`
    Named { enum_name: String, item: String },
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeSpec,
    pub attrs: FieldAttrs,
}

/// Field type specification.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    Int(IntType),
    Float { double: bool },
    String(SizeSpec),
    Bytes(SizeSpec),
    List {
        elem: Box<TypeSpec>,
        size: SizeSpec,
        elem_length: Option<IntType>,
    },
    Optional {
        inner: Box<TypeSpec>,
        mode: OptModeSpec,
    },
    /// Reference to an enum, bitmask, struct, bitfield or variant.
    Named(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SizeSpec {
    Fixed(usize),
    Count(IntType),
    Length(IntType),
    Rest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptModeSpec {
    Missing,
    Exists,
    Tentative,
}

#[derive(Debug, Clone, Default)]
pub struct FieldAttrs {
    pub ranges: Vec<(Literal, Literal)>,
    pub default: Option<Literal>,
    pub specials: Vec<(String, Literal)>,
    pub scale: Option<(i64, i64)>,
    pub offset: Option<i64>,
    pub units: Option<String>,
    pub bits: Option<u32>,
    pub strict: bool,
    pub remaining_length: bool,
    pub decimals: Option<u8>,
    pub condition: Option<CondSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
}

impl Literal {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Literal::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Int(v) => Some(*v as f64),
            Literal::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// Presence condition on a message field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CondSpec {
    /// `if mask.bit` / `if !mask.bit`; `bit` is a bit name or index.
    Bit {
        mask: String,
        bit: String,
        negate: bool,
    },
    Version { op: CmpOp, value: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    AtLeast,
    Below,
}
