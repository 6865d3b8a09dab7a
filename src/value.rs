//! Runtime values: a kind-independent snapshot of a field, used for generic display and editing.

/// A single field value (scalar or composite).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bits(u64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Bundle(Vec<(String, Value)>),
    /// Current alternative of a variant, by name.
    Variant(String, Box<Value>),
    /// Optional field whose mode resolves to absent, or variant with no alternative selected.
    Missing,
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(x) => Some(*x),
            Value::Bits(x) => Some(*x as i64),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Int(x) => Some(*x as u64),
            Value::Bits(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            Value::Int(x) => Some(*x as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    /// Member of a bundle value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Bundle(members) => members.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            Value::Variant(_, inner) => inner.get(name),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }
}
