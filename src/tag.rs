//! Typed attribute values and the per-layer intern dictionaries.

use foldhash::fast::RandomState;
use indexmap::IndexSet;

use crate::error::ParseError;
use crate::vector_tile::tile;

/// Comparable wrapper for the MVT attribute values.
///
/// One variant per wire type. Floats are held as native-endian bit patterns
/// so equality and hashing are structural; the variant tag participates in
/// equality, so the integer `1` and the boolean `true` intern separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    String(String),
    Float([u8; 4]),
    Double([u8; 8]),
    Int(i64),
    Uint(u64),
    SInt(i64),
    Bool(bool),
}

impl Value {
    pub fn into_tile_value(self) -> tile::Value {
        use Value::*;
        match self {
            String(v) => tile::Value {
                string_value: Some(v),
                ..Default::default()
            },
            Float(v) => tile::Value {
                float_value: Some(f32::from_ne_bytes(v)),
                ..Default::default()
            },
            Double(v) => tile::Value {
                double_value: Some(f64::from_ne_bytes(v)),
                ..Default::default()
            },
            Int(v) => tile::Value {
                int_value: Some(v),
                ..Default::default()
            },
            Uint(v) => tile::Value {
                uint_value: Some(v),
                ..Default::default()
            },
            SInt(v) => tile::Value {
                sint_value: Some(v),
                ..Default::default()
            },
            Bool(v) => tile::Value {
                bool_value: Some(v),
                ..Default::default()
            },
        }
    }

    /// Reads whichever oneof field is present. A value with no field set is
    /// the null value, `None`.
    #[allow(clippy::manual_map)]
    pub fn from_tile_value(v: &tile::Value) -> Option<Self> {
        if let Some(s) = &v.string_value {
            Some(Value::String(s.clone()))
        } else if let Some(f) = v.float_value {
            Some(Value::Float(f.to_ne_bytes()))
        } else if let Some(d) = v.double_value {
            Some(Value::Double(d.to_ne_bytes()))
        } else if let Some(i) = v.int_value {
            Some(Value::Int(i))
        } else if let Some(u) = v.uint_value {
            Some(Value::Uint(u))
        } else if let Some(s) = v.sint_value {
            Some(Value::SInt(s))
        } else if let Some(b) = v.bool_value {
            Some(Value::Bool(b))
        } else {
            None
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
// Integers narrow to the zigzag-coded sint wire type; only a u64 past
// i64::MAX keeps the uint representation.
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::SInt(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::SInt(v as i64)
    }
}
impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::SInt(v as i64)
    }
}
impl From<u64> for Value {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(v) => Value::SInt(v),
            Err(_) => Value::Uint(v),
        }
    }
}
impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v.to_ne_bytes())
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v.to_ne_bytes())
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Per-layer intern dictionaries for attribute keys and values.
///
/// Ids are dense, 0-based, assigned on first insertion, and never change;
/// iteration preserves insertion order.
#[derive(Default)]
pub struct TagsEncoder {
    keys: IndexSet<String, RandomState>,
    values: IndexSet<Value, RandomState>,
    tags: Vec<u32>,
}

impl TagsEncoder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Interns a key, returning its dense id.
    #[inline]
    pub fn key_id(&mut self, key: &str) -> u32 {
        let idx = match self.keys.get_index_of(key) {
            None => self.keys.insert_full(key.to_string()).0,
            Some(idx) => idx,
        };
        idx as u32
    }

    /// Interns a value, returning its dense id.
    #[inline]
    pub fn value_id(&mut self, value: Value) -> u32 {
        let idx = match self.values.get_index_of(&value) {
            None => self.values.insert_full(value).0,
            Some(idx) => idx,
        };
        idx as u32
    }

    /// Adds a key-value pair for the current feature.
    #[inline]
    pub fn add(&mut self, key: &str, value: impl Into<Value>) {
        let key_id = self.key_id(key);
        let value_id = self.value_id(value.into());
        self.tags.extend([key_id, value_id]);
    }

    /// Takes the key-value index buffer for the current feature.
    #[inline]
    pub fn take_tags(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.tags)
    }

    /// Consumes the encoder and returns the keys and values for a layer.
    #[inline]
    pub fn into_keys_and_values(self) -> (Vec<String>, Vec<tile::Value>) {
        let keys = self.keys.into_iter().collect();
        let values = self
            .values
            .into_iter()
            .map(|v| v.into_tile_value())
            .collect();
        (keys, values)
    }
}

/// Bounds-checked tag resolution against a parsed layer's dictionaries.
pub struct TagsDecoder<'a> {
    keys: &'a [String],
    values: &'a [tile::Value],
}

impl<'a> TagsDecoder<'a> {
    /// Creates a new decoder with the layer's keys and values dictionaries.
    pub fn new(keys: &'a [String], values: &'a [tile::Value]) -> Self {
        Self { keys, values }
    }

    /// Resolves a feature's tag pairs into key-value entries.
    ///
    /// A wire value with no oneof field set resolves to `None`.
    pub fn decode(&self, tags: &[u32]) -> Result<Vec<(&'a str, Option<Value>)>, ParseError> {
        if !tags.len().is_multiple_of(2) {
            return Err(ParseError::OddTagCount(tags.len()));
        }

        let mut result = Vec::with_capacity(tags.len() / 2);
        for chunk in tags.chunks_exact(2) {
            let key = self
                .keys
                .get(chunk[0] as usize)
                .ok_or(ParseError::KeyIndexOutOfRange(chunk[0]))?;
            let value = self
                .values
                .get(chunk[1] as usize)
                .ok_or(ParseError::ValueIndexOutOfRange(chunk[1]))?;
            result.push((key.as_str(), Value::from_tile_value(value)));
        }
        Ok(result)
    }
}
