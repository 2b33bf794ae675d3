//! Cache Key Module
//!
//! Derives deterministic cache keys from call arguments and separates the
//! per-call control flags from the arguments forwarded to the producer.

use std::collections::BTreeMap;
use std::fmt;

use serde::{ser, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CacheError, Result};

/// Keyword that skips the cache read and in-flight joining for one call.
pub const IGNORE_CACHE: &str = "ignore_cache";

/// Keyword that forces a cache write after the producer runs.
pub const UPDATE_CACHE: &str = "update_cache";

// == Cache Key ==
/// Canonical identifier for a set of producer arguments.
///
/// Two argument values that serialize to the same JSON document (object keys
/// compared in sorted order) map to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    // == From Args ==
    /// Builds a key by serializing `args` to canonical JSON.
    ///
    /// Fails with `CacheError::InvalidKey` when the arguments cannot be
    /// represented as JSON (e.g. maps with non-string keys) or contain a NaN
    /// or infinite float, which JSON would otherwise collapse to `null`.
    pub fn from_args<A: Serialize + ?Sized>(args: &A) -> Result<Self> {
        args.serialize(FiniteFloats)
            .map_err(|e| CacheError::InvalidKey(e.0))?;
        let value = serde_json::to_value(args)
            .map_err(|e| CacheError::InvalidKey(e.to_string()))?;
        let encoded = serde_json::to_string(&canonicalize(value))
            .map_err(|e| CacheError::InvalidKey(e.to_string()))?;
        Ok(Self(encoded))
    }

    /// Returns the canonical encoding.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rebuilds objects with their keys sorted, whatever map ordering serde_json
/// was compiled with.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(String, Value)> = map.into_iter().collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            let sorted: Map<String, Value> = fields
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

// == Float Check ==
/// Serializer that only walks a value, failing on the first NaN or infinite
/// float it meets.
#[derive(Clone, Copy)]
struct FiniteFloats;

#[derive(Debug)]
struct NonFinite(String);

impl fmt::Display for NonFinite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for NonFinite {}

impl ser::Error for NonFinite {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        NonFinite(msg.to_string())
    }
}

type Check = std::result::Result<(), NonFinite>;

fn check_float(finite: bool, value: impl fmt::Display) -> Check {
    if finite {
        Ok(())
    } else {
        Err(NonFinite(format!("float {} has no distinct key encoding", value)))
    }
}

impl ser::Serializer for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _: bool) -> Check {
        Ok(())
    }
    fn serialize_i8(self, _: i8) -> Check {
        Ok(())
    }
    fn serialize_i16(self, _: i16) -> Check {
        Ok(())
    }
    fn serialize_i32(self, _: i32) -> Check {
        Ok(())
    }
    fn serialize_i64(self, _: i64) -> Check {
        Ok(())
    }
    fn serialize_i128(self, _: i128) -> Check {
        Ok(())
    }
    fn serialize_u8(self, _: u8) -> Check {
        Ok(())
    }
    fn serialize_u16(self, _: u16) -> Check {
        Ok(())
    }
    fn serialize_u32(self, _: u32) -> Check {
        Ok(())
    }
    fn serialize_u64(self, _: u64) -> Check {
        Ok(())
    }
    fn serialize_u128(self, _: u128) -> Check {
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Check {
        check_float(v.is_finite(), v)
    }

    fn serialize_f64(self, v: f64) -> Check {
        check_float(v.is_finite(), v)
    }

    fn serialize_char(self, _: char) -> Check {
        Ok(())
    }
    fn serialize_str(self, _: &str) -> Check {
        Ok(())
    }
    fn serialize_bytes(self, _: &[u8]) -> Check {
        Ok(())
    }
    fn serialize_none(self) -> Check {
        Ok(())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Check {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Check {
        Ok(())
    }
    fn serialize_unit_struct(self, _: &'static str) -> Check {
        Ok(())
    }
    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> Check {
        Ok(())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        value: &T,
    ) -> Check {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Check {
        value.serialize(self)
    }

    fn serialize_seq(self, _: Option<usize>) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }
    fn serialize_tuple(self, _: usize) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }
    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }
    fn serialize_map(self, _: Option<usize>) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }
    fn serialize_struct(self, _: &'static str, _: usize) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Check {
        value.serialize(FiniteFloats)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeTuple for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Check {
        value.serialize(FiniteFloats)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Check {
        value.serialize(FiniteFloats)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Check {
        value.serialize(FiniteFloats)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeMap for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Check {
        key.serialize(FiniteFloats)
    }
    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Check {
        value.serialize(FiniteFloats)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _: &'static str, value: &T) -> Check {
        value.serialize(FiniteFloats)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _: &'static str, value: &T) -> Check {
        value.serialize(FiniteFloats)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

// == Call Options ==
/// Per-call overrides of the caching behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallOptions {
    /// Skip the cache read and never join an in-flight computation
    pub ignore_cache: bool,
    /// Write the result to the cache even if the producer marked it uncacheable
    pub update_cache: bool,
}

impl CallOptions {
    /// Recompute without reading or writing the cache.
    pub fn bypass() -> Self {
        Self {
            ignore_cache: true,
            update_cache: false,
        }
    }

    /// Recompute and overwrite whatever is cached.
    pub fn refresh() -> Self {
        Self {
            ignore_cache: true,
            update_cache: true,
        }
    }
}

// == Call Args ==
/// Loosely typed argument bundle with positional and keyword parts.
///
/// Keyword arguments are kept in a sorted map, so the order in which a caller
/// supplies them never changes the derived key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallArgs {
    /// Positional arguments in call order
    #[serde(default)]
    pub positional: Vec<Value>,
    /// Keyword arguments by name
    #[serde(default)]
    pub keyword: BTreeMap<String, Value>,
}

impl CallArgs {
    /// Creates an empty argument bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Sets a keyword argument, replacing any previous value.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    // == Split Control ==
    /// Removes the reserved control keywords and returns them as options.
    ///
    /// A missing or `null` flag defaults to `false`; any other non-boolean
    /// value is rejected.
    pub fn split_control(mut self) -> Result<(CallArgs, CallOptions)> {
        let ignore_cache = take_flag(&mut self.keyword, IGNORE_CACHE)?;
        let update_cache = take_flag(&mut self.keyword, UPDATE_CACHE)?;
        Ok((
            self,
            CallOptions {
                ignore_cache,
                update_cache,
            },
        ))
    }
}

fn take_flag(keyword: &mut BTreeMap<String, Value>, name: &str) -> Result<bool> {
    match keyword.remove(name) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(flag)) => Ok(flag),
        Some(other) => Err(CacheError::InvalidKey(format!(
            "`{}` must be a boolean, got {}",
            name, other
        ))),
    }
}
