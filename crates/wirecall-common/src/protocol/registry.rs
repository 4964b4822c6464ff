//! Type Operation Registry
//!
//! Bidirectional mapping between a native [`TypeTag`] and the serialized type
//! name written on the wire, each paired with the operation that encodes or
//! decodes the value's content.
//!
//! # Invariants
//!
//! The mapping is a bijection: no two entries share a tag or a serialized
//! name. [`TypeOperationRegistry::update_mapping`] moves both keys together
//! and leaves the registry untouched when it fails.
//!
//! Lookups return `Option`; the codec turns a miss into
//! [`WirecallError::UnknownType`] with the offending name.

use roxmltree::Node;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::codec::WireCodec;
use super::error::{Result, WirecallError};
use super::formats;
use super::value::{CustomValue, TypeTag, Value};
use super::xml::{is_valid_name, text_content, ElementCursor, XmlWriter};

/// Element that stands for the empty string, so that "" is never written
/// as empty character data.
pub const EMPTY_STRING_ELEMENT: &str = "emptyString";

/// Writes the content of a value into the currently open element.
pub type EncodeOp = Arc<dyn Fn(&Value, &WireCodec, &mut XmlWriter) -> Result<()> + Send + Sync>;

/// Reads a value from the element that wraps its content.
pub type DecodeOp =
    Arc<dyn for<'a, 'input> Fn(Node<'a, 'input>, &WireCodec) -> Result<Value> + Send + Sync>;

/// Wraps a closure as an [`EncodeOp`].
pub fn encode_op<F>(op: F) -> EncodeOp
where
    F: Fn(&Value, &WireCodec, &mut XmlWriter) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(op)
}

/// Wraps a closure as a [`DecodeOp`].
pub fn decode_op<F>(op: F) -> DecodeOp
where
    F: for<'a, 'input> Fn(Node<'a, 'input>, &WireCodec) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(op)
}

/// Serialized names of the built-in primitive types. Array types append
/// [`ARRAY_SUFFIX`].
const BUILTIN_NAMES: [(TypeTag, &str); 11] = [
    (TypeTag::Int8, "signedByte"),
    (TypeTag::Int16, "shortInteger"),
    (TypeTag::Int32, "integer"),
    (TypeTag::Int64, "longInteger"),
    (TypeTag::Float32, "float"),
    (TypeTag::Float64, "double"),
    (TypeTag::Bool, "bool"),
    (TypeTag::Char, "char"),
    (TypeTag::Decimal, "decimal"),
    (TypeTag::DateTime, "dateTime"),
    (TypeTag::String, "string"),
];

const ARRAY_SUFFIX: &str = "Array";

#[derive(Clone)]
struct EncodeEntry {
    serialized_name: String,
    encode: EncodeOp,
}

#[derive(Clone)]
struct DecodeEntry {
    native: TypeTag,
    decode: DecodeOp,
}

/// Registry of per-type encode and decode operations.
///
/// Built once at startup and shared read-only by the codec; only explicit
/// [`add_mapping`](Self::add_mapping) / [`update_mapping`](Self::update_mapping)
/// calls mutate it.
///
/// # Example
///
/// ```
/// use wirecall_common::protocol::{TypeOperationRegistry, TypeTag};
///
/// let registry = TypeOperationRegistry::new();
/// assert_eq!(registry.serialized_name(&TypeTag::Int32), Some("integer"));
/// assert_eq!(registry.native_type("integerArray"), Some(&TypeTag::array_of(TypeTag::Int32)));
/// assert!(registry.native_type("widget").is_none());
/// ```
#[derive(Clone)]
pub struct TypeOperationRegistry {
    native_to_serialized: HashMap<TypeTag, EncodeEntry>,
    serialized_to_native: HashMap<String, DecodeEntry>,
}

impl TypeOperationRegistry {
    /// Creates a registry holding the built-in primitive and array mappings.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_builtins();
        registry
    }

    /// Creates a registry with no mappings at all.
    pub fn empty() -> Self {
        Self {
            native_to_serialized: HashMap::new(),
            serialized_to_native: HashMap::new(),
        }
    }

    /// Adds a mapping.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `serialized_name` is not usable as an element name
    /// - `DuplicateMapping` if either the tag or the serialized name is taken
    pub fn add_mapping(
        &mut self,
        native: TypeTag,
        serialized_name: impl Into<String>,
        encode: EncodeOp,
        decode: DecodeOp,
    ) -> Result<()> {
        let serialized_name = serialized_name.into();
        validate_serialized_name(&serialized_name)?;

        if self.native_to_serialized.contains_key(&native) {
            return Err(WirecallError::DuplicateMapping(format!(
                "native type {} is already mapped",
                native
            )));
        }
        if self.serialized_to_native.contains_key(&serialized_name) {
            return Err(WirecallError::DuplicateMapping(format!(
                "serialized name '{}' is already mapped",
                serialized_name
            )));
        }

        self.insert(native, serialized_name, encode, decode);
        Ok(())
    }

    /// Replaces the mapping for `native`, possibly under a new serialized name.
    ///
    /// # Errors
    ///
    /// - `UnknownType` if `native` has no mapping
    /// - `DuplicateMapping` if `serialized_name` belongs to a different type
    pub fn update_mapping(
        &mut self,
        native: TypeTag,
        serialized_name: impl Into<String>,
        encode: EncodeOp,
        decode: DecodeOp,
    ) -> Result<()> {
        let serialized_name = serialized_name.into();
        validate_serialized_name(&serialized_name)?;

        let old_name = match self.native_to_serialized.get(&native) {
            Some(entry) => entry.serialized_name.clone(),
            None => return Err(WirecallError::UnknownType(native.to_string())),
        };
        if let Some(existing) = self.serialized_to_native.get(&serialized_name) {
            if existing.native != native {
                return Err(WirecallError::DuplicateMapping(format!(
                    "serialized name '{}' is already mapped to {}",
                    serialized_name, existing.native
                )));
            }
        }

        self.native_to_serialized.remove(&native);
        self.serialized_to_native.remove(&old_name);
        self.insert(native, serialized_name, encode, decode);
        Ok(())
    }

    /// Registers a custom record type whose values are [`CustomValue`]s
    /// named `native_name`.
    ///
    /// The record is written as an element named `serialized_name` holding
    /// one element per field, each encoded like a parameter.
    pub fn add_record_type(
        &mut self,
        native_name: impl Into<String>,
        serialized_name: impl Into<String>,
    ) -> Result<()> {
        let native_name = native_name.into();
        let serialized_name = serialized_name.into();
        let (encode, decode) = record_ops(native_name.clone(), serialized_name.clone());
        self.add_mapping(TypeTag::Custom(native_name), serialized_name, encode, decode)
    }

    pub fn contains(&self, native: &TypeTag) -> bool {
        self.native_to_serialized.contains_key(native)
    }

    pub fn serialized_name(&self, native: &TypeTag) -> Option<&str> {
        self.native_to_serialized
            .get(native)
            .map(|entry| entry.serialized_name.as_str())
    }

    pub fn native_type(&self, serialized_name: &str) -> Option<&TypeTag> {
        self.serialized_to_native
            .get(serialized_name)
            .map(|entry| &entry.native)
    }

    pub fn encode_op(&self, native: &TypeTag) -> Option<&EncodeOp> {
        self.native_to_serialized.get(native).map(|entry| &entry.encode)
    }

    pub fn decode_op(&self, serialized_name: &str) -> Option<&DecodeOp> {
        self.serialized_to_native
            .get(serialized_name)
            .map(|entry| &entry.decode)
    }

    pub fn len(&self) -> usize {
        self.native_to_serialized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.native_to_serialized.is_empty()
    }

    fn insert(&mut self, native: TypeTag, serialized_name: String, encode: EncodeOp, decode: DecodeOp) {
        self.serialized_to_native.insert(
            serialized_name.clone(),
            DecodeEntry {
                native: native.clone(),
                decode,
            },
        );
        self.native_to_serialized.insert(
            native,
            EncodeEntry {
                serialized_name,
                encode,
            },
        );
    }

    fn register_builtins(&mut self) {
        for (tag, name) in BUILTIN_NAMES {
            let (encode, decode) = primitive_ops(&tag);
            self.insert(tag.clone(), name.to_string(), encode, decode);

            let (encode, decode) = array_ops();
            self.insert(
                TypeTag::array_of(tag),
                format!("{}{}", name, ARRAY_SUFFIX),
                encode,
                decode,
            );
        }
    }
}

impl Default for TypeOperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeOperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.serialized_to_native.keys().collect();
        names.sort();
        f.debug_struct("TypeOperationRegistry")
            .field("types", &names)
            .finish()
    }
}

fn validate_serialized_name(name: &str) -> Result<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(WirecallError::InvalidArgument(format!(
            "'{}' is not a valid serialized type name",
            name
        )))
    }
}

fn type_mismatch(expected: &TypeTag, found: &Value) -> WirecallError {
    WirecallError::InvalidArgument(format!(
        "expected a {} value, found {}",
        expected,
        found.type_tag()
    ))
}

macro_rules! leaf_ops {
    ($tag:expr, $variant:ident, $format:expr, $parse:expr) => {{
        let tag: TypeTag = $tag;
        (
            encode_op(move |value, _codec, writer| match value {
                Value::$variant(v) => writer.text(&$format(v)),
                other => Err(type_mismatch(&tag, other)),
            }),
            decode_op(|node, _codec| Ok(Value::$variant($parse(text_content(node).as_str())?))),
        )
    }};
}

fn primitive_ops(tag: &TypeTag) -> (EncodeOp, DecodeOp) {
    match tag {
        TypeTag::Int8 => leaf_ops!(TypeTag::Int8, Int8, |v: &i8| v.to_string(), |t: &str| {
            formats::parse_integer::<i8>("i8", t)
        }),
        TypeTag::Int16 => leaf_ops!(TypeTag::Int16, Int16, |v: &i16| v.to_string(), |t: &str| {
            formats::parse_integer::<i16>("i16", t)
        }),
        TypeTag::Int32 => leaf_ops!(TypeTag::Int32, Int32, |v: &i32| v.to_string(), |t: &str| {
            formats::parse_integer::<i32>("i32", t)
        }),
        TypeTag::Int64 => leaf_ops!(TypeTag::Int64, Int64, |v: &i64| v.to_string(), |t: &str| {
            formats::parse_integer::<i64>("i64", t)
        }),
        TypeTag::Float32 => leaf_ops!(
            TypeTag::Float32,
            Float32,
            |v: &f32| formats::format_f32(*v),
            |t: &str| formats::parse_f32(t)
        ),
        TypeTag::Float64 => leaf_ops!(
            TypeTag::Float64,
            Float64,
            |v: &f64| formats::format_f64(*v),
            |t: &str| formats::parse_f64(t)
        ),
        TypeTag::Bool => leaf_ops!(
            TypeTag::Bool,
            Bool,
            |v: &bool| formats::format_bool(*v),
            |t: &str| formats::parse_bool(t)
        ),
        TypeTag::Char => leaf_ops!(
            TypeTag::Char,
            Char,
            |v: &char| v.to_string(),
            |t: &str| formats::parse_char(t)
        ),
        TypeTag::Decimal => leaf_ops!(
            TypeTag::Decimal,
            Decimal,
            formats::format_decimal,
            |t: &str| formats::parse_decimal(t)
        ),
        TypeTag::DateTime => leaf_ops!(
            TypeTag::DateTime,
            DateTime,
            formats::format_date_time,
            |t: &str| formats::parse_date_time(t)
        ),
        // Only `TypeTag::String` remains among the primitives.
        _ => string_ops(),
    }
}

fn string_ops() -> (EncodeOp, DecodeOp) {
    (
        encode_op(|value, _codec, writer| match value {
            Value::String(s) if s.is_empty() => {
                writer.empty(EMPTY_STRING_ELEMENT);
                Ok(())
            }
            Value::String(s) => writer.text(s),
            other => Err(type_mismatch(&TypeTag::String, other)),
        }),
        decode_op(|node, _codec| {
            let cursor = ElementCursor::new(node);
            match cursor.peek_name() {
                Some(EMPTY_STRING_ELEMENT) => Ok(Value::String(String::new())),
                Some(other) => Err(WirecallError::MalformedDocument(format!(
                    "unexpected <{}> in string content",
                    other
                ))),
                None => Ok(Value::String(text_content(node))),
            }
        }),
    )
}

fn array_ops() -> (EncodeOp, DecodeOp) {
    (
        encode_op(|value, codec, writer| match value {
            Value::Array {
                element_type,
                items,
            } => codec.write_array(element_type, items, writer),
            other => Err(WirecallError::InvalidArgument(format!(
                "expected an array value, found {}",
                other.type_tag()
            ))),
        }),
        decode_op(|node, codec| codec.read_array(node)),
    )
}

fn record_ops(native_name: String, serialized_name: String) -> (EncodeOp, DecodeOp) {
    let tag = TypeTag::Custom(native_name.clone());
    let type_name = native_name.clone();
    let element = serialized_name.clone();

    let encode = encode_op(move |value, codec, writer| {
        let record = match value {
            Value::Custom(record) if record.type_name == native_name => record,
            other => return Err(type_mismatch(&tag, other)),
        };

        writer.start(&element);
        for (field, field_value) in &record.fields {
            if !is_valid_name(field) {
                return Err(WirecallError::InvalidArgument(format!(
                    "field name '{}' of {} is not a valid element name",
                    field, record.type_name
                )));
            }
            codec.write_slot(field, field_value.as_ref(), writer)?;
        }
        writer.end(&element);
        Ok(())
    });

    let decode = decode_op(move |node, codec| {
        let mut cursor = ElementCursor::new(node);
        let record_node = cursor.expect(&serialized_name)?;
        cursor.finish()?;

        let mut record = CustomValue::new(type_name.clone());
        let mut fields = ElementCursor::new(record_node);
        while let Some(field_node) = fields.next_element() {
            let value = codec.read_slot(field_node)?;
            record = record.with_field(field_node.tag_name().name(), value);
        }
        Ok(Value::Custom(record))
    });

    (encode, decode)
}
