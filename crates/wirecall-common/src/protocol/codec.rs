//! wirecall Wire Codec
//!
//! Reversible text encoding of [`Invocation`]s and return values, driven by
//! the [`TypeOperationRegistry`]. The codec itself only knows the document
//! skeleton; every value's content is produced and consumed by the
//! registry-resolved operations.
//!
//! # Document Layout
//!
//! ```text
//! <invocation>
//!   <methodName>Add</methodName>
//!   <parameters>
//!     <item><dataType>integer</dataType><data>5</data></item>
//!     <item/>                                  (null parameter)
//!   </parameters>
//!   <returnType><dataType>integer</dataType></returnType>
//! </invocation>
//! ```
//!
//! A void invocation writes `<returnType/>`. Return values are written as
//! `<returnValue>` with the same item shape, and a void reply is the fixed
//! [`VOID_RETURN_VALUE`] text. Documents carry no whitespace between
//! elements (shown above for readability).
//!
//! An empty element always means "absent": a null parameter, a null array
//! entry, a void return type. Presence is decided by looking at the next
//! child element, never by counting children.

use roxmltree::{Document, Node};

use super::error::{Result, WirecallError};
use super::registry::TypeOperationRegistry;
use super::value::{Invocation, TypeTag, Value};
use super::xml::{expect_root, text_content, ElementCursor, XmlWriter};

const INVOCATION_ELEMENT: &str = "invocation";
const METHOD_NAME_ELEMENT: &str = "methodName";
const PARAMETERS_ELEMENT: &str = "parameters";
const ITEM_ELEMENT: &str = "item";
const DATA_TYPE_ELEMENT: &str = "dataType";
const DATA_ELEMENT: &str = "data";
const ELEMENT_TYPE_ELEMENT: &str = "elementType";
const RETURN_TYPE_ELEMENT: &str = "returnType";
const RETURN_VALUE_ELEMENT: &str = "returnValue";
const ERROR_ELEMENT: &str = "error";

/// Reply sent for a void method.
///
/// Sender and receiver compare against this text literally, so it must stay
/// byte-identical on both sides.
pub const VOID_RETURN_VALUE: &str = "<returnType>void</returnType>";

/// Registry-driven serializer for invocations and return values.
///
/// # Example
///
/// ```
/// use wirecall_common::protocol::{Invocation, TypeTag, Value, WireCodec};
///
/// let codec = WireCodec::new();
/// let invocation = Invocation::new("Add")
///     .unwrap()
///     .with_parameters(vec![Some(Value::Int32(5)), Some(Value::Int32(7))])
///     .unwrap()
///     .returning(TypeTag::Int32);
///
/// let text = codec.serialize_invocation(&invocation).unwrap();
/// let decoded = codec.deserialize_invocation(&text).unwrap();
/// assert_eq!(decoded, invocation);
/// ```
#[derive(Debug, Clone, Default)]
pub struct WireCodec {
    registry: TypeOperationRegistry,
}

impl WireCodec {
    /// Creates a codec over the built-in type registry.
    pub fn new() -> Self {
        Self::with_registry(TypeOperationRegistry::new())
    }

    pub fn with_registry(registry: TypeOperationRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TypeOperationRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TypeOperationRegistry {
        &mut self.registry
    }

    pub fn serialize_invocation(&self, invocation: &Invocation) -> Result<String> {
        self.write_invocation(invocation)
            .map_err(|e| WirecallError::Serialization {
                payload: format!("{:?}", invocation),
                source: Box::new(e),
            })
    }

    pub fn deserialize_invocation(&self, text: &str) -> Result<Invocation> {
        self.read_invocation(text)
            .map_err(|e| WirecallError::Deserialization {
                payload: text.to_string(),
                source: Box::new(e),
            })
    }

    /// Serializes the result of a non-void method; `None` is a null result.
    ///
    /// Void methods reply with [`VOID_RETURN_VALUE`] instead.
    pub fn serialize_return_value(&self, value: Option<&Value>) -> Result<String> {
        let mut writer = XmlWriter::new();
        self.write_slot(RETURN_VALUE_ELEMENT, value, &mut writer)
            .map_err(|e| WirecallError::Serialization {
                payload: format!("{:?}", value),
                source: Box::new(e),
            })?;
        Ok(writer.finish())
    }

    /// Serializes a failure reply carrying `message`.
    pub fn serialize_error(&self, message: &str) -> Result<String> {
        let mut writer = XmlWriter::new();
        writer.start(RETURN_VALUE_ELEMENT);
        writer
            .leaf(ERROR_ELEMENT, message)
            .map_err(|e| WirecallError::Serialization {
                payload: message.to_string(),
                source: Box::new(e),
            })?;
        writer.end(RETURN_VALUE_ELEMENT);
        Ok(writer.finish())
    }

    /// Decodes a reply.
    ///
    /// Returns `Ok(None)` for a null result and for [`VOID_RETURN_VALUE`];
    /// callers that need to tell those apart compare against the constant
    /// first. An error reply becomes [`WirecallError::RemoteInvocation`].
    pub fn deserialize_return_value(&self, text: &str) -> Result<Option<Value>> {
        if text == VOID_RETURN_VALUE {
            return Ok(None);
        }

        match self.read_return_value(text) {
            Ok(ReturnValue::Value(value)) => Ok(value),
            Ok(ReturnValue::Error(message)) => Err(WirecallError::RemoteInvocation(message)),
            Err(e) => Err(WirecallError::Deserialization {
                payload: text.to_string(),
                source: Box::new(e),
            }),
        }
    }

    /// Writes `<name/>` for `None`, otherwise
    /// `<name><dataType>..</dataType><data>..</data></name>`.
    ///
    /// This is the generic entry point custom type operations use for
    /// nested values.
    pub fn write_slot(&self, name: &str, value: Option<&Value>, writer: &mut XmlWriter) -> Result<()> {
        let Some(value) = value else {
            writer.empty(name);
            return Ok(());
        };

        let tag = value.type_tag();
        let serialized_name = self.serialized_name(&tag)?;
        let encode = self
            .registry
            .encode_op(&tag)
            .ok_or_else(|| WirecallError::UnknownType(tag.to_string()))?;

        writer.start(name);
        writer.leaf(DATA_TYPE_ELEMENT, serialized_name)?;
        writer.start(DATA_ELEMENT);
        encode(value, self, writer)?;
        writer.end(DATA_ELEMENT);
        writer.end(name);
        Ok(())
    }

    /// Reads an element written by [`write_slot`](Self::write_slot).
    pub fn read_slot(&self, node: Node<'_, '_>) -> Result<Option<Value>> {
        let mut cursor = ElementCursor::new(node);
        if cursor.peek_name().is_none() {
            return Ok(None);
        }

        let serialized_name = text_content(cursor.expect(DATA_TYPE_ELEMENT)?);
        let data = cursor.expect(DATA_ELEMENT)?;
        cursor.finish()?;

        let decode = self
            .registry
            .decode_op(&serialized_name)
            .ok_or_else(|| WirecallError::UnknownType(serialized_name.clone()))?;
        decode(data, self).map(Some)
    }

    /// Writes array content: the element type, then one item per entry.
    pub fn write_array(
        &self,
        element_type: &TypeTag,
        items: &[Option<Value>],
        writer: &mut XmlWriter,
    ) -> Result<()> {
        let serialized_name = self.serialized_name(element_type)?;
        let encode = self
            .registry
            .encode_op(element_type)
            .ok_or_else(|| WirecallError::UnknownType(element_type.to_string()))?;

        writer.leaf(ELEMENT_TYPE_ELEMENT, serialized_name)?;
        for item in items {
            match item {
                None => writer.empty(ITEM_ELEMENT),
                Some(value) => {
                    if value.type_tag() != *element_type {
                        return Err(WirecallError::InvalidArgument(format!(
                            "array of {} holds a {} value",
                            element_type,
                            value.type_tag()
                        )));
                    }
                    writer.start(ITEM_ELEMENT);
                    encode(value, self, writer)?;
                    writer.end(ITEM_ELEMENT);
                }
            }
        }
        Ok(())
    }

    /// Reads array content written by [`write_array`](Self::write_array).
    pub fn read_array(&self, node: Node<'_, '_>) -> Result<Value> {
        let mut cursor = ElementCursor::new(node);
        let serialized_name = text_content(cursor.expect(ELEMENT_TYPE_ELEMENT)?);
        let element_type = self.native_type(&serialized_name)?.clone();
        let decode = self
            .registry
            .decode_op(&serialized_name)
            .ok_or_else(|| WirecallError::UnknownType(serialized_name.clone()))?;

        let mut items = Vec::new();
        while cursor.peek_name() == Some(ITEM_ELEMENT) {
            let item = cursor.expect(ITEM_ELEMENT)?;
            if item.has_children() {
                items.push(Some(decode(item, self)?));
            } else {
                items.push(None);
            }
        }
        cursor.finish()?;

        Ok(Value::Array {
            element_type,
            items,
        })
    }

    fn serialized_name(&self, tag: &TypeTag) -> Result<&str> {
        self.registry
            .serialized_name(tag)
            .ok_or_else(|| WirecallError::UnknownType(tag.to_string()))
    }

    fn native_type(&self, serialized_name: &str) -> Result<&TypeTag> {
        self.registry
            .native_type(serialized_name)
            .ok_or_else(|| WirecallError::UnknownType(serialized_name.to_string()))
    }

    fn write_invocation(&self, invocation: &Invocation) -> Result<String> {
        let mut writer = XmlWriter::new();
        writer.start(INVOCATION_ELEMENT);
        writer.leaf(METHOD_NAME_ELEMENT, invocation.name())?;

        if invocation.parameters().is_empty() {
            writer.empty(PARAMETERS_ELEMENT);
        } else {
            writer.start(PARAMETERS_ELEMENT);
            for parameter in invocation.parameters() {
                self.write_slot(ITEM_ELEMENT, parameter.as_ref(), &mut writer)?;
            }
            writer.end(PARAMETERS_ELEMENT);
        }

        match invocation.return_type() {
            None => writer.empty(RETURN_TYPE_ELEMENT),
            Some(tag) => {
                writer.start(RETURN_TYPE_ELEMENT);
                writer.leaf(DATA_TYPE_ELEMENT, self.serialized_name(tag)?)?;
                writer.end(RETURN_TYPE_ELEMENT);
            }
        }

        writer.end(INVOCATION_ELEMENT);
        Ok(writer.finish())
    }

    fn read_invocation(&self, text: &str) -> Result<Invocation> {
        let doc = Document::parse(text)?;
        let root = expect_root(&doc, INVOCATION_ELEMENT)?;
        let mut cursor = ElementCursor::new(root);

        let name = text_content(cursor.expect(METHOD_NAME_ELEMENT)?);

        let parameters_node = cursor.expect(PARAMETERS_ELEMENT)?;
        let mut parameters = Vec::new();
        let mut items = ElementCursor::new(parameters_node);
        while items.peek_name().is_some() {
            let item = items.expect(ITEM_ELEMENT)?;
            parameters.push(self.read_slot(item)?);
        }

        let return_type_node = cursor.expect(RETURN_TYPE_ELEMENT)?;
        let mut return_cursor = ElementCursor::new(return_type_node);
        let return_type = match return_cursor.peek_name() {
            None => None,
            Some(_) => {
                let serialized_name = text_content(return_cursor.expect(DATA_TYPE_ELEMENT)?);
                return_cursor.finish()?;
                Some(self.native_type(&serialized_name)?.clone())
            }
        };
        cursor.finish()?;

        Invocation::from_parts(name, parameters, return_type)
    }

    fn read_return_value(&self, text: &str) -> Result<ReturnValue> {
        let doc = Document::parse(text)?;
        let root = expect_root(&doc, RETURN_VALUE_ELEMENT)?;

        let mut cursor = ElementCursor::new(root);
        if cursor.peek_name() == Some(ERROR_ELEMENT) {
            let message = text_content(cursor.expect(ERROR_ELEMENT)?);
            cursor.finish()?;
            return Ok(ReturnValue::Error(message));
        }

        self.read_slot(root).map(ReturnValue::Value)
    }
}

enum ReturnValue {
    Value(Option<Value>),
    Error(String),
}
