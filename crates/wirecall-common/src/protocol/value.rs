//! wirecall Value Model
//!
//! This module defines the typed values that travel as invocation parameters
//! and return values, and the [`Invocation`] that carries them.
//!
//! A parameter slot is an `Option<Value>`: `None` is the null parameter, which
//! is encoded without a type name. Every `Some` value knows its [`TypeTag`],
//! and the registry maps that tag to the serialized type name used as the wire
//! discriminator.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::fmt;

use super::error::{Result, WirecallError};

/// Stable identity of a native type, used as the registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
    Char,
    Decimal,
    DateTime,
    String,
    /// One-dimensional array of the inner type.
    Array(Box<TypeTag>),
    /// Application-defined record type, identified by its native name.
    Custom(String),
}

impl TypeTag {
    pub fn array_of(element: TypeTag) -> Self {
        TypeTag::Array(Box::new(element))
    }

    pub fn custom(name: impl Into<String>) -> Self {
        TypeTag::Custom(name.into())
    }

    /// The primitive tags registered at construction, in registration order.
    pub const PRIMITIVES: [TypeTag; 11] = [
        TypeTag::Int8,
        TypeTag::Int16,
        TypeTag::Int32,
        TypeTag::Int64,
        TypeTag::Float32,
        TypeTag::Float64,
        TypeTag::Bool,
        TypeTag::Char,
        TypeTag::Decimal,
        TypeTag::DateTime,
        TypeTag::String,
    ];
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Int8 => write!(f, "i8"),
            TypeTag::Int16 => write!(f, "i16"),
            TypeTag::Int32 => write!(f, "i32"),
            TypeTag::Int64 => write!(f, "i64"),
            TypeTag::Float32 => write!(f, "f32"),
            TypeTag::Float64 => write!(f, "f64"),
            TypeTag::Bool => write!(f, "bool"),
            TypeTag::Char => write!(f, "char"),
            TypeTag::Decimal => write!(f, "decimal"),
            TypeTag::DateTime => write!(f, "datetime"),
            TypeTag::String => write!(f, "string"),
            TypeTag::Array(element) => write!(f, "[{}]", element),
            TypeTag::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Field-ordered record value of an application-defined type.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomValue {
    pub type_name: String,
    pub fields: Vec<(String, Option<Value>)>,
}

impl CustomValue {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Option<Value>) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .and_then(|(_, value)| value.as_ref())
    }
}

/// A typed, non-null wire value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    Char(char),
    Decimal(Decimal),
    DateTime(NaiveDateTime),
    String(String),
    /// Array of `element_type`; entries may be null.
    Array {
        element_type: TypeTag,
        items: Vec<Option<Value>>,
    },
    Custom(CustomValue),
}

impl Value {
    /// Builds an array value whose entries are all present.
    pub fn array(element_type: TypeTag, items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array {
            element_type,
            items: items.into_iter().map(Some).collect(),
        }
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Int8(_) => TypeTag::Int8,
            Value::Int16(_) => TypeTag::Int16,
            Value::Int32(_) => TypeTag::Int32,
            Value::Int64(_) => TypeTag::Int64,
            Value::Float32(_) => TypeTag::Float32,
            Value::Float64(_) => TypeTag::Float64,
            Value::Bool(_) => TypeTag::Bool,
            Value::Char(_) => TypeTag::Char,
            Value::Decimal(_) => TypeTag::Decimal,
            Value::DateTime(_) => TypeTag::DateTime,
            Value::String(_) => TypeTag::String,
            Value::Array { element_type, .. } => TypeTag::array_of(element_type.clone()),
            Value::Custom(custom) => TypeTag::Custom(custom.type_name.clone()),
        }
    }
}

macro_rules! impl_from_primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

impl_from_primitive! {
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    bool => Bool,
    char => Char,
    Decimal => Decimal,
    NaiveDateTime => DateTime,
    String => String,
    CustomValue => Custom,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

/// A remote method call: name, ordered parameters, and expected return type.
///
/// Immutable once built. A `return_type` of `None` means the method is void.
///
/// # Example
///
/// ```
/// use wirecall_common::protocol::{Invocation, TypeTag, Value};
///
/// let invocation = Invocation::new("Add")
///     .unwrap()
///     .with_parameters(vec![Some(Value::Int32(5)), Some(Value::Int32(7))])
///     .unwrap()
///     .returning(TypeTag::Int32);
///
/// assert_eq!(invocation.name(), "Add");
/// assert_eq!(invocation.parameters().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    name: String,
    parameters: Vec<Option<Value>>,
    return_type: Option<TypeTag>,
}

impl Invocation {
    /// Creates a parameterless, void invocation.
    ///
    /// Fails with `InvalidArgument` if `name` is blank after trimming.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(WirecallError::InvalidArgument(
                "method name must not be blank".to_string(),
            ));
        }

        Ok(Self {
            name,
            parameters: Vec::new(),
            return_type: None,
        })
    }

    /// Sets the parameters. An explicitly supplied parameter list must not be
    /// empty; use [`Invocation::new`] alone for a parameterless call.
    pub fn with_parameters(mut self, parameters: Vec<Option<Value>>) -> Result<Self> {
        if parameters.is_empty() {
            return Err(WirecallError::InvalidArgument(
                "explicit parameter list must not be empty".to_string(),
            ));
        }
        self.parameters = parameters;
        Ok(self)
    }

    pub fn returning(mut self, return_type: TypeTag) -> Self {
        self.return_type = Some(return_type);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[Option<Value>] {
        &self.parameters
    }

    pub fn return_type(&self) -> Option<&TypeTag> {
        self.return_type.as_ref()
    }

    pub fn is_void(&self) -> bool {
        self.return_type.is_none()
    }

    /// Rebuilds an invocation from decoded parts without the constructor's
    /// non-empty parameter check, since a decoded call may carry none.
    pub(crate) fn from_parts(
        name: String,
        parameters: Vec<Option<Value>>,
        return_type: Option<TypeTag>,
    ) -> Result<Self> {
        let mut invocation = Self::new(name)?;
        invocation.parameters = parameters;
        invocation.return_type = return_type;
        Ok(invocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_method_name_rejected() {
        assert!(matches!(
            Invocation::new("   "),
            Err(WirecallError::InvalidArgument(_))
        ));
        assert!(Invocation::new("").is_err());
    }

    #[test]
    fn test_explicit_empty_parameters_rejected() {
        let result = Invocation::new("Add").unwrap().with_parameters(vec![]);
        assert!(matches!(result, Err(WirecallError::InvalidArgument(_))));
    }

    #[test]
    fn test_void_by_default() {
        let invocation = Invocation::new("Ping").unwrap();
        assert!(invocation.is_void());
        assert!(invocation.parameters().is_empty());

        let invocation = invocation.returning(TypeTag::String);
        assert_eq!(invocation.return_type(), Some(&TypeTag::String));
    }

    #[test]
    fn test_value_type_tags() {
        assert_eq!(Value::from(5i32).type_tag(), TypeTag::Int32);
        assert_eq!(Value::from("x").type_tag(), TypeTag::String);
        assert_eq!(
            Value::array(TypeTag::Bool, [Value::Bool(true)]).type_tag(),
            TypeTag::array_of(TypeTag::Bool)
        );
        assert_eq!(
            Value::from(CustomValue::new("Point")).type_tag(),
            TypeTag::custom("Point")
        );
    }

    #[test]
    fn test_custom_value_field_lookup() {
        let point = CustomValue::new("Point")
            .with_field("x", Some(Value::Int32(3)))
            .with_field("label", None);

        assert_eq!(point.field("x"), Some(&Value::Int32(3)));
        assert_eq!(point.field("label"), None);
        assert_eq!(point.field("missing"), None);
    }
}
