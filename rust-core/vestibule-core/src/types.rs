//! # Type System for Bound Parameters
//!
//! Declared parameter types, bound values, and the shared scalar conversion.
//!
//! ## Conversion policy
//!
//! [`convert`] reports failures as [`ConversionError`]. Binding never fails
//! on bad input: call sites coalesce errors with
//! [`ConvertResultExt::or_zero`], which yields the declared type's zero value
//! (`0`, `0.0`, `false`) or null for object types.

use crate::error::ConversionError;
use hyper::body::Bytes;
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use tracing::debug;

/// Declared type of a handler parameter or structure property
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    /// Integer within `min..=max` (parsed as i64)
    Int {
        /// Smallest accepted value
        min: i64,
        /// Largest accepted value
        max: i64,
    },
    /// Floating point (parsed as f64)
    Float,
    /// Boolean
    Bool,
    /// Text
    Str,
    /// Untyped value, kept as text
    Any,
    /// Uploaded byte payload
    Bytes,
    /// Nullable form of the inner type: missing or bad input yields null
    Optional(Box<TypeDescriptor>),
    /// Fixed-element array
    Array(Box<TypeDescriptor>),
    /// Growable list
    List(Box<TypeDescriptor>),
    /// String-keyed map with the given value type
    Map(Box<TypeDescriptor>),
    /// User-defined structure
    Object(ObjectSchema),
}

impl TypeDescriptor {
    /// Integer accepting the whole i64 range
    pub const INT: Self = Self::Int {
        min: i64::MIN,
        max: i64::MAX,
    };

    /// Short type name for logs and errors
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Int { .. } => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Str => "string",
            Self::Any => "value",
            Self::Bytes => "bytes",
            Self::Optional(_) => "optional",
            Self::Array(_) => "array",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Object(_) => "object",
        }
    }

    /// Value bound when input is missing or unconvertible
    ///
    /// Primitives get their zero value; every other type gets null.
    #[must_use]
    pub const fn zero_value(&self) -> BoundValue {
        match self {
            Self::Int { .. } => BoundValue::Int(0),
            Self::Float => BoundValue::Float(0.0),
            Self::Bool => BoundValue::Bool(false),
            _ => BoundValue::Null,
        }
    }

    /// Filler for unset slots inside a nested tree
    ///
    /// Unlike [`zero_value`](Self::zero_value), strings, sequences and
    /// structures get an empty value so the tree still deserializes.
    #[must_use]
    pub fn padding(&self) -> Value {
        match self {
            Self::Int { .. } => Value::from(0),
            Self::Float => Value::from(0.0),
            Self::Bool => Value::Bool(false),
            Self::Str => Value::String(String::new()),
            Self::Array(_) | Self::List(_) => Value::Array(Vec::new()),
            Self::Map(_) | Self::Object(_) => Value::Object(Map::new()),
            Self::Any | Self::Bytes | Self::Optional(_) => Value::Null,
        }
    }

    /// Element type of an array or list
    #[must_use]
    pub fn element(&self) -> Option<&Self> {
        match self {
            Self::Array(elem) | Self::List(elem) => Some(elem),
            _ => None,
        }
    }

    /// The inner type of `Optional`, or the type itself
    #[must_use]
    pub fn unwrap_optional(&self) -> &Self {
        match self {
            Self::Optional(inner) => inner.unwrap_optional(),
            other => other,
        }
    }

    /// Structure schema, looking through `Optional`
    #[must_use]
    pub fn schema(&self) -> Option<&ObjectSchema> {
        match self {
            Self::Object(schema) => Some(schema),
            Self::Optional(inner) => inner.schema(),
            _ => None,
        }
    }

    /// Whether a single request string can be converted to this type
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        match self {
            Self::Int { .. } | Self::Float | Self::Bool | Self::Str | Self::Any => true,
            Self::Optional(inner) => inner.is_scalar(),
            _ => false,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Optional(inner) => write!(f, "optional<{inner}>"),
            Self::Array(inner) => write!(f, "{inner}[]"),
            Self::List(inner) => write!(f, "list<{inner}>"),
            Self::Map(inner) => write!(f, "map<string, {inner}>"),
            Self::Object(schema) => f.write_str(schema.type_name()),
            other => f.write_str(other.type_name()),
        }
    }
}

/// Declared properties of a user-defined structure
///
/// Property descriptors are produced lazily so self-referencing structures
/// (through `Option<Box<Self>>`) do not recurse at registration time.
#[derive(Clone, Copy)]
pub struct ObjectSchema {
    type_name: &'static str,
    fields: fn() -> Vec<FieldSpec>,
}

impl ObjectSchema {
    /// Create a schema from a type name and a property table
    #[must_use]
    pub const fn new(type_name: &'static str, fields: fn() -> Vec<FieldSpec>) -> Self {
        Self { type_name, fields }
    }

    /// Name of the described type
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// All declared properties
    #[must_use]
    pub fn fields(&self) -> Vec<FieldSpec> {
        (self.fields)()
    }

    /// Declared type of one property
    #[must_use]
    pub fn field(&self, name: &str) -> Option<TypeDescriptor> {
        self.fields()
            .into_iter()
            .find(|f| f.name == name)
            .map(|f| f.ty)
    }
}

impl fmt::Debug for ObjectSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectSchema")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ObjectSchema {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
    }
}

/// One declared property of a structure
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Property name as it appears in request keys
    pub name: &'static str,
    /// Declared property type
    pub ty: TypeDescriptor,
}

impl FieldSpec {
    /// Create a property descriptor
    #[must_use]
    pub const fn new(name: &'static str, ty: TypeDescriptor) -> Self {
        Self { name, ty }
    }
}

/// Types that can be the target of parameter binding
///
/// Implemented here for scalars and collections; derive it for structures
/// with `#[derive(Bindable)]`.
pub trait Bindable {
    /// Declared type used to drive binding
    fn descriptor() -> TypeDescriptor;
}

macro_rules! bindable_as {
    ($descriptor:expr => $($ty:ty),+) => {
        $(
            impl Bindable for $ty {
                fn descriptor() -> TypeDescriptor {
                    $descriptor
                }
            }
        )+
    };
}

macro_rules! bindable_int {
    ($($ty:ty),+) => {
        $(
            impl Bindable for $ty {
                fn descriptor() -> TypeDescriptor {
                    TypeDescriptor::Int {
                        min: i64::try_from(<$ty>::MIN).unwrap_or(i64::MIN),
                        max: i64::try_from(<$ty>::MAX).unwrap_or(i64::MAX),
                    }
                }
            }
        )+
    };
}

bindable_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
bindable_as!(TypeDescriptor::Float => f32, f64);
bindable_as!(TypeDescriptor::Bool => bool);
bindable_as!(TypeDescriptor::Str => String);
bindable_as!(TypeDescriptor::Any => Value);
bindable_as!(TypeDescriptor::Bytes => Bytes);

impl<T: Bindable> Bindable for Option<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Optional(Box::new(T::descriptor()))
    }
}

impl<T: Bindable> Bindable for Box<T> {
    fn descriptor() -> TypeDescriptor {
        T::descriptor()
    }
}

impl<T: Bindable> Bindable for Box<[T]> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Array(Box::new(T::descriptor()))
    }
}

impl<T: Bindable> Bindable for Vec<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::List(Box::new(T::descriptor()))
    }
}

impl<T: Bindable> Bindable for VecDeque<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::List(Box::new(T::descriptor()))
    }
}

impl<V: Bindable, S> Bindable for HashMap<String, V, S> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Map(Box::new(V::descriptor()))
    }
}

impl<V: Bindable> Bindable for BTreeMap<String, V> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Map(Box::new(V::descriptor()))
    }
}

/// A value produced by binding
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    /// Absent value
    Null,
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// Boolean value
    Bool(bool),
    /// Text value
    Str(String),
    /// Array or list value
    Seq(Vec<BoundValue>),
    /// Structured value: a nested object or a parameter map
    Json(Value),
    /// One uploaded payload
    Bytes(Bytes),
    /// Uploaded files keyed by field name
    Files(HashMap<String, Bytes>),
}

impl BoundValue {
    /// Whether the value is absent
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get as i64 if Int variant
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if Float variant
    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as bool if Bool variant
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as text if Str variant
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to a JSON value
    ///
    /// Uploaded files have no JSON form and become null.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null | Self::Bytes(_) | Self::Files(_) => Value::Null,
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Self::Bool(b) => Value::Bool(*b),
            Self::Str(s) => Value::String(s.clone()),
            Self::Seq(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Json(v) => v.clone(),
        }
    }
}

/// Convert one raw request string to the declared type
///
/// Sequences receive a one-element list. Maps, structures and byte payloads
/// cannot be built from a single string.
///
/// # Errors
///
/// Returns `ConversionError::Missing` for empty input,
/// `ConversionError::Unparsable` when parsing fails, and
/// `ConversionError::NotScalar` for non-scalar targets.
pub fn convert(raw: &str, ty: &TypeDescriptor) -> Result<BoundValue, ConversionError> {
    if raw.is_empty() {
        return Err(ConversionError::Missing);
    }
    let unparsable = || ConversionError::Unparsable {
        raw: raw.to_string(),
        target: ty.type_name(),
    };

    match ty {
        TypeDescriptor::Str | TypeDescriptor::Any => Ok(BoundValue::Str(raw.to_string())),
        TypeDescriptor::Int { min, max } => raw
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|n| (*min..=*max).contains(n))
            .map(BoundValue::Int)
            .ok_or_else(unparsable),
        TypeDescriptor::Float => raw
            .trim()
            .parse::<f64>()
            .map(BoundValue::Float)
            .map_err(|_| unparsable()),
        TypeDescriptor::Bool => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(BoundValue::Bool(true)),
            "false" | "0" | "no" | "off" => Ok(BoundValue::Bool(false)),
            _ => Err(unparsable()),
        },
        TypeDescriptor::Optional(inner) => convert(raw, inner),
        TypeDescriptor::Array(elem) | TypeDescriptor::List(elem) => {
            Ok(BoundValue::Seq(vec![convert(raw, elem).or_zero(elem)]))
        }
        TypeDescriptor::Map(_) | TypeDescriptor::Object(_) | TypeDescriptor::Bytes => {
            Err(ConversionError::NotScalar {
                target: ty.type_name(),
            })
        }
    }
}

/// Coalescing combinators for conversion results
pub trait ConvertResultExt {
    /// Replace a failed conversion with the type's zero value
    fn or_zero(self, ty: &TypeDescriptor) -> BoundValue;

    /// Convert to JSON, replacing a failure with the type's padding
    fn or_padding(self, ty: &TypeDescriptor) -> Value;
}

impl ConvertResultExt for Result<BoundValue, ConversionError> {
    fn or_zero(self, ty: &TypeDescriptor) -> BoundValue {
        self.unwrap_or_else(|e| {
            if e != ConversionError::Missing {
                debug!(error = %e, target = %ty, "Binding degraded to default");
            }
            ty.zero_value()
        })
    }

    fn or_padding(self, ty: &TypeDescriptor) -> Value {
        match self {
            Ok(value) => value.to_json(),
            Err(e) => {
                if e != ConversionError::Missing {
                    debug!(error = %e, target = %ty, "Nested binding degraded to default");
                }
                ty.padding()
            }
        }
    }
}
