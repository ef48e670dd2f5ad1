//! # Parameter Binding
//!
//! Converts the flat request multimap into one typed value per declared
//! handler parameter.
//!
//! ## Rules
//!
//! - Scalars read the first value of `name`, falling back to the path
//!   parameter of the same name. Missing or unconvertible input degrades to
//!   the type's zero value (null for `Optional`).
//! - `Array`/`List` parameters collect every value of `name` and `name[]`.
//! - `Map<String, Bytes>` receives the uploaded files; any other map receives
//!   every top-level parameter that is not a file field.
//! - Structures bind only when some key starts with `name.`; the remainder of
//!   each such key is walked through the structure's declared properties.
//!   Without such a key the parameter is null.
//! - Keys indexing past `max_index` (default [`DEFAULT_MAX_INDEX`]) are
//!   skipped.

use crate::keypath::{ensure_array, ensure_object, exceeds_index, parse_key, Index, KeySegment, DEFAULT_MAX_INDEX};
use crate::request::{Request, RequestParameters};
use crate::types::{convert, Bindable, BoundValue, ConvertResultExt, ObjectSchema, TypeDescriptor};
use hyper::body::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// One declared handler parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    name: String,
    ty: TypeDescriptor,
}

impl ParamSpec {
    /// Declare a parameter from an explicit type descriptor
    #[must_use]
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// Declare a parameter of Rust type `T`
    #[must_use]
    pub fn of<T: Bindable>(name: impl Into<String>) -> Self {
        Self::new(name, T::descriptor())
    }

    /// Request key the parameter binds from
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type
    #[must_use]
    pub const fn ty(&self) -> &TypeDescriptor {
        &self.ty
    }
}

/// Bound values, one per declared parameter, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArguments {
    names: Vec<String>,
    values: Vec<BoundValue>,
}

impl BoundArguments {
    /// Empty argument list
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a bound value
    pub fn push(&mut self, name: impl Into<String>, value: BoundValue) {
        self.names.push(name.into());
        self.values.push(value);
    }

    /// Number of arguments
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no arguments
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All values in declaration order
    #[must_use]
    pub fn values(&self) -> &[BoundValue] {
        &self.values
    }

    /// Value at `index`
    #[must_use]
    pub fn at(&self, index: usize) -> Option<&BoundValue> {
        self.values.get(index)
    }

    /// Value of the parameter called `name`
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&BoundValue> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.values.get(i))
    }

    /// Deserialize the parameter called `name` into `T`
    ///
    /// Structures should derive `Deserialize` with `#[serde(default)]` so
    /// properties absent from the request keep their defaults. Returns
    /// `None` if the value is null or does not fit `T`.
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let json = self.value(name)?.to_json();
        if json.is_null() {
            return None;
        }
        serde_json::from_value(json)
            .map_err(|e| debug!(param = name, error = %e, "Bound value does not fit target type"))
            .ok()
    }

    /// Integer parameter, `0` when absent
    #[must_use]
    pub fn int(&self, name: &str) -> i64 {
        self.value(name).and_then(BoundValue::as_int).unwrap_or(0)
    }

    /// Float parameter, `0.0` when absent
    #[must_use]
    pub fn float(&self, name: &str) -> f64 {
        self.value(name).and_then(BoundValue::as_float).unwrap_or(0.0)
    }

    /// Boolean parameter, `false` when absent
    #[must_use]
    pub fn boolean(&self, name: &str) -> bool {
        self.value(name).and_then(BoundValue::as_bool).unwrap_or(false)
    }

    /// Text parameter
    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        self.value(name).and_then(BoundValue::as_str)
    }

    /// Parameter map bound to a `Map<String, _>` parameter
    #[must_use]
    pub fn params(&self, name: &str) -> Option<&Map<String, Value>> {
        match self.value(name)? {
            BoundValue::Json(Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    /// Uploaded files bound to a `Map<String, Bytes>` parameter
    #[must_use]
    pub fn files(&self, name: &str) -> Option<&HashMap<String, Bytes>> {
        match self.value(name)? {
            BoundValue::Files(files) => Some(files),
            _ => None,
        }
    }

    /// Single uploaded payload bound to a `Bytes` parameter
    #[must_use]
    pub fn bytes(&self, name: &str) -> Option<&Bytes> {
        match self.value(name)? {
            BoundValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Binds request data to a handler signature
///
/// Borrows the request for the duration of one dispatch.
#[derive(Debug, Clone, Copy)]
pub struct ParameterBinder<'r> {
    params: &'r RequestParameters,
    attributes: &'r Map<String, Value>,
    files: &'r HashMap<String, Bytes>,
    max_index: usize,
}

impl<'r> ParameterBinder<'r> {
    /// Binder over explicit request parts
    #[must_use]
    pub const fn new(
        params: &'r RequestParameters,
        attributes: &'r Map<String, Value>,
        files: &'r HashMap<String, Bytes>,
    ) -> Self {
        Self {
            params,
            attributes,
            files,
            max_index: DEFAULT_MAX_INDEX,
        }
    }

    /// Skip keys whose list indices exceed `max_index`
    #[must_use]
    pub const fn with_max_index(mut self, max_index: usize) -> Self {
        self.max_index = max_index;
        self
    }

    /// Binder over a request's parameters, attributes and files
    #[must_use]
    pub fn for_request(request: &'r Request) -> Self {
        Self::new(request.params(), request.attributes(), request.files())
    }

    /// Bind every parameter of `signature`
    #[must_use]
    pub fn bind(&self, signature: &[ParamSpec]) -> BoundArguments {
        let mut args = BoundArguments::new();
        for spec in signature {
            let value = self.bind_one(spec);
            debug!(param = spec.name(), ty = %spec.ty(), null = value.is_null(), "Bound parameter");
            args.push(spec.name(), value);
        }
        args
    }

    fn bind_one(&self, spec: &ParamSpec) -> BoundValue {
        let name = spec.name();
        match spec.ty() {
            TypeDescriptor::Map(value_ty) if **value_ty == TypeDescriptor::Bytes => {
                BoundValue::Files(self.files.clone())
            }
            TypeDescriptor::Map(_) => BoundValue::Json(Value::Object(self.parameter_map())),
            TypeDescriptor::Bytes => self
                .files
                .get(name)
                .cloned()
                .map_or(BoundValue::Null, BoundValue::Bytes),
            TypeDescriptor::Array(elem) | TypeDescriptor::List(elem) => {
                self.bind_sequence(name, spec.ty(), elem)
            }
            ty => match ty.schema() {
                Some(schema) => self
                    .bind_object(name, schema)
                    .map_or(BoundValue::Null, |tree| BoundValue::Json(Value::Object(tree))),
                None => self.bind_scalar(name, ty),
            },
        }
    }

    fn bind_scalar(&self, name: &str, ty: &TypeDescriptor) -> BoundValue {
        if let Some(raw) = self.params.first(name) {
            return convert(raw, ty).or_zero(ty);
        }
        match self.attributes.get(name) {
            Some(Value::String(raw)) => convert(raw, ty).or_zero(ty),
            Some(Value::Null) | None => ty.zero_value(),
            Some(other) => convert(&other.to_string(), ty).or_zero(ty),
        }
    }

    fn bind_sequence(&self, name: &str, ty: &TypeDescriptor, elem: &TypeDescriptor) -> BoundValue {
        let appended = format!("{name}[]");
        let raw: Vec<&String> = self
            .params
            .get(name)
            .into_iter()
            .chain(self.params.get(&appended))
            .flatten()
            .collect();
        if raw.is_empty() {
            return ty.zero_value();
        }
        BoundValue::Seq(raw.into_iter().map(|v| convert(v, elem).or_zero(elem)).collect())
    }

    /// Every top-level parameter except uploaded-file fields
    fn parameter_map(&self) -> Map<String, Value> {
        self.params
            .iter()
            .filter(|(key, _)| !self.files.contains_key(*key))
            .map(|(key, values)| {
                let value = match values {
                    [single] => Value::String(single.clone()),
                    many => Value::Array(many.iter().cloned().map(Value::String).collect()),
                };
                (key.to_string(), value)
            })
            .collect()
    }

    fn bind_object(&self, name: &str, schema: &ObjectSchema) -> Option<Map<String, Value>> {
        let prefix = format!("{name}.");
        if !self.params.has_prefix(&prefix) {
            return None;
        }
        let mut root = Map::new();
        for (key, values) in self.params.iter() {
            if let Some(path) = key.strip_prefix(&prefix) {
                let segments = parse_key(path);
                if exceeds_index(&segments, self.max_index) {
                    debug!(key, max_index = self.max_index, "Index out of range, skipping key");
                    continue;
                }
                assign(&mut root, schema, &segments, values);
            }
        }
        Some(root)
    }
}

/// Walk `segments` through `schema`, creating intermediate nodes, and
/// assign the converted leaf
fn assign(obj: &mut Map<String, Value>, schema: &ObjectSchema, segments: &[KeySegment<'_>], values: &[String]) {
    let Some((segment, rest)) = segments.split_first() else {
        return;
    };
    let Some(ty) = schema.field(segment.name) else {
        debug!(property = segment.name, owner = schema.type_name(), "No such property, skipping");
        return;
    };
    if rest.is_empty() {
        assign_leaf(obj, *segment, &ty, values);
    } else {
        descend(obj, *segment, &ty, rest, values);
    }
}

fn assign_leaf(obj: &mut Map<String, Value>, segment: KeySegment<'_>, ty: &TypeDescriptor, values: &[String]) {
    let first = values.first().map_or("", String::as_str);
    if let Some(elem) = ty.unwrap_optional().element() {
        let items = ensure_array(
            obj.entry(segment.name.to_string())
                .or_insert_with(|| Value::Array(Vec::new())),
        );
        match segment.index {
            Some(Index::At(i)) => {
                if items.len() <= i {
                    items.resize(i + 1, elem.padding());
                }
                items[i] = convert(first, elem).or_padding(elem);
            }
            Some(Index::Append) => {
                items.extend(values.iter().map(|v| convert(v, elem).or_padding(elem)));
            }
            None => {
                *items = values.iter().map(|v| convert(v, elem).or_padding(elem)).collect();
            }
        }
    } else if ty.is_scalar() {
        obj.insert(segment.name.to_string(), convert(first, ty).or_padding(ty));
    } else {
        debug!(property = segment.name, ty = %ty, "Property cannot take a single value, skipping");
    }
}

fn descend(
    obj: &mut Map<String, Value>,
    segment: KeySegment<'_>,
    ty: &TypeDescriptor,
    rest: &[KeySegment<'_>],
    values: &[String],
) {
    match (segment.index, ty.unwrap_optional()) {
        (None, TypeDescriptor::Object(schema)) => {
            let child = ensure_object(
                obj.entry(segment.name.to_string())
                    .or_insert_with(|| Value::Object(Map::new())),
            );
            assign(child, schema, rest, values);
        }
        (Some(Index::At(i)), TypeDescriptor::Array(elem) | TypeDescriptor::List(elem)) => {
            let Some(schema) = elem.schema() else {
                debug!(property = segment.name, ty = %ty, "Elements have no properties, skipping");
                return;
            };
            let items = ensure_array(
                obj.entry(segment.name.to_string())
                    .or_insert_with(|| Value::Array(Vec::new())),
            );
            if items.len() <= i {
                items.resize(i + 1, elem.padding());
            }
            assign(ensure_object(&mut items[i]), schema, rest, values);
        }
        (None, TypeDescriptor::Map(value_ty)) => {
            let entries = ensure_object(
                obj.entry(segment.name.to_string())
                    .or_insert_with(|| Value::Object(Map::new())),
            );
            let (key, deeper) = (rest[0], &rest[1..]);
            if deeper.is_empty() {
                assign_leaf(entries, key, value_ty, values);
            } else if let Some(schema) = value_ty.schema() {
                let child = ensure_object(
                    entries
                        .entry(key.name.to_string())
                        .or_insert_with(|| Value::Object(Map::new())),
                );
                assign(child, schema, deeper, values);
            }
        }
        _ => debug!(property = segment.name, ty = %ty, "Cannot descend into property, skipping"),
    }
}
