//! Type Descriptors
//!
//! Descriptors declare the shape of record types: for every field id, its type,
//! its name and whether it is required. They are built once through
//! [`StructDescriptor::builder`] and shared read-only as `Arc<StructDescriptor>`.
//!
//! # Example
//!
//! ```
//! use thriftrs_common::protocol::{FieldType, StructDescriptor};
//!
//! let item = StructDescriptor::builder("Item")
//!     .field(1, "id", FieldType::I32)
//!     .field(2, "phones", FieldType::list(FieldType::String))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(item.field(1).unwrap().name, "id");
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::protocol::error::{Result, ThriftError};

/// The closed set of Thrift type tags.
///
/// `id()` returns the numeric tag used on the wire by Thrift implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Bool,
    Byte,
    I16,
    I32,
    I64,
    Double,
    String,
    Struct,
    List,
    Set,
    Map,
}

impl TypeTag {
    pub fn id(self) -> u8 {
        match self {
            TypeTag::Bool => 2,
            TypeTag::Byte => 3,
            TypeTag::Double => 4,
            TypeTag::I16 => 6,
            TypeTag::I32 => 8,
            TypeTag::I64 => 10,
            TypeTag::String => 11,
            TypeTag::Struct => 12,
            TypeTag::Map => 13,
            TypeTag::Set => 14,
            TypeTag::List => 15,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Bool => "BOOL",
            TypeTag::Byte => "BYTE",
            TypeTag::I16 => "I16",
            TypeTag::I32 => "I32",
            TypeTag::I64 => "I64",
            TypeTag::Double => "DOUBLE",
            TypeTag::String => "STRING",
            TypeTag::Struct => "STRUCT",
            TypeTag::List => "LIST",
            TypeTag::Set => "SET",
            TypeTag::Map => "MAP",
        }
    }

    /// Complex tags cannot be used as map keys in a tree-of-objects model.
    pub fn is_complex(self) -> bool {
        matches!(self, TypeTag::Struct | TypeTag::List | TypeTag::Set | TypeTag::Map)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A declared field type: the type tag together with its nested descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Bool,
    Byte,
    I16,
    I32,
    I64,
    Double,
    String,
    Struct(Arc<StructDescriptor>),
    List(Box<FieldType>),
    Set(Box<FieldType>),
    Map(Box<FieldType>, Box<FieldType>),
}

impl FieldType {
    pub fn tag(&self) -> TypeTag {
        match self {
            FieldType::Bool => TypeTag::Bool,
            FieldType::Byte => TypeTag::Byte,
            FieldType::I16 => TypeTag::I16,
            FieldType::I32 => TypeTag::I32,
            FieldType::I64 => TypeTag::I64,
            FieldType::Double => TypeTag::Double,
            FieldType::String => TypeTag::String,
            FieldType::Struct(_) => TypeTag::Struct,
            FieldType::List(_) => TypeTag::List,
            FieldType::Set(_) => TypeTag::Set,
            FieldType::Map(_, _) => TypeTag::Map,
        }
    }

    pub fn list(elem: FieldType) -> Self {
        FieldType::List(Box::new(elem))
    }

    pub fn set(elem: FieldType) -> Self {
        FieldType::Set(Box::new(elem))
    }

    pub fn map(key: FieldType, value: FieldType) -> Self {
        FieldType::Map(Box::new(key), Box::new(value))
    }

    pub fn structure(descriptor: &Arc<StructDescriptor>) -> Self {
        FieldType::Struct(Arc::clone(descriptor))
    }

    /// The nested struct descriptor, if this is a struct type.
    pub fn as_struct(&self) -> Option<&Arc<StructDescriptor>> {
        match self {
            FieldType::Struct(descriptor) => Some(descriptor),
            _ => None,
        }
    }
}

/// One field of a struct descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub id: i16,
    pub name: String,
    pub ty: FieldType,
    pub required: bool,
}

/// Declarative shape of a record type, keyed by field id.
///
/// Fields are kept ordered by id so every traversal (and therefore every
/// encoded output) is deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDescriptor {
    name: String,
    fields: BTreeMap<i16, FieldSpec>,
}

impl StructDescriptor {
    pub fn builder(name: impl Into<String>) -> StructDescriptorBuilder {
        StructDescriptorBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Builds a descriptor from fields already known to be unique.
    pub(crate) fn from_parts<const N: usize>(name: &str, fields: [(i16, &str, FieldType); N]) -> Self {
        let fields = fields
            .into_iter()
            .map(|(id, field, ty)| {
                (
                    id,
                    FieldSpec {
                        id,
                        name: field.to_string(),
                        ty,
                        required: false,
                    },
                )
            })
            .collect();
        Self {
            name: name.to_string(),
            fields,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Iterates the fields in field-id order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values()
    }

    pub fn field(&self, id: i16) -> Option<&FieldSpec> {
        self.fields.get(&id)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.values().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Builder for [`StructDescriptor`].
///
/// `build()` enforces that field ids and field names are unique.
pub struct StructDescriptorBuilder {
    name: String,
    fields: Vec<FieldSpec>,
}

impl StructDescriptorBuilder {
    /// Adds an optional field.
    pub fn field(mut self, id: i16, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldSpec {
            id,
            name: name.into(),
            ty,
            required: false,
        });
        self
    }

    /// Adds a required field.
    pub fn required(mut self, id: i16, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldSpec {
            id,
            name: name.into(),
            ty,
            required: true,
        });
        self
    }

    pub fn build(self) -> Result<Arc<StructDescriptor>> {
        let mut fields = BTreeMap::new();
        let mut names = HashSet::new();

        for spec in self.fields {
            if !names.insert(spec.name.clone()) {
                return Err(ThriftError::InvalidDescriptor(format!(
                    "duplicate field name '{}' in {}",
                    spec.name, self.name
                )));
            }
            if fields.contains_key(&spec.id) {
                return Err(ThriftError::DuplicateFieldId {
                    struct_name: self.name,
                    id: spec.id,
                });
            }
            fields.insert(spec.id, spec);
        }

        Ok(Arc::new(StructDescriptor {
            name: self.name,
            fields,
        }))
    }
}

/// Field id of the `success` slot on every result struct.
pub const SUCCESS_FIELD_ID: i16 = 0;
/// Name of the `success` slot on every result struct.
pub const SUCCESS_FIELD: &str = "success";

/// One RPC method: its argument struct and its result struct.
///
/// The result struct carries field 0 `success` for non-void methods and one
/// struct-typed field per declared exception.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    name: String,
    args: Arc<StructDescriptor>,
    result: Arc<StructDescriptor>,
    oneway: bool,
}

impl MethodDescriptor {
    pub fn builder(name: impl Into<String>) -> MethodBuilder {
        let name = name.into();
        MethodBuilder {
            args: StructDescriptor::builder(format!("{}_args", name)),
            name,
            returns: None,
            throws: Vec::new(),
            oneway: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &Arc<StructDescriptor> {
        &self.args
    }

    pub fn result(&self) -> &Arc<StructDescriptor> {
        &self.result
    }

    pub fn is_oneway(&self) -> bool {
        self.oneway
    }

    pub fn returns_value(&self) -> bool {
        self.result.field(SUCCESS_FIELD_ID).is_some()
    }

    /// Declared exception fields of the result struct, in field-id order.
    pub fn exception_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.result
            .fields()
            .filter(|f| f.id != SUCCESS_FIELD_ID && f.ty.as_struct().is_some())
    }

    /// Name of the result field declared for an exception struct named `exception`.
    pub fn exception_field_for(&self, exception: &str) -> Option<&str> {
        self.exception_fields()
            .find(|f| f.ty.as_struct().map(|d| d.name()) == Some(exception))
            .map(|f| f.name.as_str())
    }
}

pub struct MethodBuilder {
    name: String,
    args: StructDescriptorBuilder,
    returns: Option<FieldType>,
    throws: Vec<(i16, String, Arc<StructDescriptor>)>,
    oneway: bool,
}

impl MethodBuilder {
    pub fn arg(mut self, id: i16, name: impl Into<String>, ty: FieldType) -> Self {
        self.args = self.args.field(id, name, ty);
        self
    }

    pub fn required_arg(mut self, id: i16, name: impl Into<String>, ty: FieldType) -> Self {
        self.args = self.args.required(id, name, ty);
        self
    }

    pub fn returns(mut self, ty: FieldType) -> Self {
        self.returns = Some(ty);
        self
    }

    pub fn throws(mut self, id: i16, name: impl Into<String>, exception: &Arc<StructDescriptor>) -> Self {
        self.throws.push((id, name.into(), Arc::clone(exception)));
        self
    }

    pub fn oneway(mut self) -> Self {
        self.oneway = true;
        self
    }

    pub fn build(self) -> Result<MethodDescriptor> {
        if self.oneway && (self.returns.is_some() || !self.throws.is_empty()) {
            return Err(ThriftError::InvalidDescriptor(format!(
                "oneway method '{}' cannot return a value or throw",
                self.name
            )));
        }

        let mut result = StructDescriptor::builder(format!("{}_result", self.name));
        if let Some(ty) = self.returns {
            result = result.field(SUCCESS_FIELD_ID, SUCCESS_FIELD, ty);
        }
        for (id, name, exception) in self.throws {
            if id == SUCCESS_FIELD_ID {
                return Err(ThriftError::InvalidDescriptor(format!(
                    "exception '{}' of '{}' uses reserved field id 0",
                    name, self.name
                )));
            }
            result = result.field(id, name, FieldType::Struct(exception));
        }

        Ok(MethodDescriptor {
            args: self.args.build()?,
            result: result.build()?,
            name: self.name,
            oneway: self.oneway,
        })
    }
}

/// A named set of methods.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescriptor {
    name: String,
    methods: BTreeMap<String, Arc<MethodDescriptor>>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: BTreeMap::new(),
        }
    }

    /// Adds a method; a later method with the same name replaces the earlier one.
    pub fn with_method(mut self, method: MethodDescriptor) -> Self {
        self.methods.insert(method.name.clone(), Arc::new(method));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self, name: &str) -> Option<&Arc<MethodDescriptor>> {
        self.methods.get(name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &Arc<MethodDescriptor>> {
        self.methods.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Arc<StructDescriptor> {
        StructDescriptor::builder("Person")
            .required(1, "name", FieldType::String)
            .field(2, "age", FieldType::I16)
            .build()
            .unwrap()
    }

    #[test]
    fn test_fields_iterate_in_id_order() {
        let desc = StructDescriptor::builder("Out")
            .field(3, "c", FieldType::Bool)
            .field(1, "a", FieldType::I32)
            .field(2, "b", FieldType::String)
            .build()
            .unwrap();

        let names: Vec<_> = desc.fields().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_duplicate_field_id_rejected() {
        let err = StructDescriptor::builder("Dup")
            .field(1, "a", FieldType::I32)
            .field(1, "b", FieldType::I32)
            .build()
            .unwrap_err();

        assert!(matches!(err, ThriftError::DuplicateFieldId { id: 1, .. }));
    }

    #[test]
    fn test_duplicate_field_name_rejected() {
        let err = StructDescriptor::builder("Dup")
            .field(1, "a", FieldType::I32)
            .field(2, "a", FieldType::I64)
            .build()
            .unwrap_err();

        assert!(matches!(err, ThriftError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_type_tag_ids() {
        assert_eq!(TypeTag::Bool.id(), 2);
        assert_eq!(TypeTag::String.id(), 11);
        assert_eq!(TypeTag::List.id(), 15);
        assert_eq!(FieldType::map(FieldType::String, FieldType::I32).tag(), TypeTag::Map);
        assert!(TypeTag::Set.is_complex());
        assert!(!TypeTag::Double.is_complex());
    }

    #[test]
    fn test_method_result_struct() {
        let not_found = StructDescriptor::builder("PersonNotExistsError")
            .field(1, "message", FieldType::String)
            .build()
            .unwrap();

        let method = MethodDescriptor::builder("get")
            .arg(1, "name", FieldType::String)
            .returns(FieldType::structure(&person()))
            .throws(1, "not_exists", &not_found)
            .build()
            .unwrap();

        assert_eq!(method.args().name(), "get_args");
        assert_eq!(method.result().name(), "get_result");
        assert!(method.returns_value());
        assert_eq!(method.exception_field_for("PersonNotExistsError"), Some("not_exists"));
        assert_eq!(method.exception_field_for("Other"), None);
    }

    #[test]
    fn test_oneway_method_cannot_return() {
        let err = MethodDescriptor::builder("log")
            .returns(FieldType::Bool)
            .oneway()
            .build()
            .unwrap_err();

        assert!(matches!(err, ThriftError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_service_lookup() {
        let service = ServiceDescriptor::new("AddressBook")
            .with_method(MethodDescriptor::builder("ping").returns(FieldType::Bool).build().unwrap());

        assert!(service.method("ping").is_some());
        assert!(service.method("pong").is_none());
        assert_eq!(service.methods().count(), 1);
    }
}
