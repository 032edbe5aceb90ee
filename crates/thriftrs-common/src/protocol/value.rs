//! Runtime Values
//!
//! [`Value`] is the in-memory form of any declared Thrift value. Struct values
//! are [`Record`]s: a descriptor plus one slot per declared field, where a
//! slot is either absent (`None`) or holds a value.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::protocol::descriptor::{FieldSpec, StructDescriptor};
use crate::protocol::error::{Result, ThriftError};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Byte(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Double(f64),
    String(String),
    Struct(Record),
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Short human readable name of the variant, used in mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Byte(_) => "byte",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Struct(_) => "struct",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
        }
    }

    /// Integer view of any integer variant.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(*v as i64),
            Value::I16(v) => Some(*v as i64),
            Value::I32(v) => Some(*v as i64),
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Struct(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            Value::Struct(r) => Some(r),
            _ => None,
        }
    }

    /// Elements of a list or set.
    pub fn as_elements(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Set(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_entries(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Byte(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::I16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Struct(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

/// An instance of a declared struct type.
///
/// Every declared field has a slot; unset slots are `None`. The slot set is
/// fixed by the descriptor, so a record can never hold an undeclared field.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    descriptor: Arc<StructDescriptor>,
    slots: BTreeMap<i16, Option<Value>>,
}

impl Record {
    /// Creates a record with every field absent.
    pub fn new(descriptor: &Arc<StructDescriptor>) -> Self {
        let slots = descriptor.fields().map(|f| (f.id, None)).collect();
        Self {
            descriptor: Arc::clone(descriptor),
            slots,
        }
    }

    pub fn descriptor(&self) -> &Arc<StructDescriptor> {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    fn spec(&self, name: &str) -> Result<&FieldSpec> {
        self.descriptor
            .field_by_name(name)
            .ok_or_else(|| ThriftError::UnknownField {
                struct_name: self.descriptor.name().to_string(),
                field: name.to_string(),
            })
    }

    /// Sets a field by name.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let id = self.spec(name)?.id;
        self.slots.insert(id, Some(value.into()));
        Ok(())
    }

    /// Builder-style [`Record::set`].
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Sets or clears a slot by field id.
    pub fn set_by_id(&mut self, id: i16, value: Option<Value>) -> Result<()> {
        match self.slots.get_mut(&id) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ThriftError::UnknownField {
                struct_name: self.descriptor.name().to_string(),
                field: id.to_string(),
            }),
        }
    }

    /// Value of a field by name. Unknown names read as absent.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let id = self.descriptor.field_by_name(name)?.id;
        self.get_by_id(id)
    }

    pub fn get_by_id(&self, id: i16) -> Option<&Value> {
        self.slots.get(&id).and_then(|slot| slot.as_ref())
    }

    /// Removes and returns a field's value, leaving the slot absent.
    pub fn take(&mut self, name: &str) -> Option<Value> {
        let id = self.descriptor.field_by_name(name)?.id;
        self.slots.get_mut(&id).and_then(Option::take)
    }

    pub fn unset(&mut self, name: &str) -> Result<()> {
        let id = self.spec(name)?.id;
        self.slots.insert(id, None);
        Ok(())
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set fields in field-id order.
    pub fn set_fields(&self) -> impl Iterator<Item = (&FieldSpec, &Value)> {
        self.descriptor
            .fields()
            .filter_map(|spec| self.get_by_id(spec.id).map(|v| (spec, v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::descriptor::FieldType;

    fn person() -> Arc<StructDescriptor> {
        StructDescriptor::builder("Person")
            .field(1, "name", FieldType::String)
            .field(2, "age", FieldType::I16)
            .build()
            .unwrap()
    }

    #[test]
    fn test_new_record_is_empty() {
        let record = Record::new(&person());
        assert_eq!(record.set_fields().count(), 0);
        assert!(!record.is_set("name"));
        assert_eq!(record.name(), "Person");
    }

    #[test]
    fn test_set_and_get() {
        let record = Record::new(&person())
            .with("age", 30i16)
            .unwrap()
            .with("name", "Alice")
            .unwrap();

        assert_eq!(record.get("name"), Some(&Value::String("Alice".into())));
        let order: Vec<_> = record.set_fields().map(|(f, _)| f.id).collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut record = Record::new(&person());
        let err = record.set("email", "a@b").unwrap_err();
        assert!(matches!(err, ThriftError::UnknownField { .. }));
        assert!(record.set_by_id(9, None).is_err());
    }

    #[test]
    fn test_take_and_unset() {
        let mut record = Record::new(&person()).with("name", "Bob").unwrap();
        assert_eq!(record.take("name"), Some(Value::from("Bob")));
        assert!(!record.is_set("name"));

        record.set("age", 5i16).unwrap();
        record.unset("age").unwrap();
        assert!(record.get("age").is_none());
    }

    #[test]
    fn test_value_views() {
        assert_eq!(Value::I16(7).as_i64(), Some(7));
        assert_eq!(Value::Byte(-1).as_i64(), Some(-1));
        assert_eq!(Value::Double(1.5).as_i64(), None);
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert_eq!(Value::Set(vec![Value::I32(1)]).as_elements().map(|e| e.len()), Some(1));
        assert_eq!(Value::Map(vec![]).kind(), "map");
    }
}
