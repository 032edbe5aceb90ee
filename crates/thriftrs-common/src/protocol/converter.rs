//! Structural Converter
//!
//! Maps [`Value`]s to and from `serde_json::Value` trees, driven entirely by the
//! declared [`FieldType`]. The converter is wire-format agnostic: both the
//! framed and the HTTP protocol hand it whole struct payloads.
//!
//! Encoding is sparse: absent fields are omitted, never written as `null`.
//! Decoding treats `null` and missing keys alike as absent.

use std::sync::Arc;

use serde_json::{Map, Number, Value as Json};

use crate::protocol::descriptor::{FieldType, StructDescriptor, TypeTag};
use crate::protocol::error::{FieldDecodeError, Result, ThriftError};
use crate::protocol::value::{Record, Value};

/// Descriptor-driven converter between records and JSON trees.
pub struct Converter;

impl Converter {
    /// Encodes one value of the declared type.
    pub fn encode(value: &Value, ty: &FieldType) -> Result<Json> {
        match ty {
            FieldType::Bool => match value {
                Value::Bool(b) => Ok(Json::Bool(*b)),
                other => match other.as_i64() {
                    Some(n) => Ok(Json::Bool(n != 0)),
                    None => Err(mismatch(TypeTag::Bool, other.kind())),
                },
            },
            FieldType::Byte => encode_int(value, TypeTag::Byte, i8::MIN as i64, i8::MAX as i64),
            FieldType::I16 => encode_int(value, TypeTag::I16, i16::MIN as i64, i16::MAX as i64),
            FieldType::I32 => encode_int(value, TypeTag::I32, i32::MIN as i64, i32::MAX as i64),
            FieldType::I64 => encode_int(value, TypeTag::I64, i64::MIN, i64::MAX),
            FieldType::Double => {
                let d = match value {
                    Value::Double(d) => *d,
                    other => other
                        .as_i64()
                        .map(|n| n as f64)
                        .ok_or_else(|| mismatch(TypeTag::Double, other.kind()))?,
                };
                Number::from_f64(d)
                    .map(Json::Number)
                    .ok_or_else(|| mismatch(TypeTag::Double, d.to_string()))
            }
            FieldType::String => match value {
                Value::String(s) => Ok(Json::String(s.clone())),
                other => Err(mismatch(TypeTag::String, other.kind())),
            },
            FieldType::Struct(descriptor) => match value {
                Value::Struct(record) if record.name() == descriptor.name() => {
                    Self::encode_struct(record)
                }
                Value::Struct(record) => Err(mismatch(
                    TypeTag::Struct,
                    format!("struct {} (declared {})", record.name(), descriptor.name()),
                )),
                other => Err(mismatch(TypeTag::Struct, other.kind())),
            },
            FieldType::List(elem) | FieldType::Set(elem) => match value.as_elements() {
                Some(items) => items
                    .iter()
                    .map(|item| Self::encode(item, elem))
                    .collect::<Result<Vec<_>>>()
                    .map(Json::Array),
                None => Err(mismatch(ty.tag(), value.kind())),
            },
            FieldType::Map(key_ty, value_ty) => {
                // The key restriction holds regardless of the map's contents.
                if key_ty.tag().is_complex() {
                    return Err(ThriftError::UnsupportedKeyType(key_ty.tag()));
                }
                let entries = value
                    .as_entries()
                    .ok_or_else(|| mismatch(TypeTag::Map, value.kind()))?;

                let mut object = Map::with_capacity(entries.len());
                for (k, v) in entries {
                    let key = key_string(Self::encode(k, key_ty)?);
                    object.insert(key, Self::encode(v, value_ty)?);
                }
                Ok(Json::Object(object))
            }
        }
    }

    /// Encodes a record as a sparse JSON object in field-id order.
    pub fn encode_struct(record: &Record) -> Result<Json> {
        let descriptor = record.descriptor();
        let mut object = Map::new();

        for spec in descriptor.fields() {
            match record.get_by_id(spec.id) {
                Some(value) => {
                    object.insert(spec.name.clone(), Self::encode(value, &spec.ty)?);
                }
                None if spec.required => {
                    return Err(ThriftError::MissingRequiredField {
                        struct_name: descriptor.name().to_string(),
                        field_name: spec.name.clone(),
                    });
                }
                None => {}
            }
        }

        Ok(Json::Object(object))
    }

    /// Decodes one node as the declared type.
    ///
    /// `null` is not a value of any type; struct decoding handles it as an
    /// absent field before reaching here.
    pub fn decode(node: &Json, ty: &FieldType) -> Result<Value> {
        match ty {
            FieldType::Bool => match node {
                Json::Bool(b) => Ok(Value::Bool(*b)),
                Json::String(s) if s == "true" => Ok(Value::Bool(true)),
                Json::String(s) if s == "false" => Ok(Value::Bool(false)),
                other => Err(mismatch(TypeTag::Bool, describe(other))),
            },
            FieldType::Byte => {
                decode_int(node, TypeTag::Byte, i8::MIN as i64, i8::MAX as i64).map(|n| Value::Byte(n as i8))
            }
            FieldType::I16 => {
                decode_int(node, TypeTag::I16, i16::MIN as i64, i16::MAX as i64).map(|n| Value::I16(n as i16))
            }
            FieldType::I32 => {
                decode_int(node, TypeTag::I32, i32::MIN as i64, i32::MAX as i64).map(|n| Value::I32(n as i32))
            }
            FieldType::I64 => decode_int(node, TypeTag::I64, i64::MIN, i64::MAX).map(Value::I64),
            FieldType::Double => {
                let d = match node {
                    Json::Number(n) => n.as_f64(),
                    Json::String(s) => s.trim().parse::<f64>().ok().filter(|d| d.is_finite()),
                    _ => None,
                };
                d.map(Value::Double)
                    .ok_or_else(|| mismatch(TypeTag::Double, describe(node)))
            }
            FieldType::String => match node {
                Json::String(s) => Ok(Value::String(s.clone())),
                other => Err(mismatch(TypeTag::String, describe(other))),
            },
            FieldType::Struct(descriptor) => Self::decode_struct(node, descriptor).map(Value::Struct),
            FieldType::List(elem) => decode_elements(node, elem, TypeTag::List).map(Value::List),
            FieldType::Set(elem) => decode_elements(node, elem, TypeTag::Set).map(Value::Set),
            FieldType::Map(key_ty, value_ty) => {
                if key_ty.tag().is_complex() {
                    return Err(ThriftError::UnsupportedKeyType(key_ty.tag()));
                }
                match node {
                    Json::Object(object) => object
                        .iter()
                        .map(|(k, v)| {
                            let key = Self::decode(&Json::String(k.clone()), key_ty)?;
                            Ok((key, Self::decode(v, value_ty)?))
                        })
                        .collect::<Result<Vec<_>>>()
                        .map(Value::Map),
                    // Older peers send maps as a list of {"key", "value"} pairs.
                    Json::Array(pairs) => pairs
                        .iter()
                        .map(|pair| {
                            let (k, v) = match (pair.get("key"), pair.get("value")) {
                                (Some(k), Some(v)) => (k, v),
                                _ => return Err(mismatch(TypeTag::Map, describe(pair))),
                            };
                            Ok((Self::decode(k, key_ty)?, Self::decode(v, value_ty)?))
                        })
                        .collect::<Result<Vec<_>>>()
                        .map(Value::Map),
                    other => Err(mismatch(TypeTag::Map, describe(other))),
                }
            }
        }
    }

    /// Decodes a JSON object into a fresh all-absent record of `descriptor`.
    pub fn decode_struct(node: &Json, descriptor: &Arc<StructDescriptor>) -> Result<Record> {
        Self::decode_struct_into(node, Record::new(descriptor))
    }

    /// Decodes a JSON object on top of `record`, assigning every present field.
    ///
    /// Unknown keys are ignored. Fields missing from `node` keep the value
    /// `record` already holds.
    pub fn decode_struct_into(node: &Json, mut record: Record) -> Result<Record> {
        let object = match node {
            Json::Object(object) => object,
            other => return Err(mismatch(TypeTag::Struct, describe(other))),
        };
        let descriptor = Arc::clone(record.descriptor());

        for spec in descriptor.fields() {
            let raw = match object.get(&spec.name) {
                Some(Json::Null) | None => {
                    if spec.required && record.get_by_id(spec.id).is_none() {
                        return Err(ThriftError::MissingRequiredField {
                            struct_name: descriptor.name().to_string(),
                            field_name: spec.name.clone(),
                        });
                    }
                    continue;
                }
                Some(raw) => raw,
            };

            let value = match Self::decode(raw, &spec.ty) {
                Ok(value) => value,
                Err(
                    err @ (ThriftError::FieldDecode(_)
                    | ThriftError::MissingRequiredField { .. }
                    | ThriftError::UnsupportedKeyType(_)),
                ) => return Err(err),
                Err(err) => {
                    return Err(FieldDecodeError {
                        struct_name: descriptor.name().to_string(),
                        field_id: spec.id,
                        field_name: spec.name.clone(),
                        raw: raw.clone(),
                        expected: spec.ty.tag(),
                        reason: err.to_string(),
                    }
                    .into())
                }
            };
            record.set_by_id(spec.id, Some(value))?;
        }

        Ok(record)
    }
}

fn mismatch(expected: TypeTag, found: impl Into<String>) -> ThriftError {
    ThriftError::ValueTypeMismatch {
        expected,
        found: found.into(),
    }
}

fn describe(node: &Json) -> String {
    match node {
        Json::Null => "null".to_string(),
        Json::Bool(b) => format!("bool {}", b),
        Json::Number(n) => format!("number {}", n),
        Json::String(s) => format!("string {:?}", s),
        Json::Array(_) => "array".to_string(),
        Json::Object(_) => "object".to_string(),
    }
}

fn encode_int(value: &Value, tag: TypeTag, min: i64, max: i64) -> Result<Json> {
    let n = value.as_i64().ok_or_else(|| mismatch(tag, value.kind()))?;
    if n < min || n > max {
        return Err(mismatch(tag, format!("{} out of range", n)));
    }
    Ok(Json::from(n))
}

fn decode_int(node: &Json, tag: TypeTag, min: i64, max: i64) -> Result<i64> {
    let n = match node {
        Json::Number(number) => match number.as_i64() {
            Some(n) => Some(n),
            None if number.is_u64() => None,
            None => number
                .as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .filter(|f| *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .map(|f| f as i64),
        },
        Json::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    match n {
        Some(n) if n >= min && n <= max => Ok(n),
        Some(n) => Err(mismatch(tag, format!("{} out of range", n))),
        None => Err(mismatch(tag, describe(node))),
    }
}

fn decode_elements(node: &Json, elem: &FieldType, tag: TypeTag) -> Result<Vec<Value>> {
    match node {
        Json::Array(items) => items.iter().map(|item| Converter::decode(item, elem)).collect(),
        other => Err(mismatch(tag, describe(other))),
    }
}

/// String form of an encoded scalar, used as a JSON object key.
fn key_string(node: Json) -> String {
    match node {
        Json::String(s) => s,
        other => other.to_string(),
    }
}
