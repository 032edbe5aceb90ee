//! Address book demo service
//!
//! A small in-memory service used by `thriftrs serve` and `thriftrs call`:
//!
//! ```text
//! struct PhoneNumber { 1: i32 type, 2: string number }
//! struct Person { 1: string name, 2: list<PhoneNumber> phones, 3: i64 created_at }
//! exception PersonNotExistsError { 1: string message }
//!
//! service AddressBookService {
//!     bool ping()
//!     string hello(1: string name)
//!     bool add(1: Person person)
//!     bool remove(1: string name)
//!     Person get(1: string name) throws (1: PersonNotExistsError not_exists)
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use anyhow::{anyhow, Result};
use serde_json::Value as Json;
use thriftrs_client::TrackedClient;
use thriftrs_common::protocol::{
    Converter, DeclaredException, FieldType, MethodDescriptor, Record, ServiceDescriptor,
    StructDescriptor, Value, SUCCESS_FIELD_ID,
};
use thriftrs_common::transport::Protocol;
use thriftrs_common::{Result as ThriftResult, ThriftError};
use thriftrs_server::Handler;
use tracing::info;

/// Struct and service descriptors of the address book.
pub struct Schema {
    pub phone_number: Arc<StructDescriptor>,
    pub person: Arc<StructDescriptor>,
    pub person_not_exists: Arc<StructDescriptor>,
    pub service: Arc<ServiceDescriptor>,
}

impl Schema {
    fn build() -> ThriftResult<Self> {
        let phone_number = StructDescriptor::builder("PhoneNumber")
            .field(1, "type", FieldType::I32)
            .field(2, "number", FieldType::String)
            .build()?;
        let person = StructDescriptor::builder("Person")
            .field(1, "name", FieldType::String)
            .field(2, "phones", FieldType::list(FieldType::structure(&phone_number)))
            .field(3, "created_at", FieldType::I64)
            .build()?;
        let person_not_exists = StructDescriptor::builder("PersonNotExistsError")
            .field(1, "message", FieldType::String)
            .build()?;

        let service = ServiceDescriptor::new("AddressBookService")
            .with_method(MethodDescriptor::builder("ping").returns(FieldType::Bool).build()?)
            .with_method(
                MethodDescriptor::builder("hello")
                    .arg(1, "name", FieldType::String)
                    .returns(FieldType::String)
                    .build()?,
            )
            .with_method(
                MethodDescriptor::builder("add")
                    .arg(1, "person", FieldType::structure(&person))
                    .returns(FieldType::Bool)
                    .build()?,
            )
            .with_method(
                MethodDescriptor::builder("remove")
                    .arg(1, "name", FieldType::String)
                    .returns(FieldType::Bool)
                    .build()?,
            )
            .with_method(
                MethodDescriptor::builder("get")
                    .arg(1, "name", FieldType::String)
                    .returns(FieldType::structure(&person))
                    .throws(1, "not_exists", &person_not_exists)
                    .build()?,
            );

        Ok(Self {
            phone_number,
            person,
            person_not_exists,
            service: Arc::new(service),
        })
    }
}

/// The address book schema, built once per process.
pub fn schema() -> ThriftResult<&'static Schema> {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    if let Some(schema) = SCHEMA.get() {
        return Ok(schema);
    }
    let schema = Schema::build()?;
    Ok(SCHEMA.get_or_init(|| schema))
}

/// In-memory address book keyed by person name.
#[derive(Debug, Default)]
pub struct AddressBook {
    people: RwLock<HashMap<String, Record>>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.people.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn name_arg(args: &Record) -> String {
        args.get("name").and_then(Value::as_str).unwrap_or_default().to_string()
    }

    fn not_exists(name: &str) -> ThriftResult<ThriftError> {
        let exception = Record::new(&schema()?.person_not_exists)
            .with("message", format!("{} does not exist", name))?;
        Ok(DeclaredException {
            field: "not_exists".into(),
            exception,
        }
        .into())
    }
}

impl Handler for AddressBook {
    async fn handle(&self, method: &str, mut args: Record) -> ThriftResult<Option<Value>> {
        match method {
            "ping" => Ok(Some(Value::Bool(true))),
            "hello" => Ok(Some(Value::from(format!("hello {}", Self::name_arg(&args))))),
            "add" => {
                let person = args
                    .take("person")
                    .and_then(Value::into_record)
                    .ok_or_else(|| ThriftError::InvalidMessage("add requires a person".into()))?;
                let name = person.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                info!(name = %name, "adding person");
                self.people
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(name, person);
                Ok(Some(Value::Bool(true)))
            }
            "remove" => {
                let name = Self::name_arg(&args);
                let removed = self
                    .people
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&name)
                    .is_some();
                Ok(Some(Value::Bool(removed)))
            }
            "get" => {
                let name = Self::name_arg(&args);
                let person = self
                    .people
                    .read()
                    .unwrap_or_else(|e| e.into_inner())
                    .get(&name)
                    .cloned();
                match person {
                    Some(person) => Ok(Some(Value::Struct(person))),
                    None => Err(Self::not_exists(&name)?),
                }
            }
            other => Err(ThriftError::UnknownMethod(other.to_string())),
        }
    }
}

/// Calls `method` with arguments given as a JSON object and returns the
/// result as JSON (`null` for void results).
///
/// A declared exception is rendered as an error carrying the exception's
/// JSON form.
pub async fn call_json<P: Protocol>(
    client: &mut TrackedClient<P>,
    method: &str,
    args: &Json,
) -> Result<Json> {
    let descriptor = client
        .service()
        .method(method)
        .cloned()
        .ok_or_else(|| anyhow!("unknown method '{}'", method))?;

    let args = Converter::decode_struct(args, descriptor.args())
        .map_err(|e| anyhow!("invalid arguments for {}: {}", method, e))?;

    match client.call(method, args).await {
        Ok(Some(value)) => {
            let ty = descriptor
                .result()
                .field(SUCCESS_FIELD_ID)
                .map(|spec| spec.ty.clone())
                .ok_or_else(|| anyhow!("{} has no result type", method))?;
            Ok(Converter::encode(&value, &ty)?)
        }
        Ok(None) => Ok(Json::Null),
        Err(ThriftError::UserException(declared)) => {
            let exception = Converter::encode_struct(&declared.exception)?;
            Err(anyhow!("{} raised {}: {}", method, declared.exception.name(), exception))
        }
        Err(e) => Err(e.into()),
    }
}
