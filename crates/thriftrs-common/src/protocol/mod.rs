pub mod converter;
pub mod descriptor;
pub mod error;
pub mod message;
pub mod value;


pub use converter::Converter;
pub use descriptor::{
    FieldSpec, FieldType, MethodBuilder, MethodDescriptor, ServiceDescriptor, StructDescriptor,
    StructDescriptorBuilder, TypeTag, SUCCESS_FIELD, SUCCESS_FIELD_ID,
};
pub use error::{DeclaredException, FieldDecodeError, Result, ThriftError};
pub use message::{ApplicationException, ApplicationExceptionKind, MessageHeader, MessageType};
pub use value::{Record, Value};
