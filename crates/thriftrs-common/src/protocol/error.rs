use std::fmt;

use thiserror::Error;

use crate::protocol::descriptor::TypeTag;
use crate::protocol::message::ApplicationException;
use crate::protocol::value::Record;

/// A field whose raw tree representation could not be coerced to its declared type.
///
/// Carries the owning struct, the field id and name, the raw node and the
/// expected type tag, so a caller never has to guess which part of a nested
/// payload was malformed.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecodeError {
    pub struct_name: String,
    pub field_id: i16,
    pub field_name: String,
    pub raw: serde_json::Value,
    pub expected: TypeTag,
    pub reason: String,
}

impl fmt::Display for FieldDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to decode {}.{} (id {}) as {}: {} (raw value {})",
            self.struct_name, self.field_name, self.field_id, self.expected, self.reason, self.raw
        )
    }
}

/// A declared exception returned by the remote side.
///
/// `field` is the name of the exception field on the method's result struct,
/// `exception` the populated exception record.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredException {
    pub field: String,
    pub exception: Record,
}

#[derive(Error, Debug)]
pub enum ThriftError {
    #[error("{0} in map key, not supported")]
    UnsupportedKeyType(TypeTag),

    #[error("{0}")]
    FieldDecode(Box<FieldDecodeError>),

    #[error("Expected {expected} value, found {found}")]
    ValueTypeMismatch { expected: TypeTag, found: String },

    #[error("Required field {struct_name}.{field_name} is not set")]
    MissingRequiredField { struct_name: String, field_name: String },

    #[error("Unknown field '{field}' on {struct_name}")]
    UnknownField { struct_name: String, field: String },

    #[error("Duplicate field id {id} in {struct_name}")]
    DuplicateFieldId { struct_name: String, id: i16 },

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Bad version: expected {expected}, found {found}")]
    BadVersion { expected: String, found: String },

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Undefined exception {class}({message:?}) received")]
    UndefinedRemoteException { class: String, message: String },

    #[error("Application exception: {0}")]
    Application(ApplicationException),

    #[error("Declared exception '{}' raised: {}", .0.field, .0.exception.name())]
    UserException(Box<DeclaredException>),

    #[error("Protocol state error: {0}")]
    ProtocolState(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Message too large: {size} bytes (max {max} bytes)")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("{0} failed: unknown result")]
    MissingResult(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

impl From<FieldDecodeError> for ThriftError {
    fn from(err: FieldDecodeError) -> Self {
        ThriftError::FieldDecode(Box::new(err))
    }
}

impl From<ApplicationException> for ThriftError {
    fn from(err: ApplicationException) -> Self {
        ThriftError::Application(err)
    }
}

impl From<DeclaredException> for ThriftError {
    fn from(err: DeclaredException) -> Self {
        ThriftError::UserException(Box::new(err))
    }
}

impl ThriftError {
    /// Returns true for errors that come from a malformed value rather than
    /// from the transport or the protocol framing.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            ThriftError::FieldDecode(_)
                | ThriftError::ValueTypeMismatch { .. }
                | ThriftError::MissingRequiredField { .. }
                | ThriftError::UnsupportedKeyType(_)
        )
    }

    /// Returns the declared exception if this error carries one.
    pub fn declared(&self) -> Option<&DeclaredException> {
        match self {
            ThriftError::UserException(exc) => Some(exc),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ThriftError>;
