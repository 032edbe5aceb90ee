//! Message envelopes and application exceptions.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::protocol::descriptor::{FieldType, StructDescriptor};
use crate::protocol::error::{Result, ThriftError};
use crate::protocol::value::{Record, Value};

/// Kind of a message envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Call,
    Reply,
    Exception,
    Oneway,
}

impl MessageType {
    pub fn as_i32(self) -> i32 {
        match self {
            MessageType::Call => 1,
            MessageType::Reply => 2,
            MessageType::Exception => 3,
            MessageType::Oneway => 4,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(MessageType::Call),
            2 => Some(MessageType::Reply),
            3 => Some(MessageType::Exception),
            4 => Some(MessageType::Oneway),
            _ => None,
        }
    }
}

/// The `(name, type, seqid)` triple that opens every message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub name: String,
    pub kind: MessageType,
    pub seqid: i32,
}

impl MessageHeader {
    pub fn new(name: impl Into<String>, kind: MessageType, seqid: i32) -> Self {
        Self {
            name: name.into(),
            kind,
            seqid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationExceptionKind {
    Unknown,
    UnknownMethod,
    InvalidMessageType,
    WrongMethodName,
    BadSequenceId,
    MissingResult,
    InternalError,
    ProtocolError,
}

impl ApplicationExceptionKind {
    pub fn as_i32(self) -> i32 {
        match self {
            ApplicationExceptionKind::Unknown => 0,
            ApplicationExceptionKind::UnknownMethod => 1,
            ApplicationExceptionKind::InvalidMessageType => 2,
            ApplicationExceptionKind::WrongMethodName => 3,
            ApplicationExceptionKind::BadSequenceId => 4,
            ApplicationExceptionKind::MissingResult => 5,
            ApplicationExceptionKind::InternalError => 6,
            ApplicationExceptionKind::ProtocolError => 7,
        }
    }

    /// Unrecognized codes map to `Unknown`.
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => ApplicationExceptionKind::UnknownMethod,
            2 => ApplicationExceptionKind::InvalidMessageType,
            3 => ApplicationExceptionKind::WrongMethodName,
            4 => ApplicationExceptionKind::BadSequenceId,
            5 => ApplicationExceptionKind::MissingResult,
            6 => ApplicationExceptionKind::InternalError,
            7 => ApplicationExceptionKind::ProtocolError,
            _ => ApplicationExceptionKind::Unknown,
        }
    }
}

/// Framework-level failure sent in an `Exception` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationException {
    pub message: String,
    pub kind: ApplicationExceptionKind,
}

static APPLICATION_EXCEPTION: OnceLock<Arc<StructDescriptor>> = OnceLock::new();

impl ApplicationException {
    pub fn new(kind: ApplicationExceptionKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    pub fn unknown_method(name: &str) -> Self {
        Self::new(
            ApplicationExceptionKind::UnknownMethod,
            format!("Unknown function {}", name),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ApplicationExceptionKind::InternalError, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ApplicationExceptionKind::ProtocolError, message)
    }

    pub fn bad_sequence_id(name: &str, expected: i32, found: i32) -> Self {
        Self::new(
            ApplicationExceptionKind::BadSequenceId,
            format!("{} failed: out of sequence response (expected {}, got {})", name, expected, found),
        )
    }

    /// Descriptor of the exception body: `1: string message, 2: i32 type`.
    pub fn descriptor() -> &'static Arc<StructDescriptor> {
        APPLICATION_EXCEPTION.get_or_init(|| {
            Arc::new(StructDescriptor::from_parts(
                "TApplicationException",
                [(1, "message", FieldType::String), (2, "type", FieldType::I32)],
            ))
        })
    }

    pub fn to_record(&self) -> Result<Record> {
        Record::new(Self::descriptor())
            .with("message", self.message.as_str())?
            .with("type", Value::I32(self.kind.as_i32()))
    }

    pub fn from_record(record: &Record) -> Result<Self> {
        if record.name() != Self::descriptor().name() {
            return Err(ThriftError::InvalidMessage(format!(
                "expected {}, got {}",
                Self::descriptor().name(),
                record.name()
            )));
        }
        let message = record
            .get_by_id(1)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let kind = record
            .get_by_id(2)
            .and_then(Value::as_i64)
            .map(|k| ApplicationExceptionKind::from_i32(k as i32))
            .unwrap_or(ApplicationExceptionKind::Unknown);
        Ok(Self { message, kind })
    }
}

impl fmt::Display for ApplicationException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ApplicationException {}
