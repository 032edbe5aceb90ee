//! Message dispatch
//!
//! A [`Processor`] reads one call off a protocol, runs the matching
//! [`Handler`] method and writes the reply.

use std::future::Future;
use std::sync::Arc;

use thriftrs_common::protocol::error::{Result, ThriftError};
use thriftrs_common::protocol::{
    ApplicationException, DeclaredException, MessageType, MethodDescriptor, Record,
    ServiceDescriptor, Value, SUCCESS_FIELD,
};
use thriftrs_common::transport::Protocol;
use thriftrs_trace::{TraceHeader, Tracker};
use tracing::{debug, error, warn};

/// Service implementation invoked by the [`Processor`].
///
/// `method` is one of the service's method names and `args` a record of its
/// argument struct. A declared exception is raised by returning
/// [`ThriftError::UserException`] naming the exception field; any other
/// error is reported to the caller as an internal application exception.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, method: &str, args: Record) -> impl Future<Output = Result<Option<Value>>> + Send;
}

/// Dispatches calls of one service to a [`Handler`].
///
/// With a tracker configured, calls carrying `soa` metadata are handled
/// inside their trace chain, so outbound tracked calls made by the handler
/// continue that chain. The reply then carries the chain's `soa` with the
/// highest `seq` handed out while handling.
pub struct Processor<H> {
    service: Arc<ServiceDescriptor>,
    handler: Arc<H>,
    tracker: Option<Arc<Tracker>>,
}

impl<H: Handler> Processor<H> {
    pub fn new(service: Arc<ServiceDescriptor>, handler: Arc<H>) -> Self {
        Self {
            service,
            handler,
            tracker: None,
        }
    }

    pub fn with_tracker(mut self, tracker: Arc<Tracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn service(&self) -> &Arc<ServiceDescriptor> {
        &self.service
    }

    /// Processes one message from `proto`.
    ///
    /// # Errors
    ///
    /// Transport and framing errors are returned; the connection is not
    /// usable afterwards. Handler failures, unknown methods and malformed
    /// arguments are answered with an EXCEPTION message instead.
    pub async fn process<P: Protocol>(&self, proto: &mut P) -> Result<()> {
        let header = proto.read_message_begin().await?;
        let name = header.name;
        let seqid = header.seqid;

        let Some(method) = self.service.method(&name).cloned() else {
            proto.read_message_end()?;
            warn!(method = %name, service = self.service.name(), "unknown method");
            let exc = ApplicationException::unknown_method(&name);
            return write_exception(proto, &name, seqid, exc).await;
        };

        let args = match proto.read_struct(method.args()).await {
            Ok(args) => args,
            Err(e) if e.is_decode_error() => {
                proto.read_message_end()?;
                warn!(method = %name, error = %e, "malformed arguments");
                if method.is_oneway() {
                    return Ok(());
                }
                return write_exception(proto, &name, seqid, ApplicationException::protocol(e.to_string())).await;
            }
            Err(e) => return Err(e),
        };
        proto.read_message_end()?;

        let trace = self
            .tracker
            .as_ref()
            .zip(proto.metadata("soa").and_then(TraceHeader::from_soa));

        debug!(method = %name, seqid, "dispatching call");
        let (outcome, chain) = match trace {
            Some((tracker, mut trace)) => {
                trace.api = name.clone();
                let (outcome, chain) = tracker
                    .handle_scoped(trace, self.handler.handle(&name, args))
                    .await;
                (outcome, Some(chain))
            }
            None => (self.handler.handle(&name, args).await, None),
        };

        if method.is_oneway() {
            if let Err(e) = outcome {
                error!(method = %name, error = %e, "oneway handler failed");
            }
            return Ok(());
        }

        // Lets the caller continue the chain after the seqs used below it.
        if let Some(chain) = chain {
            proto.write_metadata("soa", chain.soa());
        }

        match build_result(&method, outcome) {
            Ok(result) => {
                proto.write_message_begin(&name, MessageType::Reply, seqid)?;
                proto.write_struct(&result).await?;
                proto.write_message_end().await
            }
            Err(e) => {
                error!(method = %name, error = %e, "handler failed");
                write_exception(proto, &name, seqid, ApplicationException::internal(e.to_string())).await
            }
        }
    }
}

/// Fills the method's result struct from a handler outcome.
///
/// Declared exceptions land in their exception field; anything else that
/// cannot be represented in the result struct is returned as an error.
fn build_result(method: &MethodDescriptor, outcome: Result<Option<Value>>) -> Result<Record> {
    let mut result = Record::new(method.result());
    match outcome {
        Ok(Some(value)) if method.returns_value() => result.set(SUCCESS_FIELD, value)?,
        Ok(_) => {}
        Err(ThriftError::UserException(declared)) => {
            let DeclaredException { field, exception } = *declared;
            if !method.exception_fields().any(|spec| spec.name == field) {
                return Err(ThriftError::InvalidMessage(format!(
                    "{} does not declare exception {}",
                    method.name(),
                    field
                )));
            }
            result.set(&field, exception)?;
        }
        Err(e) => return Err(e),
    }
    Ok(result)
}

async fn write_exception<P: Protocol>(
    proto: &mut P,
    name: &str,
    seqid: i32,
    exc: ApplicationException,
) -> Result<()> {
    proto.write_message_begin(name, MessageType::Exception, seqid)?;
    proto.write_struct(&exc.to_record()?).await?;
    proto.write_message_end().await
}
