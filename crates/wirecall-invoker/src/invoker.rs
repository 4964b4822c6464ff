use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};
use wirecall_common::protocol::{Invocation, Result, Value, WireCodec, WirecallError, VOID_RETURN_VALUE};
use wirecall_common::transport::{RemoteReceiver, RemoteSender};
use wirecall_metrics::{MetricsSink, NoopMetrics};

/// Calling side of a remote method invocation.
///
/// Serializes the invocation, sends it, waits for the reply on the receiving
/// transport and decodes the return value. Calls are strictly sequential:
/// one request, then its reply.
///
/// # Example
///
/// ```no_run
/// use wirecall_common::transport::{
///     ReceiverConfig, SenderConfig, TcpMessageReceiver, TcpMessageSender,
/// };
/// use wirecall_common::{Invocation, TypeTag, Value};
/// use wirecall_invoker::MethodInvoker;
///
/// let sender = TcpMessageSender::new(SenderConfig::new("127.0.0.1", 9400));
/// let receiver = TcpMessageReceiver::new(ReceiverConfig::new("127.0.0.1", 9401));
/// let mut invoker = MethodInvoker::new(sender, receiver);
/// invoker.connect().unwrap();
///
/// let add = Invocation::new("Add")
///     .unwrap()
///     .with_parameters(vec![Some(Value::Int32(5)), Some(Value::Int32(7))])
///     .unwrap()
///     .returning(TypeTag::Int32);
/// assert_eq!(invoker.invoke(&add).unwrap(), Some(Value::Int32(12)));
/// ```
pub struct MethodInvoker<S, R> {
    codec: Arc<WireCodec>,
    sender: S,
    receiver: R,
    metrics: Arc<dyn MetricsSink>,
}

impl<S: RemoteSender, R: RemoteReceiver> MethodInvoker<S, R> {
    pub fn new(sender: S, receiver: R) -> Self {
        Self::with_codec(Arc::new(WireCodec::new()), sender, receiver)
    }

    /// Uses a shared codec, e.g. one with custom types registered.
    pub fn with_codec(codec: Arc<WireCodec>, sender: S, receiver: R) -> Self {
        Self {
            codec,
            sender,
            receiver,
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn codec(&self) -> &WireCodec {
        &self.codec
    }

    /// Connects the request channel, then waits for the reply channel.
    pub fn connect(&mut self) -> Result<()> {
        self.sender.connect()?;
        self.receiver.connect()
    }

    pub fn disconnect(&mut self) {
        self.sender.disconnect();
        self.receiver.disconnect();
    }

    /// Calls a method and returns its result.
    ///
    /// Returns `Ok(None)` for a void method and for a null result.
    ///
    /// # Errors
    ///
    /// - `RemoteInvocation` if the remote handler failed
    /// - `Deserialization` if the reply does not decode, or decodes to a
    ///   value of a different type than the invocation declared
    /// - any transport error from sending or receiving
    pub fn invoke(&mut self, invocation: &Invocation) -> Result<Option<Value>> {
        let start = Instant::now();
        let result = self.exchange(invocation).and_then(|reply| {
            let value = self.codec.deserialize_return_value(&reply)?;
            check_return_type(invocation, value, &reply)
        });
        self.report(invocation, start, &result);
        result
    }

    /// Calls a void method.
    ///
    /// # Errors
    ///
    /// As [`invoke`](Self::invoke); additionally `MalformedDocument` if the
    /// reply is anything other than the void reply.
    pub fn invoke_void(&mut self, invocation: &Invocation) -> Result<()> {
        let start = Instant::now();
        let result = self.exchange(invocation).and_then(|reply| {
            if reply == VOID_RETURN_VALUE {
                return Ok(());
            }
            // Surfaces a remote error as `RemoteInvocation`.
            self.codec.deserialize_return_value(&reply)?;
            Err(WirecallError::MalformedDocument(format!(
                "expected a void reply to {}, got {}",
                invocation.name(),
                reply
            )))
        });
        self.report(invocation, start, &result);
        result
    }

    /// Gives back the transports.
    pub fn into_parts(self) -> (S, R) {
        (self.sender, self.receiver)
    }

    fn exchange(&mut self, invocation: &Invocation) -> Result<String> {
        let request = self.codec.serialize_invocation(invocation)?;
        self.sender.send(&request)?;
        debug!(method = invocation.name(), "Invocation sent, awaiting reply");

        self.receiver
            .receive()?
            .ok_or_else(|| WirecallError::Connection {
                message: format!("wait for the reply to {} was cancelled", invocation.name()),
                source: None,
            })
    }

    fn report<T>(&self, invocation: &Invocation, start: Instant, result: &Result<T>) {
        if let Err(e) = result {
            warn!(method = invocation.name(), error = %e, "Invocation failed");
        }
        self.metrics
            .invocation_completed(invocation.name(), start, result.is_ok());
    }
}

fn check_return_type(invocation: &Invocation, value: Option<Value>, reply: &str) -> Result<Option<Value>> {
    match (invocation.return_type(), &value) {
        (Some(expected), Some(found)) if found.type_tag() != *expected => {
            Err(WirecallError::Deserialization {
                payload: reply.to_string(),
                source: Box::new(WirecallError::InvalidValue {
                    type_name: expected.to_string(),
                    text: format!("value of type {}", found.type_tag()),
                }),
            })
        }
        _ => Ok(value),
    }
}
