use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, error, info, warn};
use wirecall_common::protocol::{Invocation, Result, Value, WireCodec, WirecallError, VOID_RETURN_VALUE};
use wirecall_common::transport::{CancelHandle, RemoteReceiver, RemoteSender};
use wirecall_metrics::{MetricsSink, NoopMetrics};

/// Reply used when even the error reply cannot be serialized.
const FALLBACK_ERROR_REPLY: &str = "<returnValue><error>remote failure</error></returnValue>";

/// Answering side of a remote method invocation.
///
/// [`start`](Self::start) moves both transports onto one background thread
/// that receives invocations, calls the handler and sends back the reply.
/// [`stop`](Self::stop) cancels the pending receive, joins the thread and
/// takes the transports back.
///
/// Handler errors never stop the listener: they are logged and answered
/// with an error reply, which the caller sees as
/// [`WirecallError::RemoteInvocation`].
///
/// # Example
///
/// ```no_run
/// use wirecall_common::transport::{
///     ReceiverConfig, SenderConfig, TcpMessageReceiver, TcpMessageSender,
/// };
/// use wirecall_common::{Value, WirecallError};
/// use wirecall_invoker::MethodInvocationListener;
///
/// let receiver = TcpMessageReceiver::new(ReceiverConfig::new("127.0.0.1", 9400));
/// let sender = TcpMessageSender::new(SenderConfig::new("127.0.0.1", 9401));
/// let mut listener = MethodInvocationListener::new(receiver, sender);
/// listener.connect().unwrap();
///
/// listener
///     .start(|invocation| match (invocation.name(), invocation.parameters()) {
///         ("Add", [Some(Value::Int32(a)), Some(Value::Int32(b))]) => {
///             Ok(Some(Value::Int32(a + b)))
///         }
///         (name, _) => Err(WirecallError::InvalidArgument(format!("unknown method {}", name))),
///     })
///     .unwrap();
///
/// // ... later
/// listener.stop().unwrap();
/// ```
pub struct MethodInvocationListener<R, S> {
    codec: Arc<WireCodec>,
    metrics: Arc<dyn MetricsSink>,
    transports: Option<(R, S)>,
    running: Option<Running<R, S>>,
}

struct Running<R, S> {
    cancel: CancelHandle,
    handle: JoinHandle<(R, S)>,
}

impl<R, S> MethodInvocationListener<R, S>
where
    R: RemoteReceiver + 'static,
    S: RemoteSender + 'static,
{
    pub fn new(receiver: R, sender: S) -> Self {
        Self::with_codec(Arc::new(WireCodec::new()), receiver, sender)
    }

    pub fn with_codec(codec: Arc<WireCodec>, receiver: R, sender: S) -> Self {
        Self {
            codec,
            metrics: Arc::new(NoopMetrics),
            transports: Some((receiver, sender)),
            running: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Whether the dispatch thread is alive. The thread also ends on its own
    /// when the receive fails or the reply channel cannot be restored.
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Waits for the caller's request channel, then connects the reply
    /// channel. Only valid while stopped.
    pub fn connect(&mut self) -> Result<()> {
        let (receiver, sender) = self.idle_transports()?;
        receiver.connect()?;
        sender.connect()
    }

    pub fn disconnect(&mut self) {
        if let Some((receiver, sender)) = self.transports.as_mut() {
            receiver.disconnect();
            sender.disconnect();
        }
    }

    /// Spawns the dispatch thread.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if already running, `Io` if the thread cannot be
    /// spawned.
    pub fn start<F>(&mut self, handler: F) -> Result<()>
    where
        F: Fn(&Invocation) -> Result<Option<Value>> + Send + 'static,
    {
        if self.is_running() {
            return Err(WirecallError::InvalidArgument(
                "listener is already running".to_string(),
            ));
        }
        // Reaps a thread that already exited.
        self.stop()?;
        let (mut receiver, mut sender) = self.transports.take().ok_or_else(|| {
            WirecallError::InvalidArgument("listener transports are gone".to_string())
        })?;

        let cancel = receiver.cancel_handle();
        let codec = Arc::clone(&self.codec);
        let metrics = Arc::clone(&self.metrics);

        let handle = thread::Builder::new()
            .name("wirecall-listener".to_string())
            .spawn(move || {
                let dispatcher = Dispatcher {
                    codec: &codec,
                    metrics: metrics.as_ref(),
                    handler: &handler,
                };
                dispatcher.run(&mut receiver, &mut sender);
                (receiver, sender)
            })?;

        info!("Invocation listener started");
        self.running = Some(Running { cancel, handle });
        Ok(())
    }

    /// Cancels the receive loop and waits for the thread to finish.
    ///
    /// Does nothing if not running. A reply already being dispatched is
    /// completed first.
    pub fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        running.cancel.cancel();
        match running.handle.join() {
            Ok(transports) => {
                // The thread may have exited without a receive to consume
                // the request; a leftover would end the next run at once.
                transports.0.cancel_handle().take();
                self.transports = Some(transports);
                info!("Invocation listener stopped");
                Ok(())
            }
            Err(_) => Err(WirecallError::ListenerPanicked),
        }
    }

    /// Stops the listener and gives back the transports.
    pub fn into_parts(mut self) -> Result<(R, S)> {
        self.stop()?;
        self.transports
            .take()
            .ok_or_else(|| WirecallError::InvalidArgument("listener transports are gone".to_string()))
    }

    fn idle_transports(&mut self) -> Result<(&mut R, &mut S)> {
        if self.is_running() {
            return Err(WirecallError::InvalidArgument(
                "listener is running".to_string(),
            ));
        }
        self.stop()?;
        self.transports
            .as_mut()
            .map(|(receiver, sender)| (receiver, sender))
            .ok_or_else(|| WirecallError::InvalidArgument("listener transports are gone".to_string()))
    }
}

impl<R, S> Drop for MethodInvocationListener<R, S> {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            if running.handle.join().is_err() {
                error!("Invocation listener thread panicked");
            }
        }
    }
}

/// Receive loop state borrowed by the listener thread.
struct Dispatcher<'a, F> {
    codec: &'a WireCodec,
    metrics: &'a dyn MetricsSink,
    handler: &'a F,
}

impl<F> Dispatcher<'_, F>
where
    F: Fn(&Invocation) -> Result<Option<Value>>,
{
    fn run<R: RemoteReceiver, S: RemoteSender>(&self, receiver: &mut R, sender: &mut S) {
        loop {
            let message = match receiver.receive() {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(e @ WirecallError::ProtocolFraming(_)) => {
                    warn!(error = %e, "Discarding malformed request stream");
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "Receive failed, listener exiting");
                    break;
                }
            };

            let reply = self.dispatch(&message);
            if let Err(e) = sender.send(&reply) {
                error!(error = %e, "Failed to send reply, reconnecting reply channel");
                sender.disconnect();
                if let Err(e) = sender.connect() {
                    error!(error = %e, "Reply channel lost, listener exiting");
                    break;
                }
            }
        }
    }

    /// Produces the reply text for one request.
    fn dispatch(&self, message: &str) -> String {
        let invocation = match self.codec.deserialize_invocation(message) {
            Ok(invocation) => invocation,
            Err(e) => {
                warn!(error = %e, "Rejecting undecodable invocation");
                return self.error_reply(&e.to_string());
            }
        };

        let start = Instant::now();
        let result = (self.handler)(&invocation);
        self.metrics
            .invocation_completed(invocation.name(), start, result.is_ok());

        match result {
            Ok(value) if invocation.is_void() => {
                if value.is_some() {
                    debug!(method = invocation.name(), "Dropping result of void method");
                }
                VOID_RETURN_VALUE.to_string()
            }
            Ok(value) => self
                .codec
                .serialize_return_value(value.as_ref())
                .unwrap_or_else(|e| {
                    warn!(method = invocation.name(), error = %e, "Failed to serialize result");
                    self.error_reply(&e.to_string())
                }),
            Err(e) => {
                warn!(method = invocation.name(), error = %e, "Handler failed");
                self.error_reply(&e.to_string())
            }
        }
    }

    fn error_reply(&self, message: &str) -> String {
        self.codec
            .serialize_error(message)
            .unwrap_or_else(|_| FALLBACK_ERROR_REPLY.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Condvar, Mutex};
    use std::time::Duration;
    use wirecall_common::protocol::TypeTag;

    /// In-memory channel whose receive blocks until a message or a cancel.
    #[derive(Clone, Default)]
    struct Channel {
        queue: Arc<(Mutex<VecDeque<String>>, Condvar)>,
        cancel: CancelHandle,
        /// Makes the next receive fail once.
        fail_next: Arc<AtomicBool>,
    }

    impl RemoteSender for Channel {
        fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        fn disconnect(&mut self) {}

        fn send(&mut self, message: &str) -> Result<()> {
            let (queue, ready) = &*self.queue;
            queue.lock().unwrap().push_back(message.to_string());
            ready.notify_all();
            Ok(())
        }
    }

    impl RemoteReceiver for Channel {
        fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        fn disconnect(&mut self) {}

        fn receive(&mut self) -> Result<Option<String>> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(WirecallError::Connection {
                    message: "sender went away".to_string(),
                    source: None,
                });
            }
            let (queue, ready) = &*self.queue;
            let mut queue = queue.lock().unwrap();
            loop {
                if self.cancel.take() {
                    return Ok(None);
                }
                if let Some(message) = queue.pop_front() {
                    return Ok(Some(message));
                }
                queue = ready
                    .wait_timeout(queue, Duration::from_millis(10))
                    .unwrap()
                    .0;
            }
        }

        fn cancel_handle(&self) -> CancelHandle {
            self.cancel.clone()
        }
    }

    fn echo_handler(invocation: &Invocation) -> Result<Option<Value>> {
        match invocation.name() {
            "Fail" => Err(WirecallError::InvalidArgument("no such method".to_string())),
            _ => Ok(invocation.parameters().first().cloned().flatten()),
        }
    }

    /// Sends `request` on `requests` and waits for the reply on `replies`.
    fn round_trip(requests: &mut Channel, replies: &mut Channel, request: &str) -> String {
        requests.send(request).unwrap();
        replies.receive().unwrap().unwrap()
    }

    #[test]
    fn test_dispatches_and_replies() {
        let codec = WireCodec::new();
        let requests = Channel::default();
        let replies = Channel::default();
        let mut listener = MethodInvocationListener::new(requests.clone(), replies.clone());
        listener.start(echo_handler).unwrap();

        let echo = Invocation::new("Echo")
            .unwrap()
            .with_parameters(vec![Some(Value::from("hi"))])
            .unwrap()
            .returning(TypeTag::String);
        let request = codec.serialize_invocation(&echo).unwrap();
        let reply = round_trip(&mut requests.clone(), &mut replies.clone(), &request);
        assert_eq!(
            codec.deserialize_return_value(&reply).unwrap(),
            Some(Value::from("hi"))
        );

        listener.stop().unwrap();
        assert!(!listener.is_running());
    }

    #[test]
    fn test_void_invocation_gets_void_reply() {
        let codec = WireCodec::new();
        let requests = Channel::default();
        let replies = Channel::default();
        let mut listener = MethodInvocationListener::new(requests.clone(), replies.clone());
        listener.start(echo_handler).unwrap();

        let notify = Invocation::new("Notify")
            .unwrap()
            .with_parameters(vec![Some(Value::Int64(1))])
            .unwrap();
        let request = codec.serialize_invocation(&notify).unwrap();
        let reply = round_trip(&mut requests.clone(), &mut replies.clone(), &request);
        assert_eq!(reply, VOID_RETURN_VALUE);

        listener.stop().unwrap();
    }

    #[test]
    fn test_failures_become_error_replies() {
        let codec = WireCodec::new();
        let requests = Channel::default();
        let replies = Channel::default();
        let mut listener = MethodInvocationListener::new(requests.clone(), replies.clone());
        listener.start(echo_handler).unwrap();

        let fail = Invocation::new("Fail").unwrap().returning(TypeTag::Int32);
        let request = codec.serialize_invocation(&fail).unwrap();
        let reply = round_trip(&mut requests.clone(), &mut replies.clone(), &request);
        assert!(matches!(
            codec.deserialize_return_value(&reply),
            Err(WirecallError::RemoteInvocation(ref m)) if m.contains("no such method")
        ));

        // Garbage is answered too, and the listener keeps going.
        let reply = round_trip(&mut requests.clone(), &mut replies.clone(), "<nonsense/>");
        assert!(matches!(
            codec.deserialize_return_value(&reply),
            Err(WirecallError::RemoteInvocation(_))
        ));
        assert!(listener.is_running());

        listener.stop().unwrap();
    }

    #[test]
    fn test_start_twice_and_restart() {
        let requests = Channel::default();
        let replies = Channel::default();
        let mut listener = MethodInvocationListener::new(requests, replies);

        listener.start(echo_handler).unwrap();
        assert!(matches!(
            listener.start(echo_handler),
            Err(WirecallError::InvalidArgument(_))
        ));
        assert!(listener.connect().is_err());

        listener.stop().unwrap();
        listener.stop().unwrap();
        listener.start(echo_handler).unwrap();
        let (_receiver, _sender) = listener.into_parts().unwrap();
    }

    #[test]
    fn test_restart_after_thread_exits_on_error() {
        let codec = WireCodec::new();
        let requests = Channel::default();
        let replies = Channel::default();
        requests.fail_next.store(true, Ordering::SeqCst);

        let mut listener = MethodInvocationListener::new(requests.clone(), replies.clone());
        listener.start(echo_handler).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while listener.is_running() {
            assert!(Instant::now() < deadline, "listener thread never exited");
            thread::sleep(Duration::from_millis(5));
        }

        listener.stop().unwrap();
        assert!(!requests.cancel.is_cancelled());

        listener.start(echo_handler).unwrap();
        let echo = Invocation::new("Echo")
            .unwrap()
            .with_parameters(vec![Some(Value::Int32(3))])
            .unwrap()
            .returning(TypeTag::Int32);
        let request = codec.serialize_invocation(&echo).unwrap();
        let reply = round_trip(&mut requests.clone(), &mut replies.clone(), &request);
        assert_eq!(
            codec.deserialize_return_value(&reply).unwrap(),
            Some(Value::Int32(3))
        );
        assert!(listener.is_running());

        listener.stop().unwrap();
    }

    #[test]
    fn test_start_reaps_exited_thread() {
        let requests = Channel::default();
        requests.fail_next.store(true, Ordering::SeqCst);
        let mut listener = MethodInvocationListener::new(requests, Channel::default());
        listener.start(echo_handler).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while listener.is_running() {
            assert!(Instant::now() < deadline, "listener thread never exited");
            thread::sleep(Duration::from_millis(5));
        }

        // No explicit stop: start joins the finished thread itself.
        listener.start(echo_handler).unwrap();
        assert!(listener.is_running());
        listener.stop().unwrap();
    }
}
