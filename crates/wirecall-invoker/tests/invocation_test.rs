//! End-to-end Invocation Tests
//!
//! Runs a [`MethodInvoker`] against a [`MethodInvocationListener`] over two
//! loopback TCP channels, one per direction:
//! 1. A typed call and its result
//! 2. A void call
//! 3. A handler failure surfacing as a remote error
//! 4. A custom record type registered on a shared codec
//! 5. Stop hands back the still-connected transports

use std::str::FromStr;
use std::sync::{Arc, Once};
use std::thread;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use wirecall_common::transport::{
    ReceiverConfig, RemoteSender, SenderConfig, TcpMessageReceiver, TcpMessageSender,
};
use wirecall_common::{CustomValue, Invocation, Result, TypeTag, Value, WireCodec, WirecallError};
use wirecall_invoker::{MethodInvocationListener, MethodInvoker};
use wirecall_metrics::TransportMetrics;

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_test_writer()
            .try_init();
    });
}

type Invoker = MethodInvoker<TcpMessageSender, TcpMessageReceiver>;
type Listener = MethodInvocationListener<TcpMessageReceiver, TcpMessageSender>;

fn receiver() -> TcpMessageReceiver {
    TcpMessageReceiver::new(ReceiverConfig {
        connect_retry_count: 300,
        connect_retry_interval_ms: 10,
        receive_poll_interval_ms: 10,
        ..ReceiverConfig::new("127.0.0.1", 0)
    })
}

fn sender(port: u16) -> TcpMessageSender {
    TcpMessageSender::new(SenderConfig {
        connect_retry_count: 50,
        connect_retry_interval_ms: 20,
        ack_timeout_ms: 2000,
        ..SenderConfig::new("127.0.0.1", port)
    })
}

/// Wires up both ends and connects them.
fn connected_pair(codec: Arc<WireCodec>, metrics: &TransportMetrics) -> (Invoker, Listener) {
    init_tracing();

    let mut requests = receiver();
    let request_port = requests.bind().unwrap().port();
    let mut replies = receiver();
    let reply_port = replies.bind().unwrap().port();

    let mut listener = MethodInvocationListener::with_codec(
        Arc::clone(&codec),
        requests,
        sender(reply_port),
    )
    .with_metrics(Arc::new(metrics.clone()));
    let mut invoker = MethodInvoker::with_codec(codec, sender(request_port), replies);

    // Each side blocks until the other has dialled in.
    let listener_side = thread::spawn(move || {
        listener.connect().unwrap();
        listener
    });
    invoker.connect().unwrap();
    let listener = listener_side.join().unwrap();

    (invoker, listener)
}

fn calculator(invocation: &Invocation) -> Result<Option<Value>> {
    match (invocation.name(), invocation.parameters()) {
        ("Add", [Some(Value::Int32(a)), Some(Value::Int32(b))]) => a
            .checked_add(*b)
            .map(|sum| Some(Value::Int32(sum)))
            .ok_or_else(|| WirecallError::InvalidArgument("overflow".to_string())),
        ("Total", [Some(Value::Array { items, .. })]) => {
            let mut total = Decimal::ZERO;
            for item in items.iter().flatten() {
                if let Value::Decimal(d) = item {
                    total += *d;
                }
            }
            Ok(Some(Value::Decimal(total)))
        }
        ("Ping", []) => Ok(None),
        ("Nothing", _) => Ok(None),
        (name, _) => Err(WirecallError::InvalidArgument(format!("unknown method {}", name))),
    }
}

fn add(a: i32, b: i32) -> Invocation {
    Invocation::new("Add")
        .unwrap()
        .with_parameters(vec![Some(Value::Int32(a)), Some(Value::Int32(b))])
        .unwrap()
        .returning(TypeTag::Int32)
}

#[test]
fn test_typed_calls() {
    let metrics = TransportMetrics::new();
    let (mut invoker, mut listener) = connected_pair(Arc::new(WireCodec::new()), &metrics);
    listener.start(calculator).unwrap();

    assert_eq!(invoker.invoke(&add(5, 7)).unwrap(), Some(Value::Int32(12)));
    assert_eq!(invoker.invoke(&add(-1, 1)).unwrap(), Some(Value::Int32(0)));

    let amounts = ["10.25", "0.75", "-1"]
        .iter()
        .map(|s| Value::Decimal(Decimal::from_str(s).unwrap()));
    let total = Invocation::new("Total")
        .unwrap()
        .with_parameters(vec![Some(Value::array(TypeTag::Decimal, amounts))])
        .unwrap()
        .returning(TypeTag::Decimal);
    assert_eq!(
        invoker.invoke(&total).unwrap(),
        Some(Value::Decimal(Decimal::from_str("10").unwrap()))
    );

    let nothing = Invocation::new("Nothing")
        .unwrap()
        .with_parameters(vec![None])
        .unwrap()
        .returning(TypeTag::DateTime);
    assert_eq!(invoker.invoke(&nothing).unwrap(), None);

    listener.stop().unwrap();
    assert_eq!(metrics.snapshot().methods["Add"].success_count, 2);
}

#[test]
fn test_void_call() {
    let metrics = TransportMetrics::new();
    let (mut invoker, mut listener) = connected_pair(Arc::new(WireCodec::new()), &metrics);
    listener.start(calculator).unwrap();

    let ping = Invocation::new("Ping").unwrap();
    invoker.invoke_void(&ping).unwrap();
    assert_eq!(invoker.invoke(&ping).unwrap(), None);

    listener.stop().unwrap();
}

#[test]
fn test_handler_failure_is_remote_error() {
    let metrics = TransportMetrics::new();
    let (mut invoker, mut listener) = connected_pair(Arc::new(WireCodec::new()), &metrics);
    listener.start(calculator).unwrap();

    let err = invoker.invoke(&add(i32::MAX, 1)).unwrap_err();
    assert!(
        matches!(err, WirecallError::RemoteInvocation(ref m) if m.contains("overflow")),
        "{:?}",
        err
    );

    // The listener survives and keeps answering.
    assert_eq!(invoker.invoke(&add(2, 2)).unwrap(), Some(Value::Int32(4)));

    listener.stop().unwrap();
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.methods["Add"].failure_count, 1);
    assert_eq!(snapshot.methods["Add"].success_count, 1);
}

#[test]
fn test_custom_record_over_shared_codec() {
    let mut codec = WireCodec::new();
    codec
        .registry_mut()
        .add_record_type("audit::Entry", "entry")
        .unwrap();

    let metrics = TransportMetrics::new();
    let (mut invoker, mut listener) = connected_pair(Arc::new(codec), &metrics);
    listener
        .start(|invocation: &Invocation| match invocation.parameters() {
            [Some(Value::Custom(entry))] => {
                let stamped = entry.clone().with_field(
                    "at",
                    Some(Value::DateTime(
                        NaiveDate::from_ymd_opt(2024, 2, 29)
                            .unwrap()
                            .and_hms_opt(12, 0, 0)
                            .unwrap(),
                    )),
                );
                Ok(Some(Value::Custom(stamped)))
            }
            _ => Err(WirecallError::InvalidArgument("expected an entry".to_string())),
        })
        .unwrap();

    let entry = CustomValue::new("audit::Entry")
        .with_field("user", Some(Value::from("ada")))
        .with_field("note", None);
    let stamp = Invocation::new("Stamp")
        .unwrap()
        .with_parameters(vec![Some(Value::Custom(entry))])
        .unwrap()
        .returning(TypeTag::custom("audit::Entry"));

    let Some(Value::Custom(stamped)) = invoker.invoke(&stamp).unwrap() else {
        panic!("expected a record");
    };
    assert_eq!(stamped.field("user"), Some(&Value::from("ada")));
    assert_eq!(stamped.field("note"), None);
    assert!(matches!(stamped.field("at"), Some(Value::DateTime(_))));

    listener.stop().unwrap();
}

#[test]
fn test_stop_returns_transports() {
    let metrics = TransportMetrics::new();
    let (invoker, mut listener) = connected_pair(Arc::new(WireCodec::new()), &metrics);
    listener.start(calculator).unwrap();
    assert!(listener.is_running());

    listener.stop().unwrap();
    assert!(!listener.is_running());

    let (receiver, sender) = listener.into_parts().unwrap();
    assert!(receiver.is_connected());
    assert!(sender.is_connected());

    let (mut request_sender, _reply_receiver) = invoker.into_parts();
    request_sender.disconnect();
    assert!(!request_sender.is_connected());
}
