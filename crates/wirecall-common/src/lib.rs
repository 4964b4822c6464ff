//! wirecall Common Types and Transport
//!
//! This crate provides the typed wire codec and the reliable TCP transport
//! for the wirecall cross-process invocation system.
//!
//! # Overview
//!
//! A caller describes a method call as an [`Invocation`]: a name, typed
//! parameters and an optional return type. The [`WireCodec`] turns it into a
//! self-describing text document, a [`RemoteSender`](transport::RemoteSender)
//! ships the text, and the remote side reverses both steps. Replies travel
//! the same way in the opposite direction.
//!
//! - **Protocol Layer**: value model, type-operation registry, codec, errors
//! - **Transport Layer**: framing, TCP sender/receiver with acknowledgement,
//!   reconnect and duplicate suppression, compression decorators
//!
//! # Architecture
//!
//! - **Serialization**: XML documents without declaration or whitespace,
//!   element names as in `<invocation><methodName>..</methodName>..`
//! - **Message Format**: `[0x02][u32 LE sequence][u64 LE length][body][0x03]`
//! - **Acknowledgement**: one `0x06` byte per frame
//! - **Max Message Size**: 100 MB by default
//!
//! # Components
//!
//! - [`protocol`] - Invocation model, registry, codec and error taxonomy
//! - [`transport`] - Framing, TCP transport and decorators
//!
//! # Example
//!
//! ```
//! use wirecall_common::{Invocation, TypeTag, Value, WireCodec, VOID_RETURN_VALUE};
//!
//! let codec = WireCodec::new();
//!
//! // Caller side
//! let invocation = Invocation::new("Add")
//!     .unwrap()
//!     .with_parameters(vec![Some(Value::Int32(5)), Some(Value::Int32(7))])
//!     .unwrap()
//!     .returning(TypeTag::Int32);
//! let request = codec.serialize_invocation(&invocation).unwrap();
//!
//! // Remote side
//! let received = codec.deserialize_invocation(&request).unwrap();
//! assert_eq!(received.name(), "Add");
//! let reply = codec.serialize_return_value(Some(&Value::Int32(12))).unwrap();
//!
//! // Caller side again
//! assert_eq!(codec.deserialize_return_value(&reply).unwrap(), Some(Value::Int32(12)));
//! assert_eq!(codec.deserialize_return_value(VOID_RETURN_VALUE).unwrap(), None);
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
