//! wirecall Method Invocation
//!
//! Pairs a sending and a receiving transport into the two ends of a remote
//! method call:
//!
//! - [`MethodInvoker`] serializes an invocation, sends it and decodes the reply
//! - [`MethodInvocationListener`] receives invocations on a background thread,
//!   hands them to a handler and sends back the result or an error reply
//!
//! Each end owns one transport per direction, so a caller's sender talks to
//! the listener's receiver and the listener's sender to the caller's receiver.

mod invoker;
mod listener;

pub use invoker::MethodInvoker;
pub use listener::MethodInvocationListener;
