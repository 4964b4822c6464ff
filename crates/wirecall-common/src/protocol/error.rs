use thiserror::Error;

#[derive(Error, Debug)]
pub enum WirecallError {
    /// Connecting or accepting failed after the retry budget was spent, or
    /// the operation needs a connection that does not exist.
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Transient I/O fault on an established connection.
    #[error("Transport error while {context}")]
    Transport {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Protocol framing error: {0}")]
    ProtocolFraming(String),

    #[error("No acknowledgement received within {0}ms")]
    AcknowledgementTimeout(u64),

    #[error("Failed to serialize {payload}")]
    Serialization {
        payload: String,
        #[source]
        source: Box<WirecallError>,
    },

    #[error("Failed to deserialize {payload}")]
    Deserialization {
        payload: String,
        #[source]
        source: Box<WirecallError>,
    },

    #[error("Type '{0}' is not registered")]
    UnknownType(String),

    #[error("Type mapping already registered: {0}")]
    DuplicateMapping(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid {type_name} value '{text}'")]
    InvalidValue { type_name: String, text: String },

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Remote invocation failed: {0}")]
    RemoteInvocation(String),

    #[error("Listener thread panicked")]
    ListenerPanicked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WirecallError {
    pub(crate) fn connection(message: impl Into<String>) -> Self {
        WirecallError::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn transport(context: impl Into<String>, source: std::io::Error) -> Self {
        WirecallError::Transport {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn invalid_value(type_name: impl Into<String>, text: impl Into<String>) -> Self {
        WirecallError::InvalidValue {
            type_name: type_name.into(),
            text: text.into(),
        }
    }

    /// Whether the sender may recover from this error by reconnecting and
    /// re-sending the same frame.
    ///
    /// Only transport faults and acknowledgement timeouts qualify; framing,
    /// registry and codec errors point at a defect and are never retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WirecallError::Transport { .. } | WirecallError::AcknowledgementTimeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, WirecallError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn test_transient_classification() {
        let transport = WirecallError::transport(
            "writing frame",
            io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"),
        );
        assert!(transport.is_transient());
        assert!(WirecallError::AcknowledgementTimeout(500).is_transient());

        assert!(!WirecallError::ProtocolFraming("bad start byte".into()).is_transient());
        assert!(!WirecallError::connection("retries exhausted").is_transient());
        assert!(!WirecallError::UnknownType("widget".into()).is_transient());
    }

    #[test]
    fn test_serialization_error_chains_cause() {
        let err = WirecallError::Serialization {
            payload: "Invocation { name: \"Add\" }".into(),
            source: Box::new(WirecallError::UnknownType("widget".into())),
        };

        let cause = err.source().unwrap();
        assert_eq!(cause.to_string(), "Type 'widget' is not registered");
    }

    #[test]
    fn test_connection_error_keeps_io_cause() {
        let err = WirecallError::Connection {
            message: "Failed to connect to 127.0.0.1:1 after 3 attempts".into(),
            source: Some(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")),
        };

        assert!(err.to_string().contains("after 3 attempts"));
        assert_eq!(err.source().unwrap().to_string(), "refused");
    }
}
