//! gzip compression decorators.
//!
//! [`CompressingSender`] gzips each message and base64-encodes the result so
//! it still travels as text; [`DecompressingReceiver`] reverses both steps.
//! Either side wraps any [`RemoteSender`] / [`RemoteReceiver`], and the two
//! must be used as a pair.

use std::io::{Read, Write};

use base64::{engine::general_purpose, Engine as _};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::protocol::error::{Result, WirecallError};
use crate::transport::config::CompressionConfig;
use crate::transport::{CancelHandle, RemoteReceiver, RemoteSender};

/// Gzips then base64-encodes `message`.
pub fn compress(message: &str) -> Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(message.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(general_purpose::STANDARD.encode(compressed))
}

/// Reverses [`compress`], inflating in chunks of `buffer_size` bytes.
pub fn decompress(payload: &str, buffer_size: usize) -> Result<String> {
    let wrap = |source: WirecallError| WirecallError::Deserialization {
        payload: payload.to_string(),
        source: Box::new(source),
    };

    let compressed = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| wrap(WirecallError::invalid_value("base64", e.to_string())))?;

    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut chunk = vec![0u8; buffer_size.max(1)];
    let mut inflated = Vec::new();
    loop {
        let n = decoder
            .read(&mut chunk)
            .map_err(|e| wrap(WirecallError::Io(e)))?;
        if n == 0 {
            break;
        }
        inflated.extend_from_slice(&chunk[..n]);
    }

    String::from_utf8(inflated)
        .map_err(|e| wrap(WirecallError::invalid_value("utf-8 text", e.to_string())))
}

/// Sender decorator that compresses every message.
pub struct CompressingSender<S> {
    inner: S,
}

impl<S: RemoteSender> CompressingSender<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: RemoteSender> RemoteSender for CompressingSender<S> {
    fn connect(&mut self) -> Result<()> {
        self.inner.connect()
    }

    fn disconnect(&mut self) {
        self.inner.disconnect();
    }

    fn send(&mut self, message: &str) -> Result<()> {
        let payload = compress(message).map_err(|e| WirecallError::Serialization {
            payload: message.to_string(),
            source: Box::new(e),
        })?;
        self.inner.send(&payload)
    }
}

/// Receiver decorator that decompresses every message.
pub struct DecompressingReceiver<R> {
    inner: R,
    config: CompressionConfig,
}

impl<R: RemoteReceiver> DecompressingReceiver<R> {
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, CompressionConfig::default())
    }

    pub fn with_config(inner: R, config: CompressionConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: RemoteReceiver> RemoteReceiver for DecompressingReceiver<R> {
    fn connect(&mut self) -> Result<()> {
        self.inner.connect()
    }

    fn disconnect(&mut self) {
        self.inner.disconnect();
    }

    fn receive(&mut self) -> Result<Option<String>> {
        match self.inner.receive()? {
            Some(payload) => decompress(&payload, self.config.decompression_buffer_size).map(Some),
            None => Ok(None),
        }
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.inner.cancel_handle()
    }
}
