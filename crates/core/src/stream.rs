//! Streaming primitives: byte streams, sinks, and the tee/compose pipeline.
//!
//! Downloads flow through a [`TeeStream`]: every chunk the consumer reads is
//! first written into a [`ByteSink`] (typically a [`ChecksumSink`] wrapping a
//! staging-file writer). Closing the tee drains whatever the consumer left
//! unread, so the sink always sees the complete payload before the checksum
//! is validated.

use crate::checksum::{Checksum, Hasher};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// A terminal consumer of bytes with an explicit, fallible close.
#[async_trait]
pub trait ByteSink: Send {
    /// Write a chunk of data.
    async fn write(&mut self, data: Bytes) -> Result<()>;

    /// Finish the sink. Implementations flush buffered data and perform any
    /// final validation; errors here are real errors, not cleanup noise.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A sink that hashes bytes on the way through and compares the final digest
/// against an expected value on close.
///
/// The inner sink is closed before the comparison, so a mismatch still leaves
/// the inner sink finished; callers decide what to do with the bad artifact
/// (the syncer retries and overwrites it).
pub struct ChecksumSink {
    inner: Box<dyn ByteSink>,
    hasher: Option<Hasher>,
    expected: String,
}

impl ChecksumSink {
    /// Wrap `inner`, validating against `expected` on close. With `None` no
    /// hashing or validation takes place (used for root metadata whose digest
    /// is not known in advance).
    pub fn new(inner: Box<dyn ByteSink>, expected: Option<Checksum>) -> Self {
        match expected {
            Some(checksum) => Self {
                inner,
                hasher: Some(checksum.algorithm.hasher()),
                expected: checksum.hex,
            },
            None => Self {
                inner,
                hasher: None,
                expected: String::new(),
            },
        }
    }
}

#[async_trait]
impl ByteSink for ChecksumSink {
    async fn write(&mut self, data: Bytes) -> Result<()> {
        if let Some(hasher) = &mut self.hasher {
            hasher.update(&data);
        }
        self.inner.write(data).await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.inner.close().await?;
        if let Some(hasher) = this.hasher {
            let actual = hasher.finalize_hex();
            if actual != this.expected {
                return Err(Error::ChecksumMismatch {
                    expected: this.expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}

/// A streaming map that duplicates bytes into a sink as they pass through.
pub struct TeeStream {
    upstream: ByteStream,
    sink: Box<dyn ByteSink>,
}

impl TeeStream {
    pub fn new(upstream: ByteStream, sink: Box<dyn ByteSink>) -> Self {
        Self { upstream, sink }
    }

    /// Pull the next chunk, forwarding it into the sink first.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        match self.upstream.next().await {
            Some(Ok(chunk)) => {
                self.sink.write(chunk.clone()).await?;
                Ok(Some(chunk))
            }
            Some(Err(err)) => Err(err.into()),
            None => Ok(None),
        }
    }

    /// Drain the remaining upstream bytes into the sink, then close the sink.
    ///
    /// The drain runs even when the consumer stopped early, so checksum
    /// validation always covers the full payload.
    pub async fn close(mut self) -> Result<()> {
        while let Some(chunk) = self.upstream.next().await {
            self.sink.write(chunk?).await?;
        }
        self.sink.close().await
    }
}

/// Run `consumer` over a tee, closing the tee exactly once on every exit
/// path. A consumer error takes precedence over a close error; otherwise any
/// close error (notably a checksum mismatch) surfaces.
pub async fn compose<T, F>(mut tee: TeeStream, consumer: F) -> Result<T>
where
    F: for<'a> FnOnce(&'a mut TeeStream) -> BoxFuture<'a, Result<T>> + Send,
{
    let result = consumer(&mut tee).await;
    let closed = tee.close().await;
    match result {
        Err(err) => Err(err),
        Ok(value) => {
            closed?;
            Ok(value)
        }
    }
}

/// Read the whole tee into memory. The common consumer for root metadata,
/// which must be buffered for signature verification and decoding.
pub async fn read_all(tee: &mut TeeStream) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = tee.next_chunk().await? {
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

/// Tee a whole stream into its sink while keeping an in-memory copy, with
/// [`compose`]'s close semantics.
pub async fn read_fully(tee: TeeStream) -> Result<Bytes> {
    compose(tee, read_all_boxed).await
}

fn read_all_boxed(tee: &mut TeeStream) -> BoxFuture<'_, Result<Bytes>> {
    read_all(tee).boxed()
}

/// Collect a plain byte stream into memory.
pub async fn collect(mut stream: ByteStream) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

/// Hash a byte stream without retaining its contents; returns the lowercase
/// hex digest.
pub async fn hash_stream(
    mut stream: ByteStream,
    algorithm: crate::checksum::HashAlgorithm,
) -> Result<String> {
    let mut hasher = algorithm.hasher();
    while let Some(chunk) = stream.next().await {
        hasher.update(&chunk?);
    }
    Ok(hasher.finalize_hex())
}
