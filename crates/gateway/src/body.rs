//! Response body accumulation under a byte cap.
//!
//! Bodies with an honest oversized Content-Length never get here; the client
//! rejects them from the headers alone. This module handles the rest:
//! undeclared (chunked) bodies and headers that lie. The running total is
//! checked before every append, so the buffer can never hold more than the
//! cap, and the stream is dropped the moment the cap is crossed, aborting
//! the transfer.

use std::pin::pin;

use futures::{Stream, StreamExt};

/// Why a capped body read stopped early.
#[derive(Debug)]
pub(crate) enum BodyReadError<E> {
    /// The running total crossed the cap. The buffered prefix is discarded.
    CapExceeded,
    /// The underlying stream failed mid-transfer.
    Stream(E),
}

/// Accumulate a chunked byte stream, enforcing `limit` before every append.
pub(crate) async fn collect_capped<S, B, E>(
    stream: S,
    limit: u64,
) -> Result<Vec<u8>, BodyReadError<E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    let mut stream = pin!(stream);
    let mut buffer: Vec<u8> = Vec::new();
    let mut total: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(BodyReadError::Stream)?;
        let bytes = chunk.as_ref();

        total += bytes.len() as u64;
        if total > limit {
            return Err(BodyReadError::CapExceeded);
        }
        buffer.extend_from_slice(bytes);
    }

    Ok(buffer)
}
