//! Full-body buffering with a size cap.

use axum::body::{Body, Bytes};
use futures_util::{stream, StreamExt};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("body stream failed: {0}")]
    Stream(String),
}

/// Outcome of [`buffer_or_replay`].
#[derive(Debug)]
pub enum Buffered {
    Complete(Bytes),
    /// The limit was hit. The body yields the chunks already read, then
    /// the rest of the original stream, so nothing is lost.
    Overflow(Body),
}

/// Join every chunk of `body` into one buffer.
///
/// Dropping the returned future releases whatever was collected so far.
pub async fn buffer(body: Body, limit: usize) -> Result<Bytes, BufferError> {
    match buffer_or_replay(body, limit).await? {
        Buffered::Complete(bytes) => Ok(bytes),
        Buffered::Overflow(_) => Err(BufferError::TooLarge { limit }),
    }
}

/// Like [`buffer`], but an oversized body is handed back intact instead of
/// being dropped.
pub async fn buffer_or_replay(body: Body, limit: usize) -> Result<Buffered, BufferError> {
    let mut stream = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut total = 0usize;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| BufferError::Stream(e.to_string()))?;
        total += chunk.len();
        chunks.push(chunk);

        if total > limit {
            let read = stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>));
            return Ok(Buffered::Overflow(Body::from_stream(read.chain(stream))));
        }
    }

    Ok(Buffered::Complete(join(chunks, total)))
}

fn join(mut chunks: Vec<Bytes>, total: usize) -> Bytes {
    match chunks.len() {
        0 => Bytes::new(),
        1 => chunks.remove(0),
        _ => {
            let mut joined = Vec::with_capacity(total);
            for chunk in &chunks {
                joined.extend_from_slice(chunk);
            }
            Bytes::from(joined)
        }
    }
}
