//! Server-sent events framing
//!
//! Splits an HTTP body into SSE events and yields the `data:` payload of
//! each one. Buffering is done on raw bytes so a multi-byte character split
//! across network chunks is reassembled before decoding.

use crate::error::{ParleyError, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};

/// Upper bound on a single buffered event
const MAX_EVENT_BYTES: usize = 4 * 1024 * 1024;

/// Yields the `data:` payload of every SSE event in `byte_stream`
///
/// Multiple `data:` lines in one event are joined with `\n`. Events without
/// data (comments, keep-alives) are skipped. A body error ends the stream
/// with a [`ParleyError::Transport`].
pub fn sse_data<S, E>(byte_stream: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::try_stream! {
        let mut buffer: Vec<u8> = Vec::new();
        futures::pin_mut!(byte_stream);

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk
                .map_err(|e| ParleyError::Transport(format!("Stream interrupted: {}", e)))?;
            buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

            while let Some(pos) = find_event_end(&buffer) {
                let event: Vec<u8> = buffer.drain(..pos + 2).collect();
                if let Some(data) = event_data(&event[..pos]) {
                    yield data;
                }
            }

            // Only the unterminated tail counts toward the limit
            if buffer.len() > MAX_EVENT_BYTES {
                Err(ParleyError::Protocol("SSE event exceeded maximum size".to_string()))?;
            }
        }

        if let Some(data) = event_data(&buffer) {
            yield data;
        }
    }
}

fn find_event_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn event_data(block: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(block);
    let mut data_lines = Vec::new();
    for line in text.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(chunks: &[&[u8]]) -> Vec<Result<String>> {
        let source = futures::stream::iter(
            chunks
                .iter()
                .map(|c| Ok::<_, std::io::Error>(Bytes::copy_from_slice(c)))
                .collect::<Vec<_>>(),
        );
        sse_data(source).collect().await
    }

    #[tokio::test]
    async fn test_single_event() {
        let events = collect(&[b"data: {\"a\":1}\n\n"]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_event_split_across_chunks() {
        let events = collect(&[b"data: hel", b"lo\n", b"\ndata: world\n\n"]).await;
        let data: Vec<String> = events.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(data, vec!["hello".to_string(), "world".to_string()]);
    }

    #[tokio::test]
    async fn test_crlf_and_event_lines() {
        let events = collect(&[
            b"event: content_block_delta\r\ndata: x\r\n\r\n: keep-alive\r\n\r\n",
        ])
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), "x");
    }

    #[tokio::test]
    async fn test_multibyte_character_split() {
        let text = "data: caf\u{e9}\n\n".as_bytes();
        let (head, tail) = text.split_at(10);
        let events = collect(&[head, tail]).await;
        assert_eq!(events[0].as_ref().unwrap(), "caf\u{e9}");
    }

    #[tokio::test]
    async fn test_trailing_event_without_blank_line() {
        let events = collect(&[b"data: [DONE]"]).await;
        assert_eq!(events[0].as_ref().unwrap(), "[DONE]");
    }

    #[tokio::test]
    async fn test_large_read_of_complete_events_is_accepted() {
        let payload = "x".repeat(1024 * 1024);
        let body = format!("data: {}\n\n", payload).repeat(5);
        assert!(body.len() > MAX_EVENT_BYTES);

        let events = collect(&[body.as_bytes()]).await;
        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|e| e.as_ref().unwrap().len() == payload.len()));
    }

    #[tokio::test]
    async fn test_oversize_partial_event_is_protocol_error() {
        let body = format!("data: {}", "x".repeat(MAX_EVENT_BYTES));
        let events = collect(&[body.as_bytes()]).await;
        assert_eq!(events.len(), 1);
        let err = events[0].as_ref().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ParleyError>(),
            Some(ParleyError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_body_error_is_transport() {
        let source = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"data: a\n\n")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let events: Vec<Result<String>> = sse_data(source).collect().await;
        assert_eq!(events.len(), 2);
        let err = events[1].as_ref().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ParleyError>(),
            Some(ParleyError::Transport(_))
        ));
    }
}
