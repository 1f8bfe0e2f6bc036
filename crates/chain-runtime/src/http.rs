//! HTTP plumbing shared by providers: auth headers, error mapping and
//! server-sent event decoding.

use chain_core::error::ChainError;
use chain_core::provider::{CompletionStream, StreamChunk};
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;

/// Default headers for a Bearer-token API
pub fn bearer_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
        headers.insert(AUTHORIZATION, val);
    }
    headers
}

/// Payload of an SSE `data:` line; `None` for other lines and the `[DONE]` sentinel
pub fn parse_sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        return None;
    }
    Some(data)
}

/// Error for a non-success status. Uses the API's `error.message` when the
/// body carries one.
pub fn status_to_error(status: u16, body: &str) -> ChainError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string());

    ChainError::Http { status, body: message }
}

/// Map a transport failure
pub fn transport_error(err: reqwest::Error) -> ChainError {
    if let Some(status) = err.status() {
        return ChainError::Http {
            status: status.as_u16(),
            body: err.to_string(),
        };
    }
    if err.is_timeout() {
        return ChainError::Provider(format!("request timed out: {err}"));
    }
    if err.is_decode() {
        return ChainError::Provider(format!("invalid response body: {err}"));
    }
    ChainError::Provider(err.to_string())
}

/// Decode an SSE response body into stream chunks.
///
/// Each `data:` payload is deserialized as `T` and converted by `to_chunk`.
/// `[DONE]` ends the stream with a final `done` chunk. A payload that is not
/// valid UTF-8 or does not deserialize ends the stream with an error.
pub fn sse_stream<T, F>(resp: reqwest::Response, to_chunk: F) -> CompletionStream
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> chain_core::Result<StreamChunk> + Send + 'static,
{
    decode_sse(resp.bytes_stream(), to_chunk)
}

enum SseLine<T> {
    Skip,
    Done,
    Event(T),
}

fn parse_sse_line<T: DeserializeOwned>(raw: &[u8]) -> chain_core::Result<SseLine<T>> {
    let line = std::str::from_utf8(raw)
        .map_err(|e| ChainError::Provider(format!("stream is not valid UTF-8: {e}")))?
        .trim();

    if line.is_empty() || line.starts_with(':') {
        return Ok(SseLine::Skip);
    }
    if line == "data: [DONE]" || line == "data:[DONE]" {
        return Ok(SseLine::Done);
    }
    let Some(data) = parse_sse_data(line) else {
        return Ok(SseLine::Skip);
    };
    Ok(SseLine::Event(serde_json::from_str(data)?))
}

/// Split a byte stream into lines before decoding, so a character cut by a
/// chunk boundary is reassembled
fn decode_sse<S, B, T, F>(byte_stream: S, to_chunk: F) -> CompletionStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> chain_core::Result<StreamChunk> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut buffer: Vec<u8> = Vec::new();
        futures::pin_mut!(byte_stream);

        while let Some(chunk_result) = byte_stream.next().await {
            let bytes = match chunk_result {
                Ok(b) => b,
                Err(e) => {
                    yield Err(transport_error(e));
                    return;
                }
            };

            buffer.extend_from_slice(bytes.as_ref());

            while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=line_end).collect();

                let chunk = match parse_sse_line::<T>(&line) {
                    Ok(SseLine::Skip) => continue,
                    Ok(SseLine::Done) => {
                        yield Ok(StreamChunk { done: true, ..StreamChunk::default() });
                        return;
                    }
                    Ok(SseLine::Event(event)) => to_chunk(event),
                    Err(e) => Err(e),
                };

                match chunk {
                    Ok(chunk) => yield Ok(chunk),
                    Err(e) => {
                        tracing::warn!(error = %e, "bad stream event");
                        yield Err(e);
                        return;
                    }
                }
            }
        }
    };

    Box::pin(stream)
}
