use std::collections::VecDeque;
use std::env;
use std::pin::Pin;

use futures_util::{stream, Stream, StreamExt};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static DEBUG: Lazy<bool> = Lazy::new(|| env::var("DASHPAL_DEBUG").is_ok());

macro_rules! debug_eprintln {
    ($($arg:tt)*) => {
        if *DEBUG {
            eprintln!($($arg)*);
        }
    };
}

/// Undecodable lines tolerated per exchange before the whole stream is
/// declared garbled.
const MALFORMED_TOLERANCE: usize = 8;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent endpoint returned {0}")]
    Status(reqwest::StatusCode),
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("stream closed before the end signal")]
    Truncated,
    #[error("stream contained too many undecodable increments")]
    Garbled,
}

/// What the UI sees from an exchange, in arrival order. After `Done` or
/// `Failed` the stream yields nothing more.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Token(String),
    Done { uid: Option<String> },
    Failed(String),
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    uid: Option<&'a str>,
}

/// One newline-delimited JSON line of the response body. The final line
/// carries `done: true` plus the backend's session uid.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    delta: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    uid: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Decoded {
    Token(String),
    Done { uid: Option<String> },
}

/// Reassembles NDJSON lines from arbitrarily-split network chunks. A
/// line may arrive sheared across chunks; the buffer only splits at
/// newlines, so no token is ever lost or reordered.
#[derive(Default)]
struct Decoder {
    buf: Vec<u8>,
    malformed: usize,
}

impl Decoder {
    fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Decoded>, AgentError> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<StreamChunk>(line) {
                Ok(chunk) => {
                    if !chunk.delta.is_empty() {
                        out.push(Decoded::Token(chunk.delta));
                    }
                    if chunk.done {
                        out.push(Decoded::Done { uid: chunk.uid });
                        break;
                    }
                }
                Err(e) => {
                    self.malformed += 1;
                    debug_eprintln!("[agent] skipping undecodable line ({}): {}", e, line);
                    if self.malformed > MALFORMED_TOLERANCE {
                        return Err(AgentError::Garbled);
                    }
                }
            }
        }

        Ok(out)
    }
}

type BodyStream = Pin<Box<dyn Stream<Item = reqwest::Result<Vec<u8>>> + Send>>;

struct TokenStream {
    body: BodyStream,
    decoder: Decoder,
    pending: VecDeque<Decoded>,
}

impl TokenStream {
    fn new(body: BodyStream) -> Self {
        TokenStream {
            body,
            decoder: Decoder::default(),
            pending: VecDeque::new(),
        }
    }

    /// Next event, pulling network chunks as needed. Transport closure
    /// before the end signal is a failure, not a clean end.
    async fn next_event(&mut self) -> StreamEvent {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return match item {
                    Decoded::Token(token) => StreamEvent::Token(token),
                    Decoded::Done { uid } => StreamEvent::Done { uid },
                };
            }

            match self.body.next().await {
                Some(Ok(chunk)) => match self.decoder.feed(&chunk) {
                    Ok(items) => self.pending.extend(items),
                    Err(e) => return StreamEvent::Failed(e.to_string()),
                },
                Some(Err(e)) => {
                    return StreamEvent::Failed(AgentError::Transport(e).to_string())
                }
                None => return StreamEvent::Failed(AgentError::Truncated.to_string()),
            }
        }
    }
}

async fn open_exchange(
    client: &reqwest::Client,
    base_url: &str,
    uid: Option<&str>,
    prompt: &str,
) -> Result<TokenStream, AgentError> {
    debug_eprintln!("[agent] POST {}/query/stream uid={:?}", base_url, uid);

    let response = client
        .post(format!("{}/query/stream", base_url))
        .json(&QueryRequest { query: prompt, uid })
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(AgentError::Status(response.status()));
    }

    let body: BodyStream = Box::pin(
        response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec())),
    );
    Ok(TokenStream::new(body))
}

enum Phase {
    Open {
        client: reqwest::Client,
        base_url: String,
        uid: Option<String>,
        prompt: String,
    },
    Streaming(TokenStream),
    Finished,
}

/// Run one exchange as a lazy, finite stream of events: the request is
/// not sent until the first poll, and the stream terminates after the
/// first `Done` or `Failed`.
pub fn run_exchange(
    client: reqwest::Client,
    base_url: String,
    uid: Option<String>,
    prompt: String,
) -> impl Stream<Item = StreamEvent> + Send {
    let start = Phase::Open {
        client,
        base_url,
        uid,
        prompt,
    };

    stream::unfold(start, |phase| async move {
        let mut tokens = match phase {
            Phase::Open {
                client,
                base_url,
                uid,
                prompt,
            } => match open_exchange(&client, &base_url, uid.as_deref(), &prompt).await {
                Ok(tokens) => tokens,
                Err(e) => return Some((StreamEvent::Failed(e.to_string()), Phase::Finished)),
            },
            Phase::Streaming(tokens) => tokens,
            Phase::Finished => return None,
        };

        let event = tokens.next_event().await;
        let next = match event {
            StreamEvent::Token(_) => Phase::Streaming(tokens),
            StreamEvent::Done { .. } | StreamEvent::Failed(_) => Phase::Finished,
        };
        Some((event, next))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_body(chunks: Vec<&[u8]>) -> BodyStream {
        let items: Vec<reqwest::Result<Vec<u8>>> =
            chunks.into_iter().map(|c| Ok(c.to_vec())).collect();
        Box::pin(stream::iter(items))
    }

    #[test]
    fn test_decoder_reassembles_split_lines() {
        let mut decoder = Decoder::default();

        // One JSON line sheared across two network chunks.
        let first = decoder.feed(b"{\"delta\": \"Hel").unwrap();
        assert!(first.is_empty());

        let second = decoder
            .feed(b"lo\"}\n{\"delta\": \" there\"}\n")
            .unwrap();
        assert_eq!(
            second,
            vec![
                Decoded::Token("Hello".to_string()),
                Decoded::Token(" there".to_string()),
            ]
        );
    }

    #[test]
    fn test_decoder_done_line_with_trailing_delta_and_uid() {
        let mut decoder = Decoder::default();
        let out = decoder
            .feed(b"{\"delta\": \"bye\", \"done\": true, \"uid\": \"abc\"}\n")
            .unwrap();
        assert_eq!(
            out,
            vec![
                Decoded::Token("bye".to_string()),
                Decoded::Done {
                    uid: Some("abc".to_string())
                },
            ]
        );
    }

    #[test]
    fn test_decoder_skips_malformed_within_tolerance() {
        let mut decoder = Decoder::default();
        let out = decoder
            .feed(b"not json\n{\"delta\": \"ok\"}\n<garbage>\n")
            .unwrap();
        assert_eq!(out, vec![Decoded::Token("ok".to_string())]);
    }

    #[test]
    fn test_decoder_fails_beyond_tolerance() {
        let mut decoder = Decoder::default();
        let mut junk = Vec::new();
        for _ in 0..=MALFORMED_TOLERANCE {
            junk.extend_from_slice(b"not json\n");
        }
        assert!(matches!(decoder.feed(&junk), Err(AgentError::Garbled)));
    }

    #[tokio::test]
    async fn test_token_stream_orders_events() {
        let body = fake_body(vec![
            b"{\"delta\": \"All\"}\n{\"delta\": \" systems\"}\n".as_slice(),
            b"{\"delta\": \" nominal.\"}\n".as_slice(),
            b"{\"done\": true, \"uid\": \"s-1\"}\n".as_slice(),
        ]);
        let mut tokens = TokenStream::new(body);

        let mut collected = String::new();
        loop {
            match tokens.next_event().await {
                StreamEvent::Token(t) => collected.push_str(&t),
                StreamEvent::Done { uid } => {
                    assert_eq!(uid.as_deref(), Some("s-1"));
                    break;
                }
                StreamEvent::Failed(reason) => panic!("unexpected failure: {}", reason),
            }
        }
        assert_eq!(collected, "All systems nominal.");
    }

    #[tokio::test]
    async fn test_token_stream_truncation_is_failure() {
        let body = fake_body(vec![b"{\"delta\": \"partial\"}\n".as_slice()]);
        let mut tokens = TokenStream::new(body);

        assert!(matches!(tokens.next_event().await, StreamEvent::Token(t) if t == "partial"));
        match tokens.next_event().await {
            StreamEvent::Failed(reason) => {
                assert_eq!(reason, AgentError::Truncated.to_string())
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_token_stream_empty_body_completes_cleanly() {
        let body = fake_body(vec![b"{\"done\": true}\n".as_slice()]);
        let mut tokens = TokenStream::new(body);
        assert!(matches!(
            tokens.next_event().await,
            StreamEvent::Done { uid: None }
        ));
    }
}
