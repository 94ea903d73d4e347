//! Server-sent-event decoding for streamed chat replies.
//!
//! Both dialects stream `data: <json>` lines. Network chunks do not respect
//! line boundaries, so [`SseDecoder`] buffers raw bytes and only emits
//! complete lines; a UTF-8 sequence split across chunks is reassembled before
//! decoding.

use super::TokenStream;
use crate::error::PaperError;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;

/// One decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Payload of a `data:` line.
    Data(String),
    /// The OpenAI `data: [DONE]` terminator.
    Done,
}

/// Line-buffering SSE decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed a network chunk; returns the events completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(ev) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(ev);
            }
        }
        events
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest)).into_iter().collect()
    }
}

fn parse_line(line: &str) -> Option<SseEvent> {
    let line = line.trim_end_matches(['\n', '\r']);
    // Blank lines delimit events; `:` lines are comments; `event:`/`id:` carry nothing we use.
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload == "[DONE]" {
        Some(SseEvent::Done)
    } else if payload.is_empty() {
        None
    } else {
        Some(SseEvent::Data(payload.to_string()))
    }
}

/// Extracts reply text from one event payload; `None` for events without text.
pub(crate) type ChunkParser = fn(&str) -> std::result::Result<Option<String>, serde_json::Error>;

struct StreamState {
    bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

/// Adapt a streaming HTTP response into a [`TokenStream`] of text deltas.
pub(crate) fn token_stream(
    response: reqwest::Response,
    provider: &str,
    parse: ChunkParser,
) -> TokenStream {
    let provider = provider.to_string();
    let init = StreamState {
        bytes: response.bytes_stream().map(|r| r.map(|b| b.to_vec())).boxed(),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    let deltas = stream::unfold(init, move |mut st| {
        let provider = provider.clone();
        async move {
            loop {
                if let Some(payload) = st.pending.pop_front() {
                    match parse(&payload) {
                        Ok(Some(text)) if !text.is_empty() => return Some((Ok(text), st)),
                        Ok(_) => continue,
                        Err(e) => {
                            st.pending.clear();
                            st.finished = true;
                            let err = PaperError::MalformedResponse {
                                provider,
                                detail: format!("stream chunk: {}", e),
                            };
                            return Some((Err(err), st));
                        }
                    }
                }
                if st.finished {
                    return None;
                }
                match st.bytes.next().await {
                    Some(Ok(chunk)) => {
                        for ev in st.decoder.push(&chunk) {
                            match ev {
                                SseEvent::Data(d) => st.pending.push_back(d),
                                SseEvent::Done => {
                                    st.finished = true;
                                    break;
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        st.finished = true;
                        let err = PaperError::Http {
                            provider,
                            detail: e.to_string(),
                        };
                        return Some((Err(err), st));
                    }
                    None => {
                        st.finished = true;
                        for ev in st.decoder.finish() {
                            if let SseEvent::Data(d) = ev {
                                st.pending.push_back(d);
                            }
                        }
                    }
                }
            }
        }
    });

    Box::pin(deltas)
}
