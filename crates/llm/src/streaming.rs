//! Line-oriented reader shared by the newline-delimited-JSON (Ollama) and
//! SSE (OpenAI/Anthropic) streaming protocols in §4.5.
//!
//! A malformed or unparseable line is never fatal to the stream (§4.5, §7:
//! "malformed stream (skipped lines, never fatal)") — callers decide what
//! "malformed" means for their own line shape and simply skip it.

use futures::StreamExt;
use reqwest::Response;

use voice_agent_core::{Error, Result};

/// Pulls newline-terminated lines out of a streaming HTTP response body one
/// at a time, buffering partial lines across chunk boundaries.
pub struct LineReader {
    buf: String,
    stream: std::pin::Pin<Box<dyn futures::Stream<Item = reqwest::Result<bytes::Bytes>> + Send>>,
    done: bool,
}

impl LineReader {
    pub fn new(response: Response) -> Self {
        Self { buf: String::new(), stream: Box::pin(response.bytes_stream()), done: false }
    }

    /// Returns the next complete line, or `None` once the body is exhausted.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(pos) = self.buf.find('\n') {
                let line = self.buf[..pos].trim_end_matches('\r').to_string();
                self.buf.drain(..=pos);
                return Ok(Some(line));
            }
            if self.done {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let line = std::mem::take(&mut self.buf);
                return Ok(Some(line.trim_end_matches('\r').to_string()));
            }
            match self.stream.next().await {
                Some(Ok(chunk)) => self.buf.push_str(&String::from_utf8_lossy(&chunk)),
                Some(Err(e)) => return Err(Error::Transport(e.to_string())),
                None => self.done = true,
            }
        }
    }
}
