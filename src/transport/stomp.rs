//! STOMP 1.2 frame codec.

use super::{Headers, HeartbeatConfig};
use crate::types::{Result, SessionError, stomp};
use bytes::Bytes;
use std::time::Duration;

/// One STOMP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl StompFrame {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// First value of header `name`; repeated headers after the first are ignored
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn connect(host: &str, headers: &Headers, heartbeat: HeartbeatConfig) -> Self {
        let mut frame = Self::new(stomp::CONNECT)
            .with_header(stomp::HEADER_ACCEPT_VERSION, stomp::SUPPORTED_VERSIONS)
            .with_header(stomp::HEADER_HOST, host)
            .with_header(
                stomp::HEADER_HEART_BEAT,
                format!(
                    "{},{}",
                    heartbeat.outgoing.as_millis(),
                    heartbeat.incoming.as_millis()
                ),
            );
        for (name, value) in headers {
            frame = frame.with_header(name.as_str(), value.as_str());
        }
        frame
    }

    pub fn send(destination: &str, body: Bytes, content_type: &str) -> Self {
        Self::new(stomp::SEND)
            .with_header(stomp::HEADER_DESTINATION, destination)
            .with_header(stomp::HEADER_CONTENT_TYPE, content_type)
            .with_header(stomp::HEADER_CONTENT_LENGTH, body.len().to_string())
            .with_body(body)
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(stomp::SUBSCRIBE)
            .with_header(stomp::HEADER_ID, id)
            .with_header(stomp::HEADER_DESTINATION, destination)
    }

    pub fn unsubscribe(id: &str) -> Self {
        Self::new(stomp::UNSUBSCRIBE).with_header(stomp::HEADER_ID, id)
    }

    pub fn disconnect(receipt: &str) -> Self {
        Self::new(stomp::DISCONNECT).with_header(stomp::HEADER_RECEIPT, receipt)
    }

    /// CONNECT and CONNECTED headers are sent unescaped
    fn escapes_headers(command: &str) -> bool {
        command != stomp::CONNECT && command != stomp::CONNECTED
    }

    /// Serialize to wire bytes, NUL-terminated
    pub fn encode(&self) -> Vec<u8> {
        let escape = Self::escapes_headers(&self.command);
        let mut out = Vec::with_capacity(self.command.len() + self.body.len() + 64);
        out.extend_from_slice(self.command.as_bytes());
        out.push(b'\n');
        for (name, value) in &self.headers {
            if escape {
                out.extend_from_slice(escape_header(name).as_bytes());
                out.push(b':');
                out.extend_from_slice(escape_header(value).as_bytes());
            } else {
                out.extend_from_slice(name.as_bytes());
                out.push(b':');
                out.extend_from_slice(value.as_bytes());
            }
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(0);
        out
    }
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            _ => out.push(ch),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            other => {
                return Err(malformed(format!(
                    "undefined escape sequence \\{}",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}

fn malformed(details: String) -> SessionError {
    SessionError::Protocol {
        message: "malformed STOMP frame".to_string(),
        details,
    }
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Largest frame (or unfinished frame tail) accepted from the server
pub const MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

/// Decode every frame in `input`. Heart-beat EOLs yield no frames.
///
/// `input` must hold whole frames; see [`FrameBuffer`] for data that may be
/// split across messages.
pub fn decode_frames(input: &[u8]) -> Result<Vec<StompFrame>> {
    let (frames, consumed) = decode_available(input)?;
    if consumed < input.len() {
        return Err(malformed("incomplete frame".to_string()));
    }
    Ok(frames)
}

/// Reassembles frames from wire chunks, holding an unfinished tail until the
/// rest of it arrives
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return the frames it completes
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<StompFrame>> {
        let decoded = if self.pending.is_empty() {
            decode_available(chunk).map(|(frames, consumed)| {
                self.pending.extend_from_slice(&chunk[consumed..]);
                frames
            })
        } else {
            self.pending.extend_from_slice(chunk);
            decode_available(&self.pending).map(|(frames, consumed)| {
                self.pending.drain(..consumed);
                frames
            })
        };

        match decoded {
            Ok(_) if self.pending.len() > MAX_FRAME_SIZE => {
                self.pending.clear();
                Err(malformed(format!(
                    "unfinished frame exceeds {} bytes",
                    MAX_FRAME_SIZE
                )))
            }
            Ok(frames) => Ok(frames),
            Err(e) => {
                self.pending.clear();
                Err(e)
            }
        }
    }

    /// Bytes held for a frame that has not completed yet
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Decoding one frame from the front of a buffer
enum Decoded {
    Frame(StompFrame, usize),
    /// The frame continues past the end of the buffer
    Incomplete,
}

/// Decode the complete frames at the front of `input`, returning them with
/// the number of bytes consumed
fn decode_available(input: &[u8]) -> Result<(Vec<StompFrame>, usize)> {
    let mut frames = Vec::new();
    let mut consumed = 0;
    loop {
        // Skip heart-beats and inter-frame EOLs
        while matches!(input.get(consumed), Some(b'\n' | b'\r')) {
            consumed += 1;
        }
        if consumed == input.len() {
            return Ok((frames, consumed));
        }
        match decode_one(&input[consumed..])? {
            Decoded::Frame(frame, used) => {
                frames.push(frame);
                consumed += used;
            }
            Decoded::Incomplete => return Ok((frames, consumed)),
        }
    }
}

fn next_line<'a>(input: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    let start = *pos;
    let len = input[start..].iter().position(|b| *b == b'\n')?;
    *pos = start + len + 1;
    Some(strip_cr(&input[start..start + len]))
}

fn decode_one(input: &[u8]) -> Result<Decoded> {
    let mut pos = 0;
    let Some(command) = next_line(input, &mut pos) else {
        return Ok(Decoded::Incomplete);
    };
    let command = std::str::from_utf8(command)
        .map_err(|e| malformed(format!("command is not UTF-8: {}", e)))?
        .to_string();
    let escape = StompFrame::escapes_headers(&command);

    let mut headers = Vec::new();
    loop {
        let Some(line) = next_line(input, &mut pos) else {
            return Ok(Decoded::Incomplete);
        };
        if line.is_empty() {
            break;
        }
        let line = std::str::from_utf8(line)
            .map_err(|e| malformed(format!("header is not UTF-8: {}", e)))?;
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| malformed(format!("header without colon: {}", line)))?;
        if escape {
            headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(name, _)| name == stomp::HEADER_CONTENT_LENGTH)
        .map(|(_, value)| {
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| malformed(format!("bad content-length: {}", value)))
        })
        .transpose()?;

    let body_start = pos;
    let body_end = match content_length {
        Some(len) if len > MAX_FRAME_SIZE => {
            return Err(malformed(format!(
                "content-length {} exceeds {} bytes",
                len, MAX_FRAME_SIZE
            )));
        }
        Some(len) => {
            let end = body_start
                .checked_add(len)
                .ok_or_else(|| malformed(format!("content-length {} overflows", len)))?;
            match input.get(end) {
                None => return Ok(Decoded::Incomplete),
                Some(0) => end,
                Some(_) => {
                    return Err(malformed(
                        "body longer than content-length".to_string(),
                    ));
                }
            }
        }
        None => match input[body_start..].iter().position(|b| *b == 0) {
            Some(len) => body_start + len,
            None => return Ok(Decoded::Incomplete),
        },
    };

    let frame = StompFrame {
        command,
        headers,
        body: Bytes::copy_from_slice(&input[body_start..body_end]),
    };
    Ok(Decoded::Frame(frame, body_end + 1))
}

/// Negotiated heart-beat periods as `(send_every, expect_every)`; `None` disables
pub fn negotiate_heartbeat(
    client: HeartbeatConfig,
    server_header: Option<&str>,
) -> (Option<Duration>, Option<Duration>) {
    let (server_send, server_want) = server_header
        .and_then(|value| value.split_once(','))
        .and_then(|(sx, sy)| Some((sx.trim().parse::<u64>().ok()?, sy.trim().parse::<u64>().ok()?)))
        .unwrap_or((0, 0));

    let pick = |ours: Duration, theirs: u64| {
        let ours = ours.as_millis() as u64;
        if ours == 0 || theirs == 0 {
            None
        } else {
            Some(Duration::from_millis(ours.max(theirs)))
        }
    };

    (
        pick(client.outgoing, server_want),
        pick(client.incoming, server_send),
    )
}
