//! The incremental wire parser.
//!
//! A small state machine driven one PDU at a time. Token characters
//! accumulate in a scratch buffer so a token can resume across PDU
//! boundaries; bulk bodies are copied byte-exact into their own buffer.
//! The PDU's backing region is refcounted (`bytes::Bytes`), so the caller
//! may hand the parser slices of a shared read buffer without copying.

use bytes::Bytes;

use crate::consumer::ProtocolConsumer;
use crate::error::WireError;

/// Upper bound on a bulk string body. Lengths above this are refused before
/// any buffering happens.
pub const MAX_BULK_SIZE: usize = 1 << 20;

/// Longest accepted numeric token, in bytes. Far above any printable u64 or
/// double; hitting it means the stream is garbage, not a long number.
const MAX_TOKEN_LEN: usize = 64;

/// One delivery of contiguous bytes: an arbitrary fragment of the stream.
#[derive(Debug, Clone)]
pub struct Pdu {
    buffer: Bytes,
    pos: usize,
}

impl Pdu {
    pub fn new(buffer: Bytes) -> Self {
        Self { buffer, pos: 0 }
    }

    /// PDU whose consumption starts at `pos` instead of the buffer start.
    pub fn with_offset(buffer: Bytes, pos: usize) -> Self {
        Self { buffer, pos }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Integer,
    Float,
    BulkLen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// At a field boundary, waiting for a type byte.
    ExpectType,
    /// Accumulating the body of a numeric token.
    Token(TokenKind),
    /// Saw the token's `\r`, waiting for `\n`.
    TokenLf(TokenKind),
    /// Copying a bulk body; `remaining` bytes still owed.
    BulkBody { remaining: usize },
    /// Bulk body complete, waiting for `\r`.
    BulkCr,
    /// Waiting for the bulk terminator's `\n`.
    BulkLf,
    /// A previous PDU produced an error; the instance is unusable.
    Failed,
}

/// Incremental parser feeding a [`ProtocolConsumer`].
pub struct WireParser<C> {
    consumer: C,
    state: State,
    scratch: Vec<u8>,
    bulk: Vec<u8>,
    /// Pending numeric fields of the current record.
    param: Option<u64>,
    timestamp: Option<u64>,
}

impl<C: ProtocolConsumer> WireParser<C> {
    /// Parser ready at a field boundary.
    pub fn new(consumer: C) -> Self {
        Self {
            consumer,
            state: State::ExpectType,
            scratch: Vec::new(),
            bulk: Vec::new(),
            param: None,
            timestamp: None,
        }
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.consumer
    }

    pub fn into_consumer(self) -> C {
        self.consumer
    }

    /// Drive the machine over one PDU. The whole fragment is consumed on
    /// success; on error the parser is poisoned and the connection should
    /// be dropped.
    pub fn parse_next(&mut self, pdu: Pdu) -> Result<(), WireError> {
        if self.state == State::Failed {
            return Err(WireError::Poisoned);
        }
        match self.consume(&pdu) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = State::Failed;
                Err(e)
            }
        }
    }

    /// Terminate the stream. Fails with `TruncatedInput` when a token or a
    /// record is still pending.
    pub fn close(&mut self) -> Result<(), WireError> {
        match self.state {
            State::Failed => Err(WireError::Poisoned),
            State::ExpectType if self.param.is_none() && self.timestamp.is_none() => Ok(()),
            _ => Err(WireError::TruncatedInput),
        }
    }

    fn consume(&mut self, pdu: &Pdu) -> Result<(), WireError> {
        let bytes = pdu.buffer.as_ref();
        let mut pos = pdu.pos;

        while pos < bytes.len() {
            match self.state {
                State::ExpectType => {
                    match bytes[pos] {
                        b':' => self.begin_token(TokenKind::Integer)?,
                        b'+' => self.begin_token(TokenKind::Float)?,
                        b'$' => self.begin_token(TokenKind::BulkLen)?,
                        other => return Err(WireError::UnexpectedTypeByte(other)),
                    }
                    pos += 1;
                }
                State::Token(kind) => {
                    let b = bytes[pos];
                    if b == b'\r' {
                        self.state = State::TokenLf(kind);
                    } else {
                        self.accept_token_byte(kind, b)?;
                    }
                    pos += 1;
                }
                State::TokenLf(kind) => {
                    if bytes[pos] != b'\n' {
                        return Err(WireError::MissingCrlf);
                    }
                    pos += 1;
                    self.finish_token(kind)?;
                }
                State::BulkBody { remaining } => {
                    let take = remaining.min(bytes.len() - pos);
                    self.bulk.extend_from_slice(&bytes[pos..pos + take]);
                    pos += take;
                    let remaining = remaining - take;
                    self.state = if remaining == 0 {
                        State::BulkCr
                    } else {
                        State::BulkBody { remaining }
                    };
                }
                State::BulkCr => {
                    if bytes[pos] != b'\r' {
                        return Err(WireError::MissingCrlf);
                    }
                    pos += 1;
                    self.state = State::BulkLf;
                }
                State::BulkLf => {
                    if bytes[pos] != b'\n' {
                        return Err(WireError::MissingCrlf);
                    }
                    pos += 1;
                    self.consumer.add_bulk_string(&self.bulk);
                    self.bulk.clear();
                    self.state = State::ExpectType;
                }
                State::Failed => return Err(WireError::Poisoned),
            }
        }
        Ok(())
    }

    fn begin_token(&mut self, kind: TokenKind) -> Result<(), WireError> {
        if kind == TokenKind::BulkLen && (self.param.is_some() || self.timestamp.is_some()) {
            return Err(WireError::UnexpectedField {
                expected: "integer or float field",
                got: "bulk string",
            });
        }
        self.scratch.clear();
        self.state = State::Token(kind);
        Ok(())
    }

    fn accept_token_byte(&mut self, kind: TokenKind, b: u8) -> Result<(), WireError> {
        let valid = match kind {
            TokenKind::Integer | TokenKind::BulkLen => b.is_ascii_digit(),
            TokenKind::Float => {
                matches!(b, b'0'..=b'9' | b'+' | b'-' | b'.' | b'e' | b'E')
            }
        };
        if !valid || self.scratch.len() >= MAX_TOKEN_LEN {
            return Err(malformed(kind));
        }
        self.scratch.push(b);
        Ok(())
    }

    fn finish_token(&mut self, kind: TokenKind) -> Result<(), WireError> {
        match kind {
            TokenKind::Integer => {
                let n = parse_u64(&self.scratch).ok_or(WireError::BadInteger)?;
                if self.param.is_none() {
                    self.param = Some(n);
                } else if self.timestamp.is_none() {
                    self.timestamp = Some(n);
                } else {
                    return Err(WireError::UnexpectedField {
                        expected: "float value field",
                        got: "integer",
                    });
                }
                self.state = State::ExpectType;
            }
            TokenKind::Float => {
                let text = std::str::from_utf8(&self.scratch).map_err(|_| WireError::BadFloat)?;
                let value: f64 = text.parse().map_err(|_| WireError::BadFloat)?;
                let (Some(param), Some(timestamp)) = (self.param.take(), self.timestamp.take())
                else {
                    return Err(WireError::UnexpectedField {
                        expected: "integer field",
                        got: "float",
                    });
                };
                self.consumer.write_double(param, timestamp, value);
                self.state = State::ExpectType;
            }
            TokenKind::BulkLen => {
                let len = parse_u64(&self.scratch).ok_or(WireError::BadBulkLength)? as usize;
                if len > MAX_BULK_SIZE {
                    return Err(WireError::BulkOverflow {
                        size: len,
                        max: MAX_BULK_SIZE,
                    });
                }
                self.bulk.clear();
                self.state = if len == 0 {
                    State::BulkCr
                } else {
                    State::BulkBody { remaining: len }
                };
            }
        }
        Ok(())
    }
}

fn malformed(kind: TokenKind) -> WireError {
    match kind {
        TokenKind::Integer => WireError::BadInteger,
        TokenKind::Float => WireError::BadFloat,
        TokenKind::BulkLen => WireError::BadBulkLength,
    }
}

/// Digits-only u64 parse; `None` on empty input or overflow.
fn parse_u64(digits: &[u8]) -> Option<u64> {
    if digits.is_empty() {
        return None;
    }
    let mut n: u64 = 0;
    for &d in digits {
        n = n.checked_mul(10)?.checked_add((d - b'0') as u64)?;
    }
    Some(n)
}
