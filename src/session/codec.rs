//! Newline framing for the control channel that never fails on content.
//!
//! Over-long lines and lines that are not UTF-8 come out as
//! [`InboundLine::Rejected`] so the connection can drop them and keep reading.
//! Only transport errors end the stream.

use std::io;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineDefect {
    TooLong,
    InvalidUtf8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundLine {
    Text(String),
    Rejected(LineDefect),
}

#[derive(Debug, Clone)]
pub struct ControlLineCodec {
    max_length: usize,
    /// Bytes of `buf` already scanned for a newline.
    next_index: usize,
    discarding: bool,
}

impl ControlLineCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }
}

fn to_line(mut bytes: &[u8]) -> InboundLine {
    if let [rest @ .., b'\r'] = bytes {
        bytes = rest;
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => InboundLine::Text(text.to_string()),
        Err(_) => InboundLine::Rejected(LineDefect::InvalidUtf8),
    }
}

impl Decoder for ControlLineCodec {
    type Item = InboundLine;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<InboundLine>, io::Error> {
        loop {
            let read_to = buf.len().min(self.max_length.saturating_add(1));
            let newline = buf[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n');

            match (self.discarding, newline) {
                (true, Some(offset)) => {
                    buf.advance(self.next_index + offset + 1);
                    self.next_index = 0;
                    self.discarding = false;
                    return Ok(Some(InboundLine::Rejected(LineDefect::TooLong)));
                }
                (true, None) => {
                    buf.advance(read_to);
                    self.next_index = 0;
                    if buf.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(offset)) => {
                    let end = self.next_index + offset;
                    self.next_index = 0;
                    let line = buf.split_to(end + 1);
                    return Ok(Some(to_line(&line[..end])));
                }
                (false, None) if buf.len() > self.max_length => {
                    self.discarding = true;
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<InboundLine>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if self.discarding {
            buf.clear();
            self.discarding = false;
            return Ok(Some(InboundLine::Rejected(LineDefect::TooLong)));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let line = buf.split_to(buf.len());
        Ok(Some(to_line(&line)))
    }
}

impl Encoder<String> for ControlLineCodec {
    type Error = io::Error;

    fn encode(&mut self, line: String, buf: &mut BytesMut) -> Result<(), io::Error> {
        buf.reserve(line.len() + 1);
        buf.put_slice(line.as_bytes());
        buf.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut ControlLineCodec, input: &[u8]) -> Vec<InboundLine> {
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(line) = codec.decode(&mut buf).unwrap() {
            out.push(line);
        }
        out
    }

    #[test]
    fn test_splits_lines_and_strips_cr() {
        let mut codec = ControlLineCodec::new(64);
        assert_eq!(
            decode_all(&mut codec, b"NAME_ENTERED:A\r\n\nAGE_ENTERED:3"),
            vec![InboundLine::Text("NAME_ENTERED:A".into()), InboundLine::Text(String::new())]
        );
    }

    #[test]
    fn test_invalid_utf8_rejected_then_resumes() {
        let mut codec = ControlLineCodec::new(64);
        assert_eq!(
            decode_all(&mut codec, b"NAME_ENTERED:\xff\xfe\nNAME_ENTERED:Alice\n"),
            vec![
                InboundLine::Rejected(LineDefect::InvalidUtf8),
                InboundLine::Text("NAME_ENTERED:Alice".into()),
            ]
        );
    }

    #[test]
    fn test_long_line_discarded_across_reads() {
        let mut codec = ControlLineCodec::new(16);
        let mut buf = BytesMut::from(&[b'x'; 40][..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(&[b'y'; 40]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"zz\nHEART_RATE:90\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(InboundLine::Rejected(LineDefect::TooLong))
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(InboundLine::Text("HEART_RATE:90".into()))
        );
    }

    #[test]
    fn test_line_at_max_length_accepted() {
        let mut codec = ControlLineCodec::new(4);
        assert_eq!(
            decode_all(&mut codec, b"abcd\nabcde\nok\n"),
            vec![
                InboundLine::Text("abcd".into()),
                InboundLine::Rejected(LineDefect::TooLong),
                InboundLine::Text("ok".into()),
            ]
        );
    }

    #[test]
    fn test_eof_flushes_partial_line() {
        let mut codec = ControlLineCodec::new(64);
        let mut buf = BytesMut::from(&b"SESSION_END:"[..]);
        assert_eq!(
            codec.decode_eof(&mut buf).unwrap(),
            Some(InboundLine::Text("SESSION_END:".into()))
        );
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_encode_appends_newline() {
        let mut codec = ControlLineCodec::new(64);
        let mut buf = BytesMut::new();
        codec.encode("SESSION_START:".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"SESSION_START:\n");
    }
}
