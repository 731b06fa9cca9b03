//! pkt-line framing for git's smart HTTP protocol v2.
//!
//! Unlike an SSH transport, an HTTP response arrives as a single complete
//! body, so this reads against an in-memory buffer rather than polling a
//! subprocess for more bytes.

use core::str::from_utf8;

use crate::error::{Error, Result};

pub enum PacketLine<'a> {
    String(&'a str),
    Bytes(&'a [u8]),
    FlushPacket,
    DelimiterPacket,
}

/// Encodes `lines` into a single pkt-line request body.
pub fn encode(lines: &[PacketLine]) -> Vec<u8> {
    let mut out = Vec::new();

    for line in lines {
        match line {
            PacketLine::String(string) => encode_payload(&mut out, string.as_bytes()),
            PacketLine::Bytes(bytes) => encode_payload(&mut out, bytes),
            PacketLine::FlushPacket => out.extend_from_slice(b"0000"),
            PacketLine::DelimiterPacket => out.extend_from_slice(b"0001"),
        }
    }

    out
}

fn encode_payload(out: &mut Vec<u8>, payload: &[u8]) {
    out.extend_from_slice(format!("{:04x}", payload.len() + 4).as_bytes());
    out.extend_from_slice(payload);
}

/// A single decoded pkt-line: either a flow marker or a line of data.
#[derive(Debug, PartialEq, Eq)]
pub enum PktLine<'a> {
    Flush,
    Delimiter,
    ResponseEnd,
    Data(&'a [u8]),
}

/// Walks an already-received response buffer one pkt-line at a time.
pub struct PktLineReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PktLineReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn next_line(&mut self) -> Result<Option<PktLine<'a>>> {
        if self.pos >= self.buf.len() {
            return Ok(None);
        }

        let header = self
            .buf
            .get(self.pos..self.pos + 4)
            .ok_or_else(|| Error::GitProtocolError("truncated pkt-line length header".into()))?;
        let hex_len = from_utf8(header)
            .map_err(|_| Error::GitProtocolError("non-ascii pkt-line length header".into()))?;
        let len = usize::from_str_radix(hex_len, 16)
            .map_err(|_| Error::GitProtocolError(format!("bad pkt-line length {hex_len:?}")))?;

        self.pos += 4;

        match len {
            0 => Ok(Some(PktLine::Flush)),
            1 => Ok(Some(PktLine::Delimiter)),
            2 => Ok(Some(PktLine::ResponseEnd)),
            len if len < 4 => Err(Error::GitProtocolError(format!(
                "reserved pkt-line length {len}"
            ))),
            len => {
                let data = self
                    .buf
                    .get(self.pos..self.pos + (len - 4))
                    .ok_or_else(|| Error::GitProtocolError("pkt-line shorter than declared".into()))?;
                self.pos += len - 4;
                Ok(Some(PktLine::Data(data)))
            }
        }
    }
}

/// Reads every remaining pkt-line as UTF-8 text, trimmed, stopping at the
/// first flush packet. Used for `ls-refs`-style responses with no sideband.
pub fn read_text_lines(buf: &[u8]) -> Result<Vec<String>> {
    let mut reader = PktLineReader::new(buf);
    let mut lines = Vec::new();

    while let Some(line) = reader.next_line()? {
        match line {
            PktLine::Data(data) => {
                let text = from_utf8(data)
                    .map_err(|_| Error::GitProtocolError("non-utf8 pkt-line".into()))?;
                lines.push(text.trim_end().to_string());
            }
            PktLine::Flush | PktLine::Delimiter | PktLine::ResponseEnd => continue,
        }
    }

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_string_and_flush() {
        let encoded = encode(&[PacketLine::String("command=ls-refs\n"), PacketLine::FlushPacket]);
        assert_eq!(&encoded[..4], b"0015");
        assert!(encoded.ends_with(b"0000"));
    }

    #[test]
    fn reader_round_trips_encoded_lines() {
        let encoded = encode(&[
            PacketLine::String("hello\n"),
            PacketLine::DelimiterPacket,
            PacketLine::Bytes(b"world"),
            PacketLine::FlushPacket,
        ]);

        let mut reader = PktLineReader::new(&encoded);
        assert_eq!(reader.next_line().unwrap(), Some(PktLine::Data(b"hello\n")));
        assert_eq!(reader.next_line().unwrap(), Some(PktLine::Delimiter));
        assert_eq!(reader.next_line().unwrap(), Some(PktLine::Data(b"world")));
        assert_eq!(reader.next_line().unwrap(), Some(PktLine::Flush));
        assert_eq!(reader.next_line().unwrap(), None);
    }

    #[test]
    fn read_text_lines_trims_trailing_newline() {
        let encoded = encode(&[PacketLine::String("version 2\n"), PacketLine::FlushPacket]);
        let lines = read_text_lines(&encoded).unwrap();
        assert_eq!(lines, vec!["version 2".to_string()]);
    }

    #[test]
    fn rejects_reserved_length() {
        let mut reader = PktLineReader::new(b"0003");
        assert!(matches!(reader.next_line(), Err(Error::GitProtocolError(_))));
    }
}
