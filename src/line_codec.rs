//! CRLF line framing shared by the FTP control channel.
//!
//! Accumulates bytes into `\r\n`-terminated command lines, enforcing a
//! maximum line length and decoding as US-ASCII. A line over the limit is
//! reported once and the codec resynchronizes by discarding bytes up to the
//! next CRLF, mirroring `libunftp`'s `FTPCodec`.

use crate::error::CoreError;
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

pub struct LineCodec {
    max_line_length: usize,
    /// Set while resynchronizing after a too-long line: bytes are discarded
    /// until the next CRLF, and no further `LineTooLong` is raised for them.
    discarding: bool,
}

impl LineCodec {
    pub fn new(max_line_length: usize) -> Self {
        LineCodec {
            max_line_length,
            discarding: false,
        }
    }
}

impl Decoder for LineCodec {
    type Item = Result<String, CoreError>;
    type Error = CoreError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let newline_pos = buf.iter().position(|b| *b == b'\n');
            match newline_pos {
                None => {
                    if !self.discarding && buf.len() > self.max_line_length {
                        self.discarding = true;
                        return Ok(Some(Err(CoreError::LineTooLong(self.max_line_length))));
                    }
                    return Ok(None);
                }
                Some(pos) => {
                    let was_discarding = self.discarding;
                    self.discarding = false;
                    let mut line = buf.split_to(pos + 1);
                    line.truncate(line.len() - 1);
                    if line.last() == Some(&b'\r') {
                        line.truncate(line.len() - 1);
                    }
                    if was_discarding {
                        continue;
                    }
                    if line.len() > self.max_line_length {
                        return Ok(Some(Err(CoreError::LineTooLong(self.max_line_length))));
                    }
                    return match String::from_utf8(line.to_vec()) {
                        Ok(s) if s.is_ascii() => Ok(Some(Ok(s))),
                        _ => Ok(Some(Err(CoreError::IllegalCharacters))),
                    };
                }
            }
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = CoreError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len() + 2);
        dst.extend_from_slice(item.as_bytes());
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}
