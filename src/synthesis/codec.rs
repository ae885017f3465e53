use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::synthesis::{BuildMessage, SynthesisError};

/// Newline-delimited JSON framing for build messages.
///
/// Serialized JSON never contains a raw newline, so one line is one message
/// no matter how the transport splits the bytes.
#[derive(Debug, Clone, Default)]
pub struct BuildMessageCodec {
    // Bytes already scanned for a newline in the current buffer
    scanned: usize,
}

impl BuildMessageCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// One framed message, newline included
    pub fn encode_line(message: &BuildMessage) -> Result<Bytes, SynthesisError> {
        let mut buf = BytesMut::new();
        Self::new().encode(message, &mut buf)?;
        Ok(buf.freeze())
    }

    fn parse(line: &[u8]) -> Result<Option<BuildMessage>, SynthesisError> {
        if line.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(line)?))
    }
}

impl Decoder for BuildMessageCodec {
    type Item = BuildMessage;
    type Error = SynthesisError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(offset) = src[self.scanned..].iter().position(|b| *b == b'\n') else {
                self.scanned = src.len();
                return Ok(None);
            };

            let line = src.split_to(self.scanned + offset + 1);
            self.scanned = 0;
            if let Some(message) = Self::parse(&line[..line.len() - 1])? {
                return Ok(Some(message));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        // A final message without its trailing newline
        let rest = src.split();
        self.scanned = 0;
        Self::parse(&rest)
    }
}

impl Encoder<&BuildMessage> for BuildMessageCodec {
    type Error = SynthesisError;

    fn encode(&mut self, item: &BuildMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        serde_json::to_writer(dst.writer(), item)?;
        dst.put_u8(b'\n');
        Ok(())
    }
}
