//! Newline-delimited JSON framing.
//!
//! One UTF-8 JSON message per `\n`-terminated line. Wraps
//! [`LinesCodec`] with a hard maximum line length so an unterminated or
//! hostile stream cannot grow the read buffer without bound.

use bytes::BytesMut;
use std::io;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

/// Initial read-buffer capacity: 1 MiB.
pub const INITIAL_LINE_BYTES: usize = 1024 * 1024;

/// Hard per-line limit: 10 MiB. Longer lines surface as an error to the
/// reader loop, which treats them as a fatal framing failure.
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

/// Codec for `\n`-delimited JSON lines with a bounded line size.
#[derive(Debug)]
pub struct NdjsonCodec(LinesCodec);

impl NdjsonCodec {
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for NdjsonCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for NdjsonCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<String>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<String>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

impl Encoder<String> for NdjsonCodec {
    type Error = io::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> io::Result<()> {
        self.0.encode(item, dst).map_err(map_codec_error)
    }
}

fn map_codec_error(err: LinesCodecError) -> io::Error {
    match err {
        LinesCodecError::MaxLineLengthExceeded => io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line exceeds {MAX_LINE_BYTES} bytes"),
        ),
        LinesCodecError::Io(io_err) => io_err,
    }
}
