//! The read-only response view handed to callbacks.

use heapless::String;

use crate::client::request::{MAX_REASON_LEN, MAX_TYPE_LEN, ResponseMeta};
use crate::error::Error;
use crate::stream::ByteStream;

/// Capacity of the chunk-size line accumulator: hex length plus extensions.
const MAX_CHUNK_LINE_LEN: usize = 16;

/// A parsed response, positioned at the first body byte.
///
/// Borrows the endpoint's stream for the duration of one callback; the body
/// is read directly off the wire, never buffered by the engine. For chunked
/// transfers, alternate [`next_chunk`](Self::next_chunk) and
/// [`read`](Self::read); for plain bodies read up to
/// [`content_length`](Self::content_length) bytes.
pub struct Response<'a, S: ByteStream> {
    meta: ResponseMeta,
    line: String<MAX_CHUNK_LINE_LEN>,
    stream: &'a mut S,
}

impl<'a, S: ByteStream> Response<'a, S> {
    pub(crate) fn from_parts(meta: ResponseMeta, stream: &'a mut S) -> Self {
        Self {
            meta,
            line: String::new(),
            stream,
        }
    }

    /// The HTTP status code, or 0 when the request failed before a response
    /// arrived.
    pub fn status_code(&self) -> u16 {
        self.meta.status_code
    }

    /// The reason phrase, or the engine's failure reason when no response
    /// arrived ("failed to connect to server", a cancel reason, ...).
    pub fn status_message(&self) -> &String<MAX_REASON_LEN> {
        &self.meta.status_message
    }

    /// The `Content-Type` value, empty if the header was absent.
    pub fn content_type(&self) -> &String<MAX_TYPE_LEN> {
        &self.meta.content_type
    }

    /// The declared `Content-Length`, 0 if absent or chunked.
    pub fn content_length(&self) -> u32 {
        self.meta.content_length
    }

    /// Whether the body uses chunked transfer encoding.
    pub fn is_chunked(&self) -> bool {
        self.meta.chunked
    }

    /// Bytes currently readable without blocking.
    pub fn available(&self) -> usize {
        self.stream.available()
    }

    /// Size of the next body segment readable right now.
    ///
    /// For plain bodies this is the declared `Content-Length`. For chunked
    /// bodies it decodes the next hex size line, leaving the stream
    /// positioned at the chunk's first data byte; the final `0` chunk ends
    /// the body. `Ok(0)` also means "no complete size line buffered yet" —
    /// with no deadline attached here, callers poll it, they do not spin.
    ///
    /// `Err(Error::ProtocolError)` when a size line is not valid hex; the
    /// stream is desynchronized at that point and the caller should stop
    /// reading.
    pub fn next_chunk(&mut self) -> Result<usize, Error> {
        if !self.meta.chunked {
            return Ok(self.meta.content_length as usize);
        }
        while self.stream.available() > 0 {
            let mut byte = [0u8; 1];
            match self.stream.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => match byte[0] {
                    b'\r' => {}
                    b'\n' => {
                        if self.line.is_empty() {
                            // separator between a chunk's data and the next
                            // size line
                            continue;
                        }
                        let digits = self.line.split(';').next().unwrap_or("").trim();
                        let size = usize::from_str_radix(digits, 16)
                            .map_err(|_| Error::ProtocolError);
                        self.line.clear();
                        return size;
                    }
                    other => {
                        if self.line.push(other as char).is_err() {
                            return Err(Error::ProtocolError);
                        }
                    }
                },
                Err(_) => return Err(Error::ReadError),
            }
        }
        Ok(0)
    }

    /// Read body bytes into `buf`, up to what the stream has buffered.
    ///
    /// Returns the number of bytes copied; 0 when nothing is readable yet.
    /// The caller owns chunk accounting — do not read past the size the
    /// last [`next_chunk`](Self::next_chunk) reported.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let want = self.stream.available().min(buf.len());
        if want == 0 {
            return Ok(0);
        }
        self.stream
            .read(&mut buf[..want])
            .map_err(|_| Error::ReadError)
    }
}

impl<S: ByteStream> core::fmt::Debug for Response<'_, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Response")
            .field("status_code", &self.meta.status_code)
            .field("status_message", &self.meta.status_message.as_str())
            .field("content_type", &self.meta.content_type.as_str())
            .field("content_length", &self.meta.content_length)
            .field("chunked", &self.meta.chunked)
            .finish()
    }
}
