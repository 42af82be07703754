//! The transport contract the engine drives.
//!
//! A [`ByteStream`] is an ordered duplex byte channel — typically a TCP or
//! TLS socket, but any transport with connect/read/write/close semantics
//! works. The engine never blocks on it: reads are bounded by
//! [`ByteStream::available`] and writes happen in call order during the
//! request build phase.

use crate::error::Error;

/// An ordered duplex byte channel to one remote peer.
///
/// Implementations must be non-blocking: `read` returns `Ok(0)` when no
/// bytes are pending rather than waiting, and `available` reports how many
/// bytes a read could currently return.
pub trait ByteStream {
    /// Transport-specific error type.
    type Error: core::fmt::Debug;

    /// Establish the connection to the given host (name or address) and port.
    fn connect(&mut self, host: &str, port: u16) -> Result<(), Self::Error>;

    /// Whether the transport currently holds an open connection.
    fn connected(&self) -> bool;

    /// Number of bytes that can be read without blocking.
    fn available(&self) -> usize;

    /// The next readable byte, without consuming it.
    fn peek(&self) -> Option<u8>;

    /// Read up to `buf.len()` pending bytes. `Ok(0)` means none are pending.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write data to the connection, returning how many bytes were accepted.
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;

    /// Flush the write buffer.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Tear the connection down. Must be idempotent.
    fn close(&mut self);

    /// Write the whole buffer, mapping short or failed writes to
    /// [`Error::WriteError`].
    fn write_all(&mut self, mut buf: &[u8]) -> Result<(), Error> {
        while !buf.is_empty() {
            match self.write(buf) {
                Ok(0) => return Err(Error::WriteError),
                Ok(n) => buf = &buf[n..],
                Err(_) => return Err(Error::WriteError),
            }
        }
        Ok(())
    }
}
