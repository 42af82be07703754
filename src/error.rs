//! Common error type for the client engine.

/// Errors surfaced by the client engine.
///
/// The set is deliberately small and portable for `no_std` environments.
/// Protocol-level failures that reach a user callback (connect refusal,
/// unsupported transfer encoding, cancellation) are reported through the
/// failure callback's [`Response`](crate::Response) reason string instead,
/// matching how the wire metadata itself is delivered.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// The endpoint slot could not be acquired within the given timeout.
    Busy,
    /// The transport failed to establish a connection.
    ConnectFailed,
    /// An error occurred during a write operation.
    WriteError,
    /// An error occurred during a read operation.
    ReadError,
    /// A fixed-capacity buffer was too small for a framing-relevant value.
    Overflow,
    /// The peer sent data that violates the expected HTTP framing.
    ProtocolError,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Busy => defmt::write!(f, "Busy"),
            Error::ConnectFailed => defmt::write!(f, "ConnectFailed"),
            Error::WriteError => defmt::write!(f, "WriteError"),
            Error::ReadError => defmt::write!(f, "ReadError"),
            Error::Overflow => defmt::write!(f, "Overflow"),
            Error::ProtocolError => defmt::write!(f, "ProtocolError"),
        }
    }
}
