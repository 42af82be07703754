//! The HTTP/1.1 client engine.
//!
//! Three cooperating pieces, mirroring the wire exchange:
//!
//! - [`endpoint::Endpoint`] — the per-host concurrency gatekeeper. Owns the
//!   one connection, issues tickets, serializes request slots across tasks.
//! - [`request::RequestHandle`] — the per-request protocol state machine:
//!   builds the outgoing message and incrementally parses the response.
//! - [`response::Response`] — the read-only view handed to callbacks once
//!   headers are parsed, positioned at the first body byte.

pub mod endpoint;
pub mod request;
pub mod response;
