//! # tickethttp - shared-connection HTTP/1.1 client for embedded devices
//!
//! An asynchronous HTTP/1.1 client engine for resource-constrained,
//! cooperatively-scheduled systems. One [`Endpoint`] owns exactly one
//! connection to one remote host and serializes requests from any number of
//! cooperative tasks through a single-slot lock. The response is parsed
//! incrementally as bytes trickle in, so a request can be driven from a
//! timer task with repeated non-blocking [`RequestHandle::poll`] calls, or
//! synchronously with [`RequestHandle::wait`].
//!
//! ## Design
//!
//! - **No allocation**: the single request slot is reused in place; all
//!   buffers are fixed-capacity [`heapless`] types.
//! - **Tickets**: every `acquire` bumps a generation counter and every
//!   handle operation validates its [`Ticket`] against it, so a stale handle
//!   held across a yield point can never corrupt a newer request.
//! - **Transport agnostic**: the engine drives any [`ByteStream`]; clock and
//!   cooperative yield are injected through [`Clock`] and [`Delay`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tickethttp::{ByteStream, Clock, Delay, Endpoint, Error, Remote, Response};
//! # struct Socket;
//! # impl ByteStream for Socket {
//! #     type Error = ();
//! #     fn connect(&mut self, _host: &str, _port: u16) -> Result<(), Self::Error> { Ok(()) }
//! #     fn connected(&self) -> bool { true }
//! #     fn available(&self) -> usize { 0 }
//! #     fn peek(&self) -> Option<u8> { None }
//! #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
//! #     fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> { Ok(buf.len()) }
//! #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! #     fn close(&mut self) {}
//! # }
//! # struct Ticks;
//! # impl Clock for Ticks { fn now_ms(&self) -> u64 { 0 } }
//! # struct Yielder;
//! # impl Delay for Yielder { fn delay_ms(&self, _ms: u32) {} }
//!
//! fn on_ok(response: &mut Response<'_, Socket>) -> Result<(), Error> {
//!     let mut body = [0u8; 256];
//!     let n = response.read(&mut body)?;
//!     // use &body[..n]
//!     Ok(())
//! }
//!
//! fn run() -> Result<(), Error> {
//!     let remote = Remote::new("api.example.com", 80)?;
//!     let endpoint = Endpoint::new(Socket, Ticks, Yielder, remote);
//!
//!     let ticket = endpoint.acquire(1_000)?;
//!     endpoint
//!         .get("/v1/status", ticket)
//!         .on_success(on_ok)
//!         .with_timeout(2_000)
//!         .fire()
//!         .wait();
//!     Ok(())
//! }
//! ```
//!
//! Any other task may drive the same request concurrently by calling
//! [`RequestHandle::poll`] on its own handle; the poll guard turns
//! overlapping polls into harmless no-ops.
//!
//! ## Optional features
//!
//! - `std`: enable standard library support (default: disabled)
//! - `defmt`: enable defmt formatting for embedded debugging

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

/// Endpoint, request state machine and response view.
pub mod client;

/// Common error type for the client engine.
pub mod error;

/// The transport contract the engine drives.
pub mod stream;

/// Single-slot permits used for slot ownership and poll reentrancy.
pub mod sync;

/// Injected clock and cooperative-yield contracts.
pub mod time;

pub use client::endpoint::{Endpoint, Remote, Ticket};
pub use client::request::{RequestHandle, ResponseCallback, Status, TimeoutCallback};
pub use client::response::Response;
pub use error::Error;
pub use stream::ByteStream;
pub use time::{Clock, Delay};
