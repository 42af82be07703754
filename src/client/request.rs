//! The per-request protocol state machine.
//!
//! A [`RequestHandle`] is a `(endpoint, ticket)` pair over the endpoint's
//! single reused request slot. The slot itself ([`Slot`]) holds the parser
//! state and the response metadata under construction; every handle
//! operation validates its ticket against the slot generation first, so a
//! handle held across a yield point can never act on a newer request.

use core::fmt;
use core::fmt::Write;

use heapless::String;

use crate::client::endpoint::Endpoint;
use crate::client::response::Response;
use crate::error::Error;
use crate::stream::ByteStream;
use crate::time::{Clock, Delay};

/// Capacity of the status/header line accumulator. Longer lines keep their
/// framing; bytes past the capacity are dropped.
pub(crate) const MAX_LINE_LEN: usize = 256;
/// Capacity for the status reason phrase and failure reasons.
pub(crate) const MAX_REASON_LEN: usize = 64;
/// Capacity for the `Content-Type` value.
pub(crate) const MAX_TYPE_LEN: usize = 64;
/// Deadline applied to every request unless overridden; 0 disables it.
pub(crate) const DEFAULT_TIMEOUT_MS: u32 = 1000;

/// Callback invoked with the parsed response on success or failure.
///
/// Returning `Err` from a success callback reroutes the request through the
/// failure path before it finalizes, so a fault inside user code can never
/// leave the slot locked. Callbacks must not call back into the endpoint;
/// a `poll` from inside one is a harmless no-op, anything else is ignored.
pub type ResponseCallback<S> = fn(&mut Response<'_, S>) -> Result<(), Error>;

/// Callback invoked when the request deadline passes without a response.
pub type TimeoutCallback = fn();

/// Protocol state of the request occupying the endpoint slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No request occupies the slot.
    Idle,
    /// Slot acquired, request line not yet written.
    Armed,
    /// Request line written; headers may still be appended.
    Incomplete,
    /// Fired; waiting for the status line.
    AwaitResponse,
    /// Status line parsed; consuming header fields.
    ReadingHeader,
    /// Headers done; the body callback fires from here.
    ReadingContent,
    /// Connection establishment failed before any bytes were written; the
    /// failure callback fires on the next `fire` or `poll`.
    PreFailed,
    /// Terminal: response delivered with status < 400.
    Completed,
    /// Terminal: failed, cancelled or timed out.
    Failed,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Status {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Status::Idle => defmt::write!(f, "Idle"),
            Status::Armed => defmt::write!(f, "Armed"),
            Status::Incomplete => defmt::write!(f, "Incomplete"),
            Status::AwaitResponse => defmt::write!(f, "AwaitResponse"),
            Status::ReadingHeader => defmt::write!(f, "ReadingHeader"),
            Status::ReadingContent => defmt::write!(f, "ReadingContent"),
            Status::PreFailed => defmt::write!(f, "PreFailed"),
            Status::Completed => defmt::write!(f, "Completed"),
            Status::Failed => defmt::write!(f, "Failed"),
        }
    }
}

/// Response metadata filled in as header lines are parsed.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResponseMeta {
    pub status_code: u16,
    pub status_message: String<MAX_REASON_LEN>,
    pub content_type: String<MAX_TYPE_LEN>,
    pub content_length: u32,
    pub chunked: bool,
}

/// Copy `src` into a fixed-capacity string, dropping what does not fit.
pub(crate) fn copy_truncated<const N: usize>(src: &str) -> String<N> {
    let mut out = String::new();
    for ch in src.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

/// Outcome of one header-parsing step.
pub(crate) enum HeaderStep {
    /// No complete line buffered yet; wait for more bytes.
    NeedMore,
    /// Consumed a line; the caller should step again.
    Progress,
    /// The response cannot be handled; fail with the preset reason.
    Refused,
}

/// The reused request slot: parser state plus callbacks for one generation.
pub(crate) struct Slot<S: ByteStream> {
    pub status: Status,
    pub nonce: u32,
    pub keep_alive: bool,
    pub timeout_ms: u32,
    pub started_at: u64,
    pub line: String<MAX_LINE_LEN>,
    pub response: ResponseMeta,
    pub on_success: Option<ResponseCallback<S>>,
    pub on_failure: Option<ResponseCallback<S>>,
    pub on_timeout: Option<TimeoutCallback>,
}

impl<S: ByteStream> Slot<S> {
    pub fn new() -> Self {
        Self {
            status: Status::Idle,
            nonce: 0,
            keep_alive: false,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            started_at: 0,
            line: String::new(),
            response: ResponseMeta::default(),
            on_success: None,
            on_failure: None,
            on_timeout: None,
        }
    }

    /// Prime the slot for a new request generation.
    pub fn reset(&mut self, nonce: u32, keep_alive: bool) {
        self.status = Status::Armed;
        self.nonce = nonce;
        self.keep_alive = keep_alive;
        self.timeout_ms = DEFAULT_TIMEOUT_MS;
        self.started_at = 0;
        self.line.clear();
        self.response = ResponseMeta::default();
        self.on_success = None;
        self.on_failure = None;
        self.on_timeout = None;
    }

    /// Mark the request failed before any exchange; the failure callback
    /// fires on the next `fire` or `poll`.
    pub fn prefail(&mut self, reason: &str) {
        self.response = ResponseMeta::default();
        self.response.status_message = copy_truncated(reason);
        self.status = Status::PreFailed;
    }

    /// Accumulate stream bytes into `self.line` until a `\n` is consumed.
    /// `Ok(true)` when a complete line (without its terminator) is buffered.
    /// Accepts bare `\n`; `\r` is never stored.
    fn take_line(&mut self, stream: &mut S) -> Result<bool, Error> {
        while stream.available() > 0 {
            let mut byte = [0u8; 1];
            match stream.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => match byte[0] {
                    b'\n' => return Ok(true),
                    b'\r' => {}
                    other => {
                        // keep the framing even if the line overflows
                        let _ = self.line.push(other as char);
                    }
                },
                Err(_) => return Err(Error::ReadError),
            }
        }
        Ok(false)
    }

    /// Drive one step of status-line or header parsing.
    pub fn step_header(&mut self, stream: &mut S) -> HeaderStep {
        match self.status {
            Status::AwaitResponse => match self.take_line(stream) {
                Err(_) => self.refuse("stream read failed"),
                Ok(false) => HeaderStep::NeedMore,
                Ok(true) => {
                    if let Some((minor, code, reason)) = parse_status_line(self.line.as_str()) {
                        self.response.status_code = code;
                        self.response.status_message = copy_truncated(reason);
                        if minor == 0 {
                            // HTTP/1.0 peers close after the exchange
                            self.keep_alive = false;
                        }
                        self.status = Status::ReadingHeader;
                    }
                    // an unparseable line is consumed and the state kept, so
                    // a later retransmission can still complete the request
                    self.line.clear();
                    HeaderStep::Progress
                }
            },
            Status::ReadingHeader => {
                if self.line.is_empty() {
                    // blank line means the content starts
                    if stream.peek() == Some(b'\r') {
                        let mut byte = [0u8; 1];
                        let _ = stream.read(&mut byte);
                    }
                    if stream.peek() == Some(b'\n') {
                        let mut byte = [0u8; 1];
                        let _ = stream.read(&mut byte);
                        self.status = Status::ReadingContent;
                        return HeaderStep::Progress;
                    }
                }
                match self.take_line(stream) {
                    Err(_) => self.refuse("stream read failed"),
                    Ok(false) => HeaderStep::NeedMore,
                    Ok(true) => {
                        let step = self.parse_header_line();
                        self.line.clear();
                        step
                    }
                }
            }
            _ => HeaderStep::NeedMore,
        }
    }

    /// Interpret one complete header line buffered in `self.line`.
    fn parse_header_line(&mut self) -> HeaderStep {
        let raw = self.line.trim();
        if raw.is_empty() {
            self.status = Status::ReadingContent;
            return HeaderStep::Progress;
        }
        let Some((key, value)) = raw.split_once(':') else {
            return HeaderStep::Progress;
        };
        let key = key.trim();
        let value = value.trim();
        if key.eq_ignore_ascii_case("Content-Length") {
            self.response.content_length = value.parse().unwrap_or(0);
        } else if key.eq_ignore_ascii_case("Content-Type") {
            self.response.content_type = copy_truncated(value);
        } else if key.eq_ignore_ascii_case("Transfer-Encoding") {
            // only chunked framing is decodable here; anything else would
            // desynchronize the body cursor
            if value == "chunked" {
                self.response.chunked = true;
            } else {
                let mut reason: String<MAX_REASON_LEN> = String::new();
                let _ = write!(reason, "unsupported Transfer-Encoding: {value}");
                self.response = ResponseMeta::default();
                self.response.status_message = reason;
                return HeaderStep::Refused;
            }
        }
        HeaderStep::Progress
    }

    fn refuse(&mut self, reason: &str) -> HeaderStep {
        self.response = ResponseMeta::default();
        self.response.status_message = copy_truncated(reason);
        HeaderStep::Refused
    }
}

/// Parse `HTTP/1.<minor> <code> <reason>`. `None` when the line does not
/// carry a status code yet.
fn parse_status_line(line: &str) -> Option<(u8, u16, &str)> {
    let rest = line.trim_start().strip_prefix("HTTP/1.")?;
    let mut parts = rest.splitn(3, ' ');
    let minor: u8 = parts.next()?.trim().parse().ok()?;
    let code: u16 = parts.next()?.trim().parse().ok()?;
    let reason = parts.next().unwrap_or("").trim();
    if code == 0 {
        return None;
    }
    Some((minor, code, reason))
}

/// A handle onto the endpoint's request slot for one ticket generation.
///
/// Builder methods are fluent and tolerate stale tickets by doing nothing;
/// `poll` on a stale handle reports `true` because that generation is done.
pub struct RequestHandle<'a, S: ByteStream, C: Clock, D: Delay> {
    pub(crate) endpoint: &'a Endpoint<S, C, D>,
    pub(crate) ticket: crate::client::endpoint::Ticket,
}

impl<S: ByteStream, C: Clock, D: Delay> RequestHandle<'_, S, C, D> {
    /// Register the callback for responses with status < 400.
    pub fn on_success(&self, callback: ResponseCallback<S>) -> &Self {
        if self.endpoint.slot_matches(self.ticket) {
            self.endpoint.with_slot_mut(|slot| slot.on_success = Some(callback));
        }
        self
    }

    /// Register the callback for failures: connect errors, protocol
    /// violations, cancellation and responses with status >= 400.
    pub fn on_failure(&self, callback: ResponseCallback<S>) -> &Self {
        if self.endpoint.slot_matches(self.ticket) {
            self.endpoint.with_slot_mut(|slot| slot.on_failure = Some(callback));
        }
        self
    }

    /// Register the callback invoked when the deadline passes.
    pub fn on_timeout(&self, callback: TimeoutCallback) -> &Self {
        if self.endpoint.slot_matches(self.ticket) {
            self.endpoint.with_slot_mut(|slot| slot.on_timeout = Some(callback));
        }
        self
    }

    /// Override the response deadline in milliseconds. 0 disables it.
    pub fn with_timeout(&self, timeout_ms: u32) -> &Self {
        if self.endpoint.slot_matches(self.ticket) {
            self.endpoint.with_slot_mut(|slot| slot.timeout_ms = timeout_ms);
        }
        self
    }

    /// Write one header line to the stream immediately.
    ///
    /// Only valid between the request line and the terminator, so this is a
    /// no-op unless the request is [`Status::Incomplete`].
    pub fn add_header(&self, key: &str, value: &str) -> &Self {
        if !self.endpoint.slot_matches(self.ticket) {
            return self;
        }
        if self.endpoint.slot_status() != Status::Incomplete {
            return self;
        }
        if self.endpoint.write_header(key, value).is_err() {
            self.endpoint.cancel_slot(self.ticket, "stream write failed");
        }
        self
    }

    /// Terminate the header section and start awaiting the response.
    ///
    /// On a [`Status::PreFailed`] request this synchronously delivers the
    /// failure callback instead; no network I/O is attempted. Idempotent:
    /// firing twice writes the terminator once.
    pub fn fire(&self) -> &Self {
        self.endpoint.fire_slot(self.ticket);
        self
    }

    /// Send a request body: emits `Content-Length`, the header terminator
    /// and the body bytes, then starts awaiting the response.
    pub fn fire_content(&self, body: &[u8]) -> &Self {
        self.endpoint.fire_content_slot(self.ticket, body);
        self
    }

    /// Drive the exchange forward without blocking.
    ///
    /// Drains whatever bytes the stream holds through the parser, delivers
    /// exactly one of the success/failure/timeout callbacks on completion
    /// and releases the endpoint slot. Safe to call from any task at any
    /// time: overlapping polls and polls on an unfired or stale handle
    /// return without effect. Returns `true` once this generation reached a
    /// terminal state.
    pub fn poll(&self) -> bool {
        self.endpoint.poll_slot(self.ticket)
    }

    /// Cooperatively block until the request finishes.
    ///
    /// Calls [`fire`](Self::fire) (idempotent), then alternates
    /// [`poll`](Self::poll) with the injected [`Delay`] until terminal.
    /// Returns immediately if the request was never started.
    pub fn wait(&self) -> Status {
        self.fire();
        loop {
            let status = self.status();
            match status {
                Status::Idle | Status::Armed | Status::Completed | Status::Failed => {
                    return status;
                }
                _ => {}
            }
            if self.poll() {
                return self.status();
            }
            self.endpoint.poll_delay();
        }
    }

    /// Fail the request with the given reason.
    ///
    /// Synchronously invokes the failure callback and releases the slot;
    /// no-op when the request is already terminal or the ticket is stale.
    pub fn cancel(&self, reason: &str) {
        self.endpoint.cancel_slot(self.ticket, reason);
    }

    /// Current protocol state; [`Status::Idle`] when the ticket is stale.
    pub fn status(&self) -> Status {
        if self.endpoint.slot_matches(self.ticket) {
            self.endpoint.slot_status()
        } else {
            Status::Idle
        }
    }

    /// The ticket this handle was issued for.
    pub fn ticket(&self) -> crate::client::endpoint::Ticket {
        self.ticket
    }
}

impl<S: ByteStream, C: Clock, D: Delay> fmt::Debug for RequestHandle<'_, S, C, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("ticket", &self.ticket)
            .field("status", &self.status())
            .finish()
    }
}
