//! The per-host concurrency gatekeeper.
//!
//! An [`Endpoint`] owns the single connection to one remote host/port and
//! the single request slot all tasks share. Acquisition hands out a
//! [`Ticket`] — the generation counter that makes the reused slot safe to
//! reference across yield points — and finalization releases the slot for
//! the next caller.

use core::cell::{Cell, RefCell};
use core::fmt;
use core::fmt::Write;

use heapless::String;

use crate::client::request::{
    HeaderStep, MAX_LINE_LEN, RequestHandle, ResponseMeta, Slot, Status, copy_truncated,
};
use crate::client::response::Response;
use crate::error::Error;
use crate::stream::ByteStream;
use crate::sync::Permit;
use crate::time::{Clock, Delay};

/// Capacity for the remote hostname or address literal.
const MAX_HOST_LEN: usize = 64;
/// Yield granularity while spinning on the slot lock.
const ACQUIRE_SPIN_MS: u32 = 1;
/// Yield granularity of the `wait` poll loop.
const POLL_INTERVAL_MS: u32 = 10;
/// Per-`acquire` wait used while self-healing a stale ticket.
const RESYNC_RETRY_MS: u32 = 1000;

/// The remote peer an endpoint talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    /// Hostname or address literal, passed verbatim to the transport.
    pub host: String<MAX_HOST_LEN>,
    /// TCP port.
    pub port: u16,
}

impl Remote {
    /// Build a remote identity; errors if the host does not fit.
    pub fn new(host: &str, port: u16) -> Result<Self, Error> {
        let host = String::try_from(host).map_err(|_| Error::Overflow)?;
        Ok(Self { host, port })
    }
}

/// Generation counter identifying which request currently owns the slot.
///
/// Issued by [`Endpoint::acquire`]; any operation presented with a ticket
/// older than the slot's current generation is rejected (builder calls) or
/// transparently re-synchronized ([`Endpoint::get`]/[`Endpoint::post`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(pub(crate) u32);

impl Ticket {
    /// The raw generation number, for diagnostics.
    pub fn value(&self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Method {
    Get,
    Post,
}

impl Method {
    fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// Which callback a finished exchange routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Success,
    Failure,
}

/// One remote host, one connection, one request in flight.
///
/// Safe to share by reference among cooperative tasks on one scheduler
/// thread; the two internal permits (slot ownership, poll reentrancy)
/// serialize all cross-task interleavings. Not `Sync` — the engine targets
/// cooperative scheduling, not preemptive threads.
pub struct Endpoint<S: ByteStream, C: Clock, D: Delay> {
    remote: Remote,
    keep_alive: Cell<bool>,
    stream: RefCell<S>,
    clock: C,
    delay: D,
    lock: Permit,
    polling: Permit,
    nonce: Cell<u32>,
    slot: RefCell<Slot<S>>,
}

impl<S: ByteStream, C: Clock, D: Delay> Endpoint<S, C, D> {
    /// Create an endpoint over an injected transport, clock and yield hook.
    ///
    /// The stream may be connected or not; `acquire` connects lazily.
    pub fn new(stream: S, clock: C, delay: D, remote: Remote) -> Self {
        Self {
            remote,
            keep_alive: Cell::new(false),
            stream: RefCell::new(stream),
            clock,
            delay,
            lock: Permit::new(),
            polling: Permit::new(),
            nonce: Cell::new(0),
            slot: RefCell::new(Slot::new()),
        }
    }

    /// Keep the connection open across sequential requests.
    ///
    /// Changes the `Connection` header emitted on subsequent requests and
    /// whether finalization closes the stream.
    pub fn set_keep_alive(&self, enabled: bool) {
        self.keep_alive.set(enabled);
    }

    /// Current keep-alive policy.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive.get()
    }

    /// The remote peer this endpoint talks to.
    pub fn remote(&self) -> &Remote {
        &self.remote
    }

    /// Whether a new request could start right away.
    pub fn is_ready(&self) -> bool {
        matches!(
            self.slot.borrow().status,
            Status::Idle | Status::Completed | Status::Failed
        )
    }

    /// Take the request slot, cooperatively waiting up to `timeout_ms`.
    ///
    /// On success the slot is primed ([`Status::Armed`]) for the returned
    /// ticket and the connection is established — or revalidated, draining
    /// stray bytes a previous exchange left behind. A connect failure does
    /// not fail the acquisition: the slot comes back [`Status::PreFailed`]
    /// so the caller's failure callback fires uniformly on `fire`/`poll`.
    ///
    /// `Err(Error::Busy)` when another request holds the slot past the
    /// timeout. Whichever waiter observes the release first wins; there is
    /// no queue among waiters.
    pub fn acquire(&self, timeout_ms: u32) -> Result<Ticket, Error> {
        let deadline = self.clock.now_ms().saturating_add(timeout_ms as u64);
        while !self.lock.try_acquire() {
            if self.clock.now_ms() >= deadline {
                return Err(Error::Busy);
            }
            self.delay.delay_ms(ACQUIRE_SPIN_MS);
        }
        let ticket = Ticket(self.nonce.get().wrapping_add(1));
        self.nonce.set(ticket.0);
        self.slot
            .borrow_mut()
            .reset(ticket.0, self.keep_alive.get());
        if self.prepare_stream().is_err() {
            self.slot.borrow_mut().prefail("failed to connect to server");
        }
        Ok(ticket)
    }

    /// Start a GET request for the ticket's slot.
    ///
    /// A stale ticket self-heals: the call blocks re-acquiring until a
    /// fresh slot is obtained, so callers may simply retry their handle
    /// operations without hand-rolled locking. Writes the request line and
    /// the `Host`/`Accept`/`Connection` headers.
    pub fn get(&self, path: &str, ticket: Ticket) -> RequestHandle<'_, S, C, D> {
        self.begin(Method::Get, path, ticket)
    }

    /// Start a POST request for the ticket's slot. See [`Endpoint::get`].
    pub fn post(&self, path: &str, ticket: Ticket) -> RequestHandle<'_, S, C, D> {
        self.begin(Method::Post, path, ticket)
    }

    /// Explicitly give the slot back.
    ///
    /// Normally implicit in finalization; calling it on a request that
    /// never reached a terminal state cancels it first (its failure
    /// callback fires). `false` when the ticket is stale.
    pub fn release(&self, ticket: Ticket) -> bool {
        if !self.slot_matches(ticket) {
            return false;
        }
        match self.slot_status() {
            Status::Idle | Status::Completed | Status::Failed => true,
            _ => {
                self.cancel_slot(ticket, "released before completion");
                true
            }
        }
    }

    /// Cancel any in-flight request and close the connection unconditionally.
    pub fn close(&self) {
        let (nonce, status) = {
            let slot = self.slot.borrow();
            (slot.nonce, slot.status)
        };
        if !matches!(status, Status::Idle | Status::Completed | Status::Failed) {
            self.cancel_slot(Ticket(nonce), "endpoint closed");
        }
        self.stream.borrow_mut().close();
    }

    fn begin(&self, method: Method, path: &str, ticket: Ticket) -> RequestHandle<'_, S, C, D> {
        let ticket = if self.slot_matches(ticket) {
            ticket
        } else {
            // self-healing re-synchronization: wait for a fresh slot
            loop {
                if let Ok(fresh) = self.acquire(RESYNC_RETRY_MS) {
                    break fresh;
                }
            }
        };
        if self.slot_status() == Status::Armed {
            if self.write_request_head(method, path).is_err() {
                self.slot.borrow_mut().prefail("stream write failed");
            }
        }
        RequestHandle {
            endpoint: self,
            ticket,
        }
    }

    /// Connect the stream, or drain leftovers when reusing a live one.
    fn prepare_stream(&self) -> Result<(), Error> {
        let mut stream = self.stream.borrow_mut();
        if stream.connected() {
            // unread bytes of a previous body would desynchronize this
            // exchange
            let mut sink = [0u8; 32];
            while stream.available() > 0 {
                match stream.read(&mut sink) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            Ok(())
        } else {
            stream
                .connect(self.remote.host.as_str(), self.remote.port)
                .map_err(|_| Error::ConnectFailed)
        }
    }

    fn write_request_head(&self, method: Method, path: &str) -> Result<(), Error> {
        {
            let mut line: String<MAX_LINE_LEN> = String::new();
            write!(line, "{} {} HTTP/1.1\r\n", method.as_str(), path)
                .map_err(|_| Error::Overflow)?;
            self.stream.borrow_mut().write_all(line.as_bytes())?;
        }
        self.slot.borrow_mut().status = Status::Incomplete;
        self.write_header("Host", self.remote.host.as_str())?;
        self.write_header("Accept", "*/*")?;
        self.write_header(
            "Connection",
            if self.keep_alive.get() {
                "keep-alive"
            } else {
                "close"
            },
        )?;
        Ok(())
    }

    pub(crate) fn write_header(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut stream = self.stream.borrow_mut();
        stream.write_all(key.as_bytes())?;
        stream.write_all(b": ")?;
        stream.write_all(value.as_bytes())?;
        stream.write_all(b"\r\n")
    }

    pub(crate) fn slot_matches(&self, ticket: Ticket) -> bool {
        self.slot.borrow().nonce == ticket.0
    }

    pub(crate) fn slot_status(&self) -> Status {
        self.slot.borrow().status
    }

    pub(crate) fn with_slot_mut<R>(&self, f: impl FnOnce(&mut Slot<S>) -> R) -> R {
        f(&mut self.slot.borrow_mut())
    }

    pub(crate) fn poll_delay(&self) {
        self.delay.delay_ms(POLL_INTERVAL_MS);
    }

    /// Terminate the header section; see [`RequestHandle::fire`].
    pub(crate) fn fire_slot(&self, ticket: Ticket) {
        if !self.slot_matches(ticket) {
            return;
        }
        match self.slot_status() {
            Status::PreFailed => {
                self.deliver(Route::Failure);
                self.lock.release();
            }
            Status::Incomplete => {
                let sent = {
                    let mut stream = self.stream.borrow_mut();
                    stream
                        .write_all(b"\r\n")
                        .and_then(|()| stream.flush().map_err(|_| Error::WriteError))
                };
                match sent {
                    Ok(()) => {
                        let mut slot = self.slot.borrow_mut();
                        slot.started_at = self.clock.now_ms();
                        slot.status = Status::AwaitResponse;
                    }
                    Err(_) => self.cancel_slot(ticket, "stream write failed"),
                }
            }
            _ => {}
        }
    }

    /// Send a body; see [`RequestHandle::fire_content`].
    pub(crate) fn fire_content_slot(&self, ticket: Ticket, body: &[u8]) {
        if !self.slot_matches(ticket) {
            return;
        }
        match self.slot_status() {
            Status::PreFailed => {
                self.deliver(Route::Failure);
                self.lock.release();
            }
            Status::Incomplete => {
                let mut length: String<10> = String::new();
                let _ = write!(length, "{}", body.len());
                let sent = self
                    .write_header("Content-Length", length.as_str())
                    .and_then(|()| {
                        let mut stream = self.stream.borrow_mut();
                        stream.write_all(b"\r\n")?;
                        stream.write_all(body)?;
                        stream.flush().map_err(|_| Error::WriteError)
                    });
                match sent {
                    Ok(()) => {
                        let mut slot = self.slot.borrow_mut();
                        slot.started_at = self.clock.now_ms();
                        slot.status = Status::AwaitResponse;
                    }
                    Err(_) => self.cancel_slot(ticket, "stream write failed"),
                }
            }
            _ => {}
        }
    }

    /// Non-blocking advance; see [`RequestHandle::poll`].
    pub(crate) fn poll_slot(&self, ticket: Ticket) -> bool {
        {
            let slot = self.slot.borrow();
            if slot.nonce != ticket.0 {
                // that generation is gone; tell the poller to stop
                return true;
            }
            match slot.status {
                Status::Idle | Status::Armed | Status::Incomplete => return false,
                Status::Completed | Status::Failed => return true,
                _ => {}
            }
        }
        // a concurrent poll is spurious, not an error
        let Some(guard) = self.polling.guard() else {
            return false;
        };
        let finished = self.drive();
        drop(guard);
        if finished {
            self.lock.release();
        }
        finished
    }

    /// Fail the slot with a reason; see [`RequestHandle::cancel`].
    ///
    /// Ignored while a poll is in progress — a callback cancelling its own
    /// request would otherwise re-enter the parser.
    pub(crate) fn cancel_slot(&self, ticket: Ticket, reason: &str) {
        if self.polling.is_held() {
            return;
        }
        if !self.slot_matches(ticket) {
            return;
        }
        if matches!(
            self.slot_status(),
            Status::Idle | Status::Completed | Status::Failed
        ) {
            return;
        }
        {
            let mut slot = self.slot.borrow_mut();
            slot.response = ResponseMeta::default();
            slot.response.status_message = copy_truncated(reason);
        }
        self.deliver(Route::Failure);
        self.lock.release();
    }

    /// Pump the parser until it stalls or the request finalizes.
    fn drive(&self) -> bool {
        loop {
            let status = self.slot.borrow().status;
            match status {
                Status::PreFailed => {
                    self.deliver(Route::Failure);
                    return true;
                }
                Status::AwaitResponse | Status::ReadingHeader => {
                    let step = {
                        let mut slot = self.slot.borrow_mut();
                        let mut stream = self.stream.borrow_mut();
                        slot.step_header(&mut *stream)
                    };
                    match step {
                        HeaderStep::NeedMore => break,
                        HeaderStep::Progress => {}
                        HeaderStep::Refused => {
                            self.deliver(Route::Failure);
                            return true;
                        }
                    }
                }
                Status::ReadingContent => {
                    let available = self.stream.borrow().available();
                    let (content_length, code) = {
                        let slot = self.slot.borrow();
                        (slot.response.content_length, slot.response.status_code)
                    };
                    // a declared empty body completes without further bytes
                    if available == 0 && content_length != 0 {
                        break;
                    }
                    let route = if code >= 400 {
                        Route::Failure
                    } else {
                        Route::Success
                    };
                    self.deliver(route);
                    return true;
                }
                _ => return false,
            }
        }
        let (started_at, timeout_ms) = {
            let slot = self.slot.borrow();
            (slot.started_at, slot.timeout_ms)
        };
        if timeout_ms != 0
            && self.clock.now_ms().saturating_sub(started_at) >= timeout_ms as u64
        {
            let on_timeout = self.slot.borrow().on_timeout;
            if let Some(callback) = on_timeout {
                callback();
            }
            // a dead exchange leaves the stream desynchronized
            self.stream.borrow_mut().close();
            self.slot.borrow_mut().status = Status::Failed;
            return true;
        }
        false
    }

    /// Invoke exactly one terminal callback and finalize the slot.
    fn deliver(&self, route: Route) {
        // already held when called from `drive`; taken here on the fire and
        // cancel paths so callbacks cannot re-enter the parser
        let _guard = self.polling.guard();
        let (on_success, on_failure, meta) = {
            let slot = self.slot.borrow();
            (slot.on_success, slot.on_failure, slot.response.clone())
        };
        let primary = match route {
            Route::Success => on_success,
            Route::Failure => on_failure,
        };
        let outcome = match primary {
            Some(callback) => {
                let mut stream = self.stream.borrow_mut();
                let mut response = Response::from_parts(meta, &mut *stream);
                callback(&mut response)
            }
            None => Ok(()),
        };
        let mut terminal = match route {
            Route::Success => Status::Completed,
            Route::Failure => Status::Failed,
        };
        if route == Route::Success && outcome.is_err() {
            // a fault in the success handler reroutes through the failure
            // path so the slot still finalizes deterministically
            {
                let mut slot = self.slot.borrow_mut();
                slot.response = ResponseMeta::default();
                slot.response.status_message = copy_truncated("success handler fault");
            }
            if let Some(callback) = on_failure {
                let meta = self.slot.borrow().response.clone();
                let mut stream = self.stream.borrow_mut();
                let mut response = Response::from_parts(meta, &mut *stream);
                let _ = callback(&mut response);
            }
            terminal = Status::Failed;
        }
        let keep = self.slot.borrow().keep_alive;
        if !keep {
            self.stream.borrow_mut().close();
        }
        self.slot.borrow_mut().status = terminal;
    }
}

impl<S: ByteStream, C: Clock, D: Delay> fmt::Debug for Endpoint<S, C, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.remote.host.as_str())
            .field("port", &self.remote.port)
            .field("keep_alive", &self.keep_alive.get())
            .field("status", &self.slot.borrow().status)
            .finish()
    }
}
