//! Shared fixtures: a scripted in-memory transport, a manual clock, and
//! thread-local recorders for the fn-pointer callbacks.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use tickethttp::{ByteStream, Clock, Delay, Endpoint, Error, Remote, Response};

#[derive(Default)]
struct Inner {
    incoming: VecDeque<u8>,
    written: Vec<u8>,
    connected: bool,
    refuse_connect: bool,
    connect_calls: usize,
    close_calls: usize,
}

/// A scripted transport. Cloning shares the underlying buffers, so a test
/// keeps a handle to the same stream the endpoint owns.
#[derive(Clone, Default)]
pub struct MockStream(Rc<RefCell<Inner>>);

impl MockStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes the engine will see as arriving from the peer.
    pub fn push(&self, bytes: &[u8]) {
        self.0.borrow_mut().incoming.extend(bytes.iter().copied());
    }

    /// Everything the engine has written so far.
    pub fn written(&self) -> Vec<u8> {
        self.0.borrow().written.clone()
    }

    pub fn refuse_connect(&self) {
        self.0.borrow_mut().refuse_connect = true;
    }

    pub fn connect_calls(&self) -> usize {
        self.0.borrow().connect_calls
    }

    pub fn close_calls(&self) -> usize {
        self.0.borrow().close_calls
    }

    pub fn is_connected(&self) -> bool {
        self.0.borrow().connected
    }

    pub fn pending(&self) -> usize {
        self.0.borrow().incoming.len()
    }
}

impl ByteStream for MockStream {
    type Error = ();

    fn connect(&mut self, _host: &str, _port: u16) -> Result<(), Self::Error> {
        let mut inner = self.0.borrow_mut();
        inner.connect_calls += 1;
        if inner.refuse_connect {
            return Err(());
        }
        inner.connected = true;
        Ok(())
    }

    fn connected(&self) -> bool {
        self.0.borrow().connected
    }

    fn available(&self) -> usize {
        self.0.borrow().incoming.len()
    }

    fn peek(&self) -> Option<u8> {
        self.0.borrow().incoming.front().copied()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut inner = self.0.borrow_mut();
        let mut n = 0;
        while n < buf.len() {
            match inner.incoming.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.0.borrow_mut().written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn close(&mut self) {
        let mut inner = self.0.borrow_mut();
        inner.close_calls += 1;
        inner.connected = false;
        inner.incoming.clear();
    }
}

/// A manually advanced millisecond clock.
#[derive(Clone, Default)]
pub struct MockClock(Rc<Cell<u64>>);

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }
}

/// A delay that advances the mock clock instead of sleeping, so lock
/// timeouts elapse deterministically.
pub struct TickDelay(pub MockClock);

impl Delay for TickDelay {
    fn delay_ms(&self, ms: u32) {
        self.0.advance(ms as u64);
    }
}

pub type TestEndpoint = Endpoint<MockStream, MockClock, TickDelay>;

pub fn fixture() -> (TestEndpoint, MockStream, MockClock) {
    let stream = MockStream::new();
    let clock = MockClock::new();
    let delay = TickDelay(clock.clone());
    let remote = Remote::new("device.local", 80).unwrap();
    let endpoint = Endpoint::new(stream.clone(), clock.clone(), delay, remote);
    reset_recorders();
    (endpoint, stream, clock)
}

// Callbacks are plain fn pointers, so test observations go through
// thread-locals; libtest runs each test on its own thread.
thread_local! {
    pub static SUCCESS_CALLS: Cell<u32> = const { Cell::new(0) };
    pub static FAILURE_CALLS: Cell<u32> = const { Cell::new(0) };
    pub static TIMEOUT_CALLS: Cell<u32> = const { Cell::new(0) };
    pub static LAST_CODE: Cell<u16> = const { Cell::new(0) };
    pub static LAST_REASON: RefCell<String> = const { RefCell::new(String::new()) };
    pub static LAST_BODY: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
    pub static CHUNK_LOG: RefCell<Vec<Result<usize, Error>>> = const { RefCell::new(Vec::new()) };
}

pub fn reset_recorders() {
    SUCCESS_CALLS.with(|c| c.set(0));
    FAILURE_CALLS.with(|c| c.set(0));
    TIMEOUT_CALLS.with(|c| c.set(0));
    LAST_CODE.with(|c| c.set(0));
    LAST_REASON.with(|r| r.borrow_mut().clear());
    LAST_BODY.with(|b| b.borrow_mut().clear());
    CHUNK_LOG.with(|l| l.borrow_mut().clear());
}

fn record_meta(response: &Response<'_, MockStream>) {
    LAST_CODE.with(|c| c.set(response.status_code()));
    LAST_REASON.with(|r| {
        r.borrow_mut().clear();
        r.borrow_mut().push_str(response.status_message().as_str());
    });
}

pub fn record_success(response: &mut Response<'_, MockStream>) -> Result<(), Error> {
    SUCCESS_CALLS.with(|c| c.set(c.get() + 1));
    record_meta(response);
    record_success_body(response)
}

fn record_success_body(response: &mut Response<'_, MockStream>) -> Result<(), Error> {
    let mut buf = [0u8; 512];
    loop {
        let n = response.read(&mut buf)?;
        if n == 0 {
            break;
        }
        LAST_BODY.with(|b| b.borrow_mut().extend_from_slice(&buf[..n]));
    }
    Ok(())
}

pub fn record_failure(response: &mut Response<'_, MockStream>) -> Result<(), Error> {
    FAILURE_CALLS.with(|c| c.set(c.get() + 1));
    record_meta(response);
    Ok(())
}

pub fn record_timeout() {
    TIMEOUT_CALLS.with(|c| c.set(c.get() + 1));
}

/// A success handler that faults, exercising the reroute-to-failure path.
pub fn failing_success(_response: &mut Response<'_, MockStream>) -> Result<(), Error> {
    SUCCESS_CALLS.with(|c| c.set(c.get() + 1));
    Err(Error::ProtocolError)
}

/// Walks a chunked body, logging every size-line decode.
pub fn record_chunks(response: &mut Response<'_, MockStream>) -> Result<(), Error> {
    SUCCESS_CALLS.with(|c| c.set(c.get() + 1));
    record_meta(response);
    if !response.is_chunked() {
        // a plain body is one segment of content_length bytes
        let next = response.next_chunk();
        CHUNK_LOG.with(|l| l.borrow_mut().push(next));
        return record_success_body(response);
    }
    for _ in 0..16 {
        let next = response.next_chunk();
        CHUNK_LOG.with(|l| l.borrow_mut().push(next));
        match next {
            Ok(0) | Err(_) => break,
            Ok(size) => {
                let mut buf = vec![0u8; size];
                let mut got = 0;
                while got < size {
                    let n = response.read(&mut buf[got..])?;
                    if n == 0 {
                        break;
                    }
                    got += n;
                }
                LAST_BODY.with(|b| b.borrow_mut().extend_from_slice(&buf[..got]));
            }
        }
    }
    Ok(())
}
