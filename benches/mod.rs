use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tickethttp::{ByteStream, Clock, Delay, Endpoint, Error, Remote, Response};

const BODY_LEN: usize = 4096;

#[derive(Default)]
struct Buffers {
    incoming: VecDeque<u8>,
    connected: bool,
}

#[derive(Clone, Default)]
struct BenchStream(Rc<RefCell<Buffers>>);

impl BenchStream {
    fn push(&self, bytes: &[u8]) {
        self.0.borrow_mut().incoming.extend(bytes.iter().copied());
    }
}

impl ByteStream for BenchStream {
    type Error = ();

    fn connect(&mut self, _host: &str, _port: u16) -> Result<(), Self::Error> {
        self.0.borrow_mut().connected = true;
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
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn close(&mut self) {
        let mut inner = self.0.borrow_mut();
        inner.connected = false;
        inner.incoming.clear();
    }
}

struct FixedClock;

impl Clock for FixedClock {
    fn now_ms(&self) -> u64 {
        0
    }
}

struct NoDelay;

impl Delay for NoDelay {
    fn delay_ms(&self, _ms: u32) {}
}

thread_local! {
    static CONSUMED: Cell<usize> = const { Cell::new(0) };
}

fn consume_plain(response: &mut Response<'_, BenchStream>) -> Result<(), Error> {
    let mut buf = [0u8; 512];
    loop {
        let n = response.read(&mut buf)?;
        if n == 0 {
            break;
        }
        CONSUMED.with(|c| c.set(c.get() + n));
    }
    Ok(())
}

fn consume_chunked(response: &mut Response<'_, BenchStream>) -> Result<(), Error> {
    let mut buf = [0u8; 512];
    loop {
        let size = response.next_chunk()?;
        if size == 0 {
            return Ok(());
        }
        let mut left = size;
        while left > 0 {
            let want = left.min(buf.len());
            let n = response.read(&mut buf[..want])?;
            if n == 0 {
                return Ok(());
            }
            CONSUMED.with(|c| c.set(c.get() + n));
            left -= n;
        }
    }
}

type BenchEndpoint = Endpoint<BenchStream, FixedClock, NoDelay>;

fn setup() -> (BenchEndpoint, BenchStream) {
    let stream = BenchStream::default();
    let remote = Remote::new("bench.local", 80).unwrap();
    let endpoint = Endpoint::new(stream.clone(), FixedClock, NoDelay, remote);
    (endpoint, stream)
}

fn random_body(len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..len).map(|_| rng.gen_range(b'a'..=b'z')).collect()
}

fn plain_wire(body: &[u8]) -> Vec<u8> {
    let mut wire = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    wire.extend_from_slice(body);
    wire
}

fn chunked_wire(body: &[u8]) -> Vec<u8> {
    let mut wire =
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
    for chunk in body.chunks(256) {
        wire.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        wire.extend_from_slice(chunk);
        wire.extend_from_slice(b"\r\n");
    }
    wire.extend_from_slice(b"0\r\n\r\n");
    wire
}

pub fn bench_parse_response(c: &mut Criterion) {
    let body = random_body(BODY_LEN);
    let wire = plain_wire(&body);
    let mut group = c.benchmark_group("parse_response");
    group.throughput(Throughput::Bytes(wire.len() as u64));
    group.bench_function("content_length_4k", |b| {
        b.iter_batched(
            setup,
            |(endpoint, stream)| {
                let ticket = endpoint.acquire(10).unwrap();
                let request = endpoint.get("/bench", ticket);
                request.on_success(consume_plain).with_timeout(0).fire();
                stream.push(&wire);
                assert!(request.poll());
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

pub fn bench_decode_chunked(c: &mut Criterion) {
    let body = random_body(BODY_LEN);
    let wire = chunked_wire(&body);
    let mut group = c.benchmark_group("decode_chunked");
    group.throughput(Throughput::Bytes(wire.len() as u64));
    group.bench_function("chunked_4k", |b| {
        b.iter_batched(
            setup,
            |(endpoint, stream)| {
                let ticket = endpoint.acquire(10).unwrap();
                let request = endpoint.get("/bench", ticket);
                request.on_success(consume_chunked).with_timeout(0).fire();
                stream.push(&wire);
                assert!(request.poll());
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(benches, bench_parse_response, bench_decode_chunked);
criterion_main!(benches);
