#![allow(dead_code)]

use cpi_etl::{CanonicalField, Clock, FieldMap, SourceConfig};
use std::cell::{Cell, RefCell};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::rc::Rc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Clock that only moves when slept on or advanced.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Rc<Cell<Duration>>,
    sleeps: Rc<RefCell<Vec<Duration>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
            sleeps: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn advance(&self, d: Duration) {
        self.offset.set(self.offset.get() + d);
    }

    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.offset.get()
    }

    fn sleep(&self, d: Duration) {
        self.sleeps.borrow_mut().push(d);
        self.advance(d);
    }
}

/// Minimal HTTP/1.1 server answering one canned response per connection, in order.
pub struct Stub {
    pub base_url: String,
    handle: JoinHandle<Vec<String>>,
}

impl Stub {
    /// Wait for every canned response to be served and return the raw request heads.
    pub fn requests(self) -> Vec<String> {
        self.handle.join().expect("stub server thread")
    }
}

pub fn serve(responses: Vec<(u16, String)>) -> Stub {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().expect("accept");
            seen.push(read_head(&mut stream));
            let reply = format!(
                "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                if status < 400 { "OK" } else { "Error" },
                body.len()
            );
            stream.write_all(reply.as_bytes()).expect("write reply");
            stream.flush().ok();
        }
        seen
    });
    Stub {
        base_url: format!("http://{addr}"),
        handle,
    }
}

fn read_head(stream: &mut TcpStream) -> String {
    let mut reader = BufReader::new(stream);
    let mut head = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
            break;
        }
        head.push_str(&line);
    }
    head
}

/// An address nothing listens on.
pub fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{addr}")
}

pub fn fields() -> FieldMap {
    FieldMap::new()
        .with(CanonicalField::Date, &["date"])
        .with(CanonicalField::CpiValue, &["value"])
}

pub fn source(name: &str, endpoint: &str) -> SourceConfig {
    let mut cfg = SourceConfig::new(name, endpoint, "CPI", fields());
    cfg.timeout_secs = 5;
    cfg.connect_timeout_secs = 2;
    cfg
}

/// FRED-shaped payload with consecutive monthly observations.
pub fn monthly_payload(start_year: i32, start_month: u32, values: &[f64]) -> String {
    let obs: Vec<serde_json::Value> = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let m0 = (start_month - 1) as i32 + i as i32;
            let year = start_year + m0 / 12;
            let month = m0 % 12 + 1;
            serde_json::json!({
                "realtime_start": "2024-01-01",
                "date": format!("{year:04}-{month:02}-01"),
                "value": v.to_string(),
            })
        })
        .collect();
    serde_json::json!({ "count": obs.len(), "observations": obs }).to_string()
}

/// 100.0, 100.5, 101.0, ...
pub fn rising(n: usize) -> Vec<f64> {
    (0..n).map(|i| 100.0 + 0.5 * i as f64).collect()
}
