//! Tokio HTTP/1.1 server guarded by the admission gate
//!
//! Every request except `/health` and `/metrics` goes through the gate;
//! denied requests get `503 Service Unavailable` without further work.
//!
//! Usage:
//!     ./target/release/shed-httpd [--port 8080] [--enable] [--threshold 80] [--burn-us 0]
//!
//! `--burn-us` spins the CPU for that long per request, to push the
//! process over its threshold under load:
//!
//!     wrk -t4 -c100 -d30s http://127.0.0.1:8080/work
//!     curl http://127.0.0.1:8080/metrics
//!
//! # Environment Variables
//!
//! - `SHED_ENABLED`, `SHED_CPU_THRESHOLD`, `SHED_PROBE_API` - gate defaults
//! - `SHED_HTTPD_PORT` - listen port
//! - `SHED_LOG_LEVEL=debug` - log level (off, error, warn, info, debug, trace)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use shedder::{
    env_get, shed_error, shed_info, Admission, AdmissionGate, GateConfig, LoadShedder,
    MetricsSink, PrometheusSink,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const HELLO_BODY: &[u8] = b"Hello from shed-httpd!\n";
const METRICS_PATH: &str = "/metrics";

struct Stats {
    requests: AtomicU64,
    shed: AtomicU64,
    errors: AtomicU64,
}

impl Stats {
    fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            shed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }
}

struct Server {
    gate: AdmissionGate,
    sink: Arc<PrometheusSink>,
    health_path: String,
    burn: Duration,
    stats: Stats,
}

fn make_response(status: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
    let header = format!(
        "HTTP/1.1 {}\r\n\
         Content-Type: {}\r\n\
         Content-Length: {}\r\n\
         Connection: keep-alive\r\n\
         Server: shed-httpd\r\n\
         \r\n",
        status,
        content_type,
        body.len()
    );
    let mut resp = header.into_bytes();
    resp.extend_from_slice(body);
    resp
}

/// Extract path from "GET /path HTTP/1.1\r\n..."
fn parse_path(buf: &[u8]) -> &str {
    let line_end = buf.iter().position(|&b| b == b'\r').unwrap_or(buf.len());
    std::str::from_utf8(&buf[..line_end])
        .ok()
        .and_then(|line| line.split(' ').nth(1))
        .map(|target| target.split('?').next().unwrap_or(target))
        .unwrap_or("/")
}

fn burn_cpu(duration: Duration) {
    let start = Instant::now();
    let mut x = 0u64;
    while start.elapsed() < duration {
        x = std::hint::black_box(x.wrapping_mul(6364136223846793005).wrapping_add(1));
    }
}

impl Server {
    async fn respond(&self, path: &str) -> Vec<u8> {
        if path == self.health_path {
            return make_response("200 OK", "text/plain", b"ok\n");
        }
        if path == METRICS_PATH {
            let body = self.sink.render();
            return make_response("200 OK", "text/plain; version=0.0.4", body.as_bytes());
        }

        match self.gate.admit(path) {
            Admission::Deny => {
                self.stats.shed.fetch_add(1, Ordering::Relaxed);
                make_response("503 Service Unavailable", "text/plain", b"")
            }
            Admission::Allow => {
                if !self.burn.is_zero() {
                    let burn = self.burn;
                    let _ = tokio::task::spawn_blocking(move || burn_cpu(burn)).await;
                }
                make_response("200 OK", "text/plain", HELLO_BODY)
            }
        }
    }
}

async fn handle_client(mut stream: TcpStream, server: Arc<Server>) {
    let _ = stream.set_nodelay(true);

    let mut buf = [0u8; 4096];
    let mut pos = 0usize;

    loop {
        let n = match stream.read(&mut buf[pos..]).await {
            Ok(0) => return,
            Ok(n) => n,
            Err(_) => {
                server.stats.errors.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        pos += n;

        let header_end = match buf[..pos].windows(4).position(|w| w == b"\r\n\r\n") {
            Some(p) => p + 4,
            None => {
                if pos >= buf.len() {
                    return;
                }
                continue;
            }
        };

        server.stats.requests.fetch_add(1, Ordering::Relaxed);
        let response = server.respond(parse_path(&buf[..header_end])).await;

        if stream.write_all(&response).await.is_err() {
            server.stats.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }

        // Keep-alive: reset for next request
        pos = 0;
    }
}

fn parse_args(mut port: u16, mut config: GateConfig) -> (u16, GateConfig, Duration) {
    let args: Vec<String> = std::env::args().collect();
    let mut burn = Duration::ZERO;

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).map(String::as_str);
        match (args[i].as_str(), value) {
            ("--port" | "-p", Some(v)) => {
                port = v.parse().unwrap_or(port);
                i += 1;
            }
            ("--threshold" | "-t", Some(v)) => {
                let threshold = v.parse().unwrap_or(config.cpu_threshold);
                config = config.cpu_threshold(threshold);
                i += 1;
            }
            ("--burn-us", Some(v)) => {
                burn = Duration::from_micros(v.parse().unwrap_or(0));
                i += 1;
            }
            ("--enable", _) => config = config.enabled(true),
            ("--disable", _) => config = config.enabled(false),
            (other, _) => eprintln!("shed-httpd: ignoring argument {}", other),
        }
        i += 1;
    }
    (port, config, burn)
}

#[tokio::main]
async fn main() {
    let (port, config, burn) = parse_args(env_get("SHED_HTTPD_PORT", 8080u16), GateConfig::from_env());
    config.print();

    let sink = Arc::new(PrometheusSink::default());
    let shedder = match LoadShedder::start(Some(sink.clone() as Arc<dyn MetricsSink>)) {
        Ok(s) => s,
        Err(e) => {
            shed_error!("cannot start usage monitor: {}", e);
            std::process::exit(1);
        }
    };
    let gate = match shedder.interceptor(config.clone()) {
        Ok(g) => g,
        Err(e) => {
            shed_error!("invalid gate configuration: {}", e);
            std::process::exit(2);
        }
    };

    let server = Arc::new(Server {
        gate,
        sink,
        health_path: config.probe_path.clone(),
        burn,
        stats: Stats::new(),
    });

    let listener = match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(l) => l,
        Err(e) => {
            shed_error!("bind 0.0.0.0:{} failed: {}", port, e);
            std::process::exit(1);
        }
    };

    let start = Instant::now();
    let reporter = Arc::clone(&server);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            shed_info!(
                "[{:.1}s] req={} shed={} err={} cpu={:.1}%",
                start.elapsed().as_secs_f64(),
                reporter.stats.requests.load(Ordering::Relaxed),
                reporter.stats.shed.load(Ordering::Relaxed),
                reporter.stats.errors.load(Ordering::Relaxed),
                reporter.gate.usage().published(),
            );
        }
    });

    shed_info!("listening on http://0.0.0.0:{}/ ({})", port, shedder.entitlement());

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                tokio::spawn(handle_client(stream, Arc::clone(&server)));
            }
            Err(e) => shed_error!("accept error: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_path() {
        assert_eq!(parse_path(b"GET /health HTTP/1.1\r\nHost: x\r\n\r\n"), "/health");
        assert_eq!(parse_path(b"GET /api?x=1 HTTP/1.1\r\n\r\n"), "/api");
        assert_eq!(parse_path(b"garbage"), "/");
    }

    #[test]
    fn test_make_response() {
        let resp = make_response("503 Service Unavailable", "text/plain", b"");
        let text = String::from_utf8(resp).unwrap();
        assert!(text.starts_with("HTTP/1.1 503 Service Unavailable\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
