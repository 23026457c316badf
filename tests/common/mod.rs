#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A response the mock analytics service will send.
#[derive(Debug, Clone)]
pub struct CannedResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: String,
  pub delay: Duration,
}

impl CannedResponse {
  pub fn json(status: u16, body: serde_json::Value) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.to_string(),
      delay: Duration::ZERO,
    }
  }

  pub fn text(status: u16, body: &str) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.to_string(),
      delay: Duration::ZERO,
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  pub fn delayed(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
  pub path: String,
  pub headers: Vec<(String, String)>,
  pub body: serde_json::Value,
}

impl RecordedRequest {
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

/// Minimal HTTP/1.1 responder standing in for the analytics service.
///
/// Answers each connection with the next queued response, or a 500 when the
/// queue is empty.
pub struct MockAnalytics {
  pub base_url: String,
  responses: Arc<Mutex<VecDeque<CannedResponse>>>,
  requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockAnalytics {
  pub async fn start() -> Self {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let responses = Arc::new(Mutex::new(VecDeque::new()));
    let requests = Arc::new(Mutex::new(Vec::new()));

    let (queue, log) = (responses.clone(), requests.clone());
    tokio::spawn(async move {
      while let Ok((stream, _)) = listener.accept().await {
        let (queue, log) = (queue.clone(), log.clone());
        tokio::spawn(async move {
          handle(stream, queue, log).await;
        });
      }
    });

    Self {
      base_url: format!("http://{}", addr),
      responses,
      requests,
    }
  }

  pub fn push(&self, response: CannedResponse) {
    self.responses.lock().unwrap().push_back(response);
  }

  pub fn requests(&self) -> Vec<RecordedRequest> {
    self.requests.lock().unwrap().clone()
  }

  pub fn hits(&self) -> usize {
    self.requests.lock().unwrap().len()
  }
}

async fn handle(
  mut stream: TcpStream,
  queue: Arc<Mutex<VecDeque<CannedResponse>>>,
  log: Arc<Mutex<Vec<RecordedRequest>>>,
) {
  let Some(request) = read_request(&mut stream).await else {
    return;
  };
  log.lock().unwrap().push(request);

  let response = queue
    .lock()
    .unwrap()
    .pop_front()
    .unwrap_or_else(|| CannedResponse::text(500, "no canned response"));

  if !response.delay.is_zero() {
    tokio::time::sleep(response.delay).await;
  }

  let mut raw = format!(
    "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
    response.status,
    response.body.len()
  );
  for (name, value) in &response.headers {
    raw.push_str(&format!("{}: {}\r\n", name, value));
  }
  raw.push_str("\r\n");
  raw.push_str(&response.body);

  // The client may already have given up
  let _ = stream.write_all(raw.as_bytes()).await;
  let _ = stream.shutdown().await;
}

async fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
  let mut buf = Vec::new();
  let mut chunk = [0u8; 4096];

  let header_end = loop {
    let n = stream.read(&mut chunk).await.ok()?;
    if n == 0 {
      return None;
    }
    buf.extend_from_slice(&chunk[..n]);
    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
      break pos + 4;
    }
  };

  let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
  let mut lines = head.split("\r\n");
  let path = lines.next()?.split_whitespace().nth(1)?.to_string();
  let headers: Vec<(String, String)> = lines
    .filter_map(|line| line.split_once(':'))
    .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
    .collect();

  let content_length = headers
    .iter()
    .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
    .and_then(|(_, v)| v.parse::<usize>().ok())
    .unwrap_or(0);

  while buf.len() < header_end + content_length {
    let n = stream.read(&mut chunk).await.ok()?;
    if n == 0 {
      break;
    }
    buf.extend_from_slice(&chunk[..n]);
  }

  let body = serde_json::from_slice(&buf[header_end..]).unwrap_or(serde_json::Value::Null);
  Some(RecordedRequest {
    path,
    headers,
    body,
  })
}

/// An address nothing is listening on.
pub async fn closed_port_url() -> String {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  drop(listener);
  format!("http://{}", addr)
}

pub fn envelope(data: serde_json::Value) -> serde_json::Value {
  serde_json::json!({
    "data": data,
    "meta": { "generated_at": "2026-01-05T09:30:00Z" }
  })
}
