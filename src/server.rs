//! Web form for asking questions
//!
//! Minimal HTTP server on a raw `TcpListener`, no framework: one HTML page
//! with a text box, one JSON endpoint that forwards the question to the
//! agent, one health check. Questions are served one at a time; a failing
//! question never takes the server down.

use crate::agent::{answer_question, SqlAgent};
use crate::error::Result;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Chat2SQL Database Query</title>
<style>
  body { font-family: sans-serif; max-width: 720px; margin: 2rem auto; padding: 0 1rem; }
  textarea { width: 100%; height: 4rem; font-size: 1rem; }
  button { margin-top: 0.5rem; padding: 0.4rem 1.2rem; font-size: 1rem; }
  pre { background: #f4f4f4; padding: 1rem; white-space: pre-wrap; min-height: 4rem; }
</style>
</head>
<body>
<h1>Chat2SQL Database Query</h1>
<p>Ask questions about your SQLite database in plain English, and get SQL-based answers.</p>
<textarea id="question" placeholder="Enter your SQL query in natural language..."></textarea>
<br>
<button onclick="ask()">Ask</button>
<pre id="answer"></pre>
<script>
async function ask() {
  const question = document.getElementById('question').value;
  const out = document.getElementById('answer');
  out.textContent = 'Thinking...';
  try {
    const resp = await fetch('/api/ask', {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify({ question })
    });
    const data = await resp.json();
    out.textContent = data.answer || data.error || 'No answer';
  } catch (e) {
    out.textContent = 'Request failed: ' + e;
  }
}
</script>
</body>
</html>
"#;

/// Serve the form until the process is stopped. Connections are handled
/// sequentially: one question, one agent run at a time.
pub async fn serve(listener: TcpListener, agent: Arc<SqlAgent>) -> Result<()> {
    info!("Serving on http://{}", listener.local_addr()?);

    loop {
        let (stream, addr) = listener.accept().await?;
        info!("Connection from {}", addr);
        if let Err(e) = handle_connection(stream, &agent).await {
            warn!("Connection from {} failed: {}", addr, e);
        }
    }
}

async fn handle_connection(mut stream: TcpStream, agent: &SqlAgent) -> std::io::Result<()> {
    let request = match read_request(&mut stream).await {
        Ok(req) => req,
        Err(e) => {
            error!("Failed to read request: {}", e);
            let response = http_response(400, "Bad Request", "text/plain", "bad request");
            return stream.write_all(response.as_bytes()).await;
        }
    };

    let response = route(&request, agent).await;
    stream.write_all(response.as_bytes()).await
}

#[derive(Debug)]
struct Request {
    method: String,
    path: String,
    body: String,
}

const MAX_HEADER_BYTES: usize = 64 * 1024;
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Read one HTTP request: headers up to the blank line, then as many body
/// bytes as Content-Length announces.
async fn read_request(stream: &mut TcpStream) -> std::io::Result<Request> {
    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before headers completed",
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_HEADER_BYTES {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "request headers too large",
            ));
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let mut path = parts.next().unwrap_or("/").to_string();
    if let Some(q) = path.find('?') {
        path.truncate(q);
    }

    let content_length = lines
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_BODY_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "request body too large",
        ));
    }

    let body_start = header_end + 4;
    while buf.len() < body_start + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = (body_start + content_length).min(buf.len());
    let body = String::from_utf8_lossy(&buf[body_start..body_end]).to_string();

    Ok(Request { method, path, body })
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

async fn route(request: &Request, agent: &SqlAgent) -> String {
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => http_response(200, "OK", "text/html; charset=utf-8", INDEX_HTML),
        ("GET", "/api/health") => http_response(
            200,
            "OK",
            "application/json",
            r#"{"status":"ok","service":"chat2sql"}"#,
        ),
        ("POST", "/api/ask") => {
            let question = serde_json::from_str::<serde_json::Value>(&request.body)
                .ok()
                .and_then(|v| v.get("question").and_then(|q| q.as_str()).map(String::from))
                .unwrap_or_default();

            if question.trim().is_empty() {
                return http_response(
                    400,
                    "Bad Request",
                    "application/json",
                    r#"{"error":"question is required"}"#,
                );
            }

            let answer = answer_question(agent, &question).await;
            let body = serde_json::json!({ "answer": answer });
            http_response(
                200,
                "OK",
                "application/json",
                &serde_json::to_string(&body)
                    .unwrap_or_else(|_| r#"{"error":"failed to serialize answer"}"#.to_string()),
            )
        }
        (method, path) => {
            warn!("404: {} {}", method, path);
            http_response(
                404,
                "Not Found",
                "application/json",
                r#"{"error":"not found"}"#,
            )
        }
    }
}

fn http_response(status: u16, status_text: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text,
        content_type,
        body.len(),
        body
    )
}
