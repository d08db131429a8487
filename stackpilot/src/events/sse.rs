//! `text/event-stream` framing for the transport.

use super::Frame;

/// MIME type of every response stream.
pub const CONTENT_TYPE: &str = "text/event-stream; charset=utf-8";

/// Headers set on every response stream.
pub const HEADERS: [(&str, &str); 4] = [
    ("Content-Type", CONTENT_TYPE),
    ("Connection", "keep-alive"),
    ("Cache-Control", "no-cache, no-transform"),
    ("Content-Encoding", "none"),
];

/// Encodes a frame as an SSE message.
///
/// Chunks become `data:` lines. A commit becomes a `commit` event whose data is
/// the JSON body `{"status": .., "message": ..}`.
#[must_use]
pub fn encode(frame: &Frame) -> String {
    match frame {
        Frame::Chunk(text) => data_lines(None, text),
        Frame::Commit { code, message } => {
            let body = serde_json::json!({ "status": code, "message": message });
            data_lines(Some("commit"), &body.to_string())
        }
    }
}

fn data_lines(event: Option<&str>, text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    if let Some(name) = event {
        out.push_str("event: ");
        out.push_str(name);
        out.push('\n');
    }
    for line in text.split('\n') {
        out.push_str("data: ");
        out.push_str(line.trim_end_matches('\r'));
        out.push('\n');
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers() {
        assert!(HEADERS.contains(&("Content-Type", "text/event-stream; charset=utf-8")));
        assert!(HEADERS.contains(&("Cache-Control", "no-cache, no-transform")));
        assert!(HEADERS.contains(&("Connection", "keep-alive")));
    }

    #[test]
    fn test_encode_multiline_chunk() {
        let out = encode(&Frame::Chunk("db-1  | ready\r\nollama-1 | listening".into()));
        assert_eq!(out, "data: db-1  | ready\ndata: ollama-1 | listening\n\n");
    }

    #[test]
    fn test_encode_commit() {
        let out = encode(&Frame::Commit {
            code: Some(500),
            message: "DB and Ollama stop failed".into(),
        });
        assert!(out.starts_with("event: commit\n"));
        assert!(out.contains("\"status\":500"));
        assert!(out.ends_with("\n\n"));
    }

    #[test]
    fn test_encode_commit_without_status() {
        let out = encode(&Frame::Commit {
            code: None,
            message: "answer".into(),
        });
        assert!(out.contains("\"status\":null"));
    }
}
