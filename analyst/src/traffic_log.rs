//! Traffic logging for analyst service and warehouse calls
//!
//! Appends a one-line summary of each request/response to the app log file.
//! Content is truncated to avoid leaking query results into logs.

use config::PathManager;
use std::io::Write;

/// Maximum characters to log for content
const MAX_CONTENT_LOG_CHARS: usize = 200;

/// Truncate a string for logging, adding ellipsis if truncated
pub(crate) fn truncate_for_log(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{}... ({} chars total)", truncated, char_count)
    }
}

/// Log an outgoing request (truncated summary only)
pub fn log_request(path: &str, request: &impl serde::Serialize) {
    let json = serde_json::to_string(request).unwrap_or_else(|_| "<serialization error>".to_string());
    let summary = truncate_for_log(&json, MAX_CONTENT_LOG_CHARS);
    log_traffic("REQUEST", &format!("[{}] {}", path, summary));
}

/// Log a response with its status (truncated summary only)
pub fn log_response(path: &str, status: u16, body: &str) {
    let summary = truncate_for_log(body, MAX_CONTENT_LOG_CHARS);
    log_traffic("RESPONSE", &format!("[{}] status={} {}", path, status, summary));
}

/// Log a transport-level failure
pub fn log_error(path: &str, error: &str) {
    log_traffic("ERROR", &format!("[{}] {}", path, error));
}

fn log_traffic(event_type: &str, message: &str) {
    if let Some(log_path) = PathManager::log_file_path() {
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(mut file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
        {
            let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            let _ = writeln!(file, "[{}] [TRAFFIC] [{}] {}", timestamp, event_type, message);
        }
    }
}
