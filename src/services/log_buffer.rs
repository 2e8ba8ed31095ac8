//! Tracing layer that keeps the most recent log lines in memory.
//!
//! Feeds the /logs page: a bounded ring buffer of formatted events, capped
//! at [`MAX_LOG_LINES`] so a long-running process can't grow it unbounded.

use std::collections::VecDeque;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// How many lines the /logs page keeps.
pub const MAX_LOG_LINES: usize = 200;

static BUFFER: Lazy<Mutex<VecDeque<String>>> =
    Lazy::new(|| Mutex::new(VecDeque::with_capacity(MAX_LOG_LINES)));

/// Snapshot of the buffered log lines, oldest first.
pub fn recent_log_lines() -> Vec<String> {
    BUFFER
        .lock()
        .map(|buf| buf.iter().cloned().collect())
        .unwrap_or_default()
}

fn push_line(line: String) {
    if let Ok(mut buf) = BUFFER.lock() {
        if buf.len() >= MAX_LOG_LINES {
            buf.pop_front();
        }
        buf.push_back(line);
    }
}

/// A tracing layer writing events into the global ring buffer.
pub struct LogBufferLayer;

impl LogBufferLayer {
    /// The layer for the global buffer read by /logs.
    pub fn global() -> Self {
        Self
    }
}

impl<S: Subscriber> Layer<S> for LogBufferLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = match *event.metadata().level() {
            Level::ERROR => "ERROR",
            Level::WARN => "WARN",
            Level::INFO => "INFO",
            Level::DEBUG => "DEBUG",
            Level::TRACE => "TRACE",
        };

        // Extract the message and remaining fields with a visitor
        struct FieldVisitor {
            message: String,
            fields: Vec<String>,
        }

        impl tracing::field::Visit for FieldVisitor {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                let val = format!("{:?}", value);
                let clean = val.trim_matches('"').to_string();
                if field.name() == "message" {
                    self.message = clean;
                } else {
                    self.fields.push(format!("{}={}", field.name(), clean));
                }
            }

            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                if field.name() == "message" {
                    self.message = value.to_string();
                } else {
                    self.fields.push(format!("{}={}", field.name(), value));
                }
            }
        }

        let mut visitor = FieldVisitor {
            message: String::new(),
            fields: Vec::new(),
        };
        event.record(&mut visitor);

        let body = if visitor.fields.is_empty() {
            visitor.message
        } else if visitor.message.is_empty() {
            visitor.fields.join(", ")
        } else {
            format!("{}, {}", visitor.message, visitor.fields.join(", "))
        };

        let target = event.metadata().target();
        let short_target = target.strip_prefix("bindery::").unwrap_or(target);

        push_line(format!(
            "{} [{}] [{}] {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
            level,
            short_target,
            body
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_is_bounded() {
        for i in 0..(MAX_LOG_LINES + 50) {
            push_line(format!("line {}", i));
        }
        let lines = recent_log_lines();
        assert_eq!(lines.len(), MAX_LOG_LINES);
        // Oldest lines were dropped
        assert!(lines[0].contains("line 50"));
    }
}
