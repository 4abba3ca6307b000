//! Structured logging, adapted from the teacher's `LogEvent`/`EventCategory`
//! /`init_logging` machinery: JSON logs in production, pretty logs in
//! development, one [`EventCategory`] per engine component.
//!
//! Unlike the teacher, this crate has no wall-clock-sensitive request
//! tracing to justify a `chrono` dependency — `tracing-subscriber`'s own
//! formatter already timestamps every line, so [`LogEvent`] carries no
//! timestamp field of its own.

use serde::Serialize;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// One variant per engine component (spec §2's component list).
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Commitment,
    History,
    Tree,
    Tracker,
    Watcher,
    Manager,
    System,
}

#[derive(Debug, Serialize)]
pub struct LogEvent {
    pub level: String,
    pub category: EventCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl LogEvent {
    pub fn new(level: LogLevel, category: EventCategory, message: impl Into<String>) -> Self {
        LogEvent {
            level: format!("{:?}", level).to_uppercase(),
            category,
            message: message.into(),
            edge_id: None,
            data: None,
            error: None,
        }
    }

    pub fn with_edge_id(mut self, id: impl Into<String>) -> Self {
        self.edge_id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some(ErrorDetails {
            code: code.into(),
            message: message.into(),
        });
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"error\": \"failed to serialize log\", \"message\": \"{}\"}}",
                self.message
            )
        })
    }
}

/// Emits `event` at its own level, under a target derived from its category.
pub fn emit(event: LogEvent) {
    let target = match event.category {
        EventCategory::Commitment => "challenge_engine::commitment",
        EventCategory::History => "challenge_engine::history",
        EventCategory::Tree => "challenge_engine::tree",
        EventCategory::Tracker => "challenge_engine::tracker",
        EventCategory::Watcher => "challenge_engine::watcher",
        EventCategory::Manager => "challenge_engine::manager",
        EventCategory::System => "challenge_engine::system",
    };
    let body = event.to_json();
    match event.level.as_str() {
        "ERROR" => tracing::error!(target: "challenge_engine", t = target, "{}", body),
        "WARN" => tracing::warn!(target: "challenge_engine", t = target, "{}", body),
        "DEBUG" => tracing::debug!(target: "challenge_engine", t = target, "{}", body),
        "TRACE" => tracing::trace!(target: "challenge_engine", t = target, "{}", body),
        _ => tracing::info!(target: "challenge_engine", t = target, "{}", body),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

/// Initializes the global `tracing` subscriber. `json_format` selects JSON
/// output (production) over pretty-printed output (development).
pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "challenge_engine={}",
            format!("{:?}", level).to_lowercase()
        ))
    });

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))
    }
}

pub fn init_from_config(config: &crate::config::EngineConfig) -> Result<(), LoggingError> {
    init_logging(LogLevel::from(config.log_level.as_str()), config.log_json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_event_serializes_with_category_and_edge_id() {
        let event = LogEvent::new(LogLevel::Info, EventCategory::Tracker, "bisecting")
            .with_edge_id("0xabc")
            .with_data(serde_json::json!({"height": 4}));
        let json = event.to_json();
        assert!(json.contains("bisecting"));
        assert!(json.contains("0xabc"));
        assert!(json.contains("tracker"));
    }

    #[test]
    fn log_level_parses_case_insensitively() {
        assert_eq!(LogLevel::from("DEBUG"), LogLevel::Debug);
        assert_eq!(LogLevel::from("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::from("nonsense"), LogLevel::Info);
    }
}
