//! Structured Logging
//!
//! JSON-capable structured logging built on `tracing`/`tracing-subscriber`,
//! plus a small event-category vocabulary so upload/download/rotation/swap/
//! verification activity all land in a consistent shape for log
//! aggregation.

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

/// Event categories for structured logging.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// HTTP request/response events
    Api,
    /// Blob upload events
    Upload,
    /// Blob download events
    Download,
    /// Pubkey rotation events
    Rotation,
    /// Mint swap events
    Swap,
    /// Proof verification events
    Verification,
    /// System events (startup, shutdown)
    System,
}

#[derive(Debug, Serialize)]
pub struct LogEvent {
    pub timestamp: String,
    pub level: String,
    pub category: EventCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
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
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: format!("{:?}", level).to_uppercase(),
            category,
            message: message.into(),
            data: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
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
            format!("{{\"error\": \"failed to serialize log\", \"message\": \"{}\"}}", self.message)
        })
    }
}

pub fn log_upload_event(sha256: &str, size: u64, amount_paid: u64, success: bool, error: Option<&str>) {
    let level = if success { LogLevel::Info } else { LogLevel::Warn };
    let mut event = LogEvent::new(level, EventCategory::Upload, "blob upload").with_data(
        serde_json::json!({ "sha256": sha256, "size": size, "amount_paid": amount_paid, "success": success }),
    );
    if let Some(err) = error {
        event = event.with_error("UPLOAD_ERROR", err);
    }
    emit(level, "blossom::upload", &event);
}

pub fn log_download_event(sha256: &str, amount_paid: u64, success: bool, error: Option<&str>) {
    let level = if success { LogLevel::Info } else { LogLevel::Warn };
    let mut event = LogEvent::new(level, EventCategory::Download, "blob download")
        .with_data(serde_json::json!({ "sha256": sha256, "amount_paid": amount_paid, "success": success }));
    if let Some(err) = error {
        event = event.with_error("DOWNLOAD_ERROR", err);
    }
    emit(level, "blossom::download", &event);
}

pub fn log_rotation_event(version: u64, expiration: i64, success: bool, error: Option<&str>) {
    let level = if success { LogLevel::Info } else { LogLevel::Error };
    let mut event = LogEvent::new(level, EventCategory::Rotation, "pubkey rotation")
        .with_data(serde_json::json!({ "version": version, "expiration": expiration, "success": success }));
    if let Some(err) = error {
        event = event.with_error("ROTATION_ERROR", err);
    }
    emit(level, "blossom::rotation", &event);
}

pub fn log_swap_event(mint: &str, proofs_in: usize, proofs_out: usize, success: bool, error: Option<&str>) {
    let level = if success { LogLevel::Info } else { LogLevel::Error };
    let mut event = LogEvent::new(level, EventCategory::Swap, "mint swap").with_data(
        serde_json::json!({ "mint": mint, "proofs_in": proofs_in, "proofs_out": proofs_out, "success": success }),
    );
    if let Some(err) = error {
        event = event.with_error("SWAP_ERROR", err);
    }
    emit(level, "blossom::swap", &event);
}

pub fn log_verification_event(mint: &str, amount: u64, success: bool, error: Option<&str>) {
    let level = if success { LogLevel::Info } else { LogLevel::Warn };
    let mut event = LogEvent::new(level, EventCategory::Verification, "proof verification")
        .with_data(serde_json::json!({ "mint": mint, "amount": amount, "success": success }));
    if let Some(err) = error {
        event = event.with_error("VERIFICATION_ERROR", err);
    }
    emit(level, "blossom::verification", &event);
}

fn emit(level: LogLevel, target: &'static str, event: &LogEvent) {
    match level {
        LogLevel::Error => tracing::error!(target: target, "{}", event.to_json()),
        LogLevel::Warn => tracing::warn!(target: target, "{}", event.to_json()),
        _ => tracing::info!(target: target, "{}", event.to_json()),
    }
}

pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let level_str = format!("{:?}", level).to_lowercase();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("blossom_cashu={level_str},tower_http={level_str},axum={level_str}")));

    if json_format {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        );
        subscriber.try_init().map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    } else {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .pretty()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        );
        subscriber.try_init().map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    }

    Ok(())
}

/// Initialize logging from [`crate::config::BlossomConfig`]. JSON output is
/// always used — there's no "development" network tier to gate it on.
pub fn init_from_config(config: &crate::config::BlossomConfig) -> Result<(), LoggingError> {
    init_logging(LogLevel::from(config.log_level.as_str()), true)
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_event_serializes_with_category_and_message() {
        let event = LogEvent::new(LogLevel::Info, EventCategory::Upload, "blob upload")
            .with_data(serde_json::json!({"sha256": "abc"}))
            .with_duration(12);

        let json = event.to_json();
        assert!(json.contains("blob upload"));
        assert!(json.contains("\"upload\""));
        assert!(json.contains("12"));
    }

    #[test]
    fn log_level_parsing_defaults_to_info() {
        assert_eq!(LogLevel::from("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from("unknown"), LogLevel::Info);
    }
}
