use chrono::Local;
use log::{Level, Metadata, Record, SetLoggerError};
use serde::Serialize;
use std::sync::OnceLock;

static LOGGER: OnceLock<SessionLogger> = OnceLock::new();

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct LogMessage {
    level: String,
    target: String,
    message: String,
    timestamp: String,
}

impl LogMessage {
    fn from_record(record: &Record) -> Self {
        Self {
            level: record.level().to_string(),
            target: record.target().to_string(),
            message: record.args().to_string(),
            timestamp: Local::now().to_rfc3339(),
        }
    }

    /// One line of output, either JSON or `timestamp [LEVEL] message`
    pub fn render(&self, json: bool) -> String {
        if json {
            if let Ok(line) = serde_json::to_string(self) {
                return line;
            }
        }
        format!("{} [{}] {}", self.timestamp, self.level, self.message)
    }
}

/// Logger writing one line per record to stderr
pub struct SessionLogger {
    level: Level,
    json: bool,
}

impl SessionLogger {
    pub fn new(level: Level, json: bool) -> Self {
        Self { level, json }
    }

    /// Installs the logger globally. Fails if another logger is already set.
    pub fn init(level: Level, json: bool) -> Result<(), SetLoggerError> {
        let logger = LOGGER.get_or_init(|| SessionLogger::new(level, json));
        log::set_logger(logger).map(|()| log::set_max_level(logger.level.to_level_filter()))
    }
}

impl log::Log for SessionLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{}", LogMessage::from_record(record).render(self.json));
        }
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;

    fn message() -> LogMessage {
        LogMessage {
            level: "INFO".to_string(),
            target: "gatt_browser_lib".to_string(),
            message: "Scan finished with 2 peripherals".to_string(),
            timestamp: "2026-10-16T09:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn plain_rendering() {
        assert_eq!(
            message().render(false),
            "2026-10-16T09:00:00+00:00 [INFO] Scan finished with 2 peripherals"
        );
    }

    #[test]
    fn json_rendering() {
        let line = message().render(true);
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["level"], "INFO");
        assert_eq!(value["message"], "Scan finished with 2 peripherals");
    }

    #[test]
    fn level_filtering() {
        let logger = SessionLogger::new(Level::Info, false);
        assert!(logger.enabled(&Metadata::builder().level(Level::Warn).build()));
        assert!(!logger.enabled(&Metadata::builder().level(Level::Debug).build()));
    }
}
