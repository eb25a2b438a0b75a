use std::sync::OnceLock;

use chrono::Local;
use log::{Log, Metadata, Record, SetLoggerError};
use serde::Serialize;
use tokio::sync::broadcast;

const LOG_CHANNEL_CAPACITY: usize = 256;

static LOGGER: OnceLock<SessionLogger> = OnceLock::new();

#[derive(Debug, Serialize, Clone)]
pub struct LogMessage {
    pub level: String,
    pub message: String,
    pub timestamp: String,
}

/// Writes records through `env_logger` and forwards them to log subscribers
pub struct SessionLogger {
    inner: env_logger::Logger,
    tx: broadcast::Sender<LogMessage>,
}

impl SessionLogger {
    /// Filters from `RUST_LOG`, falling back to `default_filter` (e.g. `"info"`)
    pub fn new(default_filter: &str) -> Self {
        Self::from_builder(&mut env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(default_filter),
        ))
    }

    pub fn from_builder(builder: &mut env_logger::Builder) -> Self {
        let (tx, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        Self {
            inner: builder.build(),
            tx,
        }
    }

    /// Installs the process-wide logger
    pub fn init(default_filter: &str) -> Result<(), SetLoggerError> {
        let logger = LOGGER.get_or_init(|| SessionLogger::new(default_filter));
        log::set_logger(logger).map(|()| log::set_max_level(logger.inner.filter()))
    }

    /// Receives every record logged after this call, once [`SessionLogger::init`] succeeded
    pub fn subscribe() -> Option<broadcast::Receiver<LogMessage>> {
        LOGGER.get().map(|logger| logger.tx.subscribe())
    }

    fn emit_log(&self, record: &Record) {
        if self.tx.receiver_count() == 0 {
            return;
        }
        let log_message = LogMessage {
            level: record.level().to_string(),
            message: record.args().to_string(),
            timestamp: Local::now().to_rfc3339(),
        };
        let _ = self.tx.send(log_message);
    }
}

impl Log for SessionLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.inner.matches(record) {
            self.inner.log(record);
            self.emit_log(record);
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}
