use thiserror::Error;

/// Errors raised by the dispatcher core.
///
/// None of these stop the service once it is running; handlers log them and
/// skip the offending namespace, task or fire.
#[derive(Debug, Error)]
pub enum CronError {
    #[error("invalid cron expression {expression:?}: {source}")]
    Schedule {
        expression: String,
        #[source]
        source: cron::error::Error,
    },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
