//! Logging setup: env-filtered stdout output plus an optional GELF sink.

use std::fmt;
use std::net::UdpSocket;

use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{GraylogConfig, LoggingConfig};
use crate::error::CronError;

/// Install the global subscriber. `RUST_LOG` overrides the level chosen
/// by `config.debug`.
pub fn init_logging(config: &LoggingConfig) -> Result<(), CronError> {
    let default_level = if config.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (json, plain) = if config.json {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };
    let gelf = config.graylog.as_ref().map(GelfLayer::connect).transpose()?;

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .with(gelf)
        .try_init()
        .map_err(|e| CronError::Config(format!("logging already initialised: {e}")))
}

/// Sends each event as a GELF 1.1 JSON datagram.
///
/// Delivery is best effort: send errors are dropped, nothing is buffered.
pub struct GelfLayer {
    socket: UdpSocket,
    host: String,
    source: String,
}

impl GelfLayer {
    pub fn connect(config: &GraylogConfig) -> Result<Self, CronError> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.connect((config.host.as_str(), config.port))?;
        socket.set_nonblocking(true)?;
        let host = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "localhost".into());
        Ok(Self {
            socket,
            host,
            source: config.source.clone(),
        })
    }

    fn record(&self, event: &tracing::Event<'_>) -> Value {
        let metadata = event.metadata();
        let mut visitor = GelfVisitor::default();
        event.record(&mut visitor);

        let timestamp = chrono::Utc::now().timestamp_micros() as f64 / 1e6;

        let mut record = visitor.fields;
        record.insert("version".into(), "1.1".into());
        record.insert("host".into(), self.host.clone().into());
        record.insert(
            "short_message".into(),
            visitor.message.unwrap_or_default().into(),
        );
        record.insert("timestamp".into(), timestamp.into());
        record.insert("level".into(), syslog_level(metadata.level()).into());
        record.insert("_source-app".into(), self.source.clone().into());
        record.insert("_target".into(), metadata.target().into());
        Value::Object(record)
    }
}

impl<S: Subscriber> Layer<S> for GelfLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if let Ok(bytes) = serde_json::to_vec(&self.record(event)) {
            let _ = self.socket.send(&bytes);
        }
    }
}

fn syslog_level(level: &Level) -> u8 {
    match *level {
        Level::ERROR => 3,
        Level::WARN => 4,
        Level::INFO => 6,
        Level::DEBUG | Level::TRACE => 7,
    }
}

#[derive(Default)]
struct GelfVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl GelfVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        match field.name() {
            "message" => {
                self.message = Some(match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                });
            }
            // `_id` is reserved by GELF.
            "id" => {
                self.fields.insert("_id_".into(), value);
            }
            name => {
                self.fields.insert(format!("_{name}"), value);
            }
        }
    }
}

impl Visit for GelfVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, format!("{value:?}").into());
    }
}
