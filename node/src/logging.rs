// tally/node/src/logging.rs

//! Structured logging for the ledger host.
//!
//! Every host operation runs inside a span carrying a [`TraceId`], so the
//! engine's `info!`/`warn!` lines for one call can be correlated in JSON output.
//!
//! ```rust,no_run
//! use tally_node::logging::{init_logging, LogConfig};
//!
//! let config = LogConfig::from_env();
//! init_logging(&config)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

static TRACE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identifier shared by every log line emitted while serving one host call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceId {
    /// ms since epoch
    timestamp: u64,
    counter: u64,
    random: u16,
}

impl TraceId {
    pub fn new() -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            timestamp,
            counter: TRACE_COUNTER.fetch_add(1, Ordering::SeqCst),
            random: rand::random::<u16>(),
        }
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}-{:x}-{:04x}", self.timestamp, self.counter, self.random)
    }
}

impl FromStr for TraceId {
    type Err = anyhow::Error;

    /// Parse a propagated `timestamp-counter-random` id
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('-');
        let (Some(timestamp), Some(counter), Some(random), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            anyhow::bail!("malformed trace id: {}", s);
        };

        Ok(Self {
            timestamp: u64::from_str_radix(timestamp, 16)?,
            counter: u64::from_str_radix(counter, 16)?,
            random: u16::from_str_radix(random, 16)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Unknown names fall back to `Info`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, multi-line
    Pretty,
    /// One JSON object per event, for log aggregation
    Json,
    Compact,
}

impl LogFormat {
    /// Unknown names fall back to `Pretty`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub ansi_colors: bool,
    /// Emit span open/close events
    pub span_events: bool,
    /// Per-crate overrides, e.g. `("tally_storage", Warn)`
    pub module_levels: Vec<(String, LogLevel)>,
    pub include_target: bool,
    pub include_location: bool,
    pub include_thread_id: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            ansi_colors: true,
            span_events: false,
            module_levels: Vec::new(),
            include_target: true,
            include_location: false,
            include_thread_id: false,
        }
    }
}

impl LogConfig {
    /// Read `RUST_LOG` (leading level only), `LOG_FORMAT` and `LOG_ANSI`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(rust_log) = std::env::var("RUST_LOG") {
            if let Some(level) = rust_log.split(',').next() {
                config.level = LogLevel::parse(level);
            }
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            config.format = LogFormat::parse(&format);
        }
        if let Ok(ansi) = std::env::var("LOG_ANSI") {
            config.ansi_colors = ansi.eq_ignore_ascii_case("true");
        }

        config
    }

    /// JSON output with the storage layer quieted
    pub fn production() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            ansi_colors: false,
            span_events: true,
            module_levels: vec![
                ("tally_ledger".to_string(), LogLevel::Info),
                ("tally_storage".to_string(), LogLevel::Warn),
            ],
            include_target: true,
            include_location: true,
            include_thread_id: true,
        }
    }

    pub fn development() -> Self {
        Self {
            level: LogLevel::Debug,
            format: LogFormat::Pretty,
            ansi_colors: true,
            span_events: true,
            module_levels: vec![
                ("tally_ledger".to_string(), LogLevel::Debug),
                ("tally_storage".to_string(), LogLevel::Debug),
                ("tally_node".to_string(), LogLevel::Debug),
            ],
            include_target: true,
            include_location: true,
            include_thread_id: false,
        }
    }

    fn build_filter(&self) -> String {
        let mut filter = self.level.as_str().to_string();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", module, level.as_str()));
        }
        filter
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Install the global subscriber; `RUST_LOG` wins over the configured filter
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(rust_log) => EnvFilter::new(rust_log),
        Err(_) => EnvFilter::new(config.build_filter()),
    };

    let base = tracing_subscriber::fmt::layer()
        .with_target(config.include_target)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread_id)
        .with_span_events(config.span_events());

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => base.json().with_ansi(false).boxed(),
        LogFormat::Pretty => base.pretty().with_ansi(config.ansi_colors).boxed(),
        LogFormat::Compact => base.compact().with_ansi(config.ansi_colors).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))
}

pub fn init_default_logging() -> anyhow::Result<()> {
    init_logging(&LogConfig::from_env())
}

/// Open a span tagged with a fresh [`TraceId`]
#[macro_export]
macro_rules! traced_span {
    ($level:ident, $name:expr $(, $($field:tt)*)?) => {
        tracing::span!(
            tracing::Level::$level,
            $name,
            trace_id = %$crate::logging::TraceId::new()
            $(, $($field)*)?
        )
    };
}
