// tally/node/src/lib.rs

//! Hosting for the tally ledger: configuration, logging bootstrap and a
//! persisting, serializing wrapper around the engine.

pub mod config;
pub mod host;
pub mod logging;
pub mod metrics;

pub use config::{LoggingConfig, NodeConfig, StorageConfig};
pub use host::LedgerHost;
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel, TraceId};
