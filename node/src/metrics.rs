// tally/node/src/metrics.rs

use anyhow::Result;
use prometheus::{Encoder, TextEncoder};

/// Render every registered metric in the Prometheus text exposition format
pub fn render() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Content type to serve [`render`] output with
pub fn content_type() -> &'static str {
    prometheus::TEXT_FORMAT
}
