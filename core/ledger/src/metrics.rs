// tally/core/ledger/src/metrics.rs

// Counters for ledger entry points and consumed vouchers
use once_cell::sync::Lazy;
use prometheus::{register_counter_vec, CounterVec};

pub static LEDGER_OPERATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tally_ledger_operations_total",
        "Ledger entry point calls by outcome",
        &["operation", "status"]
    )
    .expect("register tally_ledger_operations_total")
});

pub static VOUCHERS_CONSUMED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tally_vouchers_consumed_total",
        "Vouchers accepted and marked used",
        &["direction"]
    )
    .expect("register tally_vouchers_consumed_total")
});

pub fn record_operation(operation: &str, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    LEDGER_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}
