// tally/core/storage/src/db/column_families.rs

/// Column family definitions for RocksDB
pub const CF_DEFAULT: &str = "default";
/// address -> AccountBalance
pub const CF_ACCOUNTS: &str = "accounts";
/// address ‖ session id -> locked amount
pub const CF_SESSIONS: &str = "sessions";
/// consumed voucher digest -> ()
pub const CF_VOUCHERS: &str = "vouchers";
/// role tag ‖ address -> ()
pub const CF_ROLES: &str = "roles";
/// singleton records (deployment, rate, backing token, pause flag, totals)
pub const CF_METADATA: &str = "metadata";

/// Get all column families
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        CF_DEFAULT,
        CF_ACCOUNTS,
        CF_SESSIONS,
        CF_VOUCHERS,
        CF_ROLES,
        CF_METADATA,
    ]
}
