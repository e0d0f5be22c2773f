// tally/core/ledger/src/config.rs

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tally_primitives::{Address, ChainId, ParseAddressError};

use crate::rate::ExchangeRate;
use crate::roles::Role;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid address for {field}: {source}")]
    InvalidAddress {
        field: &'static str,
        #[source]
        source: ParseAddressError,
    },

    #[error("{field} must not be the zero address")]
    ZeroAddress { field: &'static str },

    #[error("invalid number for {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("exchange rate numerator and denominator must be non-zero")]
    ZeroRate,
}

/// Ledger deployment configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Address the ledger is deployed at; vouchers are bound to it
    pub address: String,

    pub chain_id: ChainId,

    /// Initial holder of the admin role
    pub admin: String,

    /// Extra role grants applied at initialization
    #[serde(default)]
    pub grants: Vec<RoleGrant>,

    #[serde(default)]
    pub rate: RateConfig,

    /// Backing token contract address
    pub backing_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: Role,
    pub account: String,
}

/// Exchange rate as decimal strings, so 256-bit values survive TOML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateConfig {
    #[serde(default = "default_rate_side")]
    pub numerator: String,
    #[serde(default = "default_rate_side")]
    pub denominator: String,
}

fn default_rate_side() -> String {
    "1".to_string()
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            numerator: default_rate_side(),
            denominator: default_rate_side(),
        }
    }
}

/// Typed, validated form of [`LedgerConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerParams {
    pub address: Address,
    pub chain_id: ChainId,
    pub admin: Address,
    pub grants: Vec<(Role, Address)>,
    pub rate: ExchangeRate,
    pub backing_token: Address,
}

impl Default for LedgerConfig {
    /// Local development deployment
    fn default() -> Self {
        Self {
            address: "0x0000000000000000000000000000000000001000".to_string(),
            chain_id: 31337,
            admin: "0x0000000000000000000000000000000000000001".to_string(),
            grants: Vec::new(),
            rate: RateConfig::default(),
            backing_token: "0x0000000000000000000000000000000000002000".to_string(),
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<LedgerParams, ConfigError> {
        let address = parse_address("address", &self.address)?;
        let admin = parse_address("admin", &self.admin)?;
        let backing_token = parse_address("backing_token", &self.backing_token)?;

        let grants = self
            .grants
            .iter()
            .map(|grant| Ok((grant.role, parse_address("grants.account", &grant.account)?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let numerator = parse_u256("rate.numerator", &self.rate.numerator)?;
        let denominator = parse_u256("rate.denominator", &self.rate.denominator)?;
        let rate = ExchangeRate::new(numerator, denominator).map_err(|_| ConfigError::ZeroRate)?;

        Ok(LedgerParams {
            address,
            chain_id: self.chain_id,
            admin,
            grants,
            rate,
            backing_token,
        })
    }
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, ConfigError> {
    let address = value
        .parse::<Address>()
        .map_err(|source| ConfigError::InvalidAddress { field, source })?;
    if address.is_zero() {
        return Err(ConfigError::ZeroAddress { field });
    }
    Ok(address)
}

fn parse_u256(field: &'static str, value: &str) -> Result<U256, ConfigError> {
    U256::from_dec_str(value.trim()).map_err(|_| ConfigError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}
