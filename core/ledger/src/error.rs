// tally/core/ledger/src/error.rs

use primitive_types::U256;
use tally_primitives::{Address, ChainId, SignatureError};

use crate::roles::Role;
use crate::token::TokenError;
use crate::voucher::Direction;

/// Every way a ledger operation can fail. A failed operation leaves no trace.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    // Authorization
    #[error("invalid voucher signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("voucher signed by {0}, which does not hold the signer role")]
    UnauthorizedSigner(Address),

    #[error("voucher expired at {expiry}, current time {now}")]
    VoucherExpired { expiry: u64, now: u64 },

    #[error("voucher bound to ledger {got}, expected {expected}")]
    WrongLedger { expected: Address, got: Address },

    #[error("voucher bound to chain {got}, expected {expected}")]
    WrongChain { expected: ChainId, got: ChainId },

    #[error("voucher authorizes a {got:?}, expected a {expected:?}")]
    WrongDirection { expected: Direction, got: Direction },

    #[error("voucher already used")]
    VoucherReplayed,

    #[error("{account} is missing a required role (one of {required:?})")]
    MissingRole {
        account: Address,
        required: Vec<Role>,
    },

    #[error("{caller} is not authorized to read the balance of {account}")]
    NotAuthorized { caller: Address, account: Address },

    // Balances
    #[error("insufficient balance for {account}: need {need}, have {have}")]
    InsufficientBalance {
        account: Address,
        need: U256,
        have: U256,
    },

    #[error("insufficient locked balance for {account}: need {need}, have {have}")]
    InsufficientLockedBalance {
        account: Address,
        need: U256,
        have: U256,
    },

    #[error("insufficient collected fees: need {need}, have {have}")]
    InsufficientFees { need: U256, have: U256 },

    #[error("array length mismatch: {left} vs {right}")]
    ArrayLengthMismatch { left: usize, right: usize },

    #[error("exchange rate numerator and denominator must be non-zero")]
    ZeroRate,

    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    // State
    #[error("ledger is paused")]
    Paused,

    #[error("ledger is not paused")]
    NotPaused,

    #[error("insufficient allowance for token migration: need {need}, have {have}")]
    InsufficientAllowance { need: U256, have: U256 },

    #[error("unsupported token decimals: {0}")]
    UnsupportedDecimals(u8),

    #[error("token {0} is already the backing token")]
    SameToken(Address),

    #[error("backing token mismatch: state expects {expected}, got {got}")]
    TokenMismatch { expected: Address, got: Address },

    #[error("ledger state is inconsistent: {0}")]
    Inconsistent(String),

    // Address validity
    #[error("zero address supplied")]
    ZeroAddress,

    // External token
    #[error("token call failed: {0}")]
    Token(#[from] TokenError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
