// tally/core/primitives/src/lib.rs

pub mod abi;
pub mod crypto;
pub mod types;

pub use crypto::{eth_signed_message_hash, LocalSigner, Signature, SignatureError};
pub use primitive_types::{U256, U512};
pub use types::{keccak256, Address, Hash, ParseAddressError};

/// Network identifier bound into every voucher
pub type ChainId = u64;
