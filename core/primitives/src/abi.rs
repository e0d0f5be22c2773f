// tally/core/primitives/src/abi.rs

// 32-byte big-endian words in the Solidity ABI layout
use primitive_types::U256;

use crate::types::Address;

pub type Word = [u8; 32];

/// Left-pad an address into a word
pub fn word_from_address(address: &Address) -> Word {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

pub fn word_from_u256(value: U256) -> Word {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}

pub fn word_from_u64(value: u64) -> Word {
    word_from_u256(U256::from(value))
}

/// Concatenate words into one buffer
pub fn encode_words(words: &[Word]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 32);
    for word in words {
        out.extend_from_slice(word);
    }
    out
}
