// tally/core/primitives/src/crypto.rs

// secp256k1 signatures with Ethereum-style address recovery
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::types::{keccak256, Address, Hash};

const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("malformed signature")]
    Malformed,

    #[error("signature s value is not in the lower half order")]
    HighS,

    #[error("invalid recovery id: {0}")]
    InvalidRecoveryId(u8),

    #[error("public key recovery failed")]
    RecoveryFailed,

    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("signing failed")]
    SigningFailed,
}

/// Recoverable ECDSA signature laid out as `r ‖ s ‖ v`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u8,
}

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() != 65 {
            return Err(SignatureError::Malformed);
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self { r, s, v: bytes[64] })
    }

    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }

    /// Recover the signing address from a 32-byte prehash
    pub fn recover(&self, prehash: &Hash) -> Result<Address, SignatureError> {
        // v may be 27/28 (Ethereum) or 0/1 (raw)
        let recovery_byte = match self.v {
            27 | 28 => self.v - 27,
            0 | 1 => self.v,
            other => return Err(SignatureError::InvalidRecoveryId(other)),
        };
        let recid =
            RecoveryId::from_byte(recovery_byte).ok_or(SignatureError::InvalidRecoveryId(self.v))?;

        let mut sig_bytes = [0u8; 64];
        sig_bytes[..32].copy_from_slice(&self.r);
        sig_bytes[32..].copy_from_slice(&self.s);
        let signature =
            EcdsaSignature::from_slice(&sig_bytes).map_err(|_| SignatureError::Malformed)?;

        // Reject the malleable twin of every valid signature
        if signature.normalize_s().is_some() {
            return Err(SignatureError::HighS);
        }

        let key = VerifyingKey::recover_from_prehash(prehash.as_bytes(), &signature, recid)
            .map_err(|_| SignatureError::RecoveryFailed)?;
        Ok(Address::from_verifying_key(&key))
    }
}

/// Hash of a 32-byte digest wrapped as an Ethereum personal message
pub fn eth_signed_message_hash(digest: &Hash) -> Hash {
    let mut buf = Vec::with_capacity(PERSONAL_MESSAGE_PREFIX.len() + 32);
    buf.extend_from_slice(PERSONAL_MESSAGE_PREFIX);
    buf.extend_from_slice(digest.as_bytes());
    keccak256(&buf)
}

/// In-process secp256k1 key for operator tooling and tests
#[derive(Clone)]
pub struct LocalSigner {
    key: SigningKey,
}

impl LocalSigner {
    pub fn random() -> Self {
        Self {
            key: SigningKey::random(&mut OsRng),
        }
    }

    pub fn from_secret(secret: &[u8; 32]) -> Result<Self, SignatureError> {
        let key = SigningKey::from_slice(secret).map_err(|_| SignatureError::InvalidSecretKey)?;
        Ok(Self { key })
    }

    pub fn address(&self) -> Address {
        Address::from_verifying_key(self.key.verifying_key())
    }

    /// Sign a prehash, producing a low-s signature with v in {27, 28}
    pub fn sign_prehash(&self, prehash: &Hash) -> Result<Signature, SignatureError> {
        let (signature, recid) = self
            .key
            .sign_prehash_recoverable(prehash.as_bytes())
            .map_err(|_| SignatureError::SigningFailed)?;

        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(Signature {
            r,
            s,
            v: 27 + recid.to_byte(),
        })
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address())
            .finish()
    }
}
