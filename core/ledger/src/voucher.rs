// tally/core/ledger/src/voucher.rs

//! Voucher authentication.
//!
//! A voucher is an off-chain authorization for one deposit or withdrawal. The
//! signed message commits to the account using it, the ledger deployment, the
//! chain, the amount, an expiry and the direction, plus a caller-chosen nonce.
//! Consumed vouchers are remembered forever.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tally_primitives::abi::{encode_words, word_from_address, word_from_u256, word_from_u64};
use tally_primitives::{eth_signed_message_hash, keccak256, Address, ChainId, Hash, Signature};
use tracing::{debug, warn};

use crate::error::{LedgerError, Result};
use crate::roles::{AccessControl, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Deposit,
    Withdraw,
}

impl Direction {
    pub fn as_u64(&self) -> u64 {
        match self {
            Direction::Deposit => 0,
            Direction::Withdraw => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Deposit => "deposit",
            Direction::Withdraw => "withdraw",
        }
    }
}

/// The structured tuple the signer authorizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherPayload {
    pub ledger: Address,
    pub chain_id: ChainId,
    pub amount: U256,
    pub expiry: u64,
    pub direction: Direction,
}

impl VoucherPayload {
    /// keccak256 over the ABI words of (account, payload, nonce)
    pub fn digest(&self, account: &Address, nonce: U256) -> Hash {
        let encoded = encode_words(&[
            word_from_address(account),
            word_from_address(&self.ledger),
            word_from_u64(self.chain_id),
            word_from_u256(self.amount),
            word_from_u64(self.expiry),
            word_from_u64(self.direction.as_u64()),
            word_from_u256(nonce),
        ]);
        keccak256(&encoded)
    }

    /// The hash the signer actually signs (Ethereum personal message)
    pub fn signing_hash(&self, account: &Address, nonce: U256) -> Hash {
        eth_signed_message_hash(&self.digest(account, nonce))
    }
}

/// A voucher that passed every check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizedVoucher {
    pub signer: Address,
    pub amount: U256,
    pub direction: Direction,
    pub digest: Hash,
}

/// Where and when a voucher is being redeemed
#[derive(Debug, Clone, Copy)]
pub struct VerifyContext<'a> {
    pub ledger: Address,
    pub chain_id: ChainId,
    pub now: u64,
    pub roles: &'a AccessControl,
}

/// Replay set: signing hashes of every consumed voucher
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherAuthenticator {
    used: BTreeSet<Hash>,
}

impl VoucherAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_used<I: IntoIterator<Item = Hash>>(used: I) -> Self {
        Self {
            used: used.into_iter().collect(),
        }
    }

    pub fn is_used(&self, digest: &Hash) -> bool {
        self.used.contains(digest)
    }

    pub fn used(&self) -> impl Iterator<Item = &Hash> {
        self.used.iter()
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    /// Undo the consumption of a voucher whose operation was rolled back
    pub(crate) fn forget(&mut self, digest: &Hash) {
        self.used.remove(digest);
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    /// Check a voucher and, on success, mark it consumed.
    ///
    /// Order: ledger binding, chain binding, expiry, direction, signer role,
    /// replay. Nothing is recorded unless every check passes.
    pub fn verify(
        &mut self,
        ctx: &VerifyContext<'_>,
        account: &Address,
        payload: &VoucherPayload,
        nonce: U256,
        signature: &Signature,
        expected: Direction,
    ) -> Result<AuthorizedVoucher> {
        if payload.ledger != ctx.ledger {
            return Err(LedgerError::WrongLedger {
                expected: ctx.ledger,
                got: payload.ledger,
            });
        }
        if payload.chain_id != ctx.chain_id {
            return Err(LedgerError::WrongChain {
                expected: ctx.chain_id,
                got: payload.chain_id,
            });
        }
        if payload.expiry <= ctx.now {
            return Err(LedgerError::VoucherExpired {
                expiry: payload.expiry,
                now: ctx.now,
            });
        }
        if payload.direction != expected {
            return Err(LedgerError::WrongDirection {
                expected,
                got: payload.direction,
            });
        }

        let signing_hash = payload.signing_hash(account, nonce);
        let signer = signature.recover(&signing_hash)?;
        if !ctx.roles.has_role(Role::Signer, &signer) {
            warn!(%signer, %account, "voucher signed by non-signer");
            return Err(LedgerError::UnauthorizedSigner(signer));
        }

        if !self.used.insert(signing_hash) {
            warn!(%account, digest = %signing_hash, "voucher replay rejected");
            return Err(LedgerError::VoucherReplayed);
        }

        debug!(%account, %signer, direction = payload.direction.as_str(), "voucher accepted");
        Ok(AuthorizedVoucher {
            signer,
            amount: payload.amount,
            direction: payload.direction,
            digest: signing_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_primitives::LocalSigner;

    const CHAIN: ChainId = 31337;
    const NOW: u64 = 1_700_000_000;

    fn ledger() -> Address {
        Address::repeat_byte(0x1E)
    }

    fn account() -> Address {
        Address::repeat_byte(0xA1)
    }

    fn setup() -> (LocalSigner, AccessControl) {
        let signer = LocalSigner::from_secret(&[9u8; 32]).unwrap();
        let mut roles = AccessControl::new();
        roles.grant(Role::Signer, signer.address()).unwrap();
        (signer, roles)
    }

    fn payload(direction: Direction) -> VoucherPayload {
        VoucherPayload {
            ledger: ledger(),
            chain_id: CHAIN,
            amount: U256::from(500),
            expiry: NOW + 60,
            direction,
        }
    }

    fn sign(signer: &LocalSigner, payload: &VoucherPayload, nonce: u64) -> Signature {
        signer
            .sign_prehash(&payload.signing_hash(&account(), U256::from(nonce)))
            .unwrap()
    }

    fn ctx(roles: &AccessControl) -> VerifyContext<'_> {
        VerifyContext {
            ledger: ledger(),
            chain_id: CHAIN,
            now: NOW,
            roles,
        }
    }

    #[test]
    fn test_valid_voucher_accepted_once() {
        let (signer, roles) = setup();
        let mut auth = VoucherAuthenticator::new();
        let p = payload(Direction::Deposit);
        let sig = sign(&signer, &p, 1);

        let ok = auth
            .verify(&ctx(&roles), &account(), &p, U256::from(1), &sig, Direction::Deposit)
            .unwrap();
        assert_eq!(ok.signer, signer.address());
        assert_eq!(ok.amount, U256::from(500));
        assert!(auth.is_used(&ok.digest));

        let replay = auth.verify(&ctx(&roles), &account(), &p, U256::from(1), &sig, Direction::Deposit);
        assert_eq!(replay, Err(LedgerError::VoucherReplayed));
    }

    #[test]
    fn test_checks_fire_in_order() {
        let (signer, roles) = setup();
        let mut auth = VoucherAuthenticator::new();

        let mut p = payload(Direction::Deposit);
        p.ledger = Address::repeat_byte(0x2E);
        p.chain_id = 1;
        let sig = sign(&signer, &p, 1);
        // Wrong ledger is reported before wrong chain
        assert!(matches!(
            auth.verify(&ctx(&roles), &account(), &p, U256::from(1), &sig, Direction::Deposit),
            Err(LedgerError::WrongLedger { .. })
        ));

        let mut p = payload(Direction::Deposit);
        p.chain_id = 1;
        let sig = sign(&signer, &p, 1);
        assert_eq!(
            auth.verify(&ctx(&roles), &account(), &p, U256::from(1), &sig, Direction::Deposit),
            Err(LedgerError::WrongChain {
                expected: CHAIN,
                got: 1
            })
        );

        let mut p = payload(Direction::Deposit);
        p.expiry = NOW;
        let sig = sign(&signer, &p, 1);
        assert_eq!(
            auth.verify(&ctx(&roles), &account(), &p, U256::from(1), &sig, Direction::Deposit),
            Err(LedgerError::VoucherExpired {
                expiry: NOW,
                now: NOW
            })
        );
        assert!(auth.is_empty());
    }

    #[test]
    fn test_direction_is_bound() {
        let (signer, roles) = setup();
        let mut auth = VoucherAuthenticator::new();
        let p = payload(Direction::Deposit);
        let sig = sign(&signer, &p, 3);

        let err = auth
            .verify(&ctx(&roles), &account(), &p, U256::from(3), &sig, Direction::Withdraw)
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::WrongDirection {
                expected: Direction::Withdraw,
                got: Direction::Deposit,
            }
        );

        // Flipping the flag in the payload breaks the signature binding
        let mut flipped = p;
        flipped.direction = Direction::Withdraw;
        let err = auth
            .verify(&ctx(&roles), &account(), &flipped, U256::from(3), &sig, Direction::Withdraw)
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnauthorizedSigner(_)));
    }

    #[test]
    fn test_voucher_bound_to_account() {
        let (signer, roles) = setup();
        let mut auth = VoucherAuthenticator::new();
        let p = payload(Direction::Withdraw);
        let sig = sign(&signer, &p, 4);

        let thief = Address::repeat_byte(0xBB);
        let err = auth
            .verify(&ctx(&roles), &thief, &p, U256::from(4), &sig, Direction::Withdraw)
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnauthorizedSigner(_)));
    }

    #[test]
    fn test_unknown_signer_rejected() {
        let (_, roles) = setup();
        let rogue = LocalSigner::from_secret(&[3u8; 32]).unwrap();
        let mut auth = VoucherAuthenticator::new();
        let p = payload(Direction::Deposit);
        let sig = sign(&rogue, &p, 1);

        assert_eq!(
            auth.verify(&ctx(&roles), &account(), &p, U256::from(1), &sig, Direction::Deposit),
            Err(LedgerError::UnauthorizedSigner(rogue.address()))
        );
    }

    #[test]
    fn test_distinct_nonces_are_distinct_vouchers() {
        let (signer, roles) = setup();
        let mut auth = VoucherAuthenticator::new();
        let p = payload(Direction::Deposit);

        for nonce in 0..3u64 {
            let sig = sign(&signer, &p, nonce);
            auth.verify(&ctx(&roles), &account(), &p, U256::from(nonce), &sig, Direction::Deposit)
                .unwrap();
        }
        assert_eq!(auth.len(), 3);
    }
}
