// tally/core/ledger/src/ledger.rs

//! The ledger engine.
//!
//! Every mutating entry point runs inside a checkpoint: the durable state is
//! snapshotted, the operation applies its internal mutations, external token
//! calls happen last, and any error restores the snapshot and drops the events
//! emitted so far. A failed call therefore leaves no trace.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tally_primitives::{Address, ChainId, Hash, Signature};
use tracing::{debug, info, warn};

use crate::balances::{AccountBalance, BalanceStore, Release, SessionId};
use crate::config::LedgerParams;
use crate::error::{LedgerError, Result};
use crate::events::{LedgerEvent, SettledEntry};
use crate::metrics::{self, VOUCHERS_CONSUMED_TOTAL};
use crate::rate::{ExchangeRate, MAX_DECIMALS};
use crate::roles::{AccessControl, Role};
use crate::token::{BackingToken, FungibleToken};
use crate::voucher::{AuthorizedVoucher, Direction, VerifyContext, VoucherAuthenticator, VoucherPayload};

/// Who is calling and when (the execution environment's sender and block time)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub timestamp: u64,
}

impl CallContext {
    pub fn new(caller: Address, timestamp: u64) -> Self {
        Self { caller, timestamp }
    }
}

/// One participant's settlement in a payout batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutEntry {
    pub account: Address,
    pub is_winner: bool,
    pub amount: U256,
}

/// Everything the ledger persists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub address: Address,
    pub chain_id: ChainId,
    pub roles: AccessControl,
    pub balances: BalanceStore,
    pub vouchers: VoucherAuthenticator,
    pub rate: ExchangeRate,
    pub backing: BackingToken,
    pub paused: bool,
}

/// Pre-call state minus the used-voucher set, which only grows and is rolled
/// back by forgetting the digests redeemed during the call
struct Checkpoint {
    state: LedgerState,
    events: usize,
}

#[derive(Debug)]
pub struct Ledger {
    state: LedgerState,
    token: Arc<dyn FungibleToken>,
    events: Vec<LedgerEvent>,
    /// Vouchers consumed by the call in progress
    redeemed: Vec<Hash>,
}

impl Ledger {
    /// Initialize a fresh deployment
    pub fn new(params: LedgerParams, token: Arc<dyn FungibleToken>) -> Result<Self> {
        if params.address.is_zero() || params.backing_token.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        if token.address() != params.backing_token {
            return Err(LedgerError::TokenMismatch {
                expected: params.backing_token,
                got: token.address(),
            });
        }
        if token.decimals() > MAX_DECIMALS {
            return Err(LedgerError::UnsupportedDecimals(token.decimals()));
        }

        let mut roles = AccessControl::new();
        roles.grant(Role::Admin, params.admin)?;
        for (role, account) in &params.grants {
            roles.grant(*role, *account)?;
        }

        info!(
            "Ledger initialized at {} on chain {} backed by {} ({} decimals)",
            params.address,
            params.chain_id,
            token.address(),
            token.decimals()
        );

        Ok(Self {
            state: LedgerState {
                address: params.address,
                chain_id: params.chain_id,
                roles,
                balances: BalanceStore::new(),
                vouchers: VoucherAuthenticator::new(),
                rate: params.rate,
                backing: BackingToken::of(token.as_ref()),
                paused: false,
            },
            token,
            events: Vec::new(),
            redeemed: Vec::new(),
        })
    }

    /// Resume from persisted state; the token handle must match the recorded backing
    pub fn from_state(state: LedgerState, token: Arc<dyn FungibleToken>) -> Result<Self> {
        if token.address() != state.backing.address {
            return Err(LedgerError::TokenMismatch {
                expected: state.backing.address,
                got: token.address(),
            });
        }
        state.balances.check_invariants()?;
        Ok(Self {
            state,
            token,
            events: Vec::new(),
            redeemed: Vec::new(),
        })
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn token(&self) -> &Arc<dyn FungibleToken> {
        &self.token
    }

    pub fn address(&self) -> Address {
        self.state.address
    }

    pub fn rate(&self) -> ExchangeRate {
        self.state.rate
    }

    pub fn backing_token(&self) -> BackingToken {
        self.state.backing
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    pub fn total_supply(&self) -> U256 {
        self.state.balances.total_supply()
    }

    pub fn collected_fees(&self) -> U256 {
        self.state.balances.collected_fees()
    }

    pub fn has_role(&self, role: Role, account: &Address) -> bool {
        self.state.roles.has_role(role, account)
    }

    pub fn session_lock(&self, account: &Address, session: &SessionId) -> U256 {
        self.state.balances.session_lock(account, session)
    }

    /// Events emitted by committed operations since the last drain
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Read an account's balance. Reading another account needs `BalanceReader`.
    pub fn balance_of(&self, ctx: &CallContext, account: &Address) -> Result<AccountBalance> {
        if ctx.caller != *account && !self.has_role(Role::BalanceReader, &ctx.caller) {
            return Err(LedgerError::NotAuthorized {
                caller: ctx.caller,
                account: *account,
            });
        }
        Ok(self.state.balances.balance(account))
    }

    // ---------------------------------------------------------------------
    // Voucher-authenticated deposit / withdraw
    // ---------------------------------------------------------------------

    /// Deposit `payload.amount` external units; returns the ledger units credited
    pub fn deposit(
        &mut self,
        ctx: &CallContext,
        payload: &VoucherPayload,
        nonce: U256,
        signature: &Signature,
    ) -> Result<U256> {
        self.atomically("deposit", |ledger| {
            ledger.require_not_paused()?;
            let voucher = ledger.redeem(ctx, payload, nonce, signature, Direction::Deposit)?;
            let ledger_amount = ledger.state.rate.to_ledger_units(voucher.amount)?;
            ledger.state.balances.credit(&ctx.caller, ledger_amount)?;

            ledger.pull(&ctx.caller, voucher.amount)?;

            ledger.emit(LedgerEvent::Deposited {
                account: ctx.caller,
                external_amount: voucher.amount,
                ledger_amount,
                voucher: voucher.digest,
            });
            VOUCHERS_CONSUMED_TOTAL
                .with_label_values(&[Direction::Deposit.as_str()])
                .inc();
            info!(
                "Deposit: {} credited {} ledger units for {} external",
                ctx.caller, ledger_amount, voucher.amount
            );
            Ok(ledger_amount)
        })
    }

    /// Withdraw `payload.amount` ledger units to the caller; returns external units sent
    pub fn withdraw(
        &mut self,
        ctx: &CallContext,
        payload: &VoucherPayload,
        nonce: U256,
        signature: &Signature,
    ) -> Result<U256> {
        self.atomically("withdraw", |ledger| {
            ledger.withdraw_inner(ctx, payload, nonce, signature, ctx.caller)
        })
    }

    /// Withdraw to a different recipient
    pub fn withdraw_to(
        &mut self,
        ctx: &CallContext,
        payload: &VoucherPayload,
        nonce: U256,
        signature: &Signature,
        recipient: Address,
    ) -> Result<U256> {
        self.atomically("withdraw_to", |ledger| {
            if recipient.is_zero() {
                return Err(LedgerError::ZeroAddress);
            }
            ledger.withdraw_inner(ctx, payload, nonce, signature, recipient)
        })
    }

    fn withdraw_inner(
        &mut self,
        ctx: &CallContext,
        payload: &VoucherPayload,
        nonce: U256,
        signature: &Signature,
        recipient: Address,
    ) -> Result<U256> {
        self.require_not_paused()?;
        let voucher = self.redeem(ctx, payload, nonce, signature, Direction::Withdraw)?;
        self.state.balances.debit(&ctx.caller, voucher.amount)?;
        let external_amount = self.state.rate.to_external_units(voucher.amount)?;

        self.push(&recipient, external_amount)?;

        self.emit(LedgerEvent::Withdrawn {
            account: ctx.caller,
            recipient,
            ledger_amount: voucher.amount,
            external_amount,
            voucher: voucher.digest,
        });
        VOUCHERS_CONSUMED_TOTAL
            .with_label_values(&[Direction::Withdraw.as_str()])
            .inc();
        info!(
            "Withdraw: {} debited {} ledger units, {} external sent to {}",
            ctx.caller, voucher.amount, external_amount, recipient
        );
        Ok(external_amount)
    }

    // ---------------------------------------------------------------------
    // Administrative batches
    // ---------------------------------------------------------------------

    /// Pull the sum of `amounts` (external units) from the caller once and
    /// credit each account at the current rate
    pub fn admin_deposit(
        &mut self,
        ctx: &CallContext,
        accounts: &[Address],
        amounts: &[U256],
    ) -> Result<()> {
        self.atomically("admin_deposit", |ledger| {
            ledger.require_role(ctx, &[Role::Admin, Role::Manager, Role::LiveOps])?;
            ledger.require_not_paused()?;
            ensure_same_length(accounts.len(), amounts.len())?;

            let mut total = U256::zero();
            let mut ledger_amounts = Vec::with_capacity(accounts.len());
            for (account, amount) in accounts.iter().zip(amounts) {
                if account.is_zero() {
                    return Err(LedgerError::ZeroAddress);
                }
                total = total
                    .checked_add(*amount)
                    .ok_or(LedgerError::ArithmeticOverflow)?;
                let ledger_amount = ledger.state.rate.to_ledger_units(*amount)?;
                ledger.state.balances.credit(account, ledger_amount)?;
                ledger_amounts.push(ledger_amount);
            }

            ledger.pull(&ctx.caller, total)?;

            ledger.emit(LedgerEvent::AdminDeposited {
                operator: ctx.caller,
                accounts: accounts.to_vec(),
                external_amounts: amounts.to_vec(),
                ledger_amounts,
            });
            info!(
                "Admin deposit by {}: {} accounts, {} external pulled",
                ctx.caller,
                accounts.len(),
                total
            );
            Ok(())
        })
    }

    /// Sweep each account's unlocked balance to the paired recipient
    pub fn admin_withdraw_all_to(
        &mut self,
        ctx: &CallContext,
        accounts: &[Address],
        recipients: &[Address],
    ) -> Result<()> {
        self.atomically("admin_withdraw_all_to", |ledger| {
            ledger.require_role(ctx, &[Role::Admin, Role::LiveOps])?;
            ledger.require_not_paused()?;
            ensure_same_length(accounts.len(), recipients.len())?;
            ledger.sweep(ctx, accounts, recipients)
        })
    }

    /// Emergency drain: sweep each account's unlocked balance to itself
    pub fn withdraw_all_admin(&mut self, ctx: &CallContext, accounts: &[Address]) -> Result<()> {
        self.atomically("withdraw_all_admin", |ledger| {
            ledger.require_role(ctx, &[Role::Admin])?;
            ledger.require_paused()?;
            ledger.sweep(ctx, accounts, accounts)
        })
    }

    fn sweep(
        &mut self,
        ctx: &CallContext,
        accounts: &[Address],
        recipients: &[Address],
    ) -> Result<()> {
        if accounts.is_empty() {
            return Ok(());
        }
        if recipients.iter().any(Address::is_zero) {
            return Err(LedgerError::ZeroAddress);
        }

        let mut ledger_amounts = Vec::with_capacity(accounts.len());
        let mut external_amounts = Vec::with_capacity(accounts.len());
        let mut total_external = U256::zero();
        for account in accounts {
            let unlocked = self.state.balances.balance(account).unlocked;
            self.state.balances.debit(account, unlocked)?;
            let external = self.state.rate.to_external_units(unlocked)?;
            total_external = total_external
                .checked_add(external)
                .ok_or(LedgerError::ArithmeticOverflow)?;
            ledger_amounts.push(unlocked);
            external_amounts.push(external);
        }

        // Several transfers follow; make sure none of them can fail halfway
        let custody = self.token.balance_of(&self.state.address);
        if custody < total_external {
            return Err(LedgerError::Inconsistent(format!(
                "custody {} cannot cover sweep of {}",
                custody, total_external
            )));
        }
        for (recipient, amount) in recipients.iter().zip(&external_amounts) {
            self.push(recipient, *amount)?;
        }

        self.emit(LedgerEvent::AdminWithdrawn {
            operator: ctx.caller,
            accounts: accounts.to_vec(),
            recipients: recipients.to_vec(),
            ledger_amounts,
            external_amounts,
        });
        info!(
            "Admin sweep by {}: {} accounts, {} external sent",
            ctx.caller,
            accounts.len(),
            total_external
        );
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Locks and payouts
    // ---------------------------------------------------------------------

    pub fn lock(
        &mut self,
        ctx: &CallContext,
        account: &Address,
        session: SessionId,
        amount: U256,
    ) -> Result<()> {
        self.atomically("lock", |ledger| {
            ledger.require_role(ctx, &[Role::GameServer])?;
            ledger.require_not_paused()?;
            ledger.state.balances.lock(account, &session, amount)?;
            ledger.emit(LedgerEvent::Locked {
                account: *account,
                session,
                amount,
            });
            debug!("Locked {} for {} in {}", amount, account, session);
            Ok(())
        })
    }

    /// Lock without naming a session
    pub fn lock_default(&mut self, ctx: &CallContext, account: &Address, amount: U256) -> Result<()> {
        self.lock(ctx, account, SessionId::DEFAULT, amount)
    }

    /// Cancel an account's stake in a session, crediting it back in full
    pub fn unlock(&mut self, ctx: &CallContext, account: &Address, session: SessionId) -> Result<U256> {
        self.atomically("unlock", |ledger| {
            ledger.require_role(ctx, &[Role::GameServer])?;
            ledger.require_not_paused()?;
            let amount = ledger
                .state
                .balances
                .release_all(account, &session, Release::CreditBack)?;
            ledger.emit(LedgerEvent::Unlocked {
                account: *account,
                session,
                amount,
            });
            debug!("Unlocked {} for {} in {}", amount, account, session);
            Ok(amount)
        })
    }

    /// Settle a session.
    ///
    /// A winner's stake goes into the pot (burned) and `amount` is minted to
    /// their unlocked balance. A loser has `amount` burned from their stake and
    /// any leftover credited back. `rake` is minted into collected fees. Whether
    /// winnings balance losses is the caller's responsibility.
    pub fn payout(
        &mut self,
        ctx: &CallContext,
        session: SessionId,
        entries: &[PayoutEntry],
        rake: U256,
    ) -> Result<()> {
        self.atomically("payout", |ledger| {
            ledger.require_role(ctx, &[Role::GameServer])?;
            ledger.require_not_paused()?;

            let mut minted = U256::zero();
            let mut burned = U256::zero();
            let mut settled = Vec::with_capacity(entries.len());
            for entry in entries {
                if entry.account.is_zero() {
                    return Err(LedgerError::ZeroAddress);
                }
                let balances = &mut ledger.state.balances;
                let (stake_burned, credited_back) = if entry.is_winner {
                    let stake = balances.release_all(&entry.account, &session, Release::Burn)?;
                    balances.credit(&entry.account, entry.amount)?;
                    minted = checked_add(minted, entry.amount)?;
                    (stake, U256::zero())
                } else {
                    balances.release(&entry.account, &session, entry.amount, Release::Burn)?;
                    let leftover =
                        balances.release_all(&entry.account, &session, Release::CreditBack)?;
                    (entry.amount, leftover)
                };
                burned = checked_add(burned, stake_burned)?;
                settled.push(SettledEntry {
                    account: entry.account,
                    is_winner: entry.is_winner,
                    amount: entry.amount,
                    stake_burned,
                    credited_back,
                });
            }
            ledger.state.balances.mint_fees(rake)?;
            minted = checked_add(minted, rake)?;

            ledger.emit(LedgerEvent::PayoutProcessed {
                session,
                entries: settled,
                rake,
                minted,
                burned,
            });
            info!(
                "Payout for {}: {} entries, rake {}, minted {}, burned {}",
                session,
                entries.len(),
                rake,
                minted,
                burned
            );
            Ok(())
        })
    }

    /// Sweep `amount` ledger units of collected fees, converted, to `recipient`
    pub fn withdraw_fees(&mut self, ctx: &CallContext, recipient: Address, amount: U256) -> Result<U256> {
        self.atomically("withdraw_fees", |ledger| {
            ledger.require_role(ctx, &[Role::Admin, Role::Manager])?;
            if recipient.is_zero() {
                return Err(LedgerError::ZeroAddress);
            }
            ledger.state.balances.burn_fees(amount)?;
            let external_amount = ledger.state.rate.to_external_units(amount)?;

            ledger.push(&recipient, external_amount)?;

            ledger.emit(LedgerEvent::FeesWithdrawn {
                recipient,
                ledger_amount: amount,
                external_amount,
            });
            info!("Fees withdrawn: {} ({} external) to {}", amount, external_amount, recipient);
            Ok(external_amount)
        })
    }

    // ---------------------------------------------------------------------
    // Configuration
    // ---------------------------------------------------------------------

    pub fn set_rate(&mut self, ctx: &CallContext, numerator: U256, denominator: U256) -> Result<()> {
        self.atomically("set_rate", |ledger| {
            ledger.require_role(ctx, &[Role::Admin, Role::Manager])?;
            let new_rate = ExchangeRate::new(numerator, denominator)?;
            ledger.replace_rate(new_rate);
            Ok(())
        })
    }

    pub fn pause(&mut self, ctx: &CallContext) -> Result<()> {
        self.atomically("pause", |ledger| {
            ledger.require_role(ctx, &[Role::Admin])?;
            ledger.require_not_paused()?;
            ledger.state.paused = true;
            ledger.emit(LedgerEvent::Paused { by: ctx.caller });
            warn!("Ledger paused by {}", ctx.caller);
            Ok(())
        })
    }

    pub fn unpause(&mut self, ctx: &CallContext) -> Result<()> {
        self.atomically("unpause", |ledger| {
            ledger.require_role(ctx, &[Role::Admin])?;
            ledger.require_paused()?;
            ledger.state.paused = false;
            ledger.emit(LedgerEvent::Unpaused { by: ctx.caller });
            info!("Ledger unpaused by {}", ctx.caller);
            Ok(())
        })
    }

    pub fn grant_role(&mut self, ctx: &CallContext, role: Role, account: Address) -> Result<()> {
        self.atomically("grant_role", |ledger| {
            ledger.require_role(ctx, &[Role::Admin])?;
            if ledger.state.roles.grant(role, account)? {
                ledger.emit(LedgerEvent::RoleGranted {
                    role,
                    account,
                    by: ctx.caller,
                });
                info!("Role {} granted to {}", role, account);
            }
            Ok(())
        })
    }

    pub fn revoke_role(&mut self, ctx: &CallContext, role: Role, account: Address) -> Result<()> {
        self.atomically("revoke_role", |ledger| {
            ledger.require_role(ctx, &[Role::Admin])?;
            if ledger.state.roles.revoke(role, &account) {
                ledger.emit(LedgerEvent::RoleRevoked {
                    role,
                    account,
                    by: ctx.caller,
                });
                info!("Role {} revoked from {}", role, account);
            }
            Ok(())
        })
    }

    // ---------------------------------------------------------------------
    // Backing-token migration
    // ---------------------------------------------------------------------

    /// Swap the custodied token.
    ///
    /// The rate is rescaled so ledger units keep their value, and the caller
    /// funds exactly what a full exit of the supply pays out at that rate. The
    /// entire old custody goes back to the caller.
    pub fn set_token(&mut self, ctx: &CallContext, new_token: Arc<dyn FungibleToken>) -> Result<()> {
        self.atomically("set_token", |ledger| {
            ledger.require_role(ctx, &[Role::Admin])?;
            ledger.require_paused()?;

            let new_address = new_token.address();
            if new_address.is_zero() {
                return Err(LedgerError::ZeroAddress);
            }
            let old = ledger.state.backing;
            if new_address == old.address {
                return Err(LedgerError::SameToken(new_address));
            }
            let new_decimals = new_token.decimals();
            if new_decimals > MAX_DECIMALS {
                return Err(LedgerError::UnsupportedDecimals(new_decimals));
            }

            let supply = ledger.state.balances.total_supply();
            let new_rate = ledger
                .state
                .rate
                .rescale_for_decimals(old.decimals, new_decimals)?;
            let required_new = new_rate.to_external_units(supply)?;

            let custodian = ledger.state.address;
            let available = new_token
                .allowance(&ctx.caller, &custodian)
                .min(new_token.balance_of(&ctx.caller));
            if available < required_new {
                return Err(LedgerError::InsufficientAllowance {
                    need: required_new,
                    have: available,
                });
            }

            if !required_new.is_zero() {
                new_token.transfer_from(&custodian, &ctx.caller, &custodian, required_new)?;
            }
            let returned_old = ledger.token.balance_of(&custodian);
            if !returned_old.is_zero() {
                if let Err(err) = ledger.token.transfer(&custodian, &ctx.caller, returned_old) {
                    // Hand the new funding back before reverting
                    if !required_new.is_zero() {
                        new_token.transfer(&custodian, &ctx.caller, required_new)?;
                    }
                    return Err(err.into());
                }
            }

            ledger.state.backing = BackingToken::of(new_token.as_ref());
            ledger.token = new_token.clone();
            ledger.replace_rate(new_rate);
            ledger.emit(LedgerEvent::TokenMigrated {
                old_token: old.address,
                new_token: new_address,
                old_decimals: old.decimals,
                new_decimals,
                returned_old,
                deposited_new: required_new,
            });
            info!(
                "Backing token migrated {} -> {} ({} -> {} decimals), deposited {}, returned {}",
                old.address, new_address, old.decimals, new_decimals, required_new, returned_old
            );
            Ok(())
        })
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn atomically<T>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let checkpoint = self.snapshot();
        let token = self.token.clone();
        let result = f(self);
        if let Err(err) = &result {
            debug!("{} reverted: {}", operation, err);
            self.restore(checkpoint);
            self.token = token;
        }
        metrics::record_operation(operation, result.is_ok());
        result
    }

    fn snapshot(&mut self) -> Checkpoint {
        let vouchers = std::mem::take(&mut self.state.vouchers);
        let state = self.state.clone();
        self.state.vouchers = vouchers;
        self.redeemed.clear();
        Checkpoint {
            state,
            events: self.events.len(),
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        let mut vouchers = std::mem::take(&mut self.state.vouchers);
        for digest in self.redeemed.drain(..) {
            vouchers.forget(&digest);
        }
        self.state = checkpoint.state;
        self.state.vouchers = vouchers;
        self.events.truncate(checkpoint.events);
    }

    fn emit(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    fn replace_rate(&mut self, new_rate: ExchangeRate) {
        let old = self.state.rate;
        self.state.rate = new_rate;
        self.emit(LedgerEvent::RateChanged {
            old_numerator: old.numerator(),
            old_denominator: old.denominator(),
            numerator: new_rate.numerator(),
            denominator: new_rate.denominator(),
        });
        info!("Exchange rate changed {} -> {}", old, new_rate);
    }

    fn redeem(
        &mut self,
        ctx: &CallContext,
        payload: &VoucherPayload,
        nonce: U256,
        signature: &Signature,
        expected: Direction,
    ) -> Result<AuthorizedVoucher> {
        let verify = VerifyContext {
            ledger: self.state.address,
            chain_id: self.state.chain_id,
            now: ctx.timestamp,
            roles: &self.state.roles,
        };
        let voucher =
            self.state
                .vouchers
                .verify(&verify, &ctx.caller, payload, nonce, signature, expected)?;
        self.redeemed.push(voucher.digest);
        Ok(voucher)
    }

    fn require_role(&self, ctx: &CallContext, roles: &[Role]) -> Result<()> {
        self.state.roles.ensure_any(&ctx.caller, roles)
    }

    fn require_not_paused(&self) -> Result<()> {
        if self.state.paused {
            return Err(LedgerError::Paused);
        }
        Ok(())
    }

    fn require_paused(&self) -> Result<()> {
        if !self.state.paused {
            return Err(LedgerError::NotPaused);
        }
        Ok(())
    }

    /// Pull external units from `from` into custody
    fn pull(&self, from: &Address, amount: U256) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let custodian = self.state.address;
        self.token.transfer_from(&custodian, from, &custodian, amount)?;
        Ok(())
    }

    /// Send external units out of custody
    fn push(&self, to: &Address, amount: U256) -> Result<()> {
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        if amount.is_zero() {
            return Ok(());
        }
        self.token.transfer(&self.state.address, to, amount)?;
        Ok(())
    }
}

fn ensure_same_length(left: usize, right: usize) -> Result<()> {
    if left != right {
        return Err(LedgerError::ArrayLengthMismatch { left, right });
    }
    Ok(())
}

fn checked_add(a: U256, b: U256) -> Result<U256> {
    a.checked_add(b).ok_or(LedgerError::ArithmeticOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::InMemoryToken;

    fn admin() -> Address {
        Address::repeat_byte(0xAD)
    }

    fn server() -> Address {
        Address::repeat_byte(0x5E)
    }

    fn setup() -> (Ledger, InMemoryToken) {
        let token = InMemoryToken::new(Address::repeat_byte(0x70), 18);
        let params = LedgerParams {
            address: Address::repeat_byte(0x1E),
            chain_id: 1,
            admin: admin(),
            grants: vec![(Role::GameServer, server())],
            rate: ExchangeRate::one_to_one(),
            backing_token: token.address(),
        };
        let ledger = Ledger::new(params, Arc::new(token.clone())).unwrap();
        (ledger, token)
    }

    fn fund(ledger: &mut Ledger, token: &InMemoryToken, account: Address, amount: u64) {
        token.mint(&admin(), U256::from(amount)).unwrap();
        token.approve(&admin(), &ledger.address(), U256::from(amount));
        ledger
            .admin_deposit(
                &CallContext::new(admin(), 0),
                &[account],
                &[U256::from(amount)],
            )
            .unwrap();
    }

    #[test]
    fn test_new_rejects_mismatched_token() {
        let token = InMemoryToken::new(Address::repeat_byte(0x70), 18);
        let params = LedgerParams {
            address: Address::repeat_byte(0x1E),
            chain_id: 1,
            admin: admin(),
            grants: vec![],
            rate: ExchangeRate::one_to_one(),
            backing_token: Address::repeat_byte(0x71),
        };
        assert!(matches!(
            Ledger::new(params, Arc::new(token)),
            Err(LedgerError::TokenMismatch { .. })
        ));
    }

    #[test]
    fn test_failed_operation_leaves_no_trace() {
        let (mut ledger, token) = setup();
        let alice = Address::repeat_byte(0xA1);
        let bob = Address::repeat_byte(0xB0);
        fund(&mut ledger, &token, alice, 100);
        fund(&mut ledger, &token, bob, 10);
        let ctx = CallContext::new(server(), 0);
        ledger
            .lock(&ctx, &alice, SessionId::from_u64(1), U256::from(50))
            .unwrap();
        let after_lock = ledger.state().clone();
        let events_after_lock = ledger.events().len();

        let err = ledger
            .payout(
                &ctx,
                SessionId::from_u64(1),
                &[
                    PayoutEntry {
                        account: alice,
                        is_winner: true,
                        amount: U256::from(80),
                    },
                    PayoutEntry {
                        account: bob,
                        is_winner: false,
                        amount: U256::from(30),
                    },
                ],
                U256::from(5),
            )
            .unwrap_err();
        // Bob never locked, so the batch fails and Alice's settlement rolls back
        assert!(matches!(err, LedgerError::InsufficientLockedBalance { .. }));
        assert_eq!(ledger.state(), &after_lock);
        assert_eq!(ledger.events().len(), events_after_lock);
    }

    #[test]
    fn test_role_gates() {
        let (mut ledger, _) = setup();
        let nobody = CallContext::new(Address::repeat_byte(0x99), 0);

        assert!(matches!(
            ledger.pause(&nobody),
            Err(LedgerError::MissingRole { .. })
        ));
        assert!(matches!(
            ledger.set_rate(&nobody, U256::one(), U256::one()),
            Err(LedgerError::MissingRole { .. })
        ));
        assert!(matches!(
            ledger.lock_default(&nobody, &nobody.caller, U256::zero()),
            Err(LedgerError::MissingRole { .. })
        ));
    }

    #[test]
    fn test_pause_state_machine() {
        let (mut ledger, _) = setup();
        let ctx = CallContext::new(admin(), 0);

        assert_eq!(ledger.unpause(&ctx), Err(LedgerError::NotPaused));
        ledger.pause(&ctx).unwrap();
        assert!(ledger.is_paused());
        assert_eq!(ledger.pause(&ctx), Err(LedgerError::Paused));
        assert_eq!(
            ledger.admin_deposit(&ctx, &[], &[]),
            Err(LedgerError::Paused)
        );
        ledger.unpause(&ctx).unwrap();

        let events: Vec<_> = ledger.drain_events().iter().map(|e| e.name()).collect();
        assert_eq!(events, vec!["paused", "unpaused"]);
    }

    #[test]
    fn test_unlock_credits_back() {
        let (mut ledger, token) = setup();
        let alice = Address::repeat_byte(0xA1);
        fund(&mut ledger, &token, alice, 100);
        let ctx = CallContext::new(server(), 0);

        ledger.lock_default(&ctx, &alice, U256::from(40)).unwrap();
        assert_eq!(ledger.session_lock(&alice, &SessionId::DEFAULT), U256::from(40));
        let released = ledger.unlock(&ctx, &alice, SessionId::DEFAULT).unwrap();
        assert_eq!(released, U256::from(40));

        let balance = ledger
            .balance_of(&CallContext::new(alice, 0), &alice)
            .unwrap();
        assert_eq!(balance.unlocked, U256::from(100));
        assert_eq!(balance.locked, U256::zero());
    }

    #[test]
    fn test_grant_and_revoke_emit_once() {
        let (mut ledger, _) = setup();
        let ctx = CallContext::new(admin(), 0);
        let reader = Address::repeat_byte(0x4E);

        ledger.grant_role(&ctx, Role::BalanceReader, reader).unwrap();
        ledger.grant_role(&ctx, Role::BalanceReader, reader).unwrap();
        assert!(ledger.has_role(Role::BalanceReader, &reader));
        ledger.revoke_role(&ctx, Role::BalanceReader, reader).unwrap();
        assert!(!ledger.has_role(Role::BalanceReader, &reader));

        let names: Vec<_> = ledger.drain_events().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["role_granted", "role_revoked"]);
    }
}
