// Real, working tests for the storage module

use std::sync::Arc;
use tally_ledger::{
    CallContext, Direction, ExchangeRate, InMemoryToken, Ledger, LedgerParams, LedgerState, Role,
    SessionId, StateChanges, VoucherPayload,
};
use tally_primitives::{Address, LocalSigner, U256};
use tally_storage::db::column_families::{CF_ACCOUNTS, CF_METADATA};
use tally_storage::{StorageManager, StoreError};
use tempfile::TempDir;

fn admin() -> Address {
    Address::repeat_byte(0xAD)
}

fn server() -> Address {
    Address::repeat_byte(0x5E)
}

/// A ledger with funded accounts, an open session, fees and a pause
fn populated_state() -> LedgerState {
    let token = InMemoryToken::new(Address::repeat_byte(0x70), 6);
    let params = LedgerParams {
        address: Address::repeat_byte(0x1E),
        chain_id: 10,
        admin: admin(),
        grants: vec![(Role::GameServer, server())],
        rate: ExchangeRate::new(U256::from(2), U256::one()).unwrap(),
        backing_token: token.address(),
    };
    let mut ledger = Ledger::new(params, Arc::new(token.clone())).unwrap();

    let alice = Address::repeat_byte(0xA1);
    let bob = Address::repeat_byte(0xB0);
    token.mint(&admin(), U256::from(300)).unwrap();
    token.approve(&admin(), &ledger.address(), U256::from(300));

    let admin_ctx = CallContext::new(admin(), 0);
    let server_ctx = CallContext::new(server(), 0);
    ledger
        .admin_deposit(&admin_ctx, &[alice, bob], &[U256::from(100), U256::from(200)])
        .unwrap();
    ledger
        .lock(&server_ctx, &alice, SessionId::from_u64(3), U256::from(50))
        .unwrap();
    ledger
        .lock(&server_ctx, &bob, SessionId::from_u64(3), U256::from(50))
        .unwrap();
    ledger
        .payout(
            &server_ctx,
            SessionId::from_u64(3),
            &[tally_ledger::PayoutEntry {
                account: bob,
                is_winner: false,
                amount: U256::from(50),
            }],
            U256::from(10),
        )
        .unwrap();
    ledger.pause(&admin_ctx).unwrap();
    ledger.state().clone()
}

#[test]
fn test_empty_store_loads_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let storage = StorageManager::new(temp_dir.path()).unwrap();
    assert!(storage.ledger.load().unwrap().is_none());
}

#[test]
fn test_ledger_state_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let state = populated_state();

    {
        let storage = StorageManager::new(temp_dir.path()).unwrap();
        storage.ledger.save(&state).unwrap();
        storage.flush().unwrap();
    }

    // Reopen from disk
    let storage = StorageManager::new(temp_dir.path()).unwrap();
    let loaded = storage.ledger.load().unwrap().unwrap();
    assert_eq!(loaded, state);
    assert!(loaded.paused);
    assert_eq!(loaded.balances.collected_fees(), U256::from(10));
}

#[test]
fn test_save_removes_stale_records() {
    let temp_dir = TempDir::new().unwrap();
    let storage = StorageManager::new(temp_dir.path()).unwrap();
    let mut state = populated_state();
    storage.ledger.save(&state).unwrap();

    // Drain Alice entirely and forget a role; both must disappear from disk
    let alice = Address::repeat_byte(0xA1);
    let session = SessionId::from_u64(3);
    state
        .balances
        .release_all(&alice, &session, tally_ledger::Release::CreditBack)
        .unwrap();
    let unlocked = state.balances.balance(&alice).unlocked;
    state.balances.debit(&alice, unlocked).unwrap();
    state.roles.revoke(Role::GameServer, &server());
    storage.ledger.save(&state).unwrap();

    let loaded = storage.ledger.load().unwrap().unwrap();
    assert_eq!(loaded, state);
    assert!(!loaded.roles.has_role(Role::GameServer, &server()));
    assert!(storage
        .db
        .get_cf(CF_ACCOUNTS, &alice.0)
        .unwrap()
        .is_none());
}

#[test]
fn test_tampered_supply_is_detected() {
    let temp_dir = TempDir::new().unwrap();
    let storage = StorageManager::new(temp_dir.path()).unwrap();
    let state = populated_state();
    storage.ledger.save(&state).unwrap();

    // Drop an account record behind the store's back
    let bob = Address::repeat_byte(0xB0);
    let mut batch = storage.db.batch();
    storage
        .db
        .batch_delete_cf(&mut batch, CF_ACCOUNTS, &bob.0)
        .unwrap();
    storage.db.write_batch(batch).unwrap();

    let err = storage.ledger.load().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StoreError>(),
        Some(StoreError::Corrupted { .. })
    ));
    assert!(storage.db.exists_cf(CF_METADATA, b"ledger").unwrap());
}

/// Run one voucher deposit and persist only what it touched; returns the write count
fn deposit_and_apply(
    storage: &StorageManager,
    ledger: &mut Ledger,
    token: &InMemoryToken,
    signer: &LocalSigner,
    account: Address,
    nonce: u64,
) -> usize {
    token.mint(&account, U256::from(10)).unwrap();
    token.approve(&account, &ledger.address(), U256::from(10));
    let payload = VoucherPayload {
        ledger: ledger.address(),
        chain_id: 10,
        amount: U256::from(10),
        expiry: 1_000,
        direction: Direction::Deposit,
    };
    let nonce = U256::from(nonce);
    let signature = signer
        .sign_prehash(&payload.signing_hash(&account, nonce))
        .unwrap();

    let before = ledger.events().len();
    ledger
        .deposit(&CallContext::new(account, 0), &payload, nonce, &signature)
        .unwrap();
    let changes = StateChanges::from_events(&ledger.events()[before..]);
    storage.ledger.apply(ledger.state(), &changes).unwrap()
}

#[test]
fn test_apply_writes_do_not_grow_with_history() {
    let temp_dir = TempDir::new().unwrap();
    let storage = StorageManager::new(temp_dir.path()).unwrap();
    let token = InMemoryToken::new(Address::repeat_byte(0x70), 6);
    let signer = LocalSigner::from_secret(&[0x42; 32]).unwrap();
    let params = LedgerParams {
        address: Address::repeat_byte(0x1E),
        chain_id: 10,
        admin: admin(),
        grants: vec![(Role::Signer, signer.address())],
        rate: ExchangeRate::one_to_one(),
        backing_token: token.address(),
    };
    let mut ledger = Ledger::new(params, Arc::new(token.clone())).unwrap();
    storage.ledger.save(ledger.state()).unwrap();

    // Account row, voucher row and the singleton record
    let first = deposit_and_apply(&storage, &mut ledger, &token, &signer, Address::repeat_byte(1), 1);
    assert_eq!(first, 3);
    for i in 2..=50u8 {
        let account = Address::repeat_byte(i);
        let writes = deposit_and_apply(&storage, &mut ledger, &token, &signer, account, i as u64);
        assert_eq!(writes, first);
    }

    let loaded = storage.ledger.load().unwrap().unwrap();
    assert_eq!(&loaded, ledger.state());
    assert_eq!(loaded.vouchers.len(), 50);
    assert_eq!(loaded.balances.total_supply(), U256::from(500));
}

#[test]
fn test_apply_deletes_drained_rows() {
    let temp_dir = TempDir::new().unwrap();
    let storage = StorageManager::new(temp_dir.path()).unwrap();
    let token = InMemoryToken::new(Address::repeat_byte(0x70), 6);
    let params = LedgerParams {
        address: Address::repeat_byte(0x1E),
        chain_id: 10,
        admin: admin(),
        grants: vec![(Role::GameServer, server())],
        rate: ExchangeRate::one_to_one(),
        backing_token: token.address(),
    };
    let mut ledger = Ledger::new(params, Arc::new(token.clone())).unwrap();
    storage.ledger.save(ledger.state()).unwrap();

    let alice = Address::repeat_byte(0xA1);
    let session = SessionId::from_u64(3);
    let admin_ctx = CallContext::new(admin(), 0);
    let server_ctx = CallContext::new(server(), 0);
    token.mint(&admin(), U256::from(40)).unwrap();
    token.approve(&admin(), &ledger.address(), U256::from(40));

    let apply = |ledger: &mut Ledger, f: &dyn Fn(&mut Ledger)| {
        let before = ledger.events().len();
        f(ledger);
        let changes = StateChanges::from_events(&ledger.events()[before..]);
        storage.ledger.apply(ledger.state(), &changes).unwrap();
    };
    apply(&mut ledger, &|l| {
        l.admin_deposit(&admin_ctx, &[alice], &[U256::from(40)]).unwrap();
    });
    apply(&mut ledger, &|l| {
        l.lock(&server_ctx, &alice, session, U256::from(40)).unwrap();
    });
    let loaded = storage.ledger.load().unwrap().unwrap();
    assert_eq!(loaded.balances.session_lock(&alice, &session), U256::from(40));

    // Losing the whole stake empties both the session and the account
    apply(&mut ledger, &|l| {
        l.payout(
            &server_ctx,
            session,
            &[tally_ledger::PayoutEntry {
                account: alice,
                is_winner: false,
                amount: U256::from(40),
            }],
            U256::zero(),
        )
        .unwrap();
    });
    apply(&mut ledger, &|l| {
        l.revoke_role(&admin_ctx, Role::GameServer, server()).unwrap();
    });

    let loaded = storage.ledger.load().unwrap().unwrap();
    assert_eq!(&loaded, ledger.state());
    assert!(storage.db.get_cf(CF_ACCOUNTS, &alice.0).unwrap().is_none());
    assert!(!loaded.roles.has_role(Role::GameServer, &server()));
}
