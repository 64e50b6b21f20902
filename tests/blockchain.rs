mod common;

use common::{mint_keys, user};
use kitty_ledger::{
    blockchain::BlockChain,
    chaindb::{ChainDb, MemoryChain},
    crypto::Address,
    error::{ChainError, TxError},
    state::{MemoryState, StateDb},
    transaction::Transaction,
};
use std::sync::Arc;

async fn memory_blockchain() -> (Arc<BlockChain>, Arc<dyn ChainDb>) {
    let chain: Arc<dyn ChainDb> = Arc::new(MemoryChain::new());
    let bc = BlockChain::new(chain.clone(), Arc::new(MemoryState::new()), mint_keys().0)
        .await
        .unwrap();
    (bc, chain)
}

#[tokio::test]
async fn genesis_then_kitty_lookup() {
    let (bc, _) = memory_blockchain().await;
    let (mint_pk, mint_sk) = mint_keys();

    let genesis = Transaction::new_genesis(3, &mint_sk);
    bc.inject(genesis.clone()).await.unwrap();

    let kitty = bc.get_kitty_state(3).unwrap();
    assert_eq!(kitty.address, Address::from_public_key(&mint_pk));
    assert_eq!(kitty.transactions, vec![genesis.hash()]);
}

#[tokio::test]
async fn kitty_seven_moves_a_to_b_to_c() {
    let (bc, _) = memory_blockchain().await;
    let (mint_pk, mint_sk) = mint_keys();
    let a = Address::from_public_key(&mint_pk);
    let (b_sk, b) = user("b");
    let (_, c) = user("c");

    let mint = Transaction::new_genesis(7, &mint_sk);
    bc.inject(mint.clone()).await.unwrap();
    let to_b = Transaction::new_transfer(&mint, b, &mint_sk).unwrap();
    bc.inject(to_b.clone()).await.unwrap();
    let to_c = Transaction::new_transfer(&to_b, c, &b_sk).unwrap();
    bc.inject(to_c).await.unwrap();

    let b_state = bc.get_address_state(&b);
    assert!(b_state.kitties.is_empty());
    assert_eq!(b_state.transactions.len(), 2);

    assert_eq!(bc.get_address_state(&c).kitties.as_slice(), &[7]);
    assert!(bc.get_address_state(&a).kitties.is_empty());
    assert_eq!(bc.len().await, 3);
    assert_eq!(bc.get_kitty_state(7).unwrap().address, c);
}

#[tokio::test]
async fn transfer_by_non_owner_changes_nothing() {
    let (bc, _) = memory_blockchain().await;
    let (_, mint_sk) = mint_keys();
    let (b_sk, b) = user("b");
    let (_, c) = user("c");

    let mint = Transaction::new_genesis(1, &mint_sk);
    bc.inject(mint.clone()).await.unwrap();

    // b signs a transfer of a kitty it does not own
    let forged = {
        let fake_prev = Transaction { to: b, ..mint.clone() };
        let mut tx = Transaction::new_transfer(&fake_prev, c, &b_sk).unwrap();
        tx.prev = mint.hash();
        tx
    };

    let err = bc.inject(forged).await.unwrap_err();
    assert!(matches!(err, ChainError::Rejected(TxError::OwnershipMismatch { kitty_id: 1, .. })));
    assert_eq!(bc.len().await, 1);
    assert!(bc.get_address_state(&b).transactions.is_empty());
    assert!(bc.get_address_state(&c).kitties.is_empty());
}

#[tokio::test]
async fn double_mint_and_dangling_transfer_are_rejected() {
    let (bc, _) = memory_blockchain().await;
    let (_, mint_sk) = mint_keys();
    let (_, b) = user("b");

    let mint = Transaction::new_genesis(2, &mint_sk);
    bc.inject(mint.clone()).await.unwrap();
    assert!(matches!(
        bc.inject(Transaction::new_genesis(2, &mint_sk)).await,
        Err(ChainError::Rejected(TxError::PrevMismatch { .. }))
    ));

    let orphan_src = Transaction::new_genesis(5, &mint_sk);
    let orphan = Transaction::new_transfer(&orphan_src, b, &mint_sk).unwrap();
    assert!(matches!(
        bc.inject(orphan).await,
        Err(ChainError::Rejected(TxError::MissingPrev(5)))
    ));
    assert_eq!(bc.len().await, 1);
}

#[tokio::test]
async fn genesis_from_untrusted_key_is_rejected() {
    let (bc, _) = memory_blockchain().await;
    let (stranger, _) = user("stranger");
    assert!(matches!(
        bc.inject(Transaction::new_genesis(1, &stranger)).await,
        Err(ChainError::Rejected(_))
    ));
    assert_eq!(bc.len().await, 0);
}

#[tokio::test]
async fn replay_rebuilds_identical_state() {
    let (bc, chain) = memory_blockchain().await;
    let (_, mint_sk) = mint_keys();
    let (b_sk, b) = user("b");
    let (_, c) = user("c");

    let mut last = Vec::new();
    for id in 0..4 {
        let mint = Transaction::new_genesis(id, &mint_sk);
        bc.inject(mint.clone()).await.unwrap();
        last.push(mint);
    }
    for id in 0..2 {
        let tx = Transaction::new_transfer(&last[id], b, &mint_sk).unwrap();
        bc.inject(tx.clone()).await.unwrap();
        last[id] = tx;
    }
    bc.inject(Transaction::new_transfer(&last[0], c, &b_sk).unwrap()).await.unwrap();

    let replayed_state = Arc::new(MemoryState::new());
    let replayed = BlockChain::new(chain.clone(), replayed_state.clone(), mint_keys().0)
        .await
        .unwrap();
    assert_eq!(replayed.applied().await, 7);

    for id in 0..4 {
        assert_eq!(replayed.get_kitty_state(id), bc.get_kitty_state(id));
    }
    for addr in [b, c, Address::from_secret_key(&mint_sk)] {
        assert_eq!(replayed.get_address_state(&addr), bc.get_address_state(&addr));
    }

    // folding again is a no-op
    assert_eq!(replayed.catch_up().await.unwrap(), 0);
    assert_eq!(replayed_state.kitty_count(), 4);
}
