mod common;

use std::{sync::Arc, time::Duration};

use common::{checkout_request, world, world_with};
use marketplace_checkout::{
    error::AppError,
    models::CartOwner,
    services::{
        inventory::{InventoryLedger, MemoryInventory},
        pricing::ShippingPolicy,
    },
};
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_checkouts_cannot_oversell() -> anyhow::Result<()> {
    let w = world();
    let product = w.product(dec!(100), None, 10).await;

    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    w.carts.add(&CartOwner::User(alice), product, 6).await?;
    w.carts.add(&CartOwner::User(bob), product, 6).await?;

    let handles: Vec<_> = [alice, bob]
        .into_iter()
        .map(|user| {
            let checkout = w.checkout.clone();
            tokio::spawn(async move { checkout.checkout(user, checkout_request(None)).await })
        })
        .collect();

    let mut placed = 0;
    let mut short = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => placed += 1,
            Err(AppError::InsufficientStock { product_id }) => {
                assert_eq!(product_id, product);
                short += 1;
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!((placed, short), (1, 1));
    assert_eq!(w.inventory.available(product).await?, 4);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_user_checkout_is_serialized() -> anyhow::Result<()> {
    let w = world();
    let product = w.product(dec!(5), None, 100).await;
    let user = Uuid::new_v4();
    w.carts.add(&CartOwner::User(user), product, 2).await?;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let checkout = w.checkout.clone();
            tokio::spawn(async move { checkout.checkout(user, checkout_request(None)).await })
        })
        .collect();

    let mut placed = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => placed += 1,
            Err(AppError::CheckoutInProgress | AppError::EmptyCart) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(placed, 1);
    assert_eq!(w.inventory.available(product).await?, 98);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stock_is_conserved_under_interleaved_ledger_calls() -> anyhow::Result<()> {
    let ledger = Arc::new(MemoryInventory::new(Duration::from_secs(60)));
    let product = Uuid::new_v4();
    ledger.set_stock(product, 50).await;

    let handles: Vec<_> = (0..40u32)
        .map(|i| tokio::spawn(churn(ledger.clone(), product, i)))
        .collect();

    let mut sold = 0;
    for handle in handles {
        sold += handle.await??;
    }

    assert!(sold <= 50);
    assert_eq!(ledger.available(product).await?, 50 - sold);
    Ok(())
}

/// Reserves a varying amount, then commits or releases it. Returns the quantity sold.
async fn churn(ledger: Arc<MemoryInventory>, product: Uuid, i: u32) -> Result<u32, AppError> {
    let quantity = i % 4 + 1;
    let token = match ledger.reserve(product, quantity).await {
        Ok(token) => token,
        Err(AppError::InsufficientStock { .. }) => return Ok(0),
        Err(err) => return Err(err),
    };
    tokio::task::yield_now().await;
    if i % 3 == 0 {
        ledger.release(&token).await?;
        return Ok(0);
    }
    ledger.commit(&token).await?;
    // Committing twice is a no-op.
    ledger.commit(&token).await?;
    Ok(quantity)
}

#[tokio::test]
async fn abandoned_reservations_return_to_stock() -> anyhow::Result<()> {
    let w = world_with(ShippingPolicy::default(), Duration::from_millis(20));
    let product = w.product(dec!(1), None, 3).await;

    let token = w.inventory.reserve(product, 3).await?;
    assert_eq!(w.inventory.available(product).await?, 0);

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(w.inventory.release_expired().await?, 1);
    assert_eq!(w.inventory.available(product).await?, 3);

    // The holder comes back too late.
    assert!(matches!(
        w.inventory.commit(&token).await,
        Err(AppError::InvalidTokenState(_))
    ));
    assert_eq!(w.inventory.available(product).await?, 3);
    Ok(())
}
