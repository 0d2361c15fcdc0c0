use bigdecimal::BigDecimal;
use futures::future::join_all;
use std::sync::Arc;
use stockledger::adapters::MemoryLedgerStore;
use stockledger::domain::{Location, NewProduct, Unit};
use stockledger::ports::LedgerStore;
use stockledger::services::reporting::audit_ledger;
use stockledger::services::stock_engine::{AdjustmentRequest, MovementRequest};
use stockledger::services::{LedgerError, StockMutationEngine};
use uuid::Uuid;

async fn seeded(stock: i64) -> (Arc<MemoryLedgerStore>, StockMutationEngine, Uuid) {
    let store = Arc::new(MemoryLedgerStore::default());
    let product = NewProduct {
        sku: "RACE-1".to_string(),
        barcode: None,
        name: "Contended widget".to_string(),
        description: None,
        category_id: None,
        supplier_id: None,
        unit: Unit::Piece,
        cost_price: BigDecimal::from(1),
        selling_price: BigDecimal::from(2),
        min_stock_level: BigDecimal::from(0),
        max_stock_level: None,
        location: Location::default(),
        tags: Vec::new(),
    }
    .into_product()
    .unwrap();
    store.insert_product(&product).await.unwrap();

    let engine = StockMutationEngine::new(store.clone());
    engine
        .stock_in(Uuid::new_v4(), movement(product.id, stock, "opening balance"))
        .await
        .unwrap();
    (store, engine, product.id)
}

fn movement(product_id: Uuid, quantity: i64, reason: &str) -> MovementRequest {
    MovementRequest {
        product_id,
        quantity: BigDecimal::from(quantity),
        unit_price: None,
        reference: None,
        reference_number: None,
        location: None,
        reason: reason.to_string(),
        notes: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stock_outs_never_oversell() {
    let (store, engine, id) = seeded(10).await;

    let tasks = (0..25).map(|i| {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .stock_out(Uuid::new_v4(), movement(id, 1, &format!("order {}", i)))
                .await
        })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let insufficient = results
        .iter()
        .filter(|r| matches!(r, Err(LedgerError::InsufficientStock { .. })))
        .count();
    assert_eq!(successes, 10);
    assert_eq!(insufficient, 15);

    let product = store.get_product(id).await.unwrap();
    assert_eq!(product.current_stock, BigDecimal::from(0));

    // Each success saw a distinct balance, 10 down to 1.
    let mut seen: Vec<BigDecimal> = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .map(|entry| entry.previous_stock.clone())
        .collect();
    seen.sort();
    let expected: Vec<BigDecimal> = (1..=10).map(BigDecimal::from).collect();
    assert_eq!(seen, expected);

    let entries = store.product_transactions(id).await.unwrap();
    assert_eq!(entries.len(), 11);
    assert!(audit_ledger(&product, &entries).consistent);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_concurrent_mutations_stay_conserved() {
    let (store, engine, id) = seeded(50).await;

    let tasks = (0..40i64).map(|i| {
        let engine = engine.clone();
        tokio::spawn(async move {
            let actor = Uuid::new_v4();
            match i % 4 {
                0 => engine.stock_in(actor, movement(id, 3, "restock")).await,
                1 => engine.stock_out(actor, movement(id, 5, "sale")).await,
                2 => engine.record_damage(actor, movement(id, 2, "broken")).await,
                _ => {
                    engine
                        .adjust(
                            actor,
                            AdjustmentRequest {
                                product_id: id,
                                quantity: BigDecimal::from(20 + i),
                                reason: "recount".to_string(),
                                notes: None,
                            },
                        )
                        .await
                }
            }
        })
    });
    for joined in join_all(tasks).await {
        match joined.unwrap() {
            Ok(_) | Err(LedgerError::InsufficientStock { .. }) => {}
            Err(other) => panic!("unexpected failure: {}", other),
        }
    }

    let product = store.get_product(id).await.unwrap();
    assert!(product.current_stock >= BigDecimal::from(0));

    let entries = store.product_transactions(id).await.unwrap();
    let audit = audit_ledger(&product, &entries);
    assert!(audit.consistent, "{:?}", audit.violations);
    assert_eq!(audit.replayed_stock, product.current_stock);
}
