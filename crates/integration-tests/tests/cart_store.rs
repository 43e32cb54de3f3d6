//! Integration tests for the cart store over real storage adapters.
//!
//! These exercise the persistence and partitioning behavior the unit tests
//! cannot: durable state across store instances, identity switches, and
//! blobs seeded in the legacy wire shape.

use std::sync::Arc;

use milkmaster_core::ProductId;
use milkmaster_integration_tests::{init_tracing, seed_cart_line, seeded_storage};
use milkmaster_storefront::cart::{CartRejection, CartStore};
use milkmaster_storefront::models::CatalogItem;
use milkmaster_storefront::storage::{FileStorage, StoragePort, keys};
use rust_decimal::Decimal;

fn catalog_item(product: &str, name: &str, price: &str, stock: u32, quantity: u32) -> CatalogItem {
    serde_json::from_value(serde_json::json!({
        "productId": product,
        "name": name,
        "price": price,
        "stock": stock,
        "quantity": quantity,
    }))
    .expect("catalog item")
}

#[test]
fn test_add_and_merge_against_stock_snapshot() {
    init_tracing();
    let storage = seeded_storage("u1", "u1@example.com");
    let mut cart = CartStore::new(storage as Arc<dyn StoragePort>);

    // Add 3 of 5 in stock
    cart.add_to_cart(&catalog_item("p1", "Full Cream Milk", "45.50", 5, 3))
        .expect("first add");
    let items = cart.user_cart_items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 3);
    assert_eq!(items[0].remaining_stock, 2);

    // Adding 3 more would exceed stock: rejected, line unchanged
    let rejection = cart
        .add_to_cart(&catalog_item("p1", "Full Cream Milk", "45.50", 5, 3))
        .expect_err("merge over stock");
    assert!(matches!(rejection, CartRejection::InsufficientStock { .. }));

    let items = cart.user_cart_items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 3);
}

#[test]
fn test_zero_quantity_update_empties_cart() {
    init_tracing();
    let storage = seeded_storage("u1", "u1@example.com");
    let mut cart = CartStore::new(storage as Arc<dyn StoragePort>);

    cart.add_to_cart(&catalog_item("p1", "Butter", "120", 5, 2))
        .expect("add");
    cart.update_quantity(&ProductId::new("p1"), 0).expect("zero");
    assert_eq!(cart.cart_count(), 0);
}

#[test]
fn test_cart_survives_restart_on_file_storage() {
    init_tracing();
    let path = std::env::temp_dir().join(format!("milkmaster-cart-{}.json", uuid::Uuid::new_v4()));

    {
        let storage = Arc::new(FileStorage::open(&path));
        storage.set(keys::USER, r#"{"id":"u1"}"#);
        let mut cart = CartStore::new(Arc::clone(&storage) as Arc<dyn StoragePort>);
        cart.add_to_cart(&catalog_item("p1", "Milk", "45.50", 10, 2))
            .expect("add");
        cart.add_to_cart(&catalog_item("p2", "Ghee", "549.50", 3, 1))
            .expect("add");
    }

    // A fresh adapter over the same file hydrates the same cart
    let storage = Arc::new(FileStorage::open(&path));
    storage.set(keys::USER, r#"{"id":"u1"}"#);
    let cart = CartStore::new(storage as Arc<dyn StoragePort>);

    let items = cart.user_cart_items();
    assert_eq!(items.len(), 2);
    // 45.50 * 2 + 549.50 = 640.50
    assert_eq!(cart.cart_total(), Decimal::new(64050, 2));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_total_matches_sum_over_seeded_wire_blob() {
    init_tracing();
    let storage = seeded_storage("u1", "u1@example.com");
    // Blob in the legacy wire shape, string-typed prices included
    seed_cart_line(storage.as_ref(), "u1", "p1", "Milk", "45.50", 2, 10);
    seed_cart_line(storage.as_ref(), "u1", "p2", "Paneer", "85", 3, 6);

    let cart = CartStore::new(storage as Arc<dyn StoragePort>);
    let expected: Decimal = cart
        .user_cart_items()
        .iter()
        .map(milkmaster_storefront::models::CartLine::line_total)
        .sum();
    assert_eq!(cart.cart_total(), expected);
    assert_eq!(cart.cart_total(), Decimal::new(34600, 2));
    assert_eq!(cart.cart_count(), 5);
}

#[test]
fn test_identity_switch_keeps_partitions_apart() {
    init_tracing();
    let storage = seeded_storage("alice", "alice@example.com");
    let mut cart = CartStore::new(Arc::clone(&storage) as Arc<dyn StoragePort>);
    cart.add_to_cart(&catalog_item("pa", "Alice Milk", "40", 5, 1))
        .expect("alice add");

    // The auth module switches the session to bob mid-flight
    storage.set(keys::USER, r#"{"id":"bob"}"#);
    cart.add_to_cart(&catalog_item("pb", "Bob Curd", "30", 5, 2))
        .expect("bob add");

    // Bob sees only his line; alice's partition is still on disk untouched
    let items = cart.user_cart_items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product_id, ProductId::new("pb"));
    assert!(storage.get("cartItems_alice").is_some());

    // Clearing bob's cart must not touch alice's partition
    cart.clear_cart();
    assert_eq!(storage.get("cartItems_bob"), None);
    let alice_blob = storage.get("cartItems_alice").expect("alice partition");
    assert!(alice_blob.contains("Alice Milk"));
}
