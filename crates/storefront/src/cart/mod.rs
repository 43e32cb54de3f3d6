//! Stock-aware, identity-partitioned cart store.
//!
//! The store is the single writer for the durable cart partitions: one blob
//! per identity (`cartItems_<userId>`) plus one shared anonymous partition
//! (`cartItems`). State is hydrated once at construction; every mutation
//! re-derives the current identity (so a login mid-session starts writing
//! the right partition), applies in memory, then synchronously persists the
//! owning partition before returning.
//!
//! Mutations either apply fully or not at all: a rejected operation returns
//! a [`CartRejection`] and leaves both memory and storage untouched.

use std::sync::Arc;

use milkmaster_core::{ProductId, UserId};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, warn};

use crate::identity::IdentityResolver;
use crate::models::{CartLine, CatalogItem};
use crate::storage::{StoragePort, keys};

/// Why a cart mutation was refused.
///
/// The `Display` text is the inline message shown next to the control that
/// triggered the mutation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CartRejection {
    /// The requested quantity exceeds the stock snapshot.
    #[error("Insufficient stock for {name}: requested {requested}, only {available} available")]
    InsufficientStock {
        name: String,
        requested: u64,
        available: u32,
    },

    /// A negative quantity was supplied.
    #[error("Quantity cannot be negative")]
    NegativeQuantity,
}

/// The cart store.
///
/// Holds every hydrated line (possibly spanning identities when the
/// underlying blob does); all public queries and mutations are scoped to
/// the identity current at call time.
pub struct CartStore {
    storage: Arc<dyn StoragePort>,
    identity: IdentityResolver,
    lines: Vec<CartLine>,
    open: bool,
}

impl CartStore {
    /// Create a store over the given storage port, hydrating the current
    /// identity's partition.
    ///
    /// A missing or corrupt partition hydrates as an empty cart.
    #[must_use]
    pub fn new(storage: Arc<dyn StoragePort>) -> Self {
        let identity = IdentityResolver::new(Arc::clone(&storage));
        let user = identity.resolve();
        let lines = hydrate(storage.as_ref(), user.as_ref());

        Self {
            storage,
            identity,
            lines,
            open: false,
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add a catalog item to the cart, merging with an existing line for
    /// the same `(product, identity)` pair.
    ///
    /// A merge that would push the quantity past the item's stock snapshot
    /// is rejected whole; the existing line keeps its previous quantity.
    ///
    /// # Errors
    ///
    /// Returns [`CartRejection::InsufficientStock`] when the requested
    /// quantity (alone or merged) exceeds `item.stock`.
    pub fn add_to_cart(&mut self, item: &CatalogItem) -> Result<(), CartRejection> {
        // A missing or zero quantity means "one more", matching the product
        // page's add button.
        let requested = item.quantity.map_or(1, |q| q.max(1));
        let user = self.identity.resolve();

        if let Some(existing) = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == item.product_id && l.user_id == user)
        {
            let merged = u64::from(existing.quantity) + u64::from(requested);
            if merged > u64::from(item.stock) {
                return Err(CartRejection::InsufficientStock {
                    name: item.name.clone(),
                    requested: merged,
                    available: item.stock,
                });
            }
            // merged <= stock, so the narrowing cannot lose value
            let merged = u32::try_from(merged).unwrap_or(item.stock);
            existing.quantity = merged;
            existing.stock = item.stock;
            existing.remaining_stock = item.stock - merged;
            existing.price = item.price;
        } else {
            if requested > item.stock {
                return Err(CartRejection::InsufficientStock {
                    name: item.name.clone(),
                    requested: u64::from(requested),
                    available: item.stock,
                });
            }
            self.lines.push(CartLine {
                product_id: item.product_id.clone(),
                user_id: user.clone(),
                name: item.name.clone(),
                image_url: item.image_url.clone(),
                price: item.price,
                quantity: requested,
                stock: item.stock,
                remaining_stock: item.stock - requested,
            });
        }

        debug!(product = %item.product_id, "Added to cart");
        self.persist(user.as_ref());
        Ok(())
    }

    /// Remove the current identity's line for `product`.
    ///
    /// Removing a line that does not exist is a no-op.
    pub fn remove_from_cart(&mut self, product: &ProductId) {
        let user = self.identity.resolve();
        self.lines
            .retain(|l| !(l.product_id == *product && l.user_id == user));
        self.persist(user.as_ref());
    }

    /// Set the quantity of the current identity's line for `product`.
    ///
    /// Zero delegates to [`Self::remove_from_cart`]; an unknown product is
    /// a no-op success.
    ///
    /// # Errors
    ///
    /// Returns [`CartRejection::NegativeQuantity`] for negative input and
    /// [`CartRejection::InsufficientStock`] when `new_quantity` exceeds the
    /// line's stock snapshot; the line is unchanged in both cases.
    pub fn update_quantity(
        &mut self,
        product: &ProductId,
        new_quantity: i64,
    ) -> Result<(), CartRejection> {
        if new_quantity < 0 {
            return Err(CartRejection::NegativeQuantity);
        }
        if new_quantity == 0 {
            self.remove_from_cart(product);
            return Ok(());
        }

        let user = self.identity.resolve();
        let Some(line) = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == *product && l.user_id == user)
        else {
            return Ok(());
        };

        if new_quantity > i64::from(line.stock) {
            return Err(CartRejection::InsufficientStock {
                name: line.name.clone(),
                requested: new_quantity.unsigned_abs(),
                available: line.stock,
            });
        }
        // 0 < new_quantity <= stock, so the narrowing cannot lose value
        let quantity = u32::try_from(new_quantity).unwrap_or(line.stock);
        line.quantity = quantity;
        line.remaining_stock = line.stock - quantity;

        self.persist(user.as_ref());
        Ok(())
    }

    /// Remove all of the current identity's lines and delete its partition.
    ///
    /// Lines belonging to other identities are untouched.
    pub fn clear_cart(&mut self) {
        let user = self.identity.resolve();
        self.lines.retain(|l| l.user_id != user);
        self.storage.remove(&partition_key(user.as_ref()));
        debug!(user = ?user, "Cleared cart partition");
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The current identity's lines, in insertion order.
    ///
    /// Anonymous sessions see only lines with no owner; identified sessions
    /// see only their own.
    #[must_use]
    pub fn user_cart_items(&self) -> Vec<CartLine> {
        let user = self.identity.resolve();
        self.lines
            .iter()
            .filter(|l| l.user_id == user)
            .cloned()
            .collect()
    }

    /// Total units across the current identity's lines.
    #[must_use]
    pub fn cart_count(&self) -> u32 {
        let user = self.identity.resolve();
        self.lines
            .iter()
            .filter(|l| l.user_id == user)
            .fold(0u32, |total, l| total.saturating_add(l.quantity))
    }

    /// Sum of `price * quantity` across the current identity's lines.
    #[must_use]
    pub fn cart_total(&self) -> Decimal {
        let user = self.identity.resolve();
        self.lines
            .iter()
            .filter(|l| l.user_id == user)
            .fold(Decimal::ZERO, |total, l| total + l.line_total())
    }

    /// Whether the current identity's cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let user = self.identity.resolve();
        !self.lines.iter().any(|l| l.user_id == user)
    }

    /// Flip the cart drawer's visibility flag.
    pub const fn toggle_cart(&mut self) {
        self.open = !self.open;
    }

    /// Whether the cart drawer is open. Pure UI state.
    #[must_use]
    pub const fn is_cart_open(&self) -> bool {
        self.open
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Serialize the owning identity's lines into its partition.
    fn persist(&self, user: Option<&UserId>) {
        let owned: Vec<&CartLine> = self
            .lines
            .iter()
            .filter(|l| l.user_id.as_ref() == user)
            .collect();
        match serde_json::to_string(&owned) {
            Ok(blob) => self.storage.set(&partition_key(user), &blob),
            Err(e) => warn!(error = %e, "Failed to serialize cart partition"),
        }
    }
}

fn partition_key(user: Option<&UserId>) -> String {
    user.map_or_else(
        || keys::CART_ANONYMOUS.to_string(),
        |u| format!("{}{u}", keys::CART_PREFIX),
    )
}

fn hydrate(storage: &dyn StoragePort, user: Option<&UserId>) -> Vec<CartLine> {
    let Some(blob) = storage.get(&partition_key(user)) else {
        return Vec::new();
    };
    match serde_json::from_str(&blob) {
        Ok(lines) => lines,
        Err(e) => {
            warn!(error = %e, "Discarding corrupt cart partition");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use milkmaster_core::Price;

    fn storage_for(user_id: Option<&str>) -> Arc<MemoryStorage> {
        let storage = Arc::new(MemoryStorage::new());
        if let Some(id) = user_id {
            storage.set(keys::USER, &format!(r#"{{"id":"{id}"}}"#));
        }
        storage
    }

    fn item(product: &str, price: &str, stock: u32, quantity: u32) -> CatalogItem {
        CatalogItem {
            product_id: ProductId::new(product),
            name: format!("Product {product}"),
            image_url: None,
            price: Price::new(price.parse().expect("decimal literal")),
            stock,
            quantity: Some(quantity),
        }
    }

    #[test]
    fn test_add_then_merge_respects_stock_bound() {
        // Add 3 of 5 in stock, then 3 more: the merge would exceed stock and
        // must be rejected whole, leaving the line at its previous quantity.
        let mut cart = CartStore::new(storage_for(Some("u1")));

        cart.add_to_cart(&item("p1", "50", 5, 3)).expect("first add");
        let items = cart.user_cart_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 3);
        assert_eq!(items[0].remaining_stock, 2);

        let rejection = cart.add_to_cart(&item("p1", "50", 5, 3)).expect_err("merge");
        assert_eq!(
            rejection,
            CartRejection::InsufficientStock {
                name: "Product p1".to_string(),
                requested: 6,
                available: 5,
            }
        );

        let items = cart.user_cart_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 3);
        assert_eq!(items[0].remaining_stock, 2);
    }

    #[test]
    fn test_add_rejects_initial_quantity_over_stock() {
        let mut cart = CartStore::new(storage_for(Some("u1")));
        assert!(cart.add_to_cart(&item("p1", "50", 2, 3)).is_err());
        assert!(cart.user_cart_items().is_empty());
    }

    #[test]
    fn test_add_upserts_single_line_per_product() {
        let mut cart = CartStore::new(storage_for(Some("u1")));
        cart.add_to_cart(&item("p1", "50", 10, 1)).expect("add");
        cart.add_to_cart(&item("p1", "50", 10, 2)).expect("merge");
        cart.add_to_cart(&item("p1", "50", 10, 1)).expect("merge again");

        let items = cart.user_cart_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 4);
    }

    #[test]
    fn test_add_missing_quantity_defaults_to_one() {
        let mut cart = CartStore::new(storage_for(Some("u1")));
        let mut it = item("p1", "50", 5, 1);
        it.quantity = None;
        cart.add_to_cart(&it).expect("add");
        it.quantity = Some(0);
        cart.add_to_cart(&it).expect("add zero treated as one");
        assert_eq!(cart.cart_count(), 2);
    }

    #[test]
    fn test_update_quantity_to_zero_removes_line() {
        let mut cart = CartStore::new(storage_for(Some("u1")));
        cart.add_to_cart(&item("p1", "50", 5, 3)).expect("add");

        cart.update_quantity(&ProductId::new("p1"), 0).expect("zero");
        assert_eq!(cart.cart_count(), 0);
        assert!(cart.user_cart_items().is_empty());
    }

    #[test]
    fn test_update_quantity_negative_rejected() {
        let mut cart = CartStore::new(storage_for(Some("u1")));
        cart.add_to_cart(&item("p1", "50", 5, 3)).expect("add");

        assert_eq!(
            cart.update_quantity(&ProductId::new("p1"), -1),
            Err(CartRejection::NegativeQuantity)
        );
        assert_eq!(cart.user_cart_items()[0].quantity, 3);
    }

    #[test]
    fn test_update_quantity_over_stock_rejected() {
        let mut cart = CartStore::new(storage_for(Some("u1")));
        cart.add_to_cart(&item("p1", "50", 5, 3)).expect("add");

        assert!(cart.update_quantity(&ProductId::new("p1"), 6).is_err());
        let items = cart.user_cart_items();
        assert_eq!(items[0].quantity, 3);
        assert_eq!(items[0].remaining_stock, 2);
    }

    #[test]
    fn test_update_quantity_recomputes_remaining_stock() {
        let mut cart = CartStore::new(storage_for(Some("u1")));
        cart.add_to_cart(&item("p1", "50", 5, 3)).expect("add");

        cart.update_quantity(&ProductId::new("p1"), 5).expect("update");
        let items = cart.user_cart_items();
        assert_eq!(items[0].quantity, 5);
        assert_eq!(items[0].remaining_stock, 0);
    }

    #[test]
    fn test_update_quantity_unknown_product_is_noop() {
        let mut cart = CartStore::new(storage_for(Some("u1")));
        cart.update_quantity(&ProductId::new("ghost"), 2).expect("no-op");
        assert!(cart.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut cart = CartStore::new(storage_for(Some("u1")));
        cart.add_to_cart(&item("p1", "50", 5, 1)).expect("add");

        cart.remove_from_cart(&ProductId::new("p1"));
        cart.remove_from_cart(&ProductId::new("p1"));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_cart_total_with_string_prices() {
        let mut cart = CartStore::new(storage_for(Some("u1")));
        cart.add_to_cart(&item("p1", "45.50", 10, 2)).expect("add");
        cart.add_to_cart(&item("p2", "60", 10, 3)).expect("add");

        // 45.50 * 2 + 60 * 3 = 271.00
        assert_eq!(cart.cart_total(), Decimal::new(27100, 2));
        assert_eq!(cart.cart_count(), 5);
    }

    #[test]
    fn test_partition_isolation() {
        // Seed another identity's line into the same partition blob that the
        // current user hydrates; queries must never see it.
        let storage = storage_for(Some("alice"));
        let foreign = serde_json::json!([{
            "productId": "p-bob",
            "userId": "bob",
            "name": "Bob's Cheese",
            "price": "99",
            "quantity": 1,
            "stock": 5,
            "remainingStock": 4
        }]);
        storage.set("cartItems_alice", &foreign.to_string());

        let mut cart = CartStore::new(Arc::clone(&storage) as Arc<dyn StoragePort>);
        assert!(cart.user_cart_items().is_empty());
        assert_eq!(cart.cart_count(), 0);

        cart.add_to_cart(&item("p1", "10", 5, 1)).expect("add");
        for line in cart.user_cart_items() {
            assert_eq!(line.user_id, Some(UserId::new("alice")));
        }
    }

    #[test]
    fn test_clear_cart_scoped_to_identity() {
        let storage = storage_for(Some("alice"));
        // Bob's partition must survive Alice clearing hers.
        storage.set("cartItems_bob", r#"[{"productId":"pb","userId":"bob","name":"B","price":"5","quantity":1,"stock":2,"remainingStock":1}]"#);

        let mut cart = CartStore::new(Arc::clone(&storage) as Arc<dyn StoragePort>);
        cart.add_to_cart(&item("p1", "10", 5, 2)).expect("add");
        assert!(storage.get("cartItems_alice").is_some());

        cart.clear_cart();
        assert!(cart.is_empty());
        assert_eq!(storage.get("cartItems_alice"), None);
        assert!(storage.get("cartItems_bob").is_some());
    }

    #[test]
    fn test_anonymous_cart_uses_shared_partition() {
        let storage = storage_for(None);
        let mut cart = CartStore::new(Arc::clone(&storage) as Arc<dyn StoragePort>);
        cart.add_to_cart(&item("p1", "10", 5, 1)).expect("add");

        assert!(storage.get(keys::CART_ANONYMOUS).is_some());
        let items = cart.user_cart_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].user_id, None);
    }

    #[test]
    fn test_login_mid_session_switches_partition() {
        let storage = storage_for(None);
        let mut cart = CartStore::new(Arc::clone(&storage) as Arc<dyn StoragePort>);
        cart.add_to_cart(&item("p1", "10", 5, 1)).expect("anonymous add");

        // Login happens: the auth module writes the user record. The next
        // mutation re-derives identity and writes the new partition.
        storage.set(keys::USER, r#"{"id":"carol"}"#);
        cart.add_to_cart(&item("p2", "20", 5, 1)).expect("identified add");

        assert!(storage.get("cartItems_carol").is_some());
        let items = cart.user_cart_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id, ProductId::new("p2"));
    }

    #[test]
    fn test_hydrates_persisted_partition() {
        let storage = storage_for(Some("u1"));
        {
            let mut cart = CartStore::new(Arc::clone(&storage) as Arc<dyn StoragePort>);
            cart.add_to_cart(&item("p1", "45.50", 10, 2)).expect("add");
        }

        let cart = CartStore::new(Arc::clone(&storage) as Arc<dyn StoragePort>);
        let items = cart.user_cart_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 2);
        assert_eq!(cart.cart_total(), Decimal::new(9100, 2));
    }

    #[test]
    fn test_corrupt_partition_hydrates_empty() {
        let storage = storage_for(Some("u1"));
        storage.set("cartItems_u1", "{{{ not json");

        let cart = CartStore::new(Arc::clone(&storage) as Arc<dyn StoragePort>);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_toggle_cart_flag() {
        let mut cart = CartStore::new(storage_for(None));
        assert!(!cart.is_cart_open());
        cart.toggle_cart();
        assert!(cart.is_cart_open());
        cart.toggle_cart();
        assert!(!cart.is_cart_open());
    }

    #[test]
    fn test_stock_bound_holds_across_mixed_mutations() {
        // Property: quantity never exceeds the stock supplied by the call
        // that last set it.
        let mut cart = CartStore::new(storage_for(Some("u1")));
        let p = ProductId::new("p1");

        let _ = cart.add_to_cart(&item("p1", "10", 4, 2));
        let _ = cart.add_to_cart(&item("p1", "10", 4, 5)); // rejected
        let _ = cart.update_quantity(&p, 9); // rejected
        let _ = cart.update_quantity(&p, 4); // allowed, hits the bound
        let _ = cart.add_to_cart(&item("p1", "10", 4, 1)); // rejected, full

        let items = cart.user_cart_items();
        assert_eq!(items.len(), 1);
        assert!(items[0].quantity <= items[0].stock);
        assert_eq!(items[0].quantity, 4);
    }
}
