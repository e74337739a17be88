//! Static reference data for the simulated shop.
//!
//! # Responsibilities
//! - Hold the product and user tables every flow reads from
//! - Stay immutable for the lifetime of the process
//!
//! # Design Decisions
//! - Catalog is shared via `Arc` across all in-flight invocations
//! - No runtime mutation; a different dataset means a different `Catalog`

use serde::{Deserialize, Serialize};

/// A product available for purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Unique product identifier.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Unit price in the shop currency.
    pub price: f64,
}

/// A registered shop user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Contact address used for order confirmations.
    pub email: String,
}

/// Read-only product and user tables supplied to the engine at construction.
#[derive(Debug, Clone)]
pub struct Catalog {
    products: Vec<Product>,
    users: Vec<User>,
}

impl Catalog {
    /// Build a catalog from explicit tables.
    pub fn new(products: Vec<Product>, users: Vec<User>) -> Self {
        Self { products, users }
    }

    /// The built-in demo dataset: five products, three users.
    pub fn builtin() -> Self {
        let products = vec![
            product(1, "Widget A", 29.99),
            product(2, "Widget B", 49.99),
            product(3, "Gadget X", 99.99),
            product(4, "Gadget Y", 149.99),
            product(5, "Doohickey", 9.99),
        ];
        let users = vec![
            user(1, "Alice", "alice@example.com"),
            user(2, "Bob", "bob@example.com"),
            user(3, "Charlie", "charlie@example.com"),
        ];
        Self::new(products, users)
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    /// Look up a user by id.
    pub fn user_by_id(&self, id: u64) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }
}

fn product(id: u64, name: &str, price: f64) -> Product {
    Product {
        id,
        name: name.to_string(),
        price,
    }
}

fn user(id: u64, name: &str, email: &str) -> User {
    User {
        id,
        name: name.to_string(),
        email: email.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_dataset_shape() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.products().len(), 5);
        assert_eq!(catalog.users().len(), 3);
        assert_eq!(catalog.user_by_id(2).unwrap().name, "Bob");
        assert!(catalog.user_by_id(99).is_none());
    }

    #[test]
    fn product_serializes_for_api() {
        let p = Catalog::builtin().products()[0].clone();
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["name"], "Widget A");
        assert_eq!(json["price"], 29.99);
    }
}
