//! # Cart Document
//!
//! The cart as stored: an owner and an ordered set of (product, quantity)
//! lines. Every mutation here is pure; stock checks happen in the engine
//! before these methods are called.
//!
//! ## Cart Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Line Operations                                 │
//! │                                                                         │
//! │  Engine Operation         Cart Method             Line Change           │
//! │  ────────────────         ───────────             ───────────           │
//! │                                                                         │
//! │  add_line() ─────────────► add_quantity() ──────► merge or push         │
//! │                                                                         │
//! │  set_line_quantity() ────► set_quantity() ──────► lines[i].qty = n      │
//! │                                                                         │
//! │  remove_line() ──────────► remove_line() ───────► lines.remove(i)       │
//! │                                                                         │
//! │  replace_all_lines() ────► replace_lines() ─────► lines = merged        │
//! │                                                                         │
//! │  clear_cart() ───────────► clear() ─────────────► lines.clear()         │
//! │                                                                         │
//! │  purchase() ─────────────► deduct_purchased() ──► qty -= purchased      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - Product ids are unique across lines (adding the same product merges)
//! - Every line has quantity >= 1
//! - At most MAX_CART_LINES lines

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Product, PurchasedLine};
use crate::validation::validate_quantity;
use crate::{GUEST_OWNER, MAX_CART_LINES};

// =============================================================================
// Owner
// =============================================================================

/// Who a cart belongs to.
///
/// Serialised as a plain string: the user reference, or `"guest"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CartOwner {
    /// A signed-in user (id or e-mail).
    User(String),
    /// Anonymous visitor.
    Guest,
}

impl CartOwner {
    /// Owner from an optional user reference; blank or absent means guest.
    pub fn from_user(user: Option<String>) -> Self {
        match user {
            Some(u) if !u.trim().is_empty() => CartOwner::from(u),
            _ => CartOwner::Guest,
        }
    }

    /// The stored representation.
    pub fn as_str(&self) -> &str {
        match self {
            CartOwner::User(u) => u,
            CartOwner::Guest => GUEST_OWNER,
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, CartOwner::Guest)
    }
}

impl From<String> for CartOwner {
    fn from(value: String) -> Self {
        if value == GUEST_OWNER {
            CartOwner::Guest
        } else {
            CartOwner::User(value)
        }
    }
}

impl From<CartOwner> for String {
    fn from(owner: CartOwner) -> Self {
        match owner {
            CartOwner::User(u) => u,
            CartOwner::Guest => GUEST_OWNER.to_string(),
        }
    }
}

// =============================================================================
// Cart Line
// =============================================================================

/// One (product, quantity) entry in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CartLine {
    pub product_id: String,
    pub quantity: i64,
}

impl CartLine {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        CartLine {
            product_id: product_id.into(),
            quantity,
        }
    }
}

// =============================================================================
// Cart
// =============================================================================

/// A persisted shopping cart.
///
/// `version` is owned by the cart store: it is bumped on every successful
/// save and used to detect concurrent writers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Cart {
    pub id: String,
    #[ts(as = "String")]
    pub owner: CartOwner,
    pub lines: Vec<CartLine>,
    pub version: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates a new empty cart (version 0, never saved).
    pub fn new(id: impl Into<String>, owner: CartOwner) -> Self {
        let now = Utc::now();
        Cart {
            id: id.into(),
            owner,
            lines: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the line for `product_id`, if present.
    pub fn line(&self, product_id: &str) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    /// Quantity currently held for `product_id` (0 when absent).
    pub fn quantity_of(&self, product_id: &str) -> i64 {
        self.line(product_id).map(|l| l.quantity).unwrap_or(0)
    }

    /// Adds `quantity` units, merging onto an existing line.
    ///
    /// ## Returns
    /// The line's quantity after the merge.
    ///
    /// ## Errors
    /// - `Validation` if `quantity` is not positive or the merged total
    ///   overflows
    /// - `CartTooLarge` if a new line would exceed MAX_CART_LINES
    pub fn add_quantity(&mut self, product_id: &str, quantity: i64) -> CoreResult<i64> {
        validate_quantity(quantity)?;

        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product_id) {
            let merged = line
                .quantity
                .checked_add(quantity)
                .ok_or_else(quantity_overflow)?;
            line.quantity = merged;
            self.touch();
            return Ok(merged);
        }

        if self.lines.len() >= MAX_CART_LINES {
            return Err(CoreError::CartTooLarge {
                max: MAX_CART_LINES,
            });
        }

        self.lines.push(CartLine::new(product_id, quantity));
        self.touch();
        Ok(quantity)
    }

    /// Replaces one line's quantity.
    ///
    /// Unlike a UI cart, a zero quantity is rejected rather than treated as
    /// a removal; callers use [`Cart::remove_line`] for that.
    pub fn set_quantity(&mut self, product_id: &str, quantity: i64) -> CoreResult<()> {
        validate_quantity(quantity)?;

        let cart_id = self.id.clone();
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or_else(|| CoreError::LineNotFound {
                cart_id,
                product_id: product_id.to_string(),
            })?;

        line.quantity = quantity;
        self.touch();
        Ok(())
    }

    /// Removes the line for `product_id`.
    pub fn remove_line(&mut self, product_id: &str) -> CoreResult<CartLine> {
        let position = self
            .lines
            .iter()
            .position(|l| l.product_id == product_id)
            .ok_or_else(|| CoreError::LineNotFound {
                cart_id: self.id.clone(),
                product_id: product_id.to_string(),
            })?;

        let removed = self.lines.remove(position);
        self.touch();
        Ok(removed)
    }

    /// Replaces every line. Duplicates are merged before the limits apply.
    pub fn replace_lines(&mut self, lines: Vec<CartLine>) -> CoreResult<()> {
        let merged = check_lines(lines)?;
        self.lines = merged;
        self.touch();
        Ok(())
    }

    /// Empties the cart, keeping the record.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.touch();
    }

    /// Takes purchased quantities off their lines.
    ///
    /// A line reaching zero is dropped. Units added to a line after checkout
    /// loaded the cart stay in it. Returns how many lines were removed.
    pub fn deduct_purchased(&mut self, purchased: &[PurchasedLine]) -> usize {
        let before = self.lines.len();
        let mut changed = false;

        for bought in purchased {
            if let Some(line) = self
                .lines
                .iter_mut()
                .find(|l| l.product_id == bought.product_id)
            {
                line.quantity = line.quantity.saturating_sub(bought.quantity);
                changed = true;
            }
        }

        self.lines.retain(|l| l.quantity > 0);
        if changed {
            self.touch();
        }
        before - self.lines.len()
    }

    /// Number of distinct lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Sum of all line quantities.
    pub fn total_quantity(&self) -> i64 {
        self.lines
            .iter()
            .fold(0i64, |total, l| total.saturating_add(l.quantity))
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Merges duplicates and checks quantities and the line limit on a full
/// line set.
///
/// Used by `replace_lines` and when a cart is created with initial lines.
pub fn check_lines(lines: Vec<CartLine>) -> CoreResult<Vec<CartLine>> {
    let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());

    for line in lines {
        validate_quantity(line.quantity)?;

        match merged.iter_mut().find(|l| l.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(line.quantity)
                    .ok_or_else(quantity_overflow)?;
            }
            None => merged.push(line),
        }
    }

    if merged.len() > MAX_CART_LINES {
        return Err(CoreError::CartTooLarge {
            max: MAX_CART_LINES,
        });
    }

    Ok(merged)
}

fn quantity_overflow() -> CoreError {
    ValidationError::OutOfRange {
        field: "quantity".to_string(),
        min: 1,
        max: i64::MAX,
    }
    .into()
}

// =============================================================================
// Cart View
// =============================================================================

/// A cart line joined with its current product details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CartViewLine {
    pub product_id: String,
    pub quantity: i64,
    /// `None` when the product no longer exists.
    pub title: Option<String>,
    pub unit_price_cents: Option<i64>,
    pub line_total_cents: Option<i64>,
    /// Stock visible right now (advisory).
    pub stock: Option<i64>,
    /// False when the product is missing or deactivated.
    pub available: bool,
}

/// Cart populated with product details, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CartView {
    pub cart_id: String,
    #[ts(as = "String")]
    pub owner: CartOwner,
    pub lines: Vec<CartViewLine>,
    pub total_quantity: i64,
    /// Sum over lines whose product still exists, at current prices.
    pub subtotal_cents: i64,
    pub version: i64,
}

impl CartView {
    /// Joins `cart` with product lookups, in line order.
    pub fn build<'a, F>(cart: &Cart, mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<&'a Product>,
    {
        let lines: Vec<CartViewLine> = cart
            .lines
            .iter()
            .map(|line| match lookup(&line.product_id) {
                Some(product) => CartViewLine {
                    product_id: line.product_id.clone(),
                    quantity: line.quantity,
                    title: Some(product.title.clone()),
                    unit_price_cents: Some(product.price_cents),
                    line_total_cents: Some(product.price().multiply_quantity(line.quantity).cents()),
                    stock: Some(product.stock),
                    available: product.is_active,
                },
                None => CartViewLine {
                    product_id: line.product_id.clone(),
                    quantity: line.quantity,
                    title: None,
                    unit_price_cents: None,
                    line_total_cents: None,
                    stock: None,
                    available: false,
                },
            })
            .collect();

        let subtotal: Money = lines
            .iter()
            .filter_map(|l| l.line_total_cents)
            .map(Money::from_cents)
            .sum();

        CartView {
            cart_id: cart.id.clone(),
            owner: cart.owner.clone(),
            total_quantity: cart.total_quantity(),
            subtotal_cents: subtotal.cents(),
            version: cart.version,
            lines,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
