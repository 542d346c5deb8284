//! Storage layer for the storefront.
//!
//! The [`Store`] trait is the only way the service touches persistent state.
//! Every compound operation (placing an order, changing its status, adjusting a
//! wallet, redeeming a gift card) is atomic: either all of its writes happen
//! or none do.
//!
//! Two backends are provided:
//!
//! - [`PgStore`]: `PostgreSQL` via `sqlx`, one transaction per operation with
//!   the rows it reads locked `FOR UPDATE`.
//! - [`MemoryStore`]: a mutex-guarded in-memory state, used in tests and when
//!   no database is configured.
//!
//! Reads of an order apply the lazy auto-cancel rule: an unpaid bank transfer
//! past its deadline is cancelled before it is returned.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod postgres;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use storefront_core::{
    Checkout, GameCode, GameCodeFilter, GiftCard, Order, OrderFilter, OrderId, PaymentSettings,
    Product, ProductFilter, ProductId, PromoCode, PromoCodeId, Redeemer, Role, Transition, User,
    UserId, WalletChange, WalletTransaction,
};

/// Fields an admin may change on a user. `None` leaves a field as is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New phone number.
    pub phone: Option<String>,
    /// New role.
    pub role: Option<Role>,
    /// Disable or re-enable the account.
    pub disabled: Option<bool>,
}

impl UserUpdate {
    /// Apply the update to `user`.
    pub fn apply(&self, user: &mut User, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            user.name.clone_from(name);
        }
        if let Some(phone) = &self.phone {
            user.phone = Some(phone.clone());
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(disabled) = self.disabled {
            user.disabled = disabled;
        }
        user.updated_at = now;
    }
}

/// Result of redeeming a gift card.
#[derive(Debug, Clone)]
pub struct Redemption {
    /// The card, now marked redeemed.
    pub gift_card: GiftCard,
    /// The wallet deposit it produced.
    pub transaction: WalletTransaction,
}

/// The storage trait defining all persistence operations.
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Users
    // =========================================================================

    /// Register a user profile. Returns the existing profile if the ID is
    /// already registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn register_user(&self, user: &User) -> Result<User>;

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_user(&self, user_id: &UserId) -> Result<Option<User>>;

    /// List users, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_users(&self, limit: usize, offset: usize) -> Result<Vec<User>>;

    /// Update a user's profile, role or disabled flag.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user doesn't exist.
    async fn update_user(
        &self,
        user_id: &UserId,
        update: &UserUpdate,
        now: DateTime<Utc>,
    ) -> Result<User>;

    // =========================================================================
    // Wallet
    // =========================================================================

    /// Apply a balance change and append its ledger entry atomically.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the user doesn't exist.
    /// - `DomainError::InsufficientWallet` if the balance would go negative.
    async fn adjust_wallet(
        &self,
        user_id: &UserId,
        change: WalletChange,
        now: DateTime<Utc>,
    ) -> Result<WalletTransaction>;

    /// List a user's ledger, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_wallet_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WalletTransaction>>;

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Insert or replace a product together with its editions.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_product(&self, product: &Product) -> Result<()>;

    /// Get a product by ID, inactive ones included.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>>;

    /// List products matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>>;

    // =========================================================================
    // Promo codes
    // =========================================================================

    /// Insert or replace a promo code.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if another promo uses the same code.
    async fn put_promo_code(&self, promo: &PromoCode) -> Result<()>;

    /// Get a promo code by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_promo_code(&self, promo_id: &PromoCodeId) -> Result<Option<PromoCode>>;

    /// Get a promo code by its normalized code.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_promo_code(&self, code: &str) -> Result<Option<PromoCode>>;

    /// List all promo codes, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_promo_codes(&self) -> Result<Vec<PromoCode>>;

    /// How often `redeemer` already used the promo code.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn count_promo_usages(&self, promo_id: &PromoCodeId, redeemer: &Redeemer)
        -> Result<u32>;

    // =========================================================================
    // Payment settings
    // =========================================================================

    /// Current payment settings (defaults if never saved).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_payment_settings(&self) -> Result<PaymentSettings>;

    /// Replace the payment settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_payment_settings(&self, settings: &PaymentSettings) -> Result<()>;

    // =========================================================================
    // Orders
    // =========================================================================

    /// Validate, price and persist a checkout atomically.
    ///
    /// Writes the order and its items, decrements stock, records the promo
    /// redemption and debits the wallet, or nothing at all.
    ///
    /// # Errors
    ///
    /// - `DomainError` for any rejected business rule.
    /// - `StoreError::NotFound` if the signed-in user has no profile.
    async fn place_order(&self, checkout: &Checkout, now: DateTime<Utc>) -> Result<Order>;

    /// Get an order by ID, auto-cancelling it first if it is overdue.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_order(&self, order_id: &OrderId, now: DateTime<Utc>) -> Result<Option<Order>>;

    /// Get an order by order number, auto-cancelling it first if it is overdue.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_order_by_number(
        &self,
        order_number: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>>;

    /// List orders matching `filter`, newest first.
    ///
    /// Overdue orders in the result are auto-cancelled first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_orders(&self, filter: &OrderFilter, now: DateTime<Utc>) -> Result<Vec<Order>>;

    /// Apply a status transition and its side effects atomically.
    ///
    /// Re-applying the current status returns the order unchanged.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the order doesn't exist.
    /// - `DomainError` if the transition is not allowed.
    async fn transition_order(
        &self,
        order_id: &OrderId,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<Order>;

    /// Auto-cancel every overdue bank transfer order.
    ///
    /// Returns the IDs of the cancelled orders.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn cancel_overdue_orders(&self, now: DateTime<Utc>) -> Result<Vec<OrderId>>;

    // =========================================================================
    // Game codes
    // =========================================================================

    /// Add codes to the pool.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if a code already exists. Nothing is added.
    async fn add_game_codes(&self, codes: &[GameCode]) -> Result<()>;

    /// List codes matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_game_codes(&self, filter: &GameCodeFilter) -> Result<Vec<GameCode>>;

    /// Attach codes to an order.
    ///
    /// `codes` are explicit pool codes; with `auto_fill` the remaining lines
    /// are covered from the pool. Returns every code now on the order.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the order or a code doesn't exist.
    /// - `StoreError::Conflict` if a code is already used.
    /// - `DomainError::MissingGameCodes` if `auto_fill` cannot cover the order.
    async fn attach_game_codes(
        &self,
        order_id: &OrderId,
        codes: &[String],
        auto_fill: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<GameCode>>;

    // =========================================================================
    // Gift cards
    // =========================================================================

    /// Store newly issued gift cards.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if a code already exists.
    async fn add_gift_cards(&self, cards: &[GiftCard]) -> Result<()>;

    /// List gift cards, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_gift_cards(&self, limit: usize, offset: usize) -> Result<Vec<GiftCard>>;

    /// Redeem a card into the user's wallet atomically.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the code or user doesn't exist.
    /// - `DomainError::GiftCardRedeemed` / `DomainError::GiftCardExpired`.
    async fn redeem_gift_card(
        &self,
        code: &str,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Redemption>;

    // =========================================================================
    // Health
    // =========================================================================

    /// Check that the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    async fn health_check(&self) -> Result<()>;
}
