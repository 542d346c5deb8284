//! Core types and rules for the storefront.
//!
//! This crate has no I/O. It provides:
//!
//! - **Identifiers**: `UserId`, `ProductId`, `OrderId`, ...
//! - **Catalog**: `Product`, `ProductEdition`, `ProductFilter`
//! - **Checkout**: cart validation and order pricing (`quote`, `build_order`)
//! - **Lifecycle**: order status transitions and their side effects (`plan`)
//! - **Wallet**: ledger entries and cashback
//! - **Promotions**: `PromoCode`, `GiftCard`, `GameCode`
//! - **Users**: `User`, `Role`, `Capability`
//!
//! # Money
//!
//! All amounts are `i64` cents: an item priced $50 is `5000`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod checkout;
pub mod error;
pub mod game_code;
pub mod gift_card;
pub mod ids;
pub mod lifecycle;
pub mod money;
pub mod order;
pub mod product;
pub mod promo;
pub mod settings;
pub mod user;
pub mod wallet;

pub use checkout::{
    build_order, quote, Checkout, CheckoutItem, Quote, QuoteContext, StockLine, MAX_CART_LINES,
    MAX_LINE_QUANTITY,
};
pub use error::{DomainError, Result};
pub use game_code::{select_codes, GameCode, GameCodeFilter};
pub use gift_card::{GiftCard, MAX_BATCH_SIZE};
pub use ids::{
    EditionId, GameCodeId, GiftCardId, IdError, OrderId, ProductId, PromoCodeId, TransactionId,
    UserId,
};
pub use lifecycle::{plan, stock_lines, Effect, Plan, Transition};
pub use money::{format_cents, percent_of};
pub use order::{
    ContactInfo, Order, OrderFilter, OrderItem, OrderStatus, PaymentMethod, PaymentStatus,
    AUTO_CANCEL_REASON,
};
pub use product::{
    Product, ProductEdition, ProductFilter, ProductFlags, ProductKind, ProductSort,
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
pub use promo::{Discount, PromoCode, PromoCodeUsage, Redeemer};
pub use settings::{PaymentSettings, DEFAULT_COD_FEE_CENTS, DEFAULT_PAYMENT_DEADLINE_DAYS};
pub use user::{Capability, Role, User};
pub use wallet::{
    apply_delta, cashback_for, WalletChange, WalletTransaction, WalletTransactionKind,
    CASHBACK_PERCENT,
};
