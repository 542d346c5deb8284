//! Request and response types for the storefront client.

use serde::{Deserialize, Serialize};

use storefront_core::{
    CheckoutItem, ContactInfo, Order, PaymentMethod, Product, WalletTransaction,
};

/// Checkout request.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    /// Cart lines.
    pub items: Vec<CheckoutItem>,
    /// Contact details.
    pub contact: ContactInfo,
    /// Payment method.
    pub payment_method: PaymentMethod,
    /// Promo code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_code: Option<String>,
    /// Wallet amount to apply, in cents.
    pub wallet_amount_cents: i64,
}

/// A placed order.
#[derive(Debug, Clone, Deserialize)]
pub struct PlacedOrder {
    /// Order ID.
    pub order_id: String,
    /// Human-facing order number.
    pub order_number: String,
    /// Token for reading the order without signing in.
    pub tracking_token: String,
    /// The order.
    pub order: Order,
}

/// An order with the game codes visible to the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderView {
    /// The order.
    #[serde(flatten)]
    pub order: Order,
    /// Attached game codes.
    #[serde(default)]
    pub game_codes: Vec<String>,
}

/// Successful guest verification.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifiedOrder {
    /// Order ID.
    pub order_id: String,
    /// Tracking token.
    pub tracking_token: String,
}

/// Promo code preview.
#[derive(Debug, Clone, Deserialize)]
pub struct PromoPreview {
    /// Normalized code.
    pub code: String,
    /// Description.
    pub description: String,
    /// Discount in cents.
    pub discount_cents: i64,
    /// Discount formatted as dollars.
    pub discount_formatted: String,
}

/// Wallet balance.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletBalance {
    /// Balance in cents.
    pub balance_cents: i64,
    /// Balance formatted as dollars.
    pub balance_formatted: String,
}

/// A page of wallet transactions.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionPage {
    /// Transactions, newest first.
    pub transactions: Vec<WalletTransaction>,
    /// Whether more transactions exist.
    pub has_more: bool,
}

/// Result of redeeming a gift card.
#[derive(Debug, Clone, Deserialize)]
pub struct Redeemed {
    /// Credited value in cents.
    pub value_cents: i64,
    /// Balance after the deposit.
    pub balance_cents: i64,
    /// Ledger entry.
    pub transaction: WalletTransaction,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProductList {
    pub products: Vec<Product>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrderList {
    pub orders: Vec<Order>,
}

/// API error response body.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}
