//! Domain error types for the storefront.

use crate::ids::IdError;
use crate::order::{OrderStatus, PaymentMethod};

/// Result type for storefront domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;

/// Business rule violations.
///
/// Every variant aborts the current operation without any state change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// The cart has no items.
    #[error("cart is empty")]
    EmptyCart,

    /// A cart line asks for zero units or more than the per-line limit.
    #[error("invalid quantity for product {product_id}")]
    InvalidQuantity {
        /// The product on the offending line.
        product_id: String,
    },

    /// Malformed input that is not covered by a more specific variant.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The product does not exist.
    #[error("product not found: {0}")]
    ProductNotFound(String),

    /// The product or edition exists but cannot be bought.
    #[error("product unavailable: {0}")]
    ProductUnavailable(String),

    /// The edition does not exist or belongs to another product.
    #[error("edition not found: {0}")]
    EditionNotFound(String),

    /// Not enough units in stock.
    #[error("insufficient stock for {product}: available={available}, requested={requested}")]
    InsufficientStock {
        /// Product (and edition) name.
        product: String,
        /// Units in stock.
        available: i64,
        /// Units requested.
        requested: i64,
    },

    /// The operation needs a signed-in customer.
    #[error("sign-in required: {0}")]
    SignInRequired(String),

    /// The account is disabled.
    #[error("account disabled")]
    AccountDisabled,

    /// The payment method is switched off in the payment settings.
    #[error("payment method disabled: {0}")]
    PaymentMethodDisabled(PaymentMethod),

    /// The wallet cannot cover the debit.
    #[error("insufficient wallet balance: balance={balance}, required={required}")]
    InsufficientWallet {
        /// Current balance in cents.
        balance: i64,
        /// Required amount in cents.
        required: i64,
    },

    /// No promo code with this code exists.
    #[error("promo code not found: {0}")]
    PromoNotFound(String),

    /// The promo code is switched off.
    #[error("promo code is not active")]
    PromoInactive,

    /// The promo code is not valid yet.
    #[error("promo code is not valid yet")]
    PromoNotStarted,

    /// The promo code has expired.
    #[error("promo code has expired")]
    PromoExpired,

    /// The promo code reached its global usage cap.
    #[error("promo code usage limit reached")]
    PromoExhausted,

    /// The customer already used the promo code as often as allowed.
    #[error("promo code already used the maximum number of times by this customer")]
    PromoPerUserLimit,

    /// The order subtotal is below the promo code minimum.
    #[error("order subtotal {subtotal} is below the promo code minimum {min_order}")]
    PromoBelowMinimum {
        /// Minimum subtotal in cents.
        min_order: i64,
        /// Actual subtotal in cents.
        subtotal: i64,
    },

    /// The requested status change is not allowed from the current status.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: OrderStatus,
        /// Requested status.
        to: OrderStatus,
    },

    /// Cancelling an order needs a reason.
    #[error("cancellation reason is required")]
    CancelReasonRequired,

    /// The bank transfer deadline has passed; the order is auto-cancelled on read.
    #[error("payment deadline has elapsed")]
    PaymentDeadlineElapsed,

    /// The order cannot be delivered before its payment is confirmed.
    #[error("payment has not been confirmed")]
    PaymentNotConfirmed,

    /// Cash on delivery orders are settled when they are delivered.
    #[error("cash on delivery orders are settled on delivery")]
    SettledOnDelivery,

    /// The game code pool cannot cover the order.
    #[error("not enough game codes for {product}: needed={needed}, available={available}")]
    MissingGameCodes {
        /// Product (and edition) name.
        product: String,
        /// Codes still needed.
        needed: u32,
        /// Unused codes in the pool.
        available: u32,
    },

    /// The gift card was already redeemed.
    #[error("gift card already redeemed")]
    GiftCardRedeemed,

    /// The gift card has expired.
    #[error("gift card has expired")]
    GiftCardExpired,

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

impl DomainError {
    /// Stable machine-readable code for API responses.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EmptyCart => "empty_cart",
            Self::InvalidQuantity { .. } => "invalid_quantity",
            Self::InvalidInput(_) | Self::InvalidId(_) => "invalid_input",
            Self::ProductNotFound(_) => "product_not_found",
            Self::ProductUnavailable(_) => "product_unavailable",
            Self::EditionNotFound(_) => "edition_not_found",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::SignInRequired(_) => "sign_in_required",
            Self::AccountDisabled => "account_disabled",
            Self::PaymentMethodDisabled(_) => "payment_method_disabled",
            Self::InsufficientWallet { .. } => "insufficient_balance",
            Self::PromoNotFound(_)
            | Self::PromoInactive
            | Self::PromoNotStarted
            | Self::PromoExpired
            | Self::PromoExhausted
            | Self::PromoPerUserLimit
            | Self::PromoBelowMinimum { .. } => "invalid_promo_code",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::CancelReasonRequired => "cancel_reason_required",
            Self::PaymentDeadlineElapsed => "payment_deadline_elapsed",
            Self::PaymentNotConfirmed => "payment_not_confirmed",
            Self::SettledOnDelivery => "settled_on_delivery",
            Self::MissingGameCodes { .. } => "missing_game_codes",
            Self::GiftCardRedeemed => "gift_card_redeemed",
            Self::GiftCardExpired => "gift_card_expired",
        }
    }

    /// Whether the error is a state conflict rather than bad input.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. }
                | Self::PaymentDeadlineElapsed
                | Self::PaymentNotConfirmed
                | Self::SettledOnDelivery
                | Self::MissingGameCodes { .. }
                | Self::GiftCardRedeemed
        )
    }
}
