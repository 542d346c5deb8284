//! Orders, line items and their status fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;
use crate::product::ProductKind;
use crate::{EditionId, OrderId, ProductId, UserId};

/// Reason recorded when an unpaid bank transfer order passes its deadline.
pub const AUTO_CANCEL_REASON: &str = "Payment not received before the deadline";

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Manual bank transfer, verified by an admin.
    BankTransfer,
    /// Paid in cash when delivered; carries a flat fee.
    CashOnDelivery,
    /// Paid from the wallet at checkout.
    Wallet,
}

/// Fulfilment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Awaiting payment or delivery.
    Pending,
    /// Payment confirmed.
    Paid,
    /// Codes or credit delivered. Terminal.
    Delivered,
    /// Cancelled, with a recorded reason.
    Cancelled,
}

/// Payment status, tracked next to the fulfilment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// No payment received yet.
    Pending,
    /// Payment received.
    Paid,
    /// Payment returned after cancellation.
    Refunded,
}

macro_rules! str_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Stable string form, used for persistence and query strings.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(DomainError::InvalidInput(format!(
                        concat!("unknown ", stringify!($name), ": {}"),
                        other
                    ))),
                }
            }
        }
    };
}

str_enum!(PaymentMethod {
    BankTransfer => "bank_transfer",
    CashOnDelivery => "cash_on_delivery",
    Wallet => "wallet",
});

str_enum!(OrderStatus {
    Pending => "pending",
    Paid => "paid",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

str_enum!(PaymentStatus {
    Pending => "pending",
    Paid => "paid",
    Refunded => "refunded",
});

/// Customer-entered contact details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    /// Full name.
    pub name: String,
    /// Email used for order tracking.
    pub email: String,
    /// Phone used for order tracking.
    pub phone: String,
    /// Postal address, needed for cash on delivery.
    #[serde(default)]
    pub address: Option<String>,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
}

impl ContactInfo {
    /// Validate the contact details.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidInput` describing the first bad field.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidInput("contact name is required".into()));
        }
        let email = self.email.trim();
        if email.len() < 3 || !email.contains('@') {
            return Err(DomainError::InvalidInput("a valid email is required".into()));
        }
        if normalize_phone(&self.phone).is_empty() {
            return Err(DomainError::InvalidInput("phone number is required".into()));
        }
        Ok(())
    }

    /// Exact-match check used by guest order verification.
    ///
    /// Email is compared case-insensitively, phone with whitespace removed.
    #[must_use]
    pub fn matches(&self, email: &str, phone: &str) -> bool {
        self.email.trim().eq_ignore_ascii_case(email.trim())
            && normalize_phone(&self.phone) == normalize_phone(phone)
    }
}

fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| !c.is_whitespace()).collect()
}

/// A line item. Immutable once the order exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Purchased product.
    pub product_id: ProductId,
    /// Purchased edition, if any.
    pub edition_id: Option<EditionId>,
    /// Product name at purchase time.
    pub product_name: String,
    /// Edition name at purchase time.
    pub edition_name: Option<String>,
    /// Product kind at purchase time.
    pub kind: ProductKind,
    /// Unit price charged, in cents.
    pub unit_price_cents: i64,
    /// Units bought.
    pub quantity: u32,
    /// `unit_price_cents * quantity`.
    pub line_total_cents: i64,
    /// Wallet value per unit for credit products.
    pub credit_value_cents: Option<i64>,
}

impl OrderItem {
    /// Label used in messages ("Game (Deluxe)").
    #[must_use]
    pub fn label(&self) -> String {
        match &self.edition_name {
            Some(edition) => format!("{} ({edition})", self.product_name),
            None => self.product_name.clone(),
        }
    }
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order ID.
    pub id: OrderId,
    /// Human-facing order number.
    pub order_number: String,
    /// Buyer, or `None` for guest checkout.
    pub user_id: Option<UserId>,
    /// Contact details.
    pub contact: ContactInfo,
    /// Line items.
    pub items: Vec<OrderItem>,
    /// Payment method.
    pub payment_method: PaymentMethod,
    /// Fulfilment status.
    pub status: OrderStatus,
    /// Payment status.
    pub payment_status: PaymentStatus,
    /// Sum of line totals.
    pub subtotal_cents: i64,
    /// Redeemed promo code, if any.
    pub promo_code: Option<String>,
    /// Promo discount.
    pub promo_discount_cents: i64,
    /// Wallet amount applied towards the order.
    pub wallet_amount_used_cents: i64,
    /// Cash on delivery fee.
    pub cod_fee_cents: i64,
    /// Amount due: subtotal - promo - wallet + COD fee.
    pub total_amount_cents: i64,
    /// Bank transfer deadline.
    pub payment_deadline: Option<DateTime<Utc>>,
    /// Why the order was cancelled.
    pub cancelled_reason: Option<String>,
    /// Cashback was already credited for this order.
    pub cashback_credited: bool,
    /// When the order was placed.
    pub created_at: DateTime<Utc>,
    /// When the order last changed.
    pub updated_at: DateTime<Utc>,
    /// When payment was confirmed.
    pub paid_at: Option<DateTime<Utc>>,
    /// When the order was delivered.
    pub delivered_at: Option<DateTime<Utc>>,
    /// When the order was cancelled.
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Whether the order must be auto-cancelled at `now`.
    ///
    /// True iff it is an unpaid bank transfer past its deadline.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.payment_method == PaymentMethod::BankTransfer
            && self.status == OrderStatus::Pending
            && self.payment_deadline.is_some_and(|deadline| now > deadline)
    }

    /// Whether the stored amounts satisfy the totals invariant.
    #[must_use]
    pub fn totals_consistent(&self) -> bool {
        let items: i64 = self.items.iter().map(|i| i.line_total_cents).sum();
        items == self.subtotal_cents
            && self.total_amount_cents
                == self.subtotal_cents - self.promo_discount_cents
                    - self.wallet_amount_used_cents
                    + self.cod_fee_cents
    }

    /// Total wallet debit taken at checkout.
    ///
    /// Wallet-method orders pay the remaining total from the wallet as well.
    #[must_use]
    pub fn wallet_debit_cents(&self) -> i64 {
        match self.payment_method {
            PaymentMethod::Wallet => self
                .wallet_amount_used_cents
                .saturating_add(self.total_amount_cents),
            PaymentMethod::BankTransfer | PaymentMethod::CashOnDelivery => {
                self.wallet_amount_used_cents
            }
        }
    }

    /// Codes needed to deliver the order.
    #[must_use]
    pub fn codes_needed(&self) -> u32 {
        self.items
            .iter()
            .filter(|i| i.kind.needs_code())
            .map(|i| i.quantity)
            .sum()
    }

    /// Wallet value deposited when the credit items are delivered.
    ///
    /// Checkout rejects carts whose credit value does not fit in cents.
    #[must_use]
    pub fn credit_value_cents(&self) -> i64 {
        self.items
            .iter()
            .filter(|i| i.kind == ProductKind::Credit)
            .fold(0_i64, |sum, i| {
                sum.saturating_add(
                    i.credit_value_cents
                        .unwrap_or(0)
                        .saturating_mul(i64::from(i.quantity)),
                )
            })
    }
}

/// Order listing filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderFilter {
    /// Only this buyer's orders.
    pub user_id: Option<UserId>,
    /// Only orders in this status.
    pub status: Option<OrderStatus>,
    /// Only orders with this payment method.
    pub payment_method: Option<PaymentMethod>,
    /// Page size.
    pub limit: Option<usize>,
    /// Page offset.
    #[serde(default)]
    pub offset: usize,
}

impl OrderFilter {
    /// Whether `order` passes the filter.
    #[must_use]
    pub fn matches(&self, order: &Order) -> bool {
        self.user_id.map_or(true, |u| order.user_id == Some(u))
            && self.status.map_or(true, |s| order.status == s)
            && self.payment_method.map_or(true, |m| order.payment_method == m)
    }

    /// Page size, clamped to the catalog maximum.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.limit
            .unwrap_or(crate::product::DEFAULT_PAGE_SIZE)
            .min(crate::product::MAX_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn status_strings_round_trip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn contact_match_ignores_case_and_spaces() {
        let contact = ContactInfo {
            name: "Ana".into(),
            email: "Ana@Example.com".into(),
            phone: "+33 6 12 34 56 78".into(),
            address: None,
            notes: None,
        };
        assert!(contact.matches("ana@example.com", "+33612345678"));
        assert!(!contact.matches("ana@example.com", "+33612345679"));
    }

    #[test]
    fn overdue_only_for_pending_bank_transfers() {
        let now = Utc::now();
        let mut order = crate::checkout::tests::sample_order(PaymentMethod::BankTransfer, now);
        let deadline = order.payment_deadline.unwrap();

        assert!(!order.is_overdue(deadline));
        assert!(order.is_overdue(deadline + Duration::seconds(1)));

        order.status = OrderStatus::Paid;
        assert!(!order.is_overdue(deadline + Duration::days(1)));

        let cod = crate::checkout::tests::sample_order(PaymentMethod::CashOnDelivery, now);
        assert!(!cod.is_overdue(now + Duration::days(30)));
    }
}
