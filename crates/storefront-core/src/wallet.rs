//! Wallet ledger entries.
//!
//! Every change to a user's wallet balance produces exactly one
//! [`WalletTransaction`] whose signed amount equals the balance delta.
//! Entries are append-only and carry the balance after the change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;
use crate::money::percent_of;
use crate::{OrderId, TransactionId, UserId};

/// Cashback percentage credited when an order is delivered.
pub const CASHBACK_PERCENT: u32 = 3;

/// Cashback owed for an order total, rounded half-up to the cent.
#[must_use]
pub fn cashback_for(total_amount_cents: i64) -> i64 {
    percent_of(total_amount_cents, CASHBACK_PERCENT)
}

/// Apply a signed delta to a balance.
///
/// # Errors
///
/// Returns `DomainError::InsufficientWallet` if the result would be negative,
/// or `DomainError::InvalidInput` if it does not fit in cents.
pub fn apply_delta(balance_cents: i64, delta_cents: i64) -> Result<i64, DomainError> {
    let after = balance_cents
        .checked_add(delta_cents)
        .ok_or_else(|| DomainError::InvalidInput("wallet balance out of range".into()))?;
    if after < 0 {
        return Err(DomainError::InsufficientWallet {
            balance: balance_cents,
            required: delta_cents.saturating_neg(),
        });
    }
    Ok(after)
}

/// Why the balance changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletTransactionKind {
    /// Money added: credit products, gift cards, admin top-ups.
    Deposit,
    /// Money removed by an admin.
    Withdrawal,
    /// Spent on an order.
    Payment,
    /// Returned from a cancelled order.
    Refund,
    /// Earned on a delivered order.
    Cashback,
}

impl WalletTransactionKind {
    /// Stable string form, used for persistence.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::Payment => "payment",
            Self::Refund => "refund",
            Self::Cashback => "cashback",
        }
    }

    /// Whether entries of this kind reduce the balance.
    #[must_use]
    pub const fn is_debit(self) -> bool {
        matches!(self, Self::Withdrawal | Self::Payment)
    }
}

impl fmt::Display for WalletTransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletTransactionKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(Self::Deposit),
            "withdrawal" => Ok(Self::Withdrawal),
            "payment" => Ok(Self::Payment),
            "refund" => Ok(Self::Refund),
            "cashback" => Ok(Self::Cashback),
            other => Err(DomainError::InvalidInput(format!(
                "unknown wallet transaction kind: {other}"
            ))),
        }
    }
}

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    /// Entry ID (ULID, so entries sort by time).
    pub id: TransactionId,
    /// Wallet owner.
    pub user_id: UserId,
    /// Order that caused the change, if any.
    pub order_id: Option<OrderId>,
    /// Why the balance changed.
    pub kind: WalletTransactionKind,
    /// Signed amount in cents. Positive adds to the balance.
    pub amount_cents: i64,
    /// Balance after this entry.
    pub balance_after_cents: i64,
    /// Human-readable description.
    pub description: String,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

/// A pending balance change, turned into a [`WalletTransaction`] by [`WalletChange::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletChange {
    /// Why the balance changes.
    pub kind: WalletTransactionKind,
    /// Unsigned amount in cents. The sign follows from the kind.
    pub amount_cents: i64,
    /// Order that causes the change, if any.
    pub order_id: Option<OrderId>,
    /// Human-readable description.
    pub description: String,
}

impl WalletChange {
    /// Checkout or restore debit for an order.
    #[must_use]
    pub fn payment(order_id: OrderId, order_number: &str, amount_cents: i64) -> Self {
        Self {
            kind: WalletTransactionKind::Payment,
            amount_cents,
            order_id: Some(order_id),
            description: format!("Payment for order {order_number}"),
        }
    }

    /// Refund of a cancelled order's wallet debit.
    #[must_use]
    pub fn refund(order_id: OrderId, order_number: &str, amount_cents: i64) -> Self {
        Self {
            kind: WalletTransactionKind::Refund,
            amount_cents,
            order_id: Some(order_id),
            description: format!("Refund for cancelled order {order_number}"),
        }
    }

    /// Cashback on a delivered order.
    #[must_use]
    pub fn cashback(order_id: OrderId, order_number: &str, amount_cents: i64) -> Self {
        Self {
            kind: WalletTransactionKind::Cashback,
            amount_cents,
            order_id: Some(order_id),
            description: format!("{CASHBACK_PERCENT}% cashback on order {order_number}"),
        }
    }

    /// Wallet credit delivered by a credit product.
    #[must_use]
    pub fn credit_delivery(order_id: OrderId, order_number: &str, amount_cents: i64) -> Self {
        Self {
            kind: WalletTransactionKind::Deposit,
            amount_cents,
            order_id: Some(order_id),
            description: format!("Wallet credit from order {order_number}"),
        }
    }

    /// Gift card redemption.
    #[must_use]
    pub fn gift_card(code: &str, amount_cents: i64) -> Self {
        Self {
            kind: WalletTransactionKind::Deposit,
            amount_cents,
            order_id: None,
            description: format!("Gift card {code} redeemed"),
        }
    }

    /// Manual admin adjustment. Negative amounts become withdrawals.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidInput` for `i64::MIN`, which has no
    /// positive counterpart.
    pub fn adjustment(delta_cents: i64, reason: String) -> Result<Self, DomainError> {
        let kind = if delta_cents < 0 {
            WalletTransactionKind::Withdrawal
        } else {
            WalletTransactionKind::Deposit
        };
        let amount_cents = delta_cents
            .checked_abs()
            .ok_or_else(|| DomainError::InvalidInput("adjustment amount out of range".into()))?;
        Ok(Self {
            kind,
            amount_cents,
            order_id: None,
            description: reason,
        })
    }

    /// Signed balance delta.
    #[must_use]
    pub const fn delta_cents(&self) -> i64 {
        if self.kind.is_debit() {
            -self.amount_cents
        } else {
            self.amount_cents
        }
    }

    /// Apply the change to `balance_cents`, returning the ledger entry.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InsufficientWallet` if the balance would go
    /// negative, or `DomainError::InvalidInput` for a zero or negative amount.
    pub fn apply(
        self,
        user_id: UserId,
        balance_cents: i64,
        now: DateTime<Utc>,
    ) -> Result<WalletTransaction, DomainError> {
        if self.amount_cents <= 0 {
            return Err(DomainError::InvalidInput(
                "wallet amount must be positive".into(),
            ));
        }
        let delta = self.delta_cents();
        let balance_after_cents = apply_delta(balance_cents, delta)?;
        Ok(WalletTransaction {
            id: TransactionId::generate(),
            user_id,
            order_id: self.order_id,
            kind: self.kind,
            amount_cents: delta,
            balance_after_cents,
            description: self.description,
            created_at: now,
        })
    }
}
