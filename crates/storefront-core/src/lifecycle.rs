//! Order status transitions.
//!
//! [`plan`] is pure: it checks a transition against the current order and
//! returns the updated order plus the side effects the store must apply in
//! the same transaction (stock, wallet, game codes). Stores apply the
//! effects in order and persist the order last.
//!
//! ```text
//! pending ──mark paid──▶ paid ──deliver──▶ delivered
//!    │  └────────deliver (cash on delivery)────▲
//!    └──cancel──▶ cancelled ◀──cancel── paid
//!                    │
//!                    └──restore──▶ pending
//! ```
//!
//! Restoring a wallet order debits the wallet again, so it comes back as
//! pending with its payment already settled and can be delivered directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkout::StockLine;
use crate::error::DomainError;
use crate::order::{Order, OrderStatus, PaymentMethod, PaymentStatus, AUTO_CANCEL_REASON};
use crate::settings::PaymentSettings;
use crate::wallet::{cashback_for, WalletChange};
use crate::UserId;

/// A requested status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transition {
    /// Confirm a bank transfer.
    MarkPaid,
    /// Deliver codes and credit.
    Deliver,
    /// Cancel with a reason.
    Cancel {
        /// Shown to the customer.
        reason: String,
    },
    /// Cancel an unpaid bank transfer past its deadline.
    AutoCancel,
    /// Reopen a cancelled order.
    Restore,
}

impl Transition {
    /// Map a requested target status to a transition.
    #[must_use]
    pub fn to_status(target: OrderStatus, reason: Option<String>) -> Self {
        match target {
            OrderStatus::Pending => Self::Restore,
            OrderStatus::Paid => Self::MarkPaid,
            OrderStatus::Delivered => Self::Deliver,
            OrderStatus::Cancelled => Self::Cancel {
                reason: reason.unwrap_or_default(),
            },
        }
    }

    /// Status the transition asks for.
    #[must_use]
    pub const fn target(&self) -> OrderStatus {
        match self {
            Self::MarkPaid => OrderStatus::Paid,
            Self::Deliver => OrderStatus::Delivered,
            Self::Cancel { .. } | Self::AutoCancel => OrderStatus::Cancelled,
            Self::Restore => OrderStatus::Pending,
        }
    }
}

/// A side effect of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Put the order's units back into stock.
    ReleaseStock(Vec<StockLine>),
    /// Take the order's units from stock again, checking availability.
    ReserveStock(Vec<StockLine>),
    /// Write one wallet ledger entry for the user.
    Wallet {
        /// Wallet owner.
        user_id: UserId,
        /// Balance change.
        change: WalletChange,
    },
    /// Attach pool codes to every line that still lacks one.
    AssignCodes,
}

/// Result of planning a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// The order after the transition.
    pub order: Order,
    /// Effects to apply before persisting `order`.
    pub effects: Vec<Effect>,
}

/// Units held by an order, summed per product and edition.
#[must_use]
pub fn stock_lines(order: &Order) -> Vec<StockLine> {
    let mut lines: Vec<StockLine> = Vec::new();
    for item in &order.items {
        let quantity = i64::from(item.quantity);
        match lines
            .iter_mut()
            .find(|l| l.product_id == item.product_id && l.edition_id == item.edition_id)
        {
            Some(line) => line.quantity += quantity,
            None => lines.push(StockLine {
                product_id: item.product_id,
                edition_id: item.edition_id,
                quantity,
                pre_order: false,
            }),
        }
    }
    lines
}

/// Check `transition` against `order` at `now`.
///
/// Returns `Ok(None)` when the order already has the target status, so
/// re-applying a status never repeats its side effects.
///
/// # Errors
///
/// Returns a `DomainError` when the transition is not allowed; the order is
/// left untouched.
pub fn plan(
    order: &Order,
    transition: &Transition,
    settings: &PaymentSettings,
    now: DateTime<Utc>,
) -> Result<Option<Plan>, DomainError> {
    let target = transition.target();
    if order.status == target {
        return Ok(None);
    }
    let invalid = DomainError::InvalidTransition {
        from: order.status,
        to: target,
    };
    if order.status == OrderStatus::Delivered {
        return Err(invalid);
    }
    let overdue = order.is_overdue(now);
    if overdue && *transition != Transition::AutoCancel {
        return Err(DomainError::PaymentDeadlineElapsed);
    }

    let mut next = order.clone();
    next.updated_at = now;
    let mut effects = Vec::new();

    match transition {
        Transition::MarkPaid => {
            if order.status != OrderStatus::Pending {
                return Err(invalid);
            }
            if order.payment_method == PaymentMethod::CashOnDelivery {
                return Err(DomainError::SettledOnDelivery);
            }
            next.status = OrderStatus::Paid;
            next.payment_status = PaymentStatus::Paid;
            next.paid_at = order.paid_at.or(Some(now));
        }
        Transition::Deliver => {
            match (order.status, order.payment_method) {
                (OrderStatus::Paid, _) => {}
                (OrderStatus::Pending, _) if order.payment_status == PaymentStatus::Paid => {}
                (OrderStatus::Pending, PaymentMethod::CashOnDelivery) => {
                    next.payment_status = PaymentStatus::Paid;
                    next.paid_at = Some(now);
                }
                (OrderStatus::Pending, _) => return Err(DomainError::PaymentNotConfirmed),
                _ => return Err(invalid),
            }
            next.status = OrderStatus::Delivered;
            next.delivered_at = Some(now);

            if order.codes_needed() > 0 {
                effects.push(Effect::AssignCodes);
            }
            if let Some(user_id) = order.user_id {
                let credit = order.credit_value_cents();
                if credit > 0 {
                    effects.push(Effect::Wallet {
                        user_id,
                        change: WalletChange::credit_delivery(order.id, &order.order_number, credit),
                    });
                }
                let cashback = cashback_for(order.total_amount_cents);
                if !order.cashback_credited && cashback > 0 {
                    effects.push(Effect::Wallet {
                        user_id,
                        change: WalletChange::cashback(order.id, &order.order_number, cashback),
                    });
                    next.cashback_credited = true;
                }
            }
        }
        Transition::Cancel { .. } | Transition::AutoCancel => {
            let reason = match transition {
                Transition::Cancel { reason } => reason.trim().to_string(),
                _ => {
                    if !overdue {
                        return Err(invalid);
                    }
                    AUTO_CANCEL_REASON.to_string()
                }
            };
            if reason.is_empty() {
                return Err(DomainError::CancelReasonRequired);
            }
            if !matches!(order.status, OrderStatus::Pending | OrderStatus::Paid) {
                return Err(invalid);
            }
            next.status = OrderStatus::Cancelled;
            if order.payment_status == PaymentStatus::Paid {
                next.payment_status = PaymentStatus::Refunded;
            }
            next.cancelled_reason = Some(reason);
            next.cancelled_at = Some(now);

            effects.push(Effect::ReleaseStock(stock_lines(order)));
            let debit = order.wallet_debit_cents();
            if let (Some(user_id), true) = (order.user_id, debit > 0) {
                effects.push(Effect::Wallet {
                    user_id,
                    change: WalletChange::refund(order.id, &order.order_number, debit),
                });
            }
        }
        Transition::Restore => {
            if order.status != OrderStatus::Cancelled {
                return Err(invalid);
            }
            next.status = OrderStatus::Pending;
            next.cancelled_reason = None;
            next.cancelled_at = None;
            match order.payment_method {
                PaymentMethod::Wallet => {
                    next.payment_status = PaymentStatus::Paid;
                    next.paid_at = Some(now);
                }
                PaymentMethod::BankTransfer => {
                    next.payment_status = PaymentStatus::Pending;
                    next.paid_at = None;
                    next.payment_deadline = Some(settings.payment_deadline(now));
                }
                PaymentMethod::CashOnDelivery => {
                    next.payment_status = PaymentStatus::Pending;
                    next.paid_at = None;
                }
            }

            effects.push(Effect::ReserveStock(stock_lines(order)));
            let debit = order.wallet_debit_cents();
            if let (Some(user_id), true) = (order.user_id, debit > 0) {
                effects.push(Effect::Wallet {
                    user_id,
                    change: WalletChange::payment(order.id, &order.order_number, debit),
                });
            }
        }
    }

    Ok(Some(Plan {
        order: next,
        effects,
    }))
}
