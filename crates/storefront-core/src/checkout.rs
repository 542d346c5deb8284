//! Checkout: cart validation and deterministic order pricing.
//!
//! Pricing runs in a fixed order:
//!
//! 1. subtotal from current catalog prices
//! 2. promo discount
//! 3. wallet deduction (capped at what is left to pay)
//! 4. cash on delivery fee
//!
//! so that `total = subtotal - promo - wallet + cod_fee` always holds.
//! Stores call [`quote`] inside their write transaction, with rows locked,
//! and persist the result of [`build_order`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::order::{ContactInfo, Order, OrderItem, OrderStatus, PaymentMethod, PaymentStatus};
use crate::product::{Product, ProductKind};
use crate::promo::PromoCode;
use crate::settings::PaymentSettings;
use crate::{EditionId, OrderId, ProductId, UserId};

/// Most units one cart line may ask for.
pub const MAX_LINE_QUANTITY: u32 = 1_000;

/// Most lines one cart may hold.
pub const MAX_CART_LINES: usize = 100;

fn amount_overflow() -> DomainError {
    DomainError::InvalidInput("order amount is too large".into())
}

/// One cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutItem {
    /// Product to buy.
    pub product_id: ProductId,
    /// Edition to buy, if any.
    #[serde(default)]
    pub edition_id: Option<EditionId>,
    /// Units.
    pub quantity: u32,
}

/// A checkout request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    /// Signed-in buyer, `None` for guests.
    pub user_id: Option<UserId>,
    /// Cart lines.
    pub items: Vec<CheckoutItem>,
    /// Contact details.
    pub contact: ContactInfo,
    /// Payment method.
    pub payment_method: PaymentMethod,
    /// Promo code as typed by the customer.
    pub promo_code: Option<String>,
    /// Wallet amount the customer wants to apply, in cents.
    pub wallet_amount_cents: i64,
}

impl Checkout {
    /// Input checks that need no stored data.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.items.is_empty() {
            return Err(DomainError::EmptyCart);
        }
        if self.items.len() > MAX_CART_LINES {
            return Err(DomainError::InvalidInput(format!(
                "a cart holds at most {MAX_CART_LINES} lines"
            )));
        }
        if let Some(item) = self
            .items
            .iter()
            .find(|i| i.quantity == 0 || i.quantity > MAX_LINE_QUANTITY)
        {
            return Err(DomainError::InvalidQuantity {
                product_id: item.product_id.to_string(),
            });
        }
        self.contact.validate()?;
        if self.wallet_amount_cents < 0 {
            return Err(DomainError::InvalidInput(
                "wallet amount must not be negative".into(),
            ));
        }
        if self.user_id.is_none()
            && (self.wallet_amount_cents > 0 || self.payment_method == PaymentMethod::Wallet)
        {
            return Err(DomainError::SignInRequired(
                "wallet payments need an account".into(),
            ));
        }
        Ok(())
    }

    /// Promo code in stored form, ignoring blank input.
    #[must_use]
    pub fn normalized_promo_code(&self) -> Option<String> {
        self.promo_code
            .as_deref()
            .map(PromoCode::normalize)
            .filter(|c| !c.is_empty())
    }
}

/// Stored data a quote depends on, read under lock by the store.
#[derive(Debug, Clone, Copy)]
pub struct QuoteContext<'a> {
    /// Products referenced by the cart, by ID.
    pub products: &'a HashMap<ProductId, Product>,
    /// Promo code and how often this customer already redeemed it.
    pub promo: Option<(&'a PromoCode, u32)>,
    /// Buyer's wallet balance (0 for guests).
    pub wallet_balance_cents: i64,
    /// Current payment settings.
    pub settings: &'a PaymentSettings,
    /// Evaluation time.
    pub now: DateTime<Utc>,
}

/// Priced order, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    /// Priced lines.
    pub items: Vec<OrderItem>,
    /// Sum of line totals.
    pub subtotal_cents: i64,
    /// Promo discount.
    pub promo_discount_cents: i64,
    /// Wallet amount applied.
    pub wallet_amount_used_cents: i64,
    /// Cash on delivery fee.
    pub cod_fee_cents: i64,
    /// Amount due.
    pub total_amount_cents: i64,
    /// Everything debited from the wallet at checkout.
    pub wallet_debit_cents: i64,
    /// Units taken from stock per (product, edition).
    pub stock_taken: Vec<StockLine>,
}

/// Units reserved against one product or edition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockLine {
    /// Product.
    pub product_id: ProductId,
    /// Edition, if the stock belongs to an edition.
    pub edition_id: Option<EditionId>,
    /// Units.
    pub quantity: i64,
    /// Pre-order lines do not draw down stock checks.
    pub pre_order: bool,
}

/// Price a checkout against locked store data.
///
/// # Errors
///
/// Returns the first violated rule: unknown or inactive products, stock,
/// sign-in requirements, disabled payment method, promo rules, wallet balance.
/// Amounts that do not fit in cents are `DomainError::InvalidInput`.
pub fn quote(checkout: &Checkout, ctx: &QuoteContext<'_>) -> Result<Quote, DomainError> {
    checkout.validate()?;

    if !ctx.settings.allows(checkout.payment_method) {
        return Err(DomainError::PaymentMethodDisabled(checkout.payment_method));
    }

    let mut items = Vec::with_capacity(checkout.items.len());
    let mut stock_taken: Vec<StockLine> = Vec::new();

    for line in &checkout.items {
        let product = ctx
            .products
            .get(&line.product_id)
            .ok_or_else(|| DomainError::ProductNotFound(line.product_id.to_string()))?;
        if !product.active {
            return Err(DomainError::ProductUnavailable(product.name.clone()));
        }
        if product.kind == ProductKind::Credit && checkout.user_id.is_none() {
            return Err(DomainError::SignInRequired(
                "wallet credit can only be bought with an account".into(),
            ));
        }

        let (unit_price, edition_name, available) = match line.edition_id {
            Some(edition_id) => {
                let edition = product
                    .edition(&edition_id)
                    .ok_or_else(|| DomainError::EditionNotFound(edition_id.to_string()))?;
                if !edition.active {
                    return Err(DomainError::ProductUnavailable(format!(
                        "{} ({})",
                        product.name, edition.name
                    )));
                }
                (
                    product.edition_price_cents(edition),
                    Some(edition.name.clone()),
                    edition.stock,
                )
            }
            None => (product.effective_price_cents(), None, product.stock),
        };

        let quantity = i64::from(line.quantity);
        let reserved = match stock_taken
            .iter_mut()
            .find(|s| s.product_id == line.product_id && s.edition_id == line.edition_id)
        {
            Some(existing) => {
                existing.quantity += quantity;
                existing.quantity
            }
            None => {
                stock_taken.push(StockLine {
                    product_id: line.product_id,
                    edition_id: line.edition_id,
                    quantity,
                    pre_order: product.flags.pre_order,
                });
                quantity
            }
        };

        let line_total_cents = unit_price.checked_mul(quantity).ok_or_else(amount_overflow)?;

        let item = OrderItem {
            product_id: product.id,
            edition_id: line.edition_id,
            product_name: product.name.clone(),
            edition_name,
            kind: product.kind,
            unit_price_cents: unit_price,
            quantity: line.quantity,
            line_total_cents,
            credit_value_cents: product.credit_value_cents,
        };

        if !product.flags.pre_order && reserved > available {
            return Err(DomainError::InsufficientStock {
                product: item.label(),
                available,
                requested: reserved,
            });
        }

        items.push(item);
    }

    let subtotal_cents = items
        .iter()
        .try_fold(0_i64, |sum, i| sum.checked_add(i.line_total_cents))
        .ok_or_else(amount_overflow)?;
    // Delivery deposits the credit value, so it has to fit as well.
    items
        .iter()
        .filter(|i| i.kind == ProductKind::Credit)
        .try_fold(0_i64, |sum, i| {
            i.credit_value_cents
                .unwrap_or(0)
                .checked_mul(i64::from(i.quantity))
                .and_then(|value| sum.checked_add(value))
        })
        .ok_or_else(amount_overflow)?;

    let promo_discount_cents = match (checkout.normalized_promo_code(), ctx.promo) {
        (None, _) => 0,
        (Some(code), None) => return Err(DomainError::PromoNotFound(code)),
        (Some(_), Some((promo, redeemer_uses))) => {
            promo.check(subtotal_cents, redeemer_uses, ctx.now)?
        }
    };

    let after_promo = subtotal_cents - promo_discount_cents;

    if checkout.wallet_amount_cents > ctx.wallet_balance_cents {
        return Err(DomainError::InsufficientWallet {
            balance: ctx.wallet_balance_cents,
            required: checkout.wallet_amount_cents,
        });
    }
    let wallet_amount_used_cents = checkout.wallet_amount_cents.min(after_promo);

    let cod_fee_cents = match checkout.payment_method {
        PaymentMethod::CashOnDelivery => ctx.settings.cod_fee_cents,
        PaymentMethod::BankTransfer | PaymentMethod::Wallet => 0,
    };

    let total_amount_cents = (after_promo - wallet_amount_used_cents)
        .checked_add(cod_fee_cents)
        .ok_or_else(amount_overflow)?;

    let wallet_debit_cents = match checkout.payment_method {
        PaymentMethod::Wallet => wallet_amount_used_cents
            .checked_add(total_amount_cents)
            .ok_or_else(amount_overflow)?,
        PaymentMethod::BankTransfer | PaymentMethod::CashOnDelivery => wallet_amount_used_cents,
    };
    if wallet_debit_cents > ctx.wallet_balance_cents {
        return Err(DomainError::InsufficientWallet {
            balance: ctx.wallet_balance_cents,
            required: wallet_debit_cents,
        });
    }

    Ok(Quote {
        items,
        subtotal_cents,
        promo_discount_cents,
        wallet_amount_used_cents,
        cod_fee_cents,
        total_amount_cents,
        wallet_debit_cents,
        stock_taken,
    })
}

/// Turn a quote into a new order.
///
/// Bank transfers start pending with a deadline, cash on delivery starts
/// pending, wallet orders start paid.
#[must_use]
pub fn build_order(
    checkout: &Checkout,
    quote: Quote,
    settings: &PaymentSettings,
    now: DateTime<Utc>,
) -> Order {
    let id = OrderId::generate();
    let (status, payment_status, paid_at, payment_deadline) = match checkout.payment_method {
        PaymentMethod::BankTransfer => (
            OrderStatus::Pending,
            PaymentStatus::Pending,
            None,
            Some(settings.payment_deadline(now)),
        ),
        PaymentMethod::CashOnDelivery => {
            (OrderStatus::Pending, PaymentStatus::Pending, None, None)
        }
        PaymentMethod::Wallet => (OrderStatus::Paid, PaymentStatus::Paid, Some(now), None),
    };

    Order {
        id,
        order_number: id.order_number(),
        user_id: checkout.user_id,
        contact: checkout.contact.clone(),
        items: quote.items,
        payment_method: checkout.payment_method,
        status,
        payment_status,
        subtotal_cents: quote.subtotal_cents,
        promo_code: checkout.normalized_promo_code(),
        promo_discount_cents: quote.promo_discount_cents,
        wallet_amount_used_cents: quote.wallet_amount_used_cents,
        cod_fee_cents: quote.cod_fee_cents,
        total_amount_cents: quote.total_amount_cents,
        payment_deadline,
        cancelled_reason: None,
        cashback_credited: false,
        created_at: now,
        updated_at: now,
        paid_at,
        delivered_at: None,
        cancelled_at: None,
    }
}
