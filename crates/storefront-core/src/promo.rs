//! Promo codes and redemption tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;
use crate::money::percent_of;
use crate::{OrderId, PromoCodeId, UserId};

/// How a promo code reduces the subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Discount {
    /// Percentage off the subtotal, optionally capped.
    Percentage {
        /// Percent off (1-100).
        percent: u32,
        /// Upper bound on the discount in cents.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_discount_cents: Option<i64>,
    },
    /// Fixed amount off.
    Fixed {
        /// Amount off in cents.
        amount_cents: i64,
    },
}

impl Discount {
    /// Discount for `subtotal_cents`, never more than the subtotal.
    #[must_use]
    pub fn amount_for(&self, subtotal_cents: i64) -> i64 {
        let raw = match *self {
            Self::Percentage {
                percent,
                max_discount_cents,
            } => {
                let amount = percent_of(subtotal_cents, percent);
                max_discount_cents.map_or(amount, |cap| amount.min(cap))
            }
            Self::Fixed { amount_cents } => amount_cents,
        };
        raw.clamp(0, subtotal_cents.max(0))
    }
}

/// A discount code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCode {
    /// Promo code ID.
    pub id: PromoCodeId,
    /// Normalized code (trimmed, upper-case).
    pub code: String,
    /// Admin-facing description.
    pub description: String,
    /// Discount rule.
    pub discount: Discount,
    /// Minimum subtotal in cents.
    pub min_order_cents: i64,
    /// Global redemption cap.
    pub max_uses: Option<u32>,
    /// Per-customer redemption cap.
    pub max_uses_per_user: Option<u32>,
    /// Redemptions so far.
    pub used_count: u32,
    /// Not valid before this instant.
    pub starts_at: Option<DateTime<Utc>>,
    /// Not valid after this instant.
    pub expires_at: Option<DateTime<Utc>>,
    /// Switched-off codes are rejected.
    pub active: bool,
    /// When the code was created.
    pub created_at: DateTime<Utc>,
    /// When the code was last updated.
    pub updated_at: DateTime<Utc>,
}

impl PromoCode {
    /// Normalize user input to the stored form.
    #[must_use]
    pub fn normalize(code: &str) -> String {
        code.trim().to_uppercase()
    }

    /// Check the code against a subtotal and return the discount in cents.
    ///
    /// `redeemer_uses` is how often the current customer already redeemed it.
    ///
    /// # Errors
    ///
    /// Returns the `DomainError::Promo*` variant for the first failed rule.
    pub fn check(
        &self,
        subtotal_cents: i64,
        redeemer_uses: u32,
        now: DateTime<Utc>,
    ) -> Result<i64, DomainError> {
        if !self.active {
            return Err(DomainError::PromoInactive);
        }
        if self.starts_at.is_some_and(|s| now < s) {
            return Err(DomainError::PromoNotStarted);
        }
        if self.expires_at.is_some_and(|e| now > e) {
            return Err(DomainError::PromoExpired);
        }
        if self.max_uses.is_some_and(|max| self.used_count >= max) {
            return Err(DomainError::PromoExhausted);
        }
        if self.max_uses_per_user.is_some_and(|max| redeemer_uses >= max) {
            return Err(DomainError::PromoPerUserLimit);
        }
        if subtotal_cents < self.min_order_cents {
            return Err(DomainError::PromoBelowMinimum {
                min_order: self.min_order_cents,
                subtotal: subtotal_cents,
            });
        }
        Ok(self.discount.amount_for(subtotal_cents))
    }

    /// Validate admin input.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidInput` describing the first bad field.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.code.is_empty() || self.code.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidInput(
                "promo code must be non-empty and contain no spaces".into(),
            ));
        }
        match self.discount {
            Discount::Percentage {
                percent,
                max_discount_cents,
            } => {
                if percent == 0 || percent > 100 {
                    return Err(DomainError::InvalidInput(
                        "percentage must be between 1 and 100".into(),
                    ));
                }
                if max_discount_cents.is_some_and(|c| c <= 0) {
                    return Err(DomainError::InvalidInput(
                        "discount cap must be positive".into(),
                    ));
                }
            }
            Discount::Fixed { amount_cents } => {
                if amount_cents <= 0 {
                    return Err(DomainError::InvalidInput(
                        "fixed discount must be positive".into(),
                    ));
                }
            }
        }
        if self.min_order_cents < 0 {
            return Err(DomainError::InvalidInput(
                "minimum order must not be negative".into(),
            ));
        }
        if let (Some(start), Some(end)) = (self.starts_at, self.expires_at) {
            if end <= start {
                return Err(DomainError::InvalidInput(
                    "expiry must be after the start".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Who redeemed a promo code: a signed-in user, or a guest identified by email.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Redeemer {
    /// Signed-in customer.
    User(UserId),
    /// Guest checkout, keyed by lower-cased email.
    Guest(String),
}

impl Redeemer {
    /// Build the redeemer for a checkout.
    #[must_use]
    pub fn for_checkout(user_id: Option<UserId>, email: &str) -> Self {
        user_id.map_or_else(|| Self::Guest(email.trim().to_lowercase()), Self::User)
    }

    /// Stable key, used for persistence and per-customer counting.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::User(id) => format!("user:{id}"),
            Self::Guest(email) => format!("email:{email}"),
        }
    }
}

impl fmt::Display for Redeemer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// One redemption of a promo code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCodeUsage {
    /// Redeemed code.
    pub promo_code_id: PromoCodeId,
    /// Who redeemed it.
    pub redeemer: Redeemer,
    /// Order the discount applied to.
    pub order_id: OrderId,
    /// Discount granted in cents.
    pub discount_cents: i64,
    /// When it was redeemed.
    pub used_at: DateTime<Utc>,
}
