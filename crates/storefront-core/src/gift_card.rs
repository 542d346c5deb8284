//! Store gift cards, redeemed into the wallet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::wallet::WalletChange;
use crate::{GiftCardId, UserId};

/// Largest batch an admin can issue at once.
pub const MAX_BATCH_SIZE: u32 = 500;

/// A prepaid card that deposits its value into the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftCard {
    /// Card ID.
    pub id: GiftCardId,
    /// Redemption code (`GC-XXXX-XXXX-XXXX`). Unique.
    pub code: String,
    /// Value in cents.
    pub value_cents: i64,
    /// Set once redeemed.
    pub is_redeemed: bool,
    /// Who redeemed it.
    pub redeemed_by: Option<UserId>,
    /// When it was redeemed.
    pub redeemed_at: Option<DateTime<Utc>>,
    /// Not redeemable after this instant.
    pub expires_at: Option<DateTime<Utc>>,
    /// When it was issued.
    pub created_at: DateTime<Utc>,
}

impl GiftCard {
    /// Issue a new card with a random code.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidInput` for a non-positive value or an
    /// expiry in the past.
    pub fn issue(
        value_cents: i64,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if value_cents <= 0 {
            return Err(DomainError::InvalidInput(
                "gift card value must be positive".into(),
            ));
        }
        if expires_at.is_some_and(|e| e <= now) {
            return Err(DomainError::InvalidInput(
                "gift card expiry must be in the future".into(),
            ));
        }
        let id = GiftCardId::generate();
        Ok(Self {
            id,
            code: code_for(&id),
            value_cents,
            is_redeemed: false,
            redeemed_by: None,
            redeemed_at: None,
            expires_at,
            created_at: now,
        })
    }

    /// Normalize user input to the stored form.
    #[must_use]
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }

    /// Mark the card redeemed by `user_id` and return the wallet deposit.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::GiftCardRedeemed` or `DomainError::GiftCardExpired`.
    pub fn redeem(
        &mut self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<WalletChange, DomainError> {
        if self.is_redeemed {
            return Err(DomainError::GiftCardRedeemed);
        }
        if self.expires_at.is_some_and(|e| now > e) {
            return Err(DomainError::GiftCardExpired);
        }
        self.is_redeemed = true;
        self.redeemed_by = Some(user_id);
        self.redeemed_at = Some(now);
        Ok(WalletChange::gift_card(&self.code, self.value_cents))
    }
}

fn code_for(id: &GiftCardId) -> String {
    let hex = id.as_uuid().simple().to_string().to_uppercase();
    format!("GC-{}-{}-{}", &hex[0..4], &hex[4..8], &hex[8..12])
}
