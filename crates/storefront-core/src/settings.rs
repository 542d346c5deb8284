//! Payment settings shown at checkout and used when pricing orders.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::order::PaymentMethod;

/// Days a bank transfer order waits for payment before it is auto-cancelled.
pub const DEFAULT_PAYMENT_DEADLINE_DAYS: u32 = 5;

/// Default flat fee for cash on delivery, in cents ($5).
pub const DEFAULT_COD_FEE_CENTS: i64 = 500;

/// Longest allowed bank transfer deadline.
pub const MAX_PAYMENT_DEADLINE_DAYS: u32 = 30;

/// Store-wide payment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSettings {
    /// Bank name for transfers.
    pub bank_name: String,
    /// Account holder for transfers.
    pub account_holder: String,
    /// IBAN for transfers.
    pub iban: String,
    /// SWIFT/BIC, if any.
    pub swift: Option<String>,
    /// Bank transfer is offered at checkout.
    pub bank_transfer_enabled: bool,
    /// Cash on delivery is offered at checkout.
    pub cod_enabled: bool,
    /// Flat cash on delivery fee in cents.
    pub cod_fee_cents: i64,
    /// Wallet payment is offered at checkout.
    pub wallet_enabled: bool,
    /// Days before an unpaid bank transfer order is cancelled.
    pub payment_deadline_days: u32,
    /// When the settings were last changed.
    pub updated_at: DateTime<Utc>,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            bank_name: String::new(),
            account_holder: String::new(),
            iban: String::new(),
            swift: None,
            bank_transfer_enabled: true,
            cod_enabled: true,
            cod_fee_cents: DEFAULT_COD_FEE_CENTS,
            wallet_enabled: true,
            payment_deadline_days: DEFAULT_PAYMENT_DEADLINE_DAYS,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl PaymentSettings {
    /// Whether `method` may be used at checkout.
    #[must_use]
    pub const fn allows(&self, method: PaymentMethod) -> bool {
        match method {
            PaymentMethod::BankTransfer => self.bank_transfer_enabled,
            PaymentMethod::CashOnDelivery => self.cod_enabled,
            PaymentMethod::Wallet => self.wallet_enabled,
        }
    }

    /// Payment deadline for a bank transfer order placed at `now`.
    #[must_use]
    pub fn payment_deadline(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::days(i64::from(self.payment_deadline_days))
    }

    /// Validate admin input.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidInput` describing the first bad field.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.cod_fee_cents < 0 {
            return Err(DomainError::InvalidInput(
                "cash on delivery fee must not be negative".into(),
            ));
        }
        if self.payment_deadline_days == 0 || self.payment_deadline_days > MAX_PAYMENT_DEADLINE_DAYS
        {
            return Err(DomainError::InvalidInput(format!(
                "payment deadline must be between 1 and {MAX_PAYMENT_DEADLINE_DAYS} days"
            )));
        }
        if self.bank_transfer_enabled && self.iban.trim().is_empty() && !self.bank_name.is_empty() {
            return Err(DomainError::InvalidInput(
                "IBAN is required when bank details are given".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_deadline_is_five_days() {
        let settings = PaymentSettings::default();
        let now = Utc::now();
        assert_eq!(settings.payment_deadline(now), now + Duration::days(5));
    }

    #[test]
    fn rejects_out_of_range_deadline() {
        let settings = PaymentSettings {
            payment_deadline_days: 0,
            ..PaymentSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn disabled_methods_are_not_allowed() {
        let settings = PaymentSettings {
            cod_enabled: false,
            ..PaymentSettings::default()
        };
        assert!(!settings.allows(PaymentMethod::CashOnDelivery));
        assert!(settings.allows(PaymentMethod::BankTransfer));
    }
}
