//! Users, roles and capabilities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;
use crate::UserId;

/// A storefront user.
///
/// `wallet_balance_cents` is denormalized: it only changes together with a
/// wallet ledger entry, inside the same store transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// The user ID (JWT subject).
    pub id: UserId,

    /// Contact email.
    pub email: String,

    /// Display name.
    pub name: String,

    /// Phone number, if given.
    pub phone: Option<String>,

    /// Role driving back-office permissions.
    pub role: Role,

    /// Current wallet balance in cents.
    pub wallet_balance_cents: i64,

    /// Soft-disabled accounts cannot check out or act as staff.
    pub disabled: bool,

    /// When the user registered.
    pub created_at: DateTime<Utc>,

    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a customer with an empty wallet.
    #[must_use]
    pub fn new(id: UserId, email: String, name: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            email,
            name,
            phone: None,
            role: Role::Customer,
            wallet_balance_cents: 0,
            disabled: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the user may use `capability`.
    #[must_use]
    pub const fn can(&self, capability: Capability) -> bool {
        !self.disabled && self.role.can(capability)
    }
}

/// User role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular shopper.
    Customer,

    /// Back-office operator without user or settings management.
    Manager,

    /// Full access.
    Admin,
}

/// Back-office permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Create and edit products and editions.
    ManageCatalog,
    /// View all orders, change status, attach game codes.
    ManageOrders,
    /// Create and edit promo codes.
    ManagePromotions,
    /// Issue gift cards and stock game codes.
    ManageGiftCards,
    /// Change roles and disable accounts.
    ManageUsers,
    /// Credit or debit wallets manually.
    AdjustWallets,
    /// Edit payment settings.
    ManageSettings,
}

impl Role {
    /// Capability check for this role.
    #[must_use]
    pub const fn can(self, capability: Capability) -> bool {
        match self {
            Self::Customer => false,
            Self::Admin => true,
            Self::Manager => matches!(
                capability,
                Capability::ManageCatalog
                    | Capability::ManageOrders
                    | Capability::ManagePromotions
                    | Capability::ManageGiftCards
            ),
        }
    }

    /// Whether the role has any back-office access.
    #[must_use]
    pub const fn is_staff(self) -> bool {
        !matches!(self, Self::Customer)
    }

    /// Stable string form, used for persistence.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Manager => "manager",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "manager" => Ok(Self::Manager),
            "admin" => Ok(Self::Admin),
            other => Err(DomainError::InvalidInput(format!("unknown role: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customers_have_no_back_office_access() {
        assert!(!Role::Customer.can(Capability::ManageOrders));
        assert!(!Role::Customer.is_staff());
    }

    #[test]
    fn managers_cannot_touch_users_or_settings() {
        assert!(Role::Manager.can(Capability::ManageOrders));
        assert!(Role::Manager.can(Capability::ManageCatalog));
        assert!(!Role::Manager.can(Capability::ManageUsers));
        assert!(!Role::Manager.can(Capability::AdjustWallets));
        assert!(!Role::Manager.can(Capability::ManageSettings));
    }

    #[test]
    fn disabled_admin_loses_capabilities() {
        let mut user = User::new(
            UserId::generate(),
            "a@example.com".into(),
            "A".into(),
            Utc::now(),
        );
        user.role = Role::Admin;
        assert!(user.can(Capability::ManageSettings));
        user.disabled = true;
        assert!(!user.can(Capability::ManageSettings));
    }

    #[test]
    fn role_parses_from_str() {
        assert_eq!("manager".parse::<Role>().unwrap(), Role::Manager);
        assert!("root".parse::<Role>().is_err());
    }
}
