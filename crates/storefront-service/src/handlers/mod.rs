//! API handlers.

use serde::Deserialize;

pub mod game_codes;
pub mod gift_cards;
pub mod health;
pub mod orders;
pub mod products;
pub mod promo_codes;
pub mod settings;
pub mod users;

/// Largest page any list endpoint returns.
pub const MAX_LIMIT: usize = 100;

/// Pagination query parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Page {
    /// Maximum number of entries to return (default: 50, max: 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

impl Page {
    /// The limit clamped to `1..=MAX_LIMIT`.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit.clamp(1, MAX_LIMIT)
    }
}

fn default_limit() -> usize {
    50
}
