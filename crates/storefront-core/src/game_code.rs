//! Game code pool and delivery assignment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::order::Order;
use crate::{EditionId, GameCodeId, OrderId, ProductId};

/// A redeemable key delivered to the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameCode {
    /// Code ID.
    pub id: GameCodeId,
    /// The key itself. Unique.
    pub code: String,
    /// Product the key belongs to. Untyped keys can be attached by hand only.
    pub product_id: Option<ProductId>,
    /// Edition the key belongs to.
    pub edition_id: Option<EditionId>,
    /// Order the key was delivered with.
    pub order_id: Option<OrderId>,
    /// Set once the key is attached to an order.
    pub is_used: bool,
    /// When the key was attached.
    pub assigned_at: Option<DateTime<Utc>>,
    /// When the key was added to the pool.
    pub created_at: DateTime<Utc>,
}

impl GameCode {
    /// Create an unused pool entry.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidInput` for a blank code.
    pub fn new(
        code: &str,
        product_id: Option<ProductId>,
        edition_id: Option<EditionId>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(DomainError::InvalidInput("game code must not be blank".into()));
        }
        if edition_id.is_some() && product_id.is_none() {
            return Err(DomainError::InvalidInput(
                "an edition code needs its product".into(),
            ));
        }
        Ok(Self {
            id: GameCodeId::generate(),
            code: code.to_string(),
            product_id,
            edition_id,
            order_id: None,
            is_used: false,
            assigned_at: None,
            created_at: now,
        })
    }

    /// Attach the code to an order.
    pub fn assign(&mut self, order_id: OrderId, now: DateTime<Utc>) {
        self.order_id = Some(order_id);
        self.is_used = true;
        self.assigned_at = Some(now);
    }

    /// Whether the key fits a line of `product_id`/`edition_id`.
    #[must_use]
    pub fn fits(&self, product_id: ProductId, edition_id: Option<EditionId>) -> bool {
        self.product_id == Some(product_id) && self.edition_id == edition_id
    }
}

/// Game code listing filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameCodeFilter {
    /// Only codes for this product.
    pub product_id: Option<ProductId>,
    /// Only codes attached to this order.
    pub order_id: Option<OrderId>,
    /// Only codes still in the pool.
    #[serde(default)]
    pub unused_only: bool,
    /// Page size.
    pub limit: Option<usize>,
    /// Page offset.
    #[serde(default)]
    pub offset: usize,
}

impl GameCodeFilter {
    /// Whether `code` passes the filter.
    #[must_use]
    pub fn matches(&self, code: &GameCode) -> bool {
        self.product_id.map_or(true, |p| code.product_id == Some(p))
            && self.order_id.map_or(true, |o| code.order_id == Some(o))
            && (!self.unused_only || !code.is_used)
    }

    /// Page size, clamped to the listing maximum.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.limit
            .unwrap_or(crate::product::DEFAULT_PAGE_SIZE)
            .min(crate::product::MAX_PAGE_SIZE)
    }
}

/// Pick pool codes for the lines of `order` that still lack a code.
///
/// `attached` are the codes already on the order: matching codes cover their
/// own line, untyped codes cover any line. `pool` are unused candidates and
/// are taken oldest first.
///
/// # Errors
///
/// Returns `DomainError::MissingGameCodes` naming the first line the pool
/// cannot cover.
pub fn select_codes(
    order: &Order,
    attached: &[GameCode],
    pool: &[GameCode],
) -> Result<Vec<GameCodeId>, DomainError> {
    let mut missing: Vec<(usize, u32)> = Vec::new();
    let mut spare_attached = attached.iter().filter(|c| c.product_id.is_none()).count();

    for (index, item) in order.items.iter().enumerate() {
        if !item.kind.needs_code() {
            continue;
        }
        let covered = attached
            .iter()
            .filter(|c| c.fits(item.product_id, item.edition_id))
            .count();
        let mut needed = item
            .quantity
            .saturating_sub(u32::try_from(covered).unwrap_or(u32::MAX));
        let from_spare = needed.min(u32::try_from(spare_attached).unwrap_or(u32::MAX));
        needed -= from_spare;
        spare_attached -= from_spare as usize;
        if needed > 0 {
            missing.push((index, needed));
        }
    }

    let mut candidates: Vec<&GameCode> = pool.iter().filter(|c| !c.is_used).collect();
    candidates.sort_by_key(|c| c.created_at);

    let mut selected = Vec::new();
    for (index, needed) in missing {
        let item = &order.items[index];
        let matching: Vec<GameCodeId> = candidates
            .iter()
            .filter(|c| c.fits(item.product_id, item.edition_id))
            .filter(|c| !selected.contains(&c.id))
            .map(|c| c.id)
            .collect();
        let available = u32::try_from(matching.len()).unwrap_or(u32::MAX);
        if available < needed {
            return Err(DomainError::MissingGameCodes {
                product: item.label(),
                needed,
                available,
            });
        }
        selected.extend(matching.into_iter().take(needed as usize));
    }
    Ok(selected)
}
