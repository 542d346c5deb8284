//! Catalog types: products, editions and listing filters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;
use crate::{EditionId, ProductId};

/// Default page size for catalog listings.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Largest page size a listing will return.
pub const MAX_PAGE_SIZE: usize = 100;

/// What a product delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    /// A game key, delivered as a game code.
    Game,
    /// A third-party gift card, delivered as a game code.
    GiftCard,
    /// Wallet credit, deposited to the buyer's wallet on delivery.
    Credit,
}

impl ProductKind {
    /// Stable string form, used for persistence.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Game => "game",
            Self::GiftCard => "gift_card",
            Self::Credit => "credit",
        }
    }

    /// Whether delivery needs a game code per unit.
    #[must_use]
    pub const fn needs_code(self) -> bool {
        !matches!(self, Self::Credit)
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "game" => Ok(Self::Game),
            "gift_card" => Ok(Self::GiftCard),
            "credit" => Ok(Self::Credit),
            other => Err(DomainError::InvalidInput(format!(
                "unknown product kind: {other}"
            ))),
        }
    }
}

/// Merchandising flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFlags {
    /// The sale price applies.
    #[serde(default)]
    pub on_sale: bool,
    /// Shown in "new releases".
    #[serde(default)]
    pub is_new: bool,
    /// Orderable without stock.
    #[serde(default)]
    pub pre_order: bool,
}

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product ID.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Long description.
    pub description: String,
    /// Category slug (e.g. "action", "gift-cards").
    pub category: String,
    /// Platform (e.g. "steam", "psn"), if any.
    pub platform: Option<String>,
    /// What the product delivers.
    pub kind: ProductKind,
    /// List price in cents.
    pub price_cents: i64,
    /// Sale price in cents, used while `flags.on_sale` is set.
    pub sale_price_cents: Option<i64>,
    /// Units in stock for the base product.
    pub stock: i64,
    /// Merchandising flags.
    pub flags: ProductFlags,
    /// Wallet value delivered per unit of a credit product.
    pub credit_value_cents: Option<i64>,
    /// Image URL.
    pub image_url: Option<String>,
    /// Inactive products are hidden and cannot be bought.
    pub active: bool,
    /// Variants with their own price and stock.
    pub editions: Vec<ProductEdition>,
    /// When the product was created.
    pub created_at: DateTime<Utc>,
    /// When the product was last updated.
    pub updated_at: DateTime<Utc>,
}

/// A product variant (deluxe, ultimate, gift card denomination).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductEdition {
    /// Edition ID.
    pub id: EditionId,
    /// Owning product.
    pub product_id: ProductId,
    /// Display name.
    pub name: String,
    /// List price in cents.
    pub price_cents: i64,
    /// Sale price in cents, used while the product is on sale.
    pub sale_price_cents: Option<i64>,
    /// Units in stock.
    pub stock: i64,
    /// Inactive editions cannot be bought.
    pub active: bool,
}

impl Product {
    /// Price actually charged for the base product.
    #[must_use]
    pub fn effective_price_cents(&self) -> i64 {
        self.pick_price(self.price_cents, self.sale_price_cents)
    }

    /// Price actually charged for an edition of this product.
    #[must_use]
    pub fn edition_price_cents(&self, edition: &ProductEdition) -> i64 {
        self.pick_price(edition.price_cents, edition.sale_price_cents)
    }

    fn pick_price(&self, list: i64, sale: Option<i64>) -> i64 {
        match sale {
            Some(sale) if self.flags.on_sale => sale,
            _ => list,
        }
    }

    /// Look up an edition by ID.
    #[must_use]
    pub fn edition(&self, id: &EditionId) -> Option<&ProductEdition> {
        self.editions.iter().find(|e| e.id == *id)
    }

    /// Mutable edition lookup.
    pub fn edition_mut(&mut self, id: &EditionId) -> Option<&mut ProductEdition> {
        self.editions.iter_mut().find(|e| e.id == *id)
    }

    /// Validate admin input.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidInput` describing the first bad field.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidInput("product name is required".into()));
        }
        if self.price_cents < 0 || self.sale_price_cents.is_some_and(|p| p < 0) {
            return Err(DomainError::InvalidInput("prices must not be negative".into()));
        }
        if self.stock < 0 {
            return Err(DomainError::InvalidInput("stock must not be negative".into()));
        }
        if self.kind == ProductKind::Credit && self.credit_value_cents.unwrap_or(0) <= 0 {
            return Err(DomainError::InvalidInput(
                "credit products need a positive credit value".into(),
            ));
        }
        for edition in &self.editions {
            if edition.product_id != self.id {
                return Err(DomainError::InvalidInput(format!(
                    "edition {} belongs to another product",
                    edition.id
                )));
            }
            if edition.name.trim().is_empty() {
                return Err(DomainError::InvalidInput("edition name is required".into()));
            }
            if edition.price_cents < 0
                || edition.sale_price_cents.is_some_and(|p| p < 0)
                || edition.stock < 0
            {
                return Err(DomainError::InvalidInput(format!(
                    "edition {} has a negative price or stock",
                    edition.name
                )));
            }
        }
        Ok(())
    }
}

/// Sort order for catalog listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    /// Newest first.
    #[default]
    Newest,
    /// Cheapest first.
    PriceAsc,
    /// Most expensive first.
    PriceDesc,
    /// Alphabetical.
    Name,
}

/// Catalog listing filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductFilter {
    /// Category slug.
    pub category: Option<String>,
    /// Platform.
    pub platform: Option<String>,
    /// Product kind.
    pub kind: Option<ProductKind>,
    /// Only products on sale.
    pub on_sale: Option<bool>,
    /// Only new products.
    pub is_new: Option<bool>,
    /// Only pre-order products.
    pub pre_order: Option<bool>,
    /// Case-insensitive substring of the name.
    pub search: Option<String>,
    /// Minimum effective price in cents.
    pub min_price_cents: Option<i64>,
    /// Maximum effective price in cents.
    pub max_price_cents: Option<i64>,
    /// Sort order.
    #[serde(default)]
    pub sort: ProductSort,
    /// Include inactive products (back-office only).
    #[serde(default)]
    pub include_inactive: bool,
    /// Page size.
    pub limit: Option<usize>,
    /// Page offset.
    #[serde(default)]
    pub offset: usize,
}

impl ProductFilter {
    /// Page size, clamped to [`MAX_PAGE_SIZE`].
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE)
    }

    /// Whether `product` passes every filter.
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        if !self.include_inactive && !product.active {
            return false;
        }
        if self
            .category
            .as_deref()
            .is_some_and(|c| !c.eq_ignore_ascii_case(&product.category))
        {
            return false;
        }
        if let Some(platform) = self.platform.as_deref() {
            if !product
                .platform
                .as_deref()
                .is_some_and(|p| p.eq_ignore_ascii_case(platform))
            {
                return false;
            }
        }
        if self.kind.is_some_and(|k| k != product.kind) {
            return false;
        }
        if self.on_sale.is_some_and(|v| v != product.flags.on_sale)
            || self.is_new.is_some_and(|v| v != product.flags.is_new)
            || self.pre_order.is_some_and(|v| v != product.flags.pre_order)
        {
            return false;
        }
        if let Some(search) = self.search.as_deref() {
            if !product.name.to_lowercase().contains(&search.to_lowercase()) {
                return false;
            }
        }
        let price = product.effective_price_cents();
        if self.min_price_cents.is_some_and(|min| price < min)
            || self.max_price_cents.is_some_and(|max| price > max)
        {
            return false;
        }
        true
    }

    /// Filter, sort and page an in-memory product list.
    #[must_use]
    pub fn apply(&self, products: impl IntoIterator<Item = Product>) -> Vec<Product> {
        let mut matching: Vec<Product> = products.into_iter().filter(|p| self.matches(p)).collect();
        match self.sort {
            ProductSort::Newest => matching.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            ProductSort::PriceAsc => matching.sort_by_key(Product::effective_price_cents),
            ProductSort::PriceDesc => {
                matching.sort_by_key(|p| std::cmp::Reverse(p.effective_price_cents()));
            }
            ProductSort::Name => matching.sort_by(|a, b| a.name.cmp(&b.name)),
        }
        matching
            .into_iter()
            .skip(self.offset)
            .take(self.page_size())
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn product(name: &str, price_cents: i64, stock: i64) -> Product {
        let now = Utc::now();
        Product {
            id: ProductId::generate(),
            name: name.into(),
            description: String::new(),
            category: "action".into(),
            platform: Some("steam".into()),
            kind: ProductKind::Game,
            price_cents,
            sale_price_cents: None,
            stock,
            flags: ProductFlags::default(),
            credit_value_cents: None,
            image_url: None,
            active: true,
            editions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn sale_price_applies_only_when_on_sale() {
        let mut p = product("Game", 5000, 1);
        p.sale_price_cents = Some(3500);
        assert_eq!(p.effective_price_cents(), 5000);
        p.flags.on_sale = true;
        assert_eq!(p.effective_price_cents(), 3500);
    }

    #[test]
    fn filter_hides_inactive_and_matches_search() {
        let mut hidden = product("Hidden Quest", 1000, 1);
        hidden.active = false;
        let visible = product("Space Quest", 2000, 1);
        let other = product("Racer", 3000, 1);

        let filter = ProductFilter {
            search: Some("quest".into()),
            ..ProductFilter::default()
        };
        let result = filter.apply(vec![hidden, visible.clone(), other]);
        assert_eq!(result, vec![visible]);
    }

    #[test]
    fn filter_sorts_by_price_and_pages() {
        let cheap = product("A", 1000, 1);
        let mid = product("B", 2000, 1);
        let dear = product("C", 3000, 1);

        let filter = ProductFilter {
            sort: ProductSort::PriceDesc,
            limit: Some(2),
            ..ProductFilter::default()
        };
        let names: Vec<_> = filter
            .apply(vec![cheap, mid, dear])
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["C", "B"]);
    }

    #[test]
    fn credit_products_need_credit_value() {
        let mut p = product("Wallet $10", 1000, 100);
        p.kind = ProductKind::Credit;
        assert!(p.validate().is_err());
        p.credit_value_cents = Some(1000);
        assert!(p.validate().is_ok());
    }
}
