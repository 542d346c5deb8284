//! Catalog handlers: public listing and detail, staff product management.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use storefront_core::{
    Capability, EditionId, Product, ProductEdition, ProductFilter, ProductFlags, ProductId,
    ProductKind,
};

use crate::auth::Staff;
use crate::error::ApiError;
use crate::state::AppState;

/// Product list response.
#[derive(Debug, Serialize)]
pub struct ProductListResponse {
    /// Matching products.
    pub products: Vec<Product>,
}

/// List active products.
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(mut filter): Query<ProductFilter>,
) -> Result<Json<ProductListResponse>, ApiError> {
    filter.include_inactive = false;
    let products = state.store.list_products(&filter).await?;
    Ok(Json(ProductListResponse { products }))
}

/// Get an active product.
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let product = find_product(&state, &product_id).await?;
    if !product.active {
        return Err(ApiError::NotFound(format!("Product not found: {product_id}")));
    }
    Ok(Json(product))
}

async fn find_product(state: &AppState, product_id: &str) -> Result<Product, ApiError> {
    let id: ProductId = product_id
        .parse()
        .map_err(|_| ApiError::NotFound(format!("Product not found: {product_id}")))?;
    state
        .store
        .get_product(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product not found: {product_id}")))
}

// ============================================================================
// Staff
// ============================================================================

/// Edition fields in a product request. Without `id` a new edition is created.
#[derive(Debug, Deserialize)]
pub struct EditionInput {
    /// Existing edition to update.
    pub id: Option<EditionId>,
    /// Edition name.
    pub name: String,
    /// List price in cents.
    pub price_cents: i64,
    /// Sale price in cents.
    pub sale_price_cents: Option<i64>,
    /// Units in stock.
    #[serde(default)]
    pub stock: i64,
    /// Whether the edition can be bought.
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Product create/update request.
#[derive(Debug, Deserialize)]
pub struct ProductInput {
    /// Display name.
    pub name: String,
    /// Long description.
    #[serde(default)]
    pub description: String,
    /// Category slug.
    pub category: String,
    /// Platform.
    pub platform: Option<String>,
    /// What the product delivers.
    pub kind: ProductKind,
    /// List price in cents.
    pub price_cents: i64,
    /// Sale price in cents.
    pub sale_price_cents: Option<i64>,
    /// Units in stock.
    #[serde(default)]
    pub stock: i64,
    /// Merchandising flags.
    #[serde(default)]
    pub flags: ProductFlags,
    /// Wallet credit per unit for credit products.
    pub credit_value_cents: Option<i64>,
    /// Image URL.
    pub image_url: Option<String>,
    /// Whether the product is listed.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Editions, in display order.
    #[serde(default)]
    pub editions: Vec<EditionInput>,
}

fn default_true() -> bool {
    true
}

impl ProductInput {
    fn into_product(self, existing: Option<&Product>) -> Product {
        let now = Utc::now();
        let id = existing.map_or_else(ProductId::generate, |p| p.id);
        let editions = self
            .editions
            .into_iter()
            .map(|e| ProductEdition {
                id: e.id.unwrap_or_else(EditionId::generate),
                product_id: id,
                name: e.name.trim().to_string(),
                price_cents: e.price_cents,
                sale_price_cents: e.sale_price_cents,
                stock: e.stock,
                active: e.active,
            })
            .collect();

        Product {
            id,
            name: self.name.trim().to_string(),
            description: self.description,
            category: self.category.trim().to_lowercase(),
            platform: self.platform,
            kind: self.kind,
            price_cents: self.price_cents,
            sale_price_cents: self.sale_price_cents,
            stock: self.stock,
            flags: self.flags,
            credit_value_cents: self.credit_value_cents,
            image_url: self.image_url,
            active: self.active,
            editions,
            created_at: existing.map_or(now, |p| p.created_at),
            updated_at: now,
        }
    }
}

/// List products, inactive ones included.
pub async fn admin_list_products(
    State(state): State<Arc<AppState>>,
    staff: Staff,
    Query(mut filter): Query<ProductFilter>,
) -> Result<Json<ProductListResponse>, ApiError> {
    staff.require(Capability::ManageCatalog)?;
    filter.include_inactive = true;
    let products = state.store.list_products(&filter).await?;
    Ok(Json(ProductListResponse { products }))
}

/// Create a product.
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    staff: Staff,
    Json(body): Json<ProductInput>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    staff.require(Capability::ManageCatalog)?;
    let product = body.into_product(None);
    product.validate()?;
    state.store.put_product(&product).await?;

    tracing::info!(
        product_id = %product.id,
        name = %product.name,
        actor = %staff.actor(),
        "Product created"
    );

    Ok((StatusCode::CREATED, Json(product)))
}

/// Replace a product and its editions.
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    staff: Staff,
    Path(product_id): Path<String>,
    Json(body): Json<ProductInput>,
) -> Result<Json<Product>, ApiError> {
    staff.require(Capability::ManageCatalog)?;
    let existing = find_product(&state, &product_id).await?;
    let product = body.into_product(Some(&existing));
    product.validate()?;
    state.store.put_product(&product).await?;

    tracing::info!(product_id = %product.id, actor = %staff.actor(), "Product updated");

    Ok(Json(product))
}

/// Deactivate a product. Products are never deleted; past orders refer to them.
pub async fn deactivate_product(
    State(state): State<Arc<AppState>>,
    staff: Staff,
    Path(product_id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    staff.require(Capability::ManageCatalog)?;
    let mut product = find_product(&state, &product_id).await?;
    product.active = false;
    product.updated_at = Utc::now();
    state.store.put_product(&product).await?;

    tracing::info!(product_id = %product.id, actor = %staff.actor(), "Product deactivated");

    Ok(Json(product))
}
