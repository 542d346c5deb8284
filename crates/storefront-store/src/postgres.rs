//! `PostgreSQL` storage implementation.
//!
//! Every compound operation runs in one transaction. Rows that a business
//! rule reads (user balance, product stock, promo counters, the order itself)
//! are locked `FOR UPDATE`, users before products, so concurrent checkouts
//! serialize on the rows they share.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use storefront_core::checkout::{build_order, quote, QuoteContext, StockLine};
use storefront_core::lifecycle::{plan, Effect};
use storefront_core::{
    select_codes, Checkout, ContactInfo, Discount, DomainError, EditionId, GameCode,
    GameCodeFilter, GameCodeId, GiftCard, GiftCardId, Order, OrderFilter, OrderId, OrderItem,
    OrderStatus, PaymentSettings, Product, ProductEdition, ProductFilter, ProductFlags, ProductId,
    ProductSort, PromoCode, PromoCodeId, Redeemer, Transition, User, UserId, WalletChange,
    WalletTransaction,
};

use crate::error::{Result, StoreError};
use crate::{Redemption, Store, UserUpdate};

// ============================================================================
// Column lists
// ============================================================================

const USER_COLUMNS: &str =
    "id, email, name, phone, role, wallet_balance_cents, disabled, created_at, updated_at";

const PRODUCT_COLUMNS: &str = "id, name, description, category, platform, kind, price_cents, \
     sale_price_cents, stock, on_sale, is_new, pre_order, credit_value_cents, image_url, active, \
     created_at, updated_at";

const EDITION_COLUMNS: &str =
    "id, product_id, name, price_cents, sale_price_cents, stock, active";

const EFFECTIVE_PRICE: &str =
    "(CASE WHEN on_sale AND sale_price_cents IS NOT NULL THEN sale_price_cents ELSE price_cents END)";

const PROMO_COLUMNS: &str = "id, code, description, discount, min_order_cents, max_uses, \
     max_uses_per_user, used_count, starts_at, expires_at, active, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, order_number, user_id, contact_name, contact_email, \
     contact_phone, contact_address, contact_notes, payment_method, status, payment_status, \
     subtotal_cents, promo_code, promo_discount_cents, wallet_amount_used_cents, cod_fee_cents, \
     total_amount_cents, payment_deadline, cancelled_reason, cashback_credited, created_at, \
     updated_at, paid_at, delivered_at, cancelled_at";

const ITEM_COLUMNS: &str = "order_id, position, product_id, edition_id, product_name, \
     edition_name, kind, unit_price_cents, quantity, line_total_cents, credit_value_cents";

const GAME_CODE_COLUMNS: &str =
    "id, code, product_id, edition_id, order_id, is_used, assigned_at, created_at";

const WALLET_COLUMNS: &str =
    "id, user_id, order_id, kind, amount_cents, balance_after_cents, description, created_at";

const GIFT_CARD_COLUMNS: &str =
    "id, code, value_cents, is_redeemed, redeemed_by, redeemed_at, expires_at, created_at";

// ============================================================================
// Conversions
// ============================================================================

fn parse<T>(value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| StoreError::Serialization(e.to_string()))
}

fn count(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("{column} out of range: {value}")))
}

fn sql_int(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: String,
    phone: Option<String>,
    role: String,
    wallet_balance_cents: i64,
    disabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(Self {
            id: UserId::from_uuid(row.id),
            email: row.email,
            name: row.name,
            phone: row.phone,
            role: parse(&row.role)?,
            wallet_balance_cents: row.wallet_balance_cents,
            disabled: row.disabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    description: String,
    category: String,
    platform: Option<String>,
    kind: String,
    price_cents: i64,
    sale_price_cents: Option<i64>,
    stock: i64,
    on_sale: bool,
    is_new: bool,
    pre_order: bool,
    credit_value_cents: Option<i64>,
    image_url: Option<String>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct EditionRow {
    id: Uuid,
    product_id: Uuid,
    name: String,
    price_cents: i64,
    sale_price_cents: Option<i64>,
    stock: i64,
    active: bool,
}

impl From<EditionRow> for ProductEdition {
    fn from(row: EditionRow) -> Self {
        Self {
            id: EditionId::from_uuid(row.id),
            product_id: ProductId::from_uuid(row.product_id),
            name: row.name,
            price_cents: row.price_cents,
            sale_price_cents: row.sale_price_cents,
            stock: row.stock,
            active: row.active,
        }
    }
}

impl ProductRow {
    fn into_product(self, editions: Vec<ProductEdition>) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(self.id),
            name: self.name,
            description: self.description,
            category: self.category,
            platform: self.platform,
            kind: parse(&self.kind)?,
            price_cents: self.price_cents,
            sale_price_cents: self.sale_price_cents,
            stock: self.stock,
            flags: ProductFlags {
                on_sale: self.on_sale,
                is_new: self.is_new,
                pre_order: self.pre_order,
            },
            credit_value_cents: self.credit_value_cents,
            image_url: self.image_url,
            active: self.active,
            editions,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct PromoRow {
    id: Uuid,
    code: String,
    description: String,
    discount: Json<Discount>,
    min_order_cents: i64,
    max_uses: Option<i64>,
    max_uses_per_user: Option<i64>,
    used_count: i64,
    starts_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PromoRow> for PromoCode {
    type Error = StoreError;

    fn try_from(row: PromoRow) -> Result<Self> {
        Ok(Self {
            id: PromoCodeId::from_uuid(row.id),
            code: row.code,
            description: row.description,
            discount: row.discount.0,
            min_order_cents: row.min_order_cents,
            max_uses: row.max_uses.map(|v| count(v, "max_uses")).transpose()?,
            max_uses_per_user: row
                .max_uses_per_user
                .map(|v| count(v, "max_uses_per_user"))
                .transpose()?,
            used_count: count(row.used_count, "used_count")?,
            starts_at: row.starts_at,
            expires_at: row.expires_at,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct SettingsRow {
    bank_name: String,
    account_holder: String,
    iban: String,
    swift: Option<String>,
    bank_transfer_enabled: bool,
    cod_enabled: bool,
    cod_fee_cents: i64,
    wallet_enabled: bool,
    payment_deadline_days: i64,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SettingsRow> for PaymentSettings {
    type Error = StoreError;

    fn try_from(row: SettingsRow) -> Result<Self> {
        Ok(Self {
            bank_name: row.bank_name,
            account_holder: row.account_holder,
            iban: row.iban,
            swift: row.swift,
            bank_transfer_enabled: row.bank_transfer_enabled,
            cod_enabled: row.cod_enabled,
            cod_fee_cents: row.cod_fee_cents,
            wallet_enabled: row.wallet_enabled,
            payment_deadline_days: count(row.payment_deadline_days, "payment_deadline_days")?,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct OrderRow {
    id: String,
    order_number: String,
    user_id: Option<Uuid>,
    contact_name: String,
    contact_email: String,
    contact_phone: String,
    contact_address: Option<String>,
    contact_notes: Option<String>,
    payment_method: String,
    status: String,
    payment_status: String,
    subtotal_cents: i64,
    promo_code: Option<String>,
    promo_discount_cents: i64,
    wallet_amount_used_cents: i64,
    cod_fee_cents: i64,
    total_amount_cents: i64,
    payment_deadline: Option<DateTime<Utc>>,
    cancelled_reason: Option<String>,
    cashback_credited: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order> {
        Ok(Order {
            id: parse(&self.id)?,
            order_number: self.order_number,
            user_id: self.user_id.map(UserId::from_uuid),
            contact: ContactInfo {
                name: self.contact_name,
                email: self.contact_email,
                phone: self.contact_phone,
                address: self.contact_address,
                notes: self.contact_notes,
            },
            items,
            payment_method: parse(&self.payment_method)?,
            status: parse(&self.status)?,
            payment_status: parse(&self.payment_status)?,
            subtotal_cents: self.subtotal_cents,
            promo_code: self.promo_code,
            promo_discount_cents: self.promo_discount_cents,
            wallet_amount_used_cents: self.wallet_amount_used_cents,
            cod_fee_cents: self.cod_fee_cents,
            total_amount_cents: self.total_amount_cents,
            payment_deadline: self.payment_deadline,
            cancelled_reason: self.cancelled_reason,
            cashback_credited: self.cashback_credited,
            created_at: self.created_at,
            updated_at: self.updated_at,
            paid_at: self.paid_at,
            delivered_at: self.delivered_at,
            cancelled_at: self.cancelled_at,
        })
    }
}

#[derive(FromRow)]
struct ItemRow {
    order_id: String,
    product_id: Uuid,
    edition_id: Option<Uuid>,
    product_name: String,
    edition_name: Option<String>,
    kind: String,
    unit_price_cents: i64,
    quantity: i64,
    line_total_cents: i64,
    credit_value_cents: Option<i64>,
}

impl TryFrom<ItemRow> for OrderItem {
    type Error = StoreError;

    fn try_from(row: ItemRow) -> Result<Self> {
        Ok(Self {
            product_id: ProductId::from_uuid(row.product_id),
            edition_id: row.edition_id.map(EditionId::from_uuid),
            product_name: row.product_name,
            edition_name: row.edition_name,
            kind: parse(&row.kind)?,
            unit_price_cents: row.unit_price_cents,
            quantity: count(row.quantity, "quantity")?,
            line_total_cents: row.line_total_cents,
            credit_value_cents: row.credit_value_cents,
        })
    }
}

#[derive(FromRow)]
struct GameCodeRow {
    id: Uuid,
    code: String,
    product_id: Option<Uuid>,
    edition_id: Option<Uuid>,
    order_id: Option<String>,
    is_used: bool,
    assigned_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<GameCodeRow> for GameCode {
    type Error = StoreError;

    fn try_from(row: GameCodeRow) -> Result<Self> {
        Ok(Self {
            id: GameCodeId::from_uuid(row.id),
            code: row.code,
            product_id: row.product_id.map(ProductId::from_uuid),
            edition_id: row.edition_id.map(EditionId::from_uuid),
            order_id: row.order_id.as_deref().map(parse).transpose()?,
            is_used: row.is_used,
            assigned_at: row.assigned_at,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct WalletRow {
    id: String,
    user_id: Uuid,
    order_id: Option<String>,
    kind: String,
    amount_cents: i64,
    balance_after_cents: i64,
    description: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<WalletRow> for WalletTransaction {
    type Error = StoreError;

    fn try_from(row: WalletRow) -> Result<Self> {
        Ok(Self {
            id: parse(&row.id)?,
            user_id: UserId::from_uuid(row.user_id),
            order_id: row.order_id.as_deref().map(parse).transpose()?,
            kind: parse(&row.kind)?,
            amount_cents: row.amount_cents,
            balance_after_cents: row.balance_after_cents,
            description: row.description,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct GiftCardRow {
    id: Uuid,
    code: String,
    value_cents: i64,
    is_redeemed: bool,
    redeemed_by: Option<Uuid>,
    redeemed_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<GiftCardRow> for GiftCard {
    fn from(row: GiftCardRow) -> Self {
        Self {
            id: GiftCardId::from_uuid(row.id),
            code: row.code,
            value_cents: row.value_cents,
            is_redeemed: row.is_redeemed,
            redeemed_by: row.redeemed_by.map(UserId::from_uuid),
            redeemed_at: row.redeemed_at,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

// ============================================================================
// Row-level helpers, usable inside or outside a transaction
// ============================================================================

async fn load_user(conn: &mut PgConnection, user_id: UserId, lock: bool) -> Result<Option<User>> {
    let sql = if lock {
        format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE")
    } else {
        format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1")
    };
    sqlx::query_as::<_, UserRow>(&sql)
        .bind(*user_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?
        .map(User::try_from)
        .transpose()
}

async fn with_editions(
    conn: &mut PgConnection,
    rows: Vec<ProductRow>,
    lock: bool,
) -> Result<Vec<Product>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let sql = if lock {
        format!(
            "SELECT {EDITION_COLUMNS} FROM product_editions WHERE product_id = ANY($1) \
             ORDER BY product_id, position FOR UPDATE"
        )
    } else {
        format!(
            "SELECT {EDITION_COLUMNS} FROM product_editions WHERE product_id = ANY($1) \
             ORDER BY product_id, position"
        )
    };
    let editions = sqlx::query_as::<_, EditionRow>(&sql)
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?;

    let mut by_product: HashMap<Uuid, Vec<ProductEdition>> = HashMap::new();
    for edition in editions {
        by_product
            .entry(edition.product_id)
            .or_default()
            .push(edition.into());
    }
    rows.into_iter()
        .map(|row| {
            let editions = by_product.remove(&row.id).unwrap_or_default();
            row.into_product(editions)
        })
        .collect()
}

async fn lock_products(
    conn: &mut PgConnection,
    ids: &[ProductId],
) -> Result<HashMap<ProductId, Product>> {
    let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE"
    ))
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;
    Ok(with_editions(conn, rows, true)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect())
}

async fn load_settings(conn: &mut PgConnection) -> Result<PaymentSettings> {
    sqlx::query_as::<_, SettingsRow>(
        "SELECT bank_name, account_holder, iban, swift, bank_transfer_enabled, cod_enabled, \
         cod_fee_cents, wallet_enabled, payment_deadline_days, updated_at \
         FROM payment_settings WHERE id = 1",
    )
    .fetch_optional(&mut *conn)
    .await?
    .map_or_else(|| Ok(PaymentSettings::default()), PaymentSettings::try_from)
}

async fn with_items(conn: &mut PgConnection, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
    let items = sqlx::query_as::<_, ItemRow>(&format!(
        "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position"
    ))
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_order: HashMap<String, Vec<OrderItem>> = HashMap::new();
    for item in items {
        let order_id = item.order_id.clone();
        by_order
            .entry(order_id)
            .or_default()
            .push(OrderItem::try_from(item)?);
    }
    rows.into_iter()
        .map(|row| {
            let items = by_order.remove(&row.id).unwrap_or_default();
            row.into_order(items)
        })
        .collect()
}

async fn load_order(conn: &mut PgConnection, order_id: OrderId, lock: bool) -> Result<Option<Order>> {
    let sql = if lock {
        format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE")
    } else {
        format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1")
    };
    let rows = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(order_id.to_string())
        .fetch_all(&mut *conn)
        .await?;
    Ok(with_items(conn, rows).await?.pop())
}

async fn insert_order(conn: &mut PgConnection, order: &Order) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO orders ({ORDER_COLUMNS}) VALUES \
         ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, \
          $20, $21, $22, $23, $24, $25)"
    ))
    .bind(order.id.to_string())
    .bind(&order.order_number)
    .bind(order.user_id.map(|u| *u.as_uuid()))
    .bind(&order.contact.name)
    .bind(&order.contact.email)
    .bind(&order.contact.phone)
    .bind(&order.contact.address)
    .bind(&order.contact.notes)
    .bind(order.payment_method.as_str())
    .bind(order.status.as_str())
    .bind(order.payment_status.as_str())
    .bind(order.subtotal_cents)
    .bind(&order.promo_code)
    .bind(order.promo_discount_cents)
    .bind(order.wallet_amount_used_cents)
    .bind(order.cod_fee_cents)
    .bind(order.total_amount_cents)
    .bind(order.payment_deadline)
    .bind(&order.cancelled_reason)
    .bind(order.cashback_credited)
    .bind(order.created_at)
    .bind(order.updated_at)
    .bind(order.paid_at)
    .bind(order.delivered_at)
    .bind(order.cancelled_at)
    .execute(&mut *conn)
    .await?;

    for (position, item) in order.items.iter().enumerate() {
        sqlx::query(&format!(
            "INSERT INTO order_items ({ITEM_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(order.id.to_string())
        .bind(i32::try_from(position).unwrap_or(i32::MAX))
        .bind(*item.product_id.as_uuid())
        .bind(item.edition_id.map(|e| *e.as_uuid()))
        .bind(&item.product_name)
        .bind(&item.edition_name)
        .bind(item.kind.as_str())
        .bind(item.unit_price_cents)
        .bind(i64::from(item.quantity))
        .bind(item.line_total_cents)
        .bind(item.credit_value_cents)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn update_order(conn: &mut PgConnection, order: &Order) -> Result<()> {
    sqlx::query(
        "UPDATE orders SET status = $2, payment_status = $3, payment_deadline = $4, \
         cancelled_reason = $5, cashback_credited = $6, updated_at = $7, paid_at = $8, \
         delivered_at = $9, cancelled_at = $10 WHERE id = $1",
    )
    .bind(order.id.to_string())
    .bind(order.status.as_str())
    .bind(order.payment_status.as_str())
    .bind(order.payment_deadline)
    .bind(&order.cancelled_reason)
    .bind(order.cashback_credited)
    .bind(order.updated_at)
    .bind(order.paid_at)
    .bind(order.delivered_at)
    .bind(order.cancelled_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn apply_wallet(
    conn: &mut PgConnection,
    user_id: UserId,
    change: WalletChange,
    now: DateTime<Utc>,
) -> Result<WalletTransaction> {
    let balance: i64 =
        sqlx::query_scalar("SELECT wallet_balance_cents FROM users WHERE id = $1 FOR UPDATE")
            .bind(*user_id.as_uuid())
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| StoreError::not_found("user", user_id))?;

    let transaction = change.apply(user_id, balance, now)?;

    sqlx::query("UPDATE users SET wallet_balance_cents = $2, updated_at = $3 WHERE id = $1")
        .bind(*user_id.as_uuid())
        .bind(transaction.balance_after_cents)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    sqlx::query(&format!(
        "INSERT INTO wallet_transactions ({WALLET_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
    ))
    .bind(transaction.id.to_string())
    .bind(*user_id.as_uuid())
    .bind(transaction.order_id.map(|o| o.to_string()))
    .bind(transaction.kind.as_str())
    .bind(transaction.amount_cents)
    .bind(transaction.balance_after_cents)
    .bind(&transaction.description)
    .bind(transaction.created_at)
    .execute(&mut *conn)
    .await?;

    tracing::info!(
        user_id = %user_id,
        kind = %transaction.kind,
        amount_cents = transaction.amount_cents,
        balance_after_cents = transaction.balance_after_cents,
        "Wallet updated"
    );
    Ok(transaction)
}

async fn take_stock(
    conn: &mut PgConnection,
    lines: &[StockLine],
    check: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    for line in lines {
        let (name, pre_order, product_stock): (String, bool, i64) = sqlx::query_as(
            "SELECT name, pre_order, stock FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(*line.product_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StoreError::not_found("product", line.product_id))?;

        let available = match line.edition_id {
            Some(edition_id) => sqlx::query_scalar::<_, i64>(
                "SELECT stock FROM product_editions WHERE id = $1 AND product_id = $2 FOR UPDATE",
            )
            .bind(*edition_id.as_uuid())
            .bind(*line.product_id.as_uuid())
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DomainError::EditionNotFound(edition_id.to_string()))?,
            None => product_stock,
        };

        if check && !pre_order && available < line.quantity {
            return Err(DomainError::InsufficientStock {
                product: name,
                available,
                requested: line.quantity,
            }
            .into());
        }

        match line.edition_id {
            Some(edition_id) => {
                sqlx::query("UPDATE product_editions SET stock = stock - $2 WHERE id = $1")
                    .bind(*edition_id.as_uuid())
                    .bind(line.quantity)
                    .execute(&mut *conn)
                    .await?;
            }
            None => {
                sqlx::query("UPDATE products SET stock = stock - $2, updated_at = $3 WHERE id = $1")
                    .bind(*line.product_id.as_uuid())
                    .bind(line.quantity)
                    .bind(now)
                    .execute(&mut *conn)
                    .await?;
            }
        }
    }
    Ok(())
}

async fn release_stock(
    conn: &mut PgConnection,
    lines: &[StockLine],
    now: DateTime<Utc>,
) -> Result<()> {
    for line in lines {
        let result = match line.edition_id {
            Some(edition_id) => {
                sqlx::query("UPDATE product_editions SET stock = stock + $2 WHERE id = $1")
                    .bind(*edition_id.as_uuid())
                    .bind(line.quantity)
                    .execute(&mut *conn)
                    .await?
            }
            None => {
                sqlx::query("UPDATE products SET stock = stock + $2, updated_at = $3 WHERE id = $1")
                    .bind(*line.product_id.as_uuid())
                    .bind(line.quantity)
                    .bind(now)
                    .execute(&mut *conn)
                    .await?
            }
        };
        if result.rows_affected() == 0 {
            tracing::warn!(product_id = %line.product_id, "Restock skipped, product missing");
        }
    }
    Ok(())
}

async fn codes_for_order(conn: &mut PgConnection, order_id: OrderId) -> Result<Vec<GameCode>> {
    sqlx::query_as::<_, GameCodeRow>(&format!(
        "SELECT {GAME_CODE_COLUMNS} FROM game_codes WHERE order_id = $1 ORDER BY assigned_at, code"
    ))
    .bind(order_id.to_string())
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(GameCode::try_from)
    .collect()
}

async fn assign_codes(conn: &mut PgConnection, order: &Order, now: DateTime<Utc>) -> Result<()> {
    let attached = codes_for_order(conn, order.id).await?;
    let product_ids: Vec<Uuid> = order.items.iter().map(|i| *i.product_id.as_uuid()).collect();
    let pool: Vec<GameCode> = sqlx::query_as::<_, GameCodeRow>(&format!(
        "SELECT {GAME_CODE_COLUMNS} FROM game_codes \
         WHERE NOT is_used AND product_id = ANY($1) ORDER BY created_at FOR UPDATE"
    ))
    .bind(&product_ids)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(GameCode::try_from)
    .collect::<Result<_>>()?;

    let selected: Vec<Uuid> = select_codes(order, &attached, &pool)?
        .into_iter()
        .map(|id| *id.as_uuid())
        .collect();
    if selected.is_empty() {
        return Ok(());
    }
    sqlx::query(
        "UPDATE game_codes SET is_used = TRUE, order_id = $2, assigned_at = $3 WHERE id = ANY($1)",
    )
    .bind(&selected)
    .bind(order.id.to_string())
    .bind(now)
    .execute(&mut *conn)
    .await?;
    tracing::info!(order_id = %order.id, count = selected.len(), "Game codes assigned");
    Ok(())
}

async fn transition_in_tx(
    conn: &mut PgConnection,
    order_id: OrderId,
    transition: &Transition,
    now: DateTime<Utc>,
) -> Result<Order> {
    let order = load_order(conn, order_id, true)
        .await?
        .ok_or_else(|| StoreError::not_found("order", order_id))?;
    if let Some(user_id) = order.user_id {
        load_user(conn, user_id, true).await?;
    }
    let settings = load_settings(conn).await?;
    let Some(plan) = plan(&order, transition, &settings, now)? else {
        return Ok(order);
    };

    for effect in plan.effects {
        match effect {
            Effect::ReleaseStock(lines) => release_stock(conn, &lines, now).await?,
            Effect::ReserveStock(lines) => take_stock(conn, &lines, true, now).await?,
            Effect::Wallet { user_id, change } => {
                apply_wallet(conn, user_id, change, now).await?;
            }
            Effect::AssignCodes => assign_codes(conn, &plan.order, now).await?,
        }
    }
    update_order(conn, &plan.order).await?;

    tracing::info!(
        order_id = %order_id,
        from = %order.status,
        to = %plan.order.status,
        "Order status changed"
    );
    Ok(plan.order)
}

// ============================================================================
// Store
// ============================================================================

/// PostgreSQL-backed storage implementation.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to `database_url` with a pool of up to `max_connections`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn settle(&self, order: Option<Order>, now: DateTime<Utc>) -> Result<Option<Order>> {
        match order {
            Some(order) if order.is_overdue(now) => self
                .auto_cancel(order.id, now)
                .await
                .map(|found| found.map(|(order, _)| order)),
            other => Ok(other),
        }
    }

    /// Auto-cancel an order if it is still overdue once its row is locked.
    ///
    /// Returns the stored order and whether this call cancelled it; staff may
    /// have confirmed the payment since the order was read.
    async fn auto_cancel(
        &self,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<(Order, bool)>> {
        let mut tx = self.pool.begin().await?;
        let Some(order) = load_order(&mut tx, order_id, true).await? else {
            return Ok(None);
        };
        if !order.is_overdue(now) {
            return Ok(Some((order, false)));
        }
        let order = transition_in_tx(&mut tx, order_id, &Transition::AutoCancel, now).await?;
        tx.commit().await?;
        Ok(Some((order, true)))
    }
}

#[async_trait]
impl Store for PgStore {
    // =========================================================================
    // Users
    // =========================================================================

    async fn register_user(&self, user: &User) -> Result<User> {
        sqlx::query(&format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO NOTHING"
        ))
        .bind(*user.id.as_uuid())
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.phone)
        .bind(user.role.as_str())
        .bind(user.wallet_balance_cents)
        .bind(user.disabled)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        let mut conn = self.pool.acquire().await?;
        load_user(&mut conn, user.id, false)
            .await?
            .ok_or_else(|| StoreError::not_found("user", user.id))
    }

    async fn get_user(&self, user_id: &UserId) -> Result<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        load_user(&mut conn, *user_id, false).await
    }

    async fn list_users(&self, limit: usize, offset: usize) -> Result<Vec<User>> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at, id LIMIT $1 OFFSET $2"
        ))
        .bind(sql_int(limit))
        .bind(sql_int(offset))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(User::try_from)
        .collect()
    }

    async fn update_user(
        &self,
        user_id: &UserId,
        update: &UserUpdate,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let mut tx = self.pool.begin().await?;
        let mut user = load_user(&mut tx, *user_id, true)
            .await?
            .ok_or_else(|| StoreError::not_found("user", user_id))?;
        update.apply(&mut user, now);

        sqlx::query(
            "UPDATE users SET name = $2, phone = $3, role = $4, disabled = $5, updated_at = $6 \
             WHERE id = $1",
        )
        .bind(*user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.phone)
        .bind(user.role.as_str())
        .bind(user.disabled)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(user)
    }

    // =========================================================================
    // Wallet
    // =========================================================================

    async fn adjust_wallet(
        &self,
        user_id: &UserId,
        change: WalletChange,
        now: DateTime<Utc>,
    ) -> Result<WalletTransaction> {
        let mut tx = self.pool.begin().await?;
        let transaction = apply_wallet(&mut tx, *user_id, change, now).await?;
        tx.commit().await?;
        Ok(transaction)
    }

    async fn list_wallet_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WalletTransaction>> {
        sqlx::query_as::<_, WalletRow>(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallet_transactions WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(*user_id.as_uuid())
        .bind(sql_int(limit))
        .bind(sql_int(offset))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(WalletTransaction::try_from)
        .collect()
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    async fn put_product(&self, product: &Product) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, \
             description = EXCLUDED.description, category = EXCLUDED.category, \
             platform = EXCLUDED.platform, kind = EXCLUDED.kind, \
             price_cents = EXCLUDED.price_cents, sale_price_cents = EXCLUDED.sale_price_cents, \
             stock = EXCLUDED.stock, on_sale = EXCLUDED.on_sale, is_new = EXCLUDED.is_new, \
             pre_order = EXCLUDED.pre_order, credit_value_cents = EXCLUDED.credit_value_cents, \
             image_url = EXCLUDED.image_url, active = EXCLUDED.active, \
             updated_at = EXCLUDED.updated_at"
        ))
        .bind(*product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category)
        .bind(&product.platform)
        .bind(product.kind.as_str())
        .bind(product.price_cents)
        .bind(product.sale_price_cents)
        .bind(product.stock)
        .bind(product.flags.on_sale)
        .bind(product.flags.is_new)
        .bind(product.flags.pre_order)
        .bind(product.credit_value_cents)
        .bind(&product.image_url)
        .bind(product.active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await?;

        let keep: Vec<Uuid> = product.editions.iter().map(|e| *e.id.as_uuid()).collect();
        sqlx::query("DELETE FROM product_editions WHERE product_id = $1 AND NOT (id = ANY($2))")
            .bind(*product.id.as_uuid())
            .bind(&keep)
            .execute(&mut *tx)
            .await?;

        for (position, edition) in product.editions.iter().enumerate() {
            sqlx::query(
                "INSERT INTO product_editions \
                 (id, product_id, name, price_cents, sale_price_cents, stock, active, position) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, \
                 price_cents = EXCLUDED.price_cents, sale_price_cents = EXCLUDED.sale_price_cents, \
                 stock = EXCLUDED.stock, active = EXCLUDED.active, position = EXCLUDED.position",
            )
            .bind(*edition.id.as_uuid())
            .bind(*product.id.as_uuid())
            .bind(&edition.name)
            .bind(edition.price_cents)
            .bind(edition.sale_price_cents)
            .bind(edition.stock)
            .bind(edition.active)
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(*product_id.as_uuid())
        .fetch_all(&mut *conn)
        .await?;
        Ok(with_editions(&mut conn, rows, false).await?.pop())
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE TRUE"));
        if !filter.include_inactive {
            qb.push(" AND active");
        }
        if let Some(category) = &filter.category {
            qb.push(" AND LOWER(category) = LOWER(")
                .push_bind(category.clone())
                .push(")");
        }
        if let Some(platform) = &filter.platform {
            qb.push(" AND LOWER(platform) = LOWER(")
                .push_bind(platform.clone())
                .push(")");
        }
        if let Some(kind) = filter.kind {
            qb.push(" AND kind = ").push_bind(kind.as_str());
        }
        if let Some(on_sale) = filter.on_sale {
            qb.push(" AND on_sale = ").push_bind(on_sale);
        }
        if let Some(is_new) = filter.is_new {
            qb.push(" AND is_new = ").push_bind(is_new);
        }
        if let Some(pre_order) = filter.pre_order {
            qb.push(" AND pre_order = ").push_bind(pre_order);
        }
        if let Some(search) = &filter.search {
            qb.push(" AND name ILIKE ")
                .push_bind(format!("%{}%", escape_like(search)));
        }
        if let Some(min) = filter.min_price_cents {
            qb.push(format!(" AND {EFFECTIVE_PRICE} >= ")).push_bind(min);
        }
        if let Some(max) = filter.max_price_cents {
            qb.push(format!(" AND {EFFECTIVE_PRICE} <= ")).push_bind(max);
        }
        qb.push(match filter.sort {
            ProductSort::Newest => " ORDER BY created_at DESC, id".to_string(),
            ProductSort::PriceAsc => format!(" ORDER BY {EFFECTIVE_PRICE} ASC, id"),
            ProductSort::PriceDesc => format!(" ORDER BY {EFFECTIVE_PRICE} DESC, id"),
            ProductSort::Name => " ORDER BY name, id".to_string(),
        });
        qb.push(" LIMIT ")
            .push_bind(sql_int(filter.page_size()))
            .push(" OFFSET ")
            .push_bind(sql_int(filter.offset));

        let mut conn = self.pool.acquire().await?;
        let rows = qb
            .build_query_as::<ProductRow>()
            .fetch_all(&mut *conn)
            .await?;
        with_editions(&mut conn, rows, false).await
    }

    // =========================================================================
    // Promo codes
    // =========================================================================

    async fn put_promo_code(&self, promo: &PromoCode) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO promo_codes ({PROMO_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (id) DO UPDATE SET code = EXCLUDED.code, \
             description = EXCLUDED.description, discount = EXCLUDED.discount, \
             min_order_cents = EXCLUDED.min_order_cents, max_uses = EXCLUDED.max_uses, \
             max_uses_per_user = EXCLUDED.max_uses_per_user, starts_at = EXCLUDED.starts_at, \
             expires_at = EXCLUDED.expires_at, active = EXCLUDED.active, \
             updated_at = EXCLUDED.updated_at"
        ))
        .bind(*promo.id.as_uuid())
        .bind(&promo.code)
        .bind(&promo.description)
        .bind(Json(promo.discount))
        .bind(promo.min_order_cents)
        .bind(promo.max_uses.map(i64::from))
        .bind(promo.max_uses_per_user.map(i64::from))
        .bind(i64::from(promo.used_count))
        .bind(promo.starts_at)
        .bind(promo.expires_at)
        .bind(promo.active)
        .bind(promo.created_at)
        .bind(promo.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_promo_code(&self, promo_id: &PromoCodeId) -> Result<Option<PromoCode>> {
        sqlx::query_as::<_, PromoRow>(&format!(
            "SELECT {PROMO_COLUMNS} FROM promo_codes WHERE id = $1"
        ))
        .bind(*promo_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(PromoCode::try_from)
        .transpose()
    }

    async fn find_promo_code(&self, code: &str) -> Result<Option<PromoCode>> {
        sqlx::query_as::<_, PromoRow>(&format!(
            "SELECT {PROMO_COLUMNS} FROM promo_codes WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?
        .map(PromoCode::try_from)
        .transpose()
    }

    async fn list_promo_codes(&self) -> Result<Vec<PromoCode>> {
        sqlx::query_as::<_, PromoRow>(&format!(
            "SELECT {PROMO_COLUMNS} FROM promo_codes ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(PromoCode::try_from)
        .collect()
    }

    async fn count_promo_usages(
        &self,
        promo_id: &PromoCodeId,
        redeemer: &Redeemer,
    ) -> Result<u32> {
        let used: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM promo_code_usages WHERE promo_code_id = $1 AND redeemer = $2",
        )
        .bind(*promo_id.as_uuid())
        .bind(redeemer.key())
        .fetch_one(&self.pool)
        .await?;
        count(used, "promo usages")
    }

    // =========================================================================
    // Payment settings
    // =========================================================================

    async fn get_payment_settings(&self) -> Result<PaymentSettings> {
        let mut conn = self.pool.acquire().await?;
        load_settings(&mut conn).await
    }

    async fn put_payment_settings(&self, settings: &PaymentSettings) -> Result<()> {
        sqlx::query(
            "INSERT INTO payment_settings (id, bank_name, account_holder, iban, swift, \
             bank_transfer_enabled, cod_enabled, cod_fee_cents, wallet_enabled, \
             payment_deadline_days, updated_at) \
             VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO UPDATE SET bank_name = EXCLUDED.bank_name, \
             account_holder = EXCLUDED.account_holder, iban = EXCLUDED.iban, \
             swift = EXCLUDED.swift, bank_transfer_enabled = EXCLUDED.bank_transfer_enabled, \
             cod_enabled = EXCLUDED.cod_enabled, cod_fee_cents = EXCLUDED.cod_fee_cents, \
             wallet_enabled = EXCLUDED.wallet_enabled, \
             payment_deadline_days = EXCLUDED.payment_deadline_days, \
             updated_at = EXCLUDED.updated_at",
        )
        .bind(&settings.bank_name)
        .bind(&settings.account_holder)
        .bind(&settings.iban)
        .bind(&settings.swift)
        .bind(settings.bank_transfer_enabled)
        .bind(settings.cod_enabled)
        .bind(settings.cod_fee_cents)
        .bind(settings.wallet_enabled)
        .bind(i64::from(settings.payment_deadline_days))
        .bind(settings.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Orders
    // =========================================================================

    async fn place_order(&self, checkout: &Checkout, now: DateTime<Utc>) -> Result<Order> {
        checkout.validate()?;
        let mut tx = self.pool.begin().await?;

        let wallet_balance_cents = match checkout.user_id {
            Some(user_id) => {
                let user = load_user(&mut tx, user_id, true)
                    .await?
                    .ok_or_else(|| StoreError::not_found("user", user_id))?;
                if user.disabled {
                    return Err(DomainError::AccountDisabled.into());
                }
                user.wallet_balance_cents
            }
            None => 0,
        };

        let product_ids: Vec<ProductId> = checkout.items.iter().map(|i| i.product_id).collect();
        let products = lock_products(&mut tx, &product_ids).await?;

        let redeemer = Redeemer::for_checkout(checkout.user_id, &checkout.contact.email);
        let promo = match checkout.normalized_promo_code() {
            Some(code) => sqlx::query_as::<_, PromoRow>(&format!(
                "SELECT {PROMO_COLUMNS} FROM promo_codes WHERE code = $1 FOR UPDATE"
            ))
            .bind(code)
            .fetch_optional(&mut *tx)
            .await?
            .map(PromoCode::try_from)
            .transpose()?,
            None => None,
        };
        let promo_uses = match &promo {
            Some(promo) => {
                let used: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM promo_code_usages \
                     WHERE promo_code_id = $1 AND redeemer = $2",
                )
                .bind(*promo.id.as_uuid())
                .bind(redeemer.key())
                .fetch_one(&mut *tx)
                .await?;
                count(used, "promo usages")?
            }
            None => 0,
        };

        let settings = load_settings(&mut tx).await?;
        let quote = quote(
            checkout,
            &QuoteContext {
                products: &products,
                promo: promo.as_ref().map(|p| (p, promo_uses)),
                wallet_balance_cents,
                settings: &settings,
                now,
            },
        )?;

        let stock = quote.stock_taken.clone();
        let wallet_debit_cents = quote.wallet_debit_cents;
        let order = build_order(checkout, quote, &settings, now);

        insert_order(&mut tx, &order).await?;
        take_stock(&mut tx, &stock, false, now).await?;

        if let Some(promo) = &promo {
            sqlx::query(
                "UPDATE promo_codes SET used_count = used_count + 1, updated_at = $2 WHERE id = $1",
            )
            .bind(*promo.id.as_uuid())
            .bind(now)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "INSERT INTO promo_code_usages \
                 (promo_code_id, redeemer, order_id, discount_cents, used_at) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(*promo.id.as_uuid())
            .bind(redeemer.key())
            .bind(order.id.to_string())
            .bind(order.promo_discount_cents)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(user_id) = order.user_id.filter(|_| wallet_debit_cents > 0) {
            apply_wallet(
                &mut tx,
                user_id,
                WalletChange::payment(order.id, &order.order_number, wallet_debit_cents),
                now,
            )
            .await?;
        }

        tx.commit().await?;
        Ok(order)
    }

    async fn get_order(&self, order_id: &OrderId, now: DateTime<Utc>) -> Result<Option<Order>> {
        let order = {
            let mut conn = self.pool.acquire().await?;
            load_order(&mut conn, *order_id, false).await?
        };
        self.settle(order, now).await
    }

    async fn get_order_by_number(
        &self,
        order_number: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>> {
        let order = {
            let mut conn = self.pool.acquire().await?;
            let rows = sqlx::query_as::<_, OrderRow>(&format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE UPPER(order_number) = UPPER($1)"
            ))
            .bind(order_number)
            .fetch_all(&mut *conn)
            .await?;
            with_items(&mut conn, rows).await?.pop()
        };
        self.settle(order, now).await
    }

    async fn list_orders(&self, filter: &OrderFilter, now: DateTime<Utc>) -> Result<Vec<Order>> {
        self.cancel_overdue_orders(now).await?;

        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders WHERE TRUE"));
        if let Some(user_id) = filter.user_id {
            qb.push(" AND user_id = ").push_bind(*user_id.as_uuid());
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(method) = filter.payment_method {
            qb.push(" AND payment_method = ").push_bind(method.as_str());
        }
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(sql_int(filter.page_size()))
            .push(" OFFSET ")
            .push_bind(sql_int(filter.offset));

        let mut conn = self.pool.acquire().await?;
        let rows = qb.build_query_as::<OrderRow>().fetch_all(&mut *conn).await?;
        with_items(&mut conn, rows).await
    }

    async fn transition_order(
        &self,
        order_id: &OrderId,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        let order = transition_in_tx(&mut tx, *order_id, transition, now).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn cancel_overdue_orders(&self, now: DateTime<Utc>) -> Result<Vec<OrderId>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM orders WHERE status = 'pending' \
             AND payment_method = 'bank_transfer' AND payment_deadline < $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut cancelled = Vec::with_capacity(ids.len());
        for id in ids {
            let order_id: OrderId = parse(&id)?;
            match self.auto_cancel(order_id, now).await? {
                Some((_, true)) => cancelled.push(order_id),
                _ => tracing::debug!(order_id = %order_id, "Order no longer overdue, skipped"),
            }
        }
        if !cancelled.is_empty() {
            tracing::info!(count = cancelled.len(), "Overdue orders auto-cancelled");
        }
        Ok(cancelled)
    }

    // =========================================================================
    // Game codes
    // =========================================================================

    async fn add_game_codes(&self, codes: &[GameCode]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for code in codes {
            sqlx::query(&format!(
                "INSERT INTO game_codes ({GAME_CODE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
            ))
            .bind(*code.id.as_uuid())
            .bind(&code.code)
            .bind(code.product_id.map(|p| *p.as_uuid()))
            .bind(code.edition_id.map(|e| *e.as_uuid()))
            .bind(code.order_id.map(|o| o.to_string()))
            .bind(code.is_used)
            .bind(code.assigned_at)
            .bind(code.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_game_codes(&self, filter: &GameCodeFilter) -> Result<Vec<GameCode>> {
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {GAME_CODE_COLUMNS} FROM game_codes WHERE TRUE"));
        if let Some(product_id) = filter.product_id {
            qb.push(" AND product_id = ").push_bind(*product_id.as_uuid());
        }
        if let Some(order_id) = filter.order_id {
            qb.push(" AND order_id = ").push_bind(order_id.to_string());
        }
        if filter.unused_only {
            qb.push(" AND NOT is_used");
        }
        qb.push(" ORDER BY created_at DESC, id LIMIT ")
            .push_bind(sql_int(filter.page_size()))
            .push(" OFFSET ")
            .push_bind(sql_int(filter.offset));

        qb.build_query_as::<GameCodeRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(GameCode::try_from)
            .collect()
    }

    async fn attach_game_codes(
        &self,
        order_id: &OrderId,
        codes: &[String],
        auto_fill: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<GameCode>> {
        let mut tx = self.pool.begin().await?;
        let mut order = load_order(&mut tx, *order_id, true)
            .await?
            .ok_or_else(|| StoreError::not_found("order", order_id))?;
        if order.is_overdue(now) {
            order = transition_in_tx(&mut tx, order.id, &Transition::AutoCancel, now).await?;
        }
        if order.status == OrderStatus::Cancelled {
            return Err(StoreError::Conflict(format!(
                "order {} is cancelled",
                order.order_number
            )));
        }

        for wanted in codes {
            let wanted = wanted.trim();
            let code: GameCode = sqlx::query_as::<_, GameCodeRow>(&format!(
                "SELECT {GAME_CODE_COLUMNS} FROM game_codes WHERE code = $1 FOR UPDATE"
            ))
            .bind(wanted)
            .fetch_optional(&mut *tx)
            .await?
            .map(GameCode::try_from)
            .transpose()?
            .ok_or_else(|| StoreError::not_found("game code", wanted))?;
            if code.order_id == Some(order.id) {
                continue;
            }
            if code.is_used {
                return Err(StoreError::Conflict(format!(
                    "game code {wanted} is already used"
                )));
            }
            sqlx::query(
                "UPDATE game_codes SET is_used = TRUE, order_id = $2, assigned_at = $3 \
                 WHERE id = $1",
            )
            .bind(*code.id.as_uuid())
            .bind(order.id.to_string())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        if auto_fill {
            assign_codes(&mut tx, &order, now).await?;
        }

        let attached = codes_for_order(&mut tx, order.id).await?;
        tx.commit().await?;
        Ok(attached)
    }

    // =========================================================================
    // Gift cards
    // =========================================================================

    async fn add_gift_cards(&self, cards: &[GiftCard]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for card in cards {
            sqlx::query(&format!(
                "INSERT INTO gift_cards ({GIFT_CARD_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
            ))
            .bind(*card.id.as_uuid())
            .bind(&card.code)
            .bind(card.value_cents)
            .bind(card.is_redeemed)
            .bind(card.redeemed_by.map(|u| *u.as_uuid()))
            .bind(card.redeemed_at)
            .bind(card.expires_at)
            .bind(card.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_gift_cards(&self, limit: usize, offset: usize) -> Result<Vec<GiftCard>> {
        Ok(sqlx::query_as::<_, GiftCardRow>(&format!(
            "SELECT {GIFT_CARD_COLUMNS} FROM gift_cards ORDER BY created_at DESC, id \
             LIMIT $1 OFFSET $2"
        ))
        .bind(sql_int(limit))
        .bind(sql_int(offset))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(GiftCard::from)
        .collect())
    }

    async fn redeem_gift_card(
        &self,
        code: &str,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Redemption> {
        let code = GiftCard::normalize_code(code);
        let mut tx = self.pool.begin().await?;

        let user = load_user(&mut tx, *user_id, true)
            .await?
            .ok_or_else(|| StoreError::not_found("user", user_id))?;
        if user.disabled {
            return Err(DomainError::AccountDisabled.into());
        }

        let mut gift_card: GiftCard = sqlx::query_as::<_, GiftCardRow>(&format!(
            "SELECT {GIFT_CARD_COLUMNS} FROM gift_cards WHERE code = $1 FOR UPDATE"
        ))
        .bind(&code)
        .fetch_optional(&mut *tx)
        .await?
        .map(GiftCard::from)
        .ok_or_else(|| StoreError::not_found("gift card", &code))?;

        let change = gift_card.redeem(*user_id, now)?;
        sqlx::query(
            "UPDATE gift_cards SET is_redeemed = TRUE, redeemed_by = $2, redeemed_at = $3 \
             WHERE id = $1",
        )
        .bind(*gift_card.id.as_uuid())
        .bind(*user_id.as_uuid())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let transaction = apply_wallet(&mut tx, *user_id, change, now).await?;
        tx.commit().await?;
        Ok(Redemption {
            gift_card,
            transaction,
        })
    }

    // =========================================================================
    // Health
    // =========================================================================

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
