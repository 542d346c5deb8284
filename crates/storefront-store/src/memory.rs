//! In-memory storage implementation.
//!
//! All state lives behind one `tokio::sync::Mutex`. Every write operation
//! works on a staged copy of the state and only replaces the live state when
//! the whole operation succeeded, which gives the same all-or-nothing
//! behaviour as a database transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use storefront_core::checkout::{build_order, quote, QuoteContext, StockLine};
use storefront_core::lifecycle::{plan, Effect};
use storefront_core::{
    select_codes, Checkout, DomainError, GameCode, GameCodeFilter, GiftCard, Order, OrderFilter,
    OrderId, OrderStatus, PaymentSettings, Product, ProductFilter, ProductId, PromoCode,
    PromoCodeId, PromoCodeUsage, Redeemer, Transition, User, UserId, WalletChange,
    WalletTransaction,
};

use crate::error::{Result, StoreError};
use crate::{Redemption, Store, UserUpdate};

#[derive(Debug, Clone, Default)]
struct State {
    users: HashMap<UserId, User>,
    products: HashMap<ProductId, Product>,
    promo_codes: HashMap<PromoCodeId, PromoCode>,
    promo_usages: Vec<PromoCodeUsage>,
    settings: PaymentSettings,
    orders: HashMap<OrderId, Order>,
    game_codes: Vec<GameCode>,
    wallet: Vec<WalletTransaction>,
    gift_cards: Vec<GiftCard>,
}

impl State {
    fn apply_wallet(
        &mut self,
        user_id: UserId,
        change: WalletChange,
        now: DateTime<Utc>,
    ) -> Result<WalletTransaction> {
        let user = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::not_found("user", user_id))?;
        let transaction = change.apply(user_id, user.wallet_balance_cents, now)?;
        user.wallet_balance_cents = transaction.balance_after_cents;
        user.updated_at = now;
        self.wallet.push(transaction.clone());
        Ok(transaction)
    }

    fn promo_uses(&self, promo_id: PromoCodeId, redeemer: &Redeemer) -> u32 {
        let count = self
            .promo_usages
            .iter()
            .filter(|u| u.promo_code_id == promo_id && u.redeemer == *redeemer)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Take units from stock. With `check`, fail instead of going below zero
    /// for products that are not on pre-order.
    fn take_stock(&mut self, lines: &[StockLine], check: bool, now: DateTime<Utc>) -> Result<()> {
        for line in lines {
            let product = self
                .products
                .get_mut(&line.product_id)
                .ok_or_else(|| StoreError::not_found("product", line.product_id))?;
            let pre_order = product.flags.pre_order;
            let name = product.name.clone();
            product.updated_at = now;
            let stock = match line.edition_id {
                Some(edition_id) => {
                    &mut product
                        .edition_mut(&edition_id)
                        .ok_or_else(|| DomainError::EditionNotFound(edition_id.to_string()))?
                        .stock
                }
                None => &mut product.stock,
            };
            if check && !pre_order && *stock < line.quantity {
                return Err(DomainError::InsufficientStock {
                    product: name,
                    available: *stock,
                    requested: line.quantity,
                }
                .into());
            }
            *stock -= line.quantity;
        }
        Ok(())
    }

    fn release_stock(&mut self, lines: &[StockLine], now: DateTime<Utc>) {
        for line in lines {
            let Some(product) = self.products.get_mut(&line.product_id) else {
                tracing::warn!(product_id = %line.product_id, "Restock skipped, product missing");
                continue;
            };
            product.updated_at = now;
            match line.edition_id {
                Some(edition_id) => match product.edition_mut(&edition_id) {
                    Some(edition) => edition.stock += line.quantity,
                    None => {
                        tracing::warn!(%edition_id, "Restock skipped, edition missing");
                    }
                },
                None => product.stock += line.quantity,
            }
        }
    }

    fn assign_codes(&mut self, order: &Order, now: DateTime<Utc>) -> Result<()> {
        let attached: Vec<GameCode> = self
            .game_codes
            .iter()
            .filter(|c| c.order_id == Some(order.id))
            .cloned()
            .collect();
        let selected = select_codes(order, &attached, &self.game_codes)?;
        for code in &mut self.game_codes {
            if selected.contains(&code.id) {
                code.assign(order.id, now);
            }
        }
        Ok(())
    }

    fn transition(
        &mut self,
        order_id: OrderId,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let order = self
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("order", order_id))?;
        let Some(plan) = plan(&order, transition, &self.settings, now)? else {
            return Ok(order);
        };

        for effect in plan.effects {
            match effect {
                Effect::ReleaseStock(lines) => self.release_stock(&lines, now),
                Effect::ReserveStock(lines) => self.take_stock(&lines, true, now)?,
                Effect::Wallet { user_id, change } => {
                    self.apply_wallet(user_id, change, now)?;
                }
                Effect::AssignCodes => self.assign_codes(&plan.order, now)?,
            }
        }

        tracing::info!(
            order_id = %order_id,
            from = %order.status,
            to = %plan.order.status,
            "Order status changed"
        );
        self.orders.insert(order_id, plan.order.clone());
        Ok(plan.order)
    }

    /// Auto-cancel the order if it is overdue and return its current state.
    fn settle(&mut self, order_id: OrderId, now: DateTime<Utc>) -> Result<Option<Order>> {
        let Some(order) = self.orders.get(&order_id) else {
            return Ok(None);
        };
        if order.is_overdue(now) {
            return self
                .transition(order_id, &Transition::AutoCancel, now)
                .map(Some);
        }
        Ok(Some(order.clone()))
    }

    fn cancel_overdue(&mut self, now: DateTime<Utc>) -> Result<Vec<OrderId>> {
        let overdue: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| o.is_overdue(now))
            .map(|o| o.id)
            .collect();
        for order_id in &overdue {
            self.transition(*order_id, &Transition::AutoCancel, now)?;
        }
        Ok(overdue)
    }

    fn place_order(&mut self, checkout: &Checkout, now: DateTime<Utc>) -> Result<Order> {
        checkout.validate()?;

        let wallet_balance_cents = match checkout.user_id {
            Some(user_id) => {
                let user = self
                    .users
                    .get(&user_id)
                    .ok_or_else(|| StoreError::not_found("user", user_id))?;
                if user.disabled {
                    return Err(DomainError::AccountDisabled.into());
                }
                user.wallet_balance_cents
            }
            None => 0,
        };

        let products: HashMap<ProductId, Product> = checkout
            .items
            .iter()
            .filter_map(|i| self.products.get(&i.product_id))
            .map(|p| (p.id, p.clone()))
            .collect();

        let redeemer = Redeemer::for_checkout(checkout.user_id, &checkout.contact.email);
        let promo = checkout.normalized_promo_code().and_then(|code| {
            self.promo_codes
                .values()
                .find(|p| p.code == code)
                .cloned()
        });
        let promo_uses = promo
            .as_ref()
            .map_or(0, |p| self.promo_uses(p.id, &redeemer));

        let settings = self.settings.clone();
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

        self.take_stock(&stock, false, now)?;

        if let Some(promo) = promo {
            if let Some(stored) = self.promo_codes.get_mut(&promo.id) {
                stored.used_count += 1;
                stored.updated_at = now;
            }
            self.promo_usages.push(PromoCodeUsage {
                promo_code_id: promo.id,
                redeemer,
                order_id: order.id,
                discount_cents: order.promo_discount_cents,
                used_at: now,
            });
        }

        if let (Some(user_id), true) = (order.user_id, wallet_debit_cents > 0) {
            self.apply_wallet(
                user_id,
                WalletChange::payment(order.id, &order.order_number, wallet_debit_cents),
                now,
            )?;
        }

        self.orders.insert(order.id, order.clone());
        Ok(order)
    }
}

fn page<T>(items: impl IntoIterator<Item = T>, limit: usize, offset: usize) -> Vec<T> {
    items.into_iter().skip(offset).take(limit).collect()
}

/// In-memory storage implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create an empty store with default payment settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn read<T>(&self, op: impl FnOnce(&State) -> T + Send) -> T {
        let state = self.state.lock().await;
        op(&state)
    }

    /// Run `op` against a staged copy; commit only if it succeeds.
    async fn write<T>(&self, op: impl FnOnce(&mut State) -> Result<T> + Send) -> Result<T> {
        let mut state = self.state.lock().await;
        let mut staged = state.clone();
        let value = op(&mut staged)?;
        *state = staged;
        Ok(value)
    }
}

#[async_trait]
impl Store for MemoryStore {
    // =========================================================================
    // Users
    // =========================================================================

    async fn register_user(&self, user: &User) -> Result<User> {
        self.write(|s| Ok(s.users.entry(user.id).or_insert_with(|| user.clone()).clone()))
            .await
    }

    async fn get_user(&self, user_id: &UserId) -> Result<Option<User>> {
        Ok(self.read(|s| s.users.get(user_id).cloned()).await)
    }

    async fn list_users(&self, limit: usize, offset: usize) -> Result<Vec<User>> {
        Ok(self
            .read(|s| {
                let mut users: Vec<User> = s.users.values().cloned().collect();
                users.sort_by_key(|u| u.created_at);
                page(users, limit, offset)
            })
            .await)
    }

    async fn update_user(
        &self,
        user_id: &UserId,
        update: &UserUpdate,
        now: DateTime<Utc>,
    ) -> Result<User> {
        self.write(|s| {
            let user = s
                .users
                .get_mut(user_id)
                .ok_or_else(|| StoreError::not_found("user", user_id))?;
            update.apply(user, now);
            Ok(user.clone())
        })
        .await
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
        self.write(|s| s.apply_wallet(*user_id, change, now)).await
    }

    async fn list_wallet_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WalletTransaction>> {
        Ok(self
            .read(|s| {
                page(
                    s.wallet.iter().rev().filter(|t| t.user_id == *user_id).cloned(),
                    limit,
                    offset,
                )
            })
            .await)
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    async fn put_product(&self, product: &Product) -> Result<()> {
        self.write(|s| {
            s.products.insert(product.id, product.clone());
            Ok(())
        })
        .await
    }

    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        Ok(self.read(|s| s.products.get(product_id).cloned()).await)
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        Ok(self
            .read(|s| filter.apply(s.products.values().cloned()))
            .await)
    }

    // =========================================================================
    // Promo codes
    // =========================================================================

    async fn put_promo_code(&self, promo: &PromoCode) -> Result<()> {
        self.write(|s| {
            if s
                .promo_codes
                .values()
                .any(|p| p.code == promo.code && p.id != promo.id)
            {
                return Err(StoreError::Conflict(format!(
                    "promo code {} already exists",
                    promo.code
                )));
            }
            let mut promo = promo.clone();
            if let Some(existing) = s.promo_codes.get(&promo.id) {
                promo.used_count = existing.used_count;
            }
            s.promo_codes.insert(promo.id, promo);
            Ok(())
        })
        .await
    }

    async fn get_promo_code(&self, promo_id: &PromoCodeId) -> Result<Option<PromoCode>> {
        Ok(self.read(|s| s.promo_codes.get(promo_id).cloned()).await)
    }

    async fn find_promo_code(&self, code: &str) -> Result<Option<PromoCode>> {
        Ok(self
            .read(|s| s.promo_codes.values().find(|p| p.code == code).cloned())
            .await)
    }

    async fn list_promo_codes(&self) -> Result<Vec<PromoCode>> {
        Ok(self
            .read(|s| {
                let mut promos: Vec<PromoCode> = s.promo_codes.values().cloned().collect();
                promos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                promos
            })
            .await)
    }

    async fn count_promo_usages(
        &self,
        promo_id: &PromoCodeId,
        redeemer: &Redeemer,
    ) -> Result<u32> {
        Ok(self.read(|s| s.promo_uses(*promo_id, redeemer)).await)
    }

    // =========================================================================
    // Payment settings
    // =========================================================================

    async fn get_payment_settings(&self) -> Result<PaymentSettings> {
        Ok(self.read(|s| s.settings.clone()).await)
    }

    async fn put_payment_settings(&self, settings: &PaymentSettings) -> Result<()> {
        self.write(|s| {
            s.settings = settings.clone();
            Ok(())
        })
        .await
    }

    // =========================================================================
    // Orders
    // =========================================================================

    async fn place_order(&self, checkout: &Checkout, now: DateTime<Utc>) -> Result<Order> {
        self.write(|s| s.place_order(checkout, now)).await
    }

    async fn get_order(&self, order_id: &OrderId, now: DateTime<Utc>) -> Result<Option<Order>> {
        self.write(|s| s.settle(*order_id, now)).await
    }

    async fn get_order_by_number(
        &self,
        order_number: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>> {
        self.write(|s| {
            let found = s
                .orders
                .values()
                .find(|o| o.order_number.eq_ignore_ascii_case(order_number))
                .map(|o| o.id);
            match found {
                Some(order_id) => s.settle(order_id, now),
                None => Ok(None),
            }
        })
        .await
    }

    async fn list_orders(&self, filter: &OrderFilter, now: DateTime<Utc>) -> Result<Vec<Order>> {
        self.write(|s| {
            s.cancel_overdue(now)?;
            let mut orders: Vec<Order> = s
                .orders
                .values()
                .filter(|o| filter.matches(o))
                .cloned()
                .collect();
            orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(page(orders, filter.page_size(), filter.offset))
        })
        .await
    }

    async fn transition_order(
        &self,
        order_id: &OrderId,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        self.write(|s| s.transition(*order_id, transition, now)).await
    }

    async fn cancel_overdue_orders(&self, now: DateTime<Utc>) -> Result<Vec<OrderId>> {
        self.write(|s| s.cancel_overdue(now)).await
    }

    // =========================================================================
    // Game codes
    // =========================================================================

    async fn add_game_codes(&self, codes: &[GameCode]) -> Result<()> {
        self.write(|s| {
            for code in codes {
                if s.game_codes.iter().any(|c| c.code == code.code) {
                    return Err(StoreError::Conflict(format!(
                        "game code {} already exists",
                        code.code
                    )));
                }
                s.game_codes.push(code.clone());
            }
            Ok(())
        })
        .await
    }

    async fn list_game_codes(&self, filter: &GameCodeFilter) -> Result<Vec<GameCode>> {
        Ok(self
            .read(|s| {
                page(
                    s.game_codes.iter().rev().filter(|c| filter.matches(c)).cloned(),
                    filter.page_size(),
                    filter.offset,
                )
            })
            .await)
    }

    async fn attach_game_codes(
        &self,
        order_id: &OrderId,
        codes: &[String],
        auto_fill: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<GameCode>> {
        self.write(|s| {
            let order = s
                .settle(*order_id, now)?
                .ok_or_else(|| StoreError::not_found("order", order_id))?;
            if order.status == OrderStatus::Cancelled {
                return Err(StoreError::Conflict(format!(
                    "order {} is cancelled",
                    order.order_number
                )));
            }

            for wanted in codes {
                let wanted = wanted.trim();
                let code = s
                    .game_codes
                    .iter_mut()
                    .find(|c| c.code == wanted)
                    .ok_or_else(|| StoreError::not_found("game code", wanted))?;
                if code.order_id == Some(order.id) {
                    continue;
                }
                if code.is_used {
                    return Err(StoreError::Conflict(format!(
                        "game code {wanted} is already used"
                    )));
                }
                code.assign(order.id, now);
            }

            if auto_fill {
                s.assign_codes(&order, now)?;
            }

            Ok(s.game_codes
                .iter()
                .filter(|c| c.order_id == Some(order.id))
                .cloned()
                .collect())
        })
        .await
    }

    // =========================================================================
    // Gift cards
    // =========================================================================

    async fn add_gift_cards(&self, cards: &[GiftCard]) -> Result<()> {
        self.write(|s| {
            for card in cards {
                if s.gift_cards.iter().any(|c| c.code == card.code) {
                    return Err(StoreError::Conflict(format!(
                        "gift card {} already exists",
                        card.code
                    )));
                }
                s.gift_cards.push(card.clone());
            }
            Ok(())
        })
        .await
    }

    async fn list_gift_cards(&self, limit: usize, offset: usize) -> Result<Vec<GiftCard>> {
        Ok(self
            .read(|s| page(s.gift_cards.iter().rev().cloned(), limit, offset))
            .await)
    }

    async fn redeem_gift_card(
        &self,
        code: &str,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Redemption> {
        let code = GiftCard::normalize_code(code);
        self.write(|s| {
            let user = s
                .users
                .get(user_id)
                .ok_or_else(|| StoreError::not_found("user", user_id))?;
            if user.disabled {
                return Err(DomainError::AccountDisabled.into());
            }
            let card = s
                .gift_cards
                .iter_mut()
                .find(|c| c.code == code)
                .ok_or_else(|| StoreError::not_found("gift card", &code))?;
            let change = card.redeem(*user_id, now)?;
            let gift_card = card.clone();
            let transaction = s.apply_wallet(*user_id, change, now)?;
            Ok(Redemption {
                gift_card,
                transaction,
            })
        })
        .await
    }

    // =========================================================================
    // Health
    // =========================================================================

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use storefront_core::{
        CheckoutItem, ContactInfo, Discount, PaymentMethod, PaymentStatus, ProductFlags,
        ProductKind, WalletTransactionKind,
    };

    fn product(name: &str, price_cents: i64, stock: i64) -> Product {
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

    fn welcome10(max_uses: Option<u32>) -> PromoCode {
        let now = Utc::now();
        PromoCode {
            id: PromoCodeId::generate(),
            code: "WELCOME10".into(),
            description: "10% off".into(),
            discount: Discount::Percentage {
                percent: 10,
                max_discount_cents: None,
            },
            min_order_cents: 2000,
            max_uses,
            max_uses_per_user: Some(1),
            used_count: 0,
            starts_at: None,
            expires_at: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn checkout(
        user_id: Option<UserId>,
        product: &Product,
        method: PaymentMethod,
        email: &str,
    ) -> Checkout {
        Checkout {
            user_id,
            items: vec![CheckoutItem {
                product_id: product.id,
                edition_id: None,
                quantity: 1,
            }],
            contact: ContactInfo {
                name: "Buyer".into(),
                email: email.into(),
                phone: "+1 555 0100".into(),
                address: None,
                notes: None,
            },
            payment_method: method,
            promo_code: None,
            wallet_amount_cents: 0,
        }
    }

    async fn user_with_balance(store: &MemoryStore, balance: i64) -> UserId {
        let id = UserId::generate();
        store
            .register_user(&User::new(id, "buyer@example.com".into(), "Buyer".into(), Utc::now()))
            .await
            .unwrap();
        if balance > 0 {
            store
                .adjust_wallet(&id, WalletChange::adjustment(balance, "seed".into()).unwrap(), Utc::now())
                .await
                .unwrap();
        }
        id
    }

    #[tokio::test]
    async fn place_order_decrements_stock_and_records_promo() {
        let store = MemoryStore::new();
        let game = product("Game", 5000, 3);
        store.put_product(&game).await.unwrap();
        let promo = welcome10(Some(100));
        store.put_promo_code(&promo).await.unwrap();

        let mut request = checkout(None, &game, PaymentMethod::BankTransfer, "guest@example.com");
        request.promo_code = Some("welcome10".into());
        let order = store.place_order(&request, Utc::now()).await.unwrap();

        assert_eq!(order.total_amount_cents, 4500);
        assert_eq!(order.promo_discount_cents, 500);
        assert_eq!(store.get_product(&game.id).await.unwrap().unwrap().stock, 2);
        assert_eq!(
            store.get_promo_code(&promo.id).await.unwrap().unwrap().used_count,
            1
        );

        let again = store.place_order(&request, Utc::now()).await;
        assert!(matches!(
            again,
            Err(StoreError::Domain(DomainError::PromoPerUserLimit))
        ));
        assert_eq!(store.get_product(&game.id).await.unwrap().unwrap().stock, 2);
    }

    #[tokio::test]
    async fn wallet_checkout_debits_once_and_rejects_overspend() {
        let store = MemoryStore::new();
        let game = product("Game", 3000, 10);
        store.put_product(&game).await.unwrap();
        let user_id = user_with_balance(&store, 5000).await;

        let request = checkout(Some(user_id), &game, PaymentMethod::Wallet, "buyer@example.com");
        let order = store.place_order(&request, Utc::now()).await.unwrap();
        assert_eq!(order.status, OrderStatus::Paid);

        let user = store.get_user(&user_id).await.unwrap().unwrap();
        assert_eq!(user.wallet_balance_cents, 2000);

        let rejected = store.place_order(&request, Utc::now()).await;
        assert!(matches!(
            rejected,
            Err(StoreError::Domain(DomainError::InsufficientWallet { .. }))
        ));

        let ledger = store
            .list_wallet_transactions(&user_id, 10, 0)
            .await
            .unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger[0].kind, WalletTransactionKind::Payment);
        assert_eq!(ledger[0].amount_cents, -3000);
        assert_eq!(ledger[0].balance_after_cents, 2000);
        assert_eq!(store.get_product(&game.id).await.unwrap().unwrap().stock, 9);
    }

    #[tokio::test]
    async fn concurrent_checkouts_cannot_overspend() {
        let store = Arc::new(MemoryStore::new());
        let game = product("Game", 1000, 100);
        store.put_product(&game).await.unwrap();
        let user_id = user_with_balance(&store, 3000).await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = Arc::clone(&store);
            let request =
                checkout(Some(user_id), &game, PaymentMethod::Wallet, "buyer@example.com");
            handles.push(tokio::spawn(async move {
                store.place_order(&request, Utc::now()).await
            }));
        }
        let mut placed = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                placed += 1;
            }
        }

        assert_eq!(placed, 3);
        let user = store.get_user(&user_id).await.unwrap().unwrap();
        assert_eq!(user.wallet_balance_cents, 0);
    }

    #[tokio::test]
    async fn promo_global_cap_holds() {
        let store = MemoryStore::new();
        let game = product("Game", 5000, 10);
        store.put_product(&game).await.unwrap();
        store.put_promo_code(&welcome10(Some(2))).await.unwrap();

        let mut results = Vec::new();
        for i in 0..3 {
            let mut request = checkout(
                None,
                &game,
                PaymentMethod::BankTransfer,
                &format!("guest{i}@example.com"),
            );
            request.promo_code = Some("WELCOME10".into());
            results.push(store.place_order(&request, Utc::now()).await.is_ok());
        }
        assert_eq!(results, vec![true, true, false]);
    }

    #[tokio::test]
    async fn overdue_order_is_cancelled_on_read() {
        let store = MemoryStore::new();
        let game = product("Game", 5000, 1);
        store.put_product(&game).await.unwrap();

        let created = Utc::now();
        let request = checkout(None, &game, PaymentMethod::BankTransfer, "guest@example.com");
        let order = store.place_order(&request, created).await.unwrap();
        assert_eq!(store.get_product(&game.id).await.unwrap().unwrap().stock, 0);

        let later = created + Duration::days(5) + Duration::seconds(1);
        let read = store.get_order(&order.id, later).await.unwrap().unwrap();
        assert_eq!(read.status, OrderStatus::Cancelled);
        assert!(read.cancelled_reason.is_some_and(|r| !r.is_empty()));
        assert_eq!(store.get_product(&game.id).await.unwrap().unwrap().stock, 1);
    }

    #[tokio::test]
    async fn delivery_assigns_codes_and_credits_cashback_once() {
        let store = MemoryStore::new();
        let game = product("Game", 5000, 10);
        store.put_product(&game).await.unwrap();
        let user_id = user_with_balance(&store, 0).await;
        let now = Utc::now();
        store
            .add_game_codes(&[GameCode::new("AAAA-BBBB", Some(game.id), None, now).unwrap()])
            .await
            .unwrap();

        let request = checkout(
            Some(user_id),
            &game,
            PaymentMethod::BankTransfer,
            "buyer@example.com",
        );
        let order = store.place_order(&request, now).await.unwrap();

        store
            .transition_order(&order.id, &Transition::MarkPaid, now)
            .await
            .unwrap();
        let delivered = store
            .transition_order(&order.id, &Transition::Deliver, now)
            .await
            .unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);
        assert_eq!(delivered.payment_status, PaymentStatus::Paid);

        store
            .transition_order(&order.id, &Transition::Deliver, now)
            .await
            .unwrap();

        let user = store.get_user(&user_id).await.unwrap().unwrap();
        assert_eq!(user.wallet_balance_cents, 150);

        let codes = store
            .list_game_codes(&GameCodeFilter {
                order_id: Some(order.id),
                ..GameCodeFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(codes.len(), 1);
        assert!(codes[0].is_used);
    }

    #[tokio::test]
    async fn failed_delivery_leaves_order_untouched() {
        let store = MemoryStore::new();
        let game = product("Game", 5000, 10);
        store.put_product(&game).await.unwrap();
        let now = Utc::now();
        let order = store
            .place_order(
                &checkout(None, &game, PaymentMethod::CashOnDelivery, "guest@example.com"),
                now,
            )
            .await
            .unwrap();

        let result = store
            .transition_order(&order.id, &Transition::Deliver, now)
            .await;
        assert!(matches!(
            result,
            Err(StoreError::Domain(DomainError::MissingGameCodes { .. }))
        ));
        let read = store.get_order(&order.id, now).await.unwrap().unwrap();
        assert_eq!(read.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn cancel_refunds_wallet_part() {
        let store = MemoryStore::new();
        let game = product("Game", 5000, 10);
        store.put_product(&game).await.unwrap();
        let user_id = user_with_balance(&store, 2000).await;
        let now = Utc::now();

        let mut request = checkout(
            Some(user_id),
            &game,
            PaymentMethod::BankTransfer,
            "buyer@example.com",
        );
        request.wallet_amount_cents = 2000;
        let order = store.place_order(&request, now).await.unwrap();
        assert_eq!(order.total_amount_cents, 3000);
        assert_eq!(
            store.get_user(&user_id).await.unwrap().unwrap().wallet_balance_cents,
            0
        );

        store
            .transition_order(
                &order.id,
                &Transition::Cancel {
                    reason: "customer request".into(),
                },
                now,
            )
            .await
            .unwrap();
        assert_eq!(
            store.get_user(&user_id).await.unwrap().unwrap().wallet_balance_cents,
            2000
        );
    }

    #[tokio::test]
    async fn restore_reserves_stock_and_debits_wallet_again() {
        let store = MemoryStore::new();
        let game = product("Game", 3000, 2);
        store.put_product(&game).await.unwrap();
        let user_id = user_with_balance(&store, 5000).await;
        let now = Utc::now();

        let request = checkout(Some(user_id), &game, PaymentMethod::Wallet, "buyer@example.com");
        let order = store.place_order(&request, now).await.unwrap();
        store
            .transition_order(
                &order.id,
                &Transition::Cancel {
                    reason: "duplicate order".into(),
                },
                now,
            )
            .await
            .unwrap();
        assert_eq!(store.get_product(&game.id).await.unwrap().unwrap().stock, 2);
        assert_eq!(
            store.get_user(&user_id).await.unwrap().unwrap().wallet_balance_cents,
            5000
        );

        let restored = store
            .transition_order(&order.id, &Transition::Restore, now)
            .await
            .unwrap();
        assert_eq!(restored.status, OrderStatus::Pending);
        assert_eq!(restored.payment_status, PaymentStatus::Paid);
        assert_eq!(restored.cancelled_reason, None);
        assert_eq!(store.get_product(&game.id).await.unwrap().unwrap().stock, 1);
        assert_eq!(
            store.get_user(&user_id).await.unwrap().unwrap().wallet_balance_cents,
            2000
        );

        let ledger = store
            .list_wallet_transactions(&user_id, 10, 0)
            .await
            .unwrap();
        assert_eq!(ledger[0].kind, WalletTransactionKind::Payment);
        assert_eq!(ledger[0].amount_cents, -3000);
        assert_eq!(ledger[0].balance_after_cents, 2000);
    }

    #[tokio::test]
    async fn restore_without_funds_leaves_order_cancelled() {
        let store = MemoryStore::new();
        let game = product("Game", 3000, 2);
        store.put_product(&game).await.unwrap();
        let user_id = user_with_balance(&store, 3000).await;
        let now = Utc::now();

        let request = checkout(Some(user_id), &game, PaymentMethod::Wallet, "buyer@example.com");
        let order = store.place_order(&request, now).await.unwrap();
        store
            .transition_order(
                &order.id,
                &Transition::Cancel {
                    reason: "duplicate order".into(),
                },
                now,
            )
            .await
            .unwrap();
        store
            .adjust_wallet(
                &user_id,
                WalletChange::adjustment(-3000, "spent elsewhere".into()).unwrap(),
                now,
            )
            .await
            .unwrap();

        let result = store
            .transition_order(&order.id, &Transition::Restore, now)
            .await;
        assert!(matches!(
            result,
            Err(StoreError::Domain(DomainError::InsufficientWallet {
                balance: 0,
                required: 3000
            }))
        ));

        let read = store.get_order(&order.id, now).await.unwrap().unwrap();
        assert_eq!(read.status, OrderStatus::Cancelled);
        assert_eq!(store.get_product(&game.id).await.unwrap().unwrap().stock, 2);
        assert_eq!(
            store.get_user(&user_id).await.unwrap().unwrap().wallet_balance_cents,
            0
        );
    }

    #[tokio::test]
    async fn listing_orders_cancels_overdue_bank_transfers() {
        let store = MemoryStore::new();
        let game = product("Game", 5000, 2);
        store.put_product(&game).await.unwrap();
        let created = Utc::now();

        for email in ["first@example.com", "second@example.com"] {
            store
                .place_order(
                    &checkout(None, &game, PaymentMethod::BankTransfer, email),
                    created,
                )
                .await
                .unwrap();
        }
        assert_eq!(store.get_product(&game.id).await.unwrap().unwrap().stock, 0);

        let later = created + Duration::days(5) + Duration::seconds(1);
        let orders = store
            .list_orders(&OrderFilter::default(), later)
            .await
            .unwrap();
        assert_eq!(orders.len(), 2);
        assert!(orders.iter().all(|o| o.status == OrderStatus::Cancelled
            && o.cancelled_reason.as_deref().is_some_and(|r| !r.is_empty())));
        assert_eq!(store.get_product(&game.id).await.unwrap().unwrap().stock, 2);
        assert!(store.cancel_overdue_orders(later).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn gift_card_redeems_once() {
        let store = MemoryStore::new();
        let user_id = user_with_balance(&store, 0).await;
        let card = GiftCard::issue(2500, None, Utc::now()).unwrap();
        store.add_gift_cards(&[card.clone()]).await.unwrap();

        let redemption = store
            .redeem_gift_card(&card.code.to_lowercase(), &user_id, Utc::now())
            .await
            .unwrap();
        assert_eq!(redemption.transaction.balance_after_cents, 2500);

        let again = store
            .redeem_gift_card(&card.code, &user_id, Utc::now())
            .await;
        assert!(matches!(
            again,
            Err(StoreError::Domain(DomainError::GiftCardRedeemed))
        ));
    }

    #[tokio::test]
    async fn duplicate_promo_code_conflicts() {
        let store = MemoryStore::new();
        store.put_promo_code(&welcome10(None)).await.unwrap();
        let result = store.put_promo_code(&welcome10(None)).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }
}
