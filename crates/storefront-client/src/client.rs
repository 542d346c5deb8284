//! Storefront HTTP client implementation.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

use storefront_core::{Order, PaymentSettings, Product, ProductFilter};

use crate::error::ClientError;
use crate::types::{
    ApiErrorResponse, CheckoutRequest, OrderList, OrderView, PlacedOrder, ProductList,
    PromoPreview, Redeemed, TransactionPage, VerifiedOrder, WalletBalance,
};

/// Storefront API client.
///
/// Public calls work without a token; wallet and order history calls need one
/// (see [`StorefrontClient::with_token`]).
#[derive(Debug, Clone)]
pub struct StorefrontClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl StorefrontClient {
    /// Create a new storefront client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the storefront service (e.g., `"http://storefront:8080"`)
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_options(base_url, ClientOptions::default())
    }

    /// Create a new storefront client with custom options.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .map_err(|e| ClientError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Act as the user identified by `token` (a bearer JWT).
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{path}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let token = self.token.as_ref().ok_or(ClientError::MissingToken)?;
        Ok(request.bearer_auth(token))
    }

    fn maybe_authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    /// List active products.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, ClientError> {
        let response = self
            .client
            .get(self.url("/products"))
            .query(filter)
            .send()
            .await?;

        let list: ProductList = handle_response(response).await?;
        Ok(list.products)
    }

    /// Get an active product.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` for unknown or inactive products.
    pub async fn get_product(&self, product_id: &str) -> Result<Product, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/products/{product_id}")))
            .send()
            .await?;

        handle_response(response).await
    }

    /// Preview the discount a promo code gives on `subtotal_cents`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Api` with code `invalid_promo_code` if it does not apply.
    pub async fn validate_promo_code(
        &self,
        code: &str,
        subtotal_cents: i64,
    ) -> Result<PromoPreview, ClientError> {
        let request = self
            .client
            .post(self.url("/promo-codes/validate"))
            .json(&json!({ "code": code, "subtotal_cents": subtotal_cents }));

        let response = self.maybe_authorized(request).send().await?;
        handle_response(response).await
    }

    /// Current payment settings (bank details, fees, enabled methods).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn payment_settings(&self) -> Result<PaymentSettings, ClientError> {
        let response = self.client.get(self.url("/settings/payment")).send().await?;
        handle_response(response).await
    }

    // ========================================================================
    // Orders
    // ========================================================================

    /// Place an order, as a guest or as the token's user.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InsufficientBalance` when the wallet cannot cover
    /// the requested amount.
    pub async fn create_order(&self, checkout: &CheckoutRequest) -> Result<PlacedOrder, ClientError> {
        let request = self.client.post(self.url("/orders")).json(checkout);
        let response = self.maybe_authorized(request).send().await?;

        let placed: PlacedOrder = handle_response(response).await?;
        tracing::debug!(order_number = %placed.order_number, "Order placed");
        Ok(placed)
    }

    /// Verify a guest order. Returns `None` when the details match no order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn verify_order(
        &self,
        order_number: &str,
        email: &str,
        phone: &str,
    ) -> Result<Option<VerifiedOrder>, ClientError> {
        let response = self
            .client
            .get(self.url("/orders/verify"))
            .query(&[
                ("order_number", order_number),
                ("email", email),
                ("phone", phone),
            ])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        handle_response(response).await.map(Some)
    }

    /// Read an order with its tracking token.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the token does not match.
    pub async fn track_order(&self, order_id: &str, token: &str) -> Result<OrderView, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/orders/track/{order_id}")))
            .query(&[("token", token)])
            .send()
            .await?;

        handle_response(response).await
    }

    /// The token user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::MissingToken` without a token.
    pub async fn my_orders(&self) -> Result<Vec<Order>, ClientError> {
        let request = self.authorized(self.client.get(self.url("/orders")))?;
        let list: OrderList = handle_response(request.send().await?).await?;
        Ok(list.orders)
    }

    /// One of the token user's orders.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::MissingToken` without a token.
    pub async fn get_order(&self, order_id: &str) -> Result<OrderView, ClientError> {
        let request =
            self.authorized(self.client.get(self.url(&format!("/orders/{order_id}"))))?;
        handle_response(request.send().await?).await
    }

    // ========================================================================
    // Wallet
    // ========================================================================

    /// The token user's wallet balance.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::MissingToken` without a token.
    pub async fn wallet(&self) -> Result<WalletBalance, ClientError> {
        let request = self.authorized(self.client.get(self.url("/wallet")))?;
        handle_response(request.send().await?).await
    }

    /// A page of the token user's wallet ledger.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::MissingToken` without a token.
    pub async fn wallet_transactions(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<TransactionPage, ClientError> {
        let request = self.authorized(
            self.client
                .get(self.url("/wallet/transactions"))
                .query(&[("limit", limit), ("offset", offset)]),
        )?;
        handle_response(request.send().await?).await
    }

    /// Redeem a gift card into the token user's wallet.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Api` with code `gift_card_redeemed` for used cards.
    pub async fn redeem_gift_card(&self, code: &str) -> Result<Redeemed, ClientError> {
        let request = self.authorized(
            self.client
                .post(self.url("/gift-cards/redeem"))
                .json(&json!({ "code": code })),
        )?;
        handle_response(request.send().await?).await
    }
}

/// Handle API response and convert errors.
async fn handle_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let status = response.status();

    if status.is_success() {
        return Ok(response.json().await?);
    }

    // Try to parse error response
    let error_body: Result<ApiErrorResponse, _> = response.json().await;

    match error_body {
        Ok(api_error) => {
            let body = api_error.error;
            let detail = |key: &str| {
                body.details
                    .as_ref()
                    .and_then(|d| d.get(key))
                    .and_then(serde_json::Value::as_i64)
                    .unwrap_or(0)
            };

            // Map specific error codes to typed errors
            match body.code.as_str() {
                "insufficient_balance" => Err(ClientError::InsufficientBalance {
                    balance: detail("balance"),
                    required: detail("required"),
                }),
                "not_found" => Err(ClientError::NotFound(body.message)),
                code => Err(ClientError::Api {
                    code: code.to_string(),
                    message: body.message,
                    status: status.as_u16(),
                }),
            }
        }
        Err(_) => Err(ClientError::Api {
            code: "unknown".to_string(),
            message: format!("HTTP {status}"),
            status: status.as_u16(),
        }),
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_trims_trailing_slash() {
        let client = StorefrontClient::new("http://localhost:8080/").unwrap();
        assert_eq!(client.base_url, "http://localhost:8080");
        assert_eq!(client.url("/wallet"), "http://localhost:8080/api/wallet");
    }

    #[tokio::test]
    async fn token_calls_fail_fast_without_token() {
        let client = StorefrontClient::new("http://localhost:8080").unwrap();
        let err = client.wallet().await.unwrap_err();
        assert!(matches!(err, ClientError::MissingToken));
    }
}
