//! Payment settings handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use storefront_core::{
    Capability, PaymentSettings, DEFAULT_COD_FEE_CENTS, DEFAULT_PAYMENT_DEADLINE_DAYS,
};

use crate::auth::Staff;
use crate::error::ApiError;
use crate::state::AppState;

/// Payment settings update request.
#[derive(Debug, Deserialize)]
pub struct PaymentSettingsInput {
    /// Bank name shown on the confirmation page.
    #[serde(default)]
    pub bank_name: String,
    /// Account holder.
    #[serde(default)]
    pub account_holder: String,
    /// IBAN.
    #[serde(default)]
    pub iban: String,
    /// SWIFT/BIC.
    pub swift: Option<String>,
    /// Accept bank transfers.
    #[serde(default = "default_true")]
    pub bank_transfer_enabled: bool,
    /// Accept cash on delivery.
    #[serde(default = "default_true")]
    pub cod_enabled: bool,
    /// Cash on delivery fee in cents.
    #[serde(default = "default_cod_fee")]
    pub cod_fee_cents: i64,
    /// Accept wallet payments.
    #[serde(default = "default_true")]
    pub wallet_enabled: bool,
    /// Days a bank transfer may stay unpaid.
    #[serde(default = "default_deadline_days")]
    pub payment_deadline_days: u32,
}

fn default_true() -> bool {
    true
}

fn default_cod_fee() -> i64 {
    DEFAULT_COD_FEE_CENTS
}

fn default_deadline_days() -> u32 {
    DEFAULT_PAYMENT_DEADLINE_DAYS
}

/// Current payment settings. Public: the confirmation page shows bank details.
pub async fn get_payment_settings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PaymentSettings>, ApiError> {
    Ok(Json(state.store.get_payment_settings().await?))
}

/// Replace the payment settings.
pub async fn update_payment_settings(
    State(state): State<Arc<AppState>>,
    staff: Staff,
    Json(body): Json<PaymentSettingsInput>,
) -> Result<Json<PaymentSettings>, ApiError> {
    staff.require(Capability::ManageSettings)?;

    let settings = PaymentSettings {
        bank_name: body.bank_name.trim().to_string(),
        account_holder: body.account_holder.trim().to_string(),
        iban: body.iban.trim().to_string(),
        swift: body.swift,
        bank_transfer_enabled: body.bank_transfer_enabled,
        cod_enabled: body.cod_enabled,
        cod_fee_cents: body.cod_fee_cents,
        wallet_enabled: body.wallet_enabled,
        payment_deadline_days: body.payment_deadline_days,
        updated_at: Utc::now(),
    };
    settings.validate()?;
    state.store.put_payment_settings(&settings).await?;

    tracing::info!(
        actor = %staff.actor(),
        cod_fee_cents = settings.cod_fee_cents,
        payment_deadline_days = settings.payment_deadline_days,
        "Payment settings updated"
    );

    Ok(Json(settings))
}
