//! Storefront Client SDK.
//!
//! This crate provides a typed client for the customer-facing storefront API:
//! catalog, checkout, guest order lookup, wallet and payment settings.
//!
//! # Example
//!
//! ```no_run
//! use storefront_client::{CheckoutRequest, StorefrontClient};
//! use storefront_core::{CheckoutItem, ContactInfo, PaymentMethod, ProductFilter};
//!
//! # async fn example() -> Result<(), storefront_client::ClientError> {
//! let client = StorefrontClient::new("http://storefront:8080")?;
//!
//! let products = client.list_products(&ProductFilter::default()).await?;
//! let placed = client
//!     .create_order(&CheckoutRequest {
//!         items: vec![CheckoutItem {
//!             product_id: products[0].id,
//!             edition_id: None,
//!             quantity: 1,
//!         }],
//!         contact: ContactInfo {
//!             name: "Ada".into(),
//!             email: "ada@example.com".into(),
//!             phone: "+1 555 0100".into(),
//!             address: None,
//!             notes: None,
//!         },
//!         payment_method: PaymentMethod::BankTransfer,
//!         promo_code: Some("WELCOME10".into()),
//!         wallet_amount_cents: 0,
//!     })
//!     .await?;
//!
//! println!("Order {} placed", placed.order_number);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, StorefrontClient};
pub use error::ClientError;
pub use types::*;
