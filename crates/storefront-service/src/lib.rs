//! Storefront HTTP API service.
//!
//! This crate provides the HTTP API for the storefront, including:
//!
//! - Catalog browsing and checkout (signed-in or guest)
//! - Guest order verification and signed tracking links
//! - Wallet balance, ledger and gift card redemption
//! - The staff back-office: orders, catalog, promotions, users, settings
//!
//! # Authentication
//!
//! The service supports two authentication methods:
//!
//! 1. **JWT bearer tokens** - for customers and staff; staff rights come from
//!    the role on the stored profile
//! 2. **Admin API key** - the `X-Admin-Key` header, for bootstrapping the
//!    first administrator

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)]

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
