//! MilkMaster Storefront client library.
//!
//! Headless cart and checkout state for the MilkMaster dairy storefront.
//! The library owns the per-identity shopping cart (durably persisted
//! through a storage port) and the three-step checkout wizard that drives
//! profile prefill, stock validation, the mocked card/OTP verification
//! flow, and order submission.
//!
//! # Architecture
//!
//! - [`storage`] - injected key-value port; the only durable state surface
//! - [`identity`] - resolves the current purchaser from cached profile or
//!   bearer-token claims
//! - [`cart`] - stock-aware, identity-partitioned cart store
//! - [`checkout`] - the Address → Summary → Payment wizard state machine
//! - [`api`] - REST client for the order/stock/verification endpoints
//! - [`services`] - transactional mail relay for OTP delivery
//!
//! Rendering, routing, and authentication are external collaborators: the
//! library never draws UI and never issues tokens.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod services;
pub mod storage;
