// marketplace/src/lib.rs

//! Multi-seller checkout and payment settlement.
//!
//! A buyer's cart is split into one order per seller and charged through a
//! single gateway payment intent. The gateway's signed webhooks then settle
//! (or fail) every linked order exactly once: payment status, stock, seller
//! ledger and balances move together in one transaction, and receipts and
//! seller notifications follow as best-effort side effects.

pub mod config;
pub mod errors;
pub mod models;
pub mod pipelines;
pub mod services;
pub mod state;
pub mod store;
pub mod web;
