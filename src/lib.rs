//! Bizlist - paid business directory listings
//!
//! This library provides plan checkout across two payment providers,
//! discount codes, plan upgrades, and the listing wizard that turns a paid
//! subscription into an active directory entry.

pub mod activation;
pub mod catalog;
pub mod config;
pub mod crypto;
pub mod db;
pub mod discount;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod id;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod util;
pub mod wizard;
