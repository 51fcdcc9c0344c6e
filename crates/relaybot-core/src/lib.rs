//! Core domain + application logic for the relay bot.
//!
//! This crate is framework-agnostic. The messenger and the address-book storage
//! live behind ports (traits) implemented in adapter crates.

pub mod address_book;
pub mod config;
pub mod conversation;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod formatting;
pub mod history;
pub mod logging;
pub mod messaging;
pub mod pending;
pub mod rate_limit;
pub mod routing;

pub use errors::{Error, Result};
