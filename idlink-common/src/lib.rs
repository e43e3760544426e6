//! # idlink Common Library
//!
//! Shared code for the idlink workspace:
//! - Contact model and link precedence
//! - Database initialization (contacts table and lookup indexes)
//! - Bootstrap configuration loading
//! - Common error type

pub mod config;
pub mod db;
pub mod error;

pub use db::models::{Contact, LinkPrecedence, NewContact};
pub use error::{Error, Result};
