//! # Quoteboard Common Library
//!
//! Shared code for the Quoteboard services including:
//! - Record and quote models (the quote is persisted inside the record)
//! - The quote grammar (title/body text to speaker lines)
//! - Input hashing used to detect edits
//! - Configuration loading

pub mod config;
pub mod error;
pub mod hash;
pub mod models;
pub mod parser;
pub mod time;

pub use error::{Error, Result};
pub use models::{Line, Quote, QuoteStatus, QuoteType, Record};
