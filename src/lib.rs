#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod error;
pub(crate) mod serde_helpers;
pub mod streaming;
pub mod types;
pub mod ws;

pub use error::Error;

pub type Result<T> = std::result::Result<T, Error>;
