pub mod api;
pub mod config;
pub mod error;
pub mod oauth;
pub mod push;
pub mod token;

pub use error::{Error, Result};
