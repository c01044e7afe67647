pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod token;

#[cfg(test)]
pub mod testing;

pub use auth::*;
pub use error::{FederationError, FederationResult};
pub use token::*;
