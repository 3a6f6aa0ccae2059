//! `tally-credentials`: OAuth token records for connected companies.
//!
//! Tokens are persisted per company (realm) and refreshed lazily: the
//! [`manager::CredentialManager`] checks expiry immediately before handing out
//! an access token and exchanges the refresh token when needed. There is no
//! background refresh timer.

pub mod db;
pub mod error;
pub mod manager;
pub mod memory;
pub mod oauth;
pub mod store;
pub mod types;

pub use db::SqliteTokenStore;
pub use error::{CredentialError, Result};
pub use manager::{AuthorizationRequest, CredentialManager};
pub use memory::MemoryTokenStore;
pub use oauth::{IntuitOAuthClient, OAuthClient};
pub use store::TokenStore;
pub use types::{CompanyStatus, ConnectedCompany, TokenGrant, TokenRecord};
