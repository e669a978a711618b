//! # Azure Providers
//!
//! - `token`: OAuth2 client-credentials bearer tokens with expiry-aware reuse
//! - `key_vault`: Azure Key Vault secrets REST client

pub mod key_vault;
pub mod token;

// Re-export for convenience
pub use key_vault::AzureKeyVault;
pub use token::{AccessToken, TokenManager};
