//! # Secret Volume Plugin
//!
//! A Docker volume plugin that exposes secrets from an external store as
//! files. Each volume maps to one secret; mounting it materializes the secret
//! under the secrets root and a background task keeps the file current.
//!
//! ## Backends
//!
//! - **Azure Key Vault** - OAuth2 client credentials, token cached until near expiry
//! - **HashiCorp Vault** - KV v2 engine with token auth
//! - **Passwordstate** - one password list, searched by title
//!
//! ## Layout
//!
//! - [`provider`] - backend clients behind the [`provider::SecretBackend`] trait
//! - [`volume`] - volume registry, snapshot and refresh scheduler
//! - [`driver`] - the volume lifecycle operations Docker calls
//! - [`server`] - plugin socket and metrics/probe HTTP servers
//! - [`runtime`] - process wiring used by the binary

pub mod config;
pub mod constants;
pub mod driver;
pub mod observability;
pub mod prelude;
pub mod provider;
pub mod runtime;
pub mod server;
pub mod volume;
