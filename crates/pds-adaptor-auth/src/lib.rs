//! Authentication for the PDS adaptor.
//!
//! Two directions are covered:
//!
//! - **Outbound**: [`signer::AssertionSigner`] builds RS512 client assertions and
//!   [`store::AccessTokenStore`] exchanges them for bearer tokens at the OAuth
//!   token endpoint, holding the latest one in memory.
//! - **Inbound**: [`basic_auth::ApiKeyCaller`] authenticates callers of the
//!   adaptor API with HTTP Basic Auth against configured API keys.

pub mod basic_auth;
pub mod error;
pub mod signer;
pub mod store;

pub use basic_auth::{ApiKeyAuthState, ApiKeyCaller};
pub use error::{AuthError, ErrorCategory};
pub use signer::{AssertionClaims, AssertionSigner, SignerSettings};
pub use store::{AccessTokenStore, AccessTokenStoreConfig, TokenSource};

/// Result type for token acquisition.
pub type AuthResult<T> = Result<T, AuthError>;
