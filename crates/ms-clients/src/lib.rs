//! Client token authentication
//!
//! Resolves opaque bearer tokens to client identities. Tokens are 256-bit
//! uniform random hex, so a plain indexed lookup is sufficient; no
//! user-supplied partial match is possible.

mod toucher;

pub use toucher::LastSeenToucher;

use ms_store::Store;
use ms_types::{Client, GatewayError, GatewayResult};
use tracing::debug;

/// Who is making the request.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    /// A registered client; rate limits and client-specific resolution
    /// apply.
    Client(Box<Client>),
    /// An optional-auth route with no token: no rate limiting, global-only
    /// alias resolution.
    Anonymous,
}

impl AuthOutcome {
    pub fn client_id(&self) -> Option<&str> {
        match self {
            AuthOutcome::Client(c) => Some(&c.id),
            AuthOutcome::Anonymous => None,
        }
    }
}

/// Validates tokens and stamps last-seen out of band.
pub struct ClientAuthenticator {
    store: Store,
    toucher: LastSeenToucher,
}

impl ClientAuthenticator {
    pub fn new(store: Store, toucher: LastSeenToucher) -> Self {
        Self { store, toucher }
    }

    /// Resolve `token` to an identity.
    ///
    /// An empty token is allowed only on optional-auth routes and yields
    /// the anonymous identity. A successful lookup enqueues a last-seen
    /// touch that never blocks or fails the request.
    pub fn authenticate(&self, token: &str, optional_auth: bool) -> GatewayResult<AuthOutcome> {
        if token.is_empty() {
            if optional_auth {
                return Ok(AuthOutcome::Anonymous);
            }
            return Err(GatewayError::Unauthenticated);
        }

        let client = self
            .store
            .get_client_by_token(token)?
            .ok_or(GatewayError::Unauthenticated)?;

        debug!("Authenticated client {}", client.id);
        self.toucher.touch(&client.id);

        Ok(AuthOutcome::Client(Box::new(client)))
    }
}
