//! Pluggable authentication strategies

use std::any::TypeId;

use crate::exchange::{Request, SessionStorage};

use super::result::AuthResult;

/// Reason reported for every credential failure
///
/// Missing header, wrong scheme, malformed token, unknown id and wrong secret
/// all map to this message so callers cannot tell which check failed.
pub const INVALID_TOKEN_REASON: &str = "no valid auth token present";

/// Reason reported when a valid token lacks a matching permission
pub const NO_ACCESS_REASON: &str = "no access to this resource";

/// An authentication strategy run by an [`AuthChain`](super::AuthChain)
///
/// Implementations inspect the request and call [`AuthResult::cancel`] to
/// reject it. They may leave values in `storage` for later stages such as
/// rate limiting.
pub trait AuthAdapter: Send + Sync + 'static {
    fn authenticate(&self, result: &mut AuthResult, request: &Request, storage: &mut SessionStorage);

    /// Short name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or("adapter")
    }

    /// Concrete type of the adapter, used to remove all adapters of a kind
    fn adapter_type_id(&self) -> TypeId {
        TypeId::of::<Self>()
    }
}

/// Cancel `result` with `reason`
///
/// Shared helper so every adapter logs failures the same way.
pub fn fail_auth(result: &mut AuthResult, request: &Request, reason: &str) {
    tracing::debug!(
        method = %request.method(),
        path = %request.url(),
        ip = %request.ip(),
        reason = reason,
        "Authentication failed"
    );
    result.cancel(reason);
}
