//! External collaborator ports (spec §6). `Clock`/`RandomId` live in
//! `atp-protocol`, `ObservationPort` in `atp-observability`, and
//! `AdapterPort`/`QualityPort` in `atp-dispatcher` — this module carries the
//! remaining three: Auth, Policy, and Secrets. All are trait objects
//! injected at construction time; the core never implements them, mirroring
//! how `dashflow-registry::api::server` takes its auth/rate-limit
//! collaborators as constructor arguments rather than owning them.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credentials")]
    MissingCredentials,
    #[error("credentials rejected")]
    Rejected,
}

/// Authenticates an inbound session handshake, producing a tenant identity.
#[async_trait]
pub trait AuthPort: Send + Sync {
    async fn authenticate(&self, credentials: &str) -> Result<AuthIdentity, AuthError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthIdentity {
    pub tenant_id: String,
    pub principal: String,
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("tenant {tenant_id} is not permitted to use adapter {adapter_id}")]
    AdapterNotAllowed { tenant_id: String, adapter_id: String },
    #[error("tenant {tenant_id} is not permitted to use data scope {data_scope}")]
    DataScopeNotAllowed { tenant_id: String, data_scope: String },
}

/// Authorizes a routed request against tenant policy (data scope, allowed
/// adapters) independently of the routing engine's own `TenantPolicy`
/// scoring weights — this port is the final admission gate, not a scorer.
#[async_trait]
pub trait PolicyPort: Send + Sync {
    async fn authorize(
        &self,
        tenant_id: &str,
        adapter_id: &str,
        data_scope: &str,
    ) -> Result<(), PolicyError>;
}

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("secret {0} not found")]
    NotFound(String),
    #[error("secrets backend unavailable")]
    Unavailable,
}

/// Resolves adapter credentials and signing keys at startup, kept out of
/// configuration files (spec §6 "Secrets: resolves credentials... never
/// logged or persisted to the Observation sink").
#[async_trait]
pub trait SecretsPort: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<String, SecretsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticAuth;

    #[async_trait]
    impl AuthPort for StaticAuth {
        async fn authenticate(&self, credentials: &str) -> Result<AuthIdentity, AuthError> {
            if credentials.is_empty() {
                return Err(AuthError::MissingCredentials);
            }
            Ok(AuthIdentity { tenant_id: "tenant-a".to_string(), principal: credentials.to_string() })
        }
    }

    #[tokio::test]
    async fn auth_port_rejects_empty_credentials() {
        let auth = StaticAuth;
        assert!(matches!(auth.authenticate("").await, Err(AuthError::MissingCredentials)));
        assert!(auth.authenticate("token").await.is_ok());
    }
}
