use crate::transaction::Wei;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{info, warn};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("builder {0} is not registered")]
    UnknownBuilder(String),
    #[error("builder {0} is already registered")]
    AlreadyRegistered(String),
    #[error("access restricted for builder {0}")]
    AccessRestricted(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct BuilderStatus {
    pub access: bool,
    pub pending_payment: Wei,
}

/// Builder registry and access-control collaborator.
///
/// The core only reads the registration/access predicates and credits
/// payments due after settlement; `revoke` is the enforcement hook the
/// relay may trigger, with the actual enforcement policy left to the
/// operator.
#[async_trait]
pub trait AccessControl: Send + Sync {
    async fn register(&self, pubkey: &str) -> Result<(), AccessError>;
    async fn is_registered(&self, pubkey: &str) -> bool;
    async fn has_access(&self, pubkey: &str) -> bool;
    async fn status(&self, pubkey: &str) -> Result<BuilderStatus, AccessError>;
    /// Add a settled payment to the builder's balance due.
    async fn credit_payment(&self, pubkey: &str, amount: Wei);
    /// Cut off bidding and pool access for a builder.
    async fn revoke(&self, pubkey: &str);

    /// Registered and in good standing, or the matching error.
    async fn require_access(&self, pubkey: &str) -> Result<(), AccessError> {
        if !self.is_registered(pubkey).await {
            return Err(AccessError::UnknownBuilder(pubkey.to_string()));
        }
        if !self.has_access(pubkey).await {
            return Err(AccessError::AccessRestricted(pubkey.to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct BuilderRecord {
    access: bool,
    pending_payment: Wei,
}

/// In-process registry. A production deployment would back this with the
/// relay operator's builder directory; the trait is the seam.
pub struct InMemoryRegistry {
    builders: RwLock<HashMap<String, BuilderRecord>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self {
            builders: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccessControl for InMemoryRegistry {
    async fn register(&self, pubkey: &str) -> Result<(), AccessError> {
        let mut builders = self.builders.write().unwrap();
        if builders.contains_key(pubkey) {
            return Err(AccessError::AlreadyRegistered(pubkey.to_string()));
        }
        info!("Registered builder {}", pubkey);
        builders.insert(
            pubkey.to_string(),
            BuilderRecord {
                access: true,
                pending_payment: 0,
            },
        );
        Ok(())
    }

    async fn is_registered(&self, pubkey: &str) -> bool {
        self.builders.read().unwrap().contains_key(pubkey)
    }

    async fn has_access(&self, pubkey: &str) -> bool {
        self.builders
            .read()
            .unwrap()
            .get(pubkey)
            .map(|b| b.access)
            .unwrap_or(false)
    }

    async fn status(&self, pubkey: &str) -> Result<BuilderStatus, AccessError> {
        self.builders
            .read()
            .unwrap()
            .get(pubkey)
            .map(|b| BuilderStatus {
                access: b.access,
                pending_payment: b.pending_payment,
            })
            .ok_or_else(|| AccessError::UnknownBuilder(pubkey.to_string()))
    }

    async fn credit_payment(&self, pubkey: &str, amount: Wei) {
        let mut builders = self.builders.write().unwrap();
        match builders.get_mut(pubkey) {
            Some(builder) => builder.pending_payment += amount,
            // A winner must have been registered to bid; losing the record
            // mid-flight would lose the payment due, so make it loud.
            None => warn!("Payment of {} wei credited to unknown builder {}", amount, pubkey),
        }
    }

    async fn revoke(&self, pubkey: &str) {
        if let Some(builder) = self.builders.write().unwrap().get_mut(pubkey) {
            warn!("Access revoked for builder {}", pubkey);
            builder.access = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_status() {
        let registry = InMemoryRegistry::new();
        registry.register("0xbuilder").await.unwrap();

        let status = registry.status("0xbuilder").await.unwrap();
        assert!(status.access);
        assert_eq!(status.pending_payment, 0);
    }

    #[tokio::test]
    async fn test_double_registration_rejected() {
        let registry = InMemoryRegistry::new();
        registry.register("0xbuilder").await.unwrap();
        assert!(matches!(
            registry.register("0xbuilder").await,
            Err(AccessError::AlreadyRegistered(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_builder_status() {
        let registry = InMemoryRegistry::new();
        assert!(matches!(
            registry.status("0xghost").await,
            Err(AccessError::UnknownBuilder(_))
        ));
        assert!(!registry.is_registered("0xghost").await);
        assert!(!registry.has_access("0xghost").await);
    }

    #[tokio::test]
    async fn test_credit_accumulates() {
        let registry = InMemoryRegistry::new();
        registry.register("0xbuilder").await.unwrap();
        registry.credit_payment("0xbuilder", 100).await;
        registry.credit_payment("0xbuilder", 250).await;

        let status = registry.status("0xbuilder").await.unwrap();
        assert_eq!(status.pending_payment, 350);
    }

    #[tokio::test]
    async fn test_revoke_blocks_access_but_keeps_registration() {
        let registry = InMemoryRegistry::new();
        registry.register("0xbuilder").await.unwrap();
        registry.revoke("0xbuilder").await;

        assert!(registry.is_registered("0xbuilder").await);
        assert!(!registry.has_access("0xbuilder").await);
        assert!(matches!(
            registry.require_access("0xbuilder").await,
            Err(AccessError::AccessRestricted(_))
        ));
    }

    #[tokio::test]
    async fn test_require_access_distinguishes_unknown() {
        let registry = InMemoryRegistry::new();
        assert!(matches!(
            registry.require_access("0xghost").await,
            Err(AccessError::UnknownBuilder(_))
        ));
    }
}
