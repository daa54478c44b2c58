//! Agent credential checks.

use async_trait::async_trait;
use db::models::machine;
use db::store::Store;
use sea_orm::DbErr;
use std::sync::Arc;

/// Verifies an agent's identity before the router lets any frame through.
#[async_trait]
pub trait CredentialValidator: Send + Sync + 'static {
    /// `Ok(None)` means unknown machine or wrong key; the caller decides
    /// how loudly to reject.
    async fn verify(&self, machine_id: &str, api_key: &str)
    -> Result<Option<machine::Model>, DbErr>;
}

/// Checks the presented key against the machine's stored `api_key`.
pub struct ApiKeyValidator {
    store: Arc<dyn Store>,
}

impl ApiKeyValidator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CredentialValidator for ApiKeyValidator {
    async fn verify(
        &self,
        machine_id: &str,
        api_key: &str,
    ) -> Result<Option<machine::Model>, DbErr> {
        let Some(machine) = self.store.machine_by_id(machine_id).await? else {
            return Ok(None);
        };
        if machine.api_key == api_key {
            Ok(Some(machine))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::memory::MemoryStore;
    use db::models::machine::MachineStatus;

    #[tokio::test]
    async fn accepts_matching_key_and_rejects_everything_else() {
        let store = Arc::new(MemoryStore::new());
        store
            .seed_machine("m1", "LAB-PC-01", "secret", MachineStatus::Active)
            .await;
        let validator = ApiKeyValidator::new(store as Arc<dyn Store>);

        assert!(validator.verify("m1", "secret").await.unwrap().is_some());
        assert!(validator.verify("m1", "wrong").await.unwrap().is_none());
        assert!(validator.verify("nope", "secret").await.unwrap().is_none());
    }
}
