use crate::cache::CacheTrigger;
use crate::infra::storage::StorageConfig;

#[derive(Clone)]
pub struct AdminState {
    pub trigger: CacheTrigger,
    pub storage: StorageConfig,
}
