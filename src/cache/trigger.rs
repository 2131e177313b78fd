//! Cache trigger service.
//!
//! Single entry point for dropping cached responses, both after route-level
//! writes and from the administrative purge endpoints. The KV tier and the
//! CDN tier are purged independently; a failure in one never rolls back or
//! skips the other.

use serde::Serialize;
use tracing::{debug, info, instrument};

use super::keys::{ALL_PATTERN, InvalidationScope};
use super::kv::KvCache;
use crate::infra::cdn::{CdnClient, CdnOutcome};

/// What the KV tier did during an administrative purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KvOutcome {
    Purged,
    /// The store is private to another process and was not touched.
    Skipped,
    Failed,
}

impl KvOutcome {
    pub fn is_purged(self) -> bool {
        self == KvOutcome::Purged
    }
}

/// What each tier did during an administrative purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub kv: KvOutcome,
    pub kv_deleted: usize,
    pub cdn: CdnOutcome,
}

impl PurgeReport {
    /// At least one tier evicted what it was asked to.
    pub fn any_succeeded(&self) -> bool {
        self.kv.is_purged() || self.cdn.is_purged()
    }
}

#[derive(Clone)]
pub struct CacheTrigger {
    kv: KvCache,
    cdn: CdnClient,
    purge_kv: bool,
}

impl CacheTrigger {
    pub fn new(kv: KvCache, cdn: CdnClient) -> Self {
        Self {
            kv,
            cdn,
            purge_kv: true,
        }
    }

    /// Administrative purges leave the KV store alone and report it as
    /// skipped. For callers whose store is not the one the server reads, such
    /// as a CLI process holding its own in-memory backend.
    pub fn skipping_kv(mut self) -> Self {
        self.purge_kv = false;
        self
    }

    pub fn kv(&self) -> &KvCache {
        &self.kv
    }

    pub fn cdn(&self) -> &CdnClient {
        &self.cdn
    }

    /// Drop every KV entry of the collection a write touched.
    pub async fn invalidate(&self, scope: InvalidationScope) {
        for pattern in scope.patterns() {
            let deleted = self.kv.delete_by_pattern(pattern).await;
            debug!(target = "sabor::cache::trigger", pattern, ?deleted, "invalidated");
        }
    }

    /// Recipe created, edited, deleted or reacted to.
    pub async fn recipes_changed(&self) {
        self.invalidate(InvalidationScope::Recipes).await;
    }

    /// A user profile changed.
    pub async fn user_changed(&self) {
        self.invalidate(InvalidationScope::Users).await;
    }

    /// Clear all KV response entries, then purge the listed URLs at the edge.
    #[instrument(skip_all, fields(urls = urls.len()))]
    pub async fn purge_urls(&self, urls: &[String]) -> PurgeReport {
        let kv = self.purge_kv_tier().await;
        let cdn = self.cdn.purge_urls(urls).await;
        self.report(kv, cdn)
    }

    /// Clear all KV response entries and the whole CDN zone.
    #[instrument(skip_all)]
    pub async fn purge_everything(&self) -> PurgeReport {
        let kv = self.purge_kv_tier().await;
        let cdn = self.cdn.purge_all().await;
        self.report(kv, cdn)
    }

    async fn purge_kv_tier(&self) -> (KvOutcome, usize) {
        if !self.purge_kv {
            return (KvOutcome::Skipped, 0);
        }
        match self.kv.delete_by_pattern(ALL_PATTERN).await {
            Some(deleted) => (KvOutcome::Purged, deleted),
            None => (KvOutcome::Failed, 0),
        }
    }

    fn report(&self, (kv, kv_deleted): (KvOutcome, usize), cdn: CdnOutcome) -> PurgeReport {
        let report = PurgeReport {
            kv,
            kv_deleted,
            cdn,
        };
        info!(
            target = "sabor::cache::trigger",
            kv = ?report.kv,
            kv_deleted = report.kv_deleted,
            cdn = ?report.cdn,
            "cache purge finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::keys::response_key;
    use crate::cache::memory::MemoryStore;
    use crate::infra::cdn::CdnConfig;

    fn create_trigger() -> CacheTrigger {
        let kv = KvCache::new(Arc::new(MemoryStore::new()));
        let cdn = CdnClient::new(CdnConfig::default()).expect("cdn client");
        CacheTrigger::new(kv, cdn)
    }

    async fn seed(trigger: &CacheTrigger, paths: &[&str]) {
        for path in paths {
            trigger.kv().set(&response_key(path, None), &"{}", 60).await;
        }
    }

    #[tokio::test]
    async fn recipe_writes_leave_user_entries() {
        let trigger = create_trigger();
        seed(&trigger, &["/api/recipes", "/api/recipes/bolo", "/api/users/1"]).await;

        trigger.recipes_changed().await;

        assert_eq!(trigger.kv().get::<String>("cache:/api/recipes").await, None);
        assert_eq!(trigger.kv().get::<String>("cache:/api/recipes/bolo").await, None);
        assert!(trigger.kv().get::<String>("cache:/api/users/1").await.is_some());
    }

    #[tokio::test]
    async fn user_changes_drop_users_and_recipes() {
        let trigger = create_trigger();
        seed(&trigger, &["/api/recipes", "/api/users/1"]).await;

        trigger.user_changed().await;

        assert_eq!(trigger.kv().delete_by_pattern("cache:*").await, Some(0));
    }

    #[tokio::test]
    async fn purge_reports_kv_success_without_cdn() {
        let trigger = create_trigger();
        seed(&trigger, &["/api/recipes", "/api/users/1"]).await;

        let report = trigger.purge_everything().await;

        assert_eq!(
            report,
            PurgeReport {
                kv: KvOutcome::Purged,
                kv_deleted: 2,
                cdn: CdnOutcome::NotConfigured,
            }
        );
        assert!(report.any_succeeded());
    }

    #[tokio::test]
    async fn skipped_kv_without_cdn_is_not_a_success() {
        let trigger = create_trigger().skipping_kv();
        seed(&trigger, &["/api/recipes"]).await;

        let report = trigger.purge_everything().await;

        assert_eq!(report.kv, KvOutcome::Skipped);
        assert_eq!(report.kv_deleted, 0);
        assert_eq!(report.cdn, CdnOutcome::NotConfigured);
        assert!(!report.any_succeeded());
        assert!(trigger.kv().get::<String>("cache:/api/recipes").await.is_some());
    }

    #[test]
    fn skipped_kv_still_succeeds_when_the_cdn_purged() {
        let report = PurgeReport {
            kv: KvOutcome::Skipped,
            kv_deleted: 0,
            cdn: CdnOutcome::Purged,
        };
        assert!(report.any_succeeded());
    }
}
