//! The facility-side sync loop.

use crate::config::SyncConfig;
use crate::error::{EngineError, EngineResult};
use crate::http::HttpClient;
use crate::remote::RemoteConnection;
use carebridge_plan::{ExportCursor, ExportExecutor, ImportExecutor, PlanCache, PlanNode};
use carebridge_protocol::Channel;
use carebridge_schema::EntityType;
use carebridge_store::Store;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Counts from one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Records applied from pull across all channels.
    pub pulled: usize,
    /// Records acknowledged by push across all channels.
    pub pushed: usize,
}

/// Drives pull-then-push synchronization over a set of channels.
///
/// Each channel keeps its own cursor in store metadata. A pull drains
/// the channel page by page, applying every page in its own
/// transaction, and advances the cursor only once the channel is
/// fully drained — an interrupted pull re-fetches from the old cursor
/// and re-applies idempotently. Push exports dirty record graphs with
/// keyset pagination and clears their dirty flags only after the
/// server acknowledges the page.
pub struct SyncManager<C> {
    store: Store,
    plans: PlanCache,
    remote: Arc<RemoteConnection<C>>,
    config: SyncConfig,
    importer: ImportExecutor,
    exporter: ExportExecutor,
    cancelled: AtomicBool,
}

impl<C: HttpClient> SyncManager<C> {
    /// Creates a manager over a store, plan cache and connection.
    pub fn new(
        store: Store,
        plans: PlanCache,
        remote: Arc<RemoteConnection<C>>,
        config: SyncConfig,
    ) -> Self {
        Self {
            importer: ImportExecutor::new(store.clone()),
            exporter: ExportExecutor::new(store.clone()),
            store,
            plans,
            remote,
            config,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Requests cancellation; checked between pages.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Clears a previous cancellation request.
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// The current pull cursor for a channel.
    pub fn cursor(&self, channel: &Channel) -> i64 {
        self.store
            .meta_get(&cursor_key(channel))
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0)
    }

    /// Runs one full cycle: pull every channel, then push every
    /// channel. Pull-first means locally conflicting rows see the
    /// central state before their own changes go out.
    pub async fn run_once(&self) -> EngineResult<SyncOutcome> {
        self.remote.connect().await?;

        let mut outcome = SyncOutcome::default();
        for channel in &self.config.channels {
            outcome.pulled += self.pull_channel(channel).await?;
        }
        for channel in &self.config.channels {
            outcome.pushed += self.push_channel(channel).await?;
        }
        tracing::info!(
            pulled = outcome.pulled,
            pushed = outcome.pushed,
            "sync run complete"
        );
        Ok(outcome)
    }

    /// Drains one channel's inbound changes.
    pub async fn pull_channel(&self, channel: &Channel) -> EngineResult<usize> {
        let plan = self.plan_for_channel(channel)?;
        let since = self.cursor(channel);
        let mut page = 0;
        let mut total = 0;
        let mut next_cursor = since;

        loop {
            self.check_cancelled()?;
            let response = self
                .remote
                .pull(channel, since, self.config.pull_limit, page)
                .await?;
            let batch = response.records.len();
            self.importer.apply_page(&plan, &response.records)?;
            total += batch;
            next_cursor = response.requested_at;

            if batch < self.config.pull_limit {
                break;
            }
            page += 1;
        }

        // advance only after the whole channel is drained
        self.store.meta_set(&cursor_key(channel), next_cursor.to_string());
        tracing::debug!(channel = %channel, total, cursor = next_cursor, "pull drained");
        Ok(total)
    }

    /// Pushes one channel's dirty record graphs.
    pub async fn push_channel(&self, channel: &Channel) -> EngineResult<usize> {
        let plan = self.plan_for_channel(channel)?;
        let mut cursor = ExportCursor::start();
        let mut total = 0;

        loop {
            self.check_cancelled()?;
            let page = self
                .exporter
                .export(&plan, &cursor, self.config.push_limit);
            if page.records.is_empty() {
                break;
            }

            let count = page.records.len();
            self.remote.push(channel, page.records).await?;
            // only an acknowledged page is clean
            self.store
                .mark_pushed(plan.entity.as_str(), &page.root_ids, Utc::now());
            total += count;
            cursor = page.next;
            if page.caught_up {
                break;
            }
        }

        tracing::debug!(channel = %channel, total, "push drained");
        Ok(total)
    }

    /// Scoped channels covering one patient's sub-resources, derived
    /// from the patient schema's child relations.
    pub fn patient_channels(&self, patient_id: &str) -> EngineResult<Vec<Channel>> {
        let schema = self
            .plans
            .registry()
            .get(&EntityType::new("patient"))
            .map_err(carebridge_plan::PlanError::from)?;
        let mut channels = Vec::with_capacity(schema.children.len());
        for child in &schema.children {
            let channel = Channel::scoped("patient", patient_id, child.target.as_str())
                .map_err(|e| EngineError::Protocol(e.to_string()))?;
            channels.push(channel);
        }
        Ok(channels)
    }

    fn plan_for_channel(&self, channel: &Channel) -> EngineResult<Arc<PlanNode>> {
        let entity = match channel.scope() {
            Some((_, _, name)) => EntityType::new(name),
            None => EntityType::new(channel.as_str()),
        };
        Ok(self.plans.plan_for(&entity)?)
    }

    fn check_cancelled(&self) -> EngineResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }
}

fn cursor_key(channel: &Channel) -> String {
    format!("sync.cursor.{channel}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::http::MockHttpClient;
    use carebridge_protocol::ClientVersion;
    use carebridge_testkit::demo_plan_cache;
    use serde_json::json;

    fn manager(mock: Arc<MockHttpClient>, store: Store) -> SyncManager<Arc<MockHttpClient>> {
        let connection = ConnectionConfig::new(
            "http://central.test",
            "a@clinic.test",
            "pw",
            ClientVersion::new(1, 2, 0),
        );
        let remote = Arc::new(RemoteConnection::new(connection, mock));
        let config = SyncConfig::new()
            .with_channel(Channel::root("patient").unwrap())
            .with_pull_limit(2)
            .with_push_limit(2);
        SyncManager::new(store, demo_plan_cache(), remote, config)
    }

    fn login_body() -> serde_json::Value {
        json!({"token": "t1", "user": {"id": "u1", "displayName": "Dr A"}})
    }

    fn pull_body(records: serde_json::Value, requested_at: i64) -> serde_json::Value {
        json!({"records": records, "count": 0, "requestedAt": requested_at})
    }

    #[tokio::test]
    async fn pull_advances_cursor_only_after_drain() {
        let mock = Arc::new(MockHttpClient::new());
        let store = Store::new();
        let manager = manager(mock.clone(), store.clone());
        let channel = Channel::root("patient").unwrap();

        mock.push_json(200, login_body());
        // full first page, then a short page ends the drain
        mock.push_json(
            200,
            pull_body(
                json!([
                    {"data": {"id": "p1", "first_name": "Ana"}},
                    {"data": {"id": "p2", "first_name": "Ben"}}
                ]),
                7,
            ),
        );
        mock.push_json(
            200,
            pull_body(json!([{"data": {"id": "p3", "first_name": "Cyn"}}]), 9),
        );

        manager.remote.connect().await.unwrap();
        let pulled = manager.pull_channel(&channel).await.unwrap();
        assert_eq!(pulled, 3);
        assert_eq!(store.count_current("patient"), 3);
        assert_eq!(manager.cursor(&channel), 9);

        // imported rows are clean, not re-exported
        assert!(store.find_for_push("patient", None, 10).is_empty());
    }

    #[tokio::test]
    async fn interrupted_pull_keeps_old_cursor() {
        let mock = Arc::new(MockHttpClient::new());
        let store = Store::new();
        let manager = manager(mock.clone(), store.clone());
        let channel = Channel::root("patient").unwrap();

        mock.push_json(200, login_body());
        mock.push_json(
            200,
            pull_body(
                json!([
                    {"data": {"id": "p1", "first_name": "Ana"}},
                    {"data": {"id": "p2", "first_name": "Ben"}}
                ]),
                7,
            ),
        );
        mock.push_transport_error("connection reset");

        manager.remote.connect().await.unwrap();
        let err = manager.pull_channel(&channel).await.unwrap_err();
        assert!(matches!(err, EngineError::Transport(_)));

        // the first page landed, but the cursor did not move
        assert_eq!(store.count_current("patient"), 2);
        assert_eq!(manager.cursor(&channel), 0);
    }

    #[tokio::test]
    async fn push_marks_rows_clean_after_ack() {
        let mock = Arc::new(MockHttpClient::new());
        let store = carebridge_testkit::populated_store(3);
        let manager = manager(mock.clone(), store.clone());
        let channel = Channel::root("patient").unwrap();

        mock.push_json(200, login_body());
        mock.push_json(200, json!({"count": 2, "requestedAt": 5}));
        mock.push_json(200, json!({"count": 1, "requestedAt": 6}));

        manager.remote.connect().await.unwrap();
        let pushed = manager.push_channel(&channel).await.unwrap();
        assert_eq!(pushed, 3);
        assert!(store.find_for_push("patient", None, 10).is_empty());

        let requests = mock.requests();
        // login + two push pages
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[1].body["records"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rejected_push_leaves_rows_dirty() {
        let mock = Arc::new(MockHttpClient::new());
        let store = carebridge_testkit::populated_store(1);
        let manager = manager(mock.clone(), store.clone());
        let channel = Channel::root("patient").unwrap();

        mock.push_json(200, login_body());
        mock.push_json(500, json!({"error": "InternalError", "message": "boom"}));

        manager.remote.connect().await.unwrap();
        assert!(manager.push_channel(&channel).await.is_err());
        assert_eq!(store.find_for_push("patient", None, 10).len(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_between_pages() {
        let mock = Arc::new(MockHttpClient::new());
        let manager = manager(mock.clone(), Store::new());
        let channel = Channel::root("patient").unwrap();

        manager.cancel();
        let err = manager.pull_channel(&channel).await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));

        manager.reset_cancel();
        mock.push_json(200, login_body());
        mock.push_json(200, pull_body(json!([]), 1));
        manager.remote.connect().await.unwrap();
        assert_eq!(manager.pull_channel(&channel).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn patient_channels_cover_child_relations() {
        let mock = Arc::new(MockHttpClient::new());
        let manager = manager(mock, Store::new());
        let channels = manager.patient_channels("p1").unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].as_str(), "patient/p1/encounter");
    }
}
