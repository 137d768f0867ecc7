//! Request handlers for the sync endpoints.

use crate::auth::TokenStore;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use carebridge_plan::{ExportExecutor, ImportExecutor, PlanCache};
use carebridge_protocol::{
    Channel, ClientVersion, LoginRequest, LoginResponse, PullResponse, PushRequest, PushResponse,
    UserInfo,
};
use carebridge_schema::EntityType;
use carebridge_store::{Store, Value};
use std::collections::HashSet;

/// Transport-agnostic handlers for the central sync API.
///
/// The handler owns the central store and the plan cache; the HTTP
/// layer (or a loopback shim in tests) parses requests into the typed
/// calls here and maps [`ServerError`]s back to status codes.
pub struct RequestHandler {
    config: ServerConfig,
    store: Store,
    plans: PlanCache,
    exporter: ExportExecutor,
    importer: ImportExecutor,
    tokens: TokenStore,
}

impl RequestHandler {
    /// Creates a handler over a store and plan cache.
    pub fn new(config: ServerConfig, store: Store, plans: PlanCache) -> Self {
        let tokens = TokenStore::new(config.users.clone());
        Self {
            exporter: ExportExecutor::new(store.clone()),
            importer: ImportExecutor::new(store.clone()),
            config,
            store,
            plans,
            tokens,
        }
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The central store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Checks the `X-Version` header against the accepted range.
    ///
    /// Runs before authentication on every route so that out-of-range
    /// clients get the version gate rather than a token error.
    pub fn check_version(&self, header: Option<&str>) -> ServerResult<ClientVersion> {
        let raw = header
            .ok_or_else(|| ServerError::InvalidRequest("missing client version header".into()))?;
        let version: ClientVersion = raw
            .parse()
            .map_err(|_| ServerError::InvalidRequest(format!("bad client version {raw:?}")))?;
        if !self.config.accepts_version(version) {
            return Err(ServerError::IncompatibleClientVersion {
                supplied: version.to_string(),
            });
        }
        Ok(version)
    }

    /// Resolves a bearer token to a user.
    pub fn authenticate(&self, auth_header: Option<&str>) -> ServerResult<UserInfo> {
        self.tokens.authenticate(auth_header)
    }

    /// Handles `POST /login`.
    pub fn handle_login(&self, request: LoginRequest) -> ServerResult<LoginResponse> {
        let (token, user) = self.tokens.login(&request.email, &request.password)?;
        Ok(LoginResponse { token, user })
    }

    /// Handles `GET /whoami`.
    pub fn handle_whoami(&self, auth_header: Option<&str>) -> ServerResult<UserInfo> {
        self.authenticate(auth_header)
    }

    /// Handles `GET /sync/{channel}?since=&limit=&page=`.
    ///
    /// Returns rows written after the `since` tick in ascending write
    /// order, paged by index over that snapshot. `requestedAt` is the
    /// store tick at response time and becomes the client's next
    /// cursor once the channel is fully drained.
    ///
    /// The row set is recomputed per page, so a row updated while a
    /// client is mid-drain re-sorts to the tail and shifts every
    /// later index down by one; a page boundary can then step over a
    /// not-yet-served row. That row's tick trails the cursor the
    /// client takes from `requestedAt`, so it is missed until its own
    /// next write. Correct paging therefore assumes the channel is
    /// quiescent for the duration of one drain. The wire format
    /// (`since`/`limit`/`page`) offers no stable page anchor to do
    /// better with.
    pub fn handle_pull(
        &self,
        auth_header: Option<&str>,
        channel: &Channel,
        since: i64,
        limit: Option<usize>,
        page: usize,
    ) -> ServerResult<PullResponse> {
        self.authenticate(auth_header)?;
        let (entity, scope_filter) = self.resolve_channel(channel)?;
        let plan = self.plans.plan_for(&entity)?;
        let limit = limit
            .unwrap_or(self.config.default_page_limit)
            .clamp(1, self.config.max_page_limit);

        let mut rows = self.store.updated_since(entity.as_str(), since);
        if let Some((foreign_key, parent_id)) = &scope_filter {
            // tombstones may have lost their fk column; deletes are
            // idempotent, so they stay in every scope
            rows.retain(|row| {
                match row.field(foreign_key).and_then(Value::as_text) {
                    Some(value) => value == parent_id,
                    None => !row.is_current(),
                }
            });
        }

        let count = rows.len() as u64;
        let start = page.saturating_mul(limit).min(rows.len());
        let end = (start + limit).min(rows.len());
        let mut lossy_logged = HashSet::new();
        let records = rows[start..end]
            .iter()
            .map(|row| self.exporter.serialize_row(&plan, row, &mut lossy_logged))
            .collect();

        tracing::debug!(
            channel = %channel,
            since,
            page,
            count,
            "pull served"
        );
        Ok(PullResponse {
            records,
            count,
            requested_at: self.store.tick(),
        })
    }

    /// Handles `POST /sync/{channel}`.
    ///
    /// Applies the whole page in one transaction; a malformed record
    /// rejects the page without applying any of it.
    pub fn handle_push(
        &self,
        auth_header: Option<&str>,
        channel: &Channel,
        request: PushRequest,
    ) -> ServerResult<PushResponse> {
        self.authenticate(auth_header)?;
        let (entity, _) = self.resolve_channel(channel)?;
        let plan = self.plans.plan_for(&entity)?;
        self.importer.apply_page(&plan, &request.records)?;

        tracing::debug!(
            channel = %channel,
            count = request.records.len(),
            "push applied"
        );
        Ok(PushResponse {
            count: request.records.len() as u64,
            requested_at: self.store.tick(),
        })
    }

    /// Maps a channel to the entity it serves, plus the foreign-key
    /// filter for scoped channels.
    fn resolve_channel(
        &self,
        channel: &Channel,
    ) -> ServerResult<(EntityType, Option<(String, String)>)> {
        let unknown = || ServerError::UnknownChannel(channel.to_string());
        match channel.scope() {
            None => {
                let entity = EntityType::new(channel.as_str());
                self.plans.registry().get(&entity).map_err(|_| unknown())?;
                Ok((entity, None))
            }
            Some((parent, parent_id, name)) => {
                let parent_entity = EntityType::new(parent);
                let schema = self
                    .plans
                    .registry()
                    .get(&parent_entity)
                    .map_err(|_| unknown())?;
                let child = schema
                    .children
                    .iter()
                    .find(|c| c.target.as_str() == name)
                    .ok_or_else(unknown)?;
                Ok((
                    child.target.clone(),
                    Some((child.foreign_key.clone(), parent_id.to_string())),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carebridge_store::StoreResult;
    use carebridge_testkit::{demo_plan_cache, fields, record};
    use serde_json::json;

    fn handler_with_login() -> (RequestHandler, String) {
        let config = ServerConfig::new().with_user("a@clinic.test", "pw", "Dr A");
        let handler = RequestHandler::new(config, Store::new(), demo_plan_cache());
        let login = handler
            .handle_login(LoginRequest {
                email: "a@clinic.test".into(),
                password: "pw".into(),
            })
            .unwrap();
        let auth = format!("Bearer {}", login.token);
        (handler, auth)
    }

    fn seed_patient(store: &Store, id: &str, name: &str) {
        store
            .transaction(|txn| -> StoreResult<()> {
                txn.create(
                    "patient",
                    id,
                    fields([("first_name", Value::from(name))]),
                );
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn version_gate() {
        let config = ServerConfig::new()
            .with_version_range(ClientVersion::new(1, 5, 0), ClientVersion::new(2, 0, 0));
        let handler = RequestHandler::new(config, Store::new(), demo_plan_cache());

        assert!(handler.check_version(Some("1.6.0")).is_ok());
        assert!(matches!(
            handler.check_version(Some("1.0.0")),
            Err(ServerError::IncompatibleClientVersion { .. })
        ));
        assert!(matches!(
            handler.check_version(Some("3.0.0")),
            Err(ServerError::IncompatibleClientVersion { .. })
        ));
        assert!(matches!(
            handler.check_version(None),
            Err(ServerError::InvalidRequest(_))
        ));
    }

    #[test]
    fn pull_requires_auth() {
        let (handler, _) = handler_with_login();
        let channel = Channel::root("patient").unwrap();
        let err = handler
            .handle_pull(None, &channel, 0, None, 0)
            .unwrap_err();
        assert!(matches!(err, ServerError::AuthenticationFailed(_)));
    }

    #[test]
    fn pull_returns_rows_after_since_tick() {
        let (handler, auth) = handler_with_login();
        seed_patient(handler.store(), "p1", "Ana");
        let mid_tick = handler.store().tick();
        seed_patient(handler.store(), "p2", "Ben");

        let channel = Channel::root("patient").unwrap();
        let all = handler
            .handle_pull(Some(&auth), &channel, 0, None, 0)
            .unwrap();
        assert_eq!(all.count, 2);

        let newer = handler
            .handle_pull(Some(&auth), &channel, mid_tick, None, 0)
            .unwrap();
        assert_eq!(newer.count, 1);
        assert_eq!(newer.records[0].id(), Some("p2"));
        assert!(newer.requested_at >= mid_tick);
    }

    #[test]
    fn pull_pages_by_index() {
        let (handler, auth) = handler_with_login();
        for i in 0..5 {
            seed_patient(handler.store(), &format!("p{i}"), "X");
        }

        let channel = Channel::root("patient").unwrap();
        let first = handler
            .handle_pull(Some(&auth), &channel, 0, Some(2), 0)
            .unwrap();
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.count, 5);

        let last = handler
            .handle_pull(Some(&auth), &channel, 0, Some(2), 2)
            .unwrap();
        assert_eq!(last.records.len(), 1);

        let beyond = handler
            .handle_pull(Some(&auth), &channel, 0, Some(2), 3)
            .unwrap();
        assert!(beyond.records.is_empty());
    }

    #[test]
    fn scoped_channel_filters_by_parent() {
        let (handler, auth) = handler_with_login();
        handler
            .store()
            .transaction(|txn| -> StoreResult<()> {
                txn.create("patient", "p1", fields([("first_name", Value::from("Ana"))]));
                txn.create(
                    "encounter",
                    "e1",
                    fields([("patient_id", Value::from("p1"))]),
                );
                txn.create(
                    "encounter",
                    "e2",
                    fields([("patient_id", Value::from("p2"))]),
                );
                Ok(())
            })
            .unwrap();

        let channel = Channel::scoped("patient", "p1", "encounter").unwrap();
        let response = handler
            .handle_pull(Some(&auth), &channel, 0, None, 0)
            .unwrap();
        assert_eq!(response.count, 1);
        assert_eq!(response.records[0].id(), Some("e1"));
    }

    #[test]
    fn unknown_channel_rejected() {
        let (handler, auth) = handler_with_login();
        let channel = Channel::root("not_an_entity").unwrap();
        let err = handler
            .handle_pull(Some(&auth), &channel, 0, None, 0)
            .unwrap_err();
        assert!(matches!(err, ServerError::UnknownChannel(_)));

        let scoped = Channel::scoped("patient", "p1", "medication").unwrap();
        let err = handler
            .handle_pull(Some(&auth), &scoped, 0, None, 0)
            .unwrap_err();
        assert!(matches!(err, ServerError::UnknownChannel(_)));
    }

    #[test]
    fn push_applies_page_atomically() {
        let (handler, auth) = handler_with_login();
        let channel = Channel::root("patient").unwrap();

        let good = record(json!({"id": "p1", "first_name": "Ana"}));
        let response = handler
            .handle_push(
                Some(&auth),
                &channel,
                PushRequest {
                    records: vec![good.clone()],
                },
            )
            .unwrap();
        assert_eq!(response.count, 1);
        assert_eq!(handler.store().count_current("patient"), 1);

        // a malformed record rejects the page wholesale
        let bad = record(json!({"first_name": "NoId"}));
        let err = handler
            .handle_push(
                Some(&auth),
                &channel,
                PushRequest {
                    records: vec![record(json!({"id": "p2"})), bad],
                },
            )
            .unwrap_err();
        assert_eq!(err.status(), 400);
        assert!(handler.store().get("patient", "p2").is_none());
    }

    #[test]
    fn pushed_tombstone_round_trips_through_pull() {
        let (handler, auth) = handler_with_login();
        let channel = Channel::root("patient").unwrap();
        handler
            .handle_push(
                Some(&auth),
                &channel,
                PushRequest {
                    records: vec![record(json!({"id": "p1", "first_name": "Ana"}))],
                },
            )
            .unwrap();
        let tick = handler.store().tick();

        handler
            .handle_push(
                Some(&auth),
                &channel,
                PushRequest {
                    records: vec![carebridge_protocol::SyncRecord::tombstone("p1")],
                },
            )
            .unwrap();

        let response = handler
            .handle_pull(Some(&auth), &channel, tick, None, 0)
            .unwrap();
        assert_eq!(response.count, 1);
        assert!(response.records[0].is_deleted);
    }
}
