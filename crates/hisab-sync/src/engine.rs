//! # Sync Engine
//!
//! Reconciles the local store with the remote store after a period of
//! disconnection, without a change log: identity comes from natural keys and
//! ids, plus a per-row `synced` bit in the local store.
//!
//! ## Reconciliation (per entity kind, kinds run sequentially)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  1. local  = local store, filtered by scope         ─┐ either fails:    │
//! │  2. remote = remote.list(scope, archived too)       ─┘ one error, skip  │
//! │                                                                         │
//! │  3. R = IdentitySet(remote)   {(company, key)} ∪ {(company, id)}        │
//! │                                                                         │
//! │  4. for each local row:                                                 │
//! │       matches R            ──► present (mark synced)                    │
//! │       no match, unsynced   ──► PUSH SET (created offline)               │
//! │       no match, synced     ──► delete candidate                         │
//! │                                                                         │
//! │  5. push: remote.create(row), bounded parallelism                       │
//! │       ok  ──► synced += 1, R += row, local row takes the remote id      │
//! │       err ──► failed += 1, "<Singular> <label>: <error>"                │
//! │                                                                         │
//! │  6. R' = IdentitySet(remote.list(...))  re-fetch; fails: skip deletes   │
//! │                                                                         │
//! │  7. delete set = rows NOT in push set AND not matching R'               │
//! │  8. delete locally; failures are logged, never fatal                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The push set is excluded from deletion regardless of step 6, so a record
//! whose create has not yet shown up in a listing is never removed.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use hisab_core::{
    natural_key, EntityKind, EntityReport, IdentitySet, ReconciliationResult, Record, SyncStatus,
    TenantScope,
};
use hisab_db::CollectionRepository;

use crate::error::{SyncError, SyncResult};
use crate::gateway::EntityGateway;
use crate::reachability::Reachability;
use crate::remote::{RemoteResult, RemoteStore};
use crate::status::SyncStatusRegister;

/// Error recorded when a pass starts while the remote is down.
pub const UNREACHABLE_MESSAGE: &str = "Remote store is unreachable";

/// Error recorded when a pass is requested while one is running.
pub const IN_PROGRESS_MESSAGE: &str = "Sync already in progress";

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Receives progress while a pass runs (UI bridge, console, ...).
pub trait SyncEventEmitter: Send + Sync {
    /// Emits a sync status change event.
    fn emit_status(&self, status: &SyncStatus);

    /// Emits the outcome of one entity kind.
    fn emit_progress(&self, report: &EntityReport);

    /// Emits one error entry.
    fn emit_error(&self, message: &str);
}

/// No-op event emitter.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _status: &SyncStatus) {}
    fn emit_progress(&self, _report: &EntityReport) {}
    fn emit_error(&self, _message: &str) {}
}

// =============================================================================
// Sync Targets
// =============================================================================

/// Outcome of reconciling one entity kind.
#[derive(Debug, Clone)]
pub struct EntityOutcome {
    pub report: EntityReport,
    pub errors: Vec<String>,
}

impl EntityOutcome {
    fn new(kind: EntityKind) -> Self {
        EntityOutcome {
            report: EntityReport::new(kind),
            errors: Vec::new(),
        }
    }

    fn record_error(&mut self, message: String) {
        self.report.error_count += 1;
        self.errors.push(message);
    }

    /// The whole kind could not be processed.
    fn skip(mut self, message: String) -> Self {
        self.report.skipped = true;
        self.record_error(message);
        self
    }
}

/// One entity kind the engine can reconcile.
#[async_trait]
pub trait SyncTarget: Send + Sync {
    fn kind(&self) -> EntityKind;

    async fn reconcile(&self, scope: TenantScope, push_concurrency: usize) -> EntityOutcome;

    /// Local records of this kind, across all tenants.
    async fn count_local(&self) -> SyncResult<i64>;
}

#[async_trait]
impl<T: Record> SyncTarget for EntityGateway<T> {
    fn kind(&self) -> EntityKind {
        T::KIND
    }

    async fn reconcile(&self, scope: TenantScope, push_concurrency: usize) -> EntityOutcome {
        reconcile_collection(&self.local, self.remote.as_ref(), scope, push_concurrency).await
    }

    async fn count_local(&self) -> SyncResult<i64> {
        EntityGateway::count_local(self).await
    }
}

fn fetch_error(kind: EntityKind, err: impl std::fmt::Display) -> String {
    format!("{} sync error: {}", kind.plural(), err)
}

/// Reconciles one collection against its remote table.
pub async fn reconcile_collection<T: Record>(
    local: &CollectionRepository<T>,
    remote: &dyn RemoteStore<T>,
    scope: TenantScope,
    push_concurrency: usize,
) -> EntityOutcome {
    let kind = T::KIND;
    let mut outcome = EntityOutcome::new(kind);

    // 1-2. Fetch both sides.
    let entries = match local.get_entries(scope).await {
        Ok(entries) => entries,
        Err(e) => {
            error!(entity = %kind, error = %e, "Local read failed, skipping entity");
            return outcome.skip(fetch_error(kind, e));
        }
    };
    let remote_records = match remote.list(scope, true).await {
        Ok(records) => records,
        Err(e) => {
            warn!(entity = %kind, %scope, error = %e, "Remote fetch failed, skipping entity");
            return outcome.skip(fetch_error(kind, e));
        }
    };

    // 3. Remote identity.
    let mut remote_identity = IdentitySet::from_records(&remote_records);

    // 4. Classify local rows.
    let mut push = Vec::new();
    let mut newly_matched = Vec::new();
    for entry in &entries {
        if remote_identity.matches(&entry.record) {
            if !entry.synced {
                newly_matched.push(entry.record.id());
            }
        } else if !entry.synced {
            push.push(entry.record.clone());
        }
    }
    let push_ids: HashSet<i64> = push.iter().map(|record| record.id()).collect();

    info!(
        entity = %kind,
        %scope,
        local = entries.len(),
        remote = remote_records.len(),
        to_push = push.len(),
        "Reconciling"
    );

    // 5. Push, all creates finish before the re-fetch.
    let pushes: Vec<(T, RemoteResult<T>)> = stream::iter(push)
        .map(move |record| async move {
            let result = remote.create(&record).await;
            (record, result)
        })
        .buffer_unordered(push_concurrency.max(1))
        .collect()
        .await;

    let mut to_mark = newly_matched;
    for (record, result) in pushes {
        match result {
            Ok(created) => {
                debug!(
                    entity = %kind,
                    local_id = record.id(),
                    remote_id = created.id(),
                    key = %natural_key::resolve(&record),
                    "Pushed"
                );
                outcome.report.synced += 1;
                remote_identity.insert(&record);
                remote_identity.insert(&created);
                if let Err(e) = local.replace_with_remote(record.id(), &created).await {
                    error!(entity = %kind, local_id = record.id(), error = %e, "Failed to adopt remote copy");
                    to_mark.push(record.id());
                }
            }
            Err(e) => {
                warn!(entity = %kind, label = %record.label(), error = %e, "Push failed");
                outcome.report.failed += 1;
                outcome.record_error(format!("{} {}: {}", kind.singular(), record.label(), e));
            }
        }
    }

    if let Err(e) = local.mark_synced(&to_mark).await {
        error!(entity = %kind, error = %e, "Failed to mark records synced");
    }

    // 6. Re-fetch to see server-assigned ids and other devices' changes.
    let refreshed = match remote.list(scope, true).await {
        Ok(records) => IdentitySet::from_records(&records),
        Err(e) => {
            warn!(entity = %kind, error = %e, "Re-fetch failed, skipping deletions");
            outcome.record_error(fetch_error(kind, e));
            return outcome;
        }
    };

    // 7-8. Drop rows the remote no longer has.
    for entry in &entries {
        let record = &entry.record;
        if push_ids.contains(&record.id()) || refreshed.matches(record) {
            continue;
        }

        debug!(entity = %kind, id = record.id(), key = %natural_key::resolve(record), "Deleted remotely");
        match local.delete_by_id(record.id()).await {
            Ok(true) => outcome.report.deleted += 1,
            Ok(false) => {}
            Err(e) => {
                error!(entity = %kind, id = record.id(), error = %e, "Local delete failed");
            }
        }
    }

    outcome
}

// =============================================================================
// Sync Engine
// =============================================================================

/// Runs reconciliation passes over a fixed list of entity kinds.
pub struct SyncEngine {
    targets: Vec<Arc<dyn SyncTarget>>,
    register: Arc<SyncStatusRegister>,
    reachability: Reachability,
    emitter: Arc<dyn SyncEventEmitter>,
    push_concurrency: usize,
}

impl SyncEngine {
    pub fn builder() -> SyncEngineBuilder {
        SyncEngineBuilder::new()
    }

    /// Kinds reconciled by a pass, in order.
    pub fn kinds(&self) -> Vec<EntityKind> {
        self.targets.iter().map(|t| t.kind()).collect()
    }

    pub fn reachability(&self) -> &Reachability {
        &self.reachability
    }

    /// Runs one reconciliation pass for `scope`.
    ///
    /// Never fails: problems end up in the result's `errors`.
    pub async fn sync_all_pending_records(&self, scope: TenantScope) -> ReconciliationResult {
        if !self.reachability.is_reachable() {
            warn!(%scope, "Sync requested while remote is unreachable");
            self.emitter.emit_error(UNREACHABLE_MESSAGE);
            return ReconciliationResult::aborted(UNREACHABLE_MESSAGE);
        }

        let guard = match self.register.try_begin().await {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                info!(%scope, "Sync already in progress, request ignored");
                return ReconciliationResult::aborted(IN_PROGRESS_MESSAGE);
            }
            Err(e) => {
                error!(error = %e, "Could not record pass start");
                return ReconciliationResult::aborted(e.to_string());
            }
        };

        info!(%scope, kinds = self.targets.len(), "Reconciliation pass starting");
        self.emitter.emit_status(&self.live_snapshot().await);

        let mut result = ReconciliationResult::new();
        for target in &self.targets {
            let outcome = target.reconcile(scope, self.push_concurrency).await;
            self.emitter.emit_progress(&outcome.report);
            for message in &outcome.errors {
                self.emitter.emit_error(message);
            }
            result.absorb(outcome.report, outcome.errors);
        }
        result.finish();

        match self.register.finish(guard, &result).await {
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Failed to record sync status");
                result.errors.push(format!("Failed to record sync status: {}", e));
            }
        }

        info!(
            %scope,
            success = result.success,
            synced = result.synced,
            failed = result.failed,
            deleted = result.deleted,
            errors = result.errors.len(),
            "Reconciliation pass finished"
        );
        self.emitter.emit_status(&self.live_snapshot().await);

        result
    }

    /// Current sync status with live reachability and pending count.
    ///
    /// `pending_records` counts every local record while the remote is
    /// unreachable, and is 0 otherwise.
    pub async fn get_sync_status(&self) -> SyncResult<SyncStatus> {
        let mut status = self.live_snapshot().await;

        if !status.is_online {
            let mut pending = 0;
            for target in &self.targets {
                pending += target.count_local().await?;
            }
            status.pending_records = pending;
        } else {
            status.pending_records = 0;
        }

        Ok(status)
    }

    async fn live_snapshot(&self) -> SyncStatus {
        let mut status = self.register.snapshot().await;
        status.is_syncing = self.register.is_syncing();
        status.is_online = self.reachability.is_reachable();
        status
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating a SyncEngine.
pub struct SyncEngineBuilder {
    targets: Vec<Arc<dyn SyncTarget>>,
    register: Option<Arc<SyncStatusRegister>>,
    reachability: Option<Reachability>,
    emitter: Option<Arc<dyn SyncEventEmitter>>,
    push_concurrency: usize,
}

impl Default for SyncEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncEngineBuilder {
    pub fn new() -> Self {
        SyncEngineBuilder {
            targets: Vec::new(),
            register: None,
            reachability: None,
            emitter: None,
            push_concurrency: 4,
        }
    }

    /// Appends one entity kind. Kinds are reconciled in insertion order.
    pub fn with_target(mut self, target: Arc<dyn SyncTarget>) -> Self {
        self.targets.push(target);
        self
    }

    pub fn with_targets(mut self, targets: impl IntoIterator<Item = Arc<dyn SyncTarget>>) -> Self {
        self.targets.extend(targets);
        self
    }

    pub fn with_status_register(mut self, register: Arc<SyncStatusRegister>) -> Self {
        self.register = Some(register);
        self
    }

    pub fn with_reachability(mut self, reachability: Reachability) -> Self {
        self.reachability = Some(reachability);
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn with_push_concurrency(mut self, push_concurrency: usize) -> Self {
        self.push_concurrency = push_concurrency;
        self
    }

    /// Builds the SyncEngine.
    pub fn build(self) -> SyncResult<SyncEngine> {
        let register = self
            .register
            .ok_or_else(|| SyncError::InvalidConfig("Status register required".into()))?;
        let reachability = self
            .reachability
            .ok_or_else(|| SyncError::InvalidConfig("Reachability signal required".into()))?;

        if self.targets.is_empty() {
            return Err(SyncError::InvalidConfig(
                "At least one entity kind must be reconciled".into(),
            ));
        }
        if self.push_concurrency == 0 {
            return Err(SyncError::InvalidConfig(
                "push_concurrency must be greater than 0".into(),
            ));
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            if !seen.insert(target.kind()) {
                return Err(SyncError::InvalidConfig(format!(
                    "Entity kind {} registered twice",
                    target.kind()
                )));
            }
        }

        Ok(SyncEngine {
            targets: self.targets,
            register,
            reachability,
            emitter: self.emitter.unwrap_or_else(|| Arc::new(NoOpEmitter)),
            push_concurrency: self.push_concurrency,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use hisab_core::{Customer, Expense, LastSyncStatus, Product, Purchase, Supplier};
    use hisab_db::{Database, DbConfig};

    use crate::remote::MemoryRemoteStore;

    struct Harness {
        db: Database,
        reachability: Reachability,
        register: Arc<SyncStatusRegister>,
        products: MemoryRemoteStore<Product>,
        customers: MemoryRemoteStore<Customer>,
        suppliers: MemoryRemoteStore<Supplier>,
        engine: SyncEngine,
    }

    impl Harness {
        fn product_gateway(&self) -> EntityGateway<Product> {
            EntityGateway::new(
                self.db.collection::<Product>(),
                Arc::new(self.products.clone()),
                self.reachability.clone(),
            )
        }

        fn customer_gateway(&self) -> EntityGateway<Customer> {
            EntityGateway::new(
                self.db.collection::<Customer>(),
                Arc::new(self.customers.clone()),
                self.reachability.clone(),
            )
        }
    }

    async fn harness() -> Harness {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let reachability = Reachability::new(true);
        let register = Arc::new(SyncStatusRegister::load(db.sync_status()).await.unwrap());
        let products = MemoryRemoteStore::<Product>::new();
        let customers = MemoryRemoteStore::<Customer>::new();
        let suppliers = MemoryRemoteStore::<Supplier>::new();

        let engine = SyncEngine::builder()
            .with_target(Arc::new(EntityGateway::new(
                db.collection::<Product>(),
                Arc::new(products.clone()),
                reachability.clone(),
            )))
            .with_target(Arc::new(EntityGateway::new(
                db.collection::<Customer>(),
                Arc::new(customers.clone()),
                reachability.clone(),
            )))
            .with_target(Arc::new(EntityGateway::new(
                db.collection::<Supplier>(),
                Arc::new(suppliers.clone()),
                reachability.clone(),
            )))
            .with_status_register(register.clone())
            .with_reachability(reachability.clone())
            .build()
            .unwrap();

        Harness {
            db,
            reachability,
            register,
            products,
            customers,
            suppliers,
            engine,
        }
    }

    fn widget(company_id: i64) -> Product {
        Product {
            company_id: Some(company_id),
            name: "Widget".into(),
            sku: Some("ABC-1".into()),
            ..Default::default()
        }
    }

    fn customer(company_id: i64, email: &str) -> Customer {
        Customer {
            company_id: Some(company_id),
            name: "Asha".into(),
            email: Some(email.into()),
            ..Default::default()
        }
    }

    /// Creates records while the remote is down, then brings it back.
    async fn create_offline(h: &Harness, products: Vec<Product>) -> Vec<Product> {
        h.reachability.set_reachable(false);
        let gateway = h.product_gateway();
        let mut created = Vec::new();
        for product in products {
            created.push(gateway.create(product).await.unwrap());
        }
        h.reachability.set_reachable(true);
        created
    }

    #[tokio::test]
    async fn test_offline_product_is_pushed() {
        let h = harness().await;
        let local = create_offline(&h, vec![widget(7)]).await;

        let result = h
            .engine
            .sync_all_pending_records(TenantScope::Company(7))
            .await;

        assert!(result.success);
        assert_eq!(result.synced, 1);
        assert_eq!(result.deleted, 0);
        assert!(result.errors.is_empty());

        let remote = h.products.records();
        assert_eq!(remote.len(), 1);
        assert_eq!(remote[0].sku.as_deref(), Some("ABC-1"));
        assert_ne!(remote[0].id, local[0].id);

        // Pushed, not deleted: the local row now carries the remote id.
        let products = h.db.collection::<Product>();
        assert!(!products.contains(local[0].id).await.unwrap());
        let kept = products.get_by_id(remote[0].id).await.unwrap().unwrap();
        assert_eq!(kept.sku.as_deref(), Some("ABC-1"));
        assert_eq!(products.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_second_pass_is_idempotent() {
        let h = harness().await;
        create_offline(&h, vec![widget(7)]).await;
        h.customer_gateway()
            .create(customer(7, "a@b.com"))
            .await
            .unwrap();

        let first = h
            .engine
            .sync_all_pending_records(TenantScope::Company(7))
            .await;
        assert_eq!(first.synced, 1);

        let second = h
            .engine
            .sync_all_pending_records(TenantScope::Company(7))
            .await;
        assert_eq!((second.synced, second.deleted, second.failed), (0, 0, 0));
        assert!(second.success);
        assert_eq!(h.products.len(), 1);
        assert_eq!(h.customers.len(), 1);
    }

    #[tokio::test]
    async fn test_remote_deletion_propagates() {
        let h = harness().await;
        let created = h
            .customer_gateway()
            .create(customer(7, "a@b.com"))
            .await
            .unwrap();
        let first = h
            .engine
            .sync_all_pending_records(TenantScope::Company(7))
            .await;
        assert_eq!((first.synced, first.deleted), (0, 0));

        h.customers.remove(created.id);

        let result = h
            .engine
            .sync_all_pending_records(TenantScope::Company(7))
            .await;
        assert_eq!(result.deleted, 1);
        assert_eq!(result.synced, 0);
        assert_eq!(result.report(EntityKind::Customer).unwrap().deleted, 1);

        let left = h.db.collection::<Customer>().get_all().await.unwrap();
        assert!(left.iter().all(|c| c.email.as_deref() != Some("a@b.com")));
        assert!(h.customers.is_empty());
    }

    #[tokio::test]
    async fn test_pushed_record_deleted_later_is_removed() {
        let h = harness().await;
        create_offline(&h, vec![widget(7)]).await;

        let first = h
            .engine
            .sync_all_pending_records(TenantScope::Company(7))
            .await;
        assert_eq!(first.synced, 1);

        let remote_id = h.products.records()[0].id;
        h.products.remove(remote_id);

        let second = h
            .engine
            .sync_all_pending_records(TenantScope::Company(7))
            .await;
        assert_eq!((second.synced, second.deleted), (0, 1));
        assert_eq!(h.db.collection::<Product>().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_isolated_to_one_kind() {
        let h = harness().await;
        create_offline(&h, vec![widget(7)]).await;
        h.suppliers.fail_lists(true);

        let result = h
            .engine
            .sync_all_pending_records(TenantScope::Company(7))
            .await;

        assert_eq!(result.synced, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("Suppliers sync error:"));
        assert!(result.report(EntityKind::Supplier).unwrap().skipped);

        let products = result.report(EntityKind::Product).unwrap();
        assert_eq!(products.synced, 1);
        assert!(!products.skipped);
        assert_eq!(h.products.len(), 1);
    }

    #[tokio::test]
    async fn test_push_failure_is_reported_and_retried() {
        let h = harness().await;
        create_offline(&h, vec![widget(7)]).await;
        h.products.reject_creates(true);

        let result = h
            .engine
            .sync_all_pending_records(TenantScope::Company(7))
            .await;

        assert!(!result.success);
        assert_eq!((result.synced, result.failed, result.deleted), (0, 1, 0));
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("Product ABC-1: Remote store rejected the request (409)"));
        assert_eq!(
            h.register.snapshot().await.last_sync_status,
            LastSyncStatus::Failed
        );
        assert_eq!(h.db.collection::<Product>().count().await.unwrap(), 1);

        h.products.reject_creates(false);
        let retry = h
            .engine
            .sync_all_pending_records(TenantScope::Company(7))
            .await;
        assert_eq!((retry.synced, retry.failed), (1, 0));
        assert_eq!(
            h.register.snapshot().await.last_sync_status,
            LastSyncStatus::Success
        );
    }

    #[tokio::test]
    async fn test_refetch_failure_skips_deletes_but_keeps_pushes() {
        let h = harness().await;
        let old = h.product_gateway().create(widget(7)).await.unwrap();
        h.products.remove(old.id);
        let mut gadget = widget(7);
        gadget.sku = Some("GAD-9".into());
        create_offline(&h, vec![gadget]).await;

        h.products.fail_lists_after(1);
        let result = h
            .engine
            .sync_all_pending_records(TenantScope::Company(7))
            .await;

        let products = result.report(EntityKind::Product).unwrap();
        assert_eq!((products.synced, products.deleted), (1, 0));
        assert_eq!(products.error_count, 1);
        assert!(result.errors[0].starts_with("Products sync error:"));
        assert_eq!(h.db.collection::<Product>().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_matching_keys_across_tenants_never_match() {
        let h = harness().await;
        let mut foreign = widget(8);
        foreign.id = 500;
        h.products.insert(foreign);
        create_offline(&h, vec![widget(7)]).await;

        let result = h.engine.sync_all_pending_records(TenantScope::Unscoped).await;

        assert_eq!(result.synced, 1);
        let tenants: HashSet<Option<i64>> =
            h.products.records().iter().map(|p| p.company_id).collect();
        assert_eq!(tenants, HashSet::from([Some(7), Some(8)]));
    }

    #[tokio::test]
    async fn test_unreachable_remote_aborts_without_touching_status() {
        let h = harness().await;
        h.reachability.set_reachable(false);

        let result = h
            .engine
            .sync_all_pending_records(TenantScope::Company(7))
            .await;

        assert!(!result.success);
        assert_eq!(result.errors, vec![UNREACHABLE_MESSAGE.to_string()]);
        assert_eq!(
            h.register.snapshot().await.last_sync_status,
            LastSyncStatus::Never
        );
    }

    #[tokio::test]
    async fn test_overlapping_pass_is_refused() {
        let h = harness().await;
        create_offline(&h, vec![widget(7)]).await;

        let guard = h.register.try_begin().await.unwrap().unwrap();
        let result = h
            .engine
            .sync_all_pending_records(TenantScope::Company(7))
            .await;
        assert_eq!(result.errors, vec![IN_PROGRESS_MESSAGE.to_string()]);
        assert!(h.products.is_empty());
        assert!(h.engine.get_sync_status().await.unwrap().is_syncing);

        drop(guard);
        let result = h
            .engine
            .sync_all_pending_records(TenantScope::Company(7))
            .await;
        assert_eq!(result.synced, 1);
    }

    #[tokio::test]
    async fn test_sync_status_reports_pending_records() {
        let h = harness().await;
        create_offline(&h, vec![widget(7)]).await;
        h.customer_gateway()
            .create(customer(8, "x@y.com"))
            .await
            .unwrap();

        let online = h.engine.get_sync_status().await.unwrap();
        assert!(online.is_online);
        assert_eq!(online.pending_records, 0);

        h.reachability.set_reachable(false);
        let offline = h.engine.get_sync_status().await.unwrap();
        assert!(!offline.is_online);
        assert_eq!(offline.pending_records, 2);
        assert_eq!(offline.last_sync_status, LastSyncStatus::Never);
    }

    #[tokio::test]
    async fn test_pass_records_status() {
        let h = harness().await;
        h.engine
            .sync_all_pending_records(TenantScope::Company(7))
            .await;

        let status = h.engine.get_sync_status().await.unwrap();
        assert_eq!(status.last_sync_status, LastSyncStatus::Success);
        assert!(status.last_sync_time.is_some());
        assert!(!status.is_syncing);

        let persisted = h.db.sync_status().load().await.unwrap();
        assert_eq!(persisted.last_sync_status, LastSyncStatus::Success);
    }

    // -------------------------------------------------------------------------
    // Read-after-write lag and bounded parallelism
    // -------------------------------------------------------------------------

    /// Remote whose listings lag behind its writes.
    struct LaggingRemote {
        inner: MemoryRemoteStore<Product>,
        stale: Vec<Product>,
    }

    #[async_trait]
    impl RemoteStore<Product> for LaggingRemote {
        async fn list(&self, _scope: TenantScope, _archived: bool) -> RemoteResult<Vec<Product>> {
            Ok(self.stale.clone())
        }
        async fn get(&self, id: i64) -> RemoteResult<Option<Product>> {
            self.inner.get(id).await
        }
        async fn create(&self, record: &Product) -> RemoteResult<Product> {
            self.inner.create(record).await
        }
        async fn update(&self, id: i64, record: &Product) -> RemoteResult<Product> {
            self.inner.update(id, record).await
        }
        async fn delete(&self, id: i64) -> RemoteResult<()> {
            self.inner.delete(id).await
        }
    }

    #[tokio::test]
    async fn test_pushed_record_survives_stale_refetch() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let products = db.collection::<Product>();
        let mut local = widget(7);
        local.id = 1_700_000_000_000;
        products.upsert(&local).await.unwrap();

        let remote = LaggingRemote {
            inner: MemoryRemoteStore::new(),
            stale: Vec::new(),
        };

        let outcome = reconcile_collection(&products, &remote, TenantScope::Company(7), 4).await;
        assert_eq!(outcome.report.synced, 1);
        assert_eq!(outcome.report.deleted, 0);
        assert_eq!(products.count().await.unwrap(), 1);
        let adopted = remote.inner.records()[0].id;
        assert!(products.contains(adopted).await.unwrap());
    }

    // -------------------------------------------------------------------------
    // Fallback keys across passes
    // -------------------------------------------------------------------------

    /// Creates `record` offline, then runs two passes against the same remote.
    async fn two_passes<T: Record>(record: T) -> (Database, MemoryRemoteStore<T>, EntityOutcome) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let remote = MemoryRemoteStore::<T>::new();
        let reachability = Reachability::new(false);
        let gateway = EntityGateway::new(
            db.collection::<T>(),
            Arc::new(remote.clone()),
            reachability.clone(),
        );
        gateway.create(record).await.unwrap();
        reachability.set_reachable(true);

        let local = db.collection::<T>();
        let first = reconcile_collection(&local, &remote, TenantScope::Company(7), 4).await;
        assert_eq!(first.report.synced, 1);
        assert_eq!(first.report.deleted, 0);

        let second = reconcile_collection(&local, &remote, TenantScope::Company(7), 4).await;
        (db, remote, second)
    }

    #[tokio::test]
    async fn test_id_keyed_purchase_is_idempotent() {
        let purchase = Purchase {
            company_id: Some(7),
            invoice_number: None,
            ..Default::default()
        };
        let (db, remote, second) = two_passes(purchase).await;

        let report = second.report;
        assert_eq!((report.synced, report.deleted, report.failed), (0, 0, 0));
        assert_eq!(remote.len(), 1);

        let purchases = db.collection::<Purchase>();
        assert_eq!(purchases.count().await.unwrap(), 1);
        assert!(purchases.contains(remote.records()[0].id).await.unwrap());
    }

    #[tokio::test]
    async fn test_receiptless_expense_matches_on_details() {
        let expense = Expense {
            company_id: Some(7),
            expense_date: "2024-03-01".into(),
            amount: 120.5,
            category: Some("Rent".into()),
            description: Some("March".into()),
            receipt_number: None,
            ..Default::default()
        };
        let (db, remote, second) = two_passes(expense).await;

        let report = second.report;
        assert_eq!((report.synced, report.deleted, report.failed), (0, 0, 0));
        assert_eq!(remote.len(), 1);

        let expenses = db.collection::<Expense>();
        assert_eq!(expenses.count().await.unwrap(), 1);
        let kept = expenses.get_by_id(remote.records()[0].id).await.unwrap().unwrap();
        assert_eq!(kept.category.as_deref(), Some("Rent"));
    }

    /// Remote that tracks how many creates are in flight.
    struct SlowRemote {
        inner: MemoryRemoteStore<Product>,
        in_flight: AtomicUsize,
        peak: Mutex<usize>,
    }

    #[async_trait]
    impl RemoteStore<Product> for SlowRemote {
        async fn list(&self, scope: TenantScope, archived: bool) -> RemoteResult<Vec<Product>> {
            self.inner.list(scope, archived).await
        }
        async fn get(&self, id: i64) -> RemoteResult<Option<Product>> {
            self.inner.get(id).await
        }
        async fn create(&self, record: &Product) -> RemoteResult<Product> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            {
                let mut peak = self.peak.lock().unwrap();
                *peak = (*peak).max(now);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner.create(record).await
        }
        async fn update(&self, id: i64, record: &Product) -> RemoteResult<Product> {
            self.inner.update(id, record).await
        }
        async fn delete(&self, id: i64) -> RemoteResult<()> {
            self.inner.delete(id).await
        }
    }

    #[tokio::test]
    async fn test_pushes_run_with_bounded_parallelism() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let products = db.collection::<Product>();
        let batch: Vec<Product> = (0..10)
            .map(|n| Product {
                id: n + 1,
                company_id: Some(7),
                name: format!("Item {}", n),
                sku: Some(format!("SKU-{}", n)),
                ..Default::default()
            })
            .collect();
        products.upsert_many(&batch).await.unwrap();

        let remote = SlowRemote {
            inner: MemoryRemoteStore::new(),
            in_flight: AtomicUsize::new(0),
            peak: Mutex::new(0),
        };

        let outcome = reconcile_collection(&products, &remote, TenantScope::Company(7), 3).await;
        assert_eq!(outcome.report.synced, 10);
        assert_eq!(remote.inner.len(), 10);

        let peak = *remote.peak.lock().unwrap();
        assert!(peak <= 3, "peak in-flight creates was {}", peak);
        assert!(peak >= 2, "pushes never overlapped");
    }

    // -------------------------------------------------------------------------
    // Emitter and builder
    // -------------------------------------------------------------------------

    #[derive(Default)]
    struct RecordingEmitter {
        statuses: AtomicUsize,
        progress: Mutex<Vec<EntityKind>>,
        errors: Mutex<Vec<String>>,
    }

    impl SyncEventEmitter for RecordingEmitter {
        fn emit_status(&self, _status: &SyncStatus) {
            self.statuses.fetch_add(1, Ordering::SeqCst);
        }
        fn emit_progress(&self, report: &EntityReport) {
            self.progress.lock().unwrap().push(report.kind);
        }
        fn emit_error(&self, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }
    }

    #[tokio::test]
    async fn test_emitter_sees_every_kind_in_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let reachability = Reachability::new(true);
        let register = Arc::new(SyncStatusRegister::load(db.sync_status()).await.unwrap());
        let emitter = Arc::new(RecordingEmitter::default());
        let failing = MemoryRemoteStore::<Customer>::new();
        failing.fail_lists(true);

        let engine = SyncEngine::builder()
            .with_target(Arc::new(EntityGateway::new(
                db.collection::<Product>(),
                Arc::new(MemoryRemoteStore::<Product>::new()),
                reachability.clone(),
            )))
            .with_target(Arc::new(EntityGateway::new(
                db.collection::<Customer>(),
                Arc::new(failing),
                reachability.clone(),
            )))
            .with_status_register(register)
            .with_reachability(reachability)
            .with_emitter(emitter.clone())
            .build()
            .unwrap();

        engine.sync_all_pending_records(TenantScope::Company(1)).await;

        assert_eq!(
            *emitter.progress.lock().unwrap(),
            vec![EntityKind::Product, EntityKind::Customer]
        );
        assert_eq!(emitter.errors.lock().unwrap().len(), 1);
        assert_eq!(emitter.statuses.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_builder_rejects_incomplete_setup() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let reachability = Reachability::new(true);
        let register = Arc::new(SyncStatusRegister::load(db.sync_status()).await.unwrap());

        assert!(SyncEngine::builder()
            .with_reachability(reachability.clone())
            .with_status_register(register.clone())
            .build()
            .is_err());

        let gateway: Arc<dyn SyncTarget> = Arc::new(EntityGateway::new(
            db.collection::<Product>(),
            Arc::new(MemoryRemoteStore::<Product>::new()),
            reachability.clone(),
        ));
        let err = SyncEngine::builder()
            .with_targets([gateway.clone(), gateway])
            .with_reachability(reachability)
            .with_status_register(register)
            .build()
            .err()
            .unwrap();
        assert!(err.is_config_error());
    }
}
