//! # Gateway Registry
//!
//! One typed [`EntityGateway`] per entity kind, wired to the same local
//! database, remote connection and reachability signal.

use std::sync::Arc;

use hisab_core::{
    Customer, Device, EntityKind, Expense, Product, Purchase, Record, RegistrationRequest, Sale,
    Supplier,
};
use hisab_db::Database;

use crate::engine::SyncTarget;
use crate::gateway::EntityGateway;
use crate::reachability::Reachability;
use crate::remote::{RemoteStore, RestClient};

/// Hands out a remote store for any record type.
pub trait RemoteSource {
    fn remote<T: Record>(&self) -> Arc<dyn RemoteStore<T>>;
}

impl RemoteSource for RestClient {
    fn remote<T: Record>(&self) -> Arc<dyn RemoteStore<T>> {
        Arc::new(self.store::<T>())
    }
}

/// Every entity gateway of one device.
#[derive(Clone)]
pub struct GatewayRegistry {
    products: EntityGateway<Product>,
    customers: EntityGateway<Customer>,
    suppliers: EntityGateway<Supplier>,
    purchases: EntityGateway<Purchase>,
    sales: EntityGateway<Sale>,
    expenses: EntityGateway<Expense>,
    devices: EntityGateway<Device>,
    registration_requests: EntityGateway<RegistrationRequest>,
}

fn gateway<T: Record>(
    db: &Database,
    source: &impl RemoteSource,
    reachability: &Reachability,
) -> EntityGateway<T> {
    EntityGateway::new(db.collection::<T>(), source.remote::<T>(), reachability.clone())
}

impl GatewayRegistry {
    pub fn connect(db: &Database, source: &impl RemoteSource, reachability: Reachability) -> Self {
        GatewayRegistry {
            products: gateway(db, source, &reachability),
            customers: gateway(db, source, &reachability),
            suppliers: gateway(db, source, &reachability),
            purchases: gateway(db, source, &reachability),
            sales: gateway(db, source, &reachability),
            expenses: gateway(db, source, &reachability),
            devices: gateway(db, source, &reachability),
            registration_requests: gateway(db, source, &reachability),
        }
    }

    pub fn products(&self) -> &EntityGateway<Product> {
        &self.products
    }

    pub fn customers(&self) -> &EntityGateway<Customer> {
        &self.customers
    }

    pub fn suppliers(&self) -> &EntityGateway<Supplier> {
        &self.suppliers
    }

    pub fn purchases(&self) -> &EntityGateway<Purchase> {
        &self.purchases
    }

    pub fn sales(&self) -> &EntityGateway<Sale> {
        &self.sales
    }

    pub fn expenses(&self) -> &EntityGateway<Expense> {
        &self.expenses
    }

    pub fn devices(&self) -> &EntityGateway<Device> {
        &self.devices
    }

    pub fn registration_requests(&self) -> &EntityGateway<RegistrationRequest> {
        &self.registration_requests
    }

    /// The gateway for `kind` as a reconciliation target.
    pub fn target(&self, kind: EntityKind) -> Arc<dyn SyncTarget> {
        match kind {
            EntityKind::Product => Arc::new(self.products.clone()),
            EntityKind::Customer => Arc::new(self.customers.clone()),
            EntityKind::Supplier => Arc::new(self.suppliers.clone()),
            EntityKind::Purchase => Arc::new(self.purchases.clone()),
            EntityKind::Sale => Arc::new(self.sales.clone()),
            EntityKind::Expense => Arc::new(self.expenses.clone()),
            EntityKind::Device => Arc::new(self.devices.clone()),
            EntityKind::RegistrationRequest => Arc::new(self.registration_requests.clone()),
        }
    }

    /// Targets for `kinds`, in the given order.
    pub fn targets(&self, kinds: &[EntityKind]) -> Vec<Arc<dyn SyncTarget>> {
        kinds.iter().map(|kind| self.target(*kind)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hisab_core::TenantScope;
    use hisab_db::DbConfig;

    use crate::remote::MemoryRemoteStore;

    struct MemorySource;

    impl RemoteSource for MemorySource {
        fn remote<T: Record>(&self) -> Arc<dyn RemoteStore<T>> {
            Arc::new(MemoryRemoteStore::<T>::new())
        }
    }

    #[tokio::test]
    async fn test_targets_follow_requested_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let registry = GatewayRegistry::connect(&db, &MemorySource, Reachability::new(true));

        let kinds = [EntityKind::Sale, EntityKind::Product, EntityKind::Device];
        let targets = registry.targets(&kinds);
        let got: Vec<EntityKind> = targets.iter().map(|t| t.kind()).collect();
        assert_eq!(got, kinds);
    }

    #[tokio::test]
    async fn test_gateways_share_the_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let registry = GatewayRegistry::connect(&db, &MemorySource, Reachability::new(false));

        registry
            .expenses()
            .create(Expense {
                company_id: Some(4),
                ..Default::default()
            })
            .await
            .unwrap();

        let target = registry.target(EntityKind::Expense);
        assert_eq!(target.count_local().await.unwrap(), 1);
        assert_eq!(
            registry
                .expenses()
                .get_all(true, TenantScope::Company(4))
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
