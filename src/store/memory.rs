// 🧠 In-memory store
//
// Holds reference entities and scan transactions behind one RwLock.
// Analytic queries join rows into TransactionViews, then run the two-pass
// aggregation from `analytics`. Inserting an existing key is rejected under
// the write lock, so concurrent writers of the same key see Duplicate.
// Locations must name a stored site and scans a stored location, as the
// SQLite foreign keys demand.

use super::{ReferenceData, ReferenceWriter, StoreResult, TransactionStore};
use crate::analytics;
use crate::error::StoreError;
use crate::model::{
    BindingKey, LatestEpc, LatestScanFilter, Location, Product, RfidBinding, RfidTx, ScanWindow,
    SearchCriteria, Site, TopEpc, TransactionView, TxKey,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Tables {
    sites: BTreeMap<i64, Site>,
    locations: BTreeMap<i64, Location>,
    products: BTreeMap<i64, Product>,
    bindings: HashMap<BindingKey, i64>,
    transactions: BTreeMap<TxKey, RfidTx>,
}

impl Tables {
    fn site_named(&self, site_name: &str) -> Option<&Site> {
        self.sites.values().find(|s| s.site_name == site_name)
    }

    /// Join a transaction with its location, site and binding
    fn view(&self, tx: &RfidTx) -> Option<TransactionView> {
        let location = self.locations.get(&tx.location_id)?;
        let site = self.sites.get(&location.site_id)?;

        Some(TransactionView {
            tag_id: tx.key.tag_id.clone(),
            epc: tx.key.epc.clone(),
            scan_date: tx.key.scan_date,
            ref_code: self.bindings.get(&tx.key.binding()).copied(),
            location_id: location.location_id,
            location_name: location.location_name.clone(),
            site_name: site.site_name.clone(),
            rssi: tx.rssi,
        })
    }

    /// Views in (scan_date, tag_id, epc) order
    fn views_where<F>(&self, keep: F) -> Vec<TransactionView>
    where
        F: Fn(&TransactionView) -> bool,
    {
        let mut views: Vec<TransactionView> = self
            .transactions
            .values()
            .filter_map(|tx| self.view(tx))
            .filter(|v| keep(v))
            .collect();
        views.sort_by(|a, b| {
            a.scan_date
                .cmp(&b.scan_date)
                .then_with(|| a.tag_id.cmp(&b.tag_id))
                .then_with(|| a.epc.cmp(&b.epc))
        });
        views
    }
}

/// Cloning shares the same underlying tables
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| StoreError::LockPoisoned)
    }

    /// Number of stored scan transactions
    pub fn transaction_count(&self) -> StoreResult<usize> {
        Ok(self.read()?.transactions.len())
    }
}

impl ReferenceWriter for MemoryStore {
    fn insert_site(&self, site: &Site) -> StoreResult<()> {
        let mut tables = self.write()?;
        if tables.sites.contains_key(&site.site_id) || tables.site_named(&site.site_name).is_some() {
            return Err(StoreError::Duplicate(format!("site {}", site.site_id)));
        }
        tables.sites.insert(site.site_id, site.clone());
        Ok(())
    }

    fn insert_location(&self, location: &Location) -> StoreResult<()> {
        let mut tables = self.write()?;
        let taken = tables.locations.contains_key(&location.location_id)
            || tables.locations.values().any(|l| {
                l.site_id == location.site_id && l.location_name == location.location_name
            });
        if taken {
            return Err(StoreError::Duplicate(format!("location {}", location.location_id)));
        }
        if !tables.sites.contains_key(&location.site_id) {
            return Err(StoreError::MissingReference(format!(
                "location {}",
                location.location_id
            )));
        }
        tables.locations.insert(location.location_id, location.clone());
        Ok(())
    }

    fn insert_product(&self, product: &Product) -> StoreResult<()> {
        let mut tables = self.write()?;
        if tables.products.contains_key(&product.ref_code) {
            return Err(StoreError::Duplicate(format!("product {}", product.ref_code)));
        }
        tables.products.insert(product.ref_code, product.clone());
        Ok(())
    }

    fn insert_binding(&self, binding: &RfidBinding) -> StoreResult<()> {
        let mut tables = self.write()?;
        if tables.bindings.contains_key(&binding.key) {
            return Err(StoreError::Duplicate(format!(
                "rfid {}/{}",
                binding.key.tag_id, binding.key.epc
            )));
        }
        tables.bindings.insert(binding.key.clone(), binding.ref_code);
        Ok(())
    }
}

impl ReferenceData for MemoryStore {
    fn site_exists(&self, site_name: &str) -> StoreResult<bool> {
        Ok(self.read()?.site_named(site_name).is_some())
    }

    fn find_site_by_name(&self, site_name: &str) -> StoreResult<Option<Site>> {
        Ok(self.read()?.site_named(site_name).cloned())
    }

    fn find_site_by_id(&self, site_id: i64) -> StoreResult<Option<Site>> {
        Ok(self.read()?.sites.get(&site_id).cloned())
    }

    fn location_exists(&self, location_name: &str) -> StoreResult<bool> {
        Ok(self
            .read()?
            .locations
            .values()
            .any(|l| l.location_name == location_name))
    }

    fn find_location_matching_site(
        &self,
        location_name: &str,
        site_name: &str,
    ) -> StoreResult<Option<Location>> {
        let tables = self.read()?;
        let site_id = match tables.site_named(site_name) {
            Some(site) => site.site_id,
            None => return Ok(None),
        };
        Ok(tables
            .locations
            .values()
            .find(|l| l.location_name == location_name && l.site_id == site_id)
            .cloned())
    }

    fn find_location_by_id(&self, location_id: i64) -> StoreResult<Option<Location>> {
        Ok(self.read()?.locations.get(&location_id).cloned())
    }

    fn binding_exists(&self, key: &BindingKey) -> StoreResult<bool> {
        Ok(self.read()?.bindings.contains_key(key))
    }

    fn ref_code_matches(&self, key: &BindingKey, ref_code: i64) -> StoreResult<bool> {
        Ok(self.read()?.bindings.get(key) == Some(&ref_code))
    }
}

impl TransactionStore for MemoryStore {
    fn find_by_key(&self, key: &TxKey) -> StoreResult<Option<RfidTx>> {
        Ok(self.read()?.transactions.get(key).cloned())
    }

    fn exists_by_key(&self, key: &TxKey) -> StoreResult<bool> {
        Ok(self.read()?.transactions.contains_key(key))
    }

    fn insert(&self, tx: &RfidTx) -> StoreResult<()> {
        let mut tables = self.write()?;
        if tables.transactions.contains_key(&tx.key) {
            return Err(StoreError::Duplicate(tx.key.to_string()));
        }
        if !tables.locations.contains_key(&tx.location_id) {
            return Err(StoreError::MissingReference(tx.key.to_string()));
        }
        tables.transactions.insert(tx.key.clone(), tx.clone());
        Ok(())
    }

    fn update(&self, tx: &RfidTx) -> StoreResult<()> {
        let mut tables = self.write()?;
        if !tables.transactions.contains_key(&tx.key) {
            return Err(StoreError::NotFound(tx.key.to_string()));
        }
        if !tables.locations.contains_key(&tx.location_id) {
            return Err(StoreError::MissingReference(tx.key.to_string()));
        }
        tables.transactions.insert(tx.key.clone(), tx.clone());
        Ok(())
    }

    fn delete_by_key(&self, key: &TxKey) -> StoreResult<()> {
        match self.write()?.transactions.remove(key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    fn latest_per_epc(&self, filter: &LatestScanFilter) -> StoreResult<Vec<LatestEpc>> {
        let rows = self.read()?.views_where(|v| {
            filter.window.contains(&v.scan_date)
                && filter.epc.as_ref().map_or(true, |epc| v.epc == *epc)
                && filter.site_name.as_ref().map_or(true, |site| v.site_name == *site)
        });
        Ok(analytics::latest_per_epc(&rows))
    }

    fn top_reads(&self, limit: usize, window: &ScanWindow) -> StoreResult<Vec<TopEpc>> {
        let rows = self.read()?.views_where(|v| window.contains(&v.scan_date));
        Ok(analytics::top_reads(&rows, limit))
    }

    fn find_by_criteria(&self, criteria: &SearchCriteria) -> StoreResult<Vec<TransactionView>> {
        Ok(self.read()?.views_where(|v| criteria.matches(v)))
    }

    fn find_by_epc(&self, epc: &str) -> StoreResult<Vec<TransactionView>> {
        Ok(self.read()?.views_where(|v| v.epc == epc))
    }

    fn find_by_tag_id(&self, tag_id: &str) -> StoreResult<Vec<TransactionView>> {
        Ok(self.read()?.views_where(|v| v.tag_id == tag_id))
    }

    fn find_by_epc_and_tag_id(&self, epc: &str, tag_id: &str) -> StoreResult<Vec<TransactionView>> {
        Ok(self.read()?.views_where(|v| v.epc == epc && v.tag_id == tag_id))
    }

    fn find_by_scan_date_between(&self, window: &ScanWindow) -> StoreResult<Vec<TransactionView>> {
        Ok(self.read()?.views_where(|v| window.contains(&v.scan_date)))
    }
}
