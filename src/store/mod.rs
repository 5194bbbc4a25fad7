// 🗄️ Store contracts
//
// The ledger core only talks to persistence through these traits:
// - ReferenceData: read-only lookups over sites, locations and tag bindings
// - ReferenceWriter: seeding of those entities (owned by plain CRUD elsewhere)
// - TransactionStore: scan transactions keyed by (tag_id, epc, scan_date)
//
// Names passed in are always canonical (see `names::normalize`); EPCs and
// tag ids are upper-cased.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::model::{
    BindingKey, LatestEpc, LatestScanFilter, Location, Product, RfidBinding, RfidTx, ScanWindow,
    SearchCriteria, Site, TopEpc, TransactionView, TxKey,
};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

pub trait ReferenceData {
    fn site_exists(&self, site_name: &str) -> StoreResult<bool>;

    fn find_site_by_name(&self, site_name: &str) -> StoreResult<Option<Site>>;

    fn find_site_by_id(&self, site_id: i64) -> StoreResult<Option<Site>>;

    /// True if any site has a location with this name
    fn location_exists(&self, location_name: &str) -> StoreResult<bool>;

    /// The location with this name inside the named site, if any
    fn find_location_matching_site(
        &self,
        location_name: &str,
        site_name: &str,
    ) -> StoreResult<Option<Location>>;

    fn find_location_by_id(&self, location_id: i64) -> StoreResult<Option<Location>>;

    fn binding_exists(&self, key: &BindingKey) -> StoreResult<bool>;

    fn ref_code_matches(&self, key: &BindingKey, ref_code: i64) -> StoreResult<bool>;
}

pub trait ReferenceWriter {
    fn insert_site(&self, site: &Site) -> StoreResult<()>;

    fn insert_location(&self, location: &Location) -> StoreResult<()>;

    fn insert_product(&self, product: &Product) -> StoreResult<()>;

    fn insert_binding(&self, binding: &RfidBinding) -> StoreResult<()>;
}

pub trait TransactionStore {
    fn find_by_key(&self, key: &TxKey) -> StoreResult<Option<RfidTx>>;

    fn exists_by_key(&self, key: &TxKey) -> StoreResult<bool>;

    /// Fails with `StoreError::Duplicate` when the key is already present
    fn insert(&self, tx: &RfidTx) -> StoreResult<()>;

    /// Replaces location and rssi; `StoreError::NotFound` if the key is gone
    fn update(&self, tx: &RfidTx) -> StoreResult<()>;

    /// `StoreError::NotFound` if nothing was deleted
    fn delete_by_key(&self, key: &TxKey) -> StoreResult<()>;

    /// One row per EPC in the window: the latest scan (max scan_date, then
    /// smallest tag_id) with count and mean RSSI over every matching row.
    /// Location label is `<site> <location>` in canonical form. Ordered by epc.
    fn latest_per_epc(&self, filter: &LatestScanFilter) -> StoreResult<Vec<LatestEpc>>;

    /// Read counts per EPC in the window, count desc then epc asc, at most `limit`
    fn top_reads(&self, limit: usize, window: &ScanWindow) -> StoreResult<Vec<TopEpc>>;

    fn find_by_criteria(&self, criteria: &SearchCriteria) -> StoreResult<Vec<TransactionView>>;

    fn find_by_epc(&self, epc: &str) -> StoreResult<Vec<TransactionView>>;

    fn find_by_tag_id(&self, tag_id: &str) -> StoreResult<Vec<TransactionView>>;

    fn find_by_epc_and_tag_id(&self, epc: &str, tag_id: &str) -> StoreResult<Vec<TransactionView>>;

    fn find_by_scan_date_between(&self, window: &ScanWindow) -> StoreResult<Vec<TransactionView>>;
}

/// Everything the ledger services need from one backing store
pub trait LedgerStore: ReferenceData + TransactionStore {}

impl<T: ReferenceData + TransactionStore> LedgerStore for T {}
