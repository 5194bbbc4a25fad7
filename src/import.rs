// 📥 CSV import
//
// Reference fixtures (sites, locations, products, rfid bindings) are written
// straight through `ReferenceWriter`. Scan batches go through the lifecycle
// create path, so every row gets the same validation as a single request.
//
// Expected headers:
//   sites.csv      site_id,site_name
//   locations.csv  location_id,location_name,site_id
//   products.csv   ref_code,name
//   rfids.csv      tag_id,epc,ref_code
//   scans          siteName,epc,refCode,tagId,locationName,rssi,scanDate

use crate::config::LedgerConfig;
use crate::error::StoreError;
use crate::lifecycle::TransactionService;
use crate::model::{BindingKey, CreateTxRequest, Location, Product, RfidBinding, Site};
use crate::names;
use crate::store::{LedgerStore, ReferenceWriter, StoreResult};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

pub const SITES_FILE: &str = "sites.csv";
pub const LOCATIONS_FILE: &str = "locations.csv";
pub const PRODUCTS_FILE: &str = "products.csv";
pub const RFIDS_FILE: &str = "rfids.csv";

/// Outcome of one import run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub inserted: usize,
    /// Rows whose key was already stored
    pub duplicates: usize,
    /// Rows that failed parsing, validation or a reference check
    pub rejected: usize,
}

impl ImportReport {
    pub fn merge(&mut self, other: ImportReport) {
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.rejected += other.rejected;
    }

    fn count(&mut self, result: StoreResult<()>) -> Result<()> {
        match result {
            Ok(()) => self.inserted += 1,
            Err(StoreError::Duplicate(what)) => {
                warn!("Skipped duplicate {}", what);
                self.duplicates += 1;
            }
            Err(StoreError::MissingReference(what)) => {
                warn!("Rejected {}: unknown reference", what);
                self.rejected += 1;
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SiteRow {
    site_id: i64,
    site_name: String,
}

#[derive(Debug, Deserialize)]
struct LocationRow {
    location_id: i64,
    location_name: String,
    site_id: i64,
}

#[derive(Debug, Deserialize)]
struct ProductRow {
    ref_code: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RfidRow {
    tag_id: String,
    epc: String,
    ref_code: i64,
}

fn load_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

    let mut rows = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let row: T = result
            .with_context(|| format!("Failed to deserialize row {} of {}", line + 2, path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

pub fn import_sites<W: ReferenceWriter>(writer: &W, path: &Path, separator: &str) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    for row in load_rows::<SiteRow>(path)? {
        report.count(writer.insert_site(&Site {
            site_id: row.site_id,
            site_name: names::normalize_with(&row.site_name, separator),
        }))?;
    }
    Ok(report)
}

pub fn import_locations<W: ReferenceWriter>(
    writer: &W,
    path: &Path,
    separator: &str,
) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    for row in load_rows::<LocationRow>(path)? {
        report.count(writer.insert_location(&Location {
            location_id: row.location_id,
            location_name: names::normalize_with(&row.location_name, separator),
            site_id: row.site_id,
        }))?;
    }
    Ok(report)
}

pub fn import_products<W: ReferenceWriter>(writer: &W, path: &Path) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    for row in load_rows::<ProductRow>(path)? {
        report.count(writer.insert_product(&Product {
            ref_code: row.ref_code,
            name: row.name.trim().to_string(),
        }))?;
    }
    Ok(report)
}

pub fn import_bindings<W: ReferenceWriter>(writer: &W, path: &Path) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    for row in load_rows::<RfidRow>(path)? {
        report.count(writer.insert_binding(&RfidBinding {
            key: BindingKey::new(row.tag_id.trim().to_uppercase(), row.epc.trim().to_uppercase()),
            ref_code: row.ref_code,
        }))?;
    }
    Ok(report)
}

/// Load every reference file present in `dir`, parents before children
pub fn import_reference_dir<W: ReferenceWriter>(
    writer: &W,
    dir: &Path,
    separator: &str,
) -> Result<ImportReport> {
    let mut report = ImportReport::default();

    let sites = dir.join(SITES_FILE);
    if sites.exists() {
        report.merge(import_sites(writer, &sites, separator)?);
    }
    let locations = dir.join(LOCATIONS_FILE);
    if locations.exists() {
        report.merge(import_locations(writer, &locations, separator)?);
    }
    let products = dir.join(PRODUCTS_FILE);
    if products.exists() {
        report.merge(import_products(writer, &products)?);
    }
    let rfids = dir.join(RFIDS_FILE);
    if rfids.exists() {
        report.merge(import_bindings(writer, &rfids)?);
    }

    info!(
        inserted = report.inserted,
        duplicates = report.duplicates,
        rejected = report.rejected,
        "Imported reference data from {}",
        dir.display()
    );
    Ok(report)
}

/// Record a batch of scans. Conflicts count as duplicates, invalid rows as
/// rejected; only infrastructure failures abort the batch.
pub fn import_scans<S: LedgerStore>(store: &S, path: &Path, config: &LedgerConfig) -> Result<ImportReport> {
    let service = TransactionService::new(store, config)?;
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

    let mut report = ImportReport::default();
    for (line, result) in rdr.deserialize::<CreateTxRequest>().enumerate() {
        let line = line + 2;
        let request = match result {
            Ok(request) => request,
            Err(err) => {
                warn!(line, error = %err, "Rejected unreadable scan row");
                report.rejected += 1;
                continue;
            }
        };

        match service.create(&request) {
            Ok(_) => report.inserted += 1,
            Err(err) if err.is_conflict() => report.duplicates += 1,
            Err(err) if err.is_invalid_input() || err.is_not_found() => {
                warn!(line, code = err.code(), "Rejected scan row: {}", err);
                report.rejected += 1;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to import row {}", line));
            }
        }
    }

    info!(
        inserted = report.inserted,
        duplicates = report.duplicates,
        rejected = report.rejected,
        "Imported scans from {}",
        path.display()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TxKey;
    use crate::store::{MemoryStore, ReferenceData, SqliteStore, TransactionStore};
    use chrono::NaiveDate;
    use std::fs;

    fn write_reference(dir: &Path) {
        fs::write(dir.join(SITES_FILE), "site_id,site_name\n1,Main Site\n2,North\n").unwrap();
        fs::write(
            dir.join(LOCATIONS_FILE),
            "location_id,location_name,site_id\n10,Dock A,1\n20,Gate,2\n",
        )
        .unwrap();
        fs::write(dir.join(PRODUCTS_FILE), "ref_code,name\n12345,Pallet\n").unwrap();
        fs::write(dir.join(RFIDS_FILE), "tag_id,epc,ref_code\ntag1,epc001,12345\n").unwrap();
    }

    #[test]
    fn test_reference_import_normalizes_names() {
        let dir = tempfile::tempdir().unwrap();
        write_reference(dir.path());
        let store = MemoryStore::new();

        let report = import_reference_dir(&store, dir.path(), "..").unwrap();

        assert_eq!(report.inserted, 6);
        assert!(store.site_exists("MAIN..SITE").unwrap());
        assert!(store.find_location_matching_site("DOCK..A", "MAIN..SITE").unwrap().is_some());
        assert!(store.binding_exists(&BindingKey::new("TAG1", "EPC001")).unwrap());
    }

    #[test]
    fn test_reference_import_twice_counts_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        write_reference(dir.path());
        let store = MemoryStore::new();

        import_reference_dir(&store, dir.path(), "..").unwrap();
        let second = import_reference_dir(&store, dir.path(), "..").unwrap();

        assert_eq!(second, ImportReport { inserted: 0, duplicates: 6, rejected: 0 });
    }

    fn location_with_unknown_site<W: ReferenceWriter + ReferenceData>(store: &W) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SITES_FILE), "site_id,site_name\n1,Main Site\n").unwrap();
        fs::write(
            dir.path().join(LOCATIONS_FILE),
            "location_id,location_name,site_id\n10,Dock A,7\n11,Dock B,1\n",
        )
        .unwrap();

        let report = import_reference_dir(store, dir.path(), "..").unwrap();

        assert_eq!(report, ImportReport { inserted: 2, duplicates: 0, rejected: 1 });
        assert!(!store.location_exists("DOCK..A").unwrap());
        assert!(store.location_exists("DOCK..B").unwrap());
    }

    #[test]
    fn test_location_with_unknown_site_is_rejected() {
        location_with_unknown_site(&MemoryStore::new());
        location_with_unknown_site(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_scan_import_report() {
        let dir = tempfile::tempdir().unwrap();
        write_reference(dir.path());
        let store = MemoryStore::new();
        import_reference_dir(&store, dir.path(), "..").unwrap();

        let scans = dir.path().join("scans.csv");
        fs::write(
            &scans,
            "siteName,epc,refCode,tagId,locationName,rssi,scanDate\n\
             Main Site,EPC001,12345,TAG1,Dock A,-40.5,2024-01-01 10:00:00\n\
             Main Site,EPC001,12345,TAG1,Dock A,-41,2024-01-01 10:00:00\n\
             Main Site,EPC001,12345,TAG1,Dock A,-42,2024-01-01 11:00:00\n\
             North,EPC001,12345,TAG1,Dock A,-43,2024-01-01 12:00:00\n\
             Main Site,EPC001,12345,TAG1,Dock A,,2024-01-01 13:00:00\n",
        )
        .unwrap();

        let report = import_scans(&store, &scans, &LedgerConfig::default()).unwrap();

        assert_eq!(report, ImportReport { inserted: 2, duplicates: 1, rejected: 2 });
        let at = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(11, 0, 0).unwrap();
        assert!(store.exists_by_key(&TxKey::new("TAG1", "EPC001", at)).unwrap());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let store = MemoryStore::new();
        let result = import_sites(&store, Path::new("/nonexistent/sites.csv"), "..");
        assert!(result.is_err());
    }
}
