// File-backed ledger: data and audit trail survive reopening the database

use rfid_ledger::import::{import_reference_dir, import_scans, ImportReport};
use rfid_ledger::{AnalyticsEngine, LedgerConfig, SqliteStore, TransactionService, TxKey, UpdateTxRequest};
use rust_decimal::Decimal;
use std::fs;
use std::path::Path;

fn write_fixtures(dir: &Path) {
    fs::write(dir.join("sites.csv"), "site_id,site_name\n1,Main Site\n2,North\n").unwrap();
    fs::write(
        dir.join("locations.csv"),
        "location_id,location_name,site_id\n10,Dock A,1\n11,Dock B,1\n20,Gate,2\n",
    )
    .unwrap();
    fs::write(dir.join("products.csv"), "ref_code,name\n12345,Pallet\n11111,Crate\n").unwrap();
    fs::write(
        dir.join("rfids.csv"),
        "tag_id,epc,ref_code\nTAG1,EPC123,12345\nTAG2,EPC001,11111\n",
    )
    .unwrap();
    fs::write(
        dir.join("scans.csv"),
        "siteName,epc,refCode,tagId,locationName,rssi,scanDate\n\
         Main Site,EPC123,12345,TAG1,Dock A,-40,2024-01-01 10:00:00\n\
         Main Site,EPC123,12345,TAG1,Dock B,-50,2024-01-02 10:00:00\n\
         North,EPC001,11111,TAG2,Gate,-60,2024-01-02 11:00:00\n\
         North,EPC001,99999,TAG2,Gate,-60,2024-01-03 11:00:00\n",
    )
    .unwrap();
}

#[test]
fn test_import_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());
    let db_path = dir.path().join("ledger.db");
    let config = LedgerConfig { database_path: db_path.clone(), ..LedgerConfig::default() };

    {
        let store = SqliteStore::open(&db_path).unwrap();
        let reference = import_reference_dir(&store, dir.path(), &config.name_separator).unwrap();
        assert_eq!(reference.inserted, 9);

        let scans = import_scans(&store, &dir.path().join("scans.csv"), &config).unwrap();
        assert_eq!(scans, ImportReport { inserted: 3, duplicates: 0, rejected: 1 });
    }

    let store = SqliteStore::open(&db_path).unwrap();
    let engine = AnalyticsEngine::new(&store, &config).unwrap();

    let latest = engine
        .latest_scans("2024-01-01 00:00:00", "2024-01-31 00:00:00", None, None)
        .unwrap();
    assert_eq!(latest.len(), 2);
    assert_eq!(latest[0].epc, "EPC001");
    assert_eq!(latest[0].most_recent_location, "NORTH GATE");
    assert_eq!(latest[1].transaction_count, 2);
    assert!((latest[1].average_rssi + 45.0).abs() < 1e-9);
    assert_eq!(latest[1].most_recent_location, "MAIN SITE DOCK B");

    // Importing the same batch again only finds duplicates
    let again = import_scans(&store, &dir.path().join("scans.csv"), &config).unwrap();
    assert_eq!(again, ImportReport { inserted: 0, duplicates: 3, rejected: 1 });
}

#[test]
fn test_audit_trail_follows_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());
    let db_path = dir.path().join("ledger.db");
    let config = LedgerConfig::default();

    let store = SqliteStore::open(&db_path).unwrap();
    import_reference_dir(&store, dir.path(), &config.name_separator).unwrap();
    import_scans(&store, &dir.path().join("scans.csv"), &config).unwrap();

    let service = TransactionService::new(&store, &config).unwrap();
    let update = UpdateTxRequest {
        location_name: Some("Dock B".to_string()),
        rssi: Some(Decimal::from(-41)),
        ..UpdateTxRequest::default()
    };
    let updated = service.update("TAG1", "EPC123", "2024-01-01 10:00:00", &update).unwrap();
    assert_eq!(updated.location_id, 11);
    service.delete("TAG1", "EPC123", "2024-01-01 10:00:00").unwrap();

    let when = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    let events = store.events_for_transaction(&TxKey::new("TAG1", "EPC123", when)).unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();

    assert_eq!(kinds, vec!["transaction_deleted", "transaction_updated", "transaction_added"]);
    assert_eq!(events[1].data["location_id"], 11);
}
