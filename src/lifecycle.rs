// 🔄 Transaction lifecycle: create, update, delete
//
// Create: presence → format (aggregated) → consistency (fail-fast) → insert.
// Update touches only non-key fields. Delete is by exact composite key.
// EPC and tag id are upper-cased and names normalized before any lookup.

use crate::config::LedgerConfig;
use crate::consistency::ConsistencyChecker;
use crate::error::{messages, LedgerError, LedgerResult, StoreError};
use crate::model::{CreateTxRequest, RfidTx, TxKey, UpdateTxRequest};
use crate::names;
use crate::store::LedgerStore;
use crate::validation::{
    empty_fields, empty_fields_message, is_blank, is_null_or_zero, FormatValidator, Violations,
};
use chrono::NaiveDateTime;
use tracing::{error, info};

pub struct TransactionService<'a, S: LedgerStore> {
    store: &'a S,
    validator: FormatValidator,
    separator: String,
}

impl<'a, S: LedgerStore> TransactionService<'a, S> {
    pub fn new(store: &'a S, config: &LedgerConfig) -> LedgerResult<Self> {
        Ok(TransactionService {
            store,
            validator: FormatValidator::new(config)?,
            separator: config.name_separator.clone(),
        })
    }

    /// Validate and record a new scan
    pub fn create(&self, request: &CreateTxRequest) -> LedgerResult<RfidTx> {
        let missing = empty_fields(&request.presence_checks());
        if !missing.is_empty() {
            return Err(fail(LedgerError::invalid(empty_fields_message(&missing))));
        }

        // Presence was checked above, so every field is Some and non-blank
        let field = |v: &Option<String>| v.as_deref().unwrap_or_default().to_string();
        let (scan_date, epc, ref_code, tag_id) = (
            field(&request.scan_date),
            field(&request.epc),
            field(&request.ref_code),
            field(&request.tag_id),
        );

        let mut violations = Violations::new();
        let parsed_date = self.validator.parse_date(&scan_date);
        if parsed_date.is_none() {
            violations.push(self.validator.date_message(&scan_date));
        }
        if !self.validator.is_valid_epc(&epc) {
            violations.push(self.validator.epc_message());
        }
        let parsed_ref_code = if self.validator.is_valid_ref_code(&ref_code) {
            ref_code.parse::<i64>().ok()
        } else {
            None
        };
        if parsed_ref_code.is_none() {
            violations.push(self.validator.ref_code_message());
        }
        if !self.validator.is_valid_tag(&tag_id) {
            violations.push(self.validator.tag_message());
        }
        // A failed parse always leaves a message behind
        let (Some(scan_date), Some(ref_code), true) =
            (parsed_date, parsed_ref_code, violations.is_empty())
        else {
            return Err(fail(violations.into_error()));
        };

        let site_name = names::normalize_with(&field(&request.site_name), &self.separator);
        let location_name = names::normalize_with(&field(&request.location_name), &self.separator);
        let key = TxKey::new(tag_id.to_uppercase(), epc.to_uppercase(), scan_date);

        let location = ConsistencyChecker::new(self.store).verify_new(
            &site_name,
            &location_name,
            &key,
            ref_code,
        )?;

        let tx = RfidTx {
            key,
            location_id: location.location_id,
            rssi: request.rssi.unwrap_or_default(),
        };
        // A racing writer that got past the existence check lands here as Duplicate
        self.store.insert(&tx).map_err(|e| fail(e.into()))?;

        info!(key = %tx.key, "Successfully added RfidTx");
        Ok(tx)
    }

    /// Replace rssi and/or location of an existing scan
    pub fn update(
        &self,
        tag_id: &str,
        epc: &str,
        scan_date: &str,
        request: &UpdateTxRequest,
    ) -> LedgerResult<RfidTx> {
        let key = self.key(tag_id, epc, scan_date)?;

        let mut tx = self
            .store
            .find_by_key(&key)?
            .ok_or_else(|| fail(LedgerError::not_found(messages::TX_NOT_FOUND)))?;

        if !is_null_or_zero(request.rssi) {
            tx.rssi = request.rssi.unwrap_or_default();
        }

        let current_location = self.store.find_location_by_id(tx.location_id)?;
        let current_site = match &current_location {
            Some(location) => self.store.find_site_by_id(location.site_id)?,
            None => None,
        };

        let site_name = match self.provided(request.site_name.as_deref()) {
            Some(name) => Some(name),
            None => current_site.map(|s| s.site_name),
        };
        let location_name = match self.provided(request.location_name.as_deref()) {
            Some(name) => Some(name),
            None => current_location.map(|l| l.location_name),
        };

        let site_name = match site_name {
            Some(name) if self.store.find_site_by_name(&name)?.is_some() => name,
            _ => return Err(fail(LedgerError::invalid(messages::SITE_DOESNT_EXIST))),
        };
        let location = match location_name {
            Some(name) => self.store.find_location_matching_site(&name, &site_name)?,
            None => None,
        };
        let location =
            location.ok_or_else(|| fail(LedgerError::invalid(messages::LOCATION_NOT_IN_SITE)))?;
        tx.location_id = location.location_id;

        match self.store.update(&tx) {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => {
                return Err(fail(LedgerError::not_found(messages::TX_NOT_FOUND)))
            }
            Err(e) => return Err(fail(e.into())),
        }

        info!(key = %tx.key, "Successfully updated RfidTx");
        Ok(tx)
    }

    /// Remove a scan by exact key; a missing key is a conflict
    pub fn delete(&self, tag_id: &str, epc: &str, scan_date: &str) -> LedgerResult<()> {
        let key = self.key(tag_id, epc, scan_date)?;

        if !self.store.exists_by_key(&key)? {
            return Err(fail(LedgerError::conflict(messages::TX_DELETE_FAILURE)));
        }
        match self.store.delete_by_key(&key) {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => {
                return Err(fail(LedgerError::conflict(messages::TX_DELETE_FAILURE)))
            }
            Err(e) => return Err(fail(e.into())),
        }

        info!(key = %key, "Successfully deleted RfidTx");
        Ok(())
    }

    /// Build the composite key from raw path-style parameters
    fn key(&self, tag_id: &str, epc: &str, scan_date: &str) -> LedgerResult<TxKey> {
        if is_blank(Some(tag_id)) || is_blank(Some(epc)) || is_blank(Some(scan_date)) {
            return Err(fail(LedgerError::invalid(messages::EMPTY_KEY_FIELDS)));
        }
        let scan_date: NaiveDateTime = self
            .validator
            .parse_date(scan_date)
            .ok_or_else(|| fail(LedgerError::invalid(self.validator.date_message(scan_date))))?;

        Ok(TxKey::new(tag_id.trim().to_uppercase(), epc.trim().to_uppercase(), scan_date))
    }

    fn provided(&self, name: Option<&str>) -> Option<String> {
        name.filter(|n| !is_blank(Some(*n)))
            .map(|n| names::normalize_with(n, &self.separator))
    }
}

fn fail(err: LedgerError) -> LedgerError {
    error!(code = err.code(), "{}", err);
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BindingKey, Location, RfidBinding, Site};
    use crate::store::{MemoryStore, ReferenceWriter, TransactionStore};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const WHEN: &str = "2024-01-01 10:00:00";

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_site(&Site { site_id: 1, site_name: "MAIN..SITE".to_string() }).unwrap();
        store.insert_site(&Site { site_id: 2, site_name: "NORTH".to_string() }).unwrap();
        store
            .insert_location(&Location { location_id: 10, location_name: "DOCK..A".to_string(), site_id: 1 })
            .unwrap();
        store
            .insert_location(&Location { location_id: 11, location_name: "DOCK..B".to_string(), site_id: 1 })
            .unwrap();
        store
            .insert_location(&Location { location_id: 20, location_name: "GATE".to_string(), site_id: 2 })
            .unwrap();
        store
            .insert_binding(&RfidBinding { key: BindingKey::new("TAG1", "EPC001"), ref_code: 12345 })
            .unwrap();
        store
    }

    fn request() -> CreateTxRequest {
        CreateTxRequest {
            site_name: Some("Main Site".to_string()),
            epc: Some("epc001".to_string()),
            ref_code: Some("12345".to_string()),
            tag_id: Some("tag1".to_string()),
            location_name: Some(" Dock A ".to_string()),
            rssi: Some(Decimal::from_str("-42.5").unwrap()),
            scan_date: Some(WHEN.to_string()),
        }
    }

    fn service(store: &MemoryStore) -> TransactionService<'_, MemoryStore> {
        TransactionService::new(store, &LedgerConfig::default()).unwrap()
    }

    #[test]
    fn test_create_normalizes_and_stores() {
        let store = seeded();
        let tx = service(&store).create(&request()).unwrap();

        assert_eq!(tx.key.tag_id, "TAG1");
        assert_eq!(tx.key.epc, "EPC001");
        assert_eq!(tx.location_id, 10);
        assert!(store.exists_by_key(&tx.key).unwrap());
    }

    #[test]
    fn test_create_twice_is_conflict() {
        let store = seeded();
        let service = service(&store);

        service.create(&request()).unwrap();
        let err = service.create(&request()).unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(err.to_string(), messages::TX_ADD_FAILURE);
    }

    #[test]
    fn test_create_reports_every_empty_field() {
        let store = seeded();
        let mut req = request();
        req.epc = None;
        req.rssi = Some(Decimal::ZERO);

        let err = service(&store).create(&req).unwrap_err();

        assert!(err.is_invalid_input());
        assert_eq!(err.to_string(), "The following fields are empty: [epc, rssi]");
    }

    #[test]
    fn test_create_aggregates_format_errors() {
        let store = seeded();
        let mut req = request();
        req.epc = Some("EPC1".to_string());
        req.tag_id = Some("BADTAG".to_string());
        req.scan_date = Some("2024-1-1 10:00:00".to_string());

        let message = service(&store).create(&req).unwrap_err().to_string();
        let lines: Vec<&str> = message.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Date should look like"));
        assert!(lines[1].starts_with("EPC should look like"));
        assert!(lines[2].starts_with("Tag Id should look like"));
    }

    #[test]
    fn test_empty_fields_win_over_format_errors() {
        let store = seeded();
        let mut req = request();
        req.rssi = None;
        req.epc = Some("EPC1".to_string());

        let err = service(&store).create(&req).unwrap_err();

        assert!(err.is_invalid_input());
        assert_eq!(err.to_string(), "The following fields are empty: [rssi]");
    }

    #[test]
    fn test_create_rejects_bad_ref_code() {
        let store = seeded();
        let mut req = request();
        req.ref_code = Some("1234".to_string());

        let err = service(&store).create(&req).unwrap_err();
        assert_eq!(err.to_string(), "RefCode should be 5 digits long");

        req.ref_code = Some("9999999999999999999999".to_string());
        let config = LedgerConfig { ref_code_digits: 22, ..LedgerConfig::default() };
        let wide = TransactionService::new(&store, &config).unwrap();
        let err = wide.create(&req).unwrap_err();
        assert_eq!(err.to_string(), "RefCode should be 22 digits long");
    }

    #[test]
    fn test_create_rejects_unusable_config() {
        let store = seeded();
        let config = LedgerConfig { name_separator: String::new(), ..LedgerConfig::default() };

        let result = TransactionService::new(&store, &config);

        assert!(matches!(result, Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_create_runs_consistency_checks() {
        let store = seeded();
        let mut req = request();
        req.site_name = Some("North".to_string());

        let err = service(&store).create(&req).unwrap_err();
        assert_eq!(err.to_string(), messages::LOCATION_NOT_IN_SITE);
    }

    #[test]
    fn test_update_rssi_only_keeps_location() {
        let store = seeded();
        let service = service(&store);
        service.create(&request()).unwrap();

        let update = UpdateTxRequest {
            rssi: Some(Decimal::from(-7)),
            ..UpdateTxRequest::default()
        };
        let tx = service.update("TAG1", "EPC001", WHEN, &update).unwrap();

        assert_eq!(tx.rssi, Decimal::from(-7));
        assert_eq!(tx.location_id, 10);
        assert_eq!(store.find_by_key(&tx.key).unwrap().unwrap().rssi, Decimal::from(-7));
    }

    #[test]
    fn test_update_zero_rssi_is_ignored() {
        let store = seeded();
        let service = service(&store);
        service.create(&request()).unwrap();

        let update = UpdateTxRequest {
            rssi: Some(Decimal::ZERO),
            location_name: Some("dock b".to_string()),
            ..UpdateTxRequest::default()
        };
        let tx = service.update("tag1", "epc001", WHEN, &update).unwrap();

        assert_eq!(tx.rssi, Decimal::from_str("-42.5").unwrap());
        assert_eq!(tx.location_id, 11);
    }

    #[test]
    fn test_update_new_site_needs_matching_location() {
        let store = seeded();
        let service = service(&store);
        service.create(&request()).unwrap();

        let only_site = UpdateTxRequest {
            site_name: Some("north".to_string()),
            ..UpdateTxRequest::default()
        };
        let err = service.update("TAG1", "EPC001", WHEN, &only_site).unwrap_err();
        assert_eq!(err.to_string(), messages::LOCATION_NOT_IN_SITE);

        let both = UpdateTxRequest {
            site_name: Some("north".to_string()),
            location_name: Some("gate".to_string()),
            ..UpdateTxRequest::default()
        };
        assert_eq!(service.update("TAG1", "EPC001", WHEN, &both).unwrap().location_id, 20);

        let unknown = UpdateTxRequest {
            site_name: Some("south".to_string()),
            ..UpdateTxRequest::default()
        };
        let err = service.update("TAG1", "EPC001", WHEN, &unknown).unwrap_err();
        assert_eq!(err.to_string(), messages::SITE_DOESNT_EXIST);
    }

    #[test]
    fn test_update_errors() {
        let store = seeded();
        let service = service(&store);
        let update = UpdateTxRequest::default();

        let blank = service.update("", "EPC001", WHEN, &update).unwrap_err();
        assert_eq!(blank.to_string(), messages::EMPTY_KEY_FIELDS);

        let bad_date = service.update("TAG1", "EPC001", "yesterday", &update).unwrap_err();
        assert!(bad_date.is_invalid_input());

        let missing = service.update("TAG1", "EPC001", WHEN, &update).unwrap_err();
        assert!(missing.is_not_found());
        assert_eq!(missing.to_string(), messages::TX_NOT_FOUND);
    }

    #[test]
    fn test_delete_then_delete_again() {
        let store = seeded();
        let service = service(&store);
        service.create(&request()).unwrap();

        service.delete("TAG1", "EPC001", WHEN).unwrap();
        let err = service.delete("TAG1", "EPC001", WHEN).unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(err.to_string(), messages::TX_DELETE_FAILURE);
        assert_eq!(store.transaction_count().unwrap(), 0);
    }

    #[test]
    fn test_delete_blank_key() {
        let store = seeded();
        let err = service(&store).delete("TAG1", "  ", WHEN).unwrap_err();
        assert_eq!(err.to_string(), messages::EMPTY_KEY_FIELDS);
    }
}
