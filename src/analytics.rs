// 📊 Analytics Query Engine
//
// Read-only queries over scan history:
// - latest scan per EPC (with count + mean RSSI over the window)
// - top-N EPCs by read count
// - criteria search (AND over the supplied filters)
// - narrow lookups by epc / tag / epc+tag / date range
//
// Every literal parameter is format-checked up front; an empty result is
// ResourceNotFound. The group-then-reduce functions at the bottom are the
// two-pass rendition used by stores without window functions.

use crate::config::LedgerConfig;
use crate::error::{messages, LedgerError, LedgerResult};
use crate::model::{
    LatestEpc, LatestScanFilter, ScanWindow, SearchCriteria, TopEpc, TransactionView,
};
use crate::names;
use crate::store::TransactionStore;
use crate::validation::{dates_in_order, is_blank, is_positive, FormatValidator, Violations};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{error, info};

pub struct AnalyticsEngine<'a, S: TransactionStore> {
    store: &'a S,
    validator: FormatValidator,
    separator: String,
}

impl<'a, S: TransactionStore> AnalyticsEngine<'a, S> {
    pub fn new(store: &'a S, config: &LedgerConfig) -> LedgerResult<Self> {
        Ok(AnalyticsEngine {
            store,
            validator: FormatValidator::new(config)?,
            separator: config.name_separator.clone(),
        })
    }

    /// Latest scan per EPC in [start, end], optionally for one EPC and/or site
    pub fn latest_scans(
        &self,
        start: &str,
        end: &str,
        epc: Option<&str>,
        site_name: Option<&str>,
    ) -> LedgerResult<Vec<LatestEpc>> {
        let mut violations = Violations::new();
        let window = self.window(start, end, &mut violations);

        let epc = match epc.filter(|e| !e.trim().is_empty()) {
            Some(e) if self.validator.is_valid_epc(e) => Some(e.to_uppercase()),
            Some(_) => {
                violations.push(self.validator.epc_message());
                None
            }
            None => None,
        };
        let site_name = site_name
            .filter(|s| !s.trim().is_empty())
            .map(|s| names::normalize_with(s, &self.separator));

        let window = self.reject_invalid(violations, window)?;

        let filter = LatestScanFilter { window, epc, site_name };
        let mut latest = self.store.latest_per_epc(&filter)?;
        if latest.is_empty() {
            return Err(self.no_transactions());
        }

        for item in &mut latest {
            item.most_recent_location =
                names::denormalize_with(&item.most_recent_location, &self.separator);
        }
        info!(count = latest.len(), "Successfully retrieved latest scans");
        Ok(latest)
    }

    /// The `n` most-read EPCs in [start, end]
    pub fn top_reads(&self, n: i64, start: &str, end: &str) -> LedgerResult<Vec<TopEpc>> {
        let mut violations = Violations::new();
        let window = self.window(start, end, &mut violations);
        if !is_positive(n) {
            violations.push(messages::N_FORMAT);
        }
        let window = self.reject_invalid(violations, window)?;

        let top = self.store.top_reads(n as usize, &window)?;
        if top.is_empty() {
            return Err(self.no_transactions());
        }
        info!(count = top.len(), "Successfully retrieved top reads list");
        Ok(top)
    }

    /// Every transaction matching all supplied filters; omitted filters are not applied
    pub fn search(
        &self,
        epc: Option<&str>,
        tag_id: Option<&str>,
        start: Option<&str>,
        end: Option<&str>,
    ) -> LedgerResult<Vec<TransactionView>> {
        let present = |v: Option<&str>| v.filter(|s| !is_blank(Some(*s))).map(str::to_string);
        let (epc, tag_id, start, end) = (present(epc), present(tag_id), present(start), present(end));

        let mut violations = Violations::new();
        if let Some(e) = &epc {
            if !self.validator.is_valid_epc(e) {
                violations.push(self.validator.epc_message());
            }
        }
        if let Some(t) = &tag_id {
            if !self.validator.is_valid_tag(t) {
                violations.push(self.validator.tag_message());
            }
        }
        let start = start.and_then(|s| self.parse_or_report(&s, &mut violations));
        let end = end.and_then(|s| self.parse_or_report(&s, &mut violations));
        self.check(violations)?;

        if let (Some(s), Some(e)) = (&start, &end) {
            if !dates_in_order(s, e) {
                return Err(self.invalid(messages::DATE_ORDER));
            }
        }

        let criteria = SearchCriteria {
            epc: epc.map(|e| e.to_uppercase()),
            tag_id: tag_id.map(|t| t.to_uppercase()),
            start,
            end,
        };
        let found = self.store.find_by_criteria(&criteria)?;
        self.found_or_not(found, messages::NO_TRANSACTIONS.to_string(), "criteria")
    }

    pub fn by_epc(&self, epc: &str) -> LedgerResult<Vec<TransactionView>> {
        if !self.validator.is_valid_epc(epc) {
            return Err(self.invalid(self.validator.epc_message()));
        }
        let epc = epc.to_uppercase();
        let found = self.store.find_by_epc(&epc)?;
        self.found_or_not(found, format!("RFID transactions with epc {} not found", epc), "epc")
    }

    pub fn by_tag_id(&self, tag_id: &str) -> LedgerResult<Vec<TransactionView>> {
        if !self.validator.is_valid_tag(tag_id) {
            return Err(self.invalid(self.validator.tag_message()));
        }
        let tag_id = tag_id.to_uppercase();
        let found = self.store.find_by_tag_id(&tag_id)?;
        self.found_or_not(
            found,
            format!("RFID transactions with tagId {} not found", tag_id),
            "tagId",
        )
    }

    pub fn by_epc_and_tag_id(&self, epc: &str, tag_id: &str) -> LedgerResult<Vec<TransactionView>> {
        let mut violations = Violations::new();
        if !self.validator.is_valid_tag(tag_id) {
            violations.push(self.validator.tag_message());
        }
        if !self.validator.is_valid_epc(epc) {
            violations.push(self.validator.epc_message());
        }
        self.check(violations)?;

        let (epc, tag_id) = (epc.to_uppercase(), tag_id.to_uppercase());
        let found = self.store.find_by_epc_and_tag_id(&epc, &tag_id)?;
        self.found_or_not(
            found,
            format!("RFID transactions not found with tagId: {} and epc: {}", tag_id, epc),
            "epc and tagId",
        )
    }

    pub fn by_scan_date_range(&self, start: &str, end: &str) -> LedgerResult<Vec<TransactionView>> {
        let mut violations = Violations::new();
        let window = self.window(start, end, &mut violations);
        let window = self.reject_invalid(violations, window)?;

        let found = self.store.find_by_scan_date_between(&window)?;
        self.found_or_not(
            found,
            format!("RFID transactions not found between : {} and {}", start, end),
            "date range",
        )
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    fn parse_or_report(
        &self,
        input: &str,
        violations: &mut Violations,
    ) -> Option<chrono::NaiveDateTime> {
        let parsed = self.validator.parse_date(input);
        if parsed.is_none() {
            violations.push(self.validator.date_message(input));
        }
        parsed
    }

    /// Parse both bounds, recording format and order problems
    fn window(&self, start: &str, end: &str, violations: &mut Violations) -> Option<ScanWindow> {
        let start = self.parse_or_report(start, violations);
        let end = self.parse_or_report(end, violations);
        match (start, end) {
            (Some(start), Some(end)) if dates_in_order(&start, &end) => {
                Some(ScanWindow { start, end })
            }
            (Some(_), Some(_)) => {
                violations.push(messages::DATE_ORDER);
                None
            }
            _ => None,
        }
    }

    fn reject_invalid(
        &self,
        violations: Violations,
        window: Option<ScanWindow>,
    ) -> LedgerResult<ScanWindow> {
        self.check(violations)?;
        window.ok_or_else(|| self.invalid(messages::DATE_ORDER))
    }

    fn check(&self, violations: Violations) -> LedgerResult<()> {
        violations.into_result().map_err(|err| {
            error!(code = err.code(), "{}", err);
            err
        })
    }

    fn invalid(&self, message: impl Into<String>) -> LedgerError {
        let err = LedgerError::invalid(message);
        error!(code = err.code(), "{}", err);
        err
    }

    fn no_transactions(&self) -> LedgerError {
        let err = LedgerError::not_found(messages::NO_TRANSACTIONS);
        error!(code = err.code(), "{}", err);
        err
    }

    fn found_or_not(
        &self,
        mut found: Vec<TransactionView>,
        not_found: String,
        by: &str,
    ) -> LedgerResult<Vec<TransactionView>> {
        if found.is_empty() {
            let err = LedgerError::not_found(not_found);
            error!(code = err.code(), "{}", err);
            return Err(err);
        }
        for tx in &mut found {
            tx.site_name = names::denormalize_with(&tx.site_name, &self.separator);
            tx.location_name = names::denormalize_with(&tx.location_name, &self.separator);
        }
        info!(count = found.len(), "Successfully retrieved RfidTx by {}", by);
        Ok(found)
    }
}

// ============================================================================
// TWO-PASS AGGREGATION (group, then reduce)
// ============================================================================

/// Latest-per-EPC over already-filtered rows.
///
/// Pass 1 groups rows by EPC. Pass 2 reduces each group to its most recent
/// row (max scan_date, ties to the smallest tag_id) and the count and mean
/// RSSI of the whole group. Output is ordered by epc.
pub fn latest_per_epc(rows: &[TransactionView]) -> Vec<LatestEpc> {
    let mut groups: BTreeMap<&str, Vec<&TransactionView>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.epc.as_str()).or_default().push(row);
    }

    groups
        .into_iter()
        .filter_map(|(epc, group)| {
            let latest = group.iter().copied().max_by(|a, b| {
                a.scan_date
                    .cmp(&b.scan_date)
                    .then_with(|| b.tag_id.cmp(&a.tag_id))
            })?;
            let count = group.len() as i64;
            let total: Decimal = group.iter().map(|r| r.rssi).sum();
            let average = (total / Decimal::from(count)).to_f64().unwrap_or(f64::NAN);

            Some(LatestEpc {
                epc: epc.to_string(),
                transaction_count: count,
                average_rssi: average,
                most_recent_location: format!("{} {}", latest.site_name, latest.location_name),
            })
        })
        .collect()
}

/// Read counts per EPC, count desc then epc asc, truncated to `limit`
pub fn top_reads(rows: &[TransactionView], limit: usize) -> Vec<TopEpc> {
    let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
    for row in rows {
        *counts.entry(row.epc.as_str()).or_insert(0) += 1;
    }

    let mut top: Vec<TopEpc> = counts
        .into_iter()
        .map(|(epc, read_count)| TopEpc {
            epc: epc.to_string(),
            read_count,
        })
        .collect();
    top.sort_by(|a, b| b.read_count.cmp(&a.read_count).then_with(|| a.epc.cmp(&b.epc)));
    top.truncate(limit);
    top
}
