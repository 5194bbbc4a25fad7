// 📦 Ledger data model
//
// Reference entities (Site, Location, Product, RfidBinding) are read-only
// inputs to the core. RfidTx is the scan event the core creates, queries,
// updates and deletes. Composite identities are value objects so they can be
// used directly as map keys.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// REFERENCE ENTITIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub site_id: i64,
    /// Canonical (normalized) name
    pub site_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub location_id: i64,
    /// Canonical (normalized) name
    pub location_name: String,
    /// Owning site
    pub site_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub ref_code: i64,
    pub name: String,
}

/// Identity of a physical tag carrying a given EPC
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BindingKey {
    pub tag_id: String,
    pub epc: String,
}

impl BindingKey {
    pub fn new(tag_id: impl Into<String>, epc: impl Into<String>) -> Self {
        BindingKey {
            tag_id: tag_id.into(),
            epc: epc.into(),
        }
    }
}

/// Fixed assignment of (tag_id, epc) to a product reference code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfidBinding {
    pub key: BindingKey,
    pub ref_code: i64,
}

// ============================================================================
// SCAN TRANSACTIONS
// ============================================================================

/// Composite identity of one scan: (tag_id, epc, scan_date)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxKey {
    pub tag_id: String,
    pub epc: String,
    pub scan_date: NaiveDateTime,
}

impl TxKey {
    pub fn new(tag_id: impl Into<String>, epc: impl Into<String>, scan_date: NaiveDateTime) -> Self {
        TxKey {
            tag_id: tag_id.into(),
            epc: epc.into(),
            scan_date,
        }
    }

    pub fn binding(&self) -> BindingKey {
        BindingKey::new(self.tag_id.clone(), self.epc.clone())
    }
}

impl std::fmt::Display for TxKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.tag_id, self.epc, self.scan_date)
    }
}

/// One recorded scan event as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfidTx {
    pub key: TxKey,
    pub location_id: i64,
    pub rssi: Decimal,
}

/// A scan joined with its location, site and product reference.
/// Names are canonical when read from a store and display form once
/// returned by the analytics engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionView {
    pub tag_id: String,
    pub epc: String,
    pub scan_date: NaiveDateTime,
    pub ref_code: Option<i64>,
    pub location_id: i64,
    pub location_name: String,
    pub site_name: String,
    pub rssi: Decimal,
}

// ============================================================================
// ANALYTIC RESULTS
// ============================================================================

/// Most recent scan of an EPC plus aggregates over the whole window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestEpc {
    pub epc: String,
    pub transaction_count: i64,
    pub average_rssi: f64,
    pub most_recent_location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopEpc {
    pub epc: String,
    pub read_count: i64,
}

// ============================================================================
// QUERY FILTERS
// ============================================================================

/// Inclusive [start, end] scan window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ScanWindow {
    pub fn contains(&self, at: &NaiveDateTime) -> bool {
        *at >= self.start && *at <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestScanFilter {
    pub window: ScanWindow,
    /// Upper-cased EPC
    pub epc: Option<String>,
    /// Canonical site name
    pub site_name: Option<String>,
}

/// Optional predicates ANDed together; None means "not applied"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    pub epc: Option<String>,
    pub tag_id: Option<String>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl SearchCriteria {
    pub fn matches(&self, tx: &TransactionView) -> bool {
        self.epc.as_ref().map_or(true, |epc| tx.epc == *epc)
            && self.tag_id.as_ref().map_or(true, |tag| tx.tag_id == *tag)
            && self.start.map_or(true, |start| tx.scan_date >= start)
            && self.end.map_or(true, |end| tx.scan_date <= end)
    }
}

// ============================================================================
// REQUESTS
// ============================================================================

/// Create request. Every field is required; they are optional here so that
/// missing ones can be reported by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTxRequest {
    pub site_name: Option<String>,
    pub epc: Option<String>,
    pub ref_code: Option<String>,
    pub tag_id: Option<String>,
    pub location_name: Option<String>,
    pub rssi: Option<Decimal>,
    pub scan_date: Option<String>,
}

impl CreateTxRequest {
    /// (field name, is empty) for every required field, in declaration order
    pub fn presence_checks(&self) -> [(&'static str, bool); 7] {
        use crate::validation::{is_blank, is_null_or_zero};

        [
            ("siteName", is_blank(self.site_name.as_deref())),
            ("epc", is_blank(self.epc.as_deref())),
            ("refCode", is_blank(self.ref_code.as_deref())),
            ("tagId", is_blank(self.tag_id.as_deref())),
            ("locationName", is_blank(self.location_name.as_deref())),
            ("rssi", is_null_or_zero(self.rssi)),
            ("scanDate", is_blank(self.scan_date.as_deref())),
        ]
    }
}

/// Partial update of the non-key fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTxRequest {
    pub site_name: Option<String>,
    pub location_name: Option<String>,
    pub rssi: Option<Decimal>,
}
