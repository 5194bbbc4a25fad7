// ❗ Error kinds surfaced by the ledger core

use thiserror::Error;

/// Stable error codes, logged and returned with every failure
pub const CODE_INVALID_INPUT: &str = "ERR-RFIDTX-IN-001";
pub const CODE_NOT_FOUND: &str = "ERR-RFIDTX-RES-002";
pub const CODE_DATA_CONFLICT: &str = "ERR-RFIDTX-ID-003";
pub const CODE_STORE: &str = "ERR-RFIDTX-DB-004";
pub const CODE_CONFIG: &str = "ERR-RFIDTX-CFG-005";

/// Fixed messages shared by the services and their tests
pub mod messages {
    pub const N_FORMAT: &str = "N should be a positive integer greater than 0";
    pub const DATE_ORDER: &str = "Start Date should occur before End date";
    pub const NO_TRANSACTIONS: &str = "There are no transactions that match your filter";
    pub const EMPTY_KEY_FIELDS: &str = "The following fields cannot be empty tagId, EPC, Scan Date";
    pub const LOCATION_DOESNT_EXIST: &str = "Location Name doesn't exist";
    pub const SITE_DOESNT_EXIST: &str = "Site Name doesn't exist";
    pub const LOCATION_NOT_IN_SITE: &str = "Location Name doesnt belong in the site";
    pub const TAG_EPC_MISMATCH: &str = "The provided tag id and epc do not match";
    pub const REF_CODE_MISMATCH: &str = "the provided refcode does not belong to the tagid and epc";
    pub const TX_ADD_FAILURE: &str = "Cannot add Transaction because it already exists";
    pub const TX_DELETE_FAILURE: &str = "Cannot delete Transaction because it does not exist";
    pub const TX_NOT_FOUND: &str = "RfidTx not found";
}

/// Failures raised by a store implementation
#[derive(Error, Debug)]
pub enum StoreError {
    /// Composite key already present (uniqueness constraint)
    #[error("Duplicate key: {0}")]
    Duplicate(String),

    /// Row targeted by an update/delete is gone
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Row refers to a site or location that is not stored
    #[error("Unknown reference from {0}")]
    MissingReference(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Errors returned by the lifecycle service and the analytics engine
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Malformed or semantically inconsistent request data
    #[error("{0}")]
    InvalidInput(String),

    /// Well-formed request referencing an absent entity
    #[error("{0}")]
    ResourceNotFound(String),

    /// Uniqueness violation, or delete of something already gone
    #[error("{0}")]
    DataConflict(String),

    /// Unusable format configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Store(StoreError),
}

impl LedgerError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::ResourceNotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::DataConflict(msg.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidInput(_) => CODE_INVALID_INPUT,
            LedgerError::ResourceNotFound(_) => CODE_NOT_FOUND,
            LedgerError::DataConflict(_) => CODE_DATA_CONFLICT,
            LedgerError::Config(_) => CODE_CONFIG,
            LedgerError::Store(_) => CODE_STORE,
        }
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, LedgerError::InvalidInput(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::ResourceNotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::DataConflict(_))
    }
}

impl From<StoreError> for LedgerError {
    /// Duplicate keys from the store are conflicts, never unhandled faults
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(_) => LedgerError::conflict(messages::TX_ADD_FAILURE),
            other => LedgerError::Store(other),
        }
    }
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_store_error_becomes_conflict() {
        let err: LedgerError = StoreError::Duplicate("TAG1/EPC001".to_string()).into();

        assert!(err.is_conflict());
        assert_eq!(err.code(), CODE_DATA_CONFLICT);
        assert_eq!(err.to_string(), messages::TX_ADD_FAILURE);
    }

    #[test]
    fn test_other_store_errors_stay_store_errors() {
        let err: LedgerError = StoreError::MissingReference("location 10".to_string()).into();

        assert!(matches!(err, LedgerError::Store(_)));
        assert!(!err.is_conflict());
        assert_eq!(err.code(), CODE_STORE);
    }
}
