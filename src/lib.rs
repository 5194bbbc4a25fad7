// RFID Scan Ledger - Core Library
// Exposes all modules for use in the CLI and tests

pub mod config;
pub mod error;
pub mod names;
pub mod validation;
pub mod model;
pub mod store;
pub mod consistency;
pub mod analytics;
pub mod lifecycle;
pub mod import;
pub mod logging;

// Re-export commonly used types
pub use config::LedgerConfig;
pub use error::{LedgerError, LedgerResult, StoreError};
pub use model::{
    BindingKey, CreateTxRequest, LatestEpc, Location, Product, RfidBinding, RfidTx, Site, TopEpc,
    TransactionView, TxKey, UpdateTxRequest,
};
pub use store::{
    LedgerStore, MemoryStore, ReferenceData, ReferenceWriter, SqliteStore, TransactionStore,
};
pub use store::sqlite::Event;
pub use consistency::ConsistencyChecker;
pub use analytics::AnalyticsEngine;
pub use lifecycle::TransactionService;
pub use import::ImportReport;
