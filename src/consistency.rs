// 🔗 Referential consistency checks for a new scan
//
// Fail-fast: the first failing check wins, in this order
//   1. location exists       4. (tag_id, epc) binding exists
//   2. site exists           5. ref_code matches the binding
//   3. location in site      6. key not already stored
// Names passed in must already be canonical.

use crate::error::{messages, LedgerError, LedgerResult};
use crate::model::{Location, TxKey};
use crate::store::LedgerStore;
use tracing::{debug, error};

pub struct ConsistencyChecker<'a, S: LedgerStore> {
    store: &'a S,
}

impl<'a, S: LedgerStore> ConsistencyChecker<'a, S> {
    pub fn new(store: &'a S) -> Self {
        ConsistencyChecker { store }
    }

    /// Returns the resolved location the scan will be recorded at
    pub fn verify_new(
        &self,
        site_name: &str,
        location_name: &str,
        key: &TxKey,
        ref_code: i64,
    ) -> LedgerResult<Location> {
        if !self.store.location_exists(location_name)? {
            return Err(fail(LedgerError::invalid(messages::LOCATION_DOESNT_EXIST)));
        }
        if !self.store.site_exists(site_name)? {
            return Err(fail(LedgerError::invalid(messages::SITE_DOESNT_EXIST)));
        }
        let location = self
            .store
            .find_location_matching_site(location_name, site_name)?
            .ok_or_else(|| fail(LedgerError::invalid(messages::LOCATION_NOT_IN_SITE)))?;

        let binding = key.binding();
        if !self.store.binding_exists(&binding)? {
            return Err(fail(LedgerError::invalid(messages::TAG_EPC_MISMATCH)));
        }
        if !self.store.ref_code_matches(&binding, ref_code)? {
            return Err(fail(LedgerError::invalid(messages::REF_CODE_MISMATCH)));
        }

        if self.store.exists_by_key(key)? {
            return Err(fail(LedgerError::conflict(messages::TX_ADD_FAILURE)));
        }

        debug!(key = %key, location_id = location.location_id, "Scan passed consistency checks");
        Ok(location)
    }
}

fn fail(err: LedgerError) -> LedgerError {
    error!(code = err.code(), "{}", err);
    err
}
