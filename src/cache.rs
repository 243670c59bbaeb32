use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::models::{Account, AmountBaseline};
use crate::reference::{ReferenceData, ResolveError, Resolved};

type Slot<V> = Arc<OnceLock<Resolved<V>>>;
type Memo<K, V> = Mutex<HashMap<K, Slot<V>>>;

/// Batch-scoped memo over a [`ReferenceData`] source.
///
/// Each distinct account code, dimension value and baseline is fetched at most
/// once per batch, failures included. The map lock is held only to find a key's
/// slot, so distinct keys resolve in parallel while callers asking for the same
/// key wait on its single fetch.
pub struct ReferenceCache<'a> {
    source: &'a dyn ReferenceData,
    client_id: &'a str,
    accounts: Memo<String, Option<Account>>,
    dimension_values: Memo<(String, String), bool>,
    baselines: Memo<String, Option<AmountBaseline>>,
    lookups: AtomicUsize,
}

impl<'a> ReferenceCache<'a> {
    pub fn new(source: &'a dyn ReferenceData, client_id: &'a str) -> Self {
        Self {
            source,
            client_id,
            accounts: Mutex::new(HashMap::new()),
            dimension_values: Mutex::new(HashMap::new()),
            baselines: Mutex::new(HashMap::new()),
            lookups: AtomicUsize::new(0),
        }
    }

    fn memo<K, V>(&self, map: &Memo<K, V>, key: K, fetch: impl FnOnce() -> Resolved<V>) -> Resolved<V>
    where
        K: Eq + Hash,
        V: Clone,
    {
        let slot = {
            let mut guard = map
                .lock()
                .map_err(|_| ResolveError::Unavailable("reference cache poisoned".to_string()))?;
            Arc::clone(guard.entry(key).or_default())
        };
        slot.get_or_init(|| {
            self.lookups.fetch_add(1, Ordering::Relaxed);
            fetch()
        })
        .clone()
    }

    pub fn account(&self, code: &str) -> Resolved<Option<Account>> {
        let code = code.trim();
        self.memo(&self.accounts, code.to_string(), || {
            self.source.resolve_account(self.client_id, code)
        })
    }

    /// `dimension` should be the canonical definition name.
    pub fn dimension_value_exists(&self, dimension: &str, value: &str) -> Resolved<bool> {
        let key = (dimension.to_lowercase(), value.trim().to_string());
        self.memo(&self.dimension_values, key, || {
            self.source.resolve_dimension_value(self.client_id, dimension, value.trim())
        })
    }

    pub fn baseline(&self, account_code: &str) -> Resolved<Option<AmountBaseline>> {
        let code = account_code.trim();
        self.memo(&self.baselines, code.to_string(), || {
            self.source.account_amount_baseline(self.client_id, code)
        })
    }

    /// External lookups issued so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}
