use std::collections::HashMap;

/// Out-of-band key/value carrier scoped to one event-processing transaction.
///
/// Lets one action hand a derived value (for example the remote id of a
/// contact it just created) to a later action invoked for the same event.
/// Always passed explicitly by the caller; values do not survive past the
/// transaction and must never be shared across concurrent invocations.
#[derive(Debug, Default)]
pub struct TransactionContext {
    values: HashMap<String, String>,
}

impl TransactionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}
