/*!
 * Process Environment
 * Variable map shared between the host and the process's syscalls
 */

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: Arc<RwLock<HashMap<String, String>>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.vars.read().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.write().insert(name.into(), value.into());
    }

    pub fn remove(&self, name: &str) -> Option<String> {
        self.vars.write().remove(name)
    }

    pub fn len(&self) -> usize {
        self.vars.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.read().is_empty()
    }

    /// Copy of the current variables
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.vars.read().clone()
    }
}

impl From<HashMap<String, String>> for Environment {
    fn from(vars: HashMap<String, String>) -> Self {
        Self {
            vars: Arc::new(RwLock::new(vars)),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect::<HashMap<_, _>>()
            .into()
    }
}
