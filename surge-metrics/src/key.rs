use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Interned string id used for metric names, tag keys and tag values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(u32);

impl From<u32> for KeyId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

#[derive(Debug, Default)]
struct InternerInner {
    ids: HashMap<Arc<str>, u32>,
    strings: Vec<Arc<str>>,
}

#[derive(Debug, Default)]
pub struct Interner {
    inner: RwLock<InternerInner>,
}

impl Interner {
    pub fn get_or_intern(&self, s: &str) -> KeyId {
        if let Some(&id) = self.inner.read().ids.get(s) {
            return KeyId(id);
        }

        let mut inner = self.inner.write();
        // Another writer may have won the race between the two locks.
        if let Some(&id) = inner.ids.get(s) {
            return KeyId(id);
        }

        let id = u32::try_from(inner.strings.len()).unwrap_or(u32::MAX);
        let s: Arc<str> = Arc::from(s);
        inner.strings.push(s.clone());
        inner.ids.insert(s, id);
        KeyId(id)
    }

    pub fn get(&self, s: &str) -> Option<KeyId> {
        self.inner.read().ids.get(s).copied().map(KeyId)
    }

    pub fn resolve(&self, id: KeyId) -> Option<Arc<str>> {
        self.inner.read().strings.get(id.0 as usize).cloned()
    }
}
