use crate::key::KeyId;
use smallvec::SmallVec;

/// Sorted `(key, value)` pairs identifying one series of a metric.
///
/// The empty set is the metric's base series, the one thresholds are evaluated against
/// unless a selector names tags explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagSet {
    // Series rarely carry more than a couple of tags.
    pub(crate) tags: SmallVec<[(KeyId, KeyId); 2]>,
}

impl TagSet {
    pub fn from_unsorted(iter: impl IntoIterator<Item = (KeyId, KeyId)>) -> Self {
        let mut tags: SmallVec<[(KeyId, KeyId); 2]> = iter.into_iter().collect();
        tags.sort_unstable();
        tags.dedup_by(|a, b| a.0 == b.0);
        Self { tags }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyId, KeyId)> + '_ {
        self.tags.iter().copied()
    }

    pub fn get(&self, key: KeyId) -> Option<KeyId> {
        let slice: &[(KeyId, KeyId)] = &self.tags;
        let idx = slice.partition_point(|(k, _)| *k < key);
        slice.get(idx).and_then(|(k, v)| (*k == key).then_some(*v))
    }

    pub fn project(&self, keys: &[KeyId]) -> TagSet {
        let mut out = SmallVec::<[(KeyId, KeyId); 2]>::new();
        for key in keys {
            if let Some(value) = self.get(*key) {
                out.push((*key, value));
            }
        }
        out.sort_unstable();
        TagSet { tags: out }
    }
}
