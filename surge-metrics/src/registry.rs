use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::agg::Query;
use crate::key::{Interner, KeyId};
use crate::metrics::{
    MetricHandle, MetricKind, MetricSeriesSummary, MetricStorage, MetricUnit, SeriesSnapshot,
};
use crate::tags::TagSet;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricId(u32);

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: KeyId,
    pub kind: MetricKind,
    pub unit: MetricUnit,
}

#[derive(Debug)]
pub(crate) struct SeriesMap {
    kind: MetricKind,
    by_tags: DashMap<TagSet, MetricStorage>,
}

/// Shared store for every metric of a run.
///
/// Metrics are registered once by name, then written through cheap [`MetricHandle`]s.
/// Nothing is ever removed: the registry grows for the length of a run and is dropped with it.
#[derive(Debug, Default)]
pub struct Registry {
    interner: Interner,
    defs: RwLock<Vec<MetricDef>>,
    storage: DashMap<MetricId, Arc<SeriesMap>>,
}

impl Registry {
    /// Registers `name`, or returns the existing id when it is already registered with the
    /// same kind.
    ///
    /// # Errors
    /// Returns [`Error::KindMismatch`] when `name` exists with a different kind.
    pub fn register(&self, name: &str, kind: MetricKind, unit: MetricUnit) -> Result<MetricId> {
        let name_id = self.interner.get_or_intern(name);

        let mut defs = self.defs.write();
        if let Some((idx, def)) = defs.iter().enumerate().find(|(_, d)| d.name == name_id) {
            if def.kind != kind {
                return Err(Error::KindMismatch {
                    name: name.to_string(),
                    registered: def.kind,
                    requested: kind,
                });
            }
            return Ok(MetricId(idx as u32));
        }

        let id = MetricId(u32::try_from(defs.len()).map_err(|_| Error::TooManyMetrics)?);
        defs.push(MetricDef {
            name: name_id,
            kind,
            unit,
        });
        self.storage.insert(
            id,
            Arc::new(SeriesMap {
                kind,
                by_tags: DashMap::new(),
            }),
        );
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<(MetricId, MetricDef)> {
        let name_id = self.interner.get(name)?;
        let defs = self.defs.read();
        defs.iter()
            .enumerate()
            .find(|(_, d)| d.name == name_id)
            .map(|(idx, d)| (MetricId(idx as u32), *d))
    }

    pub fn def(&self, metric: MetricId) -> Option<MetricDef> {
        self.defs.read().get(metric.0 as usize).copied()
    }

    pub fn resolve_key(&self, key: &str) -> KeyId {
        self.interner.get_or_intern(key)
    }

    pub fn resolve_key_id(&self, id: KeyId) -> Option<Arc<str>> {
        self.interner.resolve(id)
    }

    pub fn resolve_tags(&self, tags: &[(&str, &str)]) -> TagSet {
        TagSet::from_unsorted(
            tags.iter()
                .map(|(k, v)| (self.resolve_key(k), self.resolve_key(v))),
        )
    }

    /// Like [`Registry::resolve_tags`] but never interns: `None` means no series can carry
    /// these tags yet.
    pub fn find_tags(&self, tags: &[(&str, &str)]) -> Option<TagSet> {
        let mut resolved = Vec::with_capacity(tags.len());
        for (k, v) in tags {
            resolved.push((self.interner.get(k)?, self.interner.get(v)?));
        }
        Some(TagSet::from_unsorted(resolved))
    }

    pub fn get_handle(&self, metric: MetricId, tags: TagSet) -> Option<MetricHandle> {
        let series = self.storage.get(&metric)?.value().clone();
        let handle = series
            .by_tags
            .entry(tags)
            .or_insert_with(|| MetricStorage::new(series.kind))
            .handle();
        Some(handle)
    }

    pub fn series(&self, metric: MetricId, tags: &TagSet) -> Option<SeriesSnapshot> {
        let series = self.storage.get(&metric)?.value().clone();
        series.by_tags.get(tags).map(|s| s.snapshot())
    }

    pub(crate) fn visit_series(
        &self,
        metric: MetricId,
        mut f: impl FnMut(&TagSet, SeriesSnapshot),
    ) {
        let Some(series) = self.storage.get(&metric).map(|s| s.value().clone()) else {
            return;
        };
        for entry in series.by_tags.iter() {
            f(entry.key(), entry.value().snapshot());
        }
    }

    pub fn query(&self, metric: MetricId) -> Query<'_> {
        Query::new(self, metric)
    }

    fn tag_strings(&self, tags: &TagSet) -> Vec<(String, String)> {
        tags.iter()
            .map(|(k, v)| {
                (
                    self.resolve_key_id(k)
                        .map(|s| s.to_string())
                        .unwrap_or_default(),
                    self.resolve_key_id(v)
                        .map(|s| s.to_string())
                        .unwrap_or_default(),
                )
            })
            .collect()
    }

    /// Summaries of every series, sorted by metric name then tags (base series first).
    pub fn summarize(&self) -> Vec<MetricSeriesSummary> {
        let defs: Vec<MetricDef> = self.defs.read().clone();
        let mut out = Vec::new();

        for (idx, def) in defs.iter().enumerate() {
            let name = self
                .resolve_key_id(def.name)
                .map(|s| s.to_string())
                .unwrap_or_default();

            self.visit_series(MetricId(idx as u32), |tags, snapshot| {
                out.push(MetricSeriesSummary {
                    name: name.clone(),
                    kind: def.kind,
                    unit: def.unit,
                    tags: self.tag_strings(tags),
                    values: snapshot.into_value(def.unit),
                });
            });
        }

        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.tags.cmp(&b.tags)));
        out
    }
}
