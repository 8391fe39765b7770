use std::collections::HashMap;

use smallvec::SmallVec;

use crate::key::KeyId;
use crate::metrics::SeriesSnapshot;
use crate::registry::{MetricId, Registry};
use crate::tags::TagSet;

#[derive(Debug, Clone, Copy)]
enum TagFilter {
    Eq(KeyId, KeyId),
    Has(KeyId),
}

impl TagFilter {
    fn matches(&self, tags: &TagSet) -> bool {
        match *self {
            TagFilter::Eq(k, v) => tags.get(k) == Some(v),
            TagFilter::Has(k) => tags.get(k).is_some(),
        }
    }
}

/// Filtered, optionally grouped read over the series of one metric.
#[derive(Debug, Clone)]
pub struct Query<'a> {
    registry: &'a Registry,
    metric: MetricId,
    filters: SmallVec<[TagFilter; 4]>,
    group_keys: SmallVec<[KeyId; 4]>,
}

impl<'a> Query<'a> {
    pub(crate) fn new(registry: &'a Registry, metric: MetricId) -> Self {
        Self {
            registry,
            metric,
            filters: SmallVec::new(),
            group_keys: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn where_has(mut self, key: KeyId) -> Self {
        self.filters.push(TagFilter::Has(key));
        self
    }

    /// Restricts the query to series carrying every tag of `tags`.
    #[must_use]
    pub fn where_tags(mut self, tags: &TagSet) -> Self {
        for (k, v) in tags.iter() {
            self.filters.push(TagFilter::Eq(k, v));
        }
        self
    }

    #[must_use]
    pub fn group_by(mut self, keys: impl IntoIterator<Item = KeyId>) -> Self {
        self.group_keys = keys.into_iter().collect();
        self.group_keys.sort_unstable();
        self.group_keys.dedup();
        self
    }

    fn matches(&self, tags: &TagSet) -> bool {
        self.filters.iter().all(|f| f.matches(tags))
    }

    fn group_key(&self, tags: &TagSet) -> TagSet {
        tags.project(&self.group_keys)
    }

    /// `(total, hits)` per group.
    pub fn sum_rate(self) -> HashMap<TagSet, (u64, u64)> {
        let mut out: HashMap<TagSet, (u64, u64)> = HashMap::new();

        self.registry.visit_series(self.metric, |tags, snapshot| {
            if !self.matches(tags) {
                return;
            }
            let SeriesSnapshot::Rate { total, hits } = snapshot else {
                return;
            };

            let slot = out.entry(self.group_key(tags)).or_default();
            slot.0 = slot.0.saturating_add(total);
            slot.1 = slot.1.saturating_add(hits);
        });

        out
    }

    /// Every matching series folded into one snapshot, or `None` when nothing matches.
    pub fn merged(self) -> Option<SeriesSnapshot> {
        let mut acc: Option<SeriesSnapshot> = None;

        self.registry.visit_series(self.metric, |tags, snapshot| {
            if !self.matches(tags) {
                return;
            }
            acc = Some(match acc.take() {
                None => snapshot,
                Some(cur) => merge_snapshots(cur, snapshot),
            });
        });

        acc
    }
}

fn merge_snapshots(a: SeriesSnapshot, b: SeriesSnapshot) -> SeriesSnapshot {
    match (a, b) {
        (SeriesSnapshot::Counter(x), SeriesSnapshot::Counter(y)) => {
            SeriesSnapshot::Counter(x.saturating_add(y))
        }
        // Gauges are point values: the last one seen wins.
        (SeriesSnapshot::Gauge(_), SeriesSnapshot::Gauge(y)) => SeriesSnapshot::Gauge(y),
        (
            SeriesSnapshot::Rate { total, hits },
            SeriesSnapshot::Rate {
                total: t2,
                hits: h2,
            },
        ) => SeriesSnapshot::Rate {
            total: total.saturating_add(t2),
            hits: hits.saturating_add(h2),
        },
        (SeriesSnapshot::Histogram(mut x), SeriesSnapshot::Histogram(y)) => {
            x.merge(&y);
            SeriesSnapshot::Histogram(x)
        }
        (a, _) => a,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricKind, MetricUnit};

    #[test]
    fn sum_rate_groups_by_check_name() {
        let reg = Registry::default();
        let metric = reg
            .register("checks", MetricKind::Rate, MetricUnit::Plain)
            .unwrap_or_else(|e| panic!("{e}"));

        let check_k = reg.resolve_key("check");
        let status = reg.resolve_tags(&[("check", "status is 202")]);
        let body = reg.resolve_tags(&[("check", "has reservationId")]);

        for (tags, hit) in [
            (status.clone(), true),
            (status.clone(), false),
            (body.clone(), true),
            (TagSet::default(), true),
        ] {
            if let Some(h) = reg.get_handle(metric, tags) {
                h.add_rate(hit);
            }
        }

        let grouped = reg
            .query(metric)
            .where_has(check_k)
            .group_by([check_k])
            .sum_rate();

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped.get(&status), Some(&(2, 1)));
        assert_eq!(grouped.get(&body), Some(&(1, 1)));
    }

    #[test]
    fn merged_respects_tag_filters() {
        let reg = Registry::default();
        let metric = reg
            .register("http_req_duration", MetricKind::Histogram, MetricUnit::Duration)
            .unwrap_or_else(|e| panic!("{e}"));

        let status_k = reg.resolve_key("status");
        let ok = reg.resolve_tags(&[("status", "202")]);
        let err = reg.resolve_tags(&[("status", "500")]);

        if let Some(h) = reg.get_handle(metric, ok.clone()) {
            h.observe(10);
            h.observe(20);
        }
        if let Some(h) = reg.get_handle(metric, err) {
            h.observe(999);
        }

        let only_ok = reg.query(metric).where_tags(&ok).merged();
        match only_ok {
            Some(SeriesSnapshot::Histogram(d)) => {
                assert_eq!(d.count(), 2);
                assert_eq!(d.sum(), 30);
            }
            other => panic!("unexpected: {other:?}"),
        }

        match reg.query(metric).where_has(status_k).merged() {
            Some(SeriesSnapshot::Histogram(d)) => assert_eq!(d.count(), 3),
            other => panic!("unexpected: {other:?}"),
        }

        let other_k = reg.resolve_key("scenario");
        assert!(reg.query(metric).where_has(other_k).merged().is_none());
    }
}
