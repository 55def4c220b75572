use std::collections::{BTreeMap, HashMap};

use ulid::Ulid;

use crate::model::{Ms, Span};

/// Ordered set of one doctor's occupying intervals.
///
/// Keyed by `(start, id)`. Together with the longest indexed duration this bounds every
/// overlap query to keys in `[query.start - longest, query.end)`: an interval starting
/// earlier than that has already ended. Not thread-safe; callers hold the calendar lock.
#[derive(Debug, Clone, Default)]
pub struct AvailabilityIndex {
    by_start: BTreeMap<(Ms, Ulid), Ms>,
    spans: HashMap<Ulid, Span>,
    /// High-water mark, only lowered by `rebuild`.
    longest: Ms,
}

impl AvailabilityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from scratch. Later duplicates of an id replace earlier ones.
    pub fn rebuild(entries: impl IntoIterator<Item = (Ulid, Span)>) -> Self {
        let mut index = Self::new();
        for (id, span) in entries {
            index.insert(span, id);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn get(&self, id: &Ulid) -> Option<Span> {
        self.spans.get(id).copied()
    }

    /// Index `span` under `id`, replacing any previous span of the same id.
    pub fn insert(&mut self, span: Span, id: Ulid) {
        if let Some(old) = self.spans.insert(id, span) {
            self.by_start.remove(&(old.start, id));
        }
        self.by_start.insert((span.start, id), span.end);
        self.longest = self.longest.max(span.duration_ms());
    }

    pub fn remove(&mut self, id: &Ulid) -> Option<Span> {
        let span = self.spans.remove(id)?;
        self.by_start.remove(&(span.start, *id));
        Some(span)
    }

    /// Move `id` to `span` in one step. Returns the previous span, `None` if `id` was not
    /// indexed (in which case nothing changes).
    pub fn replace(&mut self, id: &Ulid, span: Span) -> Option<Span> {
        let old = self.get(id)?;
        self.insert(span, *id);
        Some(old)
    }

    /// Indexed intervals overlapping `query`, in start order.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = (Ulid, Span)> + '_ {
        let query = *query;
        let lower = query.start.saturating_sub(self.longest);
        let upper = query.end.max(lower);
        self.by_start
            .range((lower, Ulid::nil())..(upper, Ulid::nil()))
            .filter(move |(_, end)| **end > query.start)
            .map(|(&(start, id), &end)| (id, Span { start, end }))
    }

    /// Ids colliding with `query`. Empty means free relative to existing bookings.
    pub fn query_overlap(&self, query: &Span) -> Vec<Ulid> {
        self.overlapping(query).map(|(id, _)| id).collect()
    }

    /// Same as `query_overlap` but ignoring one appointment (the one being moved).
    pub fn query_overlap_excluding(&self, query: &Span, exclude: &Ulid) -> Vec<Ulid> {
        self.overlapping(query)
            .filter_map(|(id, _)| (id != *exclude).then_some(id))
            .collect()
    }

    /// Occupied spans overlapping `query`, clamped to it, in start order.
    pub fn occupied_within(&self, query: &Span) -> Vec<Span> {
        self.overlapping(query)
            .filter_map(|(_, span)| span.clamp_to(query))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Ulid, Span)> + '_ {
        self.by_start
            .iter()
            .map(|(&(start, id), &end)| (id, Span { start, end }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(spans: &[(Ms, Ms)]) -> (AvailabilityIndex, Vec<Ulid>) {
        let mut idx = AvailabilityIndex::new();
        let mut ids = Vec::new();
        for &(s, e) in spans {
            let id = Ulid::new();
            idx.insert(Span::new(s, e), id);
            ids.push(id);
        }
        (idx, ids)
    }

    #[test]
    fn iter_in_start_order() {
        let (idx, _) = index_of(&[(300, 400), (100, 200), (200, 300)]);
        let starts: Vec<Ms> = idx.iter().map(|(_, s)| s.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn overlap_skips_past_and_future() {
        let (idx, ids) = index_of(&[(100, 200), (450, 600), (1000, 1100)]);
        assert_eq!(idx.query_overlap(&Span::new(500, 800)), vec![ids[1]]);
    }

    #[test]
    fn adjacent_is_not_overlap() {
        let (idx, _) = index_of(&[(100, 200)]);
        assert!(idx.query_overlap(&Span::new(200, 300)).is_empty());
        assert!(idx.query_overlap(&Span::new(0, 100)).is_empty());
    }

    #[test]
    fn single_ms_overlap() {
        let (idx, ids) = index_of(&[(100, 201)]);
        assert_eq!(idx.query_overlap(&Span::new(200, 300)), vec![ids[0]]);
    }

    #[test]
    fn long_interval_starting_well_before_query() {
        // A short interval between the long one and the query must not hide it.
        let (idx, ids) = index_of(&[(0, 10_000), (50, 60)]);
        assert_eq!(idx.query_overlap(&Span::new(5_000, 5_100)), vec![ids[0]]);
    }

    #[test]
    fn query_covering_many() {
        let (idx, ids) = index_of(&[(0, 10), (10, 20), (20, 30), (40, 50)]);
        assert_eq!(idx.query_overlap(&Span::new(5, 45)), ids);
    }

    #[test]
    fn remove_and_missing_remove() {
        let (mut idx, ids) = index_of(&[(0, 10), (20, 30)]);
        assert_eq!(idx.remove(&ids[0]), Some(Span::new(0, 10)));
        assert_eq!(idx.remove(&ids[0]), None);
        assert_eq!(idx.len(), 1);
        assert!(idx.query_overlap(&Span::new(0, 10)).is_empty());
    }

    #[test]
    fn replace_moves_interval() {
        let (mut idx, ids) = index_of(&[(0, 10)]);
        assert_eq!(idx.replace(&ids[0], Span::new(50, 60)), Some(Span::new(0, 10)));
        assert!(idx.query_overlap(&Span::new(0, 10)).is_empty());
        assert_eq!(idx.query_overlap(&Span::new(55, 56)), vec![ids[0]]);
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn replace_unknown_is_noop() {
        let (mut idx, _) = index_of(&[(0, 10)]);
        assert_eq!(idx.replace(&Ulid::new(), Span::new(50, 60)), None);
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn excluding_self() {
        let (idx, ids) = index_of(&[(0, 10), (10, 20)]);
        assert_eq!(idx.query_overlap_excluding(&Span::new(5, 15), &ids[0]), vec![ids[1]]);
    }

    #[test]
    fn occupied_within_clamps() {
        let (idx, _) = index_of(&[(0, 10), (15, 30)]);
        assert_eq!(
            idx.occupied_within(&Span::new(5, 20)),
            vec![Span::new(5, 10), Span::new(15, 20)]
        );
    }

    #[test]
    fn rebuild_matches_incremental() {
        let (idx, _) = index_of(&[(0, 10), (30, 45), (60, 61)]);
        let rebuilt = AvailabilityIndex::rebuild(idx.iter());
        assert_eq!(rebuilt.iter().collect::<Vec<_>>(), idx.iter().collect::<Vec<_>>());
        let again = AvailabilityIndex::rebuild(rebuilt.iter());
        assert_eq!(again.iter().collect::<Vec<_>>(), idx.iter().collect::<Vec<_>>());
    }
}
