use std::any::Any;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use super::{IncludeSpec, Record};

struct Loaded<R> {
    record: Arc<R>,
    /// What `record`'s relations were filled with.
    filled: IncludeSpec,
}

type Map<R> = HashMap<<R as Record>::Key, Loaded<R>>;

/// Records already loaded during one include fill, keyed by table and then
/// by primary key. A record reached through two paths is shared, not loaded
/// twice, as long as the copy on hand was filled with at least what the
/// second path asks for.
#[derive(Default)]
pub struct LoadedRecords {
    tables: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl LoadedRecords {
    pub fn new() -> Self {
        Self::default()
    }

    fn map<R: Record>(&self) -> Option<&Map<R>> {
        self.tables.get(R::TABLE)?.downcast_ref()
    }

    pub fn get<R: Record>(&self, key: &R::Key) -> Option<Arc<R>> {
        self.map::<R>()?.get(key).map(|l| Arc::clone(&l.record))
    }

    pub fn len<R: Record>(&self) -> usize {
        self.map::<R>().map_or(0, |m| m.len())
    }

    /// Split freshly scanned rows into shared copies already filled with
    /// `spec` (or more) and the ones that still need filling.
    pub fn partition<R: Record>(&self, records: Vec<R>, spec: &IncludeSpec) -> (Vec<Arc<R>>, Vec<R>) {
        let mut seen = Vec::new();
        let mut fresh = Vec::new();
        let map = self.map::<R>();
        for r in records {
            match map.and_then(|m| m.get(&r.key())) {
                Some(l) if l.filled.covers(spec) => seen.push(Arc::clone(&l.record)),
                _ => fresh.push(r),
            }
        }
        (seen, fresh)
    }

    /// Share `record`, filled with `spec`. A loaded copy that covers `spec`
    /// wins; otherwise `record` takes its place for later lookups.
    pub fn intern<R: Record>(&mut self, record: R, spec: &IncludeSpec) -> Arc<R> {
        let key = record.key();
        let slot = self
            .tables
            .entry(R::TABLE)
            .or_insert_with(|| Box::new(Map::<R>::new()));
        let Some(map) = slot.downcast_mut::<Map<R>>() else {
            return Arc::new(record);
        };
        match map.entry(key) {
            Entry::Occupied(e) if e.get().filled.covers(spec) => Arc::clone(&e.get().record),
            Entry::Occupied(mut e) => {
                let record = Arc::new(record);
                e.insert(Loaded {
                    record: Arc::clone(&record),
                    filled: spec.clone(),
                });
                record
            }
            Entry::Vacant(e) => {
                let record = Arc::new(record);
                e.insert(Loaded {
                    record: Arc::clone(&record),
                    filled: spec.clone(),
                });
                record
            }
        }
    }

    pub fn intern_all<R: Record>(&mut self, records: Vec<R>, spec: &IncludeSpec) -> Vec<Arc<R>> {
        records.into_iter().map(|r| self.intern(r, spec)).collect()
    }
}
