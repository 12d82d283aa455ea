use std::collections::HashMap;

use super::record::{RayId, RayRecord};

struct Partial {
    reported: usize,
    merged: RayRecord,
}

/// Collects one report per partition for each ray and releases the merged record
/// once all `expected` reporters have been heard from. Reports may arrive in any order.
pub struct Reduction {
    expected: usize,
    merge: fn(RayRecord, RayRecord) -> RayRecord,
    pending: HashMap<RayId, Partial>,
}

impl Reduction {
    pub fn new(expected: usize, merge: fn(RayRecord, RayRecord) -> RayRecord) -> Self {
        assert!(expected > 0, "a reduction needs at least one reporter");
        Self {
            expected,
            merge,
            pending: HashMap::new(),
        }
    }

    pub fn report(&mut self, record: RayRecord) -> Option<RayRecord> {
        if self.expected == 1 {
            return Some(record);
        }

        let merge = self.merge;
        let partial = self.pending.entry(record.id).or_insert(Partial {
            reported: 0,
            merged: record,
        });
        if partial.reported > 0 {
            partial.merged = merge(partial.merged, record);
        }
        partial.reported += 1;

        if partial.reported < self.expected {
            return None;
        }
        self.pending.remove(&record.id).map(|partial| partial.merged)
    }

    /// Rays with some but not all reports in.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}
