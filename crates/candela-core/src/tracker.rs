// ── Collection tracking state machine ──
//
// Pure bookkeeping behind the reconciliation engine: which ids the
// index last reported, which per-item loads are still outstanding, and
// whether the collection as a whole has finished its initial load. All
// I/O stays in the client; this module only answers "what changed" and
// "are we done yet" questions, which keeps the ordering rules testable
// without a transport.

use std::collections::BTreeSet;

/// Where a collection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    /// No index observed yet.
    Idle,
    /// First index arrived; per-item loads outstanding.
    Loading,
    /// Initial load complete; updates flow incrementally.
    Steady,
    /// A per-item load failed during the initial load.
    Failed,
}

/// Effect of applying a new index snapshot.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IndexDelta {
    /// Ids present now that were not known before.
    pub added: Vec<u32>,
    /// Ids known before that the index no longer lists.
    pub removed: Vec<u32>,
}

/// Tracks one observed collection of ids.
#[derive(Debug)]
pub struct CollectionTracker {
    name: &'static str,
    phase: LoadPhase,
    known: BTreeSet<u32>,
    /// Per-item loads requested but not yet answered. Only meaningful
    /// for initial-load completion while in `Loading`.
    outstanding: BTreeSet<u32>,
}

impl CollectionTracker {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            phase: LoadPhase::Idle,
            known: BTreeSet::new(),
            outstanding: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    pub fn is_known(&self, id: u32) -> bool {
        self.known.contains(&id)
    }

    /// Whether `id` is known or has a load outstanding. Callbacks for
    /// untracked ids are late deliveries and must be ignored.
    pub fn is_tracked(&self, id: u32) -> bool {
        self.known.contains(&id) || self.outstanding.contains(&id)
    }

    pub fn known_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.known.iter().copied()
    }

    /// Every id with a live per-item observer: loaded ones plus those
    /// whose first answer is still outstanding. Teardown must cover
    /// both.
    pub fn tracked_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.known.union(&self.outstanding).copied()
    }

    /// Apply an index snapshot: the full list of ids the gateway
    /// currently reports. Newly appearing ids become outstanding until
    /// [`item_loaded`](Self::item_loaded) confirms them; disappearing
    /// ids leave both sets, so a pending load that races a removal is
    /// silently dropped.
    pub fn apply_index(&mut self, ids: &[u32]) -> IndexDelta {
        if self.phase == LoadPhase::Idle {
            self.phase = LoadPhase::Loading;
        }

        let next: BTreeSet<u32> = ids.iter().copied().collect();
        let mut delta = IndexDelta::default();

        // Withdrawn ids include ones whose first load never answered;
        // the caller still has an observer to tear down for those.
        for id in self.known.union(&self.outstanding) {
            if !next.contains(id) {
                delta.removed.push(*id);
            }
        }
        for id in &next {
            if !self.known.contains(id) && !self.outstanding.contains(id) {
                delta.added.push(*id);
                self.outstanding.insert(*id);
            }
        }
        for id in &delta.removed {
            self.known.remove(id);
            self.outstanding.remove(id);
        }

        // An empty first index has nothing to wait for.
        if self.phase == LoadPhase::Loading && self.outstanding.is_empty() {
            self.phase = LoadPhase::Steady;
        }
        delta
    }

    /// Record a completed per-item load. Returns `true` when this was
    /// the last outstanding load of the initial phase, i.e. the moment
    /// the collection becomes steady.
    pub fn item_loaded(&mut self, id: u32) -> bool {
        if !self.outstanding.remove(&id) {
            // Late or duplicate answer for an id the index already
            // withdrew; ignore.
            if !self.known.contains(&id) {
                return false;
            }
        }
        self.known.insert(id);
        if self.phase == LoadPhase::Loading && self.outstanding.is_empty() {
            self.phase = LoadPhase::Steady;
            return true;
        }
        false
    }

    /// Record a failed per-item load. Returns `true` when the failure
    /// happened during the initial load and is therefore fatal for the
    /// collection.
    pub fn item_failed(&mut self, id: u32) -> bool {
        let was_outstanding = self.outstanding.remove(&id);
        if self.phase == LoadPhase::Loading && was_outstanding {
            self.phase = LoadPhase::Failed;
            return true;
        }
        false
    }

    /// Forget an id entirely (an observer that could not be registered
    /// after the initial load).
    pub fn forget(&mut self, id: u32) {
        self.known.remove(&id);
        self.outstanding.remove(&id);
        if self.phase == LoadPhase::Loading && self.outstanding.is_empty() {
            self.phase = LoadPhase::Steady;
        }
    }
}
