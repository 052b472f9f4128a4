use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cluster::Version;
use crate::membership::types::NodeId;

static LAST_EPOCH: AtomicU64 = AtomicU64::new(0);

/// Wall-clock nanoseconds, strictly increasing within the process.
pub(crate) fn next_epoch() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0);
    let previous = LAST_EPOCH
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    now.max(previous + 1)
}

/// Versions stamped on the pushes of one local partition.
pub(crate) struct VersionClock {
    epoch: u64,
    seq: AtomicU64,
}

impl VersionClock {
    pub fn new() -> Self {
        Self {
            epoch: next_epoch(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn next(&self) -> Version {
        Version::new(self.epoch, self.seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn current(&self) -> Version {
        Version::new(self.epoch, self.seq.load(Ordering::SeqCst))
    }
}

struct Versioned<T> {
    version: Version,
    value: T,
}

/// Cached copies of the partitions owned by peers, one per node.
///
/// A partition is replaced only by a snapshot with a strictly newer version,
/// so reordered or duplicated pushes are harmless. A peer that restarted
/// pushes under a newer epoch and replaces its old partition at once.
pub(crate) struct RemotePartitions<T> {
    parts: DashMap<NodeId, Versioned<T>>,
}

impl<T> Default for RemotePartitions<T> {
    fn default() -> Self {
        Self {
            parts: DashMap::new(),
        }
    }
}

impl<T> RemotePartitions<T> {
    /// Stores `value` as the partition of `origin`.
    ///
    /// Returns `None` when the snapshot is stale, otherwise the replaced
    /// partition (`Some(None)` on first contact).
    pub fn accept(&self, origin: &NodeId, version: Version, value: T) -> Option<Option<T>> {
        match self.parts.entry(origin.clone()) {
            Entry::Occupied(mut occupied) => {
                let cached = occupied.get().version;
                if version <= cached {
                    return None;
                }
                if version.epoch != cached.epoch {
                    tracing::info!("{} restarted (epoch {} -> {})", origin, cached.epoch, version.epoch);
                }
                let previous = std::mem::replace(occupied.get_mut(), Versioned { version, value });
                Some(Some(previous.value))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Versioned { version, value });
                Some(None)
            }
        }
    }

    pub fn remove(&self, origin: &NodeId) -> Option<T> {
        self.parts.remove(origin).map(|(_, part)| part.value)
    }

    /// First `Some` produced by `f` over the cached partitions.
    pub fn find_map<R>(&self, mut f: impl FnMut(&NodeId, &T) -> Option<R>) -> Option<R> {
        self.parts
            .iter()
            .find_map(|entry| f(entry.key(), &entry.value().value))
    }

    pub fn for_each(&self, mut f: impl FnMut(&NodeId, &T)) {
        for entry in self.parts.iter() {
            f(entry.key(), &entry.value().value);
        }
    }
}
