//! Partition Map.
//!
//! Authoritative `partition -> owner` mapping, double-buffered via
//! `ArcSwap` so readers never observe a partially-built map (teacher's
//! idiom for this lock-free snapshot swap is borrowed from
//! `hlieu5402-collab-spark2026`, which uses `arc-swap` for the same
//! publish-a-new-immutable-snapshot pattern).

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub type PartitionId = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionOwner {
    pub instance_id: String,
    pub ip: String,
    pub port: u16,
    pub acq_time: u64,
}

/// Raw announcement from the discovery feed, pre-conflict-resolution.
#[derive(Debug, Clone)]
pub struct PartitionAnnouncement {
    pub partition: PartitionId,
    pub owner: PartitionOwner,
}

#[derive(Debug, Clone)]
pub struct OwnerChanged {
    pub partition: PartitionId,
    pub old: Option<PartitionOwner>,
    pub new: PartitionOwner,
}

pub type PartitionSnapshot = HashMap<PartitionId, PartitionOwner>;

pub struct PartitionMap {
    total_partitions: u32,
    snapshot: ArcSwap<PartitionSnapshot>,
    events_tx: mpsc::Sender<OwnerChanged>,
}

impl PartitionMap {
    pub fn new(total_partitions: u32) -> (Arc<Self>, mpsc::Receiver<OwnerChanged>) {
        let (tx, rx) = mpsc::channel(256);
        (
            Arc::new(Self {
                total_partitions,
                snapshot: ArcSwap::from_pointee(HashMap::new()),
                events_tx: tx,
            }),
            rx,
        )
    }

    /// Readers always see a fully formed snapshot.
    pub fn load(&self) -> Arc<PartitionSnapshot> {
        self.snapshot.load_full()
    }

    pub fn owner(&self, partition: PartitionId) -> Option<PartitionOwner> {
        self.snapshot.load().get(&partition).cloned()
    }

    pub fn partitions_covered(&self) -> u32 {
        self.snapshot.load().len() as u32
    }

    pub fn is_healthy(&self) -> bool {
        self.partitions_covered() == self.total_partitions
    }

    /// Folds a discovery snapshot into the authoritative map: for each
    /// partition, the record with the greatest `acq_time` wins, ties broken
    /// lexicographically on `instance_id`. Diffs against the
    /// prior map and emits `OwnerChanged` for every changed partition.
    pub async fn apply_snapshot(&self, announcements: Vec<PartitionAnnouncement>) {
        let mut resolved: PartitionSnapshot = HashMap::new();
        for ann in announcements {
            match resolved.get(&ann.partition) {
                None => {
                    resolved.insert(ann.partition, ann.owner);
                }
                Some(existing) => {
                    let replace = match ann.owner.acq_time.cmp(&existing.acq_time) {
                        std::cmp::Ordering::Greater => true,
                        std::cmp::Ordering::Equal => ann.owner.instance_id < existing.instance_id,
                        std::cmp::Ordering::Less => false,
                    };
                    if replace {
                        resolved.insert(ann.partition, ann.owner);
                    }
                }
            }
        }

        let previous = self.snapshot.load_full();
        let mut changed = Vec::new();
        for (partition, owner) in &resolved {
            match previous.get(partition) {
                Some(old) if old == owner => {}
                old => changed.push(OwnerChanged {
                    partition: *partition,
                    old: old.cloned(),
                    new: owner.clone(),
                }),
            }
        }

        self.snapshot.store(Arc::new(resolved));

        for event in changed {
            let _ = self.events_tx.send(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(instance: &str, acq: u64) -> PartitionOwner {
        PartitionOwner {
            instance_id: instance.to_string(),
            ip: "10.0.0.1".to_string(),
            port: 1234,
            acq_time: acq,
        }
    }

    #[tokio::test]
    async fn greatest_acq_time_wins_per_partition() {
        let (map, mut events) = PartitionMap::new(1);
        map.apply_snapshot(vec![PartitionAnnouncement {
            partition: 3,
            owner: owner("node-a", 100),
        }])
        .await;
        assert_eq!(map.owner(3).unwrap().instance_id, "node-a");
        let first = events.try_recv().unwrap();
        assert_eq!(first.new.instance_id, "node-a");

        map.apply_snapshot(vec![
            PartitionAnnouncement {
                partition: 3,
                owner: owner("node-a", 100),
            },
            PartitionAnnouncement {
                partition: 3,
                owner: owner("node-b", 200),
            },
        ])
        .await;
        assert_eq!(map.owner(3).unwrap().instance_id, "node-b");
        let second = events.try_recv().unwrap();
        assert_eq!(second.old.unwrap().instance_id, "node-a");
        assert_eq!(second.new.instance_id, "node-b");
    }

    #[tokio::test]
    async fn ties_break_lexicographically_on_instance_id() {
        let (map, _events) = PartitionMap::new(1);
        map.apply_snapshot(vec![
            PartitionAnnouncement {
                partition: 0,
                owner: owner("zzz", 50),
            },
            PartitionAnnouncement {
                partition: 0,
                owner: owner("aaa", 50),
            },
        ])
        .await;
        assert_eq!(map.owner(0).unwrap().instance_id, "aaa");
    }

    #[tokio::test]
    async fn health_reflects_full_coverage() {
        let (map, _events) = PartitionMap::new(2);
        assert!(!map.is_healthy());
        map.apply_snapshot(vec![
            PartitionAnnouncement { partition: 0, owner: owner("a", 1) },
            PartitionAnnouncement { partition: 1, owner: owner("b", 1) },
        ])
        .await;
        assert!(map.is_healthy());
    }

    #[tokio::test]
    async fn unchanged_partition_does_not_emit_event() {
        let (map, mut events) = PartitionMap::new(1);
        map.apply_snapshot(vec![PartitionAnnouncement { partition: 0, owner: owner("a", 10) }]).await;
        events.try_recv().unwrap();
        map.apply_snapshot(vec![PartitionAnnouncement { partition: 0, owner: owner("a", 10) }]).await;
        assert!(events.try_recv().is_err());
    }
}
