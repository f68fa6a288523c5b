//! Tag index: tag string -> set of entity ids, plus the cached player lookup.

use std::cell::Cell;
use std::collections::{BTreeSet, HashMap};

use crate::entity::EntityId;

/// Reserved tag whose single holder is cached for O(1) lookups.
pub const PLAYER_TAG: &str = "Player";

#[derive(Debug, Default)]
pub(crate) struct TagIndex {
    buckets: HashMap<String, BTreeSet<EntityId>>,
    /// Last resolved player. `None` means "resolve from the bucket".
    player: Cell<Option<EntityId>>,
}

impl TagIndex {
    pub(crate) fn register(&mut self, tag: &str, id: EntityId) {
        self.buckets.entry(tag.to_owned()).or_default().insert(id);
        if tag == PLAYER_TAG {
            self.player.set(Some(id));
        }
    }

    pub(crate) fn unregister(&mut self, tag: &str, id: EntityId) {
        if let Some(bucket) = self.buckets.get_mut(tag) {
            bucket.remove(&id);
            if bucket.is_empty() {
                self.buckets.remove(tag);
            }
        }
        if tag == PLAYER_TAG {
            self.invalidate_player(id);
        }
    }

    /// Drop the cached player if it is `id`.
    pub(crate) fn invalidate_player(&self, id: EntityId) {
        if self.player.get() == Some(id) {
            self.player.set(None);
        }
    }

    pub(crate) fn cached_player(&self) -> Option<EntityId> {
        self.player.get()
    }

    pub(crate) fn cache_player(&self, id: Option<EntityId>) {
        self.player.set(id);
    }

    /// Ids carrying `tag`, ascending. Empty for an unknown tag.
    pub(crate) fn bucket(&self, tag: &str) -> impl Iterator<Item = EntityId> + '_ {
        self.buckets.get(tag).into_iter().flatten().copied()
    }

    pub(crate) fn contains(&self, tag: &str, id: EntityId) -> bool {
        self.buckets.get(tag).is_some_and(|b| b.contains(&id))
    }

    pub(crate) fn clear(&mut self) {
        self.buckets.clear();
        self.player.set(None);
    }
}
