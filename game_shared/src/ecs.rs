//! Entity/component storage (minimal ECS).
//!
//! Typed component storages keyed by entity id. The server keeps one
//! `Character` per connected player here. Storages are ordered by id so every
//! iteration visits entities in the same order.

use std::{
    any::{Any, TypeId},
    collections::BTreeMap,
};

use serde::{Deserialize, Serialize};

/// Opaque entity id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

type Storage<T> = BTreeMap<EntityId, T>;

/// Simple world that can store typed components.
#[derive(Default)]
pub struct World {
    next_id: u64,
    storages: BTreeMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl World {
    /// Creates a new entity.
    pub fn spawn(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Inserts/replaces a component for an entity.
    pub fn insert<T: 'static + Send + Sync>(&mut self, entity: EntityId, component: T) {
        let storage = self
            .storages
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Storage::<T>::new()));
        if let Some(storage) = storage.downcast_mut::<Storage<T>>() {
            storage.insert(entity, component);
        }
    }

    /// Removes and returns a component.
    pub fn remove<T: 'static + Send + Sync>(&mut self, entity: EntityId) -> Option<T> {
        self.storage_mut::<T>()
            .and_then(|storage| storage.remove(&entity))
    }

    /// Gets a component reference.
    pub fn get<T: 'static + Send + Sync>(&self, entity: EntityId) -> Option<&T> {
        self.storage::<T>().and_then(|storage| storage.get(&entity))
    }

    /// Gets a mutable component reference.
    pub fn get_mut<T: 'static + Send + Sync>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.storage_mut::<T>()
            .and_then(|storage| storage.get_mut(&entity))
    }

    /// Iterates entities with a given component.
    pub fn iter<T: 'static + Send + Sync>(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.storage::<T>()
            .into_iter()
            .flat_map(|storage| storage.iter().map(|(k, v)| (*k, v)))
    }

    /// Iterates entities with a given component, mutably.
    pub fn iter_mut<T: 'static + Send + Sync>(
        &mut self,
    ) -> impl Iterator<Item = (EntityId, &mut T)> {
        self.storage_mut::<T>()
            .into_iter()
            .flat_map(|storage| storage.iter_mut().map(|(k, v)| (*k, v)))
    }

    /// Number of entities carrying a component.
    pub fn count<T: 'static + Send + Sync>(&self) -> usize {
        self.storage::<T>().map_or(0, Storage::len)
    }

    fn storage<T: 'static + Send + Sync>(&self) -> Option<&Storage<T>> {
        self.storages
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<Storage<T>>())
    }

    fn storage_mut<T: 'static + Send + Sync>(&mut self) -> Option<&mut Storage<T>> {
        self.storages
            .get_mut(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_mut::<Storage<T>>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Name(&'static str);

    #[test]
    fn insert_get_remove() {
        let mut world = World::default();
        let e = world.spawn();
        world.insert(e, Name("a"));
        assert_eq!(world.get::<Name>(e), Some(&Name("a")));
        assert_eq!(world.remove::<Name>(e), Some(Name("a")));
        assert!(world.get::<Name>(e).is_none());
        assert_eq!(world.count::<Name>(), 0);
    }

    #[test]
    fn iterates_in_id_order() {
        let mut world = World::default();
        let ids: Vec<_> = (0..4).map(|_| world.spawn()).collect();
        for id in ids.iter().rev() {
            world.insert(*id, id.0 as u32);
        }
        for (_, v) in world.iter_mut::<u32>() {
            *v *= 10;
        }
        let seen: Vec<_> = world.iter::<u32>().map(|(_, v)| *v).collect();
        assert_eq!(seen, vec![0, 10, 20, 30]);
    }
}
