//! crates/clinic_core/src/store.rs
//!
//! The in-memory entity collections. Each collection keeps insertion order for
//! display and rejects duplicate identifiers.

use crate::domain::{
    Appointment, Patient, PatientDocument, Session, SessionType, Specialty, User,
    WaitingListEntry,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} with id '{id}' already exists")]
    DuplicateId { kind: &'static str, id: String },
    #[error("{kind} with id '{id}' not found")]
    NotFound { kind: &'static str, id: String },
}

/// A record that can live in an `EntityStore`.
pub trait Entity: Clone {
    /// Human-readable kind used in error messages and logs.
    const KIND: &'static str;

    fn id(&self) -> &str;
}

macro_rules! impl_entity {
    ($($ty:ty => $kind:literal),+ $(,)?) => {
        $(
            impl Entity for $ty {
                const KIND: &'static str = $kind;

                fn id(&self) -> &str {
                    &self.id
                }
            }
        )+
    };
}

impl_entity!(
    User => "User",
    Patient => "Patient",
    Session => "Session",
    Appointment => "Appointment",
    SessionType => "SessionType",
    Specialty => "Specialty",
    WaitingListEntry => "WaitingListEntry",
    PatientDocument => "PatientDocument",
);

/// An ordered collection of entities keyed by id.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityStore<E> {
    items: Vec<E>,
}

impl<E> Default for EntityStore<E> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<E: Entity> EntityStore<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a loaded snapshot, rejecting duplicate ids.
    pub fn from_vec(items: Vec<E>) -> Result<Self, StoreError> {
        let mut store = Self::new();
        for item in items {
            store.add(item)?;
        }
        Ok(store)
    }

    /// Appends `entity`. Fails if its id is already present.
    pub fn add(&mut self, entity: E) -> Result<(), StoreError> {
        if self.contains(entity.id()) {
            return Err(StoreError::DuplicateId {
                kind: E::KIND,
                id: entity.id().to_string(),
            });
        }
        self.items.push(entity);
        Ok(())
    }

    /// Replaces the entity with the same id, keeping its position.
    /// Returns the previous version.
    pub fn update(&mut self, entity: E) -> Result<E, StoreError> {
        match self.items.iter_mut().find(|e| e.id() == entity.id()) {
            Some(slot) => Ok(std::mem::replace(slot, entity)),
            None => Err(StoreError::NotFound {
                kind: E::KIND,
                id: entity.id().to_string(),
            }),
        }
    }

    /// Removes the entity with `id`. Absent ids are a no-op.
    pub fn remove(&mut self, id: &str) -> Option<E> {
        let index = self.items.iter().position(|e| e.id() == id)?;
        Some(self.items.remove(index))
    }

    /// Removes every entity matching `predicate` and returns them in order.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Vec<E>
    where
        F: FnMut(&E) -> bool,
    {
        let (removed, kept): (Vec<E>, Vec<E>) =
            std::mem::take(&mut self.items).into_iter().partition(|e| predicate(e));
        self.items = kept;
        removed
    }

    pub fn find(&self, id: &str) -> Option<&E> {
        self.items.iter().find(|e| e.id() == id)
    }

    /// Like `find`, but a miss is an error the caller must handle.
    pub fn get(&self, id: &str) -> Result<&E, StoreError> {
        self.find(id).ok_or_else(|| StoreError::NotFound {
            kind: E::KIND,
            id: id.to_string(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    pub fn list(&self) -> &[E] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<E> {
        self.items.clone()
    }
}
