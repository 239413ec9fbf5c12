//! services/clinic/src/persistence.rs
//!
//! Maps the in-memory collections to storage keys. Loads each collection or
//! falls back to the seed dataset, and writes complete snapshots after every
//! change.

use std::sync::Arc;

use chrono::NaiveDate;
use clinic_core::data::{ClinicData, Collection, CURRENT_USER_KEY};
use clinic_core::ports::{KeyValueStore, PortError, PortResult};
use clinic_core::store::{Entity, EntityStore};
use clinic_core::{seed, User};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

/// What `Persistence::load` found in storage.
#[derive(Debug, Clone)]
pub struct LoadedState {
    pub data: ClinicData,
    pub current_user: Option<User>,
    /// Collections that were absent and filled from the seed dataset.
    pub seeded: Vec<Collection>,
}

#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn KeyValueStore>,
}

impl Persistence {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Loads every collection. Absent keys are seeded and written back so the
    /// seed stays stable across restarts; malformed keys are an error.
    pub async fn load(&self, today: NaiveDate) -> PortResult<LoadedState> {
        let mut data = ClinicData::new();
        let mut seeded = Vec::new();

        for collection in Collection::ALL {
            let key = collection.key();
            match self.store.get(key).await? {
                Some(raw) => decode_into(&mut data, collection, &raw)?,
                None => {
                    seed::fill(&mut data, collection, today);
                    seeded.push(collection);
                }
            }
        }

        if !seeded.is_empty() {
            info!(?seeded, "Seeding collections missing from storage");
            self.save(&data, &seeded).await?;
        }

        let current_user = match self.store.get(CURRENT_USER_KEY).await? {
            Some(raw) => Some(parse::<User>(CURRENT_USER_KEY, &raw)?),
            None => None,
        };

        Ok(LoadedState {
            data,
            current_user,
            seeded,
        })
    }

    /// Writes full snapshots of `collections` in a single batch.
    pub async fn save(&self, data: &ClinicData, collections: &[Collection]) -> PortResult<()> {
        let mut entries = Vec::with_capacity(collections.len());
        for collection in collections {
            let json = data.snapshot(*collection).map_err(|e| {
                PortError::Unexpected(format!("Cannot serialize {}: {}", collection, e))
            })?;
            entries.push((collection.key().to_string(), json));
        }
        debug!(?collections, "Persisting collections");
        self.store.put_many(entries).await
    }

    pub async fn save_current_user(&self, user: Option<&User>) -> PortResult<()> {
        match user {
            Some(user) => {
                let json = serde_json::to_string(user)
                    .map_err(|e| PortError::Unexpected(e.to_string()))?;
                self.store.put(CURRENT_USER_KEY, json).await
            }
            None => self.store.remove(CURRENT_USER_KEY).await,
        }
    }

    /// Overwrites every collection at once, as a restore does.
    pub async fn replace_all(&self, data: &ClinicData) -> PortResult<()> {
        self.save(data, &Collection::ALL).await
    }
}

fn parse<T: DeserializeOwned>(key: &str, raw: &str) -> PortResult<T> {
    serde_json::from_str(raw).map_err(|e| PortError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn decode<E>(key: &str, raw: &str) -> PortResult<EntityStore<E>>
where
    E: Entity + DeserializeOwned,
{
    let items: Vec<E> = parse(key, raw)?;
    EntityStore::from_vec(items).map_err(|e| PortError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn decode_into(data: &mut ClinicData, collection: Collection, raw: &str) -> PortResult<()> {
    let key = collection.key();
    match collection {
        Collection::Users => data.users = decode(key, raw)?,
        Collection::Patients => data.patients = decode(key, raw)?,
        Collection::Sessions => data.sessions = decode(key, raw)?,
        Collection::Appointments => data.appointments = decode(key, raw)?,
        Collection::SessionTypes => data.session_types = decode(key, raw)?,
        Collection::Specialties => data.specialties = decode(key, raw)?,
        Collection::WaitingList => data.waiting_list = decode(key, raw)?,
        Collection::Documents => data.documents = decode(key, raw)?,
    }
    Ok(())
}
