//! services/clinic/src/state.rs
//!
//! Defines the application state: the single owner of the clinic's in-memory
//! collections, the logged-in user and the persistence adapter. It is built
//! once at startup and passed by reference to everything that needs it.

use chrono::NaiveDate;
use clinic_core::data::{ClinicData, Collection};
use clinic_core::{Role, User};
use tracing::{info, warn};

use crate::auth;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::persistence::Persistence;

//=========================================================================================
// AppState
//=========================================================================================

pub struct AppState {
    pub(crate) persistence: Persistence,
    pub(crate) data: ClinicData,
    pub(crate) current_user: Option<User>,
    pub(crate) app_version: String,
    pub(crate) report_months: u32,
}

impl AppState {
    /// Loads the stored collections (seeding whatever is missing) and restores
    /// the logged-in user if their account is still active.
    pub async fn load(persistence: Persistence, config: &Config, today: NaiveDate) -> AppResult<Self> {
        let loaded = persistence.load(today).await?;

        let current_user = loaded.current_user.and_then(|mirrored| {
            loaded
                .data
                .users
                .find(&mirrored.id)
                .filter(|u| u.active)
                .cloned()
        });

        let state = Self {
            persistence,
            data: loaded.data,
            current_user,
            app_version: config.app_version.clone(),
            report_months: config.report_months,
        };
        // Keep the mirror in step with the refreshed user, or clear a stale one.
        state
            .persistence
            .save_current_user(state.current_user.as_ref())
            .await?;

        info!(
            users = state.data.users.len(),
            patients = state.data.patients.len(),
            sessions = state.data.sessions.len(),
            appointments = state.data.appointments.len(),
            "Clinic state loaded"
        );
        Ok(state)
    }

    pub fn data(&self) -> &ClinicData {
        &self.data
    }

    pub fn current_user(&self) -> Option<&User> {
        self.current_user.as_ref()
    }

    pub fn app_version(&self) -> &str {
        &self.app_version
    }

    /// The logged-in user, or `Unauthorized`.
    pub(crate) fn actor(&self) -> AppResult<User> {
        self.current_user.clone().ok_or(AppError::Unauthorized)
    }

    pub(crate) fn require_admin(&self) -> AppResult<User> {
        let actor = self.actor()?;
        if actor.role != Role::Admin {
            return Err(AppError::Forbidden(
                "only administrators can do this".to_string(),
            ));
        }
        Ok(actor)
    }

    /// Applies `mutate` to a staged copy of the data, persists the touched
    /// collections in one batch and only then swaps the copy in. A rejected
    /// change or a failed write leaves the state exactly as it was.
    pub(crate) async fn commit<T, F>(&mut self, collections: &[Collection], mutate: F) -> AppResult<T>
    where
        F: FnOnce(&mut ClinicData) -> AppResult<T>,
    {
        let mut staged = self.data.clone();
        let outcome = mutate(&mut staged)?;
        self.persistence.save(&staged, collections).await?;
        self.data = staged;
        Ok(outcome)
    }

    /// Replaces the mirrored copy of the logged-in user after their record changed.
    pub(crate) async fn refresh_current_user(&mut self) -> AppResult<()> {
        let Some(current) = self.current_user.as_ref() else {
            return Ok(());
        };
        let refreshed = self
            .data
            .users
            .find(&current.id)
            .filter(|u| u.active)
            .cloned();
        if refreshed.is_none() {
            warn!(user_id = %current.id, "Logged-in user no longer active, logging out");
        }
        self.current_user = refreshed;
        self.persistence
            .save_current_user(self.current_user.as_ref())
            .await?;
        Ok(())
    }

    //=====================================================================================
    // Authentication
    //=====================================================================================

    /// Checks the credentials against the stored users. The authenticated user
    /// becomes the session and is mirrored to storage.
    pub async fn login(&mut self, email: &str, password: &str) -> AppResult<User> {
        let user = self
            .data
            .user_by_email(email)
            .filter(|u| u.active && auth::verify_password(&u.password, password))
            .cloned()
            .ok_or_else(|| {
                warn!(email, "Rejected login attempt");
                AppError::InvalidCredentials
            })?;

        self.persistence.save_current_user(Some(&user)).await?;
        info!(user_id = %user.id, role = ?user.role, "User logged in");
        self.current_user = Some(user.clone());
        Ok(user)
    }

    pub async fn logout(&mut self) -> AppResult<()> {
        self.persistence.save_current_user(None).await?;
        if let Some(user) = self.current_user.take() {
            info!(user_id = %user.id, "User logged out");
        }
        Ok(())
    }
}

//=========================================================================================
// Test support
//=========================================================================================

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::adapters::MemoryStore;
    use async_trait::async_trait;
    use clinic_core::ports::{KeyValueStore, PortError, PortResult};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    pub fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    pub fn test_config() -> Config {
        Config::from_lookup(|_| None).unwrap()
    }

    pub async fn state_on(store: Arc<dyn KeyValueStore>) -> AppState {
        AppState::load(Persistence::new(store), &test_config(), today())
            .await
            .unwrap()
    }

    /// A fresh seeded state with nobody logged in.
    pub async fn seeded_state() -> AppState {
        state_on(Arc::new(MemoryStore::new())).await
    }

    pub async fn logged_in(email: &str, password: &str) -> AppState {
        let mut state = seeded_state().await;
        state.login(email, password).await.unwrap();
        state
    }

    pub async fn as_admin() -> AppState {
        logged_in("admin@maisarticular.com", "admin").await
    }

    pub async fn as_matilde() -> AppState {
        logged_in("matilde@maisarticular.com", "user").await
    }

    /// A store whose writes can be switched off to simulate an I/O failure.
    #[derive(Default)]
    pub struct FlakyStore {
        pub inner: MemoryStore,
        pub failing: AtomicBool,
    }

    impl FlakyStore {
        pub fn fail_writes(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn check(&self) -> PortResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(PortError::Unexpected("disk full".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get(&self, key: &str) -> PortResult<Option<String>> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: String) -> PortResult<()> {
            self.check()?;
            self.inner.put(key, value).await
        }

        async fn put_many(&self, entries: Vec<(String, String)>) -> PortResult<()> {
            self.check()?;
            self.inner.put_many(entries).await
        }

        async fn remove(&self, key: &str) -> PortResult<()> {
            self.check()?;
            self.inner.remove(key).await
        }
    }
}
