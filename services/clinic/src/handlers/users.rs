//! services/clinic/src/handlers/users.rs
//!
//! Account management: administrators and therapists.

use clinic_core::data::{ClinicData, Collection};
use clinic_core::domain::new_id;
use clinic_core::{AppointmentStatus, Role, User};
use tracing::info;

use crate::auth;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Form data for a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub specialty_id: Option<String>,
    pub license_number: Option<String>,
    pub phone: Option<String>,
    pub payment_per_session: Option<f64>,
    pub bio: Option<String>,
}

impl NewUser {
    pub fn therapist(name: &str, email: &str, password: &str, payment_per_session: f64) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            role: Role::Therapist,
            specialty_id: None,
            license_number: None,
            phone: None,
            payment_per_session: Some(payment_per_session),
            bio: None,
        }
    }
}

fn validate_profile(data: &ClinicData, user: &User) -> AppResult<()> {
    if user.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    let email = user.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation(format!("'{}' is not a valid email", user.email)));
    }
    if let Some(existing) = data.user_by_email(email) {
        if existing.id != user.id {
            return Err(AppError::Conflict(format!("Email {} is already in use", email)));
        }
    }
    if matches!(user.payment_per_session, Some(p) if p < 0.0 || !p.is_finite()) {
        return Err(AppError::Validation(
            "Payment per session cannot be negative".to_string(),
        ));
    }
    if let Some(specialty_id) = &user.specialty_id {
        if !data.specialties.contains(specialty_id) {
            return Err(AppError::Validation(format!("Unknown specialty {}", specialty_id)));
        }
    }
    Ok(())
}

/// Fails while patients, pending appointments, waiting-list entries or
/// documents are still assigned to `user`.
fn ensure_unassigned(data: &ClinicData, user: &User) -> AppResult<()> {
    let patients = data.patients.iter().filter(|p| p.therapist_id == user.id).count();
    let appointments = data
        .appointments
        .iter()
        .filter(|a| a.therapist_id == user.id && a.status == AppointmentStatus::Pending)
        .count();
    let other_refs = data.waiting_list.iter().any(|w| w.therapist_id == user.id)
        || data.documents.iter().any(|d| d.therapist_id == user.id);
    if patients > 0 || appointments > 0 || other_refs {
        return Err(AppError::Conflict(format!(
            "{} still has {} patient(s) and {} pending appointment(s) assigned",
            user.name, patients, appointments
        )));
    }
    Ok(())
}

fn other_active_admins(data: &ClinicData, user_id: &str) -> usize {
    data.users
        .iter()
        .filter(|u| u.id != user_id && u.active && u.role == Role::Admin)
        .count()
}

impl AppState {
    /// Admins see every account; therapists see only their own.
    pub fn users(&self) -> AppResult<Vec<User>> {
        let actor = self.actor()?;
        Ok(match actor.role {
            Role::Admin => self.data.users.to_vec(),
            Role::Therapist => self
                .data
                .users
                .iter()
                .filter(|u| u.id == actor.id)
                .cloned()
                .collect(),
        })
    }

    /// Active therapists, for assignment pickers.
    pub fn therapists(&self) -> Vec<&User> {
        self.data
            .users
            .iter()
            .filter(|u| u.is_therapist() && u.active)
            .collect()
    }

    pub async fn create_user(&mut self, draft: NewUser) -> AppResult<User> {
        self.require_admin()?;
        auth::validate_new_password(&draft.password)?;

        let therapist_only = |value: Option<String>| match draft.role {
            Role::Therapist => value,
            Role::Admin => None,
        };
        let user = User {
            id: new_id(),
            name: draft.name.trim().to_string(),
            email: draft.email.trim().to_string(),
            password: auth::hash_password(&draft.password)?,
            role: draft.role,
            active: true,
            specialty_id: therapist_only(draft.specialty_id.clone()),
            specialty: None,
            license_number: therapist_only(draft.license_number.clone()),
            phone: draft.phone.clone(),
            payment_per_session: match draft.role {
                Role::Therapist => draft.payment_per_session,
                Role::Admin => None,
            },
            bio: therapist_only(draft.bio.clone()),
        };

        let created = self
            .commit(&[Collection::Users], |data| {
                validate_profile(data, &user)?;
                data.users.add(user.clone())?;
                Ok(user)
            })
            .await?;
        info!(user_id = %created.id, role = ?created.role, "User created");
        Ok(created)
    }

    /// Replaces a user's profile. The stored password is always kept; use
    /// `change_password` for that. Non-admins may edit only their own profile
    /// and cannot change their role, active flag or rate.
    pub async fn update_user(&mut self, edited: User) -> AppResult<User> {
        let actor = self.actor()?;
        let stored = self
            .data
            .users
            .find(&edited.id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("User {}", edited.id)))?;

        let mut user = edited;
        user.password = stored.password.clone();
        if !actor.is_admin() {
            if actor.id != user.id {
                return Err(AppError::Forbidden("cannot edit other accounts".to_string()));
            }
            user.role = stored.role;
            user.active = stored.active;
            user.payment_per_session = stored.payment_per_session;
        }

        let leaves_therapy = stored.role == Role::Therapist && user.role != Role::Therapist;
        let loses_admin = stored.role == Role::Admin
            && stored.active
            && (user.role != Role::Admin || !user.active);
        let updated = self
            .commit(&[Collection::Users], |data| {
                validate_profile(data, &user)?;
                if leaves_therapy {
                    ensure_unassigned(data, &stored)?;
                }
                if loses_admin && other_active_admins(data, &user.id) == 0 {
                    return Err(AppError::Conflict(
                        "At least one active administrator must remain".to_string(),
                    ));
                }
                data.users.update(user.clone())?;
                Ok(user)
            })
            .await?;

        self.refresh_current_user().await?;
        info!(user_id = %updated.id, "User updated");
        Ok(updated)
    }

    pub async fn change_password(&mut self, user_id: &str, new_password: &str) -> AppResult<()> {
        let actor = self.actor()?;
        if !actor.is_admin() && actor.id != user_id {
            return Err(AppError::Forbidden(
                "cannot change another user's password".to_string(),
            ));
        }
        auth::validate_new_password(new_password)?;
        let hash = auth::hash_password(new_password)?;

        self.commit(&[Collection::Users], |data| {
            let mut user = data.users.get(user_id)?.clone();
            user.password = hash;
            data.users.update(user)?;
            Ok(())
        })
        .await?;
        self.refresh_current_user().await?;
        info!(user_id, "Password changed");
        Ok(())
    }

    /// Deletes an account. Refused for the actor's own account, the last
    /// active administrator, and users still assigned to patients,
    /// appointments, waiting-list entries or documents. Sessions stay as
    /// billing history and never block deletion.
    pub async fn delete_user(&mut self, user_id: &str) -> AppResult<User> {
        let actor = self.require_admin()?;
        if actor.id == user_id {
            return Err(AppError::Conflict("You cannot delete your own account".to_string()));
        }

        let removed = self
            .commit(&[Collection::Users], |data| {
                let user = data.users.get(user_id)?.clone();
                if user.role == Role::Admin && user.active && other_active_admins(data, user_id) == 0 {
                    return Err(AppError::Conflict(
                        "At least one active administrator must remain".to_string(),
                    ));
                }
                ensure_unassigned(data, &user)?;
                data.users.remove(user_id);
                Ok(user)
            })
            .await?;
        info!(user_id, "User deleted");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;

    #[tokio::test]
    async fn admins_create_therapists_with_hashed_passwords() {
        let mut state = as_admin().await;
        let created = state
            .create_user(NewUser::therapist("Rita Lopes", "rita@maisarticular.com", "segredo", 30.0))
            .await
            .unwrap();
        assert!(auth::is_hashed(&created.password));
        assert_eq!(created.payment_per_session, Some(30.0));

        state.logout().await.unwrap();
        let logged = state.login("rita@maisarticular.com", "segredo").await.unwrap();
        assert_eq!(logged.id, created.id);
    }

    #[tokio::test]
    async fn emails_are_unique_ignoring_case() {
        let mut state = as_admin().await;
        let err = state
            .create_user(NewUser::therapist("Copy", "MATILDE@maisarticular.com", "abcd", 10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(state.data().users.len(), 3);
    }

    #[tokio::test]
    async fn therapists_cannot_create_accounts() {
        let mut state = as_matilde().await;
        let err = state
            .create_user(NewUser::therapist("X", "x@maisarticular.com", "abcd", 10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn own_account_and_last_admin_are_protected() {
        let mut state = as_admin().await;
        assert!(matches!(
            state.delete_user("u1").await,
            Err(AppError::Conflict(_))
        ));

        let mut admin = state.data().users.find("u1").unwrap().clone();
        admin.role = Role::Therapist;
        assert!(matches!(
            state.update_user(admin).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(state.data().users.find("u1").unwrap().role, Role::Admin);
    }

    #[tokio::test]
    async fn therapists_with_assigned_patients_cannot_be_deleted() {
        let mut state = as_admin().await;
        assert!(matches!(
            state.delete_user("u2").await,
            Err(AppError::Conflict(_))
        ));

        let spare = state
            .create_user(NewUser::therapist("Spare", "spare@maisarticular.com", "abcd", 10.0))
            .await
            .unwrap();
        let removed = state.delete_user(&spare.id).await.unwrap();
        assert_eq!(removed.id, spare.id);
        assert!(!state.data().users.contains(&spare.id));
    }

    #[tokio::test]
    async fn assigned_therapists_cannot_become_admins() {
        let mut state = as_admin().await;
        let mut matilde = state.data().users.find("u2").unwrap().clone();
        matilde.role = Role::Admin;
        assert!(matches!(
            state.update_user(matilde).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(state.data().users.find("u2").unwrap().role, Role::Therapist);

        let spare = state
            .create_user(NewUser::therapist("Spare", "spare@maisarticular.com", "abcd", 10.0))
            .await
            .unwrap();
        let mut promoted = spare.clone();
        promoted.role = Role::Admin;
        let updated = state.update_user(promoted).await.unwrap();
        assert_eq!(updated.role, Role::Admin);
    }

    #[tokio::test]
    async fn therapists_edit_only_their_own_profile_fields() {
        let mut state = as_matilde().await;
        let mut me = state.current_user().unwrap().clone();
        me.bio = Some("Nova biografia".to_string());
        me.payment_per_session = Some(500.0);
        me.role = Role::Admin;

        let updated = state.update_user(me).await.unwrap();
        assert_eq!(updated.bio.as_deref(), Some("Nova biografia"));
        assert_eq!(updated.payment_per_session, Some(25.0));
        assert_eq!(updated.role, Role::Therapist);
        assert_eq!(state.current_user().unwrap().bio.as_deref(), Some("Nova biografia"));

        let other = state.data().users.find("u3").unwrap().clone();
        assert!(matches!(
            state.update_user(other).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn changing_a_password_replaces_the_legacy_value() {
        let mut state = as_matilde().await;
        state.change_password("u2", "nova-pass").await.unwrap();
        assert!(auth::is_hashed(&state.data().users.find("u2").unwrap().password));

        state.logout().await.unwrap();
        assert!(state.login("matilde@maisarticular.com", "user").await.is_err());
        assert!(state.login("matilde@maisarticular.com", "nova-pass").await.is_ok());
    }
}
