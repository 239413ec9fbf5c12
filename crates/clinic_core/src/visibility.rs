//! crates/clinic_core/src/visibility.rs
//!
//! Role-scoped filtering. Admins see everything; therapists see only records
//! assigned to them. This is a convenience for a single local operator and is
//! not an access-control boundary.

use crate::domain::{Appointment, Patient, PatientDocument, Role, Session, User, WaitingListEntry};

/// A record owned by one therapist.
pub trait Scoped {
    fn therapist_id(&self) -> &str;
}

macro_rules! impl_scoped {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Scoped for $ty {
                fn therapist_id(&self) -> &str {
                    &self.therapist_id
                }
            }
        )+
    };
}

impl_scoped!(Patient, Session, Appointment, WaitingListEntry, PatientDocument);

/// Whether `actor` may see or edit `entity`.
pub fn can_access<E: Scoped>(entity: &E, actor: &User) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Therapist => entity.therapist_id() == actor.id,
    }
}

/// The subset of `entities` visible to `actor`, in the original order.
pub fn visible<E: Scoped + Clone>(entities: &[E], actor: &User) -> Vec<E> {
    match actor.role {
        Role::Admin => entities.to_vec(),
        Role::Therapist => entities
            .iter()
            .filter(|e| e.therapist_id() == actor.id)
            .cloned()
            .collect(),
    }
}

/// Borrowing variant of [`visible`].
pub fn visible_refs<'a, E: Scoped>(entities: &'a [E], actor: &User) -> Vec<&'a E> {
    entities.iter().filter(|e| can_access(*e, actor)).collect()
}

/// The therapist a new record is assigned to. A therapist always owns what
/// they create, whatever the submitted form says; an admin's choice is kept.
pub fn assign_owner(actor: &User, requested: Option<&str>) -> Option<String> {
    match actor.role {
        Role::Therapist => Some(actor.id.clone()),
        Role::Admin => requested
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::{self, ADMIN_ID, DEMO_THERAPIST_ID, MATILDE_ID};

    fn user(id: &str) -> User {
        seed::users().into_iter().find(|u| u.id == id).unwrap()
    }

    #[test]
    fn admin_sees_everything_in_order() {
        let patients = seed::patients();
        let seen = visible(&patients, &user(ADMIN_ID));
        assert_eq!(seen, patients);
    }

    #[test]
    fn therapist_sees_only_own_records() {
        let patients = seed::patients();
        let seen = visible(&patients, &user(MATILDE_ID));
        assert_eq!(seen.len(), 1);
        assert!(seen.iter().all(|p| p.therapist_id == MATILDE_ID));

        let today = chrono::NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let sessions = seed::sessions(today);
        let refs = visible_refs(&sessions, &user(DEMO_THERAPIST_ID));
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].therapist_id, DEMO_THERAPIST_ID);
    }

    #[test]
    fn therapist_ownership_is_forced_on_create() {
        let matilde = user(MATILDE_ID);
        assert_eq!(
            assign_owner(&matilde, Some(DEMO_THERAPIST_ID)),
            Some(MATILDE_ID.to_string())
        );
        assert_eq!(assign_owner(&matilde, None), Some(MATILDE_ID.to_string()));

        let admin = user(ADMIN_ID);
        assert_eq!(
            assign_owner(&admin, Some(DEMO_THERAPIST_ID)),
            Some(DEMO_THERAPIST_ID.to_string())
        );
        assert_eq!(assign_owner(&admin, Some("  ")), None);
    }
}
