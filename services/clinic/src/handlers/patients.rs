//! services/clinic/src/handlers/patients.rs
//!
//! Patient records, scoped to the logged-in therapist.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use clinic_core::data::{ClinicData, Collection};
use clinic_core::domain::new_id;
use clinic_core::visibility::{self, assign_owner, can_access};
use clinic_core::{Patient, Role, User};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Form data for a new patient.
#[derive(Debug, Clone, Default)]
pub struct NewPatient {
    pub name: String,
    pub birth_date: Option<NaiveDate>,
    pub age: Option<u32>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub responsible_name: Option<String>,
    /// Ignored when a therapist creates the patient.
    pub therapist_id: Option<String>,
    pub cost_per_session: f64,
    pub custom_prices: BTreeMap<String, f64>,
    pub diagnosis: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

/// What a patient deletion removed alongside the patient.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientRemoval {
    pub patient: Patient,
    pub appointments: usize,
    pub waiting_list_entries: usize,
    pub documents: usize,
}

/// Resolves the owning therapist for a record created or edited by `actor`.
pub(crate) fn resolve_therapist(
    data: &ClinicData,
    actor: &User,
    requested: Option<&str>,
) -> AppResult<String> {
    let therapist_id = assign_owner(actor, requested)
        .ok_or_else(|| AppError::Validation("A therapist must be assigned".to_string()))?;
    match data.users.find(&therapist_id) {
        Some(user) if user.role == Role::Therapist => Ok(therapist_id),
        Some(_) => Err(AppError::Validation(format!(
            "User {} is not a therapist",
            therapist_id
        ))),
        None => Err(AppError::NotFound(format!("Therapist {}", therapist_id))),
    }
}

fn validate_patient(data: &ClinicData, patient: &Patient) -> AppResult<()> {
    if patient.name.trim().is_empty() {
        return Err(AppError::Validation("Patient name is required".to_string()));
    }
    let prices = std::iter::once(&patient.cost_per_session).chain(patient.custom_prices.values());
    for price in prices {
        if *price < 0.0 || !price.is_finite() {
            return Err(AppError::Validation("Prices cannot be negative".to_string()));
        }
    }
    if let Some(unknown) = patient
        .custom_prices
        .keys()
        .find(|type_id| !data.session_types.contains(type_id))
    {
        return Err(AppError::Validation(format!("Unknown session type {}", unknown)));
    }
    Ok(())
}

impl AppState {
    pub fn patients(&self) -> AppResult<Vec<Patient>> {
        let actor = self.actor()?;
        Ok(visibility::visible(self.data.patients.list(), &actor))
    }

    /// A patient the actor may see. Records outside their scope read as absent.
    pub fn patient(&self, patient_id: &str) -> AppResult<Patient> {
        let actor = self.actor()?;
        self.data
            .patients
            .find(patient_id)
            .filter(|p| can_access(*p, &actor))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Patient {}", patient_id)))
    }

    pub async fn create_patient(&mut self, draft: NewPatient) -> AppResult<Patient> {
        let actor = self.actor()?;
        let created = self
            .commit(&[Collection::Patients], |data| {
                let therapist_id = resolve_therapist(data, &actor, draft.therapist_id.as_deref())?;
                let patient = Patient {
                    id: new_id(),
                    name: draft.name.trim().to_string(),
                    birth_date: draft.birth_date,
                    age: draft.age,
                    phone: draft.phone,
                    email: draft.email,
                    responsible_name: draft.responsible_name,
                    therapist_id,
                    cost_per_session: draft.cost_per_session,
                    custom_prices: draft.custom_prices,
                    diagnosis: draft.diagnosis,
                    address: draft.address,
                    notes: draft.notes,
                    active: true,
                };
                validate_patient(data, &patient)?;
                data.patients.add(patient.clone())?;
                Ok(patient)
            })
            .await?;
        info!(patient_id = %created.id, therapist_id = %created.therapist_id, "Patient created");
        Ok(created)
    }

    /// Replaces a patient record. Therapists keep ownership of what they edit;
    /// admins may reassign to another therapist. Existing sessions are not
    /// repriced.
    pub async fn update_patient(&mut self, edited: Patient) -> AppResult<Patient> {
        let actor = self.actor()?;
        self.patient(&edited.id)?;

        let updated = self
            .commit(&[Collection::Patients], |data| {
                let mut patient = edited;
                patient.therapist_id =
                    resolve_therapist(data, &actor, Some(patient.therapist_id.as_str()))?;
                validate_patient(data, &patient)?;
                data.patients.update(patient.clone())?;
                Ok(patient)
            })
            .await?;
        info!(patient_id = %updated.id, "Patient updated");
        Ok(updated)
    }

    /// Deletes a patient with their appointments, waiting-list entries and
    /// documents. Their sessions are kept as billing history.
    pub async fn delete_patient(&mut self, patient_id: &str) -> AppResult<PatientRemoval> {
        self.patient(patient_id)?;

        let removal = self
            .commit(
                &[
                    Collection::Patients,
                    Collection::Appointments,
                    Collection::WaitingList,
                    Collection::Documents,
                ],
                |data| {
                    let patient = data.patients.get(patient_id)?.clone();
                    data.patients.remove(patient_id);
                    Ok(PatientRemoval {
                        patient,
                        appointments: data
                            .appointments
                            .remove_where(|a| a.patient_id == patient_id)
                            .len(),
                        waiting_list_entries: data
                            .waiting_list
                            .remove_where(|w| w.patient_id == patient_id)
                            .len(),
                        documents: data
                            .documents
                            .remove_where(|d| d.patient_id == patient_id)
                            .len(),
                    })
                },
            )
            .await?;
        info!(
            patient_id,
            appointments = removal.appointments,
            documents = removal.documents,
            "Patient deleted"
        );
        Ok(removal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;

    fn draft(name: &str, therapist_id: Option<&str>) -> NewPatient {
        NewPatient {
            name: name.to_string(),
            therapist_id: therapist_id.map(str::to_string),
            cost_per_session: 40.0,
            ..NewPatient::default()
        }
    }

    #[tokio::test]
    async fn therapist_created_patients_are_always_their_own() {
        let mut state = as_matilde().await;
        let patient = state.create_patient(draft("Rui", Some("u3"))).await.unwrap();
        assert_eq!(patient.therapist_id, "u2");
        assert_eq!(state.patients().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn admins_must_assign_an_existing_therapist() {
        let mut state = as_admin().await;
        assert!(matches!(
            state.create_patient(draft("Rui", None)).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            state.create_patient(draft("Rui", Some("u1"))).await,
            Err(AppError::Validation(_))
        ));
        let patient = state.create_patient(draft("Rui", Some("u3"))).await.unwrap();
        assert_eq!(patient.therapist_id, "u3");
    }

    #[tokio::test]
    async fn therapists_cannot_see_or_edit_other_patients() {
        let mut state = as_matilde().await;
        assert!(matches!(state.patient("p2"), Err(AppError::NotFound(_))));

        let other = state.data().patients.find("p2").unwrap().clone();
        assert!(matches!(
            state.update_patient(other).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            state.delete_patient("p2").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn custom_prices_must_reference_known_session_types() {
        let mut state = as_matilde().await;
        let mut patient = state.patient("p1").unwrap();
        patient.custom_prices.insert("nope".to_string(), 30.0);
        assert!(matches!(
            state.update_patient(patient.clone()).await,
            Err(AppError::Validation(_))
        ));

        patient.custom_prices.clear();
        patient.custom_prices.insert("st1".to_string(), 30.0);
        let updated = state.update_patient(patient).await.unwrap();
        assert_eq!(updated.custom_prices.get("st1"), Some(&30.0));
    }

    #[tokio::test]
    async fn deleting_a_patient_cascades_appointments_but_keeps_sessions() {
        let mut state = as_admin().await;
        let removal = state.delete_patient("p1").await.unwrap();

        assert_eq!(removal.appointments, 1);
        assert!(!state.data().patients.contains("p1"));
        assert!(state.data().appointments.iter().all(|a| a.patient_id != "p1"));
        assert!(state.data().sessions.iter().any(|s| s.patient_id == "p1"));
        assert_eq!(state.data().patient_name("p1"), "Desconhecido");
    }
}
