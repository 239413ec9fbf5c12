//! crates/clinic_core/src/seed.rs
//!
//! The built-in dataset substituted for any collection that has never been
//! persisted. Identifiers are fixed so tests and demos can refer to them.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveTime};

use crate::data::{ClinicData, Collection};
use crate::domain::{
    Appointment, AppointmentStatus, Patient, Role, Session, SessionStatus, SessionType,
    Specialty, User,
};
use crate::store::EntityStore;

pub const ADMIN_ID: &str = "u1";
pub const MATILDE_ID: &str = "u2";
pub const DEMO_THERAPIST_ID: &str = "u3";
pub const PATIENT_ANA_ID: &str = "p1";
pub const PATIENT_JOAO_ID: &str = "p2";
pub const SEED_APPOINTMENT_ID: &str = "a1";

pub fn users() -> Vec<User> {
    vec![
        User {
            id: ADMIN_ID.to_string(),
            name: "Administrador".to_string(),
            email: "admin@maisarticular.com".to_string(),
            password: "admin".to_string(),
            role: Role::Admin,
            active: true,
            specialty_id: None,
            specialty: None,
            license_number: None,
            phone: None,
            payment_per_session: None,
            bio: None,
        },
        User {
            id: MATILDE_ID.to_string(),
            name: "Matilde Santos".to_string(),
            email: "matilde@maisarticular.com".to_string(),
            password: "user".to_string(),
            role: Role::Therapist,
            active: true,
            specialty_id: Some("sp1".to_string()),
            specialty: None,
            license_number: Some("TF-10231".to_string()),
            phone: Some("912 345 678".to_string()),
            payment_per_session: Some(25.0),
            bio: Some("Terapeuta da fala com foco em perturbações articulatórias.".to_string()),
        },
        User {
            id: DEMO_THERAPIST_ID.to_string(),
            name: "Terapeuta Demo".to_string(),
            email: "terapeuta@maisarticular.com".to_string(),
            password: "demo".to_string(),
            role: Role::Therapist,
            active: true,
            specialty_id: None,
            specialty: Some("Terapia Ocupacional".to_string()),
            license_number: None,
            phone: None,
            payment_per_session: Some(20.0),
            bio: None,
        },
    ]
}

pub fn patients() -> Vec<Patient> {
    vec![
        Patient {
            id: PATIENT_ANA_ID.to_string(),
            name: "Ana Ferreira".to_string(),
            birth_date: NaiveDate::from_ymd_opt(2018, 3, 14),
            age: Some(7),
            phone: Some("913 222 111".to_string()),
            email: Some("familia.ferreira@example.com".to_string()),
            responsible_name: Some("Carla Ferreira".to_string()),
            therapist_id: MATILDE_ID.to_string(),
            cost_per_session: 45.0,
            custom_prices: BTreeMap::new(),
            diagnosis: Some("Perturbação dos sons da fala".to_string()),
            address: Some("Rua das Flores 12, Porto".to_string()),
            notes: None,
            active: true,
        },
        Patient {
            id: PATIENT_JOAO_ID.to_string(),
            name: "João Costa".to_string(),
            birth_date: NaiveDate::from_ymd_opt(2016, 9, 2),
            age: Some(9),
            phone: Some("916 000 222".to_string()),
            email: None,
            responsible_name: Some("Rui Costa".to_string()),
            therapist_id: DEMO_THERAPIST_ID.to_string(),
            cost_per_session: 0.0,
            custom_prices: BTreeMap::new(),
            diagnosis: Some("Dificuldades de integração sensorial".to_string()),
            address: None,
            notes: None,
            active: true,
        },
    ]
}

/// Sessions are placed relative to `today` so reports have recent data.
pub fn sessions(today: NaiveDate) -> Vec<Session> {
    vec![
        Session {
            id: "s1".to_string(),
            patient_id: PATIENT_ANA_ID.to_string(),
            therapist_id: MATILDE_ID.to_string(),
            session_type_id: None,
            date: today - Duration::days(7),
            start_time: time(10, 0),
            duration_minutes: 45,
            activities: "Treino do fonema /r/ em sílabas".to_string(),
            progress_notes: "Boa colaboração.".to_string(),
            homework: "Repetir lista de palavras.".to_string(),
            status: SessionStatus::Completed,
            cost: 45.0,
            therapist_payment: 25.0,
        },
        Session {
            id: "s2".to_string(),
            patient_id: PATIENT_JOAO_ID.to_string(),
            therapist_id: DEMO_THERAPIST_ID.to_string(),
            session_type_id: Some("st2".to_string()),
            date: today - Duration::days(3),
            start_time: time(15, 30),
            duration_minutes: 60,
            activities: "Circuito de equilíbrio".to_string(),
            progress_notes: String::new(),
            homework: String::new(),
            status: SessionStatus::Completed,
            cost: 40.0,
            therapist_payment: 20.0,
        },
    ]
}

pub fn appointments(today: NaiveDate) -> Vec<Appointment> {
    vec![Appointment {
        id: SEED_APPOINTMENT_ID.to_string(),
        patient_id: PATIENT_ANA_ID.to_string(),
        therapist_id: MATILDE_ID.to_string(),
        session_type_id: None,
        date: today + Duration::days(1),
        time: time(10, 0),
        duration_minutes: 45,
        notes: "Reavaliação trimestral".to_string(),
        status: AppointmentStatus::Pending,
    }]
}

pub fn session_types() -> Vec<SessionType> {
    vec![
        SessionType {
            id: "st1".to_string(),
            name: "Terapia da Fala".to_string(),
            specialty_id: Some("sp1".to_string()),
            default_duration: 45,
            default_cost: 45.0,
            active: true,
        },
        SessionType {
            id: "st2".to_string(),
            name: "Terapia Ocupacional".to_string(),
            specialty_id: Some("sp2".to_string()),
            default_duration: 60,
            default_cost: 40.0,
            active: true,
        },
    ]
}

pub fn specialties() -> Vec<Specialty> {
    vec![
        Specialty {
            id: "sp1".to_string(),
            name: "Terapia da Fala".to_string(),
            description: None,
        },
        Specialty {
            id: "sp2".to_string(),
            name: "Terapia Ocupacional".to_string(),
            description: None,
        },
    ]
}

/// Replaces `collection` inside `data` with its seed content.
pub fn fill(data: &mut ClinicData, collection: Collection, today: NaiveDate) {
    // Seed ids are literals, so duplicates cannot occur.
    match collection {
        Collection::Users => data.users = seeded(users()),
        Collection::Patients => data.patients = seeded(patients()),
        Collection::Sessions => data.sessions = seeded(sessions(today)),
        Collection::Appointments => data.appointments = seeded(appointments(today)),
        Collection::SessionTypes => data.session_types = seeded(session_types()),
        Collection::Specialties => data.specialties = seeded(specialties()),
        Collection::WaitingList => data.waiting_list = EntityStore::new(),
        Collection::Documents => data.documents = EntityStore::new(),
    }
}

/// A complete seeded dataset.
pub fn dataset(today: NaiveDate) -> ClinicData {
    let mut data = ClinicData::new();
    for collection in Collection::ALL {
        fill(&mut data, collection, today);
    }
    data
}

fn seeded<E: crate::store::Entity>(items: Vec<E>) -> EntityStore<E> {
    EntityStore::from_vec(items).unwrap_or_default()
}

fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn seed_satisfies_entity_invariants() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let data = dataset(today);

        assert_eq!(data.users.len(), 3);
        assert_eq!(data.patients.len(), 2);
        assert_eq!(data.sessions.len(), 2);
        assert_eq!(data.appointments.len(), 1);

        let emails: HashSet<_> = data.users.iter().map(|u| u.email.to_lowercase()).collect();
        assert_eq!(emails.len(), data.users.len());

        for patient in data.patients.iter() {
            let therapist = data.users.get(&patient.therapist_id).unwrap();
            assert_eq!(therapist.role, Role::Therapist);
        }
        assert!(data
            .appointments
            .iter()
            .all(|a| a.status == AppointmentStatus::Pending));
    }
}
