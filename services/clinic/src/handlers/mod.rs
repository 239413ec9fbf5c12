//! services/clinic/src/handlers/mod.rs
//!
//! Operations on `AppState`, grouped by the records they manage. Each
//! mutation stages its change, persists it and only then becomes visible.

pub mod catalog;
pub mod patients;
pub mod reporting;
pub mod scheduling;
pub mod users;

pub use patients::{NewPatient, PatientRemoval};
pub use reporting::{Report, ReportKind};
pub use scheduling::{NewAppointment, NewSession};
pub use users::NewUser;
