pub mod backup;
pub mod csv;
pub mod data;
pub mod domain;
pub mod lifecycle;
pub mod ports;
pub mod reports;
pub mod seed;
pub mod store;
pub mod visibility;

pub use backup::{Backup, BackupError, RestoredState};
pub use data::{ClinicData, Collection, CURRENT_USER_KEY};
pub use domain::{
    Appointment, AppointmentStatus, Patient, PatientDocument, Role, Session, SessionStatus,
    SessionType, Specialty, User, WaitingListEntry, WaitingPriority,
};
pub use lifecycle::{LifecycleError, PricingSnapshot, SessionDraft, SessionNotes};
pub use ports::{KeyValueStore, PortError, PortResult};
pub use store::{Entity, EntityStore, StoreError};
