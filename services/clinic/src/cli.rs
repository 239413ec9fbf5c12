//! services/clinic/src/cli.rs
//!
//! Command-line front end for the `clinic` binary.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use clinic_core::reports::DateRange;
use clinic_core::{Role, SessionNotes, SessionType, Specialty, WaitingPriority};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::handlers::{NewAppointment, NewPatient, NewSession, NewUser, ReportKind};
use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "clinic", version, about = "Clinic practice management")]
pub struct Cli {
    /// Print records as JSON instead of plain lines.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq)]
pub enum Command {
    /// Log in and remember the user for later commands.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    Whoami,
    Patients,
    /// Lists appointments, optionally only the pending ones for one day.
    Appointments {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    Sessions,
    Schedule {
        #[arg(long)]
        patient: String,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        time: NaiveTime,
        /// Ignored for therapists.
        #[arg(long)]
        therapist: Option<String>,
        #[arg(long = "session-type")]
        session_type: Option<String>,
        #[arg(long)]
        duration: Option<u32>,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Registers a pending appointment as a completed session.
    Convert {
        appointment: String,
        #[arg(long)]
        activities: String,
        #[arg(long = "progress-notes", default_value = "")]
        progress_notes: String,
        #[arg(long, default_value = "")]
        homework: String,
    },
    Cancel {
        appointment: String,
    },
    Dashboard,
    Report {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        #[arg(long, value_enum, default_value_t = CsvKind::Summary)]
        kind: CsvKind,
        /// Writes the table as CSV to this path instead of printing the report.
        #[arg(long, value_hint = clap::ValueHint::FilePath)]
        csv: Option<PathBuf>,
    },
    /// Writes a full backup document.
    Export {
        #[arg(value_hint = clap::ValueHint::FilePath)]
        path: PathBuf,
    },
    /// Replaces all data with the contents of a backup document.
    Import {
        #[arg(value_hint = clap::ValueHint::FilePath)]
        path: PathBuf,
    },
    Patient {
        #[command(subcommand)]
        action: PatientAction,
    },
    Appointment {
        #[command(subcommand)]
        action: AppointmentAction,
    },
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    #[command(name = "session-type")]
    SessionType {
        #[command(subcommand)]
        action: SessionTypeAction,
    },
    Specialty {
        #[command(subcommand)]
        action: SpecialtyAction,
    },
    /// Patients waiting for a free slot.
    Waiting {
        #[command(subcommand)]
        action: WaitingAction,
    },
    Document {
        #[command(subcommand)]
        action: DocumentAction,
    },
}

#[derive(Debug, Subcommand, PartialEq)]
pub enum PatientAction {
    Add {
        #[arg(long)]
        name: String,
        /// Ignored for therapists.
        #[arg(long)]
        therapist: Option<String>,
        #[arg(long, default_value_t = 0.0)]
        cost: f64,
        #[arg(long = "birth-date")]
        birth_date: Option<NaiveDate>,
        #[arg(long)]
        age: Option<u32>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        responsible: Option<String>,
        #[arg(long)]
        diagnosis: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Changes the given fields and keeps the rest.
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        therapist: Option<String>,
        #[arg(long)]
        cost: Option<f64>,
        /// Sets a per-session-type price, as `TYPE_ID=PRICE`.
        #[arg(long = "price", value_parser = parse_price)]
        prices: Vec<(String, f64)>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        diagnosis: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        active: Option<bool>,
    },
    /// Deletes a patient with their appointments, waiting-list entries and documents.
    Remove { id: String },
}

#[derive(Debug, Subcommand, PartialEq)]
pub enum AppointmentAction {
    Remove { id: String },
}

#[derive(Debug, Subcommand, PartialEq)]
pub enum SessionAction {
    /// Registers a completed session that was never scheduled.
    Record {
        #[arg(long)]
        patient: String,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        time: NaiveTime,
        #[arg(long)]
        therapist: Option<String>,
        #[arg(long = "session-type")]
        session_type: Option<String>,
        #[arg(long)]
        duration: Option<u32>,
        #[arg(long)]
        activities: String,
        #[arg(long = "progress-notes", default_value = "")]
        progress_notes: String,
        #[arg(long, default_value = "")]
        homework: String,
    },
    Notes {
        id: String,
        #[arg(long)]
        activities: String,
        #[arg(long = "progress-notes", default_value = "")]
        progress_notes: String,
        #[arg(long, default_value = "")]
        homework: String,
    },
    Remove { id: String },
}

#[derive(Debug, Subcommand, PartialEq)]
pub enum UserAction {
    List,
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, value_enum, default_value_t = RoleArg::Therapist)]
        role: RoleArg,
        #[arg(long)]
        specialty: Option<String>,
        #[arg(long)]
        license: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        payment: Option<f64>,
        #[arg(long)]
        bio: Option<String>,
    },
    /// Changes the given fields and keeps the rest.
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, value_enum)]
        role: Option<RoleArg>,
        #[arg(long)]
        specialty: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        payment: Option<f64>,
        #[arg(long)]
        active: Option<bool>,
    },
    Password {
        id: String,
        #[arg(long)]
        password: String,
    },
    Remove { id: String },
}

#[derive(Debug, Subcommand, PartialEq)]
pub enum SessionTypeAction {
    List,
    /// Creates a session type, or replaces the one with `--id`.
    Save {
        #[arg(long, default_value = "")]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        specialty: Option<String>,
        #[arg(long)]
        duration: u32,
        #[arg(long)]
        cost: f64,
        #[arg(long, default_value_t = false)]
        inactive: bool,
    },
    Remove { id: String },
}

#[derive(Debug, Subcommand, PartialEq)]
pub enum SpecialtyAction {
    List,
    /// Creates a specialty, or replaces the one with `--id`.
    Save {
        #[arg(long, default_value = "")]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Remove { id: String },
}

#[derive(Debug, Subcommand, PartialEq)]
pub enum WaitingAction {
    List,
    Add {
        patient: String,
        #[arg(long, value_enum, default_value_t = PriorityArg::Normal)]
        priority: PriorityArg,
        #[arg(long, default_value = "")]
        notes: String,
    },
    Remove { id: String },
}

#[derive(Debug, Subcommand, PartialEq)]
pub enum DocumentAction {
    List { patient: String },
    Attach {
        patient: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        kind: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    Remove { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    Admin,
    Therapist,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Admin => Role::Admin,
            RoleArg::Therapist => Role::Therapist,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PriorityArg {
    Low,
    Normal,
    High,
}

impl From<PriorityArg> for WaitingPriority {
    fn from(priority: PriorityArg) -> Self {
        match priority {
            PriorityArg::Low => WaitingPriority::Low,
            PriorityArg::Normal => WaitingPriority::Normal,
            PriorityArg::High => WaitingPriority::High,
        }
    }
}

fn parse_price(raw: &str) -> Result<(String, f64), String> {
    let (type_id, price) = raw
        .split_once('=')
        .ok_or_else(|| format!("'{}' is not TYPE_ID=PRICE", raw))?;
    let price = price
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("'{}': {}", price, e))?;
    Ok((type_id.trim().to_string(), price))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CsvKind {
    Summary,
    Therapists,
    Patients,
    Monthly,
}

impl From<CsvKind> for ReportKind {
    fn from(kind: CsvKind) -> Self {
        match kind {
            CsvKind::Summary => ReportKind::Summary,
            CsvKind::Therapists => ReportKind::Therapists,
            CsvKind::Patients => ReportKind::Patients,
            CsvKind::Monthly => ReportKind::Monthly,
        }
    }
}

/// Executes one command against the loaded state and returns what should be
/// printed.
pub async fn run(
    cli: Cli,
    state: &mut AppState,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> AppResult<String> {
    let json = cli.json;
    match cli.command {
        Command::Login { email, password } => {
            let user = state.login(&email, &password).await?;
            Ok(format!("Logged in as {} ({:?})", user.name, user.role))
        }
        Command::Logout => {
            state.logout().await?;
            Ok("Logged out".to_string())
        }
        Command::Whoami => match state.current_user() {
            Some(user) if json => render(user),
            Some(user) => Ok(format!("{} <{}> {:?}", user.name, user.email, user.role)),
            None => Err(AppError::Unauthorized),
        },
        Command::Patients => {
            let patients = state.patients()?;
            if json {
                return render(&patients);
            }
            Ok(lines(patients.iter().map(|p| {
                format!(
                    "{}  {}  {}  {:.2}",
                    p.id,
                    p.name,
                    state.data().user_name(&p.therapist_id),
                    p.cost_per_session
                )
            })))
        }
        Command::Appointments { date } => {
            let appointments = match date {
                Some(day) => state.agenda(day)?,
                None => state.appointments()?,
            };
            if json {
                return render(&appointments);
            }
            Ok(lines(appointments.iter().map(|a| {
                format!(
                    "{}  {} {}  {}  {}  {:?}",
                    a.id,
                    a.date,
                    a.time.format("%H:%M"),
                    state.data().patient_name(&a.patient_id),
                    state.data().user_name(&a.therapist_id),
                    a.status
                )
            })))
        }
        Command::Sessions => {
            let sessions = state.sessions()?;
            if json {
                return render(&sessions);
            }
            Ok(lines(sessions.iter().map(|s| {
                format!(
                    "{}  {}  {}  {:.2}  {:.2}",
                    s.id,
                    s.date,
                    state.data().patient_name(&s.patient_id),
                    s.cost,
                    s.therapist_payment
                )
            })))
        }
        Command::Schedule {
            patient,
            date,
            time,
            therapist,
            session_type,
            duration,
            notes,
        } => {
            let appointment = state
                .schedule_appointment(NewAppointment {
                    patient_id: patient,
                    therapist_id: therapist,
                    session_type_id: session_type,
                    date,
                    time,
                    duration_minutes: duration,
                    notes,
                })
                .await?;
            Ok(format!("Scheduled appointment {}", appointment.id))
        }
        Command::Convert {
            appointment,
            activities,
            progress_notes,
            homework,
        } => {
            let notes = SessionNotes {
                activities,
                progress_notes,
                homework,
            };
            let session = state.convert_appointment(&appointment, notes).await?;
            Ok(format!(
                "Registered session {} (cost {:.2}, therapist payment {:.2})",
                session.id, session.cost, session.therapist_payment
            ))
        }
        Command::Cancel { appointment } => {
            state.cancel_appointment(&appointment).await?;
            Ok(format!("Cancelled appointment {}", appointment))
        }
        Command::Dashboard => {
            let summary = state.dashboard(today)?;
            if json {
                return render(&summary);
            }
            Ok(format!(
                "Appointments today: {}\nPending appointments: {}\nSessions this month: {}\nMonth amount: {:.2}\nActive patients: {}",
                summary.appointments_today,
                summary.pending_appointments,
                summary.sessions_this_month,
                summary.month_amount,
                summary.active_patients
            ))
        }
        Command::Report { from, to, kind, csv } => {
            if from > to {
                return Err(AppError::Validation(format!(
                    "Report start {} is after its end {}",
                    from, to
                )));
            }
            let range = DateRange::new(from, to);
            if let Some(path) = csv {
                let body = state.report_csv(range, kind.into())?;
                tokio::fs::write(&path, body).await?;
                return Ok(format!("Wrote {}", path.display()));
            }
            let report = state.report(range)?;
            if json {
                return render(&report);
            }
            Ok(format!(
                "Sessions: {}\nRevenue: {:.2}\nTherapist payments: {:.2}\nProfit: {:.2}",
                report.summary.session_count,
                report.summary.revenue,
                report.summary.therapist_payments,
                report.summary.profit
            ))
        }
        Command::Export { path } => {
            let document = state.export_backup(now)?;
            tokio::fs::write(&path, document).await?;
            Ok(format!("Wrote {}", path.display()))
        }
        Command::Import { path } => {
            let document = tokio::fs::read_to_string(&path).await?;
            state.import_backup(&document).await?;
            Ok(format!("Restored {}", path.display()))
        }
        Command::Patient { action } => run_patient(action, state).await,
        Command::Appointment { action } => match action {
            AppointmentAction::Remove { id } => {
                state.delete_appointment(&id).await?;
                Ok(format!("Deleted appointment {}", id))
            }
        },
        Command::Session { action } => run_session(action, state).await,
        Command::User { action } => run_user(action, state, json).await,
        Command::SessionType { action } => run_session_type(action, state, json).await,
        Command::Specialty { action } => run_specialty(action, state, json).await,
        Command::Waiting { action } => run_waiting(action, state, json, now).await,
        Command::Document { action } => run_document(action, state, json, now).await,
    }
}

async fn run_patient(action: PatientAction, state: &mut AppState) -> AppResult<String> {
    match action {
        PatientAction::Add {
            name,
            therapist,
            cost,
            birth_date,
            age,
            phone,
            email,
            responsible,
            diagnosis,
            notes,
        } => {
            let patient = state
                .create_patient(NewPatient {
                    name,
                    birth_date,
                    age,
                    phone,
                    email,
                    responsible_name: responsible,
                    therapist_id: therapist,
                    cost_per_session: cost,
                    diagnosis,
                    notes,
                    ..NewPatient::default()
                })
                .await?;
            Ok(format!("Created patient {} ({})", patient.id, patient.therapist_id))
        }
        PatientAction::Update {
            id,
            name,
            therapist,
            cost,
            prices,
            phone,
            email,
            diagnosis,
            notes,
            active,
        } => {
            let mut patient = state.patient(&id)?;
            if let Some(name) = name {
                patient.name = name;
            }
            if let Some(therapist) = therapist {
                patient.therapist_id = therapist;
            }
            if let Some(cost) = cost {
                patient.cost_per_session = cost;
            }
            patient.custom_prices.extend(prices);
            if phone.is_some() {
                patient.phone = phone;
            }
            if email.is_some() {
                patient.email = email;
            }
            if diagnosis.is_some() {
                patient.diagnosis = diagnosis;
            }
            if notes.is_some() {
                patient.notes = notes;
            }
            if let Some(active) = active {
                patient.active = active;
            }
            let updated = state.update_patient(patient).await?;
            Ok(format!("Updated patient {}", updated.id))
        }
        PatientAction::Remove { id } => {
            let removal = state.delete_patient(&id).await?;
            Ok(format!(
                "Deleted patient {} with {} appointment(s), {} waiting-list entries and {} document(s)",
                removal.patient.id, removal.appointments, removal.waiting_list_entries, removal.documents
            ))
        }
    }
}

async fn run_session(action: SessionAction, state: &mut AppState) -> AppResult<String> {
    match action {
        SessionAction::Record {
            patient,
            date,
            time,
            therapist,
            session_type,
            duration,
            activities,
            progress_notes,
            homework,
        } => {
            let session = state
                .record_session(NewSession {
                    patient_id: patient,
                    therapist_id: therapist,
                    session_type_id: session_type,
                    date,
                    start_time: time,
                    duration_minutes: duration,
                    notes: SessionNotes {
                        activities,
                        progress_notes,
                        homework,
                    },
                })
                .await?;
            Ok(format!(
                "Registered session {} (cost {:.2}, therapist payment {:.2})",
                session.id, session.cost, session.therapist_payment
            ))
        }
        SessionAction::Notes {
            id,
            activities,
            progress_notes,
            homework,
        } => {
            let notes = SessionNotes {
                activities,
                progress_notes,
                homework,
            };
            state.update_session_notes(&id, notes).await?;
            Ok(format!("Updated notes of session {}", id))
        }
        SessionAction::Remove { id } => {
            state.delete_session(&id).await?;
            Ok(format!("Deleted session {}", id))
        }
    }
}

async fn run_user(action: UserAction, state: &mut AppState, json: bool) -> AppResult<String> {
    match action {
        UserAction::List => {
            let users = state.users()?;
            if json {
                return render(&users);
            }
            Ok(lines(users.iter().map(|u| {
                format!("{}  {}  <{}>  {:?}  active={}", u.id, u.name, u.email, u.role, u.active)
            })))
        }
        UserAction::Add {
            name,
            email,
            password,
            role,
            specialty,
            license,
            phone,
            payment,
            bio,
        } => {
            let user = state
                .create_user(NewUser {
                    name,
                    email,
                    password,
                    role: role.into(),
                    specialty_id: specialty,
                    license_number: license,
                    phone,
                    payment_per_session: payment,
                    bio,
                })
                .await?;
            Ok(format!("Created user {} ({:?})", user.id, user.role))
        }
        UserAction::Update {
            id,
            name,
            email,
            role,
            specialty,
            phone,
            payment,
            active,
        } => {
            let mut user = state
                .data()
                .users
                .find(&id)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("User {}", id)))?;
            if let Some(name) = name {
                user.name = name;
            }
            if let Some(email) = email {
                user.email = email;
            }
            if let Some(role) = role {
                user.role = role.into();
            }
            if specialty.is_some() {
                user.specialty_id = specialty;
            }
            if phone.is_some() {
                user.phone = phone;
            }
            if payment.is_some() {
                user.payment_per_session = payment;
            }
            if let Some(active) = active {
                user.active = active;
            }
            let updated = state.update_user(user).await?;
            Ok(format!("Updated user {}", updated.id))
        }
        UserAction::Password { id, password } => {
            state.change_password(&id, &password).await?;
            Ok(format!("Changed password of user {}", id))
        }
        UserAction::Remove { id } => {
            let removed = state.delete_user(&id).await?;
            Ok(format!("Deleted user {}", removed.id))
        }
    }
}

async fn run_session_type(
    action: SessionTypeAction,
    state: &mut AppState,
    json: bool,
) -> AppResult<String> {
    match action {
        SessionTypeAction::List => {
            let types = state.session_types()?;
            if json {
                return render(&types);
            }
            Ok(lines(types.iter().map(|t| {
                format!(
                    "{}  {}  {} min  {:.2}{}",
                    t.id,
                    t.name,
                    t.default_duration,
                    t.default_cost,
                    if t.active { "" } else { "  (inactive)" }
                )
            })))
        }
        SessionTypeAction::Save {
            id,
            name,
            specialty,
            duration,
            cost,
            inactive,
        } => {
            let saved = state
                .save_session_type(SessionType {
                    id,
                    name,
                    specialty_id: specialty,
                    default_duration: duration,
                    default_cost: cost,
                    active: !inactive,
                })
                .await?;
            Ok(format!("Saved session type {}", saved.id))
        }
        SessionTypeAction::Remove { id } => {
            state.delete_session_type(&id).await?;
            Ok(format!("Deleted session type {}", id))
        }
    }
}

async fn run_specialty(
    action: SpecialtyAction,
    state: &mut AppState,
    json: bool,
) -> AppResult<String> {
    match action {
        SpecialtyAction::List => {
            let specialties = state.specialties()?;
            if json {
                return render(&specialties);
            }
            Ok(lines(specialties.iter().map(|s| format!("{}  {}", s.id, s.name))))
        }
        SpecialtyAction::Save {
            id,
            name,
            description,
        } => {
            let saved = state
                .save_specialty(Specialty {
                    id,
                    name,
                    description,
                })
                .await?;
            Ok(format!("Saved specialty {}", saved.id))
        }
        SpecialtyAction::Remove { id } => {
            state.delete_specialty(&id).await?;
            Ok(format!("Deleted specialty {}", id))
        }
    }
}

async fn run_waiting(
    action: WaitingAction,
    state: &mut AppState,
    json: bool,
    now: DateTime<Utc>,
) -> AppResult<String> {
    match action {
        WaitingAction::List => {
            let entries = state.waiting_list()?;
            if json {
                return render(&entries);
            }
            Ok(lines(entries.iter().map(|w| {
                format!(
                    "{}  {}  {}  {:?}",
                    w.id,
                    state.data().patient_name(&w.patient_id),
                    state.data().user_name(&w.therapist_id),
                    w.priority
                )
            })))
        }
        WaitingAction::Add {
            patient,
            priority,
            notes,
        } => {
            let entry = state
                .add_to_waiting_list(&patient, priority.into(), &notes, now)
                .await?;
            Ok(format!("Added waiting-list entry {}", entry.id))
        }
        WaitingAction::Remove { id } => {
            state.remove_from_waiting_list(&id).await?;
            Ok(format!("Removed waiting-list entry {}", id))
        }
    }
}

async fn run_document(
    action: DocumentAction,
    state: &mut AppState,
    json: bool,
    now: DateTime<Utc>,
) -> AppResult<String> {
    match action {
        DocumentAction::List { patient } => {
            let documents = state.documents(&patient)?;
            if json {
                return render(&documents);
            }
            Ok(lines(documents.iter().map(|d| {
                format!("{}  {}  {}  {}", d.id, d.uploaded_at.format("%Y-%m-%d"), d.title, d.kind)
            })))
        }
        DocumentAction::Attach {
            patient,
            title,
            kind,
            notes,
        } => {
            let document = state
                .attach_document(&patient, &title, &kind, &notes, now)
                .await?;
            Ok(format!("Attached document {}", document.id))
        }
        DocumentAction::Remove { id } => {
            state.remove_document(&id).await?;
            Ok(format!("Removed document {}", id))
        }
    }
}

fn render<T: Serialize + ?Sized>(value: &T) -> AppResult<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn lines<I: Iterator<Item = String>>(rows: I) -> String {
    rows.collect::<Vec<_>>().join("\n")
}
