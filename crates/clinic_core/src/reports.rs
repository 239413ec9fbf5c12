//! crates/clinic_core/src/reports.rs
//!
//! Aggregations over sessions: period totals, per-therapist and per-patient
//! breakdowns, monthly series and the dashboard summary. All functions are
//! pure and operate on whatever slice of sessions the caller passes in.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::data::ClinicData;
use crate::domain::{AppointmentStatus, Role, Session, User};
use crate::visibility;

const MONTH_LABELS: [&str; 12] = [
    "Jan", "Fev", "Mar", "Abr", "Mai", "Jun", "Jul", "Ago", "Set", "Out", "Nov", "Dez",
];

/// Number of patients listed in the top-patient breakdown.
pub const TOP_PATIENTS: usize = 5;

/// An inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The calendar month containing `day`.
    pub fn month_of(day: NaiveDate) -> Self {
        let start = day.with_day(1).unwrap_or(day);
        let (year, month) = next_month(start.year(), start.month());
        let end = first_of(year, month).and_then(|d| d.pred_opt()).unwrap_or(day);
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Sessions whose date falls inside `range`, in their original order.
pub fn in_range<'a>(sessions: &'a [Session], range: &DateRange) -> Vec<&'a Session> {
    sessions.iter().filter(|s| range.contains(s.date)).collect()
}

pub fn sum_cost<'a, I>(sessions: I) -> f64
where
    I: IntoIterator<Item = &'a Session>,
{
    sessions.into_iter().map(|s| s.cost).sum()
}

pub fn sum_therapist_payment<'a, I>(sessions: I) -> f64
where
    I: IntoIterator<Item = &'a Session>,
{
    sessions.into_iter().map(|s| s.therapist_payment).sum()
}

pub fn profit<'a, I>(sessions: I) -> f64
where
    I: IntoIterator<Item = &'a Session> + Clone,
{
    sum_cost(sessions.clone()) - sum_therapist_payment(sessions)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSummary {
    pub session_count: usize,
    pub revenue: f64,
    pub therapist_payments: f64,
    pub profit: f64,
}

pub fn summarize(sessions: &[&Session]) -> PeriodSummary {
    let revenue = sum_cost(sessions.iter().copied());
    let therapist_payments = sum_therapist_payment(sessions.iter().copied());
    PeriodSummary {
        session_count: sessions.len(),
        revenue,
        therapist_payments,
        profit: revenue - therapist_payments,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TherapistBreakdown {
    pub therapist_id: String,
    pub count: usize,
    pub revenue: f64,
    pub payment: f64,
}

/// Per-therapist totals sorted by revenue, highest first. Therapists with
/// equal revenue keep the order in which they first appear.
pub fn group_by_therapist<'a, I>(sessions: I) -> Vec<TherapistBreakdown>
where
    I: IntoIterator<Item = &'a Session>,
{
    let mut rows: Vec<TherapistBreakdown> = Vec::new();
    for session in sessions {
        match rows.iter_mut().find(|r| r.therapist_id == session.therapist_id) {
            Some(row) => {
                row.count += 1;
                row.revenue += session.cost;
                row.payment += session.therapist_payment;
            }
            None => rows.push(TherapistBreakdown {
                therapist_id: session.therapist_id.clone(),
                count: 1,
                revenue: session.cost,
                payment: session.therapist_payment,
            }),
        }
    }
    // `sort_by` is stable.
    rows.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));
    rows
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientBreakdown {
    pub patient_id: String,
    pub count: usize,
}

/// The patients with the most sessions, at most [`TOP_PATIENTS`] of them.
pub fn group_by_patient<'a, I>(sessions: I) -> Vec<PatientBreakdown>
where
    I: IntoIterator<Item = &'a Session>,
{
    let mut rows: Vec<PatientBreakdown> = Vec::new();
    for session in sessions {
        match rows.iter_mut().find(|r| r.patient_id == session.patient_id) {
            Some(row) => row.count += 1,
            None => rows.push(PatientBreakdown {
                patient_id: session.patient_id.clone(),
                count: 1,
            }),
        }
    }
    rows.retain(|r| r.count > 0);
    rows.sort_by(|a, b| b.count.cmp(&a.count));
    rows.truncate(TOP_PATIENTS);
    rows
}

/// Which monetary field a monthly series adds up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesBasis {
    Revenue,
    TherapistPayment,
}

impl SeriesBasis {
    /// Admins chart clinic revenue; therapists chart their own earnings.
    pub fn for_actor(actor: &User) -> Self {
        match actor.role {
            Role::Admin => SeriesBasis::Revenue,
            Role::Therapist => SeriesBasis::TherapistPayment,
        }
    }

    fn value(&self, session: &Session) -> f64 {
        match self {
            SeriesBasis::Revenue => session.cost,
            SeriesBasis::TherapistPayment => session.therapist_payment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyPoint {
    pub label: String,
    pub year: i32,
    pub month: u32,
    pub value: f64,
}

/// One point per calendar month, oldest first, ending with the month of
/// `today`. Months without sessions are present with a zero value.
pub fn monthly_series<'a, I>(
    sessions: I,
    months_back: u32,
    today: NaiveDate,
    basis: SeriesBasis,
) -> Vec<MonthlyPoint>
where
    I: IntoIterator<Item = &'a Session>,
{
    let mut points: Vec<MonthlyPoint> = Vec::with_capacity(months_back as usize);
    let (mut year, mut month) = (today.year(), today.month());
    for _ in 0..months_back {
        points.push(MonthlyPoint {
            label: month_label(year, month),
            year,
            month,
            value: 0.0,
        });
        (year, month) = previous_month(year, month);
    }
    points.reverse();

    for session in sessions {
        if let Some(point) = points
            .iter_mut()
            .find(|p| p.year == session.date.year() && p.month == session.date.month())
        {
            point.value += basis.value(session);
        }
    }
    points
}

/// Short Portuguese month label, e.g. "Out 2026".
pub fn month_label(year: i32, month: u32) -> String {
    let name = MONTH_LABELS
        .get(month.saturating_sub(1) as usize)
        .copied()
        .unwrap_or("?");
    format!("{name} {year}")
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month <= 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month >= 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn first_of(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

//=========================================================================================
// Dashboard
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub appointments_today: usize,
    pub pending_appointments: usize,
    pub sessions_this_month: usize,
    /// Clinic revenue for admins, own earnings for therapists.
    pub month_amount: f64,
    pub active_patients: usize,
}

pub fn dashboard(data: &ClinicData, actor: &User, today: NaiveDate) -> DashboardSummary {
    let appointments = visibility::visible_refs(data.appointments.list(), actor);
    let pending: Vec<_> = appointments
        .into_iter()
        .filter(|a| a.status == AppointmentStatus::Pending)
        .collect();
    let sessions = visibility::visible_refs(data.sessions.list(), actor);
    let month = DateRange::month_of(today);
    let basis = SeriesBasis::for_actor(actor);
    let this_month: Vec<_> = sessions.into_iter().filter(|s| month.contains(s.date)).collect();

    DashboardSummary {
        appointments_today: pending.iter().filter(|a| a.date == today).count(),
        pending_appointments: pending.len(),
        sessions_this_month: this_month.len(),
        month_amount: this_month.iter().map(|s| basis.value(s)).sum(),
        active_patients: visibility::visible_refs(data.patients.list(), actor)
            .into_iter()
            .filter(|p| p.active)
            .count(),
    }
}
