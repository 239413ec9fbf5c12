//! services/clinic/src/handlers/reporting.rs
//!
//! Read-side views (dashboard, reports, CSV) and full backup/restore.

use chrono::{DateTime, NaiveDate, Utc};
use clinic_core::reports::{
    self, DashboardSummary, DateRange, MonthlyPoint, PatientBreakdown, PeriodSummary, SeriesBasis,
    TherapistBreakdown,
};
use clinic_core::visibility;
use clinic_core::{csv, Backup};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::AppResult;
use crate::state::AppState;

/// Aggregates over the actor's visible sessions in a date range.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub summary: PeriodSummary,
    pub by_therapist: Vec<TherapistBreakdown>,
    pub top_patients: Vec<PatientBreakdown>,
}

/// Which table a CSV export contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Summary,
    Therapists,
    Patients,
    Monthly,
}

impl AppState {
    pub fn dashboard(&self, today: NaiveDate) -> AppResult<DashboardSummary> {
        let actor = self.actor()?;
        Ok(reports::dashboard(&self.data, &actor, today))
    }

    pub fn report(&self, range: DateRange) -> AppResult<Report> {
        let actor = self.actor()?;
        let visible = visibility::visible_refs(self.data.sessions.list(), &actor);
        let sessions: Vec<_> = visible.into_iter().filter(|s| range.contains(s.date)).collect();
        Ok(Report {
            start: range.start,
            end: range.end,
            summary: reports::summarize(&sessions),
            by_therapist: reports::group_by_therapist(sessions.iter().copied()),
            top_patients: reports::group_by_patient(sessions.iter().copied()),
        })
    }

    /// Revenue (admins) or own earnings (therapists) for the configured
    /// number of months, ending with the month of `today`.
    pub fn monthly_series(&self, today: NaiveDate) -> AppResult<Vec<MonthlyPoint>> {
        let actor = self.actor()?;
        let sessions = visibility::visible_refs(self.data.sessions.list(), &actor);
        Ok(reports::monthly_series(
            sessions,
            self.report_months,
            today,
            SeriesBasis::for_actor(&actor),
        ))
    }

    /// Renders one report table as CSV. The monthly table uses only
    /// `range.end`, as the last month of the series.
    pub fn report_csv(&self, range: DateRange, kind: ReportKind) -> AppResult<String> {
        let report = self.report(range)?;
        Ok(match kind {
            ReportKind::Summary => csv::summary_report(&report.summary),
            ReportKind::Therapists => csv::therapist_report(&report.by_therapist, &self.data),
            ReportKind::Patients => csv::patient_report(&report.top_patients, &self.data),
            ReportKind::Monthly => csv::monthly_report(&self.monthly_series(range.end)?),
        })
    }

    //=====================================================================================
    // Backup and restore
    //=====================================================================================

    /// Serializes every collection and the current user into one document.
    pub fn export_backup(&self, now: DateTime<Utc>) -> AppResult<String> {
        let actor = self.require_admin()?;
        let backup = Backup::capture(&self.data, Some(&actor), &self.app_version, now);
        let json = backup.to_json()?;
        info!(bytes = json.len(), "Backup exported");
        Ok(json)
    }

    /// Replaces the whole store with the contents of a backup document. The
    /// document is fully parsed and validated before anything is written; a
    /// rejected document leaves the current state untouched. The importing
    /// admin stays logged in only if their account survives the restore.
    pub async fn import_backup(&mut self, json: &str) -> AppResult<()> {
        let actor = self.require_admin()?;
        let backup = Backup::from_json(json).map_err(|e| {
            warn!(error = %e, "Rejected backup document");
            e
        })?;
        let version = backup.app_version.clone();
        let restored = backup.into_state()?;

        self.persistence.replace_all(&restored.data).await?;
        self.data = restored.data;
        info!(
            app_version = %version,
            users = self.data.users.len(),
            patients = self.data.patients.len(),
            sessions = self.data.sessions.len(),
            "Backup restored"
        );

        self.current_user = Some(actor);
        self.refresh_current_user().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use crate::state::test_support::*;
    use crate::AppError;
    use chrono::TimeZone;
    use clinic_core::SessionNotes;
    use std::sync::Arc;

    fn october() -> DateRange {
        DateRange::month_of(today())
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 18, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn admin_report_covers_every_therapist() {
        let state = as_admin().await;
        let report = state.report(october()).unwrap();
        assert_eq!(report.summary.session_count, 2);
        assert_eq!(report.summary.revenue, 85.0);
        assert_eq!(report.summary.therapist_payments, 45.0);
        assert_eq!(report.summary.profit, 40.0);
        assert_eq!(report.by_therapist[0].therapist_id, "u2");
        assert_eq!(report.top_patients.len(), 2);
    }

    #[tokio::test]
    async fn therapist_report_is_scoped_to_own_sessions() {
        let state = as_matilde().await;
        let report = state.report(october()).unwrap();
        assert_eq!(report.summary.session_count, 1);
        assert_eq!(report.by_therapist.len(), 1);
        assert_eq!(report.by_therapist[0].therapist_id, "u2");
    }

    #[tokio::test]
    async fn monthly_series_uses_the_actor_basis() {
        let state = as_matilde().await;
        let series = state.monthly_series(today()).unwrap();
        assert_eq!(series.len(), 6);
        assert_eq!(series.last().unwrap().label, "Out 2026");
        assert_eq!(series.last().unwrap().value, 25.0);
        assert!(series[..5].iter().all(|p| p.value == 0.0));
    }

    #[tokio::test]
    async fn dashboard_counts_converted_sessions() {
        let mut state = as_matilde().await;
        let before = state.dashboard(today()).unwrap();
        assert_eq!(before.pending_appointments, 1);
        assert_eq!(before.sessions_this_month, 1);

        state
            .convert_appointment("a1", SessionNotes::new("Jogos fonológicos"))
            .await
            .unwrap();
        let after = state.dashboard(today()).unwrap();
        assert_eq!(after.pending_appointments, 0);
        assert_eq!(after.sessions_this_month, 2);
        assert_eq!(after.month_amount, 50.0);
    }

    #[tokio::test]
    async fn therapist_csv_uses_semicolons_and_decimal_commas() {
        let state = as_admin().await;
        let csv = state.report_csv(october(), ReportKind::Therapists).unwrap();
        assert!(csv.starts_with('\u{feff}'));
        let lines: Vec<&str> = csv.trim_start_matches('\u{feff}').lines().collect();
        assert_eq!(lines[0], "Terapeuta;Sessões;Receita;Pagamento;Lucro");
        assert!(lines[1].ends_with(";1;45,00;25,00;20,00"));
    }

    #[tokio::test]
    async fn monthly_csv_ends_at_the_range_end() {
        let state = as_admin().await;
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 8, 31).unwrap(),
        );
        let csv = state.report_csv(range, ReportKind::Monthly).unwrap();
        let lines: Vec<&str> = csv.trim_start_matches('\u{feff}').lines().collect();
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[1], "Mar 2026;0,00");
        assert_eq!(lines[6], "Ago 2026;0,00");
    }

    #[tokio::test]
    async fn backup_round_trips_into_a_fresh_store() {
        let mut source = as_admin().await;
        source
            .convert_appointment("a1", SessionNotes::new("X"))
            .await
            .unwrap();
        let json = source.export_backup(now()).unwrap();
        assert!(json.contains("\"exportDate\""));
        assert!(json.contains("\"appVersion\""));

        let store = Arc::new(MemoryStore::new());
        let mut target = state_on(store.clone()).await;
        target.login("admin@maisarticular.com", "admin").await.unwrap();
        target.import_backup(&json).await.unwrap();

        assert_eq!(target.data(), source.data());
        assert_eq!(target.current_user().map(|u| u.id.as_str()), Some("u1"));

        let reloaded = state_on(store).await;
        assert_eq!(reloaded.data(), source.data());
    }

    #[tokio::test]
    async fn malformed_backups_leave_state_untouched() {
        let mut state = as_admin().await;
        let before = state.data().clone();
        assert!(matches!(
            state.import_backup("{ not json").await,
            Err(AppError::Backup(_))
        ));
        assert_eq!(state.data(), &before);
        assert!(state.current_user().is_some());
    }

    #[tokio::test]
    async fn only_admins_export_backups() {
        let state = as_matilde().await;
        assert!(matches!(
            state.export_backup(now()),
            Err(AppError::Forbidden(_))
        ));
    }
}
