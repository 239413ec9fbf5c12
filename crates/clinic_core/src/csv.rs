//! crates/clinic_core/src/csv.rs
//!
//! Spreadsheet exports of report aggregates in the format existing exports
//! use: UTF-8 with BOM, `;` between fields, `,` as decimal separator and
//! Portuguese headers.

use crate::data::ClinicData;
use crate::reports::{MonthlyPoint, PatientBreakdown, PeriodSummary, TherapistBreakdown};

const BOM: &str = "\u{FEFF}";
const SEPARATOR: char = ';';

/// Formats an amount with two decimals and a decimal comma.
pub fn format_amount(value: f64) -> String {
    format!("{value:.2}").replace('.', ",")
}

fn escape(field: &str) -> String {
    if field.contains(SEPARATOR) || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

struct CsvWriter {
    out: String,
}

impl CsvWriter {
    fn new(headers: &[&str]) -> Self {
        let mut writer = Self {
            out: String::from(BOM),
        };
        writer.row(headers.iter().map(|h| h.to_string()));
        writer
    }

    fn row<I>(&mut self, fields: I)
    where
        I: IntoIterator<Item = String>,
    {
        let line: Vec<String> = fields.into_iter().map(|f| escape(&f)).collect();
        self.out.push_str(&line.join(&SEPARATOR.to_string()));
        self.out.push('\n');
    }

    fn finish(self) -> String {
        self.out
    }
}

pub fn therapist_report(rows: &[TherapistBreakdown], data: &ClinicData) -> String {
    let mut csv = CsvWriter::new(&["Terapeuta", "Sessões", "Receita", "Pagamento", "Lucro"]);
    for row in rows {
        csv.row([
            data.user_name(&row.therapist_id).to_string(),
            row.count.to_string(),
            format_amount(row.revenue),
            format_amount(row.payment),
            format_amount(row.revenue - row.payment),
        ]);
    }
    csv.finish()
}

pub fn patient_report(rows: &[PatientBreakdown], data: &ClinicData) -> String {
    let mut csv = CsvWriter::new(&["Utente", "Sessões"]);
    for row in rows {
        csv.row([
            data.patient_name(&row.patient_id).to_string(),
            row.count.to_string(),
        ]);
    }
    csv.finish()
}

pub fn monthly_report(points: &[MonthlyPoint]) -> String {
    let mut csv = CsvWriter::new(&["Mês", "Valor"]);
    for point in points {
        csv.row([point.label.clone(), format_amount(point.value)]);
    }
    csv.finish()
}

pub fn summary_report(summary: &PeriodSummary) -> String {
    let mut csv = CsvWriter::new(&["Sessões", "Receita", "Pagamentos", "Lucro"]);
    csv.row([
        summary.session_count.to_string(),
        format_amount(summary.revenue),
        format_amount(summary.therapist_payments),
        format_amount(summary.profit),
    ]);
    csv.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::{self, MATILDE_ID};
    use chrono::NaiveDate;

    #[test]
    fn therapist_report_uses_bom_semicolons_and_decimal_commas() {
        let data = seed::dataset(NaiveDate::from_ymd_opt(2026, 10, 17).unwrap());
        let rows = vec![
            TherapistBreakdown {
                therapist_id: MATILDE_ID.to_string(),
                count: 2,
                revenue: 90.5,
                payment: 50.0,
            },
            TherapistBreakdown {
                therapist_id: "gone".to_string(),
                count: 1,
                revenue: 10.0,
                payment: 0.0,
            },
        ];
        let csv = therapist_report(&rows, &data);

        assert!(csv.starts_with('\u{FEFF}'));
        let lines: Vec<_> = csv.trim_start_matches('\u{FEFF}').lines().collect();
        assert_eq!(lines[0], "Terapeuta;Sessões;Receita;Pagamento;Lucro");
        assert_eq!(lines[1], "Matilde Santos;2;90,50;50,00;40,50");
        assert_eq!(lines[2], "Desconhecido;1;10,00;0,00;10,00");
    }

    #[test]
    fn fields_containing_separators_are_quoted() {
        assert_eq!(escape("Silva; Ana"), "\"Silva; Ana\"");
        assert_eq!(escape("diz \"olá\""), "\"diz \"\"olá\"\"\"");
        assert_eq!(escape("simples"), "simples");
    }
}
