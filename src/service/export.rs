use crate::{
    error::Result,
    quota::{self, UNIT_PRICE},
    storage::Demande,
};

/// Records covered by an export. An explicit month is a history request and
/// keeps its archived rows; with neither a month nor `all`, only the current
/// month's active rows go out.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportWindow {
    pub month: Option<String>,
    pub include_archived: bool,
}

impl ExportWindow {
    pub fn resolve(month: Option<String>, all: bool, current_month: &str) -> Self {
        match (month, all) {
            (Some(m), _) => Self {
                month: Some(m),
                include_archived: true,
            },
            (None, true) => Self {
                month: None,
                include_archived: true,
            },
            (None, false) => Self {
                month: Some(current_month.to_string()),
                include_archived: false,
            },
        }
    }
}

const CSV_HEADER: &str = "Student,Class,Month,Souches,Tickets,AmountDue,AmountPaid,Change,Status";

pub fn to_csv(rows: &[&Demande]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');

    for d in rows {
        let due = quota::amount_due(d.units, UNIT_PRICE);
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{}\n",
            csv_field(&d.student),
            csv_field(&d.class),
            d.month,
            d.units,
            quota::tickets(d.units),
            due,
            d.amount_paid,
            quota::change_owed(d.amount_paid, due),
            d.status,
        ));
    }

    out
}

pub fn to_json(rows: &[&Demande]) -> Result<String> {
    Ok(serde_json::to_string_pretty(rows)?)
}

fn csv_field(value: &str) -> String {
    if value.contains(|c: char| matches!(c, ',' | '"' | '\n')) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
