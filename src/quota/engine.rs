//! Quota and payment reconciliation over a set of request records.
//!
//! Everything here is a pure function of its inputs. Callers recompute from
//! the latest snapshot instead of caching derived figures, and every figure
//! is scoped by month key: a new month starts each student at zero without
//! any reset step.

use std::collections::BTreeMap;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use crate::{
    error::{Result, SoucheError},
    quota::TICKETS_PER_SOUCHE,
    storage::models::{Demande, DemandeStatus},
};

/// Key used by [`Grouping::Overall`].
pub const OVERALL_KEY: &str = "*";

/// Canonical `YYYY-MM` key; lexicographic order is chronological order.
pub fn month_key<D: Datelike>(now: &D) -> String {
    format!("{}-{:02}", now.year(), now.month())
}

/// Validate a user supplied month key.
pub fn parse_month_key(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let valid = raw.len() == 7
        && NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d").is_ok();
    if valid {
        Ok(raw.to_string())
    } else {
        Err(SoucheError::InvalidMonth(raw.to_string()))
    }
}

/// Canonical student identity: trimmed, inner whitespace collapsed to one
/// space, uppercased. "Konan  jean" and "KONAN JEAN" are the same student.
pub fn normalize_student(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Non-archived records of `month`, in input order.
pub fn active_requests_for<'a>(records: &'a [Demande], month: &str) -> Vec<&'a Demande> {
    records
        .iter()
        .filter(|d| d.month == month && d.status != DemandeStatus::Archived)
        .collect()
}

pub fn consumed_units(records: &[Demande], student: &str, class: &str, month: &str) -> u32 {
    records
        .iter()
        .filter(|d| {
            d.student == student
                && d.class == class
                && d.month == month
                && d.status != DemandeStatus::Archived
        })
        .map(|d| d.units)
        .sum()
}

pub fn remaining_units(consumed: u32, cap: u32) -> u32 {
    cap.saturating_sub(consumed)
}

pub fn can_submit(consumed: u32, requested: u32, cap: u32) -> bool {
    consumed.saturating_add(requested) <= cap
}

pub fn amount_due(units: u32, unit_price: i64) -> i64 {
    i64::from(units) * unit_price
}

/// Positive: refund owed to the student. Negative: still to pay.
pub fn change_owed(amount_paid: i64, amount_due: i64) -> i64 {
    amount_paid - amount_due
}

pub fn tickets(units: u32) -> u32 {
    units * TICKETS_PER_SOUCHE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    ByClass,
    Overall,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub requests: usize,
    pub units: u32,
    pub amount_due: i64,
    pub amount_paid: i64,
}

impl Totals {
    pub fn tickets(&self) -> u32 {
        tickets(self.units)
    }

    pub fn change_owed(&self) -> i64 {
        change_owed(self.amount_paid, self.amount_due)
    }
}

/// Dashboard totals over the non-archived records of `records`.
pub fn aggregate<'a, I>(records: I, grouping: Grouping, unit_price: i64) -> BTreeMap<String, Totals>
where
    I: IntoIterator<Item = &'a Demande>,
{
    let mut totals: BTreeMap<String, Totals> = BTreeMap::new();

    for demande in records.into_iter().filter(|d| !d.is_archived()) {
        let key = match grouping {
            Grouping::ByClass => demande.class.clone(),
            Grouping::Overall => OVERALL_KEY.to_string(),
        };
        let entry = totals.entry(key).or_default();
        entry.requests += 1;
        entry.units += demande.units;
        entry.amount_due += amount_due(demande.units, unit_price);
        entry.amount_paid += demande.amount_paid;
    }

    totals
}

#[derive(Debug, Default, PartialEq)]
pub struct Classified<'a> {
    pub active: Vec<&'a Demande>,
    pub archived: Vec<&'a Demande>,
}

pub fn classify(records: &[Demande]) -> Classified<'_> {
    let (archived, active): (Vec<&Demande>, Vec<&Demande>) =
        records.iter().partition(|d| d.is_archived());
    Classified { active, archived }
}

/// Most recent month present in `records`.
pub fn latest_month(records: &[Demande]) -> Option<String> {
    records.iter().map(|d| d.month.as_str()).max().map(str::to_string)
}

/// Delegate dashboard filter: case-insensitive name search plus an optional
/// class.
pub fn filter_requests<'a, I>(records: I, search: &str, class: Option<&str>) -> Vec<&'a Demande>
where
    I: IntoIterator<Item = &'a Demande>,
{
    let needle = search.trim().to_lowercase();
    records
        .into_iter()
        .filter(|d| needle.is_empty() || d.student.to_lowercase().contains(&needle))
        .filter(|d| class.map_or(true, |c| d.class == c))
        .collect()
}
