pub mod engine;

pub use engine::{
    active_requests_for, aggregate, amount_due, can_submit, change_owed, classify,
    consumed_units, filter_requests, latest_month, month_key, normalize_student,
    parse_month_key, remaining_units, tickets, Classified, Grouping, Totals, OVERALL_KEY,
};

/// Maximum souches a student may hold per class and month.
pub const MONTHLY_CAP: u32 = 3;

/// Price of one souche, in currency units (FCFA).
pub const UNIT_PRICE: i64 = 2000;

/// Tickets in one souche.
pub const TICKETS_PER_SOUCHE: u32 = 10;
