pub mod batch;
pub mod clock;
pub mod export;
pub mod roster;

pub use batch::{run_batch, BatchSummary};
pub use clock::{Clock, SystemClock};

use std::{collections::BTreeMap, sync::Arc};
use serde::Serialize;
use tracing::{debug, info, warn};
use crate::{
    auth::{self, Capability},
    error::{Result, SoucheError},
    quota::{self, Grouping, Totals, MONTHLY_CAP, OVERALL_KEY, UNIT_PRICE},
    storage::{Credential, Database, DatabaseStats, Demande, Etudiant, Role, Settings, Store},
};

/// Operations students, delegates and admins perform. Every figure is
/// derived from the store's latest snapshot.
pub struct SoucheService {
    store: Store,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuotaStatus {
    pub month: String,
    pub consumed: u32,
    pub remaining: u32,
    pub cap: u32,
    pub requests: Vec<Demande>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub demande: Demande,
    pub amount_due: i64,
    pub change: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub month: String,
    pub rows: Vec<Demande>,
    pub by_class: BTreeMap<String, Totals>,
    pub overall: Totals,
}

impl Dashboard {
    /// Month view: `rows` honour the search and class filters, totals cover
    /// the whole month.
    pub fn build(demandes: &[Demande], month: &str, class: Option<&str>, search: &str) -> Self {
        let active = quota::active_requests_for(demandes, month);
        let rows = quota::filter_requests(active.iter().copied(), search, class)
            .into_iter()
            .cloned()
            .collect();
        let by_class = quota::aggregate(active.iter().copied(), Grouping::ByClass, UNIT_PRICE);
        let overall = quota::aggregate(active.iter().copied(), Grouping::Overall, UNIT_PRICE)
            .remove(OVERALL_KEY)
            .unwrap_or_default();

        Self {
            month: month.to_string(),
            rows,
            by_class,
            overall,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub removed: usize,
    pub imported: usize,
    pub rejected: Vec<(usize, String)>,
}

impl SoucheService {
    pub fn new(store: Store) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Store, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn current_month(&self) -> String {
        quota::month_key(&self.clock.now())
    }

    /// Seed the settings singleton when missing.
    pub async fn init(&self) -> Result<Settings> {
        self.store
            .write("init", |db| match db.load_settings()? {
                Some(settings) => Ok(settings),
                None => {
                    let settings = Settings::default();
                    db.save_settings(&settings)?;
                    info!("Seeded default settings ({} classes)", settings.classes.len());
                    Ok(settings)
                }
            })
            .await
    }

    pub async fn settings(&self) -> Result<Settings> {
        self.store
            .read(|db| Ok(db.load_settings()?.unwrap_or_default()))
            .await
    }

    pub async fn verify(&self, code: &str) -> Result<Capability> {
        self.store.read(|db| auth::verify(db, code)).await
    }

    pub async fn stats(&self) -> Result<DatabaseStats> {
        self.store.read(|db| db.get_stats()).await
    }

    // students

    /// Record a new order after checking it against the monthly cap.
    ///
    /// The check reads the latest snapshot and the insert happens afterwards
    /// with no transaction around both, so two concurrent submissions for
    /// the same student can jointly exceed the cap.
    pub async fn submit(&self, student: &str, class: &str, units: u32) -> Result<Demande> {
        let student = quota::normalize_student(student);
        let student = student.as_str();
        if student.is_empty() {
            return Err(SoucheError::MissingField("student"));
        }
        let class = class.trim().to_uppercase();
        if class.is_empty() {
            return Err(SoucheError::MissingField("class"));
        }
        if units == 0 || units > MONTHLY_CAP {
            return Err(SoucheError::InvalidUnits(units));
        }

        let settings = self.settings().await?;
        if !settings.is_valid_class(&class) {
            return Err(SoucheError::UnknownClass(class));
        }

        let month = self.current_month();
        let snapshot = self.store.snapshot();
        let consumed = quota::consumed_units(&snapshot.demandes, student, &class, &month);

        if !quota::can_submit(consumed, units, MONTHLY_CAP) {
            warn!(
                "Rejected order of {} for {} ({}): {} already ordered in {}",
                units, student, class, consumed, month
            );
            return Err(SoucheError::QuotaExceeded {
                consumed,
                requested: units,
                cap: MONTHLY_CAP,
            });
        }

        let demande = Demande::new(student, &class, units, &month, self.clock.now());
        self.store
            .write("submit", |db| db.insert_demande(&demande))
            .await?;

        info!(
            "Recorded {} souche(s) for {} ({}) in {}",
            units, student, class, month
        );
        Ok(demande)
    }

    pub fn quota_status(&self, student: &str, class: &str) -> QuotaStatus {
        let student = quota::normalize_student(student);
        let student = student.as_str();
        let class = class.trim().to_uppercase();
        let month = self.current_month();
        let snapshot = self.store.snapshot();

        let consumed = quota::consumed_units(&snapshot.demandes, student, &class, &month);
        let requests = quota::active_requests_for(&snapshot.demandes, &month)
            .into_iter()
            .filter(|d| d.student == student && d.class == class)
            .cloned()
            .collect();

        QuotaStatus {
            month,
            consumed,
            remaining: quota::remaining_units(consumed, MONTHLY_CAP),
            cap: MONTHLY_CAP,
            requests,
        }
    }

    /// A student withdraws one of their own active orders of the current month.
    pub async fn cancel(&self, id: &str, student: &str) -> Result<Demande> {
        let demande = self.find(id)?;

        if demande.student != quota::normalize_student(student) {
            return Err(SoucheError::Forbidden(
                "this request belongs to another student".to_string(),
            ));
        }
        if demande.is_archived() || demande.month != self.current_month() {
            return Err(SoucheError::Forbidden(
                "only active requests of the current month can be cancelled".to_string(),
            ));
        }

        let removed = self
            .store
            .write("cancel", |db| db.delete_demande(id, None))
            .await?;
        if !removed {
            return Err(SoucheError::NotFound(id.to_string()));
        }

        info!("Cancelled request {} of {}", id, demande.student);
        Ok(demande)
    }

    // delegates and admins

    pub async fn record_payment(
        &self,
        cap: &Capability,
        id: &str,
        amount_paid: i64,
    ) -> Result<PaymentReceipt> {
        if amount_paid < 0 {
            return Err(SoucheError::InvalidAmount(amount_paid));
        }

        let mut demande = self.find(id)?;
        cap.require_class(&demande.class)?;

        let updated = self
            .store
            .write("record payment", |db| db.record_payment(id, amount_paid))
            .await?;
        if !updated {
            return Err(SoucheError::NotFound(id.to_string()));
        }

        demande.amount_paid = amount_paid;
        let amount_due = quota::amount_due(demande.units, UNIT_PRICE);
        let change = quota::change_owed(amount_paid, amount_due);
        info!(
            "{} recorded {} paid on {} (due {}, change {})",
            cap, amount_paid, id, amount_due, change
        );

        Ok(PaymentReceipt {
            demande,
            amount_due,
            change,
        })
    }

    pub async fn archive(&self, cap: &Capability, ids: Vec<String>) -> BatchSummary {
        self.scoped_batch(cap, "Archive", ids, |db, id, scope| db.archive_demande(id, scope))
            .await
    }

    /// Archive every active request of `month` the capability can manage.
    pub async fn archive_month(&self, cap: &Capability, month: &str) -> BatchSummary {
        let snapshot = self.store.snapshot();
        let ids = quota::active_requests_for(&snapshot.demandes, month)
            .into_iter()
            .filter(|d| cap.can_manage(&d.class))
            .map(|d| d.id.clone())
            .collect();
        self.archive(cap, ids).await
    }

    /// Permanent removal, bypassing history.
    pub async fn delete(&self, cap: &Capability, ids: Vec<String>) -> BatchSummary {
        self.scoped_batch(cap, "Delete", ids, |db, id, scope| db.delete_demande(id, scope))
            .await
    }

    /// Delete the current month's requests in the capability's scope. Month
    /// scoping alone already restarts counters; this clears the slate.
    pub async fn reset_month(&self, cap: &Capability) -> BatchSummary {
        let month = self.current_month();
        let snapshot = self.store.snapshot();
        let ids = snapshot
            .demandes
            .iter()
            .filter(|d| d.month == month && cap.can_manage(&d.class))
            .map(|d| d.id.clone())
            .collect();

        info!("{} resetting requests of {}", cap, month);
        self.delete(cap, ids).await
    }

    pub fn dashboard(&self, month: Option<&str>, class: Option<&str>, search: &str) -> Dashboard {
        let month = month.map(str::to_string).unwrap_or_else(|| self.current_month());
        let snapshot = self.store.snapshot();
        Dashboard::build(&snapshot.demandes, &month, class, search)
    }

    /// Records for listing/export, archived included when `include_archived`.
    pub fn history(
        &self,
        month: Option<&str>,
        class: Option<&str>,
        include_archived: bool,
    ) -> Vec<Demande> {
        let snapshot = self.store.snapshot();
        snapshot
            .demandes
            .iter()
            .filter(|d| include_archived || !d.is_archived())
            .filter(|d| month.map_or(true, |m| d.month == m))
            .filter(|d| class.map_or(true, |c| d.class == c))
            .cloned()
            .collect()
    }

    /// History restricted to what `cap` may see.
    pub fn export(
        &self,
        cap: &Capability,
        month: Option<&str>,
        class: Option<&str>,
        include_archived: bool,
    ) -> Result<Vec<Demande>> {
        let class = match (class, cap.scope()) {
            (Some(c), Some(own)) if c != own => {
                return Err(SoucheError::Forbidden(format!("{} cannot export {}", cap, c)));
            }
            (Some(c), _) => Some(c),
            (None, scope) => scope,
        };

        let rows = self.history(month, class, include_archived);
        debug!("{} exporting {} records", cap, rows.len());
        Ok(rows)
    }

    // roster

    pub async fn roster(&self, class: Option<&str>) -> Result<Vec<Etudiant>> {
        self.store.read(|db| db.list_etudiants(class)).await
    }

    /// Replace the whole roster with the rows of a CSV upload. The old
    /// roster is removed before the new rows are written; a file with no
    /// valid row leaves the roster untouched.
    pub async fn import_roster(&self, cap: &Capability, text: &str) -> Result<ImportReport> {
        cap.require_admin()?;

        let settings = self.settings().await?;
        let parsed = roster::parse_roster(text, &settings);
        let mut report = ImportReport {
            rejected: parsed.rejected,
            ..ImportReport::default()
        };

        if parsed.rows.is_empty() {
            warn!("Roster import has no valid rows, keeping current roster");
            return Ok(report);
        }

        report.removed = self.store.write("clear roster", |db| db.clear_roster()).await?;

        let now = self.clock.now();
        let etudiants: Vec<Etudiant> = parsed
            .rows
            .iter()
            .map(|row| Etudiant::new(&row.name, &row.class, now))
            .collect();

        report.imported = self
            .store
            .write("import roster", |db| {
                for etudiant in &etudiants {
                    db.insert_etudiant(etudiant)?;
                }
                Ok(etudiants.len())
            })
            .await?;

        info!(
            "Roster replaced: {} removed, {} imported, {} rejected",
            report.removed,
            report.imported,
            report.rejected.len()
        );
        Ok(report)
    }

    // credentials and settings

    /// The first admin may be registered without a code; later ones need an
    /// existing admin.
    pub async fn register_admin(
        &self,
        cap: Option<&Capability>,
        name: &str,
        code: &str,
        confirm: &str,
    ) -> Result<Credential> {
        let admins = self.store.read(|db| db.count_admins()).await?;
        if admins > 0 {
            cap.ok_or_else(|| SoucheError::Forbidden("admin code required".to_string()))?
                .require_admin()?;
        }

        let credential = auth::new_credential(name, Role::Admin, code, confirm)?;
        self.store
            .write("register admin", |db| db.insert_credential(&credential))
            .await?;
        Ok(credential)
    }

    pub async fn register_delegate(
        &self,
        cap: &Capability,
        name: &str,
        class: &str,
        code: &str,
        confirm: &str,
    ) -> Result<Credential> {
        cap.require_admin()?;

        let class = class.trim().to_uppercase();
        if !self.settings().await?.is_valid_class(&class) {
            return Err(SoucheError::UnknownClass(class));
        }

        let credential = auth::new_credential(name, Role::Delegate { class }, code, confirm)?;
        self.store
            .write("register delegate", |db| db.insert_credential(&credential))
            .await?;
        Ok(credential)
    }

    pub async fn delegues(&self) -> Result<Vec<Credential>> {
        self.store.read(|db| db.list_delegues()).await
    }

    pub async fn set_classes(&self, cap: &Capability, classes: &[String]) -> Result<Settings> {
        cap.require_admin()?;

        let mut normalized: Vec<String> = Vec::new();
        for class in classes {
            let class = class.trim().to_uppercase();
            if !class.is_empty() && !normalized.contains(&class) {
                normalized.push(class);
            }
        }
        if normalized.is_empty() {
            return Err(SoucheError::MissingField("classes"));
        }

        self.update_settings(|settings| settings.classes = normalized)
            .await
    }

    pub async fn set_school_year(&self, cap: &Capability, label: &str) -> Result<Settings> {
        cap.require_admin()?;

        let label = label.trim().to_string();
        if label.is_empty() {
            return Err(SoucheError::MissingField("school year"));
        }

        self.update_settings(|settings| settings.school_year = label)
            .await
    }

    async fn update_settings<F>(&self, change: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings),
    {
        self.store
            .write("update settings", |db| {
                let mut settings = db.load_settings()?.unwrap_or_default();
                change(&mut settings);
                db.save_settings(&settings)?;
                Ok(settings)
            })
            .await
    }

    fn find(&self, id: &str) -> Result<Demande> {
        self.store
            .snapshot()
            .demandes
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| SoucheError::NotFound(id.to_string()))
    }

    /// Records outside the capability's class are refused up front; the rest
    /// go through [`run_batch`] with the delegate's class passed down to the
    /// write, so ids the snapshot has not caught up with stay in scope too.
    async fn scoped_batch<F>(
        &self,
        cap: &Capability,
        action: &str,
        ids: Vec<String>,
        op: F,
    ) -> BatchSummary
    where
        F: Fn(&Database, &str, Option<&str>) -> Result<bool> + Copy,
    {
        let scope = cap.scope();
        let snapshot = self.store.snapshot();
        let mut allowed = Vec::new();
        let mut refused = Vec::new();

        for id in ids {
            match snapshot.demandes.iter().find(|d| d.id == id) {
                Some(d) if !cap.can_manage(&d.class) => {
                    let reason = format!("{} cannot manage class {}", cap, d.class);
                    refused.push((id, Err(SoucheError::Forbidden(reason))));
                }
                _ => allowed.push(id),
            }
        }

        let mut summary =
            run_batch(&self.store, action, allowed, move |db, id| op(db, id, scope)).await;
        summary.total += refused.len();
        summary.failed += refused.len();
        summary.results.extend(refused);
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::clock::MockClock;
    use chrono::{TimeZone, Utc};

    fn clock_at(year: i32, month: u32, day: u32) -> Arc<dyn Clock> {
        let mut clock = MockClock::new();
        clock
            .expect_now()
            .return_const(Utc.with_ymd_and_hms(year, month, day, 10, 0, 0).unwrap());
        Arc::new(clock)
    }

    async fn service_at(year: i32, month: u32, day: u32) -> SoucheService {
        let store = Store::new(Database::in_memory().unwrap()).await.unwrap();
        let service = SoucheService::with_clock(store, clock_at(year, month, day));
        service.init().await.unwrap();
        service
    }

    fn admin() -> Capability {
        Capability::Admin { name: "Direction".to_string() }
    }

    fn delegate(class: &str) -> Capability {
        Capability::Delegate { name: "Awa".to_string(), class: class.to_string() }
    }

    #[tokio::test]
    async fn test_partial_orders_then_rejection() {
        let service = service_at(2025, 3, 4).await;

        let a = service.submit("KONAN Jean", "ISE1", 2).await.unwrap();
        let b = service.submit("KONAN Jean", "ISE1", 1).await.unwrap();
        assert_eq!(a.month, "2025-03");
        assert_eq!(b.status, crate::storage::DemandeStatus::Active);

        let status = service.quota_status("KONAN Jean", "ISE1");
        assert_eq!(status.consumed, 3);
        assert_eq!(status.remaining, 0);
        assert_eq!(status.requests.len(), 2);

        let err = service.submit("KONAN Jean", "ISE1", 1).await.unwrap_err();
        assert!(matches!(
            err,
            SoucheError::QuotaExceeded { consumed: 3, requested: 1, cap: 3 }
        ));
        assert!(err.is_validation());
        assert_eq!(service.store().snapshot().demandes.len(), 2);
    }

    #[tokio::test]
    async fn test_name_spelling_variants_share_one_quota() {
        let service = service_at(2025, 3, 4).await;
        let first = service.submit("KONAN Jean", "ISE1", 3).await.unwrap();
        assert_eq!(first.student, "KONAN JEAN");

        for (name, class) in [("Konan Jean", "ISE1"), ("  KONAN  Jean ", "ise1"), ("konan\tjean", "ISE1")] {
            assert!(matches!(
                service.submit(name, class, 1).await,
                Err(SoucheError::QuotaExceeded { consumed: 3, .. })
            ));
        }

        assert_eq!(service.quota_status("konan   JEAN", "ise1").consumed, 3);
        assert_eq!(service.store().snapshot().demandes.len(), 1);

        service.cancel(&first.id, " konan jean").await.unwrap();
        assert_eq!(service.quota_status("KONAN JEAN", "ISE1").consumed, 0);
    }

    #[tokio::test]
    async fn test_new_month_starts_from_zero() {
        let january = service_at(2025, 1, 20).await;
        january.submit("KONAN Jean", "ISE1", 3).await.unwrap();

        let february = SoucheService::with_clock(january.store().clone(), clock_at(2025, 2, 1));
        assert_eq!(february.quota_status("KONAN Jean", "ISE1").consumed, 0);
        let d = february.submit("KONAN Jean", "ISE1", 1).await.unwrap();
        assert_eq!(d.month, "2025-02");
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let service = service_at(2025, 3, 4).await;

        assert!(matches!(
            service.submit("  ", "ISE1", 1).await,
            Err(SoucheError::MissingField("student"))
        ));
        assert!(matches!(
            service.submit("A", "ISE1", 0).await,
            Err(SoucheError::InvalidUnits(0))
        ));
        assert!(matches!(
            service.submit("A", "ISE1", 4).await,
            Err(SoucheError::InvalidUnits(4))
        ));
        assert!(matches!(
            service.submit("A", "MBA9", 1).await,
            Err(SoucheError::UnknownClass(_))
        ));
        assert!(service.store().snapshot().demandes.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_frees_quota_immediately() {
        let service = service_at(2025, 3, 4).await;
        let d = service.submit("ADOU Marie", "AS2", 3).await.unwrap();

        assert!(matches!(
            service.cancel(&d.id, "KONAN Jean").await,
            Err(SoucheError::Forbidden(_))
        ));

        service.cancel(&d.id, "ADOU Marie").await.unwrap();
        assert_eq!(service.quota_status("ADOU Marie", "AS2").consumed, 0);
        service.submit("ADOU Marie", "AS2", 3).await.unwrap();
    }

    #[tokio::test]
    async fn test_payment_and_change() {
        let service = service_at(2025, 3, 4).await;
        let d = service.submit("BAMBA Ali", "ISE2", 2).await.unwrap();

        let receipt = service.record_payment(&delegate("ISE2"), &d.id, 5000).await.unwrap();
        assert_eq!(receipt.amount_due, 4000);
        assert_eq!(receipt.change, 1000);

        let receipt = service.record_payment(&admin(), &d.id, 1000).await.unwrap();
        assert_eq!(receipt.change, -3000);
        assert_eq!(service.store().snapshot().demandes[0].amount_paid, 1000);

        assert!(matches!(
            service.record_payment(&delegate("AS1"), &d.id, 4000).await,
            Err(SoucheError::Forbidden(_))
        ));
        assert!(matches!(
            service.record_payment(&admin(), &d.id, -1).await,
            Err(SoucheError::InvalidAmount(-1))
        ));
        assert!(matches!(
            service.record_payment(&admin(), "missing", 100).await,
            Err(SoucheError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_archive_keeps_history_and_frees_totals() {
        let service = service_at(2025, 3, 4).await;
        service.submit("A", "ISE1", 2).await.unwrap();
        service.submit("B", "ISE1", 1).await.unwrap();
        service.submit("C", "AS1", 3).await.unwrap();

        let summary = service.archive_month(&delegate("ISE1"), "2025-03").await;
        assert_eq!(summary.successful, 2);
        assert!(summary.is_complete());

        let dashboard = service.dashboard(None, None, "");
        assert_eq!(dashboard.overall.units, 3);
        assert!(!dashboard.by_class.contains_key("ISE1"));
        assert_eq!(service.history(None, None, true).len(), 3);
        assert_eq!(service.history(None, None, false).len(), 1);

        // Archived orders no longer count toward the cap.
        assert_eq!(service.quota_status("A", "ISE1").consumed, 0);
    }

    #[tokio::test]
    async fn test_scoped_delete_refuses_other_classes() {
        let service = service_at(2025, 3, 4).await;
        let mine = service.submit("A", "ISE1", 1).await.unwrap();
        let other = service.submit("B", "AS3", 1).await.unwrap();

        let summary = service
            .delete(&delegate("ISE1"), vec![mine.id.clone(), other.id.clone()])
            .await;
        assert_eq!(summary.total, 2);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);

        let remaining: Vec<String> = service
            .store()
            .snapshot()
            .demandes
            .iter()
            .map(|d| d.id.clone())
            .collect();
        assert_eq!(remaining, vec![other.id]);
    }

    #[tokio::test]
    async fn test_delegate_batch_scope_holds_for_unseen_records() {
        let service = service_at(2025, 3, 4).await;
        let hidden = Demande::new("B", "AS3", 1, "2025-03", Utc::now());
        let inserted = hidden.clone();
        // Written without republishing, as another process would.
        service
            .store()
            .read(move |db| db.insert_demande(&inserted))
            .await
            .unwrap();
        assert!(service.store().snapshot().demandes.is_empty());

        let archived = service.archive(&delegate("ISE1"), vec![hidden.id.clone()]).await;
        assert_eq!(archived.failed, 1);
        let deleted = service.delete(&delegate("ISE1"), vec![hidden.id.clone()]).await;
        assert_eq!(deleted.failed, 1);

        let stored = service
            .store()
            .read(|db| db.get_demande(&hidden.id))
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.is_archived());

        let deleted = service.delete(&delegate("AS3"), vec![hidden.id.clone()]).await;
        assert!(deleted.is_complete());
        assert!(service.store().snapshot().demandes.is_empty());
    }

    #[tokio::test]
    async fn test_reset_month_only_touches_current_month() {
        let january = service_at(2025, 1, 10).await;
        january.submit("A", "ISE1", 1).await.unwrap();

        let february = SoucheService::with_clock(january.store().clone(), clock_at(2025, 2, 10));
        february.submit("A", "ISE1", 2).await.unwrap();
        february.submit("B", "AS1", 1).await.unwrap();

        let summary = february.reset_month(&admin()).await;
        assert_eq!(summary.successful, 2);

        let left = february.history(None, None, true);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].month, "2025-01");
    }

    #[tokio::test]
    async fn test_dashboard_filters_rows_not_totals() {
        let service = service_at(2025, 3, 4).await;
        service.submit("KONAN Jean", "ISE1", 2).await.unwrap();
        service.submit("KONE Awa", "AS1", 1).await.unwrap();
        service.submit("BAMBA Ali", "ISE1", 1).await.unwrap();

        let dashboard = service.dashboard(None, Some("ISE1"), "kon");
        assert_eq!(dashboard.rows.len(), 1);
        assert_eq!(dashboard.rows[0].student, "KONAN JEAN");
        assert_eq!(dashboard.overall.requests, 3);
        assert_eq!(dashboard.overall.units, 4);
        assert_eq!(dashboard.by_class["ISE1"].amount_due, 6000);
    }

    #[tokio::test]
    async fn test_export_is_scoped_for_delegates() {
        let service = service_at(2025, 3, 4).await;
        service.submit("A", "ISE1", 1).await.unwrap();
        service.submit("B", "AS1", 1).await.unwrap();

        let rows = service.export(&delegate("AS1"), None, None, true).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].class, "AS1");
        assert!(service.export(&delegate("AS1"), None, Some("ISE1"), true).is_err());
        assert_eq!(service.export(&admin(), None, None, true).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_archived_month_still_exports() {
        let service = service_at(2025, 3, 4).await;
        service.submit("A", "ISE1", 1).await.unwrap();
        service.submit("B", "ISE1", 2).await.unwrap();
        service.archive_month(&admin(), "2025-03").await;

        let window = export::ExportWindow::resolve(Some("2025-03".to_string()), false, "2025-03");
        let rows = service
            .export(&admin(), window.month.as_deref(), None, window.include_archived)
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(Demande::is_archived));

        let current = export::ExportWindow::resolve(None, false, "2025-03");
        let rows = service
            .export(&admin(), current.month.as_deref(), None, current.include_archived)
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_import_roster_replaces_previous() {
        let service = service_at(2025, 3, 4).await;

        let report = service
            .import_roster(&admin(), "Konan,Jean,ISE1\nAdou,Marie,AS2\n")
            .await
            .unwrap();
        assert_eq!(report.imported, 2);
        assert_eq!(report.removed, 0);

        let report = service
            .import_roster(&admin(), "Name,Surname,Class\nZadi,Paul,ISE1\nX,Y,NOPE\n")
            .await
            .unwrap();
        assert_eq!(report.removed, 2);
        assert_eq!(report.imported, 1);
        assert_eq!(report.rejected.len(), 1);

        let roster = service.roster(None).await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].name, "ZADI PAUL");

        // Nothing valid: roster kept.
        let report = service.import_roster(&admin(), "garbage\n").await.unwrap();
        assert_eq!(report.imported, 0);
        assert_eq!(service.roster(None).await.unwrap().len(), 1);

        assert!(service.import_roster(&delegate("ISE1"), "A,B,ISE1").await.is_err());
    }

    #[tokio::test]
    async fn test_credentials_flow() {
        let service = service_at(2025, 3, 4).await;

        service
            .register_admin(None, "Direction", "root-code", "root-code")
            .await
            .unwrap();
        assert!(matches!(
            service.register_admin(None, "Other", "x", "x").await,
            Err(SoucheError::Forbidden(_))
        ));

        let admin = service.verify("root-code").await.unwrap();
        assert!(admin.is_admin());

        assert!(matches!(
            service.register_delegate(&admin, "Awa", "ise3", "d-code", "d-cod").await,
            Err(SoucheError::ConfirmationMismatch)
        ));
        service
            .register_delegate(&admin, "Awa", "ise3", "d-code", "d-code")
            .await
            .unwrap();

        let cap = service.verify("d-code").await.unwrap();
        assert_eq!(cap.scope(), Some("ISE3"));
        assert_eq!(service.delegues().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_settings_updates() {
        let service = service_at(2025, 3, 4).await;

        let settings = service
            .set_classes(&admin(), &["ise1".to_string(), "MBA".to_string(), "ISE1".to_string()])
            .await
            .unwrap();
        assert_eq!(settings.classes, vec!["ISE1", "MBA"]);
        service.submit("A", "MBA", 1).await.unwrap();
        assert!(matches!(
            service.submit("A", "AS1", 1).await,
            Err(SoucheError::UnknownClass(_))
        ));

        let settings = service.set_school_year(&admin(), "2026-2027").await.unwrap();
        assert_eq!(settings.school_year, "2026-2027");
        assert!(service.set_school_year(&delegate("MBA"), "x").await.is_err());
    }
}
