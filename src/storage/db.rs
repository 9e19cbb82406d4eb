use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use chrono::{DateTime, Utc};
use serde::Serialize;
use crate::{
    error::Result,
    storage::models::{Credential, Demande, DemandeStatus, Etudiant, Role, Settings},
};

const DEMANDE_COLUMNS: &str =
    "id, student, class, units, month, created_at, amount_paid, status";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS demandes (
                id TEXT PRIMARY KEY,
                student TEXT NOT NULL,
                class TEXT NOT NULL,
                units INTEGER NOT NULL,
                month TEXT NOT NULL,
                created_at TEXT NOT NULL,
                amount_paid INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'active'
            );
            CREATE INDEX IF NOT EXISTS idx_demandes_month ON demandes(month);

            CREATE TABLE IF NOT EXISTS etudiants (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                class TEXT NOT NULL,
                active INTEGER NOT NULL,
                enrolled_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS delegues (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                class TEXT NOT NULL,
                code_hash TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS admins (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                code_hash TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    // demandes

    pub fn insert_demande(&self, demande: &Demande) -> Result<()> {
        self.conn.execute(
            "INSERT INTO demandes
             (id, student, class, units, month, created_at, amount_paid, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                demande.id,
                demande.student,
                demande.class,
                demande.units,
                demande.month,
                demande.created_at.to_rfc3339(),
                demande.amount_paid,
                demande.status.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn get_demande(&self, id: &str) -> Result<Option<Demande>> {
        let demande = self
            .conn
            .query_row(
                &format!("SELECT {} FROM demandes WHERE id = ?1", DEMANDE_COLUMNS),
                [id],
                demande_from_row,
            )
            .optional()?;
        Ok(demande)
    }

    /// Every record, archived ones included, in creation order.
    pub fn list_demandes(&self) -> Result<Vec<Demande>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM demandes ORDER BY created_at, rowid",
            DEMANDE_COLUMNS
        ))?;

        let demandes = stmt
            .query_map([], demande_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(demandes)
    }

    /// Returns false when no record had this id.
    /// With a `class`, only a record of that class is removed.
    pub fn delete_demande(&self, id: &str, class: Option<&str>) -> Result<bool> {
        let changed = self.conn.execute(
            "DELETE FROM demandes WHERE id = ?1 AND (?2 IS NULL OR class = ?2)",
            params![id, class],
        )?;
        Ok(changed > 0)
    }

    pub fn record_payment(&self, id: &str, amount_paid: i64) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE demandes SET amount_paid = ?1 WHERE id = ?2",
            params![amount_paid, id],
        )?;
        Ok(changed > 0)
    }

    pub fn archive_demande(&self, id: &str, class: Option<&str>) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE demandes SET status = ?1 WHERE id = ?2 AND (?3 IS NULL OR class = ?3)",
            params![DemandeStatus::Archived.to_string(), id, class],
        )?;
        Ok(changed > 0)
    }

    // etudiants

    pub fn insert_etudiant(&self, etudiant: &Etudiant) -> Result<()> {
        self.conn.execute(
            "INSERT INTO etudiants (id, name, class, active, enrolled_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                etudiant.id,
                etudiant.name,
                etudiant.class,
                etudiant.active,
                etudiant.enrolled_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn clear_roster(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM etudiants", [])?)
    }

    /// Active roster entries, optionally for one class, sorted by name.
    pub fn list_etudiants(&self, class: Option<&str>) -> Result<Vec<Etudiant>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, class, active, enrolled_at
             FROM etudiants
             WHERE active = 1 AND (?1 IS NULL OR class = ?1)
             ORDER BY name",
        )?;

        let etudiants = stmt
            .query_map([class], |row| {
                Ok(Etudiant {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    class: row.get(2)?,
                    active: row.get(3)?,
                    enrolled_at: parse_timestamp(row, 4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(etudiants)
    }

    // credentials

    pub fn insert_credential(&self, credential: &Credential) -> Result<()> {
        match &credential.role {
            Role::Delegate { class } => {
                self.conn.execute(
                    "INSERT INTO delegues (id, name, class, code_hash) VALUES (?1, ?2, ?3, ?4)",
                    params![credential.id, credential.name, class, credential.code_hash],
                )?;
            }
            Role::Admin => {
                self.conn.execute(
                    "INSERT INTO admins (id, name, code_hash) VALUES (?1, ?2, ?3)",
                    params![credential.id, credential.name, credential.code_hash],
                )?;
            }
        }
        Ok(())
    }

    pub fn find_admin_by_hash(&self, code_hash: &str) -> Result<Option<Credential>> {
        let admin = self
            .conn
            .query_row(
                "SELECT id, name, code_hash FROM admins WHERE code_hash = ?1",
                [code_hash],
                |row| {
                    Ok(Credential {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        role: Role::Admin,
                        code_hash: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(admin)
    }

    pub fn find_delegue_by_hash(&self, code_hash: &str) -> Result<Option<Credential>> {
        let delegue = self
            .conn
            .query_row(
                "SELECT id, name, class, code_hash FROM delegues WHERE code_hash = ?1",
                [code_hash],
                delegue_from_row,
            )
            .optional()?;
        Ok(delegue)
    }

    /// All delegates sorted by class.
    pub fn list_delegues(&self) -> Result<Vec<Credential>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, class, code_hash FROM delegues ORDER BY class, name")?;

        let delegues = stmt
            .query_map([], delegue_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(delegues)
    }

    pub fn count_admins(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM admins", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // settings

    pub fn load_settings(&self) -> Result<Option<Settings>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = 'settings'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES ('settings', ?1)",
            [serde_json::to_string(settings)?],
        )?;
        Ok(())
    }

    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(DatabaseStats {
            total_demandes: count("SELECT COUNT(*) FROM demandes")?,
            active_demandes: count("SELECT COUNT(*) FROM demandes WHERE status = 'active'")?,
            archived_demandes: count("SELECT COUNT(*) FROM demandes WHERE status = 'archived'")?,
            etudiants: count("SELECT COUNT(*) FROM etudiants WHERE active = 1")?,
            delegues: count("SELECT COUNT(*) FROM delegues")?,
            admins: count("SELECT COUNT(*) FROM admins")?,
        })
    }
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    raw.parse::<DateTime<Utc>>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn demande_from_row(row: &Row<'_>) -> rusqlite::Result<Demande> {
    let status: String = row.get(7)?;
    let status = status
        .parse::<DemandeStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, e.into()))?;

    Ok(Demande {
        id: row.get(0)?,
        student: row.get(1)?,
        class: row.get(2)?,
        units: row.get(3)?,
        month: row.get(4)?,
        created_at: parse_timestamp(row, 5)?,
        amount_paid: row.get(6)?,
        status,
    })
}

fn delegue_from_row(row: &Row<'_>) -> rusqlite::Result<Credential> {
    Ok(Credential {
        id: row.get(0)?,
        name: row.get(1)?,
        role: Role::Delegate { class: row.get(2)? },
        code_hash: row.get(3)?,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_demandes: usize,
    pub active_demandes: usize,
    pub archived_demandes: usize,
    pub etudiants: usize,
    pub delegues: usize,
    pub admins: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 9, 0, 0).unwrap()
    }

    fn temp_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("souche.db");
        let db = Database::new(path.to_str().unwrap()).unwrap();
        (dir, db)
    }

    #[test]
    fn test_demande_lifecycle() {
        let (_dir, db) = temp_db();
        let demande = Demande::new("KONAN Jean", "ISE1", 2, "2025-03", at(1));
        db.insert_demande(&demande).unwrap();

        let loaded = db.get_demande(&demande.id).unwrap().unwrap();
        assert_eq!(loaded, demande);

        assert!(db.record_payment(&demande.id, 4000).unwrap());
        assert!(db.archive_demande(&demande.id, None).unwrap());

        let loaded = db.get_demande(&demande.id).unwrap().unwrap();
        assert_eq!(loaded.amount_paid, 4000);
        assert_eq!(loaded.status, DemandeStatus::Archived);

        assert!(db.delete_demande(&demande.id, None).unwrap());
        assert!(db.get_demande(&demande.id).unwrap().is_none());
        assert!(!db.delete_demande(&demande.id, None).unwrap());
    }

    #[test]
    fn test_list_demandes_keeps_creation_order() {
        let (_dir, db) = temp_db();
        let late = Demande::new("B", "AS1", 1, "2025-03", at(20));
        let early = Demande::new("A", "AS1", 1, "2025-03", at(2));
        db.insert_demande(&late).unwrap();
        db.insert_demande(&early).unwrap();

        let ids: Vec<String> = db.list_demandes().unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![early.id, late.id]);
    }

    #[test]
    fn test_class_scoped_writes_skip_other_classes() {
        let db = Database::in_memory().unwrap();
        let demande = Demande::new("KONAN JEAN", "ISE2", 1, "2025-03", at(1));
        db.insert_demande(&demande).unwrap();

        assert!(!db.archive_demande(&demande.id, Some("ISE1")).unwrap());
        assert!(!db.delete_demande(&demande.id, Some("ISE1")).unwrap());
        let loaded = db.get_demande(&demande.id).unwrap().unwrap();
        assert_eq!(loaded.status, DemandeStatus::Active);

        assert!(db.archive_demande(&demande.id, Some("ISE2")).unwrap());
        assert!(db.delete_demande(&demande.id, Some("ISE2")).unwrap());
    }

    #[test]
    fn test_missing_ids_report_false() {
        let db = Database::in_memory().unwrap();
        assert!(!db.record_payment("nope", 100).unwrap());
        assert!(!db.archive_demande("nope", None).unwrap());
    }

    #[test]
    fn test_roster_filters_inactive_and_sorts() {
        let db = Database::in_memory().unwrap();
        db.insert_etudiant(&Etudiant::new("ZADI Paul", "ISE1", at(1))).unwrap();
        db.insert_etudiant(&Etudiant::new("ADOU Marie", "ISE1", at(1))).unwrap();
        db.insert_etudiant(&Etudiant::new("BAMBA Ali", "AS2", at(1))).unwrap();
        let mut gone = Etudiant::new("COULIBALY Awa", "ISE1", at(1));
        gone.active = false;
        db.insert_etudiant(&gone).unwrap();

        let names: Vec<String> = db
            .list_etudiants(Some("ISE1"))
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["ADOU Marie", "ZADI Paul"]);
        assert_eq!(db.list_etudiants(None).unwrap().len(), 3);

        assert_eq!(db.clear_roster().unwrap(), 4);
        assert!(db.list_etudiants(None).unwrap().is_empty());
    }

    #[test]
    fn test_credentials_lookup_by_hash() {
        let db = Database::in_memory().unwrap();
        let delegue = Credential {
            id: "d1".to_string(),
            name: "Awa".to_string(),
            role: Role::Delegate { class: "AS1".to_string() },
            code_hash: "abc".to_string(),
        };
        let admin = Credential {
            id: "a1".to_string(),
            name: "Direction".to_string(),
            role: Role::Admin,
            code_hash: "def".to_string(),
        };
        db.insert_credential(&delegue).unwrap();
        db.insert_credential(&admin).unwrap();

        assert_eq!(db.find_delegue_by_hash("abc").unwrap(), Some(delegue));
        assert_eq!(db.find_admin_by_hash("def").unwrap(), Some(admin));
        assert!(db.find_admin_by_hash("abc").unwrap().is_none());
        assert_eq!(db.count_admins().unwrap(), 1);
    }

    #[test]
    fn test_settings_singleton() {
        let db = Database::in_memory().unwrap();
        assert!(db.load_settings().unwrap().is_none());

        let mut settings = Settings::default();
        db.save_settings(&settings).unwrap();
        settings.school_year = "2026-2027".to_string();
        db.save_settings(&settings).unwrap();

        assert_eq!(db.load_settings().unwrap(), Some(settings));
    }

    #[test]
    fn test_stats_counts() {
        let db = Database::in_memory().unwrap();
        let a = Demande::new("A", "ISE2", 1, "2025-03", at(1));
        let b = Demande::new("B", "ISE2", 3, "2025-03", at(2));
        db.insert_demande(&a).unwrap();
        db.insert_demande(&b).unwrap();
        db.archive_demande(&b.id, None).unwrap();

        let stats = db.get_stats().unwrap();
        assert_eq!(stats.total_demandes, 2);
        assert_eq!(stats.active_demandes, 1);
        assert_eq!(stats.archived_demandes, 1);
    }
}
