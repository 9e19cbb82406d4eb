use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// One student's order of souches for a given month.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Demande {
    pub id: String,
    pub student: String,
    pub class: String,
    pub units: u32,
    pub month: String,
    pub created_at: DateTime<Utc>,
    pub amount_paid: i64,
    pub status: DemandeStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DemandeStatus {
    Active,
    Archived,
}

impl std::fmt::Display for DemandeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DemandeStatus::Active => write!(f, "active"),
            DemandeStatus::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for DemandeStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(DemandeStatus::Active),
            "archived" => Ok(DemandeStatus::Archived),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

impl Demande {
    pub fn new(student: &str, class: &str, units: u32, month: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            student: student.to_string(),
            class: class.to_string(),
            units,
            month: month.to_string(),
            created_at,
            amount_paid: 0,
            status: DemandeStatus::Active,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.status == DemandeStatus::Archived
    }
}

/// Roster entry, owned by administration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Etudiant {
    pub id: String,
    pub name: String,
    pub class: String,
    pub active: bool,
    pub enrolled_at: DateTime<Utc>,
}

impl Etudiant {
    pub fn new(name: &str, class: &str, enrolled_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            class: class.to_string(),
            active: true,
            enrolled_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Role {
    Delegate { class: String },
    Admin,
}

/// Delegate or admin principal; only the hash of the shared code is stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Credential {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub code_hash: String,
}

/// The `config/settings` singleton.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    pub classes: Vec<String>,
    pub school_year: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            classes: ["ISE1", "ISE2", "ISE3", "AS1", "AS2", "AS3"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            school_year: "2025-2026".to_string(),
        }
    }
}

impl Settings {
    pub fn is_valid_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}
