//! Shared-secret codes for delegates and admins.
//!
//! A code is never stored, only its SHA-256 hex digest. Verifying a code
//! yields a [`Capability`]; there are no sessions and nothing expires.

use sha2::{Digest, Sha256};
use tracing::{debug, info};
use crate::{
    error::{Result, SoucheError},
    storage::{Credential, Database, Role},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Admin { name: String },
    Delegate { name: String, class: String },
}

impl Capability {
    pub fn name(&self) -> &str {
        match self {
            Capability::Admin { name } | Capability::Delegate { name, .. } => name,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Capability::Admin { .. })
    }

    /// Class this capability is limited to, `None` for admins.
    pub fn scope(&self) -> Option<&str> {
        match self {
            Capability::Admin { .. } => None,
            Capability::Delegate { class, .. } => Some(class),
        }
    }

    pub fn can_manage(&self, class: &str) -> bool {
        self.scope().map_or(true, |own| own == class)
    }

    pub fn require_class(&self, class: &str) -> Result<()> {
        if self.can_manage(class) {
            Ok(())
        } else {
            Err(SoucheError::Forbidden(format!(
                "{} can only manage class {}",
                self.name(),
                self.scope().unwrap_or_default()
            )))
        }
    }

    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(SoucheError::Forbidden("admin code required".to_string()))
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Admin { name } => write!(f, "admin {}", name),
            Capability::Delegate { name, class } => write!(f, "delegate {} ({})", name, class),
        }
    }
}

/// Lowercase hex SHA-256 of the code.
pub fn hash_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    const_hex::encode(hasher.finalize())
}

pub fn verify_code(code: &str, stored_hash: &str) -> bool {
    hash_code(code) == stored_hash
}

/// Resolve a code to a capability. Admin codes win over delegate codes.
pub fn verify(db: &Database, code: &str) -> Result<Capability> {
    if code.trim().is_empty() {
        return Err(SoucheError::MissingField("code"));
    }
    let code_hash = hash_code(code);

    if let Some(admin) = db.find_admin_by_hash(&code_hash)? {
        debug!("Code matched admin {}", admin.name);
        return Ok(Capability::Admin { name: admin.name });
    }

    if let Some(delegue) = db.find_delegue_by_hash(&code_hash)? {
        if let Role::Delegate { class } = delegue.role {
            debug!("Code matched delegate {} of {}", delegue.name, class);
            return Ok(Capability::Delegate { name: delegue.name, class });
        }
    }

    Err(SoucheError::InvalidCode)
}

/// Build a credential from a code and its confirmation.
pub fn new_credential(name: &str, role: Role, code: &str, confirm: &str) -> Result<Credential> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SoucheError::MissingField("name"));
    }
    if code.is_empty() {
        return Err(SoucheError::MissingField("code"));
    }
    if code != confirm {
        return Err(SoucheError::ConfirmationMismatch);
    }

    info!("Registering {} credential for {}", role_label(&role), name);
    Ok(Credential {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
        role,
        code_hash: hash_code(code),
    })
}

fn role_label(role: &Role) -> &'static str {
    match role {
        Role::Admin => "admin",
        Role::Delegate { .. } => "delegate",
    }
}
