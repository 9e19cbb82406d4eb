pub mod db;
pub mod feed;
pub mod models;
pub mod store;

pub use db::{Database, DatabaseStats};
pub use feed::SnapshotPoller;
pub use models::{Credential, Demande, DemandeStatus, Etudiant, Role, Settings};
pub use store::{Snapshot, Store};
