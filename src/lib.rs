pub mod auth;
pub mod config;
pub mod error;
pub mod quota;
pub mod service;
pub mod storage;
pub mod utils;

pub use error::{Result, SoucheError};
pub use crate::config::Config;
pub use service::SoucheService;
