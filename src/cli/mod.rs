pub mod commands;

pub use commands::{
    AdminAction, Cli, Commands, DelegateAction, ExportFormat, OutputFormat, RosterAction,
    SettingsAction,
};
