use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "souche")]
#[command(about = "Monthly canteen ticket orders, quotas and payment reconciliation")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config/default")]
    pub config: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize database, settings and configuration file
    Init {
        /// Register a first admin with this name
        #[arg(long, requires = "admin_code")]
        admin_name: Option<String>,

        /// Code for the first admin
        #[arg(long, requires = "admin_name")]
        admin_code: Option<String>,
    },

    /// Show or change the class list and school year
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Order souches for the current month
    Submit {
        /// Student display name
        #[arg(short, long)]
        student: String,

        /// Class identifier
        #[arg(short = 'k', long)]
        class: String,

        /// Number of souches (1 to 3)
        #[arg(short, long, default_value = "1")]
        units: u32,
    },

    /// Show a student's consumption for the current month
    Quota {
        #[arg(short, long)]
        student: String,

        #[arg(short = 'k', long)]
        class: String,
    },

    /// Cancel one of your requests of the current month
    Cancel {
        /// Request id
        id: String,

        /// Student who made the request
        #[arg(short, long)]
        student: String,
    },

    /// Record the amount paid for a request
    Pay {
        /// Request id
        id: String,

        /// Amount paid
        amount: i64,

        /// Delegate or admin code
        #[arg(long)]
        code: String,
    },

    /// Archive requests (kept in history, removed from totals)
    Archive {
        /// Request ids
        ids: Vec<String>,

        /// Archive every active request of this month instead
        #[arg(short, long, conflicts_with = "ids")]
        month: Option<String>,

        #[arg(long)]
        code: String,
    },

    /// Permanently delete requests
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,

        #[arg(long)]
        code: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete all requests of the current month
    Reset {
        #[arg(long)]
        code: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// List requests
    List {
        /// Month key (YYYY-MM), defaults to the current month
        #[arg(short, long)]
        month: Option<String>,

        /// Filter by class
        #[arg(short = 'k', long)]
        class: Option<String>,

        /// Search by student name
        #[arg(short, long, default_value = "")]
        search: String,

        /// Include archived requests and every month
        #[arg(short, long)]
        all: bool,

        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Show per-class totals for a month
    Stats {
        #[arg(short, long)]
        month: Option<String>,

        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Export requests as CSV or JSON
    Export {
        #[arg(long)]
        code: String,

        /// Month key (YYYY-MM), archived requests included; defaults to
        /// the active requests of the current month
        #[arg(short, long)]
        month: Option<String>,

        #[arg(short = 'k', long)]
        class: Option<String>,

        /// Every month, archived requests included
        #[arg(short, long)]
        all: bool,

        #[arg(short, long, value_enum, default_value = "csv")]
        format: ExportFormat,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Manage the class roster
    Roster {
        #[command(subcommand)]
        action: RosterAction,
    },

    /// Manage delegates
    Delegate {
        #[command(subcommand)]
        action: DelegateAction,
    },

    /// Manage admins
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },

    /// Check which role a code grants
    Verify {
        code: String,
    },

    /// Live dashboard, redrawn whenever requests change
    Watch {
        /// Poll interval in seconds, overrides the configuration
        #[arg(short, long)]
        interval: Option<u64>,

        #[arg(short = 'k', long)]
        class: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SettingsAction {
    Show,

    SetClasses {
        #[arg(required = true)]
        classes: Vec<String>,

        #[arg(long)]
        code: String,
    },

    SetYear {
        label: String,

        #[arg(long)]
        code: String,
    },
}

#[derive(Subcommand)]
pub enum RosterAction {
    List {
        #[arg(short = 'k', long)]
        class: Option<String>,
    },

    /// Replace the roster with a CSV file of `Name,Surname,Class` rows
    Import {
        file: String,

        #[arg(long)]
        code: String,

        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum DelegateAction {
    Add {
        #[arg(short, long)]
        name: String,

        #[arg(short = 'k', long)]
        class: String,

        /// Code the delegate will use
        #[arg(long)]
        code: String,

        #[arg(long)]
        confirm: String,

        #[arg(long)]
        admin_code: String,
    },

    List,
}

#[derive(Subcommand)]
pub enum AdminAction {
    Add {
        #[arg(short, long)]
        name: String,

        #[arg(long)]
        code: String,

        #[arg(long)]
        confirm: String,

        /// Existing admin code, not needed for the first admin
        #[arg(long)]
        admin_code: Option<String>,
    },
}
