mod cli;

use std::path::Path;
use clap::Parser;
use cli::{
    AdminAction, Cli, Commands, DelegateAction, ExportFormat, OutputFormat, RosterAction,
    SettingsAction,
};
use colored::*;
use souche_cantine::{
    auth::Capability,
    error::{self, SoucheError},
    quota::{self, Totals, MONTHLY_CAP, UNIT_PRICE},
    service::{export::{self, ExportWindow}, BatchSummary, Dashboard},
    storage::{Demande, Role, SnapshotPoller, Store},
    utils, Config, SoucheService,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}", format!("Failed to load configuration: {}", e).red());
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(cli, config).await {
        error!("{}", e);
        eprintln!("{}", format!("Error: {}", e).red());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: Config) -> error::Result<()> {
    let store = Store::open(&config.database.path).await?;
    let service = SoucheService::new(store);

    match cli.command {
        Commands::Init { admin_name, admin_code } => {
            info!("Initializing...");
            initialize(&service, &config, &cli.config, admin_name, admin_code).await
        }

        Commands::Settings { action } => match action {
            SettingsAction::Show => show_settings(&service).await,
            SettingsAction::SetClasses { classes, code } => {
                let cap = service.verify(&code).await?;
                let settings = service.set_classes(&cap, &classes).await?;
                println!("{} Classes: {}", "✓".green(), settings.classes.join(", "));
                Ok(())
            }
            SettingsAction::SetYear { label, code } => {
                let cap = service.verify(&code).await?;
                let settings = service.set_school_year(&cap, &label).await?;
                println!("{} School year: {}", "✓".green(), settings.school_year);
                Ok(())
            }
        },

        Commands::Submit { student, class, units } => submit(&service, &student, &class, units).await,

        Commands::Quota { student, class } => {
            show_quota(&service, &student, &class);
            Ok(())
        }

        Commands::Cancel { id, student } => {
            let demande = service.cancel(&id, &student).await?;
            println!(
                "{} Cancelled {} souche(s) for {}",
                "✓".green(),
                demande.units,
                demande.student
            );
            Ok(())
        }

        Commands::Pay { id, amount, code } => pay(&service, &id, amount, &code).await,

        Commands::Archive { ids, month, code } => {
            let cap = service.verify(&code).await?;
            let summary = match month {
                Some(month) => {
                    let month = quota::parse_month_key(&month)?;
                    service.archive_month(&cap, &month).await
                }
                None if ids.is_empty() => return Err(SoucheError::MissingField("ids or --month")),
                None => service.archive(&cap, ids).await,
            };
            summary.print_summary("Archive");
            Ok(())
        }

        Commands::Delete { ids, code, yes } => {
            let cap = service.verify(&code).await?;
            if !yes && !utils::confirm_action(&format!("Permanently delete {} request(s)?", ids.len()))? {
                println!("Cancelled");
                return Ok(());
            }
            service.delete(&cap, ids).await.print_summary("Delete");
            Ok(())
        }

        Commands::Reset { code, yes } => reset(&service, &code, yes).await,

        Commands::List { month, class, search, all, format } => {
            list(&service, month, class, &search, all, format)
        }

        Commands::Stats { month, format } => stats(&service, month, format).await,

        Commands::Export { code, month, class, all, format, output } => {
            export_requests(&service, &code, month, class, all, format, output).await
        }

        Commands::Roster { action } => match action {
            RosterAction::List { class } => roster_list(&service, class).await,
            RosterAction::Import { file, code, yes } => roster_import(&service, &file, &code, yes).await,
        },

        Commands::Delegate { action } => match action {
            DelegateAction::Add { name, class, code, confirm, admin_code } => {
                let cap = service.verify(&admin_code).await?;
                let credential = service
                    .register_delegate(&cap, &name, &class, &code, &confirm)
                    .await?;
                println!("{} Delegate {} registered", "✓".green(), credential.name);
                Ok(())
            }
            DelegateAction::List => delegate_list(&service).await,
        },

        Commands::Admin { action } => match action {
            AdminAction::Add { name, code, confirm, admin_code } => {
                let cap = match admin_code {
                    Some(c) => Some(service.verify(&c).await?),
                    None => None,
                };
                let credential = service
                    .register_admin(cap.as_ref(), &name, &code, &confirm)
                    .await?;
                println!("{} Admin {} registered", "✓".green(), credential.name);
                Ok(())
            }
        },

        Commands::Verify { code } => {
            match service.verify(&code).await {
                Ok(cap) => println!("{} Code grants {}", "✓".green(), cap),
                Err(SoucheError::InvalidCode) => println!("{}", "✗ Unknown code".red()),
                Err(e) => return Err(e),
            }
            Ok(())
        }

        Commands::Watch { interval, class } => {
            let interval = interval.unwrap_or(config.feed.poll_interval_secs);
            watch(&service, interval, normalize_class(class)).await
        }
    }
}

fn normalize_class(class: Option<String>) -> Option<String> {
    class.map(|c| c.trim().to_uppercase()).filter(|c| !c.is_empty())
}

fn parse_month(month: Option<String>) -> error::Result<Option<String>> {
    month.map(|m| quota::parse_month_key(&m)).transpose()
}

async fn initialize(
    service: &SoucheService,
    config: &Config,
    config_path: &str,
    admin_name: Option<String>,
    admin_code: Option<String>,
) -> error::Result<()> {
    println!("{}", "Initializing SoucheApp...".green());

    let settings = service.init().await?;
    println!("{}", "✓ Database initialized".green());

    let file = if Path::new(config_path).extension().is_some() {
        config_path.to_string()
    } else {
        format!("{}.toml", config_path)
    };
    if Path::new(&file).exists() {
        println!("{}", format!("✓ Configuration loaded from {}", file).green());
    } else {
        if let Some(parent) = Path::new(&file).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&file, config.to_toml()?)?;
        println!("{}", format!("✓ Configuration written to {}", file).green());
    }

    if let (Some(name), Some(code)) = (admin_name, admin_code) {
        let credential = service.register_admin(None, &name, &code, &code).await?;
        println!("{}", format!("✓ Admin {} registered", credential.name).green());
    }

    println!("\n{}", "Configuration:".cyan());
    println!("  Database:     {}", config.database.path);
    println!("  School year:  {}", settings.school_year);
    println!("  Classes:      {}", settings.classes.join(", "));
    println!("  Monthly cap:  {} souches", MONTHLY_CAP);
    println!("  Unit price:   {}", utils::format_amount(UNIT_PRICE));

    println!("\n{}", "Ready to use! Try running:".cyan());
    println!("  {} to order souches", "souche submit -s \"KONAN Jean\" -k ISE1 -u 2".yellow());
    println!("  {} to see this month's requests", "souche list".yellow());
    println!("  {} for a live dashboard", "souche watch".yellow());
    Ok(())
}

async fn show_settings(service: &SoucheService) -> error::Result<()> {
    let settings = service.settings().await?;
    println!("{}", "=== Settings ===".cyan().bold());
    println!("School year:   {}", settings.school_year);
    println!("Classes:       {}", settings.classes.join(", "));
    println!("Current month: {}", service.current_month());
    println!("Monthly cap:   {} souches", MONTHLY_CAP);
    println!("Unit price:    {}", utils::format_amount(UNIT_PRICE));
    Ok(())
}

async fn submit(service: &SoucheService, student: &str, class: &str, units: u32) -> error::Result<()> {
    let demande = service.submit(student, class, units).await?;
    let status = service.quota_status(&demande.student, &demande.class);

    println!(
        "{} Request of {} souche(s) recorded ({} tickets)",
        "✓".green(),
        demande.units,
        quota::tickets(demande.units)
    );
    println!("Id:         {}", demande.id);
    println!("Amount due: {}", utils::format_amount(quota::amount_due(demande.units, UNIT_PRICE)));
    println!("Remaining:  {} souche(s) this month", status.remaining);
    Ok(())
}

fn show_quota(service: &SoucheService, student: &str, class: &str) {
    let status = service.quota_status(student, class);

    println!("{}", format!("=== {} ({}) ===", student.trim(), class.trim().to_uppercase()).cyan().bold());
    println!("Month:     {}", status.month);
    println!("Ordered:   {} / {}", status.consumed, status.cap);
    let remaining = status.remaining.to_string();
    println!(
        "Remaining: {}",
        if status.remaining > 0 { remaining.green() } else { remaining.red() }
    );

    for d in &status.requests {
        println!(
            "  {}  {} souche(s)  {}",
            utils::short_id(&d.id),
            d.units,
            utils::format_timestamp(&d.created_at)
        );
    }
}

async fn pay(service: &SoucheService, id: &str, amount: i64, code: &str) -> error::Result<()> {
    let cap = service.verify(code).await?;
    let receipt = service.record_payment(&cap, id, amount).await?;

    println!("{} Payment recorded for {}", "✓".green(), receipt.demande.student);
    println!("Due:    {}", utils::format_amount(receipt.amount_due));
    println!("Paid:   {}", utils::format_amount(receipt.demande.amount_paid));
    let label = match receipt.change {
        c if c > 0 => "Refund",
        c if c < 0 => "Missing",
        _ => "Settled",
    };
    println!("{}: {}", label, utils::format_change(receipt.change));
    Ok(())
}

async fn reset(service: &SoucheService, code: &str, yes: bool) -> error::Result<()> {
    let cap = service.verify(code).await?;
    let scope = cap.scope().map(|c| format!(" of {}", c)).unwrap_or_default();
    let prompt = format!(
        "Delete every request{} for {}?",
        scope,
        service.current_month()
    );

    if !yes && !utils::confirm_action(&prompt)? {
        println!("Cancelled");
        return Ok(());
    }

    let summary: BatchSummary = service.reset_month(&cap).await;
    summary.print_summary("Reset");
    Ok(())
}

fn list(
    service: &SoucheService,
    month: Option<String>,
    class: Option<String>,
    search: &str,
    all: bool,
    format: OutputFormat,
) -> error::Result<()> {
    let month = parse_month(month)?;
    let class = normalize_class(class);

    let rows: Vec<Demande> = if all {
        let history = service.history(month.as_deref(), class.as_deref(), true);
        quota::filter_requests(&history, search, None)
            .into_iter()
            .cloned()
            .collect()
    } else {
        service.dashboard(month.as_deref(), class.as_deref(), search).rows
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No requests.");
        return Ok(());
    }

    print_requests(&rows);
    Ok(())
}

fn print_requests(rows: &[Demande]) {
    let widths = [4, 10, 28, 6, 8, 8, 14, 16, 9];
    utils::print_table_border(120);
    utils::print_table_row(
        &["#", "Id", "Student", "Class", "Month", "Souches", "Paid", "Change", "Status"],
        &widths,
    );
    utils::print_table_border(120);

    for (i, d) in rows.iter().enumerate() {
        let due = quota::amount_due(d.units, UNIT_PRICE);
        utils::print_table_row(
            &[
                &(i + 1).to_string(),
                &utils::short_id(&d.id),
                &d.student,
                &d.class,
                &d.month,
                &d.units.to_string(),
                &utils::format_amount(d.amount_paid),
                &utils::format_amount(quota::change_owed(d.amount_paid, due)),
                &d.status.to_string(),
            ],
            &widths,
        );
    }
    utils::print_table_border(120);
}

fn print_totals(dashboard: &Dashboard) {
    let widths = [8, 10, 10, 10, 16, 16, 16];
    utils::print_table_row(
        &["Class", "Requests", "Souches", "Tickets", "Due", "Paid", "Change"],
        &widths,
    );
    utils::print_table_border(100);

    let row = |label: &str, t: &Totals| {
        utils::print_table_row(
            &[
                label,
                &t.requests.to_string(),
                &t.units.to_string(),
                &t.tickets().to_string(),
                &utils::format_amount(t.amount_due),
                &utils::format_amount(t.amount_paid),
                &utils::format_amount(t.change_owed()),
            ],
            &widths,
        );
    };

    for (class, totals) in &dashboard.by_class {
        row(class.as_str(), totals);
    }
    utils::print_table_border(100);
    row("TOTAL", &dashboard.overall);
}

async fn stats(service: &SoucheService, month: Option<String>, format: OutputFormat) -> error::Result<()> {
    let month = parse_month(month)?;
    let dashboard = service.dashboard(month.as_deref(), None, "");
    let store_stats = service.stats().await?;

    if format == OutputFormat::Json {
        let value = serde_json::json!({
            "month": dashboard.month,
            "by_class": dashboard.by_class,
            "overall": dashboard.overall,
            "store": store_stats,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", format!("=== SoucheApp Statistics ({}) ===", dashboard.month).cyan().bold());
    println!("\nRequests:");
    println!("  Total:     {}", store_stats.total_demandes);
    println!("  Active:    {}", store_stats.active_demandes.to_string().green());
    println!("  Archived:  {}", store_stats.archived_demandes.to_string().yellow());
    println!("\nRoster:      {} students", store_stats.etudiants);
    println!("Delegates:   {}", store_stats.delegues);
    println!("Admins:      {}\n", store_stats.admins);

    print_totals(&dashboard);
    Ok(())
}

async fn export_requests(
    service: &SoucheService,
    code: &str,
    month: Option<String>,
    class: Option<String>,
    all: bool,
    format: ExportFormat,
    output: Option<String>,
) -> error::Result<()> {
    let cap: Capability = service.verify(code).await?;
    let month = parse_month(month)?;
    let class = normalize_class(class);

    let window = ExportWindow::resolve(month, all, &service.current_month());
    let rows = service.export(
        &cap,
        window.month.as_deref(),
        class.as_deref(),
        window.include_archived,
    )?;
    let refs: Vec<_> = rows.iter().collect();
    let body = match format {
        ExportFormat::Csv => export::to_csv(&refs),
        ExportFormat::Json => export::to_json(&refs)?,
    };

    match output {
        Some(path) => {
            std::fs::write(&path, body)?;
            println!("{} Exported {} request(s) to {}", "✓".green(), rows.len(), path);
        }
        None => print!("{}", body),
    }
    Ok(())
}

async fn roster_list(service: &SoucheService, class: Option<String>) -> error::Result<()> {
    let class = normalize_class(class);
    let etudiants = service.roster(class.as_deref()).await?;

    if etudiants.is_empty() {
        println!("Roster is empty.");
        return Ok(());
    }

    let widths = [32, 8, 18];
    utils::print_table_border(62);
    utils::print_table_row(&["Name", "Class", "Enrolled"], &widths);
    utils::print_table_border(62);
    for e in &etudiants {
        utils::print_table_row(
            &[&e.name, &e.class, &utils::format_timestamp(&e.enrolled_at)],
            &widths,
        );
    }
    utils::print_table_border(62);
    println!("{} student(s)", etudiants.len());
    Ok(())
}

async fn roster_import(service: &SoucheService, file: &str, code: &str, yes: bool) -> error::Result<()> {
    let cap = service.verify(code).await?;
    cap.require_admin()?;
    let text = std::fs::read_to_string(file)?;

    if !yes && !utils::confirm_action("Replace the whole roster with this file?")? {
        println!("Cancelled");
        return Ok(());
    }

    let report = service.import_roster(&cap, &text).await?;
    println!("{} Removed {} previous entries", "✓".green(), report.removed);
    println!("{} Imported {} students", "✓".green(), report.imported);
    if !report.rejected.is_empty() {
        println!("{}", format!("{} line(s) rejected:", report.rejected.len()).yellow());
        for (line, reason) in &report.rejected {
            println!("  line {}: {}", line, reason);
        }
    }
    Ok(())
}

async fn delegate_list(service: &SoucheService) -> error::Result<()> {
    let delegues = service.delegues().await?;
    if delegues.is_empty() {
        println!("No delegates registered.");
        return Ok(());
    }

    for d in delegues {
        if let Role::Delegate { class } = &d.role {
            println!("  {:<8} {}", class, d.name);
        }
    }
    Ok(())
}

fn print_dashboard(dashboard: &Dashboard) {
    println!(
        "\n{}",
        format!("=== Requests for {} ===", dashboard.month).cyan().bold()
    );
    println!(
        "Requests: {}   Souches: {}   Tickets: {}",
        dashboard.overall.requests,
        dashboard.overall.units,
        dashboard.overall.tickets()
    );
    if dashboard.rows.is_empty() {
        println!("No requests for this month.");
    } else {
        print_requests(&dashboard.rows);
    }
    print_totals(dashboard);
}

async fn watch(service: &SoucheService, interval: u64, class: Option<String>) -> error::Result<()> {
    println!("{}", "Watching requests (Ctrl+C to stop)...".green());

    let mut rx = service.store().subscribe();
    let poller = SnapshotPoller::new(service.store().clone(), interval).spawn();

    print_dashboard(&service.dashboard(None, class.as_deref(), ""));

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                info!("Snapshot v{} received", snapshot.version);
                let dashboard = Dashboard::build(
                    &snapshot.demandes,
                    &service.current_month(),
                    class.as_deref(),
                    "",
                );
                print_dashboard(&dashboard);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping watch");
                break;
            }
        }
    }

    poller.abort();
    Ok(())
}
