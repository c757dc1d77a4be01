use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::application::{LoanRequest, LoanService, NewUser};
use crate::config::AppConfig;
use crate::domain::{format_amount, parse_amount, LoanApplication, LoanQuote, LoanStatus};

/// Microloan - loan applications, pricing and review
#[derive(Parser)]
#[command(name = "microloan")]
#[command(about = "Microloan origination: EMI quotes, applications and admin review")]
#[command(version)]
pub struct Cli {
    /// Database file path (overrides MICROLOAN_DATABASE)
    #[arg(short, long)]
    pub database: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Run the HTTP API
    Serve {
        /// Address to listen on (overrides MICROLOAN_BIND)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Show the purpose rate table
    Rates,

    /// Preview the monthly installment for a loan
    Quote {
        /// Principal in whole currency units (e.g., "50000" or "50,000")
        amount: String,

        /// Term in months
        #[arg(short, long)]
        months: u32,

        /// Loan purpose (e.g., "Business", "Home Renovation")
        #[arg(short, long)]
        purpose: Option<String>,

        /// Annual rate in percent, bypassing the rate table
        #[arg(short, long)]
        rate: Option<String>,
    },

    /// Borrower account commands
    #[command(subcommand)]
    User(UserCommands),

    /// Administrator account commands
    #[command(subcommand)]
    Admin(AdminCommands),

    /// Loan application commands
    #[command(subcommand)]
    Loan(LoanCommands),

    /// Show portfolio statistics
    Stats {
        /// Output format: table, json
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Show the admin decision log
    Audit {
        /// Only entries for this loan ID
        #[arg(long)]
        loan: Option<String>,
    },

    /// Export data to CSV or JSON
    Export {
        /// What to export: loans, users, audit, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Format: csv, json (default: csv, json for full)
        #[arg(short, long)]
        format: Option<String>,

        /// Only loans with this status
        #[arg(long)]
        status: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register a borrower
    Register {
        /// Full name
        name: String,

        /// Email address (must be unique)
        #[arg(short, long)]
        email: String,

        /// 10-digit phone number
        #[arg(long)]
        phone: String,

        /// Password (8+ chars with upper, lower, digit and one of !@#$%^&*)
        #[arg(long)]
        password: String,

        /// PAN card number
        #[arg(long)]
        pan: Option<String>,
    },

    /// List registered borrowers
    List,

    /// Show a user and their applications
    Show {
        /// Email address
        email: String,
    },
}

#[derive(Subcommand)]
pub enum AdminCommands {
    /// Create the admin account if it does not exist
    Seed {
        /// Admin email (defaults to ADMIN_EMAIL)
        #[arg(long)]
        email: Option<String>,

        /// Admin password (defaults to ADMIN_PASSWORD)
        #[arg(long)]
        password: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum LoanCommands {
    /// Submit an application on behalf of a borrower
    Apply {
        /// Borrower email
        email: String,

        /// Principal in whole currency units
        amount: String,

        /// Term in months
        #[arg(short, long)]
        months: u32,

        /// Loan purpose
        #[arg(short, long, default_value = "Other")]
        purpose: String,
    },

    /// List applications
    List {
        /// Filter by status: pending, approved, rejected
        #[arg(short, long)]
        status: Option<String>,

        /// Only applications by this borrower
        #[arg(long)]
        email: Option<String>,
    },

    /// Show detailed application information
    Show {
        /// Loan ID
        id: String,
    },

    /// Approve, reject or reopen an application
    Review {
        /// Loan ID
        id: String,

        /// New status: pending, approved, rejected
        status: String,

        /// Reviewing admin email (defaults to ADMIN_EMAIL)
        #[arg(long)]
        admin: Option<String>,
    },
}

impl Cli {
    /// Log level used when RUST_LOG is not set.
    pub fn default_log_level(&self) -> &'static str {
        if self.verbose || matches!(self.command, Commands::Serve { .. }) {
            "info"
        } else {
            "warn"
        }
    }

    pub async fn run(self, mut config: AppConfig) -> Result<()> {
        if let Some(database) = self.database {
            config.database = database;
        }

        match self.command {
            Commands::Init => {
                let service = LoanService::init(&config.database, config.service_settings()?).await?;
                println!("Database initialized: {}", config.database);
                if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
                    let seeded = service.ensure_admin(email, password).await?;
                    if seeded.created {
                        println!("Created admin account: {}", seeded.admin.email);
                    }
                }
            }

            Commands::Serve { bind } => {
                let bind = bind.unwrap_or_else(|| config.bind_addr.clone());
                run_serve_command(&config, &bind).await?;
            }

            Commands::Rates => {
                run_rates_command(&config)?;
            }

            Commands::Quote {
                amount,
                months,
                purpose,
                rate,
            } => {
                run_quote_command(&config, &amount, months, purpose.as_deref(), rate.as_deref())?;
            }

            Commands::User(cmd) => {
                let service = connect(&config).await?;
                run_user_command(&service, cmd).await?;
            }

            Commands::Admin(AdminCommands::Seed { email, password }) => {
                let email = email
                    .or_else(|| config.admin_email.clone())
                    .context("Admin email required: pass --email or set ADMIN_EMAIL")?;
                let password = password
                    .or_else(|| config.admin_password.clone())
                    .context("Admin password required: pass --password or set ADMIN_PASSWORD")?;

                let service = connect(&config).await?;
                let seeded = service.ensure_admin(&email, &password).await?;
                if seeded.created {
                    println!("Created admin account: {}", seeded.admin.email);
                } else {
                    println!("Admin account already exists: {}", seeded.admin.email);
                }
            }

            Commands::Loan(cmd) => {
                let service = connect(&config).await?;
                run_loan_command(&service, &config, cmd).await?;
            }

            Commands::Stats { format } => {
                let service = connect(&config).await?;
                run_stats_command(&service, &format).await?;
            }

            Commands::Audit { loan } => {
                let service = connect(&config).await?;
                let loan_id = loan.as_deref().map(parse_loan_id).transpose()?;
                run_audit_command(&service, loan_id).await?;
            }

            Commands::Export {
                export_type,
                output,
                format,
                status,
            } => {
                let service = connect(&config).await?;
                let status = status.as_deref().map(parse_status).transpose()?;
                run_export_command(
                    &service,
                    &export_type,
                    output.as_deref(),
                    format.as_deref(),
                    status,
                )
                .await?;
            }
        }

        Ok(())
    }
}

async fn connect(config: &AppConfig) -> Result<LoanService> {
    let service = LoanService::connect(&config.database, config.service_settings()?)
        .await
        .with_context(|| {
            format!(
                "Failed to open database '{}'. Run 'microloan init' first",
                config.database
            )
        })?;
    Ok(service)
}

async fn run_serve_command(config: &AppConfig, bind: &str) -> Result<()> {
    if config.uses_default_secret() {
        tracing::warn!("MICROLOAN_TOKEN_SECRET is not set; using the development secret");
    }

    let service = LoanService::init(&config.database, config.service_settings()?).await?;
    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        let seeded = service.ensure_admin(email, password).await?;
        if seeded.created {
            tracing::info!(email = %seeded.admin.email, "seeded admin account");
        }
    }

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    crate::api::serve(listener, service).await
}

fn run_rates_command(config: &AppConfig) -> Result<()> {
    let table = config.rate_table()?;
    let limits = config.limits;

    println!("{:<22} {:>10}", "PURPOSE", "RATE (p.a.)");
    println!("{}", "-".repeat(34));
    for (purpose, rate) in table.effective_rates() {
        println!("{:<22} {:>10}%", purpose.label(), rate);
    }
    println!();
    println!("Unlisted purposes: {}%", table.default_rate_percent);
    println!(
        "Amount: {} - {}   Term: {} - {} months",
        format_amount(limits.min_amount),
        format_amount(limits.max_amount),
        limits.min_term_months,
        limits.max_term_months
    );
    Ok(())
}

fn run_quote_command(
    config: &AppConfig,
    amount: &str,
    months: u32,
    purpose: Option<&str>,
    rate: Option<&str>,
) -> Result<()> {
    let principal =
        parse_amount(amount).map_err(|e| anyhow::anyhow!("Invalid amount '{}': {}", amount, e))?;

    let annual_rate = match rate {
        Some(raw) => raw
            .trim()
            .trim_end_matches('%')
            .parse::<Decimal>()
            .with_context(|| format!("Invalid rate '{}'", raw))?,
        None => config.rate_table()?.resolve_rate(purpose.unwrap_or_default()),
    };

    let quote = LoanQuote::compute(principal, annual_rate, months)?;
    print_quote(&quote);
    Ok(())
}

fn print_quote(quote: &LoanQuote) {
    println!("  Principal:      {}", format_amount(quote.principal));
    println!("  Rate:           {}% p.a.", quote.annual_rate_percent);
    println!("  Term:           {} months", quote.term_months);
    println!("  Monthly EMI:    {}", format_amount(quote.monthly_payment));
    println!("  Total payment:  {}", format_amount(quote.total_payment));
    println!("  Total interest: {}", format_amount(quote.total_interest));
}

async fn run_user_command(service: &LoanService, cmd: UserCommands) -> Result<()> {
    match cmd {
        UserCommands::Register {
            name,
            email,
            phone,
            password,
            pan,
        } => {
            let session = service
                .register_user(NewUser {
                    name,
                    email,
                    password,
                    phone,
                    pan,
                })
                .await?;
            println!(
                "Registered user: {} <{}> ({})",
                session.user.name, session.user.email, session.user.id
            );
        }

        UserCommands::List => {
            let users = service.list_users().await?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!("{:<24} {:<30} {:<12} {:<12}", "NAME", "EMAIL", "PHONE", "JOINED");
                println!("{}", "-".repeat(80));
                for user in users {
                    println!(
                        "{:<24} {:<30} {:<12} {:<12}",
                        truncate(&user.name, 24),
                        truncate(&user.email, 30),
                        user.phone,
                        user.created_at.format("%Y-%m-%d")
                    );
                }
            }
        }

        UserCommands::Show { email } => {
            let user = service.get_user_by_email(&email).await?;
            let loans = service.list_my_loans(user.id).await?;

            println!("User: {}", user.name);
            println!("  ID:       {}", user.id);
            println!("  Email:    {}", user.email);
            println!("  Phone:    {}", user.phone);
            if let Some(pan) = &user.pan {
                println!("  PAN:      {}", pan);
            }
            println!("  Role:     {}", user.role.as_str());
            println!("  Joined:   {}", user.created_at.format("%Y-%m-%d %H:%M:%S"));
            println!();
            if loans.is_empty() {
                println!("  No applications.");
            } else {
                print_loan_table(&loans);
            }
        }
    }
    Ok(())
}

async fn run_loan_command(service: &LoanService, config: &AppConfig, cmd: LoanCommands) -> Result<()> {
    match cmd {
        LoanCommands::Apply {
            email,
            amount,
            months,
            purpose,
        } => {
            let user = service.get_user_by_email(&email).await?;
            let amount = parse_amount(&amount)
                .map_err(|e| anyhow::anyhow!("Invalid amount '{}': {}", amount, e))?;

            let loan = service
                .apply_for_loan(
                    user.id,
                    LoanRequest {
                        amount,
                        term_months: months,
                        purpose,
                    },
                )
                .await?;

            println!("Submitted application {} for {}", loan.id, loan.applicant_email);
            print_quote(&loan.quote);
        }

        LoanCommands::List { status, email } => {
            let loans = match email {
                Some(email) => {
                    let user = service.get_user_by_email(&email).await?;
                    let loans = service.list_my_loans(user.id).await?;
                    match status.as_deref().map(parse_status).transpose()? {
                        Some(status) => loans.into_iter().filter(|l| l.status == status).collect(),
                        None => loans,
                    }
                }
                None => {
                    let status = status.as_deref().map(parse_status).transpose()?;
                    service.list_all_loans(status).await?
                }
            };

            if loans.is_empty() {
                println!("No applications found.");
            } else {
                print_loan_table(&loans);
            }
        }

        LoanCommands::Show { id } => {
            let loan = service.get_loan(parse_loan_id(&id)?).await?;

            println!("Application: {}", loan.id);
            println!("  Applicant:      {} <{}>", loan.applicant_name, loan.applicant_email);
            println!("  Purpose:        {}", loan.purpose.label());
            println!("  Status:         {}", loan.status);
            print_quote(&loan.quote);
            println!("  Submitted:      {}", loan.created_at.format("%Y-%m-%d %H:%M:%S"));
            println!("  Updated:        {}", loan.updated_at.format("%Y-%m-%d %H:%M:%S"));

            let entries = service.list_audit_log(Some(loan.id)).await?;
            if !entries.is_empty() {
                println!();
                println!("  History:");
                for entry in &entries {
                    println!(
                        "    {}  {:<14} {}",
                        entry.timestamp.format("%Y-%m-%d %H:%M"),
                        entry.action.as_str(),
                        entry.details.as_deref().unwrap_or("")
                    );
                }
            }
        }

        LoanCommands::Review { id, status, admin } => {
            let admin_email = admin
                .or_else(|| config.admin_email.clone())
                .context("Reviewer required: pass --admin or set ADMIN_EMAIL")?;
            let admin = service.get_user_by_email(&admin_email).await?;

            let loan = service
                .update_loan_status(&admin, parse_loan_id(&id)?, &status)
                .await?;
            println!(
                "Application {} is now {} ({} for {})",
                loan.id,
                loan.status,
                format_amount(loan.amount()),
                loan.applicant_email
            );
        }
    }
    Ok(())
}

fn print_loan_table(loans: &[LoanApplication]) {
    println!(
        "{:<36} {:<12} {:>10} {:>6} {:>9} {:<10} {:<18}",
        "ID", "DATE", "AMOUNT", "TERM", "EMI", "STATUS", "PURPOSE"
    );
    println!("{}", "-".repeat(106));
    for loan in loans {
        println!(
            "{:<36} {:<12} {:>10} {:>6} {:>9} {:<10} {:<18}",
            loan.id.to_string(),
            loan.created_at.format("%Y-%m-%d"),
            format_amount(loan.quote.principal),
            loan.quote.term_months,
            format_amount(loan.quote.monthly_payment),
            loan.status.as_str(),
            truncate(loan.purpose.label(), 18)
        );
    }
}

async fn run_stats_command(service: &LoanService, format: &str) -> Result<()> {
    let stats = service.admin_stats().await?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        "table" => {
            println!("Applications:   {}", stats.total_applications);
            println!("  Pending:      {}", stats.pending_loans);
            println!("  Approved:     {}", stats.approved_loans);
            println!("  Rejected:     {}", stats.rejected_loans);
            println!("Approval rate:  {:.2}%", stats.approval_rate);
            println!("Total amount:   {}", format_amount(stats.total_amount));
            println!("Borrowers:      {}", stats.total_users);

            if !stats.by_purpose.is_empty() {
                println!();
                println!("{:<22} {:>6} {:>14} {:>8}", "PURPOSE", "COUNT", "AMOUNT", "SHARE");
                println!("{}", "-".repeat(53));
                for row in &stats.by_purpose {
                    println!(
                        "{:<22} {:>6} {:>14} {:>7.2}%",
                        row.purpose.label(),
                        row.count,
                        format_amount(row.total_amount),
                        row.percentage
                    );
                }
            }
        }
        other => anyhow::bail!("Invalid format '{}'. Valid formats: table, json", other),
    }
    Ok(())
}

async fn run_audit_command(service: &LoanService, loan_id: Option<Uuid>) -> Result<()> {
    let entries = service.list_audit_log(loan_id).await?;
    if entries.is_empty() {
        println!("No audit entries found.");
        return Ok(());
    }

    println!(
        "{:<17} {:<14} {:<36} {:<36} DETAILS",
        "TIME", "ACTION", "LOAN", "ADMIN"
    );
    println!("{}", "-".repeat(120));
    for entry in entries {
        println!(
            "{:<17} {:<14} {:<36} {:<36} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M"),
            entry.action.as_str(),
            entry.loan_id.to_string(),
            entry.admin_id.to_string(),
            entry.details.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn run_export_command(
    service: &LoanService,
    export_type: &str,
    output: Option<&str>,
    format: Option<&str>,
    status: Option<LoanStatus>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{stdout, Write};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    let format = format.unwrap_or(if export_type == "full" { "json" } else { "csv" });

    let count = match (export_type, format) {
        ("loans", "csv") => exporter.export_loans_csv(writer, status).await?,
        ("loans", "json") => exporter.export_loans_json(writer, status).await?,
        ("users", "csv") => exporter.export_users_csv(writer).await?,
        ("users", "json") => exporter.export_users_json(writer).await?,
        ("audit", "csv") => exporter.export_audit_csv(writer).await?,
        ("full", "json") => {
            let snapshot = exporter.export_snapshot_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported {} users, {} loans, {} audit entries",
                    snapshot.users.len(),
                    snapshot.loans.len(),
                    snapshot.audit_log.len()
                );
            }
            return Ok(());
        }
        ("loans" | "users" | "audit" | "full", other) => {
            anyhow::bail!("Format '{}' is not supported for {} export", other, export_type)
        }
        _ => anyhow::bail!(
            "Invalid export type '{}'. Valid types: loans, users, audit, full",
            export_type
        ),
    };

    if output.is_some() {
        eprintln!("Exported {} {}", count, export_type);
    }
    Ok(())
}

fn parse_loan_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).with_context(|| format!("Invalid loan ID '{}'", raw))
}

fn parse_status(raw: &str) -> Result<LoanStatus> {
    LoanStatus::from_str(raw).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid status '{}'. Valid statuses: pending, approved, rejected",
            raw
        )
    })
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
