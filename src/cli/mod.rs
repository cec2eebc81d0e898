use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{stdin, Read};
use std::path::PathBuf;

use crate::application::{
    AppError, EntryInfo, GenerateOptions, JournalService, OpdJournalGenerator,
    DEFAULT_COMMIT_EVERY,
};
use crate::config::{GeneratorSettings, Settings};
use crate::domain::{format_cents, parse_cents, AccountType, Ticket, TicketLine, TicketState};
use crate::io::{ImportOptions, TicketImporter};

const DEFAULT_DATABASE: &str = "opdpost.db";

/// opdpost - post OPD tickets as journal entries
#[derive(Parser)]
#[command(name = "opdpost")]
#[command(about = "Batch-convert OPD ticket references into posted double-entry journal entries")]
#[command(version)]
pub struct Cli {
    /// Database file path (default: from config, else opdpost.db)
    #[arg(short, long)]
    pub database: Option<String>,

    /// Config file (default: ./opdpost.toml if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

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

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Journal management commands
    #[command(subcommand)]
    Journal(JournalCommands),

    /// Fiscal period management commands
    #[command(subcommand)]
    Period(PeriodCommands),

    /// Ticket commands
    #[command(subcommand)]
    Ticket(TicketCommands),

    /// Generate and post journal entries for a list of OPD references
    Generate {
        /// File containing the pasted OPD list (stdin if neither this nor --refs is given)
        #[arg(short, long, conflicts_with = "refs")]
        input: Option<String>,

        /// OPD list given inline, e.g. "OPD-0412768, OPD-0412869"
        #[arg(long)]
        refs: Option<String>,

        /// Cash/bank account code to debit
        #[arg(long)]
        cash_account: Option<String>,

        /// Journal code to post in
        #[arg(long)]
        journal: Option<String>,

        /// Only post confirmed tickets, overriding the config file
        #[arg(long, conflicts_with = "include_unconfirmed")]
        only_confirmed: bool,

        /// Also post tickets that are not confirmed
        #[arg(long)]
        include_unconfirmed: bool,

        /// Treat draft journal entries as existing
        #[arg(long)]
        include_draft: bool,

        /// Commit after this many created entries (0 = only at the end)
        #[arg(long)]
        commit_every: Option<usize>,

        /// Run everything, then roll back
        #[arg(long)]
        dry_run: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Journal entry commands
    #[command(subcommand)]
    Entry(EntryCommands),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Create a new account
    Create {
        /// Account code (must be unique)
        code: String,

        /// Account name
        name: String,

        /// Account type: asset, liability, income, expense, equity
        #[arg(short = 't', long = "type")]
        account_type: String,
    },

    /// List all accounts
    List,
}

#[derive(Subcommand)]
pub enum JournalCommands {
    /// Create a new journal
    Create {
        /// Journal code, used as the entry name prefix (e.g. SAJ)
        code: String,

        /// Journal name
        name: String,
    },

    /// List all journals
    List,
}

#[derive(Subcommand)]
pub enum PeriodCommands {
    /// Create a fiscal period
    Create {
        /// Period code (must be unique), e.g. 03/2024
        code: String,

        /// First day (YYYY-MM-DD)
        #[arg(long)]
        start: String,

        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        stop: String,

        /// Display name (defaults to the code)
        #[arg(long)]
        name: Option<String>,

        /// Opening/closing period
        #[arg(long)]
        special: bool,
    },

    /// Create the opening period and twelve monthly periods of a year
    GenerateYear {
        year: i32,
    },

    /// List fiscal periods
    List,

    /// Close a fiscal period
    Close {
        /// Period code
        code: String,
    },
}

#[derive(Subcommand)]
pub enum TicketCommands {
    /// Import tickets from CSV (ticket,date,state,total,item,income_account,amount)
    Import {
        /// Input file (stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,

        /// Validate without importing
        #[arg(long)]
        dry_run: bool,
    },

    /// Add a single ticket with one line
    Add {
        /// Ticket reference, e.g. OPD-0412768
        name: String,

        /// Ticket date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,

        /// State: draft, confirmed, cancelled
        #[arg(long, default_value = "confirmed")]
        state: String,

        /// Item name of the line
        #[arg(long)]
        item: String,

        /// Income account code of the line
        #[arg(long)]
        income_account: Option<String>,

        /// Line amount, also used as the ticket total
        #[arg(short, long)]
        amount: String,
    },

    /// List tickets
    List,

    /// Show a ticket and its lines
    Show {
        /// Ticket reference
        name: String,
    },
}

#[derive(Subcommand)]
pub enum EntryCommands {
    /// List journal entries
    List {
        /// Only entries for this source reference
        #[arg(long)]
        reference: Option<String>,
    },

    /// Show a journal entry by name or source reference
    Show {
        name: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let settings = Settings::load(self.config.as_deref())?;
        let database = self
            .database
            .clone()
            .or_else(|| settings.database.clone())
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        match self.command {
            Commands::Init => {
                JournalService::init(&database).await?;
                println!("Database initialized: {}", database);
            }

            Commands::Account(cmd) => {
                let service = JournalService::connect(&database).await?;
                run_account_command(&service, cmd).await?;
            }

            Commands::Journal(cmd) => {
                let service = JournalService::connect(&database).await?;
                run_journal_command(&service, cmd).await?;
            }

            Commands::Period(cmd) => {
                let service = JournalService::connect(&database).await?;
                run_period_command(&service, cmd).await?;
            }

            Commands::Ticket(cmd) => {
                let service = JournalService::connect(&database).await?;
                run_ticket_command(&service, cmd).await?;
            }

            Commands::Generate {
                input,
                refs,
                cash_account,
                journal,
                only_confirmed,
                include_unconfirmed,
                include_draft,
                commit_every,
                dry_run,
                format,
            } => {
                let options = resolve_generate_options(
                    &settings.generator,
                    GenerateFlags {
                        cash_account,
                        journal,
                        only_confirmed,
                        include_unconfirmed,
                        include_draft,
                        commit_every,
                        dry_run,
                    },
                )?;

                let service = JournalService::connect(&database).await?;
                let text = match refs {
                    Some(refs) => refs,
                    None => read_input(input.as_deref())?,
                };

                let report = OpdJournalGenerator::new(&service)
                    .generate(&text, &options)
                    .await?;

                match format {
                    OutputFormat::Text => {
                        if report.dry_run {
                            println!("Dry run: nothing was saved.");
                        }
                        println!("{}", report.summary());
                    }
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                }
            }

            Commands::Entry(cmd) => {
                let service = JournalService::connect(&database).await?;
                run_entry_command(&service, cmd).await?;
            }
        }

        Ok(())
    }
}

/// `generate` flags that can fall back to the config file.
pub struct GenerateFlags {
    pub cash_account: Option<String>,
    pub journal: Option<String>,
    pub only_confirmed: bool,
    pub include_unconfirmed: bool,
    pub include_draft: bool,
    pub commit_every: Option<usize>,
    pub dry_run: bool,
}

/// Merge command-line flags over config settings over built-in defaults.
pub fn resolve_generate_options(
    settings: &GeneratorSettings,
    flags: GenerateFlags,
) -> Result<GenerateOptions> {
    let cash_account = flags
        .cash_account
        .or_else(|| settings.cash_account.clone())
        .context("No cash account given. Use --cash-account or set generator.cash_account")?;
    let journal = flags
        .journal
        .or_else(|| settings.journal.clone())
        .context("No journal given. Use --journal or set generator.journal")?;

    let mut options = GenerateOptions::new(cash_account, journal);
    options.only_confirmed = if flags.only_confirmed {
        true
    } else if flags.include_unconfirmed {
        false
    } else {
        settings.only_confirmed.unwrap_or(true)
    };
    options.include_draft = flags.include_draft || settings.include_draft.unwrap_or(false);
    options.commit_every = flags
        .commit_every
        .or(settings.commit_every)
        .unwrap_or(DEFAULT_COMMIT_EVERY);
    options.dry_run = flags.dry_run;
    Ok(options)
}

fn read_input(path: Option<&str>) -> Result<String> {
    let mut text = String::new();
    match path {
        Some(path) => {
            File::open(path)
                .with_context(|| format!("Failed to open input file: {}", path))?
                .read_to_string(&mut text)
                .with_context(|| format!("Failed to read input file: {}", path))?;
        }
        None => {
            stdin()
                .read_to_string(&mut text)
                .context("Failed to read from stdin")?;
        }
    }
    Ok(text)
}

async fn run_account_command(service: &JournalService, cmd: AccountCommands) -> Result<()> {
    match cmd {
        AccountCommands::Create {
            code,
            name,
            account_type,
        } => {
            let at = AccountType::from_str(&account_type).ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid account type '{}'. Valid types: asset, liability, income, expense, equity",
                    account_type
                )
            })?;

            let account = service.create_account(code, name, at).await?;
            println!(
                "Created account: {} {} ({})",
                account.code, account.name, account.account_type
            );
        }

        AccountCommands::List => {
            let accounts = service.list_accounts().await?;
            if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!("{:<12} {:<30} {:<10}", "CODE", "NAME", "TYPE");
                println!("{}", "-".repeat(54));
                for account in accounts {
                    println!(
                        "{:<12} {:<30} {:<10}",
                        account.code,
                        truncate(&account.name, 30),
                        account.account_type
                    );
                }
            }
        }
    }

    Ok(())
}

async fn run_journal_command(service: &JournalService, cmd: JournalCommands) -> Result<()> {
    match cmd {
        JournalCommands::Create { code, name } => {
            let journal = service.create_journal(code, name).await?;
            println!("Created journal: {} {}", journal.code, journal.name);
        }

        JournalCommands::List => {
            let journals = service.list_journals().await?;
            if journals.is_empty() {
                println!("No journals found.");
            } else {
                println!("{:<10} {:<30}", "CODE", "NAME");
                println!("{}", "-".repeat(41));
                for journal in journals {
                    println!("{:<10} {:<30}", journal.code, truncate(&journal.name, 30));
                }
            }
        }
    }

    Ok(())
}

async fn run_period_command(service: &JournalService, cmd: PeriodCommands) -> Result<()> {
    match cmd {
        PeriodCommands::Create {
            code,
            start,
            stop,
            name,
            special,
        } => {
            let start = parse_date(&start)?;
            let stop = parse_date(&stop)?;
            let period = service
                .create_period(code, name, start, stop, special)
                .await?;
            println!(
                "Created period: {} ({} .. {}){}",
                period.code,
                period.date_start,
                period.date_stop,
                if period.special { " [special]" } else { "" }
            );
        }

        PeriodCommands::GenerateYear { year } => {
            let periods = service.generate_year_periods(year).await?;
            println!("Created {} periods for {}", periods.len(), year);
        }

        PeriodCommands::List => {
            let periods = service.list_periods().await?;
            if periods.is_empty() {
                println!("No fiscal periods found.");
            } else {
                println!(
                    "{:<10} {:<20} {:<12} {:<12} {:<8} {:<7}",
                    "CODE", "NAME", "START", "STOP", "STATE", "SPECIAL"
                );
                println!("{}", "-".repeat(74));
                for p in periods {
                    println!(
                        "{:<10} {:<20} {:<12} {:<12} {:<8} {:<7}",
                        p.code,
                        truncate(&p.name, 20),
                        p.date_start,
                        p.date_stop,
                        p.state,
                        if p.special { "yes" } else { "" }
                    );
                }
            }
        }

        PeriodCommands::Close { code } => {
            let period = service.close_period(&code).await?;
            println!("Closed period: {}", period.code);
        }
    }

    Ok(())
}

async fn run_ticket_command(service: &JournalService, cmd: TicketCommands) -> Result<()> {
    match cmd {
        TicketCommands::Import { input, dry_run } => {
            let reader: Box<dyn Read> = match input.as_deref() {
                Some(path) => Box::new(
                    File::open(path)
                        .with_context(|| format!("Failed to open input file: {}", path))?,
                ),
                None => Box::new(stdin()),
            };

            let result = TicketImporter::new(service)
                .import_tickets_csv(reader, ImportOptions { dry_run })
                .await?;

            if dry_run {
                println!("Validation complete");
            } else {
                println!("Import complete");
            }
            println!("  Imported: {}", result.imported);
            println!("  Skipped:  {}", result.skipped);
            println!("  Errors:   {}", result.errors.len());

            if !result.errors.is_empty() {
                println!("\nErrors:");
                for error in result.errors.iter().take(10) {
                    println!(
                        "  Line {}: {}{}",
                        error.line,
                        error
                            .field
                            .as_ref()
                            .map(|f| format!("{}: ", f))
                            .unwrap_or_default(),
                        error.error
                    );
                }
                if result.errors.len() > 10 {
                    println!("  ... and {} more errors", result.errors.len() - 10);
                }
            }
        }

        TicketCommands::Add {
            name,
            date,
            state,
            item,
            income_account,
            amount,
        } => {
            let amount_cents =
                parse_cents(&amount).context("Invalid amount format. Use '50.00' or '50'")?;
            let date = date.as_deref().map(parse_date).transpose()?;
            let state = TicketState::from_str(&state).ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid state '{}'. Valid states: draft, confirmed, cancelled",
                    state
                )
            })?;
            let income_account = match income_account {
                Some(code) => Some(service.get_account(&code).await?.id),
                None => None,
            };

            let ticket = Ticket::new(name.to_uppercase(), date, amount_cents)
                .with_state(state)
                .with_line(TicketLine::new(Some(item), income_account, amount_cents));
            let ticket = service.create_ticket(ticket).await?;
            println!(
                "Created ticket: {} {}",
                ticket.name,
                format_cents(ticket.total_cents)
            );
        }

        TicketCommands::List => {
            let tickets = service.list_tickets().await?;
            if tickets.is_empty() {
                println!("No tickets found.");
            } else {
                println!(
                    "{:<16} {:<12} {:<10} {:>12} {:>6}",
                    "TICKET", "DATE", "STATE", "TOTAL", "LINES"
                );
                println!("{}", "-".repeat(60));
                for t in tickets {
                    println!(
                        "{:<16} {:<12} {:<10} {:>12} {:>6}",
                        t.name,
                        t.date.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
                        t.state,
                        format_cents(t.total_cents),
                        t.lines.len()
                    );
                }
            }
        }

        TicketCommands::Show { name } => {
            let ticket = service.get_ticket(&name.to_uppercase()).await?;
            let accounts = service.account_codes().await?;

            println!("Ticket: {}", ticket.name);
            println!(
                "  Date:   {}",
                ticket.date.map(|d| d.to_string()).unwrap_or_else(|| "-".into())
            );
            println!("  State:  {}", ticket.state);
            println!("  Total:  {}", format_cents(ticket.total_cents));
            println!();
            println!("  {:<30} {:<12} {:>12}", "ITEM", "ACCOUNT", "AMOUNT");
            for line in &ticket.lines {
                println!(
                    "  {:<30} {:<12} {:>12}",
                    truncate(line.item_name.as_deref().unwrap_or("-"), 30),
                    line.income_account
                        .and_then(|id| accounts.get(&id).cloned())
                        .unwrap_or_else(|| "-".into()),
                    format_cents(line.amount_cents)
                );
            }
        }
    }

    Ok(())
}

async fn run_entry_command(service: &JournalService, cmd: EntryCommands) -> Result<()> {
    match cmd {
        EntryCommands::List { reference } => {
            let entries = service
                .list_entries(reference.map(|r| r.to_uppercase()).as_deref())
                .await?;
            if entries.is_empty() {
                println!("No journal entries found.");
            } else {
                println!(
                    "{:<18} {:<12} {:<16} {:<8} {:>12}",
                    "NAME", "DATE", "REFERENCE", "STATE", "AMOUNT"
                );
                println!("{}", "-".repeat(70));
                for e in entries {
                    println!(
                        "{:<18} {:<12} {:<16} {:<8} {:>12}",
                        e.name,
                        e.date,
                        truncate(&e.reference, 16),
                        e.state,
                        format_cents(e.total_debit())
                    );
                }
            }
        }

        EntryCommands::Show { name } => {
            let info = find_entry(service, &name).await?;
            let entry = &info.entry;

            println!("Entry: {}", entry.name);
            println!("  Journal:   {}", info.journal_code);
            println!("  Period:    {}", info.period_code);
            println!("  Date:      {}", entry.date);
            println!("  Reference: {}", entry.reference);
            println!("  State:     {}", entry.state);
            if let Some(posted) = entry.posted_at {
                println!("  Posted at: {}", posted.format("%Y-%m-%d %H:%M:%S"));
            }
            println!();
            println!(
                "  {:<30} {:<12} {:>12} {:>12}",
                "LABEL", "ACCOUNT", "DEBIT", "CREDIT"
            );
            for line in &entry.lines {
                println!(
                    "  {:<30} {:<12} {:>12} {:>12}",
                    truncate(&line.label, 30),
                    info.account_codes
                        .get(&line.account_id)
                        .map(String::as_str)
                        .unwrap_or("?"),
                    format_cents(line.debit_cents),
                    format_cents(line.credit_cents)
                );
            }
            println!(
                "  {:<30} {:<12} {:>12} {:>12}",
                "",
                "",
                format_cents(entry.total_debit()),
                format_cents(entry.total_credit())
            );
        }
    }

    Ok(())
}

/// Look up an entry as typed, then as an upper-cased reference.
async fn find_entry(service: &JournalService, name: &str) -> Result<EntryInfo, AppError> {
    match service.get_entry_info(name).await {
        Err(AppError::EntryNotFound(_)) => service.get_entry_info(&name.to_uppercase()).await,
        other => other,
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

fn parse_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}'. Use YYYY-MM-DD", date_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags() -> GenerateFlags {
        GenerateFlags {
            cash_account: None,
            journal: None,
            only_confirmed: false,
            include_unconfirmed: false,
            include_draft: false,
            commit_every: None,
            dry_run: false,
        }
    }

    #[test]
    fn test_options_from_flags() {
        let mut f = flags();
        f.cash_account = Some("101100".into());
        f.journal = Some("SAJ".into());
        f.include_unconfirmed = true;
        f.commit_every = Some(10);

        let options = resolve_generate_options(&GeneratorSettings::default(), f).unwrap();
        assert_eq!(options.cash_account, "101100");
        assert_eq!(options.journal, "SAJ");
        assert!(!options.only_confirmed);
        assert!(!options.include_draft);
        assert_eq!(options.commit_every, 10);
    }

    #[test]
    fn test_options_fall_back_to_settings() {
        let settings = GeneratorSettings {
            cash_account: Some("101200".into()),
            journal: Some("BNK".into()),
            only_confirmed: Some(false),
            include_draft: Some(true),
            commit_every: Some(0),
        };
        let mut f = flags();
        f.journal = Some("SAJ".into());

        let options = resolve_generate_options(&settings, f).unwrap();
        assert_eq!(options.cash_account, "101200");
        assert_eq!(options.journal, "SAJ");
        assert!(!options.only_confirmed);
        assert!(options.include_draft);
        assert_eq!(options.commit_every, 0);
    }

    #[test]
    fn test_only_confirmed_flag_overrides_settings() {
        let settings = GeneratorSettings {
            cash_account: Some("101100".into()),
            journal: Some("SAJ".into()),
            only_confirmed: Some(false),
            ..Default::default()
        };

        let options = resolve_generate_options(&settings, flags()).unwrap();
        assert!(!options.only_confirmed);

        let mut f = flags();
        f.only_confirmed = true;
        let options = resolve_generate_options(&settings, f).unwrap();
        assert!(options.only_confirmed);
    }

    #[test]
    fn test_only_confirmed_conflicts_with_include_unconfirmed() {
        let parsed = Cli::try_parse_from([
            "opdpost",
            "generate",
            "--only-confirmed",
            "--include-unconfirmed",
        ]);
        assert!(parsed.is_err());
    }

    #[tokio::test]
    async fn test_find_entry_by_lowercase_reference() -> Result<()> {
        let temp = tempfile::TempDir::new()?;
        let db = temp.path().join("entries.db");
        let service = JournalService::init(db.to_str().unwrap()).await?;
        service
            .create_account("101100".into(), "Cash".into(), AccountType::Asset)
            .await?;
        let fees = service
            .create_account("400100".into(), "Fees".into(), AccountType::Income)
            .await?;
        service.create_journal("SAJ".into(), "Sales".into()).await?;
        service.generate_year_periods(2024).await?;
        service
            .create_ticket(
                Ticket::new("OPD-5", NaiveDate::from_ymd_opt(2024, 3, 1), 100)
                    .with_state(TicketState::Confirmed)
                    .with_line(TicketLine::new(Some("Fee".into()), Some(fees.id), 100)),
            )
            .await?;
        OpdJournalGenerator::new(&service)
            .generate("OPD-5", &GenerateOptions::new("101100", "SAJ"))
            .await?;

        assert_eq!(find_entry(&service, "opd-5").await?.entry.name, "SAJ/2024/0001");
        assert!(matches!(
            find_entry(&service, "opd-6").await,
            Err(AppError::EntryNotFound(_))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_find_entry_surfaces_database_errors() -> Result<()> {
        let temp = tempfile::TempDir::new()?;
        let db = temp.path().join("empty.db");
        File::create(&db)?;
        let service = JournalService::connect(db.to_str().unwrap()).await?;

        assert!(matches!(
            find_entry(&service, "opd-5").await,
            Err(AppError::Database(_))
        ));

        Ok(())
    }

    #[test]
    fn test_options_defaults() {
        let mut f = flags();
        f.cash_account = Some("101100".into());
        f.journal = Some("SAJ".into());
        let options = resolve_generate_options(&GeneratorSettings::default(), f).unwrap();
        assert!(options.only_confirmed);
        assert!(!options.include_draft);
        assert_eq!(options.commit_every, DEFAULT_COMMIT_EVERY);
    }

    #[test]
    fn test_options_require_accounts() {
        assert!(resolve_generate_options(&GeneratorSettings::default(), flags()).is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long item name", 10), "a very ...");
    }

    #[test]
    fn test_cli_parses_generate() {
        let cli = Cli::try_parse_from([
            "opdpost",
            "-d",
            "books.db",
            "generate",
            "--refs",
            "OPD-1",
            "--cash-account",
            "101100",
            "--journal",
            "SAJ",
            "--dry-run",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.database.as_deref(), Some("books.db"));
        match cli.command {
            Commands::Generate {
                refs,
                dry_run,
                format,
                ..
            } => {
                assert_eq!(refs.as_deref(), Some("OPD-1"));
                assert!(dry_run);
                assert_eq!(format, OutputFormat::Json);
            }
            _ => panic!("expected generate command"),
        }
    }
}
