use anyhow::Context;
use chrono::{Datelike, NaiveDate, Utc};
use sqlx::SqliteConnection;
use std::collections::HashMap;

use crate::domain::{
    calendar_year_periods, find_period, Account, AccountId, AccountType, FiscalPeriod, Journal,
    JournalEntry, JournalId, PeriodId, PeriodState, Ticket,
};
use crate::storage::Repository;

use super::AppError;

/// Application service providing the ledger's use-cases.
/// This is the primary interface for any client (CLI, batch generator, importer).
pub struct JournalService {
    repo: Repository,
}

/// A journal entry together with the codes needed to display it.
pub struct EntryInfo {
    pub entry: JournalEntry,
    pub journal_code: String,
    pub period_code: String,
    pub account_codes: HashMap<AccountId, String>,
}

impl JournalService {
    /// Create a new service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    pub(crate) fn repository(&self) -> &Repository {
        &self.repo
    }

    // ========================
    // Accounts
    // ========================

    pub async fn create_account(
        &self,
        code: String,
        name: String,
        account_type: AccountType,
    ) -> Result<Account, AppError> {
        let mut conn = self.repo.acquire().await?;
        if self.repo.get_account_by_code(&mut conn, &code).await?.is_some() {
            return Err(AppError::AccountAlreadyExists(code));
        }

        let account = Account::new(code, name, account_type);
        self.repo.save_account(&mut conn, &account).await?;
        Ok(account)
    }

    pub async fn get_account(&self, code: &str) -> Result<Account, AppError> {
        let mut conn = self.repo.acquire().await?;
        self.repo
            .get_account_by_code(&mut conn, code)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(code.to_string()))
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        let mut conn = self.repo.acquire().await?;
        Ok(self.repo.list_accounts(&mut conn).await?)
    }

    /// Map of account IDs to codes (for display).
    pub async fn account_codes(&self) -> Result<HashMap<AccountId, String>, AppError> {
        Ok(self
            .list_accounts()
            .await?
            .into_iter()
            .map(|a| (a.id, a.code))
            .collect())
    }

    // ========================
    // Journals
    // ========================

    pub async fn create_journal(&self, code: String, name: String) -> Result<Journal, AppError> {
        let mut conn = self.repo.acquire().await?;
        if self.repo.get_journal_by_code(&mut conn, &code).await?.is_some() {
            return Err(AppError::JournalAlreadyExists(code));
        }

        let journal = Journal::new(code, name);
        self.repo.save_journal(&mut conn, &journal).await?;
        Ok(journal)
    }

    pub async fn get_journal(&self, code: &str) -> Result<Journal, AppError> {
        let mut conn = self.repo.acquire().await?;
        self.repo
            .get_journal_by_code(&mut conn, code)
            .await?
            .ok_or_else(|| AppError::JournalNotFound(code.to_string()))
    }

    pub async fn list_journals(&self) -> Result<Vec<Journal>, AppError> {
        let mut conn = self.repo.acquire().await?;
        Ok(self.repo.list_journals(&mut conn).await?)
    }

    // ========================
    // Fiscal periods
    // ========================

    pub async fn create_period(
        &self,
        code: String,
        name: Option<String>,
        date_start: NaiveDate,
        date_stop: NaiveDate,
        special: bool,
    ) -> Result<FiscalPeriod, AppError> {
        if date_start > date_stop {
            return Err(AppError::InvalidPeriodRange {
                code,
                start: date_start,
                stop: date_stop,
            });
        }

        let mut conn = self.repo.acquire().await?;
        if self.repo.get_period_by_code(&mut conn, &code).await?.is_some() {
            return Err(AppError::PeriodAlreadyExists(code));
        }

        let name = name.unwrap_or_else(|| code.clone());
        let period = FiscalPeriod::new(code, name, date_start, date_stop).with_special(special);
        self.repo.save_period(&mut conn, &period).await?;
        Ok(period)
    }

    /// Create the opening period and the twelve monthly periods of `year`.
    pub async fn generate_year_periods(&self, year: i32) -> Result<Vec<FiscalPeriod>, AppError> {
        let periods = calendar_year_periods(year).ok_or_else(|| {
            AppError::Database(anyhow::anyhow!("Year out of range: {}", year))
        })?;

        let mut tx = self.repo.begin().await?;
        for period in &periods {
            if self.repo.get_period_by_code(&mut tx, &period.code).await?.is_some() {
                return Err(AppError::PeriodAlreadyExists(period.code.clone()));
            }
            self.repo.save_period(&mut tx, period).await?;
        }
        tx.commit().await.context("Failed to commit fiscal year")?;

        Ok(periods)
    }

    pub async fn list_periods(&self) -> Result<Vec<FiscalPeriod>, AppError> {
        let mut conn = self.repo.acquire().await?;
        Ok(self.repo.list_periods(&mut conn).await?)
    }

    /// Close a period so nothing more can be posted into it.
    pub async fn close_period(&self, code: &str) -> Result<FiscalPeriod, AppError> {
        let mut conn = self.repo.acquire().await?;
        let mut period = self
            .repo
            .get_period_by_code(&mut conn, code)
            .await?
            .ok_or_else(|| AppError::PeriodNotFound(code.to_string()))?;

        self.repo
            .set_period_state(&mut conn, period.id, PeriodState::Closed)
            .await?;
        period.state = PeriodState::Closed;
        Ok(period)
    }

    /// Find the period a date belongs to, preferring normal periods.
    pub async fn find_period_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<Option<FiscalPeriod>, AppError> {
        let mut conn = self.repo.acquire().await?;
        self.period_for_date(&mut conn, date).await
    }

    pub(crate) async fn period_for_date(
        &self,
        conn: &mut SqliteConnection,
        date: NaiveDate,
    ) -> Result<Option<FiscalPeriod>, AppError> {
        let candidates = self.repo.periods_containing(conn, date).await?;
        Ok(find_period(&candidates, date, true).cloned())
    }

    // ========================
    // Tickets
    // ========================

    pub async fn create_ticket(&self, ticket: Ticket) -> Result<Ticket, AppError> {
        let mut tx = self.repo.begin().await?;
        if self
            .repo
            .get_ticket_by_name(&mut tx, &ticket.name)
            .await?
            .is_some()
        {
            return Err(AppError::TicketAlreadyExists(ticket.name));
        }

        self.repo.save_ticket(&mut tx, &ticket).await?;
        tx.commit().await.context("Failed to commit ticket")?;
        Ok(ticket)
    }

    pub async fn get_ticket(&self, name: &str) -> Result<Ticket, AppError> {
        let mut conn = self.repo.acquire().await?;
        self.repo
            .get_ticket_by_name(&mut conn, name)
            .await?
            .ok_or_else(|| AppError::TicketNotFound(name.to_string()))
    }

    pub async fn ticket_exists(&self, name: &str) -> Result<bool, AppError> {
        let mut conn = self.repo.acquire().await?;
        Ok(self.repo.get_ticket_by_name(&mut conn, name).await?.is_some())
    }

    pub async fn list_tickets(&self) -> Result<Vec<Ticket>, AppError> {
        let mut conn = self.repo.acquire().await?;
        Ok(self.repo.list_tickets(&mut conn).await?)
    }

    // ========================
    // Journal entries
    // ========================

    /// Save `entry` as a draft, then validate and post it under the next
    /// name of its journal's yearly sequence.
    ///
    /// Runs on the caller's connection; on error the caller must roll back
    /// so the draft does not survive.
    pub(crate) async fn create_and_post_entry(
        &self,
        conn: &mut SqliteConnection,
        mut entry: JournalEntry,
    ) -> Result<JournalEntry, AppError> {
        self.repo.save_entry(conn, &entry).await?;

        let period = self.period_by_id(conn, entry.period_id).await?;
        entry.validate_for_posting(&period)?;

        let journal = self.journal_by_id(conn, entry.journal_id).await?;
        let year = entry.date.year();
        let number = self
            .repo
            .next_sequence(conn, &journal.sequence_key(year))
            .await?;

        entry.post(journal.entry_name(year, number), Utc::now());
        self.repo.update_entry_posting(conn, &entry).await?;
        Ok(entry)
    }

    async fn period_by_id(
        &self,
        conn: &mut SqliteConnection,
        id: PeriodId,
    ) -> Result<FiscalPeriod, AppError> {
        self.repo
            .get_period(conn, id)
            .await?
            .ok_or_else(|| AppError::PeriodNotFound(id.to_string()))
    }

    async fn journal_by_id(
        &self,
        conn: &mut SqliteConnection,
        id: JournalId,
    ) -> Result<Journal, AppError> {
        self.repo
            .get_journal(conn, id)
            .await?
            .ok_or_else(|| AppError::JournalNotFound(id.to_string()))
    }

    /// List entries, optionally only those for one source reference.
    pub async fn list_entries(&self, reference: Option<&str>) -> Result<Vec<JournalEntry>, AppError> {
        let mut conn = self.repo.acquire().await?;
        Ok(self.repo.list_entries(&mut conn, reference).await?)
    }

    /// Look up an entry by its posted name, falling back to the most recent
    /// entry for a source reference.
    pub async fn get_entry_info(&self, name_or_reference: &str) -> Result<EntryInfo, AppError> {
        let mut conn = self.repo.acquire().await?;

        let entry = match self.repo.get_entry_by_name(&mut conn, name_or_reference).await? {
            Some(entry) => entry,
            None => self
                .repo
                .list_entries(&mut conn, Some(name_or_reference))
                .await?
                .pop()
                .ok_or_else(|| AppError::EntryNotFound(name_or_reference.to_string()))?,
        };

        let journal = self.journal_by_id(&mut conn, entry.journal_id).await?;
        let period = self.period_by_id(&mut conn, entry.period_id).await?;

        let mut account_codes = HashMap::new();
        for line in &entry.lines {
            if account_codes.contains_key(&line.account_id) {
                continue;
            }
            if let Some(account) = self.repo.get_account(&mut conn, line.account_id).await? {
                account_codes.insert(account.id, account.code);
            }
        }

        Ok(EntryInfo {
            entry,
            journal_code: journal.code,
            period_code: period.code,
            account_codes,
        })
    }
}
