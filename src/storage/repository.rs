use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, AccountType, EntryId, EntryState, FiscalPeriod, Journal, JournalEntry,
    JournalId, JournalLine, PeriodId, PeriodState, Ticket, TicketId, TicketLine, TicketState,
};

use super::MIGRATION_001_INITIAL;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Repository for persisting and querying ledger records.
///
/// Query methods take an explicit connection so callers decide the
/// transaction scope: pass a pooled connection for one-off reads, or a
/// transaction (or savepoint) when several writes must land together.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Check out a connection for standalone queries.
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        self.pool
            .acquire()
            .await
            .context("Failed to acquire database connection")
    }

    /// Start a transaction on a dedicated connection.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .context("Failed to begin transaction")
    }

    // ========================
    // Account operations
    // ========================

    pub async fn save_account(&self, conn: &mut SqliteConnection, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, code, name, account_type, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(&account.code)
        .bind(&account.name)
        .bind(account.account_type.as_str())
        .bind(account.created_at.to_rfc3339())
        .execute(&mut *conn)
        .await
        .context("Failed to save account")?;
        Ok(())
    }

    pub async fn get_account(
        &self,
        conn: &mut SqliteConnection,
        id: AccountId,
    ) -> Result<Option<Account>> {
        let row = sqlx::query(
            "SELECT id, code, name, account_type, created_at FROM accounts WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch account")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    pub async fn get_account_by_code(
        &self,
        conn: &mut SqliteConnection,
        code: &str,
    ) -> Result<Option<Account>> {
        let row = sqlx::query(
            "SELECT id, code, name, account_type, created_at FROM accounts WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch account by code")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    pub async fn list_accounts(&self, conn: &mut SqliteConnection) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            "SELECT id, code, name, account_type, created_at FROM accounts ORDER BY code",
        )
        .fetch_all(&mut *conn)
        .await
        .context("Failed to list accounts")?;

        rows.iter().map(Self::row_to_account).collect()
    }

    fn row_to_account(row: &SqliteRow) -> Result<Account> {
        let id_str: String = row.get("id");
        let type_str: String = row.get("account_type");
        let created_at_str: String = row.get("created_at");

        Ok(Account {
            id: Uuid::parse_str(&id_str).context("Invalid account ID")?,
            code: row.get("code"),
            name: row.get("name"),
            account_type: AccountType::from_str(&type_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid account type: {}", type_str))?,
            created_at: parse_timestamp(&created_at_str)?,
        })
    }

    // ========================
    // Journal operations
    // ========================

    pub async fn save_journal(&self, conn: &mut SqliteConnection, journal: &Journal) -> Result<()> {
        sqlx::query("INSERT INTO journals (id, code, name, created_at) VALUES (?, ?, ?, ?)")
            .bind(journal.id.to_string())
            .bind(&journal.code)
            .bind(&journal.name)
            .bind(journal.created_at.to_rfc3339())
            .execute(&mut *conn)
            .await
            .context("Failed to save journal")?;
        Ok(())
    }

    pub async fn get_journal(
        &self,
        conn: &mut SqliteConnection,
        id: JournalId,
    ) -> Result<Option<Journal>> {
        let row = sqlx::query("SELECT id, code, name, created_at FROM journals WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to fetch journal")?;

        row.as_ref().map(Self::row_to_journal).transpose()
    }

    pub async fn get_journal_by_code(
        &self,
        conn: &mut SqliteConnection,
        code: &str,
    ) -> Result<Option<Journal>> {
        let row = sqlx::query("SELECT id, code, name, created_at FROM journals WHERE code = ?")
            .bind(code)
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to fetch journal by code")?;

        row.as_ref().map(Self::row_to_journal).transpose()
    }

    pub async fn list_journals(&self, conn: &mut SqliteConnection) -> Result<Vec<Journal>> {
        let rows = sqlx::query("SELECT id, code, name, created_at FROM journals ORDER BY code")
            .fetch_all(&mut *conn)
            .await
            .context("Failed to list journals")?;

        rows.iter().map(Self::row_to_journal).collect()
    }

    fn row_to_journal(row: &SqliteRow) -> Result<Journal> {
        let id_str: String = row.get("id");
        let created_at_str: String = row.get("created_at");

        Ok(Journal {
            id: Uuid::parse_str(&id_str).context("Invalid journal ID")?,
            code: row.get("code"),
            name: row.get("name"),
            created_at: parse_timestamp(&created_at_str)?,
        })
    }

    // ========================
    // Fiscal period operations
    // ========================

    pub async fn save_period(
        &self,
        conn: &mut SqliteConnection,
        period: &FiscalPeriod,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fiscal_periods (id, code, name, date_start, date_stop, special, state)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(period.id.to_string())
        .bind(&period.code)
        .bind(&period.name)
        .bind(period.date_start.format(DATE_FORMAT).to_string())
        .bind(period.date_stop.format(DATE_FORMAT).to_string())
        .bind(period.special)
        .bind(period.state.as_str())
        .execute(&mut *conn)
        .await
        .context("Failed to save fiscal period")?;
        Ok(())
    }

    pub async fn get_period(
        &self,
        conn: &mut SqliteConnection,
        id: PeriodId,
    ) -> Result<Option<FiscalPeriod>> {
        let row = sqlx::query(
            r#"
            SELECT id, code, name, date_start, date_stop, special, state
            FROM fiscal_periods
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch fiscal period")?;

        row.as_ref().map(Self::row_to_period).transpose()
    }

    pub async fn get_period_by_code(
        &self,
        conn: &mut SqliteConnection,
        code: &str,
    ) -> Result<Option<FiscalPeriod>> {
        let row = sqlx::query(
            r#"
            SELECT id, code, name, date_start, date_stop, special, state
            FROM fiscal_periods
            WHERE code = ?
            "#,
        )
        .bind(code)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch fiscal period by code")?;

        row.as_ref().map(Self::row_to_period).transpose()
    }

    pub async fn list_periods(&self, conn: &mut SqliteConnection) -> Result<Vec<FiscalPeriod>> {
        let rows = sqlx::query(
            r#"
            SELECT id, code, name, date_start, date_stop, special, state
            FROM fiscal_periods
            ORDER BY date_start, special DESC, code
            "#,
        )
        .fetch_all(&mut *conn)
        .await
        .context("Failed to list fiscal periods")?;

        rows.iter().map(Self::row_to_period).collect()
    }

    /// All periods whose inclusive range covers `date`.
    pub async fn periods_containing(
        &self,
        conn: &mut SqliteConnection,
        date: NaiveDate,
    ) -> Result<Vec<FiscalPeriod>> {
        let day = date.format(DATE_FORMAT).to_string();
        let rows = sqlx::query(
            r#"
            SELECT id, code, name, date_start, date_stop, special, state
            FROM fiscal_periods
            WHERE date_start <= ? AND date_stop >= ?
            ORDER BY date_start, special DESC
            "#,
        )
        .bind(&day)
        .bind(&day)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to look up fiscal periods for date")?;

        rows.iter().map(Self::row_to_period).collect()
    }

    pub async fn set_period_state(
        &self,
        conn: &mut SqliteConnection,
        id: PeriodId,
        state: PeriodState,
    ) -> Result<()> {
        sqlx::query("UPDATE fiscal_periods SET state = ? WHERE id = ?")
            .bind(state.as_str())
            .bind(id.to_string())
            .execute(&mut *conn)
            .await
            .context("Failed to update fiscal period state")?;
        Ok(())
    }

    fn row_to_period(row: &SqliteRow) -> Result<FiscalPeriod> {
        let id_str: String = row.get("id");
        let start_str: String = row.get("date_start");
        let stop_str: String = row.get("date_stop");
        let state_str: String = row.get("state");

        Ok(FiscalPeriod {
            id: Uuid::parse_str(&id_str).context("Invalid period ID")?,
            code: row.get("code"),
            name: row.get("name"),
            date_start: parse_date(&start_str)?,
            date_stop: parse_date(&stop_str)?,
            special: row.get::<i32, _>("special") != 0,
            state: PeriodState::from_str(&state_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid period state: {}", state_str))?,
        })
    }

    // ========================
    // Ticket operations
    // ========================

    /// Save a ticket together with its lines.
    pub async fn save_ticket(&self, conn: &mut SqliteConnection, ticket: &Ticket) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tickets (id, name, date, state, total_cents, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(ticket.id.to_string())
        .bind(&ticket.name)
        .bind(ticket.date.map(|d| d.format(DATE_FORMAT).to_string()))
        .bind(ticket.state.as_str())
        .bind(ticket.total_cents)
        .bind(ticket.created_at.to_rfc3339())
        .execute(&mut *conn)
        .await
        .context("Failed to save ticket")?;

        for (position, line) in ticket.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO ticket_lines (id, ticket_id, position, item_name, income_account_id, amount_cents)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(line.id.to_string())
            .bind(ticket.id.to_string())
            .bind(position as i64)
            .bind(&line.item_name)
            .bind(line.income_account.map(|id| id.to_string()))
            .bind(line.amount_cents)
            .execute(&mut *conn)
            .await
            .context("Failed to save ticket line")?;
        }

        Ok(())
    }

    /// Find a ticket by its exact reference name.
    pub async fn get_ticket_by_name(
        &self,
        conn: &mut SqliteConnection,
        name: &str,
    ) -> Result<Option<Ticket>> {
        let row = sqlx::query(
            "SELECT id, name, date, state, total_cents, created_at FROM tickets WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch ticket by name")?;

        match row {
            Some(row) => {
                let mut ticket = Self::row_to_ticket(&row)?;
                ticket.lines = self.ticket_lines(conn, ticket.id).await?;
                Ok(Some(ticket))
            }
            None => Ok(None),
        }
    }

    pub async fn list_tickets(&self, conn: &mut SqliteConnection) -> Result<Vec<Ticket>> {
        let rows = sqlx::query(
            "SELECT id, name, date, state, total_cents, created_at FROM tickets ORDER BY name",
        )
        .fetch_all(&mut *conn)
        .await
        .context("Failed to list tickets")?;

        let mut tickets = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut ticket = Self::row_to_ticket(row)?;
            ticket.lines = self.ticket_lines(conn, ticket.id).await?;
            tickets.push(ticket);
        }
        Ok(tickets)
    }

    async fn ticket_lines(
        &self,
        conn: &mut SqliteConnection,
        ticket_id: TicketId,
    ) -> Result<Vec<TicketLine>> {
        let rows = sqlx::query(
            r#"
            SELECT id, item_name, income_account_id, amount_cents
            FROM ticket_lines
            WHERE ticket_id = ?
            ORDER BY position
            "#,
        )
        .bind(ticket_id.to_string())
        .fetch_all(&mut *conn)
        .await
        .context("Failed to fetch ticket lines")?;

        rows.iter()
            .map(|row| {
                let id_str: String = row.get("id");
                let account_str: Option<String> = row.get("income_account_id");
                Ok(TicketLine {
                    id: Uuid::parse_str(&id_str).context("Invalid ticket line ID")?,
                    item_name: row.get("item_name"),
                    income_account: account_str
                        .map(|s| Uuid::parse_str(&s))
                        .transpose()
                        .context("Invalid income account ID")?,
                    amount_cents: row.get("amount_cents"),
                })
            })
            .collect()
    }

    fn row_to_ticket(row: &SqliteRow) -> Result<Ticket> {
        let id_str: String = row.get("id");
        let date_str: Option<String> = row.get("date");
        let state_str: String = row.get("state");
        let created_at_str: String = row.get("created_at");

        Ok(Ticket {
            id: Uuid::parse_str(&id_str).context("Invalid ticket ID")?,
            name: row.get("name"),
            date: date_str.as_deref().map(parse_date).transpose()?,
            state: TicketState::from_str(&state_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid ticket state: {}", state_str))?,
            total_cents: row.get("total_cents"),
            lines: Vec::new(),
            created_at: parse_timestamp(&created_at_str)?,
        })
    }

    // ========================
    // Journal entry operations
    // ========================

    /// Save an entry together with its lines.
    pub async fn save_entry(&self, conn: &mut SqliteConnection, entry: &JournalEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO journal_entries (id, name, journal_id, period_id, date, reference, state, created_at, posted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(&entry.name)
        .bind(entry.journal_id.to_string())
        .bind(entry.period_id.to_string())
        .bind(entry.date.format(DATE_FORMAT).to_string())
        .bind(&entry.reference)
        .bind(entry.state.as_str())
        .bind(entry.created_at.to_rfc3339())
        .bind(entry.posted_at.map(|dt| dt.to_rfc3339()))
        .execute(&mut *conn)
        .await
        .context("Failed to save journal entry")?;

        for (position, line) in entry.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO journal_lines (id, entry_id, position, label, account_id, debit_cents, credit_cents)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(line.id.to_string())
            .bind(entry.id.to_string())
            .bind(position as i64)
            .bind(&line.label)
            .bind(line.account_id.to_string())
            .bind(line.debit_cents)
            .bind(line.credit_cents)
            .execute(&mut *conn)
            .await
            .context("Failed to save journal line")?;
        }

        Ok(())
    }

    /// Persist the posted name, state and timestamp of an entry.
    pub async fn update_entry_posting(
        &self,
        conn: &mut SqliteConnection,
        entry: &JournalEntry,
    ) -> Result<()> {
        sqlx::query("UPDATE journal_entries SET name = ?, state = ?, posted_at = ? WHERE id = ?")
            .bind(&entry.name)
            .bind(entry.state.as_str())
            .bind(entry.posted_at.map(|dt| dt.to_rfc3339()))
            .bind(entry.id.to_string())
            .execute(&mut *conn)
            .await
            .context("Failed to update journal entry")?;
        Ok(())
    }

    /// Whether an entry already exists for a source reference.
    /// Only posted entries count unless `include_draft` is set.
    pub async fn entry_exists_for_reference(
        &self,
        conn: &mut SqliteConnection,
        reference: &str,
        include_draft: bool,
    ) -> Result<bool> {
        let query = if include_draft {
            "SELECT COUNT(*) as count FROM journal_entries WHERE reference = ?"
        } else {
            "SELECT COUNT(*) as count FROM journal_entries WHERE reference = ? AND state = 'posted'"
        };

        let count: i64 = sqlx::query(query)
            .bind(reference)
            .fetch_one(&mut *conn)
            .await
            .context("Failed to check for existing journal entry")?
            .get("count");

        Ok(count > 0)
    }

    pub async fn get_entry_by_name(
        &self,
        conn: &mut SqliteConnection,
        name: &str,
    ) -> Result<Option<JournalEntry>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, journal_id, period_id, date, reference, state, created_at, posted_at
            FROM journal_entries
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch journal entry")?;

        match row {
            Some(row) => {
                let mut entry = Self::row_to_entry(&row)?;
                entry.lines = self.entry_lines(conn, entry.id).await?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// List entries ordered by date then name, optionally for one reference.
    pub async fn list_entries(
        &self,
        conn: &mut SqliteConnection,
        reference: Option<&str>,
    ) -> Result<Vec<JournalEntry>> {
        let mut query = String::from(
            "SELECT id, name, journal_id, period_id, date, reference, state, created_at, posted_at FROM journal_entries",
        );
        if reference.is_some() {
            query.push_str(" WHERE reference = ?");
        }
        query.push_str(" ORDER BY date, name, created_at");

        let mut sql_query = sqlx::query(&query);
        if let Some(reference) = reference {
            sql_query = sql_query.bind(reference);
        }

        let rows = sql_query
            .fetch_all(&mut *conn)
            .await
            .context("Failed to list journal entries")?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut entry = Self::row_to_entry(row)?;
            entry.lines = self.entry_lines(conn, entry.id).await?;
            entries.push(entry);
        }
        Ok(entries)
    }

    async fn entry_lines(
        &self,
        conn: &mut SqliteConnection,
        entry_id: EntryId,
    ) -> Result<Vec<JournalLine>> {
        let rows = sqlx::query(
            r#"
            SELECT id, label, account_id, debit_cents, credit_cents
            FROM journal_lines
            WHERE entry_id = ?
            ORDER BY position
            "#,
        )
        .bind(entry_id.to_string())
        .fetch_all(&mut *conn)
        .await
        .context("Failed to fetch journal lines")?;

        rows.iter()
            .map(|row| {
                let id_str: String = row.get("id");
                let account_str: String = row.get("account_id");
                Ok(JournalLine {
                    id: Uuid::parse_str(&id_str).context("Invalid journal line ID")?,
                    label: row.get("label"),
                    account_id: Uuid::parse_str(&account_str).context("Invalid account ID")?,
                    debit_cents: row.get("debit_cents"),
                    credit_cents: row.get("credit_cents"),
                })
            })
            .collect()
    }

    fn row_to_entry(row: &SqliteRow) -> Result<JournalEntry> {
        let id_str: String = row.get("id");
        let journal_str: String = row.get("journal_id");
        let period_str: String = row.get("period_id");
        let date_str: String = row.get("date");
        let state_str: String = row.get("state");
        let created_at_str: String = row.get("created_at");
        let posted_at_str: Option<String> = row.get("posted_at");

        Ok(JournalEntry {
            id: Uuid::parse_str(&id_str).context("Invalid entry ID")?,
            name: row.get("name"),
            journal_id: Uuid::parse_str(&journal_str).context("Invalid journal ID")?,
            period_id: Uuid::parse_str(&period_str).context("Invalid period ID")?,
            date: parse_date(&date_str)?,
            reference: row.get("reference"),
            state: EntryState::from_str(&state_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid entry state: {}", state_str))?,
            lines: Vec::new(),
            created_at: parse_timestamp(&created_at_str)?,
            posted_at: posted_at_str.as_deref().map(parse_timestamp).transpose()?,
        })
    }

    // ========================
    // Sequences
    // ========================

    /// Increment and return the named counter, starting at 1.
    pub async fn next_sequence(&self, conn: &mut SqliteConnection, name: &str) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO sequence_counter (name, value) VALUES (?, 1)
            ON CONFLICT (name) DO UPDATE SET value = value + 1
            RETURNING value
            "#,
        )
        .bind(name)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to get next sequence number")?;

        Ok(row.get("value"))
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).with_context(|| format!("Invalid date: {}", s))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp: {}", s))?
        .with_timezone(&Utc))
}
