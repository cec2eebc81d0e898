use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{checked_sum, AccountId, Cents, FiscalPeriod, JournalId, PeriodId};

pub type EntryId = Uuid;

/// Name an entry carries until it is posted and numbered.
pub const DRAFT_ENTRY_NAME: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    Draft,
    Posted,
}

impl EntryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryState::Draft => "draft",
            EntryState::Posted => "posted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(EntryState::Draft),
            "posted" => Some(EntryState::Posted),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalLine {
    pub id: Uuid,
    pub label: String,
    pub account_id: AccountId,
    pub debit_cents: Cents,
    pub credit_cents: Cents,
}

impl JournalLine {
    pub fn debit(label: impl Into<String>, account_id: AccountId, amount: Cents) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            account_id,
            debit_cents: amount,
            credit_cents: 0,
        }
    }

    pub fn credit(label: impl Into<String>, account_id: AccountId, amount: Cents) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            account_id,
            debit_cents: 0,
            credit_cents: amount,
        }
    }
}

/// A double-entry journal entry ("move").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: EntryId,
    /// `/` while draft, the journal sequence name once posted
    pub name: String,
    pub journal_id: JournalId,
    pub period_id: PeriodId,
    pub date: NaiveDate,
    /// Source document reference, the ticket name for generated entries
    pub reference: String,
    pub state: EntryState,
    pub lines: Vec<JournalLine>,
    pub created_at: DateTime<Utc>,
    pub posted_at: Option<DateTime<Utc>>,
}

impl JournalEntry {
    pub fn new(
        journal_id: JournalId,
        period_id: PeriodId,
        date: NaiveDate,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: DRAFT_ENTRY_NAME.to_string(),
            journal_id,
            period_id,
            date,
            reference: reference.into(),
            state: EntryState::Draft,
            lines: Vec::new(),
            created_at: Utc::now(),
            posted_at: None,
        }
    }

    pub fn with_line(mut self, line: JournalLine) -> Self {
        self.lines.push(line);
        self
    }

    /// Debit total, saturating at the `Cents` range. Use for display only.
    pub fn total_debit(&self) -> Cents {
        self.lines
            .iter()
            .fold(0, |total, l| total.saturating_add(l.debit_cents))
    }

    /// Credit total, saturating at the `Cents` range. Use for display only.
    pub fn total_credit(&self) -> Cents {
        self.lines
            .iter()
            .fold(0, |total, l| total.saturating_add(l.credit_cents))
    }

    fn checked_totals(&self) -> Result<(Cents, Cents), EntryError> {
        let debit = checked_sum(self.lines.iter().map(|l| l.debit_cents));
        let credit = checked_sum(self.lines.iter().map(|l| l.credit_cents));
        debit.zip(credit).ok_or(EntryError::AmountOverflow)
    }

    pub fn is_balanced(&self) -> bool {
        matches!(self.checked_totals(), Ok((debit, credit)) if debit == credit)
    }

    pub fn is_posted(&self) -> bool {
        self.state == EntryState::Posted
    }

    /// Check everything posting requires against the entry's period.
    pub fn validate_for_posting(&self, period: &FiscalPeriod) -> Result<(), EntryError> {
        if self.is_posted() {
            return Err(EntryError::AlreadyPosted(self.name.clone()));
        }
        if self.lines.len() < 2 {
            return Err(EntryError::TooFewLines(self.lines.len()));
        }
        for line in &self.lines {
            let one_sided = (line.debit_cents > 0) != (line.credit_cents > 0);
            if line.debit_cents < 0 || line.credit_cents < 0 || !one_sided {
                return Err(EntryError::InvalidLine(line.label.clone()));
            }
        }
        let (debit, credit) = self.checked_totals()?;
        if debit != credit {
            return Err(EntryError::Unbalanced { debit, credit });
        }
        if period.id != self.period_id || !period.contains(self.date) {
            return Err(EntryError::DateOutsidePeriod {
                date: self.date,
                period: period.code.clone(),
            });
        }
        if !period.is_open() {
            return Err(EntryError::PeriodClosed(period.code.clone()));
        }
        Ok(())
    }

    /// Mark as posted under its sequence name. Call `validate_for_posting` first.
    pub fn post(&mut self, name: String, at: DateTime<Utc>) {
        self.name = name;
        self.state = EntryState::Posted;
        self.posted_at = Some(at);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryError {
    AlreadyPosted(String),
    TooFewLines(usize),
    InvalidLine(String),
    Unbalanced { debit: Cents, credit: Cents },
    AmountOverflow,
    DateOutsidePeriod { date: NaiveDate, period: String },
    PeriodClosed(String),
}

impl std::fmt::Display for EntryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryError::AlreadyPosted(name) => write!(f, "Entry {} is already posted", name),
            EntryError::TooFewLines(n) => {
                write!(f, "An entry needs at least two lines, got {}", n)
            }
            EntryError::InvalidLine(label) => write!(
                f,
                "Line '{}' must have either a debit or a credit, not both or neither",
                label
            ),
            EntryError::Unbalanced { debit, credit } => write!(
                f,
                "Unbalanced entry: debit {} != credit {}",
                super::format_cents(*debit),
                super::format_cents(*credit)
            ),
            EntryError::AmountOverflow => write!(f, "Entry totals are too large"),
            EntryError::DateOutsidePeriod { date, period } => {
                write!(f, "Date {} is outside period {}", date, period)
            }
            EntryError::PeriodClosed(code) => {
                write!(f, "Cannot post into closed period {}", code)
            }
        }
    }
}

impl std::error::Error for EntryError {}
