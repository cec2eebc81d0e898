use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{EntryError, PostingError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account already exists: {0}")]
    AccountAlreadyExists(String),

    #[error("Journal not found: {0}")]
    JournalNotFound(String),

    #[error("Journal already exists: {0}")]
    JournalAlreadyExists(String),

    #[error("Fiscal period not found: {0}")]
    PeriodNotFound(String),

    #[error("Fiscal period already exists: {0}")]
    PeriodAlreadyExists(String),

    #[error("Invalid fiscal period {code}: start {start} is after stop {stop}")]
    InvalidPeriodRange {
        code: String,
        start: NaiveDate,
        stop: NaiveDate,
    },

    #[error("Ticket not found: {0}")]
    TicketNotFound(String),

    #[error("Ticket already exists: {0}")]
    TicketAlreadyExists(String),

    #[error("Journal entry not found: {0}")]
    EntryNotFound(String),

    #[error("No valid OPD numbers found. Example: OPD-0412768")]
    NoReferences,

    #[error(transparent)]
    Posting(#[from] PostingError),

    #[error(transparent)]
    Entry(#[from] EntryError),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}
