// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use chrono::NaiveDate;
use opdpost::application::JournalService;
use opdpost::domain::{AccountType, Ticket, TicketLine, TicketState};
use opdpost::storage::Repository;
use std::path::PathBuf;
use tempfile::TempDir;

pub const CASH: &str = "101100";
pub const CONSULTATION: &str = "400100";
pub const LABORATORY: &str = "400200";
pub const JOURNAL: &str = "SAJ";

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(JournalService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let service = JournalService::init(db_path(&temp_dir).to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

pub fn db_path(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("test.db")
}

/// Open a second handle on the test database for direct repository access
pub async fn test_repository(temp_dir: &TempDir) -> Result<Repository> {
    Repository::connect(&format!("sqlite:{}", db_path(temp_dir).display())).await
}

/// Helper to parse a date string into NaiveDate
pub fn parse_date(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap()
}

/// Test fixture: cash account, two income accounts, a sales journal and
/// the 2024 fiscal year
pub struct StandardBooks;

impl StandardBooks {
    pub async fn create(service: &JournalService) -> Result<()> {
        service
            .create_account(CASH.into(), "Cash".into(), AccountType::Asset)
            .await?;
        service
            .create_account(
                CONSULTATION.into(),
                "Consultation income".into(),
                AccountType::Income,
            )
            .await?;
        service
            .create_account(
                LABORATORY.into(),
                "Laboratory income".into(),
                AccountType::Income,
            )
            .await?;
        service
            .create_journal(JOURNAL.into(), "Sales journal".into())
            .await?;
        service.generate_year_periods(2024).await?;
        Ok(())
    }
}

/// Create a confirmed ticket with one consultation line for its whole total
pub async fn confirmed_ticket(
    service: &JournalService,
    name: &str,
    date: &str,
    total: i64,
) -> Result<Ticket> {
    let consultation = service.get_account(CONSULTATION).await?;
    let ticket = Ticket::new(name, Some(parse_date(date)), total)
        .with_state(TicketState::Confirmed)
        .with_line(TicketLine::new(
            Some("Consultation".into()),
            Some(consultation.id),
            total,
        ));
    Ok(service.create_ticket(ticket).await?)
}
