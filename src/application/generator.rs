//! Batch generation of journal entries from a pasted list of OPD references.

use anyhow::Context;
use serde::Serialize;
use sqlx::{Connection, SqliteConnection};
use tracing::{debug, info, warn};

use crate::domain::{
    build_ticket_entry, check_ticket, extract_references, ticket_entry_date, Account, Journal,
    PostingError,
};

use super::{AppError, JournalService};

/// How many not-found references the summary lists.
pub const NOT_FOUND_PREVIEW: usize = 20;
/// How many errors the summary lists.
pub const ERROR_PREVIEW: usize = 15;

pub const DEFAULT_COMMIT_EVERY: usize = 100;

/// Parameters for one generation run.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Code of the cash/bank account debited with each ticket total
    pub cash_account: String,
    /// Code of the journal entries are posted in
    pub journal: String,
    /// Reject tickets that are not in the confirmed state
    pub only_confirmed: bool,
    /// Treat draft entries for a ticket as already existing
    pub include_draft: bool,
    /// Commit after this many created entries (0 = only at the end)
    pub commit_every: usize,
    /// Roll everything back at the end instead of committing
    pub dry_run: bool,
}

impl GenerateOptions {
    pub fn new(cash_account: impl Into<String>, journal: impl Into<String>) -> Self {
        Self {
            cash_account: cash_account.into(),
            journal: journal.into(),
            only_confirmed: true,
            include_draft: false,
            commit_every: DEFAULT_COMMIT_EVERY,
            dry_run: false,
        }
    }
}

/// A reference that failed, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceError {
    pub reference: String,
    pub message: String,
}

impl std::fmt::Display for ReferenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.reference, self.message)
    }
}

/// Outcome counts and details of a generation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationReport {
    pub input_count: usize,
    /// Names of the posted entries, in creation order
    pub created: Vec<String>,
    pub skipped_existing: usize,
    pub not_found: Vec<String>,
    pub errors: Vec<ReferenceError>,
    pub dry_run: bool,
}

impl GenerationReport {
    pub fn created_count(&self) -> usize {
        self.created.len()
    }

    /// Human-readable summary, listing at most the first
    /// `NOT_FOUND_PREVIEW` missing references and `ERROR_PREVIEW` errors.
    pub fn summary(&self) -> String {
        let mut msg = format!(
            "Completed.\nInput OPDs: {}\nCreated: {}\nSkipped (already has journal): {}\nNot found in opd_ticket: {}\nErrors: {}",
            self.input_count,
            self.created_count(),
            self.skipped_existing,
            self.not_found.len(),
            self.errors.len()
        );

        if !self.not_found.is_empty() {
            let shown: Vec<&str> = self
                .not_found
                .iter()
                .take(NOT_FOUND_PREVIEW)
                .map(String::as_str)
                .collect();
            msg.push_str(&format!(
                "\n\nNot found (first {}):\n- {}",
                NOT_FOUND_PREVIEW,
                shown.join("\n- ")
            ));
        }

        if !self.errors.is_empty() {
            let shown: Vec<String> = self
                .errors
                .iter()
                .take(ERROR_PREVIEW)
                .map(|e| e.to_string())
                .collect();
            msg.push_str(&format!(
                "\n\nErrors (first {}):\n- {}",
                ERROR_PREVIEW,
                shown.join("\n- ")
            ));
        }

        msg
    }
}

enum Outcome {
    Created(String),
    AlreadyExists,
    NotFound,
}

/// Turns pasted OPD references into posted journal entries.
pub struct OpdJournalGenerator<'a> {
    service: &'a JournalService,
}

impl<'a> OpdJournalGenerator<'a> {
    pub fn new(service: &'a JournalService) -> Self {
        Self { service }
    }

    /// Process every reference found in `text`.
    ///
    /// Each reference runs in its own savepoint: a failing reference is
    /// rolled back and recorded, and the batch moves on. The outer
    /// transaction is committed every `commit_every` created entries and
    /// once more at the end.
    pub async fn generate(
        &self,
        text: &str,
        options: &GenerateOptions,
    ) -> Result<GenerationReport, AppError> {
        let references = extract_references(text);
        if references.is_empty() {
            return Err(AppError::NoReferences);
        }

        let cash_account = self.service.get_account(&options.cash_account).await?;
        let journal = self.service.get_journal(&options.journal).await?;

        info!(
            references = references.len(),
            cash_account = %cash_account.code,
            journal = %journal.code,
            only_confirmed = options.only_confirmed,
            include_draft = options.include_draft,
            dry_run = options.dry_run,
            "Generating journal entries"
        );

        let mut report = GenerationReport {
            input_count: references.len(),
            dry_run: options.dry_run,
            ..Default::default()
        };

        let repo = self.service.repository();
        let mut tx = repo.begin().await?;

        for reference in &references {
            let mut savepoint = Connection::begin(&mut *tx)
                .await
                .context("Failed to open savepoint")?;

            let result = self
                .process_reference(&mut savepoint, reference, &cash_account, &journal, options)
                .await;

            match result {
                Ok(outcome) => {
                    savepoint
                        .commit()
                        .await
                        .context("Failed to release savepoint")?;
                    match outcome {
                        Outcome::Created(name) => {
                            debug!(%reference, entry = %name, "Posted journal entry");
                            report.created.push(name);

                            let created = report.created.len();
                            if !options.dry_run
                                && options.commit_every > 0
                                && created % options.commit_every == 0
                            {
                                tx.commit().await.context("Failed to commit batch")?;
                                tx = repo.begin().await?;
                                info!(created, "Committed batch");
                            }
                        }
                        Outcome::AlreadyExists => {
                            debug!(%reference, "Skipped, journal entry already exists");
                            report.skipped_existing += 1;
                        }
                        Outcome::NotFound => {
                            debug!(%reference, "Ticket not found");
                            report.not_found.push(reference.clone());
                        }
                    }
                }
                Err(e) => {
                    savepoint
                        .rollback()
                        .await
                        .context("Failed to roll back savepoint")?;
                    warn!(%reference, error = %e, "Reference failed");
                    report.errors.push(ReferenceError {
                        reference: reference.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if options.dry_run {
            tx.rollback().await.context("Failed to roll back dry run")?;
        } else {
            tx.commit().await.context("Failed to commit batch")?;
        }

        info!(
            created = report.created_count(),
            skipped = report.skipped_existing,
            not_found = report.not_found.len(),
            errors = report.errors.len(),
            "Generation finished"
        );

        Ok(report)
    }

    async fn process_reference(
        &self,
        conn: &mut SqliteConnection,
        reference: &str,
        cash_account: &Account,
        journal: &Journal,
        options: &GenerateOptions,
    ) -> Result<Outcome, AppError> {
        let repo = self.service.repository();

        let Some(ticket) = repo.get_ticket_by_name(conn, reference).await? else {
            return Ok(Outcome::NotFound);
        };

        if repo
            .entry_exists_for_reference(conn, &ticket.name, options.include_draft)
            .await?
        {
            return Ok(Outcome::AlreadyExists);
        }

        check_ticket(&ticket, options.only_confirmed)?;

        let date = ticket_entry_date(&ticket)?;
        let period = self
            .service
            .period_for_date(conn, date)
            .await?
            .ok_or_else(|| PostingError::NoPeriod {
                date,
                ticket: ticket.name.clone(),
            })?;

        let entry = build_ticket_entry(&ticket, cash_account.id, journal.id, &period)?;
        let posted = self.service.create_and_post_entry(conn, entry).await?;

        Ok(Outcome::Created(posted.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts_only() {
        let report = GenerationReport {
            input_count: 3,
            created: vec!["SAJ/2024/0001".into(), "SAJ/2024/0002".into()],
            skipped_existing: 1,
            ..Default::default()
        };

        assert_eq!(
            report.summary(),
            "Completed.\nInput OPDs: 3\nCreated: 2\nSkipped (already has journal): 1\nNot found in opd_ticket: 0\nErrors: 0"
        );
    }

    #[test]
    fn test_summary_lists_details() {
        let report = GenerationReport {
            input_count: 2,
            not_found: vec!["OPD-1".into()],
            errors: vec![ReferenceError {
                reference: "OPD-2".into(),
                message: "Ticket total is zero: OPD-2".into(),
            }],
            ..Default::default()
        };

        let summary = report.summary();
        assert!(summary.ends_with(
            "Errors: 1\n\nNot found (first 20):\n- OPD-1\n\nErrors (first 15):\n- OPD-2 -> Ticket total is zero: OPD-2"
        ));
    }

    #[test]
    fn test_summary_truncates_lists() {
        let report = GenerationReport {
            input_count: 60,
            not_found: (0..30).map(|i| format!("OPD-{}", i)).collect(),
            errors: (0..30)
                .map(|i| ReferenceError {
                    reference: format!("OPD-{}", 100 + i),
                    message: "boom".into(),
                })
                .collect(),
            ..Default::default()
        };

        let summary = report.summary();
        assert!(summary.contains("Not found in opd_ticket: 30"));
        assert!(summary.contains("Errors: 30"));
        assert!(summary.contains("- OPD-19\n"));
        assert!(!summary.contains("- OPD-20\n"));
        assert!(summary.contains("- OPD-114 -> boom"));
        assert!(!summary.contains("OPD-115"));
    }

    #[test]
    fn test_default_options() {
        let options = GenerateOptions::new("101100", "SAJ");
        assert!(options.only_confirmed);
        assert!(!options.include_draft);
        assert_eq!(options.commit_every, 100);
        assert!(!options.dry_run);
    }
}
