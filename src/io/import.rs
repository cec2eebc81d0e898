use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;

use crate::application::{AppError, JournalService};
use crate::domain::{
    checked_sum, parse_cents, parse_ticket_date, AccountId, Cents, Ticket, TicketLine,
    TicketState,
};

/// Result of an import operation
#[derive(Debug, Clone, Default)]
pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<ImportError>,
}

/// Error that occurred during import
#[derive(Debug, Clone)]
pub struct ImportError {
    pub line: usize,
    pub field: Option<String>,
    pub error: String,
}

/// Options for import operations
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub dry_run: bool,
}

/// One CSV row: ticket header fields repeated on every line of the ticket.
#[derive(Debug, Deserialize)]
struct TicketRow {
    ticket: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    total: String,
    #[serde(default)]
    item: String,
    #[serde(default)]
    income_account: String,
    #[serde(default)]
    amount: String,
}

struct PendingTicket {
    first_line: usize,
    ticket: Ticket,
    explicit_total: Option<Cents>,
    invalid: bool,
}

/// Loads tickets and their lines from CSV.
///
/// Expected header: `ticket,date,state,total,item,income_account,amount`.
/// Consecutive or scattered rows with the same ticket name are merged; the
/// ticket's date, state and total come from its first row.
pub struct TicketImporter<'a> {
    service: &'a JournalService,
}

impl<'a> TicketImporter<'a> {
    pub fn new(service: &'a JournalService) -> Self {
        Self { service }
    }

    pub async fn import_tickets_csv<R: Read>(
        &self,
        reader: R,
        options: ImportOptions,
    ) -> Result<ImportResult> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut result = ImportResult::default();
        let mut pending: Vec<PendingTicket> = Vec::new();
        let mut index_by_name: HashMap<String, usize> = HashMap::new();
        let mut account_cache: HashMap<String, Option<AccountId>> = HashMap::new();

        for (line_num, record) in csv_reader.deserialize::<TicketRow>().enumerate() {
            let line = line_num + 2; // +2 for header and 0-indexing

            let row = match record {
                Ok(row) => row,
                Err(e) => {
                    result.errors.push(ImportError {
                        line,
                        field: None,
                        error: format!("CSV parse error: {}", e),
                    });
                    continue;
                }
            };

            let name = row.ticket.to_uppercase();
            if name.is_empty() {
                result.errors.push(ImportError {
                    line,
                    field: Some("ticket".to_string()),
                    error: "Ticket name is empty".to_string(),
                });
                continue;
            }

            let idx = match index_by_name.get(&name).copied() {
                Some(idx) => idx,
                None => match new_pending(&name, &row, line) {
                    Ok(p) => {
                        pending.push(p);
                        index_by_name.insert(name.clone(), pending.len() - 1);
                        pending.len() - 1
                    }
                    Err(error) => {
                        result.errors.push(error);
                        // Remember the name so later rows of this ticket are dropped too.
                        pending.push(PendingTicket {
                            first_line: line,
                            ticket: Ticket::new(name.clone(), None, 0),
                            explicit_total: None,
                            invalid: true,
                        });
                        index_by_name.insert(name.clone(), pending.len() - 1);
                        continue;
                    }
                },
            };

            if row.item.is_empty() && row.amount.is_empty() {
                continue;
            }

            match self.parse_line(&row, line, &mut account_cache).await {
                Ok(ticket_line) => pending[idx].ticket.lines.push(ticket_line),
                Err(error) => {
                    result.errors.push(error);
                    pending[idx].invalid = true;
                }
            }
        }

        for mut p in pending {
            if p.invalid {
                continue;
            }

            let total = match p.explicit_total {
                Some(total) => Some(total),
                None => checked_sum(p.ticket.lines.iter().map(|l| l.amount_cents)),
            };
            let Some(total) = total else {
                result.errors.push(ImportError {
                    line: p.first_line,
                    field: Some("amount".to_string()),
                    error: format!(
                        "Line amounts of {} add up past the largest total",
                        p.ticket.name
                    ),
                });
                continue;
            };
            p.ticket.total_cents = total;

            if self.service.ticket_exists(&p.ticket.name).await? {
                result.skipped += 1;
                continue;
            }

            if options.dry_run {
                result.imported += 1;
                continue;
            }

            match self.service.create_ticket(p.ticket).await {
                Ok(_) => result.imported += 1,
                Err(AppError::TicketAlreadyExists(_)) => result.skipped += 1,
                Err(e) => result.errors.push(ImportError {
                    line: p.first_line,
                    field: None,
                    error: format!("Ticket creation failed: {}", e),
                }),
            }
        }

        Ok(result)
    }

    async fn parse_line(
        &self,
        row: &TicketRow,
        line: usize,
        account_cache: &mut HashMap<String, Option<AccountId>>,
    ) -> std::result::Result<TicketLine, ImportError> {
        let amount = if row.amount.is_empty() {
            0
        } else {
            parse_cents(&row.amount).map_err(|e| ImportError {
                line,
                field: Some("amount".to_string()),
                error: format!("Invalid amount: {}", e),
            })?
        };

        let income_account = if row.income_account.is_empty() {
            None
        } else {
            let code = row.income_account.as_str();
            let resolved = match account_cache.get(code).copied() {
                Some(cached) => cached,
                None => {
                    let found = match self.service.get_account(code).await {
                        Ok(account) => Some(account.id),
                        Err(AppError::AccountNotFound(_)) => None,
                        Err(e) => {
                            return Err(ImportError {
                                line,
                                field: Some("income_account".to_string()),
                                error: e.to_string(),
                            });
                        }
                    };
                    account_cache.insert(code.to_string(), found);
                    found
                }
            };
            Some(resolved.ok_or_else(|| ImportError {
                line,
                field: Some("income_account".to_string()),
                error: format!("Unknown account code: {}", code),
            })?)
        };

        let item_name = if row.item.is_empty() {
            None
        } else {
            Some(row.item.clone())
        };

        Ok(TicketLine::new(item_name, income_account, amount))
    }
}

fn new_pending(
    name: &str,
    row: &TicketRow,
    line: usize,
) -> std::result::Result<PendingTicket, ImportError> {
    let date = parse_ticket_date(&row.date).map_err(|e| ImportError {
        line,
        field: Some("date".to_string()),
        error: format!("Invalid date '{}': {}", row.date, e),
    })?;

    let state = if row.state.is_empty() {
        TicketState::Draft
    } else {
        TicketState::from_str(&row.state).ok_or_else(|| ImportError {
            line,
            field: Some("state".to_string()),
            error: format!(
                "Invalid state '{}'. Valid states: draft, confirmed, cancelled",
                row.state
            ),
        })?
    };

    let explicit_total = if row.total.is_empty() {
        None
    } else {
        Some(parse_cents(&row.total).map_err(|e| ImportError {
            line,
            field: Some("total".to_string()),
            error: format!("Invalid total: {}", e),
        })?)
    };

    Ok(PendingTicket {
        first_line: line,
        ticket: Ticket::new(name, date, explicit_total.unwrap_or(0)).with_state(state),
        explicit_total,
        invalid: false,
    })
}
