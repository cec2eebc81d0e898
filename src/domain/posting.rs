//! Rules for turning a ticket into a journal entry.
//!
//! The entry debits the full ticket total to the cash/bank account and
//! credits each positive ticket line to its item's income account.

use chrono::NaiveDate;

use super::{
    AccountId, EntryError, FiscalPeriod, JournalEntry, JournalId, JournalLine, Ticket,
};

/// Why a single ticket could not be turned into a posted entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostingError {
    ZeroTotal(String),
    NotConfirmed(String),
    MissingDate(String),
    NoPeriod { date: NaiveDate, ticket: String },
    MissingIncomeAccount { item: String, ticket: String },
    NoIncomeLines(String),
    Entry(EntryError),
}

impl std::fmt::Display for PostingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PostingError::ZeroTotal(ticket) => write!(f, "Ticket total is zero: {}", ticket),
            PostingError::NotConfirmed(ticket) => {
                write!(f, "Ticket is not confirmed: {}", ticket)
            }
            PostingError::MissingDate(_) => {
                write!(f, "Ticket date is empty, cannot find period.")
            }
            PostingError::NoPeriod { date, ticket } => {
                write!(f, "No period found for date {} (Ticket {})", date, ticket)
            }
            PostingError::MissingIncomeAccount { item, ticket } => write!(
                f,
                "Income account not set for item \"{}\" (Ticket {}). Set an income account on the item.",
                item, ticket
            ),
            PostingError::NoIncomeLines(ticket) => {
                write!(f, "No income lines found: {}", ticket)
            }
            PostingError::Entry(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for PostingError {}

impl From<EntryError> for PostingError {
    fn from(e: EntryError) -> Self {
        PostingError::Entry(e)
    }
}

/// Ticket-level checks that run before any period lookup.
pub fn check_ticket(ticket: &Ticket, only_confirmed: bool) -> Result<(), PostingError> {
    if ticket.total_cents <= 0 {
        return Err(PostingError::ZeroTotal(ticket.name.clone()));
    }
    if only_confirmed && !ticket.is_confirmed() {
        return Err(PostingError::NotConfirmed(ticket.name.clone()));
    }
    Ok(())
}

/// The date the ticket's entry will be booked on.
pub fn ticket_entry_date(ticket: &Ticket) -> Result<NaiveDate, PostingError> {
    ticket
        .date
        .ok_or_else(|| PostingError::MissingDate(ticket.name.clone()))
}

/// Build the draft entry for a ticket that passed `check_ticket`.
///
/// Lines with a zero or negative amount are left out, but every line must
/// still point at an item with an income account.
pub fn build_ticket_entry(
    ticket: &Ticket,
    cash_account: AccountId,
    journal: JournalId,
    period: &FiscalPeriod,
) -> Result<JournalEntry, PostingError> {
    let date = ticket_entry_date(ticket)?;

    let mut entry = JournalEntry::new(journal, period.id, date, ticket.name.clone())
        .with_line(JournalLine::debit(
            ticket.name.clone(),
            cash_account,
            ticket.total_cents,
        ));

    let mut has_income = false;
    for line in &ticket.lines {
        let account = match (&line.item_name, line.income_account) {
            (Some(_), Some(account)) => account,
            _ => {
                return Err(PostingError::MissingIncomeAccount {
                    item: line.item_name.clone().unwrap_or_else(|| "Unknown".to_string()),
                    ticket: ticket.name.clone(),
                });
            }
        };

        if line.amount_cents <= 0 {
            continue;
        }

        let label = line
            .item_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&ticket.name);
        entry = entry.with_line(JournalLine::credit(label, account, line.amount_cents));
        has_income = true;
    }

    if !has_income {
        return Err(PostingError::NoIncomeLines(ticket.name.clone()));
    }

    Ok(entry)
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::domain::{TicketLine, TicketState};

    fn period() -> FiscalPeriod {
        FiscalPeriod::new(
            "05/2024",
            "May 2024",
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
        )
    }

    fn ticket(total: i64) -> Ticket {
        Ticket::new("OPD-0412768", NaiveDate::from_ymd_opt(2024, 5, 14), total)
            .with_state(TicketState::Confirmed)
    }

    #[test]
    fn test_check_ticket_zero_total() {
        assert_eq!(
            check_ticket(&ticket(0), true),
            Err(PostingError::ZeroTotal("OPD-0412768".into()))
        );
    }

    #[test]
    fn test_check_ticket_requires_confirmed_only_when_asked() {
        let draft = ticket(100).with_state(TicketState::Draft);
        assert!(matches!(
            check_ticket(&draft, true),
            Err(PostingError::NotConfirmed(_))
        ));
        assert_eq!(
            check_ticket(&draft, true).unwrap_err().to_string(),
            "Ticket is not confirmed: OPD-0412768"
        );
        assert!(check_ticket(&draft, false).is_ok());
    }

    #[test]
    fn test_build_entry_lines() {
        let (cash, consult, lab) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let journal = Uuid::new_v4();
        let t = ticket(8000)
            .with_line(TicketLine::new(Some("Consultation".into()), Some(consult), 5000))
            .with_line(TicketLine::new(Some("Free follow-up".into()), Some(consult), 0))
            .with_line(TicketLine::new(Some("".into()), Some(lab), 3000));

        let p = period();
        let entry = build_ticket_entry(&t, cash, journal, &p).unwrap();

        assert_eq!(entry.reference, "OPD-0412768");
        assert_eq!(entry.journal_id, journal);
        assert_eq!(entry.period_id, p.id);
        assert_eq!(entry.lines.len(), 3);
        assert_eq!(entry.lines[0].account_id, cash);
        assert_eq!(entry.lines[0].debit_cents, 8000);
        assert_eq!(entry.lines[1].label, "Consultation");
        assert_eq!(entry.lines[1].credit_cents, 5000);
        // Blank item names fall back to the ticket name.
        assert_eq!(entry.lines[2].label, "OPD-0412768");
        assert!(entry.is_balanced());
    }

    #[test]
    fn test_build_entry_missing_income_account() {
        let t = ticket(100).with_line(TicketLine::new(Some("X-Ray".into()), None, 100));
        assert_eq!(
            build_ticket_entry(&t, Uuid::new_v4(), Uuid::new_v4(), &period()).unwrap_err(),
            PostingError::MissingIncomeAccount {
                item: "X-Ray".into(),
                ticket: "OPD-0412768".into()
            }
        );
    }

    #[test]
    fn test_missing_account_checked_even_on_zero_lines() {
        let t = ticket(100)
            .with_line(TicketLine::new(Some("Lab".into()), Some(Uuid::new_v4()), 100))
            .with_line(TicketLine::new(None, None, 0));
        let err = build_ticket_entry(&t, Uuid::new_v4(), Uuid::new_v4(), &period()).unwrap_err();
        assert!(err.to_string().contains("\"Unknown\""));
    }

    #[test]
    fn test_build_entry_no_income_lines() {
        let t = ticket(100).with_line(TicketLine::new(Some("Lab".into()), Some(Uuid::new_v4()), 0));
        assert_eq!(
            build_ticket_entry(&t, Uuid::new_v4(), Uuid::new_v4(), &period()).unwrap_err(),
            PostingError::NoIncomeLines("OPD-0412768".into())
        );
    }

    #[test]
    fn test_build_entry_missing_date() {
        let mut t = ticket(100);
        t.date = None;
        assert_eq!(
            ticket_entry_date(&t),
            Err(PostingError::MissingDate("OPD-0412768".into()))
        );
    }
}
