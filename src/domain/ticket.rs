use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{checked_sum, AccountId, Cents};

pub type TicketId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketState {
    Draft,
    Confirmed,
    Cancelled,
}

impl TicketState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketState::Draft => "draft",
            TicketState::Confirmed => "confirmed",
            TicketState::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Some(TicketState::Draft),
            "confirmed" => Some(TicketState::Confirmed),
            "cancelled" | "canceled" => Some(TicketState::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for TicketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One billed item on a ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketLine {
    pub id: Uuid,
    /// Item (service) name; `None` when the line lost its item
    pub item_name: Option<String>,
    /// Income account configured on the item
    pub income_account: Option<AccountId>,
    pub amount_cents: Cents,
}

impl TicketLine {
    pub fn new(
        item_name: Option<String>,
        income_account: Option<AccountId>,
        amount_cents: Cents,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_name,
            income_account,
            amount_cents,
        }
    }
}

/// A business ticket, looked up by its full reference name (`OPD-0412768`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub name: String,
    pub date: Option<NaiveDate>,
    pub state: TicketState,
    pub total_cents: Cents,
    pub lines: Vec<TicketLine>,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    pub fn new(name: impl Into<String>, date: Option<NaiveDate>, total_cents: Cents) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            date,
            state: TicketState::Draft,
            total_cents,
            lines: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_state(mut self, state: TicketState) -> Self {
        self.state = state;
        self
    }

    pub fn with_line(mut self, line: TicketLine) -> Self {
        self.lines.push(line);
        self
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == TicketState::Confirmed
    }

    /// Sum of the positive line amounts, `None` on overflow.
    pub fn lines_total(&self) -> Option<Cents> {
        checked_sum(
            self.lines
                .iter()
                .map(|l| l.amount_cents)
                .filter(|a| *a > 0),
        )
    }
}

/// Parse a ticket date that may carry a time part.
///
/// `"2024-03-05 14:22:10"` and `"2024-03-05T14:22:10Z"` both give
/// 2024-03-05; only the first ten characters are considered. Blank input is
/// `Ok(None)`.
pub fn parse_ticket_date(s: &str) -> Result<Option<NaiveDate>, chrono::ParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    let day = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ticket_date_trims_time() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5);
        assert_eq!(parse_ticket_date("2024-03-05").unwrap(), expected);
        assert_eq!(parse_ticket_date("2024-03-05 14:22:10").unwrap(), expected);
        assert_eq!(parse_ticket_date("2024-03-05T14:22:10Z").unwrap(), expected);
        assert_eq!(parse_ticket_date("  ").unwrap(), None);
        assert!(parse_ticket_date("05/03/2024").is_err());
    }

    #[test]
    fn test_lines_total_ignores_non_positive() {
        let ticket = Ticket::new("OPD-1", None, 1500)
            .with_line(TicketLine::new(Some("Consultation".into()), None, 1000))
            .with_line(TicketLine::new(Some("Discount".into()), None, -200))
            .with_line(TicketLine::new(Some("Lab".into()), None, 500));
        assert_eq!(ticket.lines_total(), Some(1500));
    }

    #[test]
    fn test_state_parsing() {
        assert_eq!(TicketState::from_str("Confirmed"), Some(TicketState::Confirmed));
        assert_eq!(TicketState::from_str("canceled"), Some(TicketState::Cancelled));
        assert_eq!(TicketState::from_str("paid"), None);
        assert!(!Ticket::new("OPD-1", None, 0).is_confirmed());
    }
}
