use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type AccountId = Uuid;
pub type JournalId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Cash, bank, receivables
    Asset,
    Liability,
    /// Revenue accounts credited by ticket lines
    Income,
    Expense,
    Equity,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Asset => "asset",
            AccountType::Liability => "liability",
            AccountType::Income => "income",
            AccountType::Expense => "expense",
            AccountType::Equity => "equity",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "asset" => Some(AccountType::Asset),
            "liability" => Some(AccountType::Liability),
            "income" => Some(AccountType::Income),
            "expense" => Some(AccountType::Expense),
            "equity" => Some(AccountType::Equity),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A ledger account identified by a short unique code (e.g. "101100").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(code: impl Into<String>, name: impl Into<String>, account_type: AccountType) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            name: name.into(),
            account_type,
            created_at: Utc::now(),
        }
    }
}

/// A journal groups entries and owns their numbering sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    pub id: JournalId,
    pub code: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Journal {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }

    /// Sequence counter key for entries posted in `year`.
    pub fn sequence_key(&self, year: i32) -> String {
        format!("journal:{}:{}", self.code, year)
    }

    /// Name of the `number`-th entry posted in `year`, e.g. `SAJ/2024/0007`.
    pub fn entry_name(&self, year: i32, number: i64) -> String {
        format!("{}/{}/{:04}", self.code, year, number)
    }
}
