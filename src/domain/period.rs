use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PeriodId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodState {
    Open,
    Closed,
}

impl PeriodState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodState::Open => "open",
            PeriodState::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open" => Some(PeriodState::Open),
            "closed" => Some(PeriodState::Closed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PeriodState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A dated accounting interval. Both bounds are inclusive.
///
/// Special periods (opening/closing) overlap normal ones and are only used
/// when no normal period covers a date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiscalPeriod {
    pub id: PeriodId,
    pub code: String,
    pub name: String,
    pub date_start: NaiveDate,
    pub date_stop: NaiveDate,
    pub special: bool,
    pub state: PeriodState,
}

impl FiscalPeriod {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        date_start: NaiveDate,
        date_stop: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            name: name.into(),
            date_start,
            date_stop,
            special: false,
            state: PeriodState::Open,
        }
    }

    pub fn with_special(mut self, special: bool) -> Self {
        self.special = special;
        self
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.date_start <= date && date <= self.date_stop
    }

    pub fn is_open(&self) -> bool {
        self.state == PeriodState::Open
    }
}

/// Pick the period a date belongs to.
///
/// Candidates are ordered by start date with special periods first on ties.
/// With `prefer_normal` the first non-special candidate wins; if there is
/// none (or `prefer_normal` is off) the first candidate is used.
pub fn find_period(
    periods: &[FiscalPeriod],
    date: NaiveDate,
    prefer_normal: bool,
) -> Option<&FiscalPeriod> {
    let mut candidates: Vec<&FiscalPeriod> = periods.iter().filter(|p| p.contains(date)).collect();
    candidates.sort_by(|a, b| {
        a.date_start
            .cmp(&b.date_start)
            .then_with(|| b.special.cmp(&a.special))
    });

    if prefer_normal {
        if let Some(normal) = candidates.iter().find(|p| !p.special) {
            return Some(*normal);
        }
    }
    candidates.first().copied()
}

/// Periods for one calendar year: a special opening period on January 1st
/// (`00/YYYY`) followed by twelve monthly periods (`01/YYYY` .. `12/YYYY`).
pub fn calendar_year_periods(year: i32) -> Option<Vec<FiscalPeriod>> {
    let jan_first = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let mut periods = vec![
        FiscalPeriod::new(
            format!("00/{}", year),
            format!("Opening Period {}", year),
            jan_first,
            jan_first,
        )
        .with_special(true),
    ];

    for month in 0..12u32 {
        let start = jan_first.checked_add_months(Months::new(month))?;
        let stop = start.checked_add_months(Months::new(1))?.pred_opt()?;
        periods.push(FiscalPeriod::new(
            format!("{:02}/{}", start.month(), year),
            start.format("%B %Y").to_string(),
            start,
            stop,
        ));
    }

    Some(periods)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_contains_is_inclusive() {
        let p = FiscalPeriod::new("03/2024", "March", date("2024-03-01"), date("2024-03-31"));
        assert!(p.contains(date("2024-03-01")));
        assert!(p.contains(date("2024-03-31")));
        assert!(!p.contains(date("2024-04-01")));
        assert!(!p.contains(date("2024-02-29")));
    }

    #[test]
    fn test_find_period_prefers_normal() {
        let periods = calendar_year_periods(2024).unwrap();
        let found = find_period(&periods, date("2024-01-01"), true).unwrap();
        assert_eq!(found.code, "01/2024");

        let found = find_period(&periods, date("2024-01-01"), false).unwrap();
        assert_eq!(found.code, "00/2024");
    }

    #[test]
    fn test_find_period_falls_back_to_special() {
        let opening = FiscalPeriod::new("00/2024", "Opening", date("2024-01-01"), date("2024-01-01"))
            .with_special(true);
        let periods = vec![opening];
        let found = find_period(&periods, date("2024-01-01"), true).unwrap();
        assert_eq!(found.code, "00/2024");
    }

    #[test]
    fn test_find_period_none() {
        let periods = calendar_year_periods(2024).unwrap();
        assert!(find_period(&periods, date("2023-12-31"), true).is_none());
    }

    #[test]
    fn test_calendar_year_periods() {
        let periods = calendar_year_periods(2024).unwrap();
        assert_eq!(periods.len(), 13);
        assert!(periods[0].special);

        let feb = &periods[2];
        assert_eq!(feb.code, "02/2024");
        assert_eq!(feb.date_start, date("2024-02-01"));
        assert_eq!(feb.date_stop, date("2024-02-29"));

        let dec = &periods[12];
        assert_eq!(dec.code, "12/2024");
        assert_eq!(dec.date_stop, date("2024-12-31"));
        assert!(periods.iter().all(|p| p.is_open()));
    }
}
