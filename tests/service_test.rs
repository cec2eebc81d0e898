mod common;

use anyhow::Result;
use common::{confirmed_ticket, parse_date, test_service, StandardBooks};
use opdpost::application::AppError;
use opdpost::domain::{AccountType, PeriodState, Ticket};

#[tokio::test]
async fn test_accounts_and_journals() -> Result<()> {
    let (service, _temp) = test_service().await?;

    service
        .create_account("400100".into(), "Consultation".into(), AccountType::Income)
        .await?;
    service
        .create_account("101100".into(), "Cash".into(), AccountType::Asset)
        .await?;

    let result = service
        .create_account("101100".into(), "Cash again".into(), AccountType::Asset)
        .await;
    assert!(matches!(result, Err(AppError::AccountAlreadyExists(code)) if code == "101100"));

    let accounts = service.list_accounts().await?;
    let codes: Vec<&str> = accounts.iter().map(|a| a.code.as_str()).collect();
    assert_eq!(codes, vec!["101100", "400100"]);
    assert_eq!(service.get_account("400100").await?.account_type, AccountType::Income);
    assert!(matches!(
        service.get_account("999").await,
        Err(AppError::AccountNotFound(_))
    ));

    service.create_journal("SAJ".into(), "Sales".into()).await?;
    assert!(matches!(
        service.create_journal("SAJ".into(), "Dup".into()).await,
        Err(AppError::JournalAlreadyExists(_))
    ));
    assert_eq!(service.list_journals().await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_generate_year_periods() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let periods = service.generate_year_periods(2024).await?;
    assert_eq!(periods.len(), 13);

    let listed = service.list_periods().await?;
    assert_eq!(listed.len(), 13);
    assert_eq!(listed[0].code, "00/2024");
    assert!(listed[0].special);
    let feb = listed.iter().find(|p| p.code == "02/2024").unwrap();
    assert_eq!(feb.date_start, parse_date("2024-02-01"));
    assert_eq!(feb.date_stop, parse_date("2024-02-29"));

    // Generating the same year twice fails without touching the first set
    assert!(matches!(
        service.generate_year_periods(2024).await,
        Err(AppError::PeriodAlreadyExists(code)) if code == "00/2024"
    ));
    assert_eq!(service.list_periods().await?.len(), 13);

    Ok(())
}

#[tokio::test]
async fn test_period_lookup_prefers_normal_periods() -> Result<()> {
    let (service, _temp) = test_service().await?;
    service.generate_year_periods(2024).await?;

    let period = service
        .find_period_for_date(parse_date("2024-01-01"))
        .await?
        .unwrap();
    assert_eq!(period.code, "01/2024");

    let period = service
        .find_period_for_date(parse_date("2024-12-31"))
        .await?
        .unwrap();
    assert_eq!(period.code, "12/2024");

    assert!(service
        .find_period_for_date(parse_date("2025-01-01"))
        .await?
        .is_none());

    Ok(())
}

#[tokio::test]
async fn test_special_period_used_when_alone() -> Result<()> {
    let (service, _temp) = test_service().await?;
    service
        .create_period(
            "13/2024".into(),
            Some("Closing 2024".into()),
            parse_date("2024-12-31"),
            parse_date("2024-12-31"),
            true,
        )
        .await?;

    let period = service
        .find_period_for_date(parse_date("2024-12-31"))
        .await?
        .unwrap();
    assert_eq!(period.code, "13/2024");
    assert_eq!(period.name, "Closing 2024");

    Ok(())
}

#[tokio::test]
async fn test_create_period_validation() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let result = service
        .create_period(
            "BAD".into(),
            None,
            parse_date("2024-03-31"),
            parse_date("2024-03-01"),
            false,
        )
        .await;
    assert!(matches!(result, Err(AppError::InvalidPeriodRange { .. })));

    let period = service
        .create_period(
            "Q1".into(),
            None,
            parse_date("2024-01-01"),
            parse_date("2024-03-31"),
            false,
        )
        .await?;
    assert_eq!(period.name, "Q1");
    assert!(period.is_open());

    let closed = service.close_period("Q1").await?;
    assert_eq!(closed.state, PeriodState::Closed);
    assert_eq!(service.list_periods().await?[0].state, PeriodState::Closed);
    assert!(matches!(
        service.close_period("Q9").await,
        Err(AppError::PeriodNotFound(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_tickets() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardBooks::create(&service).await?;

    confirmed_ticket(&service, "OPD-0412768", "2024-03-14", 8000).await?;
    assert!(service.ticket_exists("OPD-0412768").await?);
    assert!(!service.ticket_exists("OPD-1").await?);

    let ticket = service.get_ticket("OPD-0412768").await?;
    assert!(ticket.is_confirmed());
    assert_eq!(ticket.total_cents, 8000);
    assert_eq!(ticket.lines.len(), 1);
    assert_eq!(ticket.lines[0].item_name.as_deref(), Some("Consultation"));

    let duplicate = service
        .create_ticket(Ticket::new("OPD-0412768", None, 100))
        .await;
    assert!(matches!(duplicate, Err(AppError::TicketAlreadyExists(_))));
    assert_eq!(service.list_tickets().await?.len(), 1);

    assert!(matches!(
        service.get_ticket("OPD-404").await,
        Err(AppError::TicketNotFound(_))
    ));

    Ok(())
}
