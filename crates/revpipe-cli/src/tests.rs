use super::*;

#[test]
fn parses_db_ping_command() {
    let cli = Cli::try_parse_from(["revpipe-cli", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli =
        Cli::try_parse_from(["revpipe-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["revpipe-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn scrape_defaults_leave_limits_unset() {
    let cli = Cli::try_parse_from(["revpipe-cli", "scrape", "talabat"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Scrape {
            source: SourceKind::Talabat,
            limit_per_request: None,
            max_reviews: None,
            dry_run: false
        })
    ));
}

#[test]
fn scrape_accepts_limits_and_dry_run() {
    let cli = Cli::try_parse_from([
        "revpipe-cli",
        "scrape",
        "Instashop",
        "--limit-per-request",
        "25",
        "--max-reviews",
        "100",
        "--dry-run",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Scrape {
            source: SourceKind::Instashop,
            limit_per_request: Some(25),
            max_reviews: Some(100),
            dry_run: true
        })
    ));
}

#[test]
fn scrape_rejects_unknown_source() {
    let result = Cli::try_parse_from(["revpipe-cli", "scrape", "mrsool"]);
    assert!(result.is_err());
}

#[test]
fn parses_audit_command() {
    let cli = Cli::try_parse_from(["revpipe-cli", "audit", "instashop"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Audit {
            source: SourceKind::Instashop
        })
    ));
}

#[test]
fn parses_dispatch_and_summary_publish() {
    let cli = Cli::try_parse_from(["revpipe-cli", "dispatch"]).unwrap();
    assert!(matches!(cli.command, Some(Commands::Dispatch)));

    let cli = Cli::try_parse_from(["revpipe-cli", "summaries", "publish"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Summaries {
            command: SummaryCommands::Publish
        })
    ));
}

fn location(id: i64, talabat_ids: Vec<i32>, client_id: Option<&str>) -> revpipe_core::Location {
    revpipe_core::Location {
        id,
        company_id: 3,
        name: format!("branch {id}"),
        is_active: true,
        instashop_client_id: client_id.map(str::to_string),
        talabat_location_ids: talabat_ids,
        last_scrape_attempt_time: None,
        last_successful_scrape_time: None,
    }
}

#[test]
fn dry_run_plans_one_unit_per_talabat_id() {
    let locations = vec![location(1, vec![10, 11], None), location(2, vec![20], Some("c-2"))];
    let limits = scrape::Limits {
        per_request: 5,
        max_reviews: 100,
    };

    let units = scrape::plan_units(&locations, SourceKind::Talabat, limits);
    let labels: Vec<String> = units.iter().map(|u| u.label()).collect();
    assert_eq!(labels, vec!["talabat:1:10", "talabat:1:11", "talabat:2:20"]);
    assert!(units.iter().all(|u| u.limit_per_request == 5 && u.max_reviews == 100));
}

#[test]
fn dry_run_plans_one_unit_per_instashop_client() {
    let locations = vec![location(1, vec![10], None), location(2, vec![], Some("c-2"))];
    let limits = scrape::Limits {
        per_request: 20,
        max_reviews: 50,
    };

    let units = scrape::plan_units(&locations, SourceKind::Instashop, limits);
    let labels: Vec<String> = units.iter().map(|u| u.label()).collect();
    assert_eq!(labels, vec!["instashop:2:c-2"]);
}
