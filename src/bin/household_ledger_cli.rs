use std::{env, process, sync::Arc};

use colored::Colorize;

use household_ledger::{
    config::ConfigManager,
    core::{services::ProcessReport, Household, SystemClock},
    domain::Period,
    init_with_filter,
    storage::JsonLedgerStore,
    utils::build_info,
};

fn main() {
    if let Err(err) = run() {
        eprintln!("{} {err}", "Error:".red().bold());
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print_usage();
        process::exit(1);
    };

    if command == "version" {
        let meta = build_info::current();
        println!("{} {}", "Household Ledger".bold(), meta.version);
        println!("  Build hash : {}", meta.git_hash);
        println!("  Built at   : {}", meta.timestamp);
        println!("  Profile    : {}", meta.profile);
        return Ok(());
    }

    let manager = ConfigManager::new();
    let config = manager.load()?;
    init_with_filter(config.log_filter.as_deref());

    let store = Arc::new(JsonLedgerStore::open(manager.data_file(&config))?);
    let household = Household::with_policy(store, Arc::new(SystemClock), config.failure_policy);

    match command.as_str() {
        "process-due" => {
            let report = household.recurrence.process_due()?;
            print_report(&report);
            if !report.is_complete() {
                return Err(format!("{} template(s) failed", report.failures.len()).into());
            }
        }
        "summary" => {
            let (Some(month), Some(year)) = (args.get(1), args.get(2)) else {
                print_usage();
                process::exit(1);
            };
            let period = Period::new(month.parse()?, year.parse()?)
                .ok_or_else(|| format!("month must be between 1 and 12, got {month}"))?;
            let shared_only = args.iter().skip(3).any(|flag| flag == "--shared-only");
            let summary = household.settlement.monthly_summary(period, shared_only)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        "seed" => {
            let created = household.categories.seed_defaults()?;
            if created == 0 {
                println!("{} categories already present", "•".yellow());
            } else {
                println!("{} seeded {created} categories", "✔".green());
            }
        }
        "add-user" => {
            let Some(username) = args.get(1) else {
                print_usage();
                process::exit(1);
            };
            let display_name = args
                .get(2)
                .filter(|value| !value.starts_with("--"))
                .map(String::as_str)
                .unwrap_or_default();
            let is_admin = args.iter().skip(2).any(|flag| flag == "--admin");
            let user = household.users.add(username, display_name, is_admin)?;
            println!("{} added {} ({})", "✔".green(), user.display_name, user.id);
        }
        _ => {
            print_usage();
            process::exit(1);
        }
    }

    Ok(())
}

fn print_report(report: &ProcessReport) {
    println!(
        "{} {}: examined {}, created {}, skipped {}",
        "✔".green(),
        report.run_date,
        report.examined,
        report.created.len(),
        report.skipped
    );
    for expense in &report.created {
        println!("  + {} {}", expense.description, expense.amount);
    }
    for failure in &report.failures {
        println!(
            "  {} {}: {}",
            "✘".red(),
            failure.template_id,
            failure.error
        );
    }
}

fn print_usage() {
    eprintln!(
        "Usage: household_ledger_cli <command>\n\
         Commands:\n  \
         process-due\n  \
         summary <month> <year> [--shared-only]\n  \
         seed\n  \
         add-user <username> [display name] [--admin]\n  \
         version"
    );
}
