mod cli;
mod config;
mod datasources;
mod db;
mod error;
mod logic;
mod models;

use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use db::Database;
use error::Result;
use logic::{FetchMode, WaterCycleService};
use models::IrrigationEvent;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Initialize logging
    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    // Init needs neither config nor database
    if let Commands::Init = cli.command {
        let path = Config::write_example(cli.config.as_ref())?;
        println!("Example config written to {}", path.display());
        println!("Set METEOCAT_API_KEY (or edit the file) before the first run.");
        return Ok(());
    }

    // Load configuration
    let config = match Config::load(cli.config.clone()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Run `groveops init` to create an example config.");
            std::process::exit(1);
        }
    };

    // Initialize database
    let db = Database::open(Config::db_path(cli.data_dir.as_ref())?)?;

    match cli.command {
        Commands::Run { audit } => {
            let mode = if audit {
                FetchMode::Audit
            } else {
                FetchMode::Live
            };
            let service = WaterCycleService::new(config, db);
            let outcome = service.run(mode).await?;

            let latest = outcome
                .latest_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "none".to_string());
            println!(
                "fetched: {} | latest fact: {} | trees updated: {}",
                outcome.fetched, latest, outcome.trees_updated
            );
        }
        Commands::Check => {
            println!("Config OK: {:?}", config);
            println!("Database: {}", db.path().display());

            let service = WaterCycleService::new(config, db);
            match service.meteocat().test_connection().await {
                Ok(true) => println!("Meteocat: OK"),
                Ok(false) => println!("Meteocat: unexpected response status"),
                Err(e) => println!("Meteocat: FAILED ({})", e),
            }
        }
        Commands::Status => {
            match db.latest_climate_fact(&config.farm.id)? {
                Some(fact) => {
                    println!(
                        "Latest fact: {} | et0 {:.2} | rain {:.1} | pef {:.2} | balance {:.2}{}",
                        fact.date,
                        fact.et0,
                        fact.rain,
                        fact.pef,
                        fact.soil_balance,
                        if fact.is_mock { " (mock)" } else { "" }
                    );
                }
                None => println!("No climate facts recorded yet."),
            }

            let trees = db.viable_trees()?;
            if trees.is_empty() {
                println!("No viable trees registered.");
            } else {
                println!("Viable trees ({}):", trees.len());
                for tree in trees {
                    println!(
                        "  {:<12} balance {:>7.2}  anchor {:>7.2}  last advanced {}",
                        tree.id,
                        tree.soil_balance.unwrap_or(0.0),
                        tree.start_of_day_balance.unwrap_or(0.0),
                        tree.last_balance_update
                            .map(|ts| ts.date_naive().to_string())
                            .unwrap_or_else(|| "never".to_string()),
                    );
                }
            }
        }
        Commands::AddTree { id, diameter, kc } => {
            db.insert_tree(&id, diameter, kc)?;
            println!("Tree '{}' registered.", id);
        }
        Commands::RecordIrrigation {
            tree_id,
            liters,
            date,
        } => {
            let date = match date {
                Some(s) => chrono::DateTime::parse_from_rfc3339(&s)
                    .map_err(|e| {
                        error::GroveOpsError::InvalidData(format!("Bad timestamp '{}': {}", s, e))
                    })?
                    .with_timezone(&chrono::Utc),
                None => chrono::Utc::now(),
            };
            db.insert_irrigation_event(&IrrigationEvent {
                id: None,
                tree_id: tree_id.clone(),
                date,
                liters,
            })?;
            println!("Recorded {:.1} L for tree '{}'.", liters, tree_id);
        }
        Commands::ImportIrrigation { file } => {
            let json = std::fs::read_to_string(&file)?;
            let events: Vec<IrrigationEvent> = serde_json::from_str(&json)?;

            let mut imported = 0;
            for event in &events {
                match db.insert_irrigation_event(event) {
                    Ok(_) => imported += 1,
                    Err(e) => {
                        tracing::warn!(tree_id = %event.tree_id, error = %e, "Skipping event")
                    }
                }
            }
            println!("Imported {} of {} events.", imported, events.len());
        }
        // Handled before config loading
        Commands::Init => {}
    }

    Ok(())
}
