use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lorekeeper::config::Config;
use lorekeeper::db::{BackupStore, Database, ScanStore};
use lorekeeper::error::LoreError;
use lorekeeper::llm::OllamaClient;
use lorekeeper::models::EntityKind;
use lorekeeper::services::{ApproveOutcome, ReviewService, ScanOrchestrator};
use lorekeeper::storage::WriteGuard;

#[derive(Parser)]
#[command(name = "lorekeeper")]
#[command(about = "Keeps role-play lorebooks in sync with what actually happened in chat")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan one chat transcript for new entities
    Scan {
        /// Chat file, relative to the chats directory
        chat_file: String,
        /// Ignore the checkpoint and rescan from the beginning
        #[arg(long)]
        force: bool,
    },
    /// Scan every chat transcript under the chats directory
    ScanAll {
        #[arg(long)]
        force: bool,
    },
    /// List entities waiting for review
    Pending {
        /// Only entities targeting this character file
        #[arg(long)]
        target: Option<String>,
        /// Only entities of this kind (npc, faction, location, item, alias, stat_change)
        #[arg(long)]
        kind: Option<String>,
    },
    /// Approve a queued entity and merge it into its lorebook
    Approve {
        id: i64,
        /// Recorded as the reviewer in the queue
        #[arg(long, default_value = "cli")]
        by: String,
    },
    /// Reject a queued entity
    Reject {
        id: i64,
        #[arg(long, default_value = "cli")]
        by: String,
    },
    /// Map a chat file to the character file its entities should target
    Map {
        chat_file: String,
        character_file: String,
        /// Persona file for alias and stat-change entities
        #[arg(long)]
        persona: Option<String>,
    },
    /// Show recent scan history
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List recorded backups, newest first
    Backups {
        /// Only backups of this source file
        #[arg(long)]
        file: Option<String>,
    },
    /// Restore a file from a recorded backup
    Restore { backup_id: i64 },
    /// Check that the Ollama backend is reachable and the model is installed
    Check,
    /// Delete old backups past the retention window
    CleanupBackups {
        #[arg(long, default_value_t = 30)]
        days: i64,
        #[arg(long, default_value_t = 10)]
        max_per_file: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lorekeeper=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let db = Database::new(&config.database).await?;

    match args.command {
        Command::Scan { chat_file, force } => {
            let llm = OllamaClient::new(&config.llm)?;
            let orchestrator = ScanOrchestrator::new(config, db, llm);
            match orchestrator.scan(&chat_file, force).await {
                Ok(report) => print_report(&report),
                Err(LoreError::ScanInProgress(file)) => {
                    println!("A scan of {file} is already running; try again later.");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::ScanAll { force } => {
            let llm = OllamaClient::new(&config.llm)?;
            let orchestrator = ScanOrchestrator::new(config, db, llm);
            let reports = orchestrator.scan_all(force).await?;
            if reports.is_empty() {
                println!("No chat files found.");
            }
            for report in reports {
                print_report(&report);
            }
        }
        Command::Pending { target, kind } => {
            let kind = match kind.as_deref() {
                Some(raw) => Some(
                    EntityKind::parse(raw)
                        .ok_or_else(|| anyhow::anyhow!("unknown entity kind: {raw}"))?,
                ),
                None => None,
            };
            let service = review_service(&config, db);
            let pending = service.pending(target.as_deref(), kind).await?;
            if pending.is_empty() {
                println!("Nothing pending.");
            }
            for entity in pending {
                let review_marker = if entity
                    .data
                    .get("risk_flags")
                    .map(|f| !f.as_array().map(|a| a.is_empty()).unwrap_or(true))
                    .unwrap_or(false)
                {
                    "  [needs review]"
                } else {
                    ""
                };
                println!(
                    "#{:<5} {:<11} {:<24} -> {}  ({:.0}%){}",
                    entity.id,
                    entity.kind.as_str(),
                    entity.name,
                    entity.target_file,
                    entity.confidence * 100.0,
                    review_marker,
                );
            }
        }
        Command::Approve { id, by } => {
            let service = review_service(&config, db);
            match service.approve(id, Some(&by)).await? {
                ApproveOutcome::Applied(action) => {
                    println!("Entity {id} approved ({}).", action.as_str());
                }
                ApproveOutcome::AlreadyApproved => {
                    println!("Entity {id} was already approved; nothing changed.");
                }
            }
        }
        Command::Reject { id, by } => {
            let service = review_service(&config, db);
            service.reject(id, Some(&by)).await?;
            println!("Entity {id} rejected.");
        }
        Command::Map {
            chat_file,
            character_file,
            persona,
        } => {
            db.set_mapping(&chat_file, &character_file, persona.as_deref())
                .await?;
            match persona {
                Some(persona) => println!("{chat_file} -> {character_file} (persona {persona})"),
                None => println!("{chat_file} -> {character_file}"),
            }
        }
        Command::History { limit } => {
            let scans = db.recent_scans(limit).await?;
            if scans.is_empty() {
                println!("No scans recorded yet.");
            }
            for scan in scans {
                println!(
                    "{}  {:<9}  {:<30} turns={} entities={}{}",
                    scan.scan_date,
                    scan.status.as_str(),
                    scan.chat_file,
                    scan.turns_scanned,
                    scan.entities_found,
                    scan.error_message
                        .map(|e| format!("  ({e})"))
                        .unwrap_or_default(),
                );
            }
        }
        Command::Backups { file } => {
            let backups = db.backups(file.as_deref()).await?;
            if backups.is_empty() {
                println!("No backups recorded.");
            }
            for backup in backups {
                println!(
                    "#{:<5} {}  {}  -> {}",
                    backup.id, backup.created_at, backup.source_path, backup.backup_path
                );
            }
        }
        Command::Restore { backup_id } => {
            let service = review_service(&config, db);
            service.restore_backup(backup_id).await?;
            println!("Backup {backup_id} restored.");
        }
        Command::Check => {
            let llm = OllamaClient::new(&config.llm)?;
            let (ok, message) = llm.test_connection().await;
            println!("{message}");
            if !ok {
                std::process::exit(1);
            }
        }
        Command::CleanupBackups { days, max_per_file } => {
            let service = review_service(&config, db);
            let removed = service.cleanup_backups(days, max_per_file).await?;
            println!("Removed {removed} backup(s).");
        }
    }

    Ok(())
}

fn review_service(config: &Config, db: Database) -> ReviewService {
    let guard = WriteGuard::new(&config.paths.backups_dir);
    ReviewService::new(
        db,
        guard,
        &config.paths.characters_dir,
        &config.paths.personas_dir,
    )
}

fn print_report(report: &lorekeeper::models::ScanReport) {
    println!(
        "{}: {} ({} chunk(s), {} failed) queued={} merged={} suppressed={}{}",
        report.chat_file,
        report.status.as_str(),
        report.chunks_processed + report.chunks_failed,
        report.chunks_failed,
        report.entities_queued,
        report.entities_merged,
        report.entities_suppressed,
        report
            .error_message
            .as_deref()
            .map(|e| format!("  ({e})"))
            .unwrap_or_default(),
    );
}
