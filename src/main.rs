mod ai;
mod analyzer;
mod config;
mod context;
mod db;
mod error;
mod json_store;
mod migrate;
mod models;
mod offers;
mod pipeline;
mod prompts;
mod report;
mod store;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use models::{AnalysisRecord, Period};
use offers::{OfferFileManager, OfferState};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "setmatch")]
#[command(about = "Analyze job offer PDFs against your profile and track what they cost")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show offer counts per stage and stored analyses
    Status,

    /// List offers waiting for analysis
    List,

    /// Analyze every new offer
    Process {
        /// Do not write cover letters, even for recommended offers
        #[arg(long)]
        skip_cover_letters: bool,
    },

    /// Show analyzed offers ranked by overall rating
    Rank {
        /// Number of offers to show (per day with --by-day)
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Only offers analyzed in this period
        #[arg(long, value_enum, default_value = "all")]
        since: Period,

        /// Group offers by the day they were analyzed
        #[arg(long)]
        by_day: bool,
    },

    /// Show the full analysis of an offer
    Show {
        /// Analyzed file name
        file_name: String,
    },

    /// Write (or print the stored) cover letter for an offer
    CoverLetter {
        /// Analyzed file name
        file_name: String,

        /// Write the letter to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Move an in-progress offer to the archive
    Archive {
        /// File name in the in-progress stage
        file_name: String,
    },

    /// Delete archived offers past the retention period
    Cleanup {
        /// Retention in days (defaults to CLEANUP_DAYS)
        #[arg(short, long)]
        days: Option<u32>,

        /// Show what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Show API spend
    Usage,

    /// Copy the JSON document into the SQLite database
    Migrate {
        /// Read the database back and compare every field
        #[arg(long)]
        verify: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "setmatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let offers = OfferFileManager::new(&config.offers_dir, config.max_file_size_mb);

    match cli.command {
        Commands::Status => {
            let store = store::open_store(&config)?;
            println!("Offers: {}", config.offers_dir.display());
            for state in OfferState::ALL {
                let files = offers.list(state)?;
                println!("  {:<12} {:>4}", state.to_string(), files.len());
                if state == OfferState::InProgress {
                    for file in files {
                        println!("    {}", file.file_name());
                    }
                }
            }
            println!("Storage: {}", store.describe());
            println!("  analyses     {:>4}", store.load_all()?.len());
        }

        Commands::List => {
            let listed = offers.list_new()?;
            if listed.offers.is_empty() {
                println!("No new offers in {}.", offers.dir(OfferState::New).display());
            } else {
                println!("{:<50} {:>10}", "FILE", "SIZE");
                println!("{}", "-".repeat(61));
                for offer in &listed.offers {
                    let size = std::fs::metadata(&offer.path).map(|m| m.len()).unwrap_or(0);
                    println!(
                        "{:<50} {:>7} KB",
                        truncate(&offer.file_name(), 48),
                        size.div_ceil(1024)
                    );
                }
            }
            if !listed.skipped.is_empty() {
                println!("\nSkipped:");
                for skipped in &listed.skipped {
                    println!("  {} ({})", skipped.file_name, skipped.reason);
                }
            }
        }

        Commands::Process { skip_cover_letters } => {
            offers.ensure_dirs()?;
            let listed = offers.list_new()?;
            for skipped in &listed.skipped {
                println!("Skipping {} ({})", skipped.file_name, skipped.reason);
            }
            if listed.offers.is_empty() {
                println!("No new offers to process.");
                return Ok(());
            }

            let store = store::open_store(&config)?;
            let spec = ai::resolve_model(&config.model)?;
            let provider = ai::create_provider(&spec, &config)?;
            let analyzer = analyzer::OfferAnalyzer::new(
                provider.as_ref(),
                config.rates,
                config.generation,
            );
            let personal_context = context::load_personal_context(&config.context_dir)?;
            if personal_context.is_empty() {
                warn!(dir = %config.context_dir.display(), "no personal documents found");
            }

            println!(
                "Processing {} offer(s) with {} ({})...",
                listed.offers.len(),
                spec.short_name,
                provider.model_name()
            );
            let pipeline = pipeline::OfferPipeline {
                offers: &offers,
                store: store.as_ref(),
                analyzer: &analyzer,
                personal_context: &personal_context,
                extract_text: pipeline::extract_pdf_text,
                write_cover_letters: !skip_cover_letters,
                today: chrono::Local::now().date_naive(),
            };
            let summary = pipeline.process_all(listed.offers);

            for done in &summary.processed {
                let letter = if done.record.cover_letter.is_some() {
                    " + cover letter"
                } else {
                    ""
                };
                println!(
                    "  OK   {} -> {} ({:.1}){}",
                    done.file.original_name,
                    done.file.file_name(),
                    done.record.total_rating(),
                    letter
                );
            }
            for failed in &summary.failed {
                println!(
                    "  FAIL {} during {}: {:#}",
                    failed.file_name, failed.step, failed.error
                );
            }
            println!(
                "\n{} processed, {} failed.",
                summary.processed.len(),
                summary.failed.len()
            );
        }

        Commands::Rank {
            limit,
            since,
            by_day,
        } => {
            let store = store::open_store(&config)?;
            let now = chrono::Local::now();
            let records = models::ranked(store.load_all()?, since, &now);
            if records.is_empty() {
                println!("No analyses to rank.");
            } else if by_day {
                for (day, records) in models::group_by_day(records, &chrono::Local) {
                    println!("\n{} ({} offers)", day.format("%A %Y-%m-%d"), records.len());
                    print_ranking(&records, limit);
                }
            } else {
                print_ranking(&records, limit);
            }
        }

        Commands::Show { file_name } => {
            let store = store::open_store(&config)?;
            match store.get(&file_name)? {
                Some(record) => print!("{}", report::render_markdown(&record)),
                None => println!("No analysis for '{}'.", file_name),
            }
        }

        Commands::CoverLetter { file_name, output } => {
            let store = store::open_store(&config)?;
            let record = store
                .get(&file_name)?
                .ok_or_else(|| anyhow!("No analysis for '{}'. Run `setmatch process` first.", file_name))?;

            let letter = match record.cover_letter {
                Some(letter) => letter,
                None => {
                    let spec = ai::resolve_model(&config.model)?;
                    let provider = ai::create_provider(&spec, &config)?;
                    let analyzer = analyzer::OfferAnalyzer::new(
                        provider.as_ref(),
                        config.rates,
                        config.generation,
                    );
                    let personal_context = context::load_personal_context(&config.context_dir)?;
                    let letter = analyzer.generate_cover_letter(&record, &personal_context)?;
                    let updated = store.append_cover_letter(&file_name, letter)?;
                    updated
                        .cover_letter
                        .ok_or_else(|| anyhow!("Cover letter for '{}' was not stored", file_name))?
                }
            };

            match output {
                Some(path) => {
                    std::fs::write(&path, &letter.content)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Cover letter written to {}", path.display());
                }
                None => println!("{}", letter.content),
            }
        }

        Commands::Archive { file_name } => {
            let file = offers.find(OfferState::InProgress, &file_name)?;
            let archived = offers.archive(&file)?;
            let store = store::open_store(&config)?;
            if store.get(&file_name)?.is_none() {
                warn!(file_name = %file_name, "archived offer has no stored analysis");
            }
            println!("Archived {}", archived.path.display());
        }

        Commands::Cleanup { days, dry_run } => {
            let days = days.unwrap_or(config.cleanup_days);
            if dry_run {
                let expired = offers.expired(days)?;
                for file in &expired {
                    println!("  Would delete {}", file.file_name());
                }
                println!("\nTotal that would be removed: {}", expired.len());
            } else {
                let deleted = offers.cleanup(days)?;
                for name in &deleted {
                    println!("  Deleted {}", name);
                }
                println!("\nTotal removed: {}", deleted.len());
            }
        }

        Commands::Usage => {
            let store = store::open_store(&config)?;
            let usage = store.usage_summary()?;
            println!("Requests:       {}", usage.requests_count);
            println!("Analyses:       ${:.4}", usage.analysis_costs);
            println!("Cover letters:  ${:.4}", usage.cover_letter_costs);
            println!("Total:          ${:.4}", usage.total_cost);
        }

        Commands::Migrate { verify } => {
            let source = json_store::JsonStore::new(config.data_dir.join(store::JSON_FILE_NAME));
            let dest = db::SqliteStore::open(config.data_dir.join(store::SQLITE_FILE_NAME))?;
            let report = migrate::migrate(&source, &dest, verify)?;
            println!(
                "Migrated {} analyses from {} to {}",
                report.migrated,
                source.path().display(),
                dest.path().display()
            );
            if verify {
                println!("Verified {} analyses field by field.", report.verified);
            }
        }
    }

    Ok(())
}

fn print_ranking(records: &[AnalysisRecord], limit: usize) {
    println!(
        "{:<5} {:<25} {:<20} {:<6} {:>7}  {:<40}",
        "RANK", "TITLE", "COMPANY", "APPLY", "RATING", "FILE"
    );
    println!("{}", "-".repeat(108));
    for (i, record) in records.iter().take(limit).enumerate() {
        println!(
            "{:<5} {:<25} {:<20} {:<6} {:>7.1}  {:<40}",
            i + 1,
            truncate(record.title(), 23),
            truncate(record.company(), 18),
            if record.should_apply() { "yes" } else { "no" },
            record.total_rating(),
            truncate(&record.file_name, 40)
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cleanup_args() {
        let cli = Cli::try_parse_from(["setmatch", "cleanup", "--days", "0", "--dry-run"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cleanup {
                days: Some(0),
                dry_run: true
            }
        ));
    }

    #[test]
    fn test_rank_args() {
        let cli = Cli::try_parse_from(["setmatch", "rank", "--since", "week", "--by-day"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Rank {
                limit: 10,
                since: Period::Week,
                by_day: true
            }
        ));

        let cli = Cli::try_parse_from(["setmatch", "rank"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Rank {
                since: Period::All,
                by_day: false,
                ..
            }
        ));
        assert!(Cli::try_parse_from(["setmatch", "rank", "--since", "year"]).is_err());
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Société Générale", 10), "Société...");
    }
}
