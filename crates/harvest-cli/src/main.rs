use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use harvest_client::{DEFAULT_API_URL, DEFAULT_CATEGORIES, MediaWikiClient};
use harvest_core::entity::EntityRecord;
use harvest_core::scrape::RunStatus;
use harvest_core::{
    EntityKind, Filter, FormattedRecords, Formatter, LoadReport, Loader, ProgressStore,
    RawPageStore, RetryPolicy, ScrapeConfig, ScrapeReport, Scraper, ThrottleConfig,
    ThrottledSource, TracingScrapeReporter,
};
use harvest_db::{Database, DatabaseConfig, EntityRepository};

#[derive(Parser)]
#[command(name = "harvest", version, about = "Conan Exiles wiki entity harvester")]
struct Cli {
    /// Directory holding raw pages, exported records, progress and the default database
    #[arg(long, global = true, env = "HARVEST_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every listed page, resuming from saved progress
    Scrape(ScrapeArgs),

    /// Extract entity records from raw pages into per-kind JSON files
    Format,

    /// Validate exported records and upsert them into the database
    Load,

    /// Scrape, format and load in one go
    Run(ScrapeArgs),

    /// Query stored records of one kind
    Query {
        /// Entity kind (thrall, npc, creature, pet)
        #[arg(short, long)]
        kind: EntityKind,

        /// Filter expression, e.g. "Class=fighter AND Level Rate=fast"
        #[arg(short, long, default_value = "")]
        filter: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Names)]
        format: OutputFormat,
    },

    /// Show scrape progress and stored record counts
    Status,

    /// Forget failed pages so the next scrape retries them
    ResetFailed,
}

#[derive(Args, Clone)]
struct ScrapeArgs {
    /// MediaWiki api.php endpoint
    #[arg(long, env = "HARVEST_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Wiki categories to walk, comma separated
    #[arg(long, env = "HARVEST_CATEGORIES", value_delimiter = ',', default_values = DEFAULT_CATEGORIES)]
    categories: Vec<String>,

    /// Pages fetched in parallel
    #[arg(long, env = "HARVEST_CONCURRENCY", default_value_t = 4,
          value_parser = clap::value_parser!(u16).range(1..=64))]
    concurrency: u16,

    /// Attempts per page before it is marked failed
    #[arg(long, env = "HARVEST_MAX_ATTEMPTS", default_value_t = 5,
          value_parser = clap::value_parser!(u32).range(1..=20))]
    max_attempts: u32,

    /// Minimum spacing between wiki requests, in milliseconds
    #[arg(long, env = "HARVEST_DELAY_MS", default_value_t = 200)]
    delay_ms: u64,

    /// Per-request timeout, in seconds
    #[arg(long, env = "HARVEST_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    /// Pages per listing request
    #[arg(long, default_value_t = 500)]
    batch_limit: u32,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Names,
    Json,
    Csv,
}

/// Where each stage keeps its files under the data directory.
struct Layout {
    data_dir: PathBuf,
}

impl Layout {
    fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    fn records_dir(&self) -> PathBuf {
        self.data_dir.join("records")
    }

    fn progress_path(&self) -> PathBuf {
        self.data_dir.join("progress.json")
    }

    fn default_db_url(&self) -> String {
        format!("sqlite://{}", self.data_dir.join("harvest.db").display())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("harvest=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let layout = Layout {
        data_dir: cli.data_dir,
    };

    match cli.command {
        Commands::Scrape(args) => {
            cmd_scrape(&layout, &args).await?;
        }
        Commands::Format => {
            cmd_format(&layout)?;
        }
        Commands::Load => {
            let records = FormattedRecords::read_dir(&layout.records_dir())
                .context("Failed to read exported records")?;
            cmd_load(&layout, &records).await?;
        }
        Commands::Run(args) => {
            let report = cmd_scrape(&layout, &args).await?;
            if report.status == RunStatus::Cancelled {
                println!("\nScrape interrupted; run again to resume before formatting.");
                return Ok(());
            }
            let records = cmd_format(&layout)?;
            cmd_load(&layout, &records).await?;
        }
        Commands::Query {
            kind,
            filter,
            format,
        } => {
            let filter = Filter::parse(&filter)?;
            let repo = connect_db(&layout).await?;
            cmd_query(&repo, kind, &filter, format).await?;
        }
        Commands::Status => {
            cmd_status(&layout).await?;
        }
        Commands::ResetFailed => {
            let mut progress = ProgressStore::open(layout.progress_path())?;
            let count = progress.reset_failed()?;
            println!("Reset {count} failed page(s); the next scrape will retry them.");
        }
    }

    Ok(())
}

/// Open the SQLite database (DATABASE_URL, else `<data_dir>/harvest.db`) and migrate it.
async fn connect_db(layout: &Layout) -> Result<EntityRepository> {
    std::fs::create_dir_all(&layout.data_dir)
        .with_context(|| format!("Failed to create {}", layout.data_dir.display()))?;
    let config = DatabaseConfig::from_env_or(&layout.default_db_url())?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await?;
    Ok(db.entity_repo())
}

async fn cmd_scrape(layout: &Layout, args: &ScrapeArgs) -> Result<ScrapeReport> {
    let client = MediaWikiClient::with_timeout(&args.api_url, Duration::from_secs(args.timeout_secs))
        .context("Failed to create wiki client")?
        .with_categories(args.categories.iter().map(|c| c.trim().to_string()))
        .with_batch_limit(args.batch_limit);

    let delay = Duration::from_millis(args.delay_ms);
    let source = ThrottledSource::new(client, ThrottleConfig::new(delay).with_jitter(delay / 2));
    let config = ScrapeConfig::default()
        .with_concurrency(usize::from(args.concurrency))
        .with_retry(RetryPolicy {
            max_attempts: args.max_attempts,
            ..RetryPolicy::default()
        });

    let scraper = Scraper::new(source, RawPageStore::new(layout.raw_dir()), config);
    let mut progress = ProgressStore::open(layout.progress_path())?;

    let cancel_token = CancellationToken::new();
    let watcher = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight pages");
            watcher.cancel();
        }
    });

    tracing::info!(api = %args.api_url, categories = ?args.categories, "Scraping");
    let report = scraper
        .run(&mut progress, &cancel_token, &TracingScrapeReporter)
        .await?;

    print_scrape_report(&report);
    Ok(report)
}

fn cmd_format(layout: &Layout) -> Result<FormattedRecords> {
    let store = RawPageStore::new(layout.raw_dir());
    let (records, report) = Formatter::format_dir(&store)?;
    let records_dir = layout.records_dir();
    records
        .write_dir(&records_dir)
        .with_context(|| format!("Failed to write records to {}", records_dir.display()))?;

    println!("\nFormat summary:");
    println!("  raw pages:     {}", report.pages);
    for (kind, count) in records.counts() {
        println!("  {:<14} {count}", format!("{}s:", kind));
    }
    println!("  unrecognized:  {}", report.unrecognized.len());
    println!("  duplicates:    {}", report.duplicates);
    if report.unreadable > 0 {
        println!("  unreadable:    {}", report.unreadable);
    }
    Ok(records)
}

async fn cmd_load(layout: &Layout, records: &FormattedRecords) -> Result<LoadReport> {
    let repo = connect_db(layout).await?;
    let outcomes = Loader::new(repo).load(records.iter()).await?;
    let report = LoadReport::from_outcomes(&outcomes);

    println!("\nLoad summary:");
    println!("  accepted:  {}", report.accepted);
    println!("  inserted:  {}", report.inserted);
    println!("  updated:   {}", report.updated);
    println!("  unchanged: {}", report.unchanged);
    println!("  rejected:  {}", report.rejected.len());
    for (kind, name, page_id, reason) in &report.rejected {
        println!("    [{kind}] '{name}' (page {page_id}): {reason}");
    }
    Ok(report)
}

async fn cmd_query(
    repo: &EntityRepository,
    kind: EntityKind,
    filter: &Filter,
    format: OutputFormat,
) -> Result<()> {
    let records = repo.query(kind, filter).await?;

    match format {
        OutputFormat::Names => {
            if records.is_empty() {
                eprintln!("No {kind} records match '{filter}'");
            }
            for record in &records {
                println!("{}", record.name);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        OutputFormat::Csv => {
            write_csv(std::io::stdout().lock(), kind, &records)?;
        }
    }
    Ok(())
}

async fn cmd_status(layout: &Layout) -> Result<()> {
    let progress_path = layout.progress_path();
    let progress = ProgressStore::load(&progress_path)?;
    let raw_pages = RawPageStore::new(layout.raw_dir()).list()?.len();

    println!("Progress ({}):", progress_path.display());
    println!("  completed pages: {}", progress.completed.len());
    println!("  failed pages:    {}", progress.failed.len());
    match &progress.cursor {
        Some(cursor) => println!("  resume at:       {cursor}"),
        None => println!("  resume at:       start of listing"),
    }
    println!("  raw files:       {raw_pages}");

    let repo = connect_db(layout).await?;
    println!("\nStored records:");
    for kind in EntityKind::ALL {
        println!("  {:<11} {}", format!("{}:", kind.table()), repo.count(kind).await?);
    }
    Ok(())
}

fn print_scrape_report(report: &ScrapeReport) {
    let status = match report.status {
        RunStatus::Done => "complete",
        RunStatus::Cancelled => "interrupted",
    };
    println!("\nScrape {status} (run {}, {:.1}s):", report.run_id, report.duration().as_secs_f64());
    println!("  listed:    {}", report.listed);
    println!("  fetched:   {}", report.fetched);
    println!("  skipped:   {}", report.skipped);
    println!("  failed:    {}", report.failed);
    if report.abandoned > 0 {
        println!("  abandoned: {}", report.abandoned);
    }
    for (page_id, error) in &report.failures {
        println!("    page {page_id}: {error}");
    }
}

/// One row per record, one column per field the kind declares.
fn write_csv<W: Write>(out: W, kind: EntityKind, records: &[EntityRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(kind.fields().iter().map(|f| f.label()))?;
    for record in records {
        writer.write_record(
            kind.fields()
                .iter()
                .map(|f| record.text(*f).unwrap_or_default()),
        )?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use harvest_core::entity::AttributeValue;
    use harvest_core::schema::Field;
    use harvest_core::{PageTask, RawPage};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn query_arguments_parse() {
        let cli = Cli::try_parse_from([
            "harvest",
            "--data-dir",
            "/tmp/h",
            "query",
            "--kind",
            "thrall",
            "--filter",
            "Gender=female",
            "--format",
            "csv",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/h"));
        match cli.command {
            Commands::Query { kind, filter, format } => {
                assert_eq!(kind, EntityKind::Thrall);
                assert_eq!(filter, "Gender=female");
                assert!(matches!(format, OutputFormat::Csv));
            }
            _ => panic!("expected query"),
        }

        assert!(Cli::try_parse_from(["harvest", "query", "--kind", "dragon"]).is_err());
    }

    #[test]
    fn scrape_concurrency_is_bounded() {
        assert!(Cli::try_parse_from(["harvest", "scrape", "--concurrency", "0"]).is_err());
        let cli = Cli::try_parse_from(["harvest", "scrape", "--categories", "Thralls,Pets"]).unwrap();
        match cli.command {
            Commands::Scrape(args) => assert_eq!(args.categories, vec!["Thralls", "Pets"]),
            _ => panic!("expected scrape"),
        }
    }

    #[test]
    fn csv_has_a_column_per_declared_field() {
        let page = RawPage::new(&PageTask::new(3, "Rocknose"), String::new());
        let record = EntityRecord::new(EntityKind::Creature, "Rocknose", (&page).into())
            .with(Field::Health, AttributeValue::Number(2000.0));

        let mut out = Vec::new();
        write_csv(&mut out, EntityKind::Creature, &[record]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("Name,ID,Health,Armor,Incoming Damage Reduction,Killed XP,Temperament,Faction,Notes")
        );
        assert_eq!(lines.next(), Some("Rocknose,,2000,,,,,,"));
    }
}
