use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sparkify_etl::background_jobs::{jobs::WarehousePipelineJob, JobContext, JobScheduler};
use sparkify_etl::config::{AppConfig, CliConfig, FileConfig};
use sparkify_etl::etl::{
    check_schema, ensure_tables, execute, open_warehouse, Operation, OperationOutcome, Progress,
};
use sparkify_etl::server::{run_server, RequestsLoggingLevel, ServerConfig};
use sparkify_etl::{TaskRunner, WarehouseReader};
use tokio_util::sync::CancellationToken;

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(name = "sparkify", version, about = "Load song and activity logs into a star schema")]
struct CliArgs {
    /// Path to a TOML config file. Values in it override command line options.
    #[clap(long, env = "SPARKIFY_CONFIG", global = true, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the warehouse database file. Created when missing.
    #[clap(long, env = "DB_DIR", global = true, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Warehouse database name, stored as `<db-dir>/<db-name>.db`.
    #[clap(long, env = "DB_NAME", global = true)]
    pub db_name: Option<String>,

    /// Root of the song catalog JSON tree.
    #[clap(long, env = "SONG_DATA", global = true, value_parser = parse_path)]
    pub song_data: Option<PathBuf>,

    /// Root of the activity log JSON tree.
    #[clap(long, env = "LOG_DATA", global = true, value_parser = parse_path)]
    pub log_data: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drop every warehouse table and create them again, empty.
    CreateTables,

    /// Create the warehouse tables only if the fact table is missing.
    EnsureSchema,

    /// Load song and log data into the existing tables.
    Etl,

    /// Reset the tables, then load song and log data.
    ResetAndLoad,

    /// Ensure the schema exists, then load song and log data.
    Pipeline,

    /// Validate the live schema and print row counts.
    CheckSchema,

    /// Serve the read dashboard and run the periodic pipeline.
    Serve {
        /// The port to listen on.
        #[clap(short, long, env = "PORT", default_value_t = 5000)]
        port: u16,

        /// The level of logging to perform on each request.
        #[clap(long, default_value = "path")]
        logging_level: RequestsLoggingLevel,

        /// Path to the frontend directory to be statically served.
        #[clap(long)]
        frontend_dir_path: Option<String>,

        /// Do not run the periodic pipeline.
        #[clap(long)]
        no_scheduler: bool,
    },
}

impl CliArgs {
    fn cli_config(&self) -> CliConfig {
        let mut cli = CliConfig {
            db_dir: self.db_dir.clone(),
            db_name: self.db_name.clone(),
            song_data: self.song_data.clone(),
            log_data: self.log_data.clone(),
            port: 5000,
            scheduler_enabled: true,
            ..Default::default()
        };
        if let Command::Serve {
            port,
            logging_level,
            frontend_dir_path,
            no_scheduler,
        } = &self.command
        {
            cli.port = *port;
            cli.logging_level = logging_level.clone();
            cli.frontend_dir_path = frontend_dir_path.clone();
            cli.scheduler_enabled = !no_scheduler;
        }
        cli
    }
}

fn log_outcome(operation: Operation, outcome: &OperationOutcome) {
    if let Some(schema) = outcome.schema {
        info!("{}: schema {:?}", operation, schema);
    }
    if let Some(report) = &outcome.report {
        info!(
            "{}: {} song files ({} records), {} log files ({} events), {} songplays ({} resolved)",
            operation,
            report.song_files,
            report.catalog_records,
            report.log_files,
            report.events,
            report.songplays,
            report.resolved_songplays
        );
        info!(
            "Rows: songplays={} users={} songs={} artists={} time={}",
            report.counts.songplays,
            report.counts.users,
            report.counts.songs,
            report.counts.artists,
            report.counts.time
        );
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    let runner = TaskRunner::new(config.etl_settings());
    let reader = WarehouseReader::new(config.db_path());
    let shutdown_token = CancellationToken::new();

    {
        let token = shutdown_token.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                return;
            }
            info!("Shutdown requested");
            token.cancel();
        });
    }

    let scheduler_enabled = config.scheduler.enabled && !cfg!(feature = "no_scheduler");
    let scheduler_handle = if scheduler_enabled {
        let ctx = JobContext::new(
            shutdown_token.child_token(),
            runner.clone(),
            tokio::runtime::Handle::current(),
        );
        let mut scheduler = JobScheduler::new(shutdown_token.clone(), ctx);
        scheduler.register_job(Arc::new(WarehousePipelineJob::new(
            config.scheduler.interval,
            config.scheduler.retries,
            config.scheduler.retry_delay,
        )));
        Some(tokio::spawn(async move { scheduler.run().await }))
    } else {
        info!("Periodic pipeline disabled");
        None
    };

    let server_config = ServerConfig {
        requests_logging_level: config.logging_level.clone(),
        port: config.port,
        frontend_dir_path: config.frontend_dir_path.clone(),
    };
    let server_token = shutdown_token.clone();
    let result = run_server(server_config, reader, runner, async move {
        server_token.cancelled().await
    })
    .await;

    shutdown_token.cancel();
    if let Some(handle) = scheduler_handle {
        if let Err(e) = handle.await {
            error!("Scheduler task failed: {}", e);
        }
    }
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.cli_config(), file_config)?;
    info!("Using warehouse {:?}", config.db_path());

    let operation = match cli_args.command {
        Command::CreateTables => Operation::CreateTables,
        Command::EnsureSchema => {
            let mut warehouse = open_warehouse(&config.db_path())?;
            let action = ensure_tables(&mut warehouse)?;
            info!("Schema: {:?}", action);
            return Ok(());
        }
        Command::Etl => Operation::Etl,
        Command::ResetAndLoad => Operation::ResetAndLoad,
        Command::Pipeline => Operation::Pipeline,
        Command::CheckSchema => {
            let counts = check_schema(&config.db_path())?;
            println!("{}", serde_json::to_string_pretty(&counts)?);
            return Ok(());
        }
        Command::Serve { .. } => return serve(config).await,
    };

    let outcome = execute(operation, &config.etl_settings(), &Progress::silent())
        .with_context(|| format!("Operation {} failed", operation))?;
    log_outcome(operation, &outcome);
    Ok(())
}
