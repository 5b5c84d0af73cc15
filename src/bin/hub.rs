use clap::{Parser, Subcommand, ValueEnum};
use plant_monitoring::{
    config::{Config, read_config_file},
    engine::AlertingEngine,
    storage::{Severity, StorageBackend, open_backend},
    util::get_config_path,
};
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (falls back to PLANT_MONITOR_CONFIG, then built-in defaults)
    #[arg(short)]
    file: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Restart all persisted rules and evaluate them until interrupted
    Run,

    /// Put a plant under monitoring and keep evaluating until interrupted
    Register {
        #[arg(long)]
        plant: i64,
    },

    /// Print the active alarms of a plant
    Alarms {
        #[arg(long)]
        plant: i64,

        #[arg(long, value_enum)]
        severity: Option<SeverityArg>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SeverityArg {
    Problem,
    Warning,
    Recommendation,
}

impl From<SeverityArg> for Severity {
    fn from(arg: SeverityArg) -> Self {
        match arg {
            SeverityArg::Problem => Severity::Problem,
            SeverityArg::Warning => Severity::Warning,
            SeverityArg::Recommendation => Severity::Recommendation,
        }
    }
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("plant_monitoring", LevelFilter::DEBUG),
        ("plant_hub", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    match args.file.clone().or_else(get_config_path) {
        Some(path) => {
            debug!("reading config from {path}");
            read_config_file(&path)
        }
        None => {
            warn!("no config file given, using defaults");
            Ok(Config::default())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = load_config(&args)?;

    let store = open_backend(&config.storage()).await?;
    let health = store.health_check().await?;
    if !health.healthy {
        anyhow::bail!("storage is not usable: {}", health.message);
    }
    debug!("storage: {}", health.message);

    let engine = AlertingEngine::from_config(store.clone(), &config.engine());

    let result = match args.command.unwrap_or(Command::Run) {
        Command::Run => run(&engine, None).await,
        Command::Register { plant } => run(&engine, Some(plant)).await,
        Command::Alarms { plant, severity } => {
            print_alarms(&engine, plant, severity.map(Severity::from)).await
        }
    };

    if let Err(e) = store.close().await {
        error!("could not close storage: {e}");
    }

    result
}

async fn run(engine: &AlertingEngine, plant: Option<i64>) -> anyhow::Result<()> {
    let report = engine.bootstrap().await?;
    if report.failed > 0 {
        warn!("{} rule instance(s) could not be started", report.failed);
    }

    if let Some(plant_id) = plant {
        let instances = engine.register_plant(plant_id).await?;
        info!("plant {plant_id} registered with {} rule(s)", instances.len());
    }

    info!(
        "evaluating {} rule(s), press ctrl-c to stop",
        engine.registry().running_count().await
    );
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    engine.shutdown().await;
    Ok(())
}

async fn print_alarms(
    engine: &AlertingEngine,
    plant_id: i64,
    severity: Option<Severity>,
) -> anyhow::Result<()> {
    let messages = engine.list_alarms(plant_id, severity).await?;
    if messages.is_empty() {
        println!("no active alarms for plant {plant_id}");
    }
    for message in messages {
        println!("{message}");
    }
    Ok(())
}
