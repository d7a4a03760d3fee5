//! Config runtime CLI.
//!
//! `watch` keeps a demo config in sync with its file until SIGINT/SIGTERM,
//! reloading every config on SIGHUP. `dump` prints the Value tree of a file.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use config_store::config::loader::load_settings;
use config_store::lifecycle::signals::{SignalEvent, Signals};
use config_store::observability::logging;
use config_store::{config_enum, ConfigRuntime, Configurable, RuntimeSettings, SchemaBuilder};

#[derive(Parser)]
#[command(name = "config-store")]
#[command(about = "Keeps config objects in sync with their files", long_about = None)]
struct Cli {
    /// Runtime settings file (TOML)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a demo config until interrupted
    Watch {
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        #[arg(short, long, default_value = "demo")]
        name: String,

        /// Preferred file format (json or toml)
        #[arg(short, long)]
        format: Option<String>,
    },
    /// Print the Value tree of a config file
    Dump { file: PathBuf },
}

config_enum! {
    #[derive(Default)]
    enum Mode {
        #[default]
        Normal,
        Quiet,
        Verbose,
    }
}

#[derive(Debug)]
struct DemoConfig {
    greeting: String,
    interval_secs: u32,
    mode: Mode,
    tags: Vec<String>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            greeting: "hello".to_string(),
            interval_secs: 30,
            mode: Mode::Normal,
            tags: Vec::new(),
        }
    }
}

impl Configurable for DemoConfig {
    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema.field("greeting", |c| &c.greeting, |c| &mut c.greeting);
        schema
            .field("interval_secs", |c| &c.interval_secs, |c| &mut c.interval_secs)
            .rename("intervalSeconds");
        schema.field("mode", |c| &c.mode, |c| &mut c.mode);
        schema.field("tags", |c| &c.tags, |c| &mut c.tags);
    }

    fn changed(&self) {
        tracing::info!(
            greeting = %self.greeting,
            interval_secs = self.interval_secs,
            mode = ?self.mode,
            tags = ?self.tags,
            "Demo config changed"
        );
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => load_settings(path)?,
        None => RuntimeSettings::default(),
    };
    logging::init(&settings.log_filter);

    match cli.command {
        Commands::Watch {
            data_dir,
            name,
            format,
        } => watch(settings, data_dir, &name, format.as_deref()),
        Commands::Dump { file } => dump(&file),
    }
}

fn watch(
    mut settings: RuntimeSettings,
    data_dir: Option<PathBuf>,
    name: &str,
    format: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(dir) = data_dir {
        settings.data_dir = dir;
    }
    tracing::info!("config-store v{} starting", env!("CARGO_PKG_VERSION"));

    let runtime = ConfigRuntime::start(settings)?;
    let preferred: Vec<&str> = format.into_iter().collect();
    let config = runtime.config_for(name, &preferred)?;
    let store = config.generated::<DemoConfig>()?;
    store.read(|demo| tracing::info!(path = %config.path().display(), config = ?demo, "Demo config loaded"));

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(async {
        let mut signals = Signals::install()?;
        loop {
            match signals.next().await {
                SignalEvent::Reload => {
                    for handle in runtime.trigger_load_all()? {
                        handle.finished().await?;
                    }
                    tracing::info!("Configs reloaded");
                }
                SignalEvent::Shutdown => break,
            }
        }
        Ok::<_, Box<dyn std::error::Error>>(())
    })?;

    runtime.shutdown();
    tracing::info!("Shutdown complete");
    Ok(())
}

fn dump(file: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let providers = config_store::config::ProviderRegistry::with_defaults();
    let provider = providers
        .for_path(file)
        .ok_or_else(|| format!("no provider for {}", file.display()))?;
    let text = std::fs::read_to_string(file)?;
    let value = provider.decode(&text)?;
    println!("{value:#?}");
    Ok(())
}
