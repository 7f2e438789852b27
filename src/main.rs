use anyhow::{bail, Context, Result};
use browser_data_extract::browsers::discover_profiles;
use browser_data_extract::os_unwrap::platform_default;
use browser_data_extract::pipeline::ProfileReport;
use browser_data_extract::{export, progress, registry};
use browser_data_extract::{ArtifactKind, ExtractConfig, Family, OutputFormat, Pipeline, Profile};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "browser-data-extract")]
#[command(about = "Recover and decrypt saved data from Chromium and Firefox profiles", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract and decrypt artifacts from one or more profile directories
    Extract {
        /// Engine family of the profiles
        #[arg(short, long, value_enum)]
        family: Family,

        /// Profile directory (repeatable)
        #[arg(short, long = "profile", required = true)]
        profiles: Vec<PathBuf>,

        /// Artifact kinds (comma-separated). Default: all
        #[arg(short, long, value_enum, value_delimiter = ',')]
        kinds: Vec<ArtifactKind>,

        /// Firefox master password
        #[arg(long)]
        password: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = "./extracted")]
        output: PathBuf,

        /// Output format
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,

        /// JSON config file; flags given here take precedence
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of artifact kinds extracted in parallel
        #[arg(short, long)]
        workers: Option<usize>,

        /// Give up on kinds not started after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,

        /// Browser name for the macOS keychain entry (chrome, edge, brave, ...)
        #[arg(short, long)]
        browser: Option<String>,
    },

    /// List browser profiles found under a data directory
    Discover {
        /// Directory to search (e.g. ~/.config or ~/Library/Application Support)
        #[arg(short, long)]
        root: PathBuf,

        /// How deep to walk
        #[arg(long, default_value_t = 4)]
        max_depth: usize,
    },

    /// List supported (family, kind) pairs
    Kinds,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    match cli.command {
        Commands::Extract {
            family,
            profiles,
            kinds,
            password,
            output,
            format,
            config,
            workers,
            deadline_secs,
            browser,
        } => {
            let mut settings = match config {
                Some(path) => ExtractConfig::load(&path)?,
                None => ExtractConfig::default(),
            };
            if !kinds.is_empty() {
                settings.kinds = kinds;
            }
            if let Some(password) = password {
                settings.master_password = password;
            }
            if let Some(format) = format {
                settings.format = format;
            }
            if let Some(workers) = workers {
                settings.workers = workers;
            }
            if deadline_secs.is_some() {
                settings.deadline_secs = deadline_secs;
            }
            if let Some(browser) = browser {
                settings.browser = browser;
            }

            let profiles: Vec<Profile> = profiles.into_iter().map(|p| Profile::new(family, p)).collect();
            run_extract(&settings, &profiles, &output)?;
        }

        Commands::Discover { root, max_depth } => {
            info!("🔍 Searching for profiles under {:?}", root);
            let found = discover_profiles(&root, max_depth);
            if found.is_empty() {
                warn!("⚠️  No browser profiles found");
            }
            for profile in &found {
                println!("{:<8} {}", profile.family, profile.path.display());
            }
            info!("✅ Found {} profile(s)", found.len());
        }

        Commands::Kinds => {
            for (family, kind) in registry::supported() {
                println!("{:<8} {}", family, kind);
            }
        }
    }

    Ok(())
}

fn run_extract(settings: &ExtractConfig, profiles: &[Profile], output: &Path) -> Result<()> {
    info!("🔓 Extracting {} profile(s) with {:?}", profiles.len(), settings);
    let os = platform_default(&settings.browser);
    info!("🛡️  OS protection backend: {}", os.name());
    let pipeline = Pipeline::new(settings, os.as_ref());

    let bar = progress::create_profile_progress_bar(profiles.len() as u64, "profiles");
    let mut failed = 0;
    for profile in profiles {
        let spinner = progress::create_spinner(&format!("Extracting {}", profile.name()));
        let report = pipeline.run(profile);
        match &report.kinds {
            Ok(_) => progress::finish_with_success(&spinner, &profile.name()),
            Err(e) => {
                progress::finish_with_error(&spinner, &format!("{}: {}", profile.name(), e));
                failed += 1;
            }
        }

        let dir = if profiles.len() > 1 {
            output.join(profile.name())
        } else {
            output.to_path_buf()
        };
        write_report(&report, &dir, settings.format)
            .with_context(|| format!("Failed to write output for {}", profile.name()))?;
        bar.inc(1);
    }
    progress::finish_with_success(&bar, "done");

    if failed == profiles.len() {
        bail!("no profile could be extracted");
    }
    info!("✅ Extraction complete! Output in {:?}", output);
    Ok(())
}

fn write_report(report: &ProfileReport, dir: &Path, format: OutputFormat) -> Result<()> {
    let Ok(outcomes) = &report.kinds else {
        return Ok(());
    };

    for outcome in outcomes {
        match &outcome.result {
            Ok(extraction) => {
                let path = export::write_extraction(dir, report.profile.family, extraction, format)?;
                info!(
                    "📦 {} {}: {} record(s) -> {:?}",
                    report.profile.name(),
                    outcome.kind,
                    extraction.records.len(),
                    path
                );
            }
            Err(e) => error!("❌ {} {}: {}", report.profile.name(), outcome.kind, e),
        }
    }

    if let Some(path) = export::write_diagnostics(dir, report.profile.family, report.extractions())? {
        warn!("⚠️  Row diagnostics written to {:?}", path);
    }
    Ok(())
}
