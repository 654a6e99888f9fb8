use clap::{Parser, Subcommand, ValueEnum};
use restorer::config::Config;
use restorer::error::{RestoreError, Result};
use restorer::models::download::format_bytes;
use restorer::models::{ModelManager, Provisioned, WeightStatus};
use restorer::utils::{derive_output_filename_with, display_thumbnail, validate_image_path};
use restorer::ImageEnhancer;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "restorer")]
#[command(about = "Upscale images and restore faces with pretrained models", long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/restorer/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enhance a single image
    Enhance {
        /// Input image (jpg, jpeg, png, bmp, tiff)
        input: PathBuf,
        /// Output path (default: <input>_enhanced.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Mode::Faces)]
        mode: Mode,
        /// Also write a display-sized preview here
        #[arg(long)]
        thumbnail: Option<PathBuf>,
        /// Fail instead of fetching missing weights
        #[arg(long)]
        no_download: bool,
    },
    /// Manage pretrained weights
    Models {
        #[command(subcommand)]
        action: ModelsAction,
    },
}

#[derive(Subcommand)]
enum ModelsAction {
    /// Download missing weights (all, or one by name)
    Download { name: Option<String> },
    /// Check weights exist and match their recorded checksums
    Verify,
    /// Show registered weights
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Super-resolution only
    Upscale,
    /// Face restoration over an upscaled background
    Faces,
}

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging() {
    // ONNX Runtime is chatty at info level
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,ort=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => {
            if !path.exists() {
                return Err(RestoreError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            Config::load_from(path)?
        }
        None => Config::load()?,
    };

    match cli.command {
        Commands::Enhance {
            input,
            output,
            mode,
            thumbnail,
            no_download,
        } => run_enhance(config, input, output, mode, thumbnail, no_download).await,
        Commands::Models { action } => run_models(&config, action).await,
    }
}

async fn run_enhance(
    config: Config,
    input: PathBuf,
    output: Option<PathBuf>,
    mode: Mode,
    thumbnail: Option<PathBuf>,
    no_download: bool,
) -> Result<()> {
    if !no_download {
        let mut manager = ModelManager::new(&config)?.with_progress(std::io::stderr().is_terminal());
        let report = manager.download_all().await?;
        for (name, e) in &report.failed {
            eprintln!("Warning: could not download {name}: {e}");
        }
    }

    validate_image_path(&input)?;
    let output = output.unwrap_or_else(|| derive_output_filename_with(&input, &config.output.suffix));
    let thumbnail_size = config.output.thumbnail_size;

    let (result, output) = tokio::task::spawn_blocking(move || {
        let enhancer = ImageEnhancer::from_config(&config)?;
        let result = match mode {
            Mode::Upscale => enhancer.upscale_image(&input, &output)?,
            Mode::Faces => enhancer.enhance_faces(&input, &output)?,
        };
        Ok::<_, RestoreError>((result, output))
    })
    .await
    .map_err(|e| RestoreError::Other(format!("Enhancement task panicked: {e}")))??;

    println!(
        "✓ Enhanced image saved to {} ({}x{})",
        output.display(),
        result.width(),
        result.height()
    );

    if let Some(path) = thumbnail {
        restorer::utils::create_output_dir(&path)?;
        display_thumbnail(&result, thumbnail_size).save(&path)?;
        println!("✓ Preview saved to {}", path.display());
    }

    Ok(())
}

async fn run_models(config: &Config, action: ModelsAction) -> Result<()> {
    let mut manager = ModelManager::new(config)?.with_progress(std::io::stderr().is_terminal());

    match action {
        ModelsAction::Download { name: Some(name) } => match manager.download(&name).await? {
            Provisioned::AlreadyPresent(path) => {
                println!("{name} already present at {}", path.display());
            }
            Provisioned::Downloaded(installed) => {
                println!(
                    "✓ Downloaded {name} ({})",
                    format_bytes(installed.size_bytes)
                );
            }
        },
        ModelsAction::Download { name: None } => {
            let report = manager.download_all().await?;
            for name in &report.downloaded {
                println!("✓ Downloaded {name}");
            }
            for name in &report.skipped {
                println!("{name} already present");
            }
            for (name, e) in &report.failed {
                eprintln!("✗ {name}: {e}");
            }
            if !report.is_complete() {
                return Err(RestoreError::Other(format!(
                    "{} weight(s) could not be downloaded",
                    report.failed.len()
                )));
            }
        }
        ModelsAction::Verify => {
            let reports = manager.verify()?;
            let mut all_ready = true;
            for report in &reports {
                match &report.status {
                    WeightStatus::Ready => {
                        println!("✓ {} ({})", report.name, report.path.display());
                    }
                    WeightStatus::Missing => {
                        all_ready = false;
                        println!("✗ {} missing at {}", report.name, report.path.display());
                    }
                    WeightStatus::ChecksumMismatch { expected, actual } => {
                        all_ready = false;
                        println!(
                            "✗ {} checksum mismatch (expected {expected}, found {actual})",
                            report.name
                        );
                    }
                }
            }
            if !all_ready {
                return Err(RestoreError::Other(
                    "Some weights are not ready. Run: restorer models download".to_string(),
                ));
            }
        }
        ModelsAction::List => {
            for (weight, installed) in manager.list() {
                let state = installed.map_or_else(
                    || "not installed".to_string(),
                    |w| format!("{}, downloaded {}", format_bytes(w.size_bytes), w.downloaded_at),
                );
                println!("{:<10} {}  [{state}]", weight.name, weight.path.display());
                println!("{:<10} {}", "", weight.url);
            }
        }
    }

    Ok(())
}
