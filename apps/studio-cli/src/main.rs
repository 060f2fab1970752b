use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use studio::generation::{GenerationKind, TokioTimer};
use studio::optimistic::ContentItem;
use studio::scene_cache::{FileStorage, SceneContentCache};
use studio::studio_api::{HttpRequestPort, NoopUnauthorized, TracingNotifier};
use studio::timerange::TimeRange;
use studio::{Orchestrator, StudioConfig, StudioPorts};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shortplay")]
#[command(about = "Short-play authoring CLI - headless content and generation operations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the script and audio content of a scene
    Content {
        scene: String,

        /// Series the scene belongs to (overrides the config)
        #[arg(long)]
        series: Option<String>,
    },

    /// Run a generation job, waiting for video jobs to finish
    Generate {
        /// script, image, voice, sound or video
        kind: GenerationKind,

        #[arg(short, long)]
        scene: String,

        #[arg(short, long)]
        prompt: String,

        #[arg(long)]
        series: Option<String>,
    },

    /// Show the cached preview of a scene
    Preview {
        scene: String,

        #[arg(long)]
        series: Option<String>,
    },

    /// Parse and validate a time range such as 00:05-00:12
    CheckRange { text: String },

    /// Write a default config file
    InitConfig { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Content { scene, series } => {
            let config = load_config(cli.config.as_deref())?;
            content_command(config, series, scene).await
        }
        Commands::Generate {
            kind,
            scene,
            prompt,
            series,
        } => {
            let config = load_config(cli.config.as_deref())?;
            generate_command(config, series, scene, kind, prompt).await
        }
        Commands::Preview { scene, series } => {
            let config = load_config(cli.config.as_deref())?;
            preview_command(config, series, scene)
        }
        Commands::CheckRange { text } => check_range_command(&text),
        Commands::InitConfig { path } => init_config_command(&path),
    }
}

/// `RUST_LOG` wins over the defaults.
fn init_logging(verbose: bool) {
    let default = if verbose {
        "shortplay=debug,studio=debug,generation=debug,optimistic=debug,notice=info"
    } else {
        "shortplay=info,studio=info,generation=info,notice=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: Option<&Path>) -> Result<StudioConfig> {
    let config = match path {
        Some(path) => StudioConfig::load(path)?,
        None => StudioConfig::default(),
    };
    Ok(config.with_env_overrides())
}

fn build_studio(config: &StudioConfig, series: Option<String>) -> Result<Orchestrator> {
    let mut http = HttpRequestPort::new(config.api_base_url.clone(), config.request_timeout())
        .context("building HTTP client")?;
    if let Some(token) = &config.api_token {
        http = http.with_token(token.clone());
    }

    let storage = Arc::new(FileStorage::new(&config.cache_dir));
    let cache = SceneContentCache::open(storage)
        .with_context(|| format!("opening scene cache in {}", config.cache_dir.display()))?;

    let studio = Orchestrator::new(
        config,
        StudioPorts {
            request: Arc::new(http),
            notifier: Arc::new(TracingNotifier),
            unauthorized: Arc::new(NoopUnauthorized),
            timer: Arc::new(TokioTimer),
            cache,
        },
    );
    if let Some(series) = series {
        studio.select_series(series);
    }
    if studio.series_id().is_none() {
        bail!("no series selected; pass --series or set series_id in the config");
    }
    Ok(studio)
}

async fn content_command(
    config: StudioConfig,
    series: Option<String>,
    scene: String,
) -> Result<()> {
    let studio = build_studio(&config, series)?;
    studio.select_scene(scene.clone());

    studio
        .load_scene_content(&scene)
        .await
        .context("loading script")?;
    studio
        .load_audio_content(&scene)
        .await
        .context("loading audio")?;

    let script = studio.script_items();
    let audio = studio.audio_items();
    info!(scene = %scene, script = script.len(), audio = audio.len(), "content loaded");

    println!("Script");
    print_items(&script);
    println!("Audio");
    print_items(&audio);
    Ok(())
}

fn print_items(items: &[ContentItem]) {
    if items.is_empty() {
        println!("  (empty)");
    }
    for item in items {
        let speaker = item
            .speaker_ref
            .as_ref()
            .map(|voice| format!(" [{}]", voice.as_str()))
            .unwrap_or_default();
        println!(
            "  {:>3}  {}  {:<8} {}{}",
            item.order_index + 1,
            item.time_range().format_plain(),
            item.kind.as_str(),
            item.body,
            speaker
        );
    }
}

async fn generate_command(
    config: StudioConfig,
    series: Option<String>,
    scene: String,
    kind: GenerationKind,
    prompt: String,
) -> Result<()> {
    let studio = build_studio(&config, series)?;
    studio.select_scene(scene.clone());
    studio.set_prompt(prompt);
    info!(kind = %kind, scene = %scene, "starting generation");

    let generate = studio.generate(kind);
    tokio::pin!(generate);
    let outcome = tokio::select! {
        outcome = &mut generate => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, cancelling generation");
            studio.teardown();
            generate.await
        }
    };
    let result = outcome.with_context(|| format!("{kind} generation for scene {scene}"))?;

    if let Some(url) = &result.result_ref {
        println!("result: {url}");
    }
    if let Some(frame) = &result.last_frame {
        println!("last frame: {frame}");
    }
    if let Some(text) = &result.text {
        println!("{text}");
    }
    for option in &result.scenes {
        println!("scene {}: {}", option.id, option.name);
    }
    Ok(())
}

fn preview_command(config: StudioConfig, series: Option<String>, scene: String) -> Result<()> {
    let studio = build_studio(&config, series)?;
    match studio.cached_preview(&scene) {
        Some(entry) => println!("{}", serde_json::to_string_pretty(&entry)?),
        None => println!("no cached preview for scene {scene}"),
    }
    Ok(())
}

fn check_range_command(text: &str) -> Result<()> {
    let range =
        TimeRange::parse_valid(text).with_context(|| format!("invalid time range {text:?}"))?;
    println!(
        "{} ({} ms - {} ms)",
        range.format(),
        range.start_ms(),
        range.end_ms()
    );
    Ok(())
}

fn init_config_command(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    StudioConfig::default().save(path)?;
    info!("Wrote default config to {}", path.display());
    Ok(())
}
