// text2image - generate watermarked images from the command line or a browser

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use imagent::{ImageGenerator, PreviewGenerator, StableDiffusionGenerator};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use text2image::config::{Backend, ModelVersion, StudioConfig};
use text2image::studio::{
    ArtifactWriter, GenerationRequest, Progress, Style, StudioError, WatermarkFont, Watermarker,
};
use text2image::{Studio, server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Text-to-image studio with prompt filtering, watermarking and metadata", long_about = None)]
struct Cli {
    /// Configuration file (defaults to <config dir>/text2image/config.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Generation backend
    #[arg(long, value_enum, global = true)]
    backend: Option<Backend>,

    /// Stable Diffusion version
    #[arg(long, value_enum, global = true)]
    model_version: Option<ModelVersion>,

    /// Force CPU usage (default: use GPU if available)
    #[arg(long, global = true)]
    cpu: bool,

    /// Directory for PNG, JPG and JSON outputs
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate images once and exit
    Generate(GenerateArgs),
    /// Serve the browser front end
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Text prompt describing the scene
    #[arg(short, long)]
    prompt: String,

    /// What to avoid in the image
    #[arg(short, long, default_value = text2image::studio::types::DEFAULT_NEGATIVE_PROMPT)]
    negative_prompt: String,

    /// Artistic style
    #[arg(short, long, default_value = "photorealistic", value_parser = parse_style)]
    style: Style,

    /// Number of variations (1-4)
    #[arg(long, default_value_t = 1)]
    num_images: usize,

    /// Guidance scale (3.0-15.0, step 0.5)
    #[arg(short, long, default_value_t = 7.5)]
    guidance_scale: f64,

    /// Diffusion steps (10-50, step 5)
    #[arg(long, default_value_t = 30)]
    steps: usize,

    /// Image height (512, 640 or 768)
    #[arg(long, default_value_t = 512)]
    height: usize,

    /// Image width (512, 640 or 768)
    #[arg(short, long, default_value_t = 512)]
    width: usize,
}

fn parse_style(value: &str) -> Result<Style, String> {
    Style::from_label(value).ok_or_else(|| {
        let known: Vec<&str> = Style::ALL.iter().map(Style::slug).collect();
        format!("unknown style '{value}', expected one of: {}", known.join(", "))
    })
}

/// Exit status for a finished `generate` run; bad requests exit with 2
fn exit_status(result: Result<(), StudioError>) -> anyhow::Result<u8> {
    match result {
        Ok(()) => Ok(0),
        Err(StudioError::Validation(err)) => {
            eprintln!("{err}");
            Ok(2)
        }
        Err(err) => Err(err.into()),
    }
}

fn main() -> anyhow::Result<ExitCode> {
    // .env may carry HF_TOKEN and RUST_LOG
    if let Ok(path) = dotenvy::dotenv() {
        eprintln!("Loaded .env file from: {}", path.display());
    }

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("text2image={log_level},imagent={log_level},tower_http={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = StudioConfig::load(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.model.backend = backend;
    }
    if let Some(version) = cli.model_version {
        config.model.version = version;
    }
    if cli.cpu {
        config.model.cpu = true;
    }
    if let Some(dir) = cli.output_dir {
        config.studio.output_dir = dir;
    }

    match cli.command {
        Command::Generate(args) => {
            let mut studio = build_studio(&config)?;
            let status = exit_status(generate(&mut studio, args))?;
            Ok(ExitCode::from(status))
        }
        Command::Serve { host, port } => {
            let host = host.unwrap_or(config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let addr: SocketAddr = format!("{host}:{port}")
                .parse()
                .with_context(|| format!("invalid listen address {host}:{port}"))?;

            let studio = build_studio(&config)?;
            tokio::runtime::Runtime::new()?.block_on(server::serve(studio, addr))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Load the model once and wire it to the watermarker and writer
fn build_studio(config: &StudioConfig) -> anyhow::Result<Studio> {
    tracing::info!("Backend: {:?}", config.model.backend);

    let generator: Box<dyn ImageGenerator> = match config.model.backend {
        Backend::StableDiffusion => Box::new(
            StableDiffusionGenerator::load(config.model.version.into(), config.model.cpu)
                .context("failed to load Stable Diffusion")?,
        ),
        Backend::Preview => Box::new(PreviewGenerator::new()),
    };
    tracing::info!("Using device: {}", generator.device());

    let font = WatermarkFont::resolve(config.watermark.font_path.as_deref())
        .context("bundled watermark font is unreadable")?;
    let watermarker = Watermarker::new(config.watermark.text.clone(), font);
    tracing::info!(
        "Watermark {:?} using {:?} font",
        watermarker.text(),
        watermarker.font()
    );
    let writer = ArtifactWriter::new(config.studio.output_dir.clone());

    Ok(Studio::new(generator, watermarker, writer))
}

fn generate(studio: &mut Studio, args: GenerateArgs) -> Result<(), StudioError> {
    let request = GenerationRequest {
        prompt: args.prompt,
        negative_prompt: args.negative_prompt,
        style: args.style,
        num_images: args.num_images,
        guidance_scale: args.guidance_scale,
        steps: args.steps,
        height: args.height,
        width: args.width,
    };

    let estimate = match studio.device() {
        imagent::ComputeDevice::Cuda => "a few seconds per image (GPU)",
        imagent::ComputeDevice::Cpu => "around 30-60 seconds per image (CPU, slower)",
    };
    eprintln!(
        "Estimated completion: {estimate} | Steps: {} | Guidance: {}",
        request.steps, request.guidance_scale
    );

    let images = studio.run_with_progress(&request, |stage| {
        let message = match stage {
            Progress::Validated => "Preparing model & pipeline...".to_string(),
            Progress::Generating => "Running diffusion...".to_string(),
            Progress::PostProcessing { index, total } => {
                format!("Post-processing: watermarking & saving image {}/{}", index + 1, total)
            }
            Progress::Completed => "Generation completed.".to_string(),
        };
        eprintln!("[{:>3}%] {}", stage.percent(), message);
    })?;

    for image in &images {
        println!("Variant {}:", image.index + 1);
        println!("  png:      {}", image.artifact.png_path.display());
        println!("  jpg:      {}", image.artifact.jpg_path.display());
        println!("  metadata: {}", image.artifact.metadata_path.display());
    }

    Ok(())
}
