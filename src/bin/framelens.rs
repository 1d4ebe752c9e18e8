use std::{fs, path::PathBuf, sync::Arc};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

use framelens::{
    AnalysisMode, AnalysisRequest, CompletionBackend, ExtractOptions, FfmpegLogLevel,
    FrameAnalyzer, FrameExtractor, FramelensError, OpenAiBackend, ProgressCallback, ProgressInfo, ServiceConfig,
    VideoSource,
    server::{self, AppState, DEFAULT_VIDEO_PROMPT},
};

const CLI_AFTER_HELP: &str = "Examples:\n  framelens serve --port 8080 --static-dir static\n  framelens analyze clip.webm --prompt \"What happens here?\" --interval 2\n  framelens analyze clip.webm --mode sequential --json --progress\n  framelens frames clip.webm --out frames --interval 1\n  framelens completions zsh > _framelens";

#[derive(Debug, Parser)]
#[command(
    name = "framelens",
    version,
    about = "Sample frames from recorded video and describe them with a multimodal model",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar where supported.
    #[arg(long, global = true)]
    progress: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP service.
    #[command(
        about = "Run the HTTP service",
        after_help = "Configuration is read from the environment (and a .env file):\n  HOST, PORT, UPLOAD_DIR, DEFAULT_MODEL, MAX_UPLOAD_BYTES, STATIC_DIR,\n  OPENAI_API_KEY, OPENAI_BASE_URL, OPENAI_TIMEOUT_SECS, FFMPEG_LOG_LEVEL"
    )]
    Serve {
        /// Bind address (overrides HOST).
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides PORT).
        #[arg(long)]
        port: Option<u16>,
        /// Upload directory (overrides UPLOAD_DIR).
        #[arg(long)]
        upload_dir: Option<PathBuf>,
        /// Directory served at `/` (overrides STATIC_DIR).
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },

    /// Extract frames from a local video and analyse them.
    #[command(about = "Analyse a local video")]
    Analyze {
        /// Input video path.
        video: PathBuf,
        /// Question about the frames.
        #[arg(long, default_value = DEFAULT_VIDEO_PROMPT)]
        prompt: String,
        /// Optional system instruction.
        #[arg(long)]
        system: Option<String>,
        /// Model identifier (defaults to DEFAULT_MODEL).
        #[arg(long)]
        model: Option<String>,
        /// Seconds between sampled frames.
        #[arg(long, default_value_t = 1)]
        interval: u64,
        /// Analysis mode: batch | sequential.
        #[arg(long, default_value = "batch")]
        mode: String,
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Extract sampled frames to a directory.
    #[command(about = "Extract sampled frames")]
    Frames {
        /// Input video path.
        video: PathBuf,
        /// Output directory.
        #[arg(long)]
        out: PathBuf,
        /// Seconds between sampled frames.
        #[arg(long, default_value_t = 1)]
        interval: u64,
        /// Allow overwriting existing frame files.
        #[arg(long)]
        overwrite: bool,
    },

    /// Print video stream metadata.
    #[command(about = "Print video metadata", visible_alias = "probe")]
    Metadata {
        /// Input video path.
        video: PathBuf,
        /// Output metadata as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn default_log_filter(verbose: bool, serving: bool) -> &'static str {
    match (verbose, serving) {
        (true, _) => "debug",
        (false, true) => "info",
        (false, false) => "warn",
    }
}

fn init_logging(global: &GlobalOptions, serving: bool) {
    let filter = default_log_filter(global.verbose, serving);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
}

/// `--log-level` wins over `FFMPEG_LOG_LEVEL`.
fn resolve_ffmpeg_log_level(
    flag: Option<&str>,
    configured: Option<FfmpegLogLevel>,
) -> Result<Option<FfmpegLogLevel>, FramelensError> {
    match flag {
        Some(level) => level.parse::<FfmpegLogLevel>().map(Some),
        None => Ok(configured),
    }
}

fn apply_ffmpeg_log_level(
    global: &GlobalOptions,
    configured: Option<FfmpegLogLevel>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(level) = resolve_ffmpeg_log_level(global.log_level.as_deref(), configured)? {
        framelens::set_ffmpeg_log_level(level);
    }
    Ok(())
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new(message: &'static str) -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        let style =
            ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
        bar.set_style(style.progress_chars("##-"));
        bar.set_message(message);
        Ok(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_with_message("done");
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total {
            self.bar.set_length(total.max(info.current));
        }
        self.bar.set_position(info.current);
    }
}

fn warn(message: String) {
    eprintln!("{} {}", "warning:".yellow().bold(), message.yellow());
}

fn run_serve(
    global: &GlobalOptions,
    host: Option<String>,
    port: Option<u16>,
    upload_dir: Option<PathBuf>,
    static_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ServiceConfig::from_env()?;
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(upload_dir) = upload_dir {
        config.upload_dir = upload_dir;
    }
    if static_dir.is_some() {
        config.static_dir = static_dir;
    }
    apply_ffmpeg_log_level(global, config.ffmpeg_log_level)?;

    if config.completion.api_key.is_none() {
        warn("OPENAI_API_KEY is not set; analysis requests will fail to authenticate".to_string());
    }

    // The blocking HTTP client must be created and dropped outside the runtime.
    let backend: Arc<dyn CompletionBackend> = Arc::new(OpenAiBackend::new(&config.completion)?);
    let state = AppState::new(config, backend.clone())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(server::serve(state));
    drop(runtime);
    drop(backend);

    result?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_analyze(
    global: &GlobalOptions,
    video: PathBuf,
    prompt: String,
    system: Option<String>,
    model: Option<String>,
    interval: u64,
    mode: String,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mode: AnalysisMode = mode.parse()?;
    let config = ServiceConfig::from_env()?;
    apply_ffmpeg_log_level(global, config.ffmpeg_log_level)?;

    let mut request = AnalysisRequest::new(prompt)
        .with_model(model.unwrap_or_else(|| config.default_model.clone()));
    request.system_message = system;

    let backend = OpenAiBackend::new(&config.completion)?;
    let mut analyzer = FrameAnalyzer::new(Arc::new(backend));
    let mut options = ExtractOptions::new();

    let extraction_progress = if global.progress {
        let progress = Arc::new(TerminalProgress::new("extracting")?);
        options = options.with_progress(progress.clone());
        Some(progress)
    } else {
        None
    };

    let extracted = FrameExtractor::new(options).extract(&video, interval)?;
    if let Some(progress) = extraction_progress {
        progress.finish();
    }
    if extracted.is_empty() {
        return Err("Failed to extract frames from video".into());
    }
    if !json {
        eprintln!(
            "{} {}",
            "info:".cyan().bold(),
            format!(
                "Extracted {} frame(s); analysing in {mode} mode with {}",
                extracted.len(),
                request.model
            )
        );
    }

    match mode {
        AnalysisMode::Batch => {
            let text = analyzer.analyze_batch(extracted.frames(), &request)?;
            if json {
                let payload = json!({ "success": true, "result": text });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("{text}");
            }
        }
        AnalysisMode::Sequential => {
            let analysis_progress = if global.progress {
                let progress = Arc::new(TerminalProgress::new("analysing")?);
                analyzer = analyzer.with_progress(progress.clone());
                Some(progress)
            } else {
                None
            };

            let outcomes = analyzer.analyze_sequential(extracted.frames(), &request);
            if let Some(progress) = analysis_progress {
                progress.finish();
            }

            if json {
                let frames: Vec<_> = outcomes
                    .iter()
                    .enumerate()
                    .map(|(index, outcome)| match outcome {
                        Ok(text) => json!({ "frame": index, "result": text }),
                        Err(error) => json!({
                            "frame": index,
                            "error": error.to_string(),
                            "errorKind": error.kind(),
                        }),
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&json!({ "frames": frames }))?);
            } else {
                for (index, outcome) in outcomes.iter().enumerate() {
                    match outcome {
                        Ok(text) => println!("{} {text}", format!("[frame {index}]").green().bold()),
                        Err(error) => println!(
                            "{} {}",
                            format!("[frame {index}]").red().bold(),
                            format!("Error analyzing frame: {error}").red()
                        ),
                    }
                }
            }
        }
    }

    Ok(())
}

fn run_frames(
    global: &GlobalOptions,
    video: PathBuf,
    out: PathBuf,
    interval: u64,
    overwrite: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    apply_ffmpeg_log_level(global, ServiceConfig::from_env()?.ffmpeg_log_level)?;

    if out.exists() {
        warn(format!("writing into existing directory {}", out.display()));
    }
    fs::create_dir_all(&out)?;

    let mut options = ExtractOptions::new();
    let progress = if global.progress {
        let progress = Arc::new(TerminalProgress::new("extracting")?);
        options = options.with_progress(progress.clone());
        Some(progress)
    } else {
        None
    };

    let extracted = FrameExtractor::new(options).extract(&video, interval)?;
    if let Some(progress) = progress {
        progress.finish();
    }

    for frame in extracted.frames() {
        let file_name = frame
            .path()
            .file_name()
            .ok_or("frame file has no name")?;
        let destination = out.join(file_name);
        if destination.exists() && !overwrite {
            return Err(format!(
                "output file already exists: {} (use --overwrite)",
                destination.display()
            )
            .into());
        }
        fs::copy(frame.path(), &destination)?;
        if global.verbose {
            eprintln!("saved frame {} -> {}", frame.index(), destination.display());
        }
    }

    println!(
        "{} {}",
        "success:".green().bold(),
        format!(
            "Extracted {} frame(s) (every {} source frames) to {}",
            extracted.len(),
            extracted.stride(),
            out.display()
        )
        .green()
    );
    Ok(())
}

fn run_metadata(
    global: &GlobalOptions,
    video: PathBuf,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    apply_ffmpeg_log_level(global, ServiceConfig::from_env()?.ffmpeg_log_level)?;

    let source = VideoSource::open(&video)?;
    let metadata = source.metadata();
    if json {
        let payload = json!({
            "format": metadata.format,
            "codec": metadata.codec,
            "width": metadata.width,
            "height": metadata.height,
            "fps": metadata.frames_per_second,
            "frame_count": metadata.frame_count,
            "duration_seconds": metadata.duration.as_secs_f64(),
            "stride_at_1s": metadata.sampling_stride(1),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("Format: {}", metadata.format);
        println!("Duration: {:?}", metadata.duration);
        println!(
            "Video: {}x{} @ {:.2} fps [{}]",
            metadata.width, metadata.height, metadata.frames_per_second, metadata.codec,
        );
        println!("Frames: {}", metadata.frame_count);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            warn(format!("failed to load .env: {error}"));
        }
    }

    let cli = Cli::parse();
    let serving = matches!(cli.command, Commands::Serve { .. });
    init_logging(&cli.global, serving);

    match cli.command {
        Commands::Serve {
            host,
            port,
            upload_dir,
            static_dir,
        } => run_serve(&cli.global, host, port, upload_dir, static_dir)?,
        Commands::Analyze {
            video,
            prompt,
            system,
            model,
            interval,
            mode,
            json,
        } => run_analyze(&cli.global, video, prompt, system, model, interval, mode, json)?,
        Commands::Frames {
            video,
            out,
            interval,
            overwrite,
        } => run_frames(&cli.global, video, out, interval, overwrite)?,
        Commands::Metadata { video, json } => run_metadata(&cli.global, video, json)?,
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "framelens", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_analyze_arguments() {
        let cli = Cli::parse_from([
            "framelens",
            "analyze",
            "clip.webm",
            "--interval",
            "3",
            "--mode",
            "sequential",
            "--verbose",
        ]);
        assert!(cli.global.verbose);
        let Commands::Analyze {
            interval,
            mode,
            prompt,
            ..
        } = cli.command
        else {
            panic!("expected analyze");
        };
        assert_eq!(interval, 3);
        assert_eq!(mode, "sequential");
        assert_eq!(prompt, DEFAULT_VIDEO_PROMPT);
    }

    #[test]
    fn ffmpeg_log_level_flag_overrides_environment() {
        let config = ServiceConfig::from_lookup(|name| {
            (name == "FFMPEG_LOG_LEVEL").then(|| "error".to_string())
        })
        .unwrap();

        assert_eq!(
            resolve_ffmpeg_log_level(None, config.ffmpeg_log_level).unwrap(),
            Some(FfmpegLogLevel::Error)
        );
        assert_eq!(
            resolve_ffmpeg_log_level(Some("quiet"), config.ffmpeg_log_level).unwrap(),
            Some(FfmpegLogLevel::Quiet)
        );
        assert_eq!(resolve_ffmpeg_log_level(None, None).unwrap(), None);
        assert!(resolve_ffmpeg_log_level(Some("loud"), None).is_err());
    }

    #[test]
    fn log_filter_defaults() {
        assert_eq!(default_log_filter(true, false), "debug");
        assert_eq!(default_log_filter(false, true), "info");
        assert_eq!(default_log_filter(false, false), "warn");
    }
}
