//! WhisperBench CLI Entry Point
//!
//! Provides command-line access to the transcription pipeline and the
//! benchmark history.
//!
//! # Usage
//!
//! ```bash
//! # Download and transcribe a video
//! whisperbench process https://www.youtube.com/watch?v=jNQXAC9IVRw
//!
//! # Use a larger model with language auto-detection
//! whisperbench process <URL> --model small --language auto
//!
//! # Print a stored transcript
//! whisperbench transcript 6f1c2a7e-4b53-4d0e-9a51-0c3b8e2f9d14
//!
//! # Show all recorded benchmarks
//! whisperbench history --benchmark-dir benchmarks
//! ```

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use colored::Colorize;
use log::{error, info};

use whisperbench::benchmark::ResultStore;
use whisperbench::config::Settings;
use whisperbench::environment::require_tools;
use whisperbench::transcription::{TranscriptArchive, TranscriptionService};
use whisperbench::{APP_NAME, VERSION};

/// Programs that must be installed before processing a video.
const REQUIRED_TOOLS: &[&str] = &["ffmpeg"];

#[derive(Debug, PartialEq)]
enum Action {
    Process(String),
    Transcript(String),
    History,
}

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    action: Action,
    config_path: Option<PathBuf>,
    benchmark_dir: Option<PathBuf>,
    uploads_dir: Option<PathBuf>,
    model: Option<String>,
    language: Option<String>,
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Benchmarked Video Transcription");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: whisperbench [OPTIONS] <COMMAND>");
    println!();
    println!("Commands:");
    println!("  process <URL>          Download a video and generate its transcript");
    println!("  transcript <VIDEO_ID>  Print a stored transcript as JSON");
    println!("  history                List recorded transcription benchmarks");
    println!();
    println!("Options:");
    println!("  --config PATH          Load settings from a YAML file");
    println!("  --benchmark-dir PATH   Directory for benchmark records");
    println!("  --uploads-dir PATH     Directory for downloaded media and transcripts");
    println!("  --model NAME           Speech-to-text model (tiny, base, small, medium, large)");
    println!("  --language CODE        Language hint, or 'auto' to detect");
    println!("  --verbose              Enable debug logging");
    println!("  --help                 Show this help message");
    println!("  --version              Show version information");
    println!();
    println!("Examples:");
    println!("  whisperbench process https://www.youtube.com/watch?v=jNQXAC9IVRw");
    println!("  whisperbench --model small process <URL>");
    println!("  whisperbench history --benchmark-dir benchmarks");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut positionals: Vec<String> = Vec::new();
    let mut config_path = None;
    let mut benchmark_dir = None;
    let mut uploads_dir = None;
    let mut model = None;
    let mut language = None;
    let mut verbose = false;
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--verbose" | "-v" => {
                verbose = true;
            }
            "--config" | "--benchmark-dir" | "--uploads-dir" | "--model" | "--language" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    return Err(format!("{} requires a value", arg));
                };
                match arg.as_str() {
                    "--config" => config_path = Some(PathBuf::from(value)),
                    "--benchmark-dir" => benchmark_dir = Some(PathBuf::from(value)),
                    "--uploads-dir" => uploads_dir = Some(PathBuf::from(value)),
                    "--model" => model = Some(value.clone()),
                    _ => language = Some(value.clone()),
                }
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => positionals.push(arg.clone()),
        }
        i += 1;
    }

    let action = match positionals.as_slice() {
        [cmd, url] if cmd == "process" => Action::Process(url.clone()),
        [cmd, id] if cmd == "transcript" => Action::Transcript(id.clone()),
        [cmd] if cmd == "history" => Action::History,
        [cmd] if cmd == "process" => return Err("process requires a video URL".to_string()),
        [cmd] if cmd == "transcript" => return Err("transcript requires a video id".to_string()),
        [] => return Err("No command given".to_string()),
        [cmd, ..] => return Err(format!("Unexpected arguments for '{}'", cmd)),
    };

    Ok(Config {
        action,
        config_path,
        benchmark_dir,
        uploads_dir,
        model,
        language,
        verbose,
    })
}

/// Loads settings and applies command-line overrides.
fn resolve_settings(config: &Config) -> Result<Settings, Box<dyn std::error::Error>> {
    let mut settings = match &config.config_path {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    if let Some(dir) = &config.benchmark_dir {
        settings.benchmark_dir = dir.clone();
    }
    if let Some(dir) = &config.uploads_dir {
        settings.uploads_dir = dir.clone();
    }
    if let Some(model) = &config.model {
        settings.model = model.clone();
    }
    if let Some(language) = &config.language {
        settings.language = match language.as_str() {
            "auto" | "none" => None,
            code => Some(code.to_string()),
        };
    }

    settings.validate()?;
    Ok(settings)
}

fn process(settings: Settings, url: &str) -> Result<(), Box<dyn std::error::Error>> {
    require_tools(REQUIRED_TOOLS)?;

    info!("Benchmark directory: {}", settings.benchmark_dir.display());
    info!("Uploads directory: {}", settings.uploads_dir.display());

    let mut service = TranscriptionService::from_settings(settings)?;
    let processed = service.process(url).map_err(|e| {
        error!("Processing failed: {}", e);
        e
    })?;

    println!();
    println!("{}", "Video processed successfully".green().bold());
    println!("  Video id:   {}", processed.video_id);
    println!("  Title:      {}", processed.video_title);
    if let Some(path) = &processed.video_path {
        println!("  Video:      {}", path.display());
    }
    println!("  Audio:      {}", processed.audio_path.display());
    println!("  Transcript: {}", processed.transcript_path.display());
    println!("  Words:      {}", processed.word_count);
    Ok(())
}

fn print_transcript(settings: &Settings, video_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let archive = TranscriptArchive::new(settings.uploads_dir.clone());
    let transcript = archive.load(video_id)?;
    println!("{}", serde_json::to_string_pretty(&transcript)?);
    Ok(())
}

fn print_history(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let store = ResultStore::open(&settings.benchmark_dir);
    let history = store.history()?;

    if history.is_empty() {
        println!("No benchmarks recorded in {}", store.output_dir().display());
        return Ok(());
    }

    println!(
        "{:<28} {:<20} {:>9} {:>8} {:>8}  {}",
        "Operation", "Started", "Time (s)", "CPU avg", "CPU max", "GPUs"
    );

    for record in &history {
        let gpus = record.gpu_summary.as_ref().map_or(0, |g| g.len());
        let line = format!(
            "{:<28} {:<20} {:>9.2} {:>7.1}% {:>7.1}%  {}",
            record.operation_name,
            record.started_at.format("%Y-%m-%d %H:%M:%S"),
            record.execution_time_seconds,
            record.cpu_summary.avg,
            record.cpu_summary.max,
            gpus
        );

        match &record.error {
            Some(err) => println!("{} {}", line.red(), format!("({})", err).red()),
            None => println!("{}", line),
        }
    }

    println!();
    println!("{} record(s) in {}", history.len(), store.cumulative_log_path().display());
    Ok(())
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);

    let settings = resolve_settings(&config)?;

    match &config.action {
        Action::Process(url) => {
            print_banner();
            process(settings, url)
        }
        Action::Transcript(id) => print_transcript(&settings, id),
        Action::History => print_history(&settings),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
