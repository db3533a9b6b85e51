//! ypost command-line interface

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ypost::config::Config;
use ypost::paths::parse_file_size;
use ypost::progress::ConsoleProgress;
use ypost::Orchestrator;

#[derive(Parser)]
#[command(
    name = "ypost",
    version,
    about = "Post files to Usenet with yEnc encoding, PAR2/SFV recovery and NZB generation"
)]
struct Cli {
    /// Config file (default: ./config.yaml, ~/.ypost/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Post a file to Usenet
    Post(PostArgs),
    /// Write a sample configuration file
    Config {
        /// Destination path
        #[arg(default_value = "config.yaml")]
        path: PathBuf,
    },
}

#[derive(Args)]
struct PostArgs {
    /// File to post
    file: PathBuf,

    /// Newsgroup(s) to post to, comma-separated
    #[arg(short, long)]
    group: Option<String>,

    /// Name of the poster
    #[arg(long)]
    poster_name: Option<String>,

    /// Email address of the poster
    #[arg(long)]
    poster_email: Option<String>,

    /// Subject template
    #[arg(short, long)]
    subject: Option<String>,

    /// Maximum size per part (bytes or e.g. "750KB")
    #[arg(long)]
    max_part_size: Option<String>,

    /// Maximum size per NNTP article (bytes or e.g. "500KB")
    #[arg(long)]
    max_article_size: Option<String>,

    /// Maximum yEnc line length
    #[arg(long)]
    max_line_length: Option<usize>,

    /// Create PAR2 recovery files
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    par2: Option<bool>,

    /// Create an SFV checksum file
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    sfv: Option<bool>,

    /// PAR2 redundancy percentage
    #[arg(long)]
    redundancy: Option<u32>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// NZB output directory
    #[arg(long)]
    nzb_dir: Option<PathBuf>,
}

fn init_logging(verbosity: u8, log_dir: Option<&PathBuf>) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ypost={}", level)));

    let file_layer = log_dir.and_then(|dir| {
        std::fs::create_dir_all(dir).ok()?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("ypost.log"))
            .ok()?;
        Some(
            fmt::layer()
                .with_writer(Arc::new(file))
                .with_ansi(false),
        )
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(verbosity > 0))
        .with(file_layer)
        .try_init();
}

fn apply_overrides(config: &mut Config, args: &PostArgs) -> Result<(), String> {
    if let Some(group) = &args.group {
        config.posting.group = group.clone();
    }
    if let Some(name) = &args.poster_name {
        config.posting.poster_name = name.clone();
    }
    if let Some(email) = &args.poster_email {
        config.posting.poster_email = email.clone();
    }
    if let Some(subject) = &args.subject {
        config.posting.subject_template = subject.clone();
    }
    if let Some(size) = &args.max_part_size {
        config.posting.max_part_size =
            parse_file_size(size).ok_or_else(|| format!("invalid --max-part-size: {}", size))?;
    }
    if let Some(size) = &args.max_article_size {
        config.posting.max_article_size =
            parse_file_size(size).ok_or_else(|| format!("invalid --max-article-size: {}", size))?;
    }
    if let Some(len) = args.max_line_length {
        config.posting.max_line_length = len;
    }
    if let Some(par2) = args.par2 {
        config.features.create_par2 = par2;
    }
    if let Some(sfv) = args.sfv {
        config.features.create_sfv = sfv;
    }
    if let Some(redundancy) = args.redundancy {
        config.par2.redundancy = redundancy;
    }
    if let Some(output) = &args.output {
        config.output.output_dir = output.clone();
    }
    if let Some(nzb_dir) = &args.nzb_dir {
        config.output.nzb_dir = nzb_dir.clone();
    }
    Ok(())
}

async fn run_post(cli: &Cli, args: &PostArgs) -> Result<PathBuf, String> {
    let mut config =
        Config::load(cli.config.as_deref()).map_err(|e| format!("error loading config: {}", e))?;
    apply_overrides(&mut config, args)?;

    init_logging(cli.verbose, Some(&config.output.log_dir));
    debug!(file = %args.file.display(), "Starting post");

    if !args.file.exists() {
        return Err(format!("file does not exist: {}", args.file.display()));
    }

    let file_size = std::fs::metadata(&args.file)
        .map(|m| m.len())
        .map_err(|e| e.to_string())?;
    let article_size = config.posting.effective_article_size().max(1);
    let total_chunks = file_size.div_ceil(article_size).max(1);
    let file_name = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let progress = Arc::new(ConsoleProgress::new(&file_name, total_chunks, file_size));

    let orchestrator = Orchestrator::new(config).map_err(|e| e.to_string())?;
    orchestrator
        .post_file(&args.file, progress)
        .await
        .map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match &cli.command {
        Command::Post(args) => match run_post(&cli, args).await {
            Ok(nzb_path) => {
                println!("NZB file: {}", nzb_path.display());
                ExitCode::SUCCESS
            }
            Err(message) => {
                eprintln!("Error: {}", message);
                ExitCode::FAILURE
            }
        },
        Command::Config { path } => {
            init_logging(cli.verbose, None);
            match Config::write_sample(path) {
                Ok(()) => {
                    println!("Sample configuration written to {}", path.display());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}
