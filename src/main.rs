//! tail-folders - watches folders for log-like files and streams their new
//! lines to stdout.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{ArgAction, Parser, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tail_folders::command;
use tail_folders::config::WatchConfig;
use tail_folders::filter::{ContentFilter, FilenameFilter, FilterError};
use tail_folders::output::{OutputFormat, OutputWriter};
use tail_folders::watcher::FolderWatchManager;

/// The diagnostic log lives in a hidden folder so the tool never tails its
/// own output.
const LOG_DIR: &str = ".logdir";
const LOG_FILE: &str = "tail-folders.log";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FilterByArg {
    Glob,
    Regex,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ContentFilterByArg {
    Include,
    Exclude,
    Regex,
    NoFilter,
}

#[derive(Parser)]
#[command(
    name = "tail-folders",
    about = "Scans a list of folders (recursively by default) and tails any file that matches the filename filter",
    version
)]
struct Cli {
    /// Paths of the folders to watch for log files, separated by comma.
    /// They should not be nested.
    #[arg(long, default_value = ".")]
    folders: String,

    /// Whether discovered subfolders should be watched as well.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    recursive: bool,

    /// Filename filter kind.
    #[arg(long, value_enum, default_value_t = FilterByArg::Glob)]
    filter_by: FilterByArg,

    /// Filter expression to apply on filenames.
    #[arg(long, default_value = "*.log")]
    filter: String,

    /// Content filter kind applied to every line.
    #[arg(long, value_enum, default_value_t = ContentFilterByArg::NoFilter)]
    content_filter_by: ContentFilterByArg,

    /// Content filter expression.
    #[arg(long, default_value = "")]
    content_filter: String,

    /// Optional tag to prepend to each output line.
    #[arg(long, default_value = "")]
    tag: String,

    /// Emit entries as JSON objects instead of raw prefixed lines.
    #[arg(long)]
    json: bool,

    /// Seconds without accepted lines before a folder watch is evicted
    /// (zero or negative disables eviction).
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    inactivity_timeout: i64,

    /// Discard files whose last modification is older than this many
    /// seconds at discovery time (zero or negative disables the check).
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    discard_older_than: i64,

    /// Increase diagnostic log verbosity (-v, -vv).
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,

    /// Command to execute once watching has started; its exit status
    /// becomes this process's exit code.
    #[arg(last = true)]
    command: Vec<String>,
}

fn init_tracing(verbosity: u8) -> std::io::Result<()> {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    std::fs::create_dir_all(LOG_DIR)?;
    let file = File::options()
        .create(true)
        .append(true)
        .open(Path::new(LOG_DIR).join(LOG_FILE))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        .with(filter)
        .init();
    Ok(())
}

fn build_filters(cli: &Cli) -> Result<(FilenameFilter, ContentFilter), FilterError> {
    let filename_filter = match cli.filter_by {
        FilterByArg::Glob => FilenameFilter::glob(cli.filter.trim())?,
        FilterByArg::Regex => FilenameFilter::regex(cli.filter.trim())?,
    };
    let content_filter = match cli.content_filter_by {
        ContentFilterByArg::Include => ContentFilter::include(cli.content_filter.trim()),
        ContentFilterByArg::Exclude => ContentFilter::exclude(cli.content_filter.trim()),
        ContentFilterByArg::Regex => ContentFilter::regex(cli.content_filter.trim())?,
        ContentFilterByArg::NoFilter => ContentFilter::None,
    };
    Ok((filename_filter, content_filter))
}

fn fatal(message: &str) -> ! {
    eprintln!("tail-folders: {message}");
    std::process::exit(1);
}

/// Blocks until an interrupt or termination request arrives.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        if let Ok(mut term) = signal(SignalKind::terminate()) {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        } else {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose) {
        fatal(&format!("failed to open diagnostic log: {e}"));
    }

    let (filename_filter, content_filter) = match build_filters(&cli) {
        Ok(filters) => filters,
        Err(e) => fatal(&e.to_string()),
    };

    let folders: Vec<PathBuf> = cli
        .folders
        .split(',')
        .map(str::trim)
        .filter(|folder| !folder.is_empty())
        .map(PathBuf::from)
        .collect();
    if folders.is_empty() {
        fatal("no folders to watch");
    }

    let config = WatchConfig {
        folders,
        recursive: cli.recursive,
        filename_filter,
        content_filter,
        tag: cli.tag.trim().to_string(),
        format: if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Raw
        },
        inactivity_timeout_secs: cli.inactivity_timeout,
        discard_older_than_secs: cli.discard_older_than,
    };

    tracing::info!(
        folders = %cli.folders,
        recursive = config.recursive,
        filter = %cli.filter,
        content_filter = %cli.content_filter,
        tag = %config.tag,
        inactivity_timeout = cli.inactivity_timeout,
        discard_older_than = cli.discard_older_than,
        command = ?cli.command,
        "arguments in place"
    );

    let (manager, entries) = FolderWatchManager::new(&config);
    for root in &config.folders {
        if let Err(e) = manager.watch(root) {
            fatal(&e.to_string());
        }
    }

    let sink = tokio::spawn(OutputWriter::stdout(config.tag.clone(), config.format).run(entries));

    let exit_code = if cli.command.is_empty() {
        wait_for_shutdown().await;
        0
    } else {
        match command::run(&cli.command[0], &cli.command[1..]).await {
            Ok(code) => code,
            Err(e) => {
                tracing::error!(command = %cli.command[0], error = %e, "failed to start command");
                eprintln!("tail-folders: failed to start command '{}': {e}", cli.command[0]);
                1
            }
        }
    };

    manager.close().await;
    drop(manager);
    let _ = sink.await;
    std::process::exit(exit_code);
}
