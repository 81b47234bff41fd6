use anyhow::Context;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct CliArgs {
    config_dir: Option<PathBuf>,
    upload_url: Option<String>,
    silent: bool,
}

fn main() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1).collect())?;

    let root = match args.config_dir {
        Some(dir) => dir,
        None => lyrix::config::config_root()?,
    };
    lyrix::config::ensure_config_dir(&root)?;
    init_logging(&lyrix::config::log_path(&root))?;

    let mut settings = lyrix::config::load_settings(&root)?;
    if let Some(url) = args.upload_url {
        settings.upload_url = Some(url);
    }
    tracing::info!(config = %root.display(), "starting lyrix");

    lyrix::app::run(lyrix::app::AppOptions {
        settings,
        silent: args.silent,
    })
}

/// Logs go to a file; the terminal belongs to the UI.
fn init_logging(path: &std::path::Path) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

fn parse_args(args: Vec<String>) -> anyhow::Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--silent" => out.silent = true,
            "--config" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--config requires a directory");
                };
                out.config_dir = Some(PathBuf::from(value));
            }
            "--upload-url" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--upload-url requires a URL");
                };
                if value.trim().is_empty() {
                    anyhow::bail!("--upload-url cannot be empty");
                }
                out.upload_url = Some(value.trim().to_string());
            }
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument {other}"),
        }
        index += 1;
    }
    Ok(out)
}

fn print_help() {
    println!("Lyrix");
    println!("  --config <dir>      Settings and log directory");
    println!("  --upload-url <url>  Image upload endpoint base URL");
    println!("  --silent            Play without an audio device");
}
