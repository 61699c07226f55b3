use std::fmt;
use std::path::PathBuf;

use serde_json::Value;
use services::api::{self, ApiResponse};
use services::{Clock, ExamConfig, ExamServices, ServiceError};
use storage::sqlite::SqliteRepository;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::info;

mod logging;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    MissingBody { command: &'static str },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::MissingBody { command } => {
                write!(f, "{command} requires a JSON body (or `-` for stdin)")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  app migrate        [--db <sqlite_url>] [--config <path>]");
    eprintln!("  app start-session  '<json>' | -  [--db <sqlite_url>] [--config <path>]");
    eprintln!("  app submit-answers '<json>' | -  [--db <sqlite_url>] [--config <path>]");
    eprintln!("  app serve          [--db <sqlite_url>] [--config <path>]");
    eprintln!();
    eprintln!("serve reads one {{\"route\", \"body\"}} object per line on stdin and");
    eprintln!("writes one {{\"status\", \"body\"}} object per line on stdout.");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_CONFIG, EXAM_DB_URL, EXAM_MAX_CONNECTIONS, EXAM_ACQUIRE_TIMEOUT_SECS,");
    eprintln!("  EXAM_QUESTION_COUNT, EXAM_ALLOWED_CHOICES, EXAM_LOG_LEVEL, EXAM_LOG_FORMAT,");
    eprintln!("  RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Migrate,
    StartSession,
    SubmitAnswers,
    Serve,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "migrate" => Some(Self::Migrate),
            "start-session" => Some(Self::StartSession),
            "submit-answers" => Some(Self::SubmitAnswers),
            "serve" => Some(Self::Serve),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Migrate => "migrate",
            Self::StartSession => "start-session",
            Self::SubmitAnswers => "submit-answers",
            Self::Serve => "serve",
        }
    }

    fn takes_body(self) -> bool {
        matches!(self, Self::StartSession | Self::SubmitAnswers)
    }
}

#[derive(Debug, Default)]
struct Args {
    db_url: Option<String>,
    config_path: Option<PathBuf>,
    body: Option<String>,
}

impl Args {
    fn parse(cmd: Command, args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            config_path: std::env::var("EXAM_CONFIG").ok().map(PathBuf::from),
            ..Self::default()
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = Some(value);
                }
                "--config" => {
                    parsed.config_path = Some(PathBuf::from(require_value(args, "--config")?));
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ if cmd.takes_body() && parsed.body.is_none() && !arg.starts_with("--") => {
                    parsed.body = Some(arg);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        if cmd.takes_body() && parsed.body.is_none() {
            return Err(ArgsError::MissingBody {
                command: cmd.name(),
            });
        }
        Ok(parsed)
    }
}

fn is_memory_url(url: &str) -> bool {
    url == "sqlite::memory:" || url.contains("mode=memory")
}

fn normalize_sqlite_url(raw: String) -> String {
    if is_memory_url(&raw) || raw.starts_with("sqlite://") || raw.starts_with("sqlite:file:") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if is_memory_url(db_url) || db_url.starts_with("sqlite:file:") {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

async fn read_body(raw: &str) -> std::io::Result<String> {
    if raw != "-" {
        return Ok(raw.to_string());
    }
    let mut buf = String::new();
    tokio::io::stdin().read_to_string(&mut buf).await?;
    Ok(buf)
}

async fn write_line(out: &mut tokio::io::Stdout, line: &str) -> std::io::Result<()> {
    out.write_all(line.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await
}

/// Run one request; the returned flag is whether it succeeded.
async fn run_once(
    services: &ExamServices,
    cmd: Command,
    raw_body: &str,
) -> Result<bool, Box<dyn std::error::Error>> {
    let body = read_body(raw_body).await?;
    let response = match serde_json::from_str::<Value>(&body) {
        Ok(body) => api::handle(services, cmd.name(), body).await,
        Err(err) => ApiResponse::from_error(&ServiceError::Validation(err.to_string())),
    };

    let mut out = tokio::io::stdout();
    write_line(&mut out, &serde_json::to_string(&response.body)?).await?;
    Ok(response.is_success())
}

async fn serve(services: &ExamServices) -> Result<(), Box<dyn std::error::Error>> {
    info!("serving JSON-lines requests on stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = api::handle_line(services, &line).await;
        write_line(&mut out, &serde_json::to_string(&response)?).await?;
    }

    info!("stdin closed, shutting down");
    Ok(())
}

async fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(!argv.is_empty());
        }
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let mut iter = argv.into_iter().skip(1);
    let parsed = Args::parse(cmd, &mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let mut config = ExamConfig::load(parsed.config_path.as_deref())?;
    if let Some(db_url) = parsed.db_url {
        config.database_url = db_url;
    }
    config.database_url = normalize_sqlite_url(config.database_url);

    logging::init_logging(&config.log_level, config.log_format)?;

    // Binary glue owns the filesystem; storage only sees a URL.
    prepare_sqlite_file(&config.database_url)?;

    match cmd {
        Command::Migrate => {
            let repo = SqliteRepository::connect_with(&config.database_url, config.pool).await?;
            repo.migrate().await?;
            info!(database_url = %config.database_url, "schema is up to date");
            Ok(true)
        }
        Command::StartSession | Command::SubmitAnswers => {
            let services = ExamServices::connect(&config, Clock::system()).await?;
            let raw = parsed.body.unwrap_or_default();
            run_once(&services, cmd, &raw).await
        }
        Command::Serve => {
            let services = ExamServices::connect(&config, Clock::system()).await?;
            serve(&services).await?;
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(cmd: Command, args: &[&str]) -> Result<Args, ArgsError> {
        let mut iter = args.iter().map(|s| (*s).to_string());
        Args::parse(cmd, &mut iter)
    }

    #[test]
    fn body_commands_require_a_body() {
        assert!(matches!(
            parse(Command::SubmitAnswers, &["--db", "sqlite::memory:"]),
            Err(ArgsError::MissingBody {
                command: "submit-answers"
            })
        ));
        let args = parse(Command::StartSession, &["-", "--db", "x.db"]).unwrap();
        assert_eq!(args.body.as_deref(), Some("-"));
        assert_eq!(args.db_url.as_deref(), Some("x.db"));
    }

    #[test]
    fn serve_rejects_positional_arguments() {
        assert!(matches!(
            parse(Command::Serve, &["{}"]),
            Err(ArgsError::UnknownArg(_))
        ));
        assert!(matches!(
            parse(Command::Migrate, &["--db"]),
            Err(ArgsError::MissingValue { flag: "--db" })
        ));
    }

    #[test]
    fn memory_urls_pass_through() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
        let shared = "sqlite:file:exam?mode=memory&cache=shared".to_string();
        assert_eq!(normalize_sqlite_url(shared.clone()), shared);
        assert!(prepare_sqlite_file(&shared).is_ok());
    }

    #[test]
    fn relative_paths_become_absolute() {
        let url = normalize_sqlite_url("sqlite:exam.sqlite3".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("exam.sqlite3"));
    }
}
