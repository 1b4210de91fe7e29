//! Emporio service entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use emporio::{Application, BootstrapError};
use emporio_config::ConfigLoader;
use emporio_telemetry::{init_logging, LogConfig};

const DEFAULT_CONFIG_FILE: &str = "emporio.toml";

struct Args {
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Result<Self, String> {
        let mut args = std::env::args().skip(1);
        let mut config = None;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = Some(PathBuf::from(
                        args.next().ok_or("--config needs a path")?,
                    ));
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-V" => {
                    println!("emporio {}", env!("CARGO_PKG_VERSION"));
                    std::process::exit(0);
                }
                other => return Err(format!("unknown argument: {other}")),
            }
        }
        Ok(Self { config })
    }
}

fn print_help() {
    println!(
        r"Emporio backend service

USAGE:
    emporio [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Settings file (TOML or JSON), default ./emporio.toml if present
    -h, --help             Print help
    -V, --version          Print version

ENVIRONMENT:
    EMPORIO__SERVER__HTTP_ADDR          Bind address (default 0.0.0.0:8000)
    EMPORIO__LOGGING__LEVEL             DEBUG | INFO | WARNING | ERROR | CRITICAL
    EMPORIO__AUTH__ENABLED              Require bearer tokens
    EMPORIO__AUTH__KEYCLOAK__URL        Keycloak base URL
    EMPORIO__AUTH__KEYCLOAK__REALM      Keycloak realm
    EMPORIO__DATABASE__DSN              PostgreSQL DSN"
    );
}

async fn run(args: Args) -> Result<(), BootstrapError> {
    let loader = ConfigLoader::new().with_defaults();
    let loader = match &args.config {
        Some(path) => loader.with_file(path)?,
        None => loader.with_optional_file(DEFAULT_CONFIG_FILE)?,
    };
    let config = loader.with_dotenv()?.with_env_prefix("EMPORIO").load()?;

    init_logging(&LogConfig::from_settings(&config))?;
    tracing::info!(
        environment = %config.app.environment,
        auth_enabled = config.auth.enabled,
        database = config.database.dsn.is_some(),
        addr = %config.server.http_addr,
        "starting emporio"
    );

    Application::from_config(&config).await?.run().await
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("emporio: {e}\nUse --help for usage information");
            return ExitCode::from(2);
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "emporio stopped with an error");
            eprintln!("emporio: {e}");
            ExitCode::FAILURE
        }
    }
}
