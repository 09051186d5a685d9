use std::path::PathBuf;
use std::process::ExitCode;

use clap::{arg, command, Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use valuable::Valuable;

use gas_relayer::loggable::LoggableError;

#[derive(Debug, Parser, Valuable)]
#[command(version)]
struct Args {
    /// Set the paths for config file lookup. Can be defined multiple times (configs get merged)
    #[arg(short, long, default_values_os_t = vec![PathBuf::from("~/.gas-relayer/config.toml"), PathBuf::from("config.toml")])]
    pub config: Vec<PathBuf>,

    /// Set the output style of the logs
    #[arg(short, long, value_enum, default_value_t = Output::Text)]
    pub output: Output,

    #[clap(subcommand)]
    pub cmd: Option<SubCommand>,
}

#[derive(Debug, Clone, Parser, ValueEnum, Valuable)]
enum Output {
    Text,
    Json,
}

#[derive(Debug, Subcommand, Valuable)]
enum SubCommand {
    /// Run the relay daemon (default)
    Daemon,
    /// Validate the configuration and the registries it describes, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Args = Args::parse();
    set_up_logger(&args.output);

    let result = match args.cmd {
        Some(SubCommand::Daemon) | None => {
            info!(args = args.as_value(), "starting daemon");

            let result = gas_relayer::run(&args.config).await;
            info!("shutting down");
            result.map(|()| None)
        }
        Some(SubCommand::CheckConfig) => gas_relayer::check_config(&args.config).map(Some),
    };

    match result {
        Ok(response) => {
            if let Some(resp) = response {
                info!("{}", resp);
            }
            ExitCode::SUCCESS
        }
        Err(report) => {
            error!(err = LoggableError::from(&report).as_value(), "{report:#}");

            // print detailed error report as the last output if in text mode
            if matches!(args.output, Output::Text) {
                eprintln!("{report:?}");
            }

            ExitCode::FAILURE
        }
    }
}

fn set_up_logger(output: &Output) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match output {
        Output::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .flatten_event(true)
                .init();
        }
        Output::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .compact()
                .init();
        }
    };
}
