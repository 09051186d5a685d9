use std::path::PathBuf;
use std::sync::Arc;

use error_stack::{FutureExt, Result, ResultExt};
use ethers_providers::Http;
use thiserror::Error;
use tokio::select;
use tokio::signal::unix::{signal, SignalKind};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use valuable::Valuable;

use crate::asyncutil::task::{cancellable, TaskError, TaskGroup};
use crate::config::Config;
use crate::evm::simulator::ChainSimulator;
use crate::json_rpc::Client;
use crate::loggable::LoggableError;
use crate::registry::{Registries, RegistryHandle};
use crate::relay::Relay;
use crate::transport::whisper::{self, WhisperListener, WhisperReplier};
use crate::transport::MessageEnvelope;

mod asyncutil;
pub mod config;
mod evm;
mod json_rpc;
pub mod loggable;
mod processor;
pub mod registry;
mod relay;
mod transport;
mod types;
mod url;

pub async fn run(config_paths: &[PathBuf]) -> Result<(), Error> {
    let cfg = crate::config::load(config_paths).change_context(Error::LoadConfig)?;
    let app = App::new(cfg, config_paths.to_vec()).await?;

    app.run().await
}

/// Loads the configuration and builds both registries without connecting to any node.
pub fn check_config(config_paths: &[PathBuf]) -> Result<String, Error> {
    let cfg = crate::config::load(config_paths).change_context(Error::LoadConfig)?;
    let registries =
        Registries::new(&cfg.contracts, &cfg.tokens).change_context(Error::Registry)?;

    Ok(format!(
        "configuration is valid: {} contract(s), {} token(s)",
        registries.contracts.len(),
        registries.tokens.iter().count()
    ))
}

type HttpClient = Client<Http>;
type AppRelay = Relay<HttpClient, ChainSimulator<HttpClient>, WhisperReplier<HttpClient>>;

struct App {
    config_paths: Vec<PathBuf>,
    max_in_flight: usize,
    registries: RegistryHandle,
    listener: WhisperListener<HttpClient>,
    envelopes: ReceiverStream<MessageEnvelope>,
    relay: Arc<AppRelay>,
}

impl App {
    async fn new(cfg: Config, config_paths: Vec<PathBuf>) -> Result<Self, Error> {
        let registries = RegistryHandle::new(
            Registries::new(&cfg.contracts, &cfg.tokens).change_context(Error::Registry)?,
        );

        let whisper_client = Arc::new(Client::new_http(&cfg.whisper.rpc_url));
        let key_id = whisper::identity(whisper_client.as_ref(), cfg.whisper.private_key.clone())
            .await
            .change_context(Error::Whisper)?;

        let (listener, envelopes) = WhisperListener::new(
            whisper_client.clone(),
            key_id.clone(),
            &cfg.whisper,
            registries.subscribe(),
        );
        let replier = WhisperReplier::new(whisper_client, key_id, &cfg.whisper);

        let relay = Relay::builder()
            .chain(Client::new_http(&cfg.chain_rpc_url))
            .simulator(ChainSimulator::new(
                Client::new_http(
                    cfg.simulation_rpc_url
                        .as_ref()
                        .unwrap_or(&cfg.chain_rpc_url),
                ),
                cfg.simulation_account.unwrap_or(cfg.relay_account),
            ))
            .transport(replier)
            .registries(registries.clone())
            .relay_account(cfg.relay_account)
            .timeouts(cfg.timeouts.clone())
            .receipt_poll_interval(cfg.receipt_poll_interval)
            .build();

        Ok(Self {
            config_paths,
            max_in_flight: cfg.max_in_flight,
            registries,
            listener,
            envelopes,
            relay: Arc::new(relay),
        })
    }

    async fn run(self) -> Result<(), Error> {
        let Self {
            config_paths,
            max_in_flight,
            registries,
            listener,
            envelopes,
            relay,
        } = self;

        info!(topics = registries.snapshot().topics().len(), "relay started");

        TaskGroup::new("gas-relayer")
            .add_task(
                "signal-handler",
                cancellable(move |token| handle_signals(config_paths, registries, token)),
            )
            .add_task(
                "whisper-listener",
                cancellable(|token| listener.run(token).change_context(Error::Listener)),
            )
            .add_task(
                "request-processor",
                // ends once the listener stops and the envelopes it buffered are handled
                cancellable(move |_| {
                    processor::consume_envelopes(relay, envelopes, max_in_flight)
                        .change_context(Error::Processor)
                }),
            )
            .run(CancellationToken::new())
            .await
    }
}

/// Returns on SIGINT or SIGTERM, which takes the whole task group down. SIGHUP reloads both
/// registries from the config files; a reload that fails leaves the current registries in place.
async fn handle_signals(
    config_paths: Vec<PathBuf>,
    registries: RegistryHandle,
    token: CancellationToken,
) -> Result<(), Error> {
    let mut sigint = signal(SignalKind::interrupt()).change_context(Error::Signals)?;
    let mut sigterm = signal(SignalKind::terminate()).change_context(Error::Signals)?;
    let mut sighup = signal(SignalKind::hangup()).change_context(Error::Signals)?;

    loop {
        select! {
            _ = token.cancelled() => return Ok(()),
            _ = sigint.recv() => break,
            _ = sigterm.recv() => break,
            _ = sighup.recv() => {
                info!("reloading registries");

                if let Err(err) = reload_registries(&config_paths, &registries) {
                    error!(
                        err = LoggableError::from(&err).as_value(),
                        "failed to reload registries, keeping the current ones"
                    );
                }
            }
        }
    }

    info!("signal received, waiting for in-flight requests to finish");

    Ok(())
}

fn reload_registries(config_paths: &[PathBuf], registries: &RegistryHandle) -> Result<(), Error> {
    let cfg = crate::config::load(config_paths).change_context(Error::LoadConfig)?;
    let reloaded =
        Registries::new(&cfg.contracts, &cfg.tokens).change_context(Error::Registry)?;

    info!(topics = reloaded.topics().len(), "registries reloaded");
    registries.publish(reloaded);

    Ok(())
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to load config")]
    LoadConfig,
    #[error("invalid registry configuration")]
    Registry,
    #[error("failed to set up the whisper transport")]
    Whisper,
    #[error("whisper listener failed")]
    Listener,
    #[error("request processor failed")]
    Processor,
    #[error("failed to install signal handlers")]
    Signals,
    #[error("task execution failed")]
    Task(#[from] TaskError),
}
