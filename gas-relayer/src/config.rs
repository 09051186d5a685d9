use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::{Config as Cfg, ConfigError, Environment, File, FileFormat, FileSourceFile};
use error_stack::{Report, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::registry::{ContractConfig, TokenConfig};
use crate::relay::Timeouts;
use crate::transport::whisper;
use crate::types::EVMAddress;
use crate::url::Url;

pub const ENV_PREFIX: &str = "GAS_RELAYER";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub chain_rpc_url: Url,
    /// Node that simulations run against. Defaults to `chain_rpc_url`.
    #[serde(default)]
    pub simulation_rpc_url: Option<Url>,
    /// Unlocked account on the chain node that pays for relayed transactions.
    pub relay_account: EVMAddress,
    /// Account simulations run from. Defaults to `relay_account`.
    #[serde(default)]
    pub simulation_account: Option<EVMAddress>,
    pub whisper: whisper::Config,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default = "default_receipt_poll_interval", with = "humantime_serde")]
    pub receipt_poll_interval: Duration,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default)]
    pub contracts: Vec<ContractConfig>,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

fn default_receipt_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_max_in_flight() -> usize {
    64
}

/// Merges the existing files among `paths`, later ones taking precedence, and overrides the
/// result with `GAS_RELAYER_*` environment variables.
pub fn load(paths: &[PathBuf]) -> Result<Config, ConfigError> {
    Cfg::builder()
        .add_source(find_config_files(paths))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?
        .try_deserialize::<Config>()
        .map_err(Report::from)
}

fn find_config_files(paths: &[PathBuf]) -> Vec<File<FileSourceFile, FileFormat>> {
    let files = paths
        .iter()
        .map(expand_home_dir)
        .map(std::fs::canonicalize)
        .filter_map(std::result::Result::ok)
        .inspect(|path| info!("found config file {}", path.to_string_lossy()))
        .map(File::from)
        .collect::<Vec<_>>();

    if files.is_empty() {
        info!("found no config files to load");
    }

    files
}

pub fn expand_home_dir(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let Ok(home_subfolder) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };

    dirs::home_dir().map_or(path.to_path_buf(), |home| home.join(home_subfolder))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::str::FromStr;
    use std::time::Duration;

    use super::{expand_home_dir, load, Config};
    use crate::registry::price::PriceConfig;
    use crate::registry::Registries;
    use crate::types::{EVMAddress, Selector, Topic};

    const CONFIG: &str = r#"
        chain_rpc_url = 'http://localhost:8545'
        simulation_rpc_url = 'http://localhost:8555'
        relay_account = '0x5b9b5db9cde96fda2e2c88e83f1b833f189e01f4'
        max_in_flight = 8

        [whisper]
        rpc_url = 'http://localhost:8546'
        ttl = 10
        poll_interval = '500ms'

        [timeouts]
        receipt = '2m'

        [[contracts]]
        topic = '0x27a78f3e'
        code_fingerprint = '0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470'

        [[contracts.functions]]
        selector = '0x916b6511'
        is_token = true
        params = [
            { name = 'token', type = 'address' },
            { name = 'to', type = 'address' },
            { name = 'value', type = 'uint256' },
            { name = 'nonce', type = 'uint256' },
            { name = 'gasPrice', type = 'uint256' },
            { name = 'gasLimit', type = 'uint256' },
            { name = 'gasToken', type = 'address' },
            { name = 'signature', type = 'bytes' },
        ]

        [[tokens]]
        symbol = 'ETH'
        address = '0x0000000000000000000000000000000000000000'

        [[tokens]]
        symbol = 'SNT'
        address = '0x744d70fdbe2ba4cf95131626614a1763df805b9e'
        price = { type = 'Fixed', factor = '20000' }
    "#;

    #[test]
    fn config_should_deserialize_with_defaults() {
        let config: Config = toml::from_str(CONFIG).unwrap();

        assert_eq!(
            config.relay_account,
            EVMAddress::from_str("0x5b9b5db9cde96fda2e2c88e83f1b833f189e01f4").unwrap()
        );
        assert_eq!(config.simulation_account, None);
        assert!(config.simulation_rpc_url.is_some());
        assert_eq!(config.timeouts.queue, Duration::from_secs(60));
        assert_eq!(config.max_in_flight, 8);
        assert_eq!(config.receipt_poll_interval, Duration::from_secs(1));
        assert_eq!(config.timeouts.receipt, Duration::from_secs(120));
        assert_eq!(config.timeouts.rpc, Duration::from_secs(10));
        assert_eq!(config.whisper.poll_interval, Duration::from_millis(500));
        assert_eq!(config.whisper.ttl, 10);
        assert_eq!(config.contracts.len(), 1);
        assert_eq!(
            config.contracts[0].functions[0].selector,
            Selector::from_str("0x916b6511").unwrap()
        );
        assert_eq!(
            config.tokens[1].price,
            Some(PriceConfig::Fixed {
                factor: "20000".to_string()
            })
        );
    }

    #[test]
    fn config_should_build_registries() {
        let config: Config = toml::from_str(CONFIG).unwrap();

        let registries = Registries::new(&config.contracts, &config.tokens).unwrap();

        assert_eq!(
            registries.topics(),
            vec![Topic::from_str("0x27a78f3e").unwrap()]
        );
        assert!(registries
            .tokens
            .get(&EVMAddress::from_str("0x744d70fdbe2ba4cf95131626614a1763df805b9e").unwrap())
            .is_some());
    }

    #[test]
    fn load_should_read_config_files() {
        let dir = std::env::temp_dir().join(format!("gas-relayer-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        fs::write(&path, CONFIG).unwrap();

        let config = load(&[PathBuf::from("/nonexistent/config.toml"), path]).unwrap();

        assert_eq!(config.max_in_flight, 8);
        assert_eq!(config.tokens.len(), 2);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn load_should_fail_without_required_fields() {
        assert!(load(&[PathBuf::from("/nonexistent/config.toml")]).is_err());
    }

    #[test]
    fn home_dir_should_be_expanded() {
        let expanded = expand_home_dir("~/.gas-relayer/config.toml");

        assert!(expanded.ends_with(".gas-relayer/config.toml"));
        assert_eq!(
            expand_home_dir("/etc/gas-relayer.toml"),
            PathBuf::from("/etc/gas-relayer.toml")
        );
    }
}
