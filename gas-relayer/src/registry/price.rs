use async_trait::async_trait;
use error_stack::{report, Result, ResultExt};
use ethers_core::types::U256;
use mockall::automock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("price request failed")]
    Request,
    #[error("no price factor at {0} in the response")]
    MalformedResponse(String),
    #[error("{0} is not a decimal integer price factor")]
    InvalidFactor(String),
}

/// Source of the conversion factor from fee-token units to native-currency units.
#[automock]
#[async_trait]
pub trait PriceFactorProvider: Send + Sync {
    async fn factor(&self) -> Result<U256, Error>;
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum PriceConfig {
    /// A constant factor, given as a decimal string so it can exceed the toml integer range.
    Fixed { factor: String },
    /// Fetches a json document and reads the factor at the given json pointer.
    Http { url: Url, pointer: String },
}

impl PriceConfig {
    pub fn build(&self) -> Result<Box<dyn PriceFactorProvider>, Error> {
        match self {
            PriceConfig::Fixed { factor } => {
                Ok(Box::new(FixedFactor(parse_factor(factor)?)))
            }
            PriceConfig::Http { url, pointer } => Ok(Box::new(HttpFactor {
                client: reqwest::Client::new(),
                url: url.clone(),
                pointer: pointer.clone(),
            })),
        }
    }
}

fn parse_factor(factor: &str) -> Result<U256, Error> {
    U256::from_dec_str(factor.trim()).map_err(|_| report!(Error::InvalidFactor(factor.to_string())))
}

#[derive(Debug)]
pub struct FixedFactor(U256);

#[async_trait]
impl PriceFactorProvider for FixedFactor {
    async fn factor(&self) -> Result<U256, Error> {
        Ok(self.0)
    }
}

#[derive(Debug)]
pub struct HttpFactor {
    client: reqwest::Client,
    url: Url,
    pointer: String,
}

#[async_trait]
impl PriceFactorProvider for HttpFactor {
    async fn factor(&self) -> Result<U256, Error> {
        let body = self
            .client
            .get(self.url.to_standard_url())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .change_context(Error::Request)
            .attach_printable_lazy(|| self.url.to_string())?
            .text()
            .await
            .change_context(Error::Request)?;

        let document: Value = serde_json::from_str(&body)
            .change_context(Error::MalformedResponse(self.pointer.clone()))?;

        factor_at(&document, &self.pointer)
    }
}

fn factor_at(document: &Value, pointer: &str) -> Result<U256, Error> {
    match document.pointer(pointer) {
        Some(Value::String(factor)) => parse_factor(factor),
        Some(Value::Number(factor)) => factor
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| report!(Error::InvalidFactor(factor.to_string()))),
        _ => Err(report!(Error::MalformedResponse(pointer.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use ethers_core::types::U256;
    use serde_json::json;

    use super::{factor_at, Error, PriceConfig};

    #[tokio::test]
    async fn fixed_factor_should_parse_large_decimals() {
        let provider = PriceConfig::Fixed {
            factor: "1000000000000000000000".to_string(),
        }
        .build()
        .unwrap();

        assert_eq!(
            provider.factor().await.unwrap(),
            U256::exp10(21)
        );
    }

    #[test]
    fn fixed_factor_should_reject_non_decimal_values() {
        let err = PriceConfig::Fixed {
            factor: "0x10".to_string(),
        }
        .build()
        .err()
        .unwrap();

        assert_eq!(
            err.current_context(),
            &Error::InvalidFactor("0x10".to_string())
        );
    }

    #[test]
    fn factor_should_be_read_from_json_pointer() {
        let document = json!({"data": {"SNT": {"factor": "2500"}, "DAI": {"factor": 12}}});

        assert_eq!(
            factor_at(&document, "/data/SNT/factor").unwrap(),
            U256::from(2500)
        );
        assert_eq!(
            factor_at(&document, "/data/DAI/factor").unwrap(),
            U256::from(12)
        );
        assert!(matches!(
            factor_at(&document, "/data/ETH/factor")
                .unwrap_err()
                .current_context(),
            Error::MalformedResponse(_)
        ));
        assert!(matches!(
            factor_at(&json!({"factor": 1.5}), "/factor")
                .unwrap_err()
                .current_context(),
            Error::InvalidFactor(_)
        ));
    }

    #[test]
    fn price_config_should_deserialize_tagged_variants() {
        let fixed: PriceConfig = toml::from_str("type = 'Fixed'\nfactor = '20'").unwrap();
        let http: PriceConfig = toml::from_str(
            "type = 'Http'\nurl = 'https://prices.example.org/snt'\npointer = '/factor'",
        )
        .unwrap();

        assert_eq!(
            fixed,
            PriceConfig::Fixed {
                factor: "20".to_string()
            }
        );
        assert!(matches!(http, PriceConfig::Http { pointer, .. } if pointer == "/factor"));
    }
}
