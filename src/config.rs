use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::services::evaluation::EvaluationConfig;
use crate::services::rating::{ConfigError, RatingConfig, RatingModel};
use crate::services::task_selector::SelectorConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub rating: RatingModel,
    pub selector: SelectorConfig,
    pub evaluation: EvaluationConfig,
}

impl Config {
    /// Fails only on an invalid rating model; everything else falls back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            host,
            port,
            log_level,
            rating: RatingModel::new(RatingConfig::from_env()?)?,
            selector: SelectorConfig::from_env(),
            evaluation: EvaluationConfig::from_env(),
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
