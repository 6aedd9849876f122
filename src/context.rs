use crate::alerts::{channels_from_settings, AlertChannel};
use crate::config::{setting_str, Settings};
use crate::fetcher::{PriceFetcher, YahooChartFetcher};
use crate::http::build_async_client;
use anyhow::Result;
use log::info;
use std::collections::HashMap;
use std::time::Duration;

/// Everything a command needs: settings, the price provider and alert channels.
pub struct AppContext {
    settings: Settings,
    env: HashMap<String, String>,
    fetcher: Box<dyn PriceFetcher>,
    channels: Vec<Box<dyn AlertChannel>>,
}

impl AppContext {
    /// Builds the HTTP-backed context. `env` is the raw key/value map the
    /// settings came from; alert credentials and the watchlist are read from it.
    pub fn initialize(settings: Settings, env: HashMap<String, String>) -> Result<Self> {
        let http = build_async_client(Some(Duration::from_secs(settings.fetch_timeout_secs)))?;
        let fetcher = YahooChartFetcher::new(
            http.clone(),
            settings.price_api_url.clone(),
            Duration::from_millis(settings.request_delay_ms),
        );
        let channels = channels_from_settings(&http, &env);
        info!(
            "Alert channels: {}",
            channels
                .iter()
                .map(|channel| channel.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Self::with_parts(settings, env, Box::new(fetcher), channels))
    }

    pub fn with_parts(
        settings: Settings,
        env: HashMap<String, String>,
        fetcher: Box<dyn PriceFetcher>,
        channels: Vec<Box<dyn AlertChannel>>,
    ) -> Self {
        Self {
            settings,
            env,
            fetcher,
            channels,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn fetcher(&self) -> &dyn PriceFetcher {
        self.fetcher.as_ref()
    }

    pub fn channels(&self) -> &[Box<dyn AlertChannel>] {
        &self.channels
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        setting_str(&self.env, &[key])
    }
}
