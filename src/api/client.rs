use anyhow::{Result, Context};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::config::Config;
use super::models::{
    AuthTokens, Channel, ChartUsageResponse, Device, DeviceListResponse, LoginRequest, Scale, Unit,
};
use super::source::{ApiError, MeterDataSource};

/// HTTP client for the smart-meter service.
///
/// Authentication prefers the stored token file, falling back on
/// username/password; refreshed tokens are written back so the next run
/// skips the password path. All calls are issued sequentially by the
/// engine — the service rate-limits aggressively.
pub struct MeterClient {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    token_path: PathBuf,
    auth: RwLock<Option<AuthTokens>>,
}

impl MeterClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            token_path: config.token_path.clone(),
            auth: RwLock::new(None),
        })
    }

    fn load_tokens(&self) -> Result<AuthTokens, ApiError> {
        let raw = fs::read_to_string(&self.token_path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Persist refreshed tokens. Failure to write is not failure to
    /// authenticate — the in-memory tokens still carry this run.
    fn store_tokens(&self, tokens: AuthTokens) {
        match serde_json::to_string_pretty(&tokens) {
            Ok(raw) => {
                if let Err(err) = fs::write(&self.token_path, raw) {
                    warn!(
                        "could not persist tokens to {}: {}",
                        self.token_path.display(),
                        err
                    );
                }
            }
            Err(err) => warn!("could not serialize tokens: {}", err),
        }
        *self.auth.write().unwrap_or_else(|e| e.into_inner()) = Some(tokens);
    }

    fn current_id_token(&self) -> Result<String, ApiError> {
        self.auth
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|t| t.id_token.clone())
            .ok_or(ApiError::AuthRejected)
    }

    async fn login(&self, request: LoginRequest<'_>) -> Result<AuthTokens, ApiError> {
        let endpoint = format!("{}/auth/tokens", self.base_url);
        let response = self.client.post(&endpoint).json(&request).send().await?;
        read_json(response).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: String,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let token = self.current_id_token()?;
        let response = self
            .client
            .get(&endpoint)
            .header("authtoken", token)
            .query(query)
            .send()
            .await?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json::<T>().await?)
}

#[async_trait]
impl MeterDataSource for MeterClient {
    async fn authenticate(&self) -> Result<(), ApiError> {
        // Already authenticated from an earlier build in this process.
        if self
            .auth
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
        {
            return Ok(());
        }

        debug!("trying stored tokens at {}", self.token_path.display());
        match self.load_tokens() {
            Ok(tokens) => {
                let refresh = LoginRequest {
                    username: None,
                    password: None,
                    refresh_token: Some(&tokens.refresh_token),
                };
                match self.login(refresh).await {
                    Ok(fresh) => {
                        debug!("login ok (stored tokens)");
                        self.store_tokens(fresh);
                        return Ok(());
                    }
                    Err(err) => warn!("stored tokens failed: will use password: {}", err),
                }
            }
            Err(err) => debug!("no usable stored tokens: {}", err),
        }

        let (Some(username), Some(password)) = (self.username.as_deref(), self.password.as_deref())
        else {
            warn!("no credentials configured and no stored tokens");
            return Err(ApiError::AuthRejected);
        };

        let credentials = LoginRequest {
            username: Some(username),
            password: Some(password),
            refresh_token: None,
        };
        match self.login(credentials).await {
            Ok(fresh) => {
                debug!("login ok (password)");
                self.store_tokens(fresh);
                Ok(())
            }
            Err(err) => {
                warn!("login failed: {}", err);
                Err(ApiError::AuthRejected)
            }
        }
    }

    async fn list_devices(&self) -> Result<Vec<Device>, ApiError> {
        let endpoint = format!("{}/customers/devices", self.base_url);
        let response: DeviceListResponse = self.get_json(endpoint, &[]).await?;
        debug!("service reported {} devices", response.devices.len());
        Ok(response.devices)
    }

    async fn fetch_usage_window(
        &self,
        channel: &Channel,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        scale: Scale,
        unit: Unit,
    ) -> Result<(Vec<Option<f64>>, DateTime<Utc>), ApiError> {
        let endpoint = format!("{}/AppAPI", self.base_url);
        let device_gid = channel.device_gid.to_string();
        let start_param = start.to_rfc3339_opts(SecondsFormat::Micros, true);
        let end_param = end.to_rfc3339_opts(SecondsFormat::Micros, true);

        let response: ChartUsageResponse = self
            .get_json(
                endpoint,
                &[
                    ("apiMethod", "getChartUsage"),
                    ("deviceGid", device_gid.as_str()),
                    ("channel", channel.channel_num.as_str()),
                    ("start", start_param.as_str()),
                    ("end", end_param.as_str()),
                    ("scale", scale.as_str()),
                    ("energyUnit", unit.as_str()),
                ],
            )
            .await?;

        Ok((response.usage_list, response.first_usage_instant))
    }

    fn invalidate_auth(&self) {
        debug!("invalidating auth tokens");
        *self.auth.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
