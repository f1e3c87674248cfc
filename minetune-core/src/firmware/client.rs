//! HTTP client for the miner management API
//!
//! Session handling:
//! - lazy authentication on first call, bearer token afterwards
//! - a 401 invalidates the session; one re-authentication + replay,
//!   then the failure surfaces
//!
//! Retry policy:
//! - reads are idempotent and retried with bounded exponential backoff
//! - writes are resent at most once, and only when the connection was
//!   never established (the request provably did not reach the device)
//! - a write that timed out after being sent surfaces as ambiguous

use super::types::{ChipsStatus, Summary, Telemetry};
use super::{FirmwareConnector, FirmwareControl, FirmwareError};
use crate::config::FirmwareSettings;
use crate::credentials::Credential;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Serialize)]
struct AuthRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
}

/// Authenticated session to a single device
///
/// Reads may run concurrently; mutating calls are serialized through
/// an internal gate because the firmware handles one control write at
/// a time.
pub struct FirmwareClient {
    host: String,
    base_url: String,
    username: String,
    password: String,
    settings: FirmwareSettings,
    http: reqwest::Client,
    session: Mutex<Option<String>>,
    write_gate: Mutex<()>,
}

impl FirmwareClient {
    /// Build a client for `http://<host>`; no connection is made until
    /// the first call
    pub fn new(
        host: &str,
        credential: &Credential,
        settings: FirmwareSettings,
    ) -> Result<Self, FirmwareError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| FirmwareError::Unreachable {
                host: host.to_string(),
                reason: format!("http client construction failed: {e}"),
            })?;
        Ok(Self {
            host: host.to_string(),
            base_url: format!("http://{host}"),
            username: credential.username.clone(),
            password: credential.password.clone(),
            settings,
            http,
            session: Mutex::new(None),
            write_gate: Mutex::new(()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Transport failures on reads are all retryable
    fn unreachable(&self, error: &reqwest::Error) -> FirmwareError {
        FirmwareError::Unreachable {
            host: self.host.clone(),
            reason: error.to_string(),
        }
    }

    async fn invalidate_session(&self) {
        *self.session.lock().await = None;
    }

    /// Return the session token, authenticating if none is held
    async fn ensure_token(&self) -> Result<String, FirmwareError> {
        let mut session = self.session.lock().await;
        if let Some(token) = session.as_ref() {
            return Ok(token.clone());
        }
        let token = self.authenticate().await?;
        *session = Some(token.clone());
        Ok(token)
    }

    async fn authenticate(&self) -> Result<String, FirmwareError> {
        debug!(host = %self.host, "authenticating firmware session");
        let response = self
            .http
            .post(self.url(&self.settings.endpoints.auth))
            .timeout(self.settings.timeouts.read())
            .json(&AuthRequest {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await
            .map_err(|e| self.unreachable(&e))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(FirmwareError::Authentication {
                host: self.host.clone(),
            });
        }
        if status.is_server_error() {
            return Err(FirmwareError::Unreachable {
                host: self.host.clone(),
                reason: format!("device returned {status}"),
            });
        }
        if !status.is_success() {
            return Err(FirmwareError::Malformed {
                host: self.host.clone(),
                detail: format!("unexpected auth status {status}"),
            });
        }
        let body: AuthResponse =
            response
                .json()
                .await
                .map_err(|e| FirmwareError::Malformed {
                    host: self.host.clone(),
                    detail: format!("auth response: {e}"),
                })?;
        Ok(body.token)
    }

    /// One read round-trip, with a single re-authentication on 401
    async fn read_once<T: DeserializeOwned>(&self, path: &str) -> Result<T, FirmwareError> {
        let mut reauthenticated = false;
        loop {
            let token = self.ensure_token().await?;
            let response = self
                .http
                .get(self.url(path))
                .bearer_auth(&token)
                .timeout(self.settings.timeouts.read())
                .send()
                .await
                .map_err(|e| self.unreachable(&e))?;

            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED {
                self.invalidate_session().await;
                if reauthenticated {
                    return Err(FirmwareError::Authentication {
                        host: self.host.clone(),
                    });
                }
                reauthenticated = true;
                continue;
            }
            if status.is_server_error() {
                return Err(FirmwareError::Unreachable {
                    host: self.host.clone(),
                    reason: format!("device returned {status}"),
                });
            }
            if !status.is_success() {
                return Err(FirmwareError::Malformed {
                    host: self.host.clone(),
                    detail: format!("unexpected status {status} from {path}"),
                });
            }
            return response
                .json::<T>()
                .await
                .map_err(|e| FirmwareError::Malformed {
                    host: self.host.clone(),
                    detail: format!("{path}: {e}"),
                });
        }
    }

    /// Read with bounded exponential backoff on transport failures
    async fn read_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FirmwareError> {
        let retry = self.settings.retry;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.read_once(path).await {
                Err(FirmwareError::Unreachable { ref reason, .. })
                    if attempt < retry.read_attempts.max(1) =>
                {
                    let delay = retry.backoff_delay(attempt);
                    warn!(
                        host = %self.host,
                        path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason,
                        "read failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    /// Issue one control write
    ///
    /// Resend happens only for connection-establishment failures; once
    /// bytes may have reached the device a timeout is ambiguous and is
    /// reported as such rather than retried.
    async fn post_command(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<(), FirmwareError> {
        let _gate = self.write_gate.lock().await;
        let mut resend_budget = 1u32;
        let mut reauthenticated = false;
        loop {
            let token = self.ensure_token().await?;
            let result = self
                .http
                .post(self.url(path))
                .bearer_auth(&token)
                .timeout(self.settings.timeouts.write())
                .json(body)
                .send()
                .await;

            let response = match result {
                Ok(response) => response,
                Err(e) if e.is_connect() && resend_budget > 0 => {
                    resend_budget -= 1;
                    debug!(host = %self.host, path, "connection not established, resending write once");
                    continue;
                }
                Err(e) if e.is_connect() => return Err(self.unreachable(&e)),
                Err(e) if e.is_timeout() => {
                    return Err(FirmwareError::AmbiguousWrite {
                        host: self.host.clone(),
                    })
                }
                Err(e) => return Err(self.unreachable(&e)),
            };

            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED {
                // The device rejected the request outright, so the
                // command was not applied; safe to replay after one
                // re-authentication.
                self.invalidate_session().await;
                if reauthenticated {
                    return Err(FirmwareError::Authentication {
                        host: self.host.clone(),
                    });
                }
                reauthenticated = true;
                continue;
            }
            if status.is_server_error() {
                return Err(FirmwareError::Unreachable {
                    host: self.host.clone(),
                    reason: format!("device returned {status}"),
                });
            }
            if !status.is_success() {
                return Err(FirmwareError::Malformed {
                    host: self.host.clone(),
                    detail: format!("unexpected status {status} from {path}"),
                });
            }
            debug!(host = %self.host, path, "control write acknowledged");
            return Ok(());
        }
    }

}

impl FirmwareControl for FirmwareClient {
    async fn get_summary(&self) -> Result<Summary, FirmwareError> {
        self.read_json(&self.settings.endpoints.summary).await
    }

    async fn get_chips_status(&self) -> Result<ChipsStatus, FirmwareError> {
        self.read_json(&self.settings.endpoints.chips).await
    }

    async fn get_telemetry(&self) -> Result<Telemetry, FirmwareError> {
        self.read_json(&self.settings.endpoints.telemetry).await
    }

    async fn set_hashrate_limit(&self, percent: f64) -> Result<(), FirmwareError> {
        self.post_command(
            &self.settings.endpoints.hashrate_limit,
            &serde_json::json!({ "percent": percent }),
        )
        .await
    }

    async fn set_power_limit(&self, percent: f64) -> Result<(), FirmwareError> {
        self.post_command(
            &self.settings.endpoints.power_limit,
            &serde_json::json!({ "percent": percent }),
        )
        .await
    }

    async fn set_overclock(
        &self,
        core_clock_offset: i32,
        memory_clock_offset: i32,
        power_limit_percent: f64,
        core_voltage_offset: i32,
    ) -> Result<(), FirmwareError> {
        self.post_command(
            &self.settings.endpoints.overclock,
            &serde_json::json!({
                "core_clock_offset": core_clock_offset,
                "memory_clock_offset": memory_clock_offset,
                "power_limit_percent": power_limit_percent,
                "core_voltage_offset": core_voltage_offset,
            }),
        )
        .await
    }
}

/// Default connector producing real HTTP clients
#[derive(Clone)]
pub struct HttpConnector {
    settings: FirmwareSettings,
}

impl HttpConnector {
    pub fn new(settings: FirmwareSettings) -> Self {
        Self { settings }
    }
}

impl FirmwareConnector for HttpConnector {
    type Client = FirmwareClient;

    fn connect(&self, host: &str, credential: &Credential) -> Result<FirmwareClient, FirmwareError> {
        FirmwareClient::new(host, credential, self.settings.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credential() -> Credential {
        Credential {
            host: "10.0.0.1".to_string(),
            username: "admin".to_string(),
            password: "admin".to_string(),
            is_default: false,
        }
    }

    #[test]
    fn test_urls_join_host_and_path() {
        let client =
            FirmwareClient::new("10.0.0.1:4028", &test_credential(), FirmwareSettings::default())
                .unwrap();
        assert_eq!(client.url("/telemetry"), "http://10.0.0.1:4028/telemetry");
    }

    #[tokio::test]
    async fn test_construction_makes_no_connection() {
        // Host cannot exist; construction must still succeed (lazy auth)
        let client = FirmwareClient::new(
            "203.0.113.1:1",
            &test_credential(),
            FirmwareSettings::default(),
        );
        assert!(client.is_ok());
    }
}
