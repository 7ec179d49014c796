//! Coarse IP-based geolocation over HTTP.
//!
//! Only used as a last resort: the returned fix always carries
//! [`IP_FIX_ACCURACY_M`], which the accuracy filter rejects for any realistic
//! threshold, so an IP fix can answer "where am I roughly" but never drives
//! a geofence transition.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{LocationData, LocationProvider};
use crate::clock::now_ms;
use crate::error::{ConfigError, LocationError};

/// Fixed accuracy reported for IP-derived positions.
pub const IP_FIX_ACCURACY_M: f64 = 10_000.0;

/// ip-api.com style payload; ipapi.co style field names are accepted too.
#[derive(Debug, Deserialize)]
struct IpLookupResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default, alias = "latitude")]
    lat: Option<f64>,
    #[serde(default, alias = "longitude")]
    lon: Option<f64>,
}

pub struct IpGeolocationProvider {
    endpoint: Url,
    http_client: Client,
    timeout_secs: u64,
}

impl IpGeolocationProvider {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Result<Self, ConfigError> {
        let endpoint = Url::parse(endpoint).map_err(|e| ConfigError::InvalidValue {
            key: "location.ip_endpoint".into(),
            message: e.to_string(),
        })?;
        let http_client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "location.ip_endpoint".into(),
                message: e.to_string(),
            })?;
        Ok(Self {
            endpoint,
            http_client,
            timeout_secs,
        })
    }

    async fn lookup(&self) -> Result<LocationData, LocationError> {
        let resp = self
            .http_client
            .get(self.endpoint.clone())
            .send()
            .await
            .map_err(|e| self.map_http_error(e))?;

        if !resp.status().is_success() {
            return Err(LocationError::Http(format!("status {}", resp.status())));
        }

        let body: IpLookupResponse = resp.json().await.map_err(|e| self.map_http_error(e))?;

        if let Some(status) = body.status.as_deref() {
            if status != "success" {
                let reason = body.message.unwrap_or_else(|| status.to_string());
                return Err(LocationError::PositionUnavailable(reason));
            }
        }

        match (body.lat, body.lon) {
            (Some(lat), Some(lon)) => Ok(LocationData::new(lat, lon, IP_FIX_ACCURACY_M, now_ms())),
            _ => Err(LocationError::PositionUnavailable(
                "IP lookup returned no coordinates".into(),
            )),
        }
    }

    fn map_http_error(&self, err: reqwest::Error) -> LocationError {
        if err.is_timeout() {
            LocationError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            LocationError::from(err)
        }
    }
}

#[async_trait]
impl LocationProvider for IpGeolocationProvider {
    fn name(&self) -> &str {
        "ip"
    }

    async fn check_permissions(&self) -> bool {
        true
    }

    async fn request_permissions(&self) -> Result<bool, LocationError> {
        Ok(true)
    }

    async fn current_position(&self) -> Result<LocationData, LocationError> {
        self.lookup().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_ip_api_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"success","lat":48.1372,"lon":11.5756,"city":"Munich"}"#)
            .create_async()
            .await;

        let provider = IpGeolocationProvider::new(&format!("{}/json", server.url()), 5).unwrap();
        let fix = provider.current_position().await.unwrap();

        mock.assert_async().await;
        assert_eq!(fix.latitude, 48.1372);
        assert_eq!(fix.longitude, 11.5756);
        assert_eq!(fix.accuracy_meters, IP_FIX_ACCURACY_M);
    }

    #[tokio::test]
    async fn accepts_latitude_longitude_names() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_body(r#"{"latitude":-33.86,"longitude":151.21}"#)
            .create_async()
            .await;

        let provider = IpGeolocationProvider::new(&format!("{}/", server.url()), 5).unwrap();
        let fix = provider.current_position().await.unwrap();
        assert_eq!(fix.latitude, -33.86);
    }

    #[tokio::test]
    async fn failed_lookup_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/json")
            .with_status(200)
            .with_body(r#"{"status":"fail","message":"private range"}"#)
            .create_async()
            .await;

        let provider = IpGeolocationProvider::new(&format!("{}/json", server.url()), 5).unwrap();
        assert_eq!(
            provider.current_position().await,
            Err(LocationError::PositionUnavailable("private range".into()))
        );
    }

    #[tokio::test]
    async fn server_error_is_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/json")
            .with_status(503)
            .create_async()
            .await;

        let provider = IpGeolocationProvider::new(&format!("{}/json", server.url()), 5).unwrap();
        assert!(matches!(
            provider.current_position().await,
            Err(LocationError::Http(_))
        ));
    }

    #[test]
    fn rejects_bad_endpoint() {
        assert!(IpGeolocationProvider::new("not a url", 5).is_err());
    }
}
