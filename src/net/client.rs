use reqwest::header::ACCESS_CONTROL_ALLOW_ORIGIN;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::Network;
use crate::cache::{DeliveryMode, Request, Response};
use crate::config::NetworkConfig;
use crate::error::NetworkError;

/// HTTP transport wrapper that tags responses with their delivery mode
#[derive(Clone)]
pub struct HttpClient {
  client: reqwest::Client,
  origin: Url,
}

impl HttpClient {
  pub fn new(origin: Url, config: &NetworkConfig) -> Result<Self, NetworkError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .user_agent(config.user_agent.as_str())
      .build()
      .map_err(|source| NetworkError::Http {
        url: origin.to_string(),
        source,
      })?;

    Ok(Self { client, origin })
  }
}

impl Network for HttpClient {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    let url = request.url.to_string();
    let http_err = |source| NetworkError::Http {
      url: url.clone(),
      source,
    };

    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone())
      .headers(request.headers.clone());
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder.send().await.map_err(http_err)?;

    let final_url = response.url().clone();
    let status = response.status().as_u16();
    let allow_origin = response
      .headers()
      .get(ACCESS_CONTROL_ALLOW_ORIGIN)
      .and_then(|v| v.to_str().ok());
    let delivery = DeliveryMode::classify(&self.origin, &final_url, allow_origin);

    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response.bytes().await.map_err(http_err)?.to_vec();

    debug!(%url, status, %delivery, bytes = body.len(), "fetched from network");

    Ok(Response::new(final_url, status, headers, delivery, body))
  }
}
