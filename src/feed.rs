// feed.rs

use std::collections::BTreeMap;

use log::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedValue {
    pub value: f32,
}

/// Batch upload body: `{"data": {<name>: [{"value": <raw>}]}}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedPayload {
    pub data: BTreeMap<String, Vec<FeedValue>>,
}

impl FeedPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sensors sharing a friendly name overwrite each other, last one wins.
    pub fn insert(&mut self, name: &str, value: f32) {
        self.data.insert(name.to_string(), vec![FeedValue { value }]);
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FeedResponse {
    pub status: u16,
    pub body: String,
}

/// Blocking HTTP POST of a JSON body with the feed's `api-key` header.
pub trait FeedTransport {
    fn post(&mut self, url: &str, api_key: &str, body: &str) -> anyhow::Result<FeedResponse>;
}

pub struct FeedChannel<T> {
    url: String,
    api_key: String,
    transport: T,
}

impl<T: FeedTransport> FeedChannel<T> {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, transport: T) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            transport,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Posts the batch once. Any status is returned as-is, there is no retry.
    pub fn send(&mut self, payload: &FeedPayload) -> anyhow::Result<FeedResponse> {
        let body = payload.to_json()?;
        debug!("Feed POST {url}: {body}", url = self.url);
        let resp = self.transport.post(&self.url, &self.api_key, &body)?;
        info!("API response: {} {}", resp.status, resp.body);
        Ok(resp)
    }
}

#[cfg(target_os = "espidf")]
pub use esp::*;

#[cfg(target_os = "espidf")]
mod esp {
    use embedded_svc::http::client::Client as HttpClient;
    use esp_idf_svc::{
        http::client::{Configuration, EspHttpConnection},
        io::{Read, Write},
    };

    use super::{FeedResponse, FeedTransport};

    const RESPONSE_BUF_SIZE: usize = 512;

    /// Feed uploads over the ESP-IDF HTTP client, one connection per post.
    #[derive(Clone, Debug, Default)]
    pub struct EspHttpFeed;

    impl FeedTransport for EspHttpFeed {
        fn post(&mut self, url: &str, api_key: &str, body: &str) -> anyhow::Result<FeedResponse> {
            let mut client = HttpClient::wrap(EspHttpConnection::new(&Configuration::default())?);

            let content_length = body.len().to_string();
            let headers = [
                ("api-key", api_key),
                ("content-type", "application/json"),
                ("content-length", content_length.as_str()),
            ];
            let mut req = client.post(url, &headers)?;
            req.write_all(body.as_bytes())?;
            req.flush()?;

            let mut resp = req.submit()?;
            let status = resp.status();

            let mut raw = Vec::new();
            let mut buf = [0_u8; RESPONSE_BUF_SIZE];
            loop {
                let n = resp.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
            }

            Ok(FeedResponse {
                status,
                body: String::from_utf8_lossy(&raw).into_owned(),
            })
        }
    }
}


// EOF
