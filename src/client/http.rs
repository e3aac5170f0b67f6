use super::types::ItemsPage;
use super::{
    BatchId, QueryTiming, ReadEndpoint, StatusSnapshot, Transport, TransportError, UploadAccepted,
};
use crate::config::{Api, Config};
use reqwest::StatusCode;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::debug;

/// Longest response body excerpt carried in a [`TransportError::Status`].
const MAX_ERROR_BODY_CHARS: usize = 512;

pub struct HttpTransport {
    client: Client,
    base_url: String,
    api: Api,
    health_timeout: Duration,
}

impl HttpTransport {
    pub fn new(cfg: &Config) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(cfg.server.request_timeout())
            .connect_timeout(cfg.server.connect_timeout())
            .user_agent(cfg.server.user_agent.clone())
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self {
            client,
            base_url: cfg.server.base_url.trim_end_matches('/').to_string(),
            api: cfg.api.clone(),
            health_timeout: cfg.server.health_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, template: &str, batch_id: Option<&BatchId>) -> String {
        let path = match batch_id {
            Some(id) => template.replace("{batch_id}", id.as_str()),
            None => template.to_string(),
        };
        format!("{}{}", self.base_url, path)
    }

    fn endpoint_url(&self, endpoint: &ReadEndpoint) -> String {
        match endpoint {
            ReadEndpoint::InvoiceSearch => self.url(&self.api.search_path, None),
            ReadEndpoint::BatchTransactions(id) => self.url(&self.api.transactions_path, Some(id)),
        }
    }
}

impl Transport for HttpTransport {
    fn health(&self) -> Result<(), TransportError> {
        let url = self.url(&self.api.health_path, None);
        let resp = self
            .client
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .map_err(|source| connect_error(&url, source))?;
        expect_status(&url, resp, StatusCode::OK).map(|_| ())
    }

    fn upload(&self, input: &Path) -> Result<UploadAccepted, TransportError> {
        let url = self.url(&self.api.upload_path, None);
        let part = Part::file(input)
            .map_err(|source| TransportError::Input {
                path: input.to_path_buf(),
                source,
            })?
            .mime_str(&self.api.upload_mime)
            .map_err(|e| TransportError::Client(e.to_string()))?;
        let form = Form::new().part(self.api.upload_field.clone(), part);

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .map_err(|source| connect_error(&url, source))?;
        let resp = expect_status(&url, resp, StatusCode::CREATED)?;
        let body = read_body(&url, resp)?;
        decode(&url, &body)
    }

    fn batch_status(&self, batch_id: &BatchId) -> Result<StatusSnapshot, TransportError> {
        let url = self.url(&self.api.batch_path, Some(batch_id));
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|source| connect_error(&url, source))?;
        let resp = expect_status(&url, resp, StatusCode::OK)?;
        let body = read_body(&url, resp)?;
        decode(&url, &body)
    }

    fn query(
        &self,
        endpoint: &ReadEndpoint,
        params: &[(String, String)],
    ) -> Result<QueryTiming, TransportError> {
        let url = self.endpoint_url(endpoint);
        let request = self
            .client
            .get(&url)
            .query(params)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        let started = Instant::now();
        let resp = self
            .client
            .execute(request)
            .map_err(|source| connect_error(&url, source))?;
        let resp = expect_status(&url, resp, StatusCode::OK)?;
        let body = read_body(&url, resp)?;
        let elapsed = started.elapsed();

        let page: ItemsPage = decode(&url, &body)?;
        debug!("GET {url} {params:?} -> {} items in {elapsed:?}", page.len());
        Ok(QueryTiming {
            items: page.len(),
            elapsed,
        })
    }
}

fn connect_error(url: &str, source: reqwest::Error) -> TransportError {
    TransportError::Connect {
        url: url.to_string(),
        source,
    }
}

fn expect_status(
    url: &str,
    resp: Response,
    expected: StatusCode,
) -> Result<Response, TransportError> {
    let status = resp.status();
    if status == expected {
        return Ok(resp);
    }
    let body: String = resp
        .text()
        .unwrap_or_default()
        .chars()
        .take(MAX_ERROR_BODY_CHARS)
        .collect();
    Err(TransportError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}

fn read_body(url: &str, resp: Response) -> Result<Vec<u8>, TransportError> {
    resp.bytes()
        .map(|b| b.to_vec())
        .map_err(|source| connect_error(url, source))
}

fn decode<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T, TransportError> {
    serde_json::from_slice(body).map_err(|e| TransportError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}
