//! HTTP copier speaking the peer wire protocol.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::instrument;

use super::Copier;
use crate::error::{Error, ErrorBody, ErrorKind, Result};
use crate::ledger::Node;
use crate::peer::{PullRequest, PushParams};

pub struct HttpCopier {
    client: Client,
}

impl std::fmt::Debug for HttpCopier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HttpCopier")
    }
}

/// `host:port` or a full URL.
fn base_url(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", address.trim_end_matches('/'))
    }
}

pub(crate) fn push_url(address: &str, params: &PushParams) -> String {
    let mut url = format!(
        "{}/v1/slice/push?slice_id={}&source_id={}",
        base_url(address),
        urlencoding::encode(&params.slice_id),
        urlencoding::encode(&params.source_id)
    );
    if params.not_a_slice {
        url.push_str("&not_a_slice=true");
    }
    url
}

pub(crate) fn pull_url(address: &str, req: &PullRequest) -> String {
    format!(
        "{}/v1/slice/pull?slice_id={}&file_id={}&timestamp={}&signature={}",
        base_url(address),
        urlencoding::encode(&req.slice_id),
        urlencoding::encode(&req.file_id),
        req.timestamp,
        hex::encode(&req.signature)
    )
}

/// Turn a non-2xx response into the error the peer reported.
async fn error_from(response: Response) -> Error {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(body) => body.into(),
        Err(_) => Error::new(
            ErrorKind::Internal,
            format!("peer replied with status {}", status),
        ),
    }
}

impl HttpCopier {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Copier for HttpCopier {
    #[instrument(skip(self, data), fields(target_node = %target.id, slice_id = %params.slice_id))]
    async fn push(&self, target: &Node, params: &PushParams, data: &[u8]) -> Result<()> {
        let response = self
            .client
            .post(push_url(&target.address, params))
            .body(data.to_vec())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from(response).await);
        }
        Ok(())
    }

    #[instrument(skip(self, req), fields(holder = %holder.id, slice_id = %req.slice_id))]
    async fn pull(&self, holder: &Node, req: &PullRequest) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(pull_url(&holder.address, req))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from(response).await);
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_url() {
        let params = PushParams {
            slice_id: "s 1".into(),
            source_id: "o".into(),
            not_a_slice: true,
        };
        assert_eq!(
            push_url("127.0.0.1:80", &params),
            "http://127.0.0.1:80/v1/slice/push?slice_id=s%201&source_id=o&not_a_slice=true"
        );
    }

    #[test]
    fn test_pull_url_hex_signature() {
        let req = PullRequest {
            slice_id: "s".into(),
            file_id: "f".into(),
            timestamp: 5,
            signature: vec![0xab, 0x01],
        };
        assert_eq!(
            pull_url("https://peer/", &req),
            "https://peer/v1/slice/pull?slice_id=s&file_id=f&timestamp=5&signature=ab01"
        );
    }
}
