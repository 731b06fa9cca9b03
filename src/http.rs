//! Smart HTTP protocol v2 transport.

use reqwest::blocking::Client;

use crate::error::{Error, Result};

const PROTOCOL_HEADER: &str = "git-protocol";
const PROTOCOL_VERSION: &str = "version=2";

pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// POSTs a pkt-line encoded `git-upload-pack` request body and returns
    /// the complete response body. Used for both the `ls-refs` and `fetch`
    /// command exchanges, which share a single endpoint under protocol v2.
    pub fn post_upload_pack(&self, body: Vec<u8>) -> Result<Vec<u8>> {
        let url = format!("{}/git-upload-pack", self.base_url);

        let response = self
            .client
            .post(&url)
            .header(PROTOCOL_HEADER, PROTOCOL_VERSION)
            .header("content-type", "application/x-git-upload-pack-request")
            .body(body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::GitProtocolError(format!(
                "{url} responded with {status}"
            )));
        }

        Ok(response.bytes()?.to_vec())
    }
}
