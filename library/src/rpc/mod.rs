//! JSON-RPC clients for CryptoNote daemons and wallets.
//!
//! [`RpcClient`] speaks JSON-RPC 2.0 over HTTP(S) and implements both the
//! [`Daemon`] and [`Wallet`] traits. The rest of the library only depends on
//! those traits, so alternative clients (or mocks) can be plugged in.

#[cfg(test)]
pub(crate) mod mock;
mod models;

use std::{future::Future, time::Duration};

use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    http::{HeaderValue, StatusCode},
    Method, Request, Uri,
};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client as HttpClient},
    rt::TokioExecutor,
};
use log::{debug, trace};
pub use models::{
    DaemonInfo, RecentTransfers, RecentTransfersRequest, Subtransfer, Transfer,
    TransferById, TransferEntry, TransferOrder, WalletProvisionInfo,
};
use serde::{
    de::{DeserializeOwned, IgnoredAny},
    Deserialize, Serialize,
};
use thiserror::Error;
use tokio::time::{error, timeout};

use self::models::{
    AccountIndex, Accounts, CreateWalletRequest, HeightResponse, NoParams, OpenWalletRequest,
    TransferByTxidRequest,
};

/// Timeout for RPC connection formation.
pub const DEFAULT_RPC_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for total call completion.
pub const DEFAULT_RPC_TOTAL_TIMEOUT: Duration = Duration::from_secs(10);

/// A JSON-RPC 2.0 client for a CryptoNote daemon or wallet.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: HttpClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
    url: Uri,
    timeout: Duration,
    authorization: Option<HeaderValue>,
}

impl RpcClient {
    /// Returns an RPC client pointing at the specified base URL. Requests are
    /// posted to `<url>/json_rpc`.
    #[must_use]
    pub fn new(
        url: Uri,
        total_timeout: Duration,
        connection_timeout: Duration,
        login: Option<(String, String)>,
    ) -> RpcClient {
        let mut hyper_connector = HttpConnector::new();
        hyper_connector.set_connect_timeout(Some(connection_timeout));
        hyper_connector.enforce_http(false);
        hyper_connector.set_keepalive(Some(Duration::from_secs(25)));
        let rustls_connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(hyper_connector);
        let client = HttpClient::builder(TokioExecutor::new()).build(rustls_connector);

        let authorization = login.and_then(|(username, password)| {
            let token = STANDARD.encode(format!("{username}:{password}"));
            HeaderValue::from_str(&format!("Basic {token}")).ok()
        });

        RpcClient {
            client,
            url,
            timeout: total_timeout,
            authorization,
        }
    }

    /// Base URL this client was configured with.
    #[must_use]
    pub fn url(&self) -> String {
        self.url.to_string()
    }

    fn endpoint(&self) -> String {
        format!("{}/json_rpc", self.url.to_string().trim_end_matches('/'))
    }

    /// Call `method` with `params`, returning the deserialized `result` member
    /// of the response.
    ///
    /// # Errors
    ///
    /// * [`RpcError::Api`] if the server answered with a JSON-RPC `error`.
    /// * [`RpcError::Request`], [`RpcError::Timeout`] or [`RpcError::Status`]
    ///   if the server could not be reached or did not answer successfully.
    /// * [`RpcError::InvalidJson`] or [`RpcError::MissingData`] if the
    ///   response could not be interpreted.
    pub async fn send<P, R>(&self, method: &str, params: &P) -> Result<R, RpcError>
    where
        P: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        trace!("Calling {method} on {}", self.url);
        let body = serde_json::to_vec(&JsonRpcRequest {
            jsonrpc: "2.0",
            id: "0",
            method,
            params,
        })?;

        let mut req = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint())
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(body.into()))?;
        if let Some(authorization) = &self.authorization {
            req.headers_mut().insert(AUTHORIZATION, authorization.clone());
        }

        let bytes = timeout(self.timeout, async {
            let response = self
                .client
                .request(req)
                .await
                .map_err(|e| RpcError::Request(Box::new(e)))?;
            let status = response.status();
            if !status.is_success() {
                return Err(RpcError::Status(status));
            }
            let (_parts, body) = response.into_parts();
            Ok(body
                .collect()
                .await
                .map_err(|e| RpcError::Request(Box::new(e)))?
                .to_bytes())
        })
        .await??;

        let response: JsonRpcResponse<R> = serde_json::from_slice(&bytes)?;
        match response {
            JsonRpcResponse {
                error: Some(JsonRpcError { code, message }),
                ..
            } => {
                debug!("{method} on {} returned error {code}: {message}", self.url);
                Err(RpcError::Api { code, message })
            }
            JsonRpcResponse {
                result: Some(result),
                ..
            } => Ok(result),
            JsonRpcResponse { .. } => Err(RpcError::MissingData(format!(
                "{{ result: ... }} in response to {method}"
            ))),
        }
    }
}

#[derive(Serialize)]
struct JsonRpcRequest<'a, P: ?Sized> {
    jsonrpc: &'static str,
    id: &'static str,
    method: &'a str,
    params: &'a P,
}

#[derive(Deserialize)]
struct JsonRpcResponse<R> {
    result: Option<R>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    #[serde(default)]
    message: String,
}

impl Daemon for RpcClient {
    async fn info(&self) -> Result<DaemonInfo, RpcError> {
        self.send("getinfo", &NoParams {}).await
    }

    fn url(&self) -> String {
        RpcClient::url(self)
    }
}

impl Wallet for RpcClient {
    async fn height(&self) -> Result<u64, RpcError> {
        let res: HeightResponse = self.send("get_height", &NoParams {}).await?;
        Ok(res.height)
    }

    async fn recent_transfers(&self, count: u64) -> Result<RecentTransfers, RpcError> {
        self.send(
            "get_recent_txs_and_info2",
            &RecentTransfersRequest::newest_confirmed(count),
        )
        .await
    }

    async fn transfer_by_txid(
        &self,
        txid: &str,
        account_index: Option<u32>,
    ) -> Result<TransferById, RpcError> {
        self.send(
            "get_transfer_by_txid",
            &TransferByTxidRequest {
                txid,
                account_index,
            },
        )
        .await
    }

    async fn accounts(&self) -> Result<Vec<u32>, RpcError> {
        let res: Accounts = self.send("get_accounts", &NoParams {}).await?;
        Ok(res
            .subaddress_accounts
            .into_iter()
            .map(|AccountIndex { account_index }| account_index)
            .collect())
    }

    async fn open_wallet(&self, filename: &str, password: &str) -> Result<(), RpcError> {
        let _: IgnoredAny = self
            .send("open_wallet", &OpenWalletRequest { filename, password })
            .await?;
        Ok(())
    }

    async fn create_wallet(
        &self,
        filename: &str,
        password: &str,
        language: &str,
    ) -> Result<(), RpcError> {
        let _: IgnoredAny = self
            .send(
                "create_wallet",
                &CreateWalletRequest {
                    filename,
                    password,
                    language,
                },
            )
            .await?;
        Ok(())
    }

    fn url(&self) -> String {
        RpcClient::url(self)
    }
}

/// Calls needed from a chain daemon.
pub trait Daemon: Clone + Send + Sync + 'static {
    /// Fetch the daemon's height and synchronization state (`getinfo`).
    fn info(&self) -> impl Future<Output = Result<DaemonInfo, RpcError>> + Send;
    /// The URL of the daemon.
    fn url(&self) -> String;
}

/// Calls needed from a chain wallet.
pub trait Wallet: Clone + Send + Sync + 'static {
    /// Fetch the wallet's synchronized height (`get_height`).
    fn height(&self) -> impl Future<Output = Result<u64, RpcError>> + Send;
    /// Fetch up to `count` of the newest confirmed transfers, together with
    /// the wallet's current height.
    fn recent_transfers(
        &self,
        count: u64,
    ) -> impl Future<Output = Result<RecentTransfers, RpcError>> + Send;
    /// Look up a transaction by hash, optionally restricted to one account.
    fn transfer_by_txid(
        &self,
        txid: &str,
        account_index: Option<u32>,
    ) -> impl Future<Output = Result<TransferById, RpcError>> + Send;
    /// List the wallet's account indices.
    fn accounts(&self) -> impl Future<Output = Result<Vec<u32>, RpcError>> + Send;
    /// Open a wallet file on the wallet RPC server.
    fn open_wallet(
        &self,
        filename: &str,
        password: &str,
    ) -> impl Future<Output = Result<(), RpcError>> + Send;
    /// Create a wallet file on the wallet RPC server.
    fn create_wallet(
        &self,
        filename: &str,
        password: &str,
        language: &str,
    ) -> impl Future<Output = Result<(), RpcError>> + Send;
    /// The URL of the wallet RPC server.
    fn url(&self) -> String;
}

/// An error originating from a daemon or wallet RPC call.
#[derive(Error, Debug)]
pub enum RpcError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Request(Box<dyn std::error::Error + Send + Sync>),
    /// Failed to build the HTTP request.
    #[error("failed to build HTTP Request: {0}")]
    InvalidRequest(#[from] hyper::http::Error),
    /// HTTP request timed out.
    #[error("HTTP request timed out: {0}")]
    Timeout(#[from] error::Elapsed),
    /// The server answered with a non-success HTTP status.
    #[error("server responded with HTTP status {0}")]
    Status(StatusCode),
    /// The response is not valid json, or has an unexpected shape.
    #[error("failed to interpret response body as json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// RPC response is missing expected data.
    #[error("expected data was not present in RPC response: {0}")]
    MissingData(String),
    /// The server rejected the call with a JSON-RPC error object.
    #[error("RPC call rejected with code {code}: {message}")]
    Api {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },
}

impl RpcError {
    /// Whether the server was reached and rejected the call.
    #[must_use]
    pub fn is_api(&self) -> bool {
        matches!(self, RpcError::Api { .. })
    }

    /// Whether the server could not be reached, or did not answer in time.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RpcError::Request(_)
                | RpcError::InvalidRequest(_)
                | RpcError::Timeout(_)
                | RpcError::Status(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hyper::Uri;

    use super::{RpcClient, RpcError};

    #[test]
    fn endpoint_appends_json_rpc() {
        let client = RpcClient::new(
            Uri::from_static("http://example.com:11211/"),
            Duration::from_secs(1),
            Duration::from_secs(1),
            None,
        );
        assert_eq!(client.endpoint(), "http://example.com:11211/json_rpc");
        assert_eq!(client.url(), "http://example.com:11211/");
    }

    #[test]
    fn basic_auth_header() {
        let client = RpcClient::new(
            Uri::from_static("http://example.com"),
            Duration::from_secs(1),
            Duration::from_secs(1),
            Some(("user".to_string(), "pass".to_string())),
        );
        assert_eq!(
            client.authorization.as_ref().map(|v| v.to_str().ok()),
            Some(Some("Basic dXNlcjpwYXNz"))
        );
    }

    #[test]
    fn error_classification() {
        let api = RpcError::Api {
            code: -14,
            message: "not found".to_string(),
        };
        assert!(api.is_api());
        assert!(!api.is_transport());

        let status = RpcError::Status(hyper::StatusCode::BAD_GATEWAY);
        assert!(status.is_transport());
        assert!(!status.is_api());

        let missing = RpcError::MissingData("result".to_string());
        assert!(!missing.is_transport());
        assert!(!missing.is_api());
    }
}
