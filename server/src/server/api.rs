//! The HTTP API of the listener server.
//!
//! Daemons and wallets are pointed at the `/daemon-callback/*` routes (e.g.
//! via `--block-notify` and `--tx-notify` style hooks), while the invoicing
//! system uses the `/invoice` and `/summary` routes.

use axum::{
    extract::{Path, Query, State as AxumState},
    http::HeaderValue,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use cryptonote_listener::{storage::Storage, Invoice, InvoiceId, ListenerError};
use hyper::{http::header::CACHE_CONTROL, StatusCode};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::server::state::State;

pub(crate) fn router<S: Storage + 'static>(state: State<S>) -> Router {
    Router::new()
        .route("/daemon-callback/block", post(block_callback).get(block_callback))
        .route("/daemon-callback/tx", post(tx_callback).get(tx_callback))
        .route("/summary", get(summaries))
        .route("/summary/:crypto_code", get(summary))
        .route("/invoice", post(new_invoice))
        .route("/invoice/:invoice_id", get(invoice))
        .with_state(state)
}

/// Query string of a daemon or wallet notification.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallbackQuery {
    crypto_code: String,
    hash: Option<String>,
}

async fn block_callback<S: Storage + 'static>(
    AxumState(state): AxumState<State<S>>,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse, ApiError> {
    debug!(
        "Block notification for {}: {}",
        query.crypto_code,
        query.hash.as_deref().unwrap_or("<no hash>")
    );
    state
        .payment_gateway
        .notify_block(&query.crypto_code, query.hash)
        .await?;
    Ok(StatusCode::OK)
}

async fn tx_callback<S: Storage + 'static>(
    AxumState(state): AxumState<State<S>>,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tx_hash = query.hash.ok_or(ApiError::MissingHash)?;
    debug!("Transaction notification for {}: {tx_hash}", query.crypto_code);
    state
        .payment_gateway
        .notify_transaction(&query.crypto_code, tx_hash)
        .await?;
    Ok(StatusCode::OK)
}

async fn summaries<S: Storage + 'static>(
    AxumState(state): AxumState<State<S>>,
) -> impl IntoResponse {
    (
        [(CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        Json(state.payment_gateway.summaries()),
    )
}

async fn summary<S: Storage + 'static>(
    AxumState(state): AxumState<State<S>>,
    Path(crypto_code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let gateway = &state.payment_gateway;
    if !gateway.is_configured(&crypto_code) {
        return Err(ApiError::ChainNotFound(crypto_code));
    }
    let summary = gateway
        .summary(&crypto_code)
        .ok_or(ApiError::NotYetObserved(crypto_code))?;
    Ok((
        [(CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        Json(summary),
    ))
}

/// Body returned when an invoice is accepted.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct InvoiceIdPayload {
    /// ID of the stored invoice.
    pub invoice_id: InvoiceId,
}

async fn new_invoice<S: Storage + 'static>(
    AxumState(state): AxumState<State<S>>,
    Json(invoice): Json<Invoice>,
) -> Result<impl IntoResponse, ApiError> {
    let invoice_id = invoice.id().clone();
    if state
        .payment_gateway
        .get_invoice(invoice_id.clone())
        .await?
        .is_some()
    {
        return Err(ApiError::InvoiceExists(invoice_id));
    }
    state.payment_gateway.insert_invoice(invoice).await?;
    debug!("Accepted invoice {invoice_id}");
    Ok((
        StatusCode::CREATED,
        [(CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        Json(InvoiceIdPayload { invoice_id }),
    ))
}

async fn invoice<S: Storage + 'static>(
    AxumState(state): AxumState<State<S>>,
    Path(invoice_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let invoice_id = InvoiceId::new(invoice_id);
    let invoice = state
        .payment_gateway
        .get_invoice(invoice_id.clone())
        .await?
        .ok_or(ApiError::InvoiceNotFound(invoice_id))?;
    Ok((
        [(CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        Json(invoice),
    ))
}

/// An error that can be sent back over the API to the client.
#[derive(Error, Debug)]
pub enum ApiError {
    /// An error originating from the listener library.
    #[error(transparent)]
    Listener(#[from] ListenerError),
    /// A transaction notification without a hash.
    #[error("transaction notification is missing the hash parameter")]
    MissingHash,
    /// No daemon or wallet is configured for the chain.
    #[error("chain {0} is not configured")]
    ChainNotFound(String),
    /// The chain has not been checked yet.
    #[error("chain {0} has not been observed yet")]
    NotYetObserved(String),
    /// Invoice not found.
    #[error("invoice with ID {0} not found")]
    InvoiceNotFound(InvoiceId),
    /// Invoice already tracked.
    #[error("invoice with ID {0} already exists")]
    InvoiceExists(InvoiceId),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Listener(ListenerError::NotConfigured(_))
            | Self::ChainNotFound(_)
            | Self::NotYetObserved(_)
            | Self::InvoiceNotFound(_) => StatusCode::NOT_FOUND,
            Self::Listener(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MissingHash => StatusCode::BAD_REQUEST,
            Self::InvoiceExists(_) => StatusCode::CONFLICT,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Self::Listener(ListenerError::NotConfigured(_)) | Self::ChainNotFound(_) => {
                "Chain not configured"
            }
            Self::Listener(_) => "Internal payment listener error",
            Self::MissingHash => "Missing hash parameter",
            Self::NotYetObserved(_) => "Chain not observed yet",
            Self::InvoiceNotFound(_) => "Invoice not found",
            Self::InvoiceExists(_) => "Invoice already exists",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status_code().is_server_error() {
            error!("{self}");
        } else {
            debug!("{self}");
        }
        (self.status_code(), self.message()).into_response()
    }
}
