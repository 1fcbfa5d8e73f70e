//! Stripe webhook endpoint
//!
//! Every verified delivery is acknowledged with 200 once its outcome is
//! durably recorded, whether or not a handler ran or succeeded. Verification
//! failures get 400. Store outages and duplicates still in flight get 503 so
//! the provider redelivers.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};
use subhook_billing::webhooks::{IngestError, StoreError, SIGNATURE_HEADER};

use crate::error::ApiResult;
use crate::state::AppState;

/// POST /webhook
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());

    match state.webhooks.ingest(&body, signature).await {
        Ok(report) => {
            tracing::debug!(
                event_id = %report.event_id,
                outcome = %report.outcome,
                duplicate = report.duplicate,
                "Webhook acknowledged"
            );
        }
        Err(IngestError::Store(StoreError::Conflict { event_id, detail })) => {
            tracing::warn!(
                event_id = %event_id,
                detail = %detail,
                "Webhook processing conflict - treating as already processed"
            );
        }
        Err(e) => return Err(e.into()),
    }

    Ok(Json(json!({ "status": "success" })))
}
