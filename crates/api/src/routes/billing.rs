//! Checkout endpoints used by the subscription page

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use stripe::Subscription;
use subhook_billing::BillingService;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PublicKeyResponse {
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCustomerRequest {
    pub email: Option<String>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    #[serde(rename = "subscriptionId")]
    pub subscription_id: Option<String>,
}

/// GET /public-key
pub async fn get_public_key(State(state): State<AppState>) -> Json<PublicKeyResponse> {
    Json(PublicKeyResponse {
        public_key: state.config.publishable_key.clone(),
    })
}

/// POST /create-customer
///
/// Reuses the customer already linked to the email, then subscribes it.
pub async fn create_customer(
    State(state): State<AppState>,
    payload: Result<Json<CreateCustomerRequest>, JsonRejection>,
) -> ApiResult<Json<Subscription>> {
    let Json(req) = payload?;
    let billing = require_billing(&state)?;
    let email = required(req.email, "email")?;
    let payment_method = required(req.payment_method, "payment_method")?;

    let customer = billing
        .customer
        .get_or_create(&email, &payment_method)
        .await?;
    let subscription = billing
        .subscriptions
        .create_for_customer(&customer.id)
        .await?;

    Ok(Json(subscription))
}

/// POST /subscription
pub async fn get_subscription(
    State(state): State<AppState>,
    payload: Result<Json<SubscriptionRequest>, JsonRejection>,
) -> ApiResult<Json<Subscription>> {
    let Json(req) = payload?;
    let billing = require_billing(&state)?;
    let subscription_id = required(req.subscription_id, "subscriptionId")?;

    let subscription = billing.subscriptions.retrieve(&subscription_id).await?;
    Ok(Json(subscription))
}

fn require_billing(state: &AppState) -> ApiResult<&Arc<BillingService>> {
    state
        .billing
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("Billing is not configured".to_string()))
}

fn required(value: Option<String>, field: &str) -> ApiResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Validation(format!("{} is required", field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::routes::create_router;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use subhook_billing::webhooks::InMemoryEventStore;
    use tower::ServiceExt;

    fn app(vars: &[(&str, &str)]) -> axum::Router {
        let vars: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = Config::from_lookup(|name| {
            vars.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
        })
        .unwrap();
        create_router(AppState::new(
            config,
            Arc::new(InMemoryEventStore::new()),
            None,
        ))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_public_key() {
        let app = app(&[("STRIPE_PUBLISHABLE_KEY", "pk_test_abc")]);

        let response = app
            .oneshot(Request::get("/public-key").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"publicKey": "pk_test_abc"})
        );
    }

    #[tokio::test]
    async fn test_checkout_unavailable_without_billing() {
        let app = app(&[]);

        let response = app
            .oneshot(
                Request::post("/create-customer")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"email":"jenny@example.com","payment_method":"pm_card_visa"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"error": "Billing is not configured"})
        );
    }

    #[tokio::test]
    async fn test_malformed_json_is_json_error() {
        for (path, content_type, body) in [
            ("/create-customer", "application/json", r#"{"email": "#),
            ("/subscription", "application/json", r#"{"subscriptionId": 42}"#),
            ("/create-customer", "text/plain", r#"{"email":"jenny@example.com"}"#),
        ] {
            let response = app(&[])
                .oneshot(
                    Request::post(path)
                        .header("content-type", content_type)
                        .body(Body::from(body))
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{} {}", path, body);
            let json = body_json(response).await;
            assert!(json["error"].is_string(), "{} returned {}", path, json);
        }
    }

    #[test]
    fn test_required_fields() {
        assert_eq!(required(Some(" a@b.c ".into()), "email").unwrap(), "a@b.c");
        assert!(matches!(
            required(None, "email"),
            Err(ApiError::Validation(msg)) if msg == "email is required"
        ));
        assert!(required(Some("   ".into()), "subscriptionId").is_err());
    }
}
