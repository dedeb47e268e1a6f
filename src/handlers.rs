//! HTTP endpoints of the payment gate.
//!
//! Protected resources answer `402 Payment Required` with machine-readable payment
//! instructions until the client supplies a proof (a transaction or block hash) of
//! a finalized `Balances.Transfer` that pays enough to the right account.
//!
//! Every non-success body carries a `reason` code next to the human `error` string,
//! so a client can tell "retry later" (`tx_not_finalized`, `deadline_exceeded`)
//! apart from "resubmit" (`no_qualifying_transfer`) and "fix the request".

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::instrument;

use crate::gate::{BlockLookup, GateDecision, GateError, PaymentGate, VerificationOutcome};
use crate::types::{
    DebugBlockResponse, EnrollRequest, EnrollResponse, HealthResponse, PaymentInfoQuery,
    PaymentInfoResponse, PaymentInstructions, PaymentProof, PaymentRequiredResponse,
    PaymentRequirement, PremiumQuery, PremiumResponse, ProofError, RejectionReason,
    RejectionResponse, TxToBlockResponse, VerifyRequest, VerifyResponse,
};

/// Request header carrying the proof for `/premium`: `tx=<hash>` and/or `block=<hash>`.
pub const X_PAYMENT: &str = "x-payment";
/// Response header on every 402 challenge: `recipient=<address>;amount=<planck>`.
pub const X_PAYMENT_REQUIRED: &str = "x-payment-required";

const PAY_THEN_VERIFY: &str =
    "Sign and submit transfer to recipient, then call /verify or /enroll with transactionHash";
const PAY_THEN_ENROLL: &str =
    "Sign and submit transfer to recipient, then retry with paymentProof.transactionHash";
const PAY_THEN_RETRY_WITH_HEADER: &str =
    "Sign and submit transfer to recipient, then retry with X-Payment: tx=0x... or block=0x...";
const FINALIZATION_HINT: &str =
    "Transaction may still be pending or not yet finalized. Try again in ~12 seconds.";
const PREMIUM_CONTENT: &str = "This is the premium content you paid for!";

pub fn routes() -> Router<Arc<PaymentGate>> {
    Router::new()
        .route("/", get(get_root))
        .route("/verify", post(post_verify))
        .route("/enroll/{course_id}", post(post_enroll))
        .route("/premium", get(get_premium))
        .route("/payment-info/{course_id}", get(get_payment_info))
        .route("/tx-to-block/{tx_hash}", get(get_tx_to_block))
        .route("/health", get(get_health))
        .route("/debug/{block_hash}", get(get_debug_block))
}

/// `GET /`: Returns a simple greeting message.
#[instrument(skip_all)]
pub async fn get_root() -> impl IntoResponse {
    let pkg_name = env!("CARGO_PKG_NAME");
    (StatusCode::OK, format!("Hello from {pkg_name}!"))
}

/// `POST /verify`: Checks a proof against an explicit recipient and amount.
///
/// A resolved block without a qualifying transfer is still a `200` with
/// `verified: false`; only an unresolvable transaction is a `404`.
#[instrument(skip_all)]
pub async fn post_verify(
    State(gate): State<Arc<PaymentGate>>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Response, GateError> {
    let Json(body) = body.map_err(|e| GateError::MalformedRequest(e.body_text()))?;
    let proof = PaymentProof::try_from(body.proof())?;
    let recipient = required(body.recipient, "recipient")?;
    let requirement = PaymentRequirement::new(recipient, body.amount);

    let outcome = gate.verify_proof(&proof, &requirement).await?;
    let response = match outcome {
        VerificationOutcome::Verified(payment) => (
            StatusCode::OK,
            Json(VerifyResponse {
                verified: true,
                payment,
            }),
        )
            .into_response(),
        VerificationOutcome::NotFound { reason } => {
            let body = not_found(reason, proof.tx_hash()).verified(false);
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
        VerificationOutcome::Rejected { reason, block_hash } => {
            let error = no_transfer(&requirement, &block_hash);
            let body = RejectionResponse::new(reason, error).verified(false);
            (StatusCode::OK, Json(body)).into_response()
        }
    };
    Ok(response)
}

/// `POST /enroll/{course_id}`: Pays for a course with the default recipient.
///
/// Without a `paymentProof` (or with an empty one) the client gets a 402 challenge.
#[instrument(skip_all, fields(course_id = %course_id))]
pub async fn post_enroll(
    State(gate): State<Arc<PaymentGate>>,
    Path(course_id): Path<String>,
    body: Result<Json<EnrollRequest>, JsonRejection>,
) -> Result<Response, GateError> {
    let Json(body) = body.map_err(|e| GateError::MalformedRequest(e.body_text()))?;
    let wallet_address = required(body.wallet_address, "walletAddress")?;
    let proof = match body.payment_proof {
        Some(fields) if !fields.is_absent() => Some(PaymentProof::try_from(fields)?),
        _ => None,
    };
    let requirement = PaymentRequirement::new(
        gate.settings().default_recipient.clone(),
        body.course_cost,
    );
    tracing::info!(
        %wallet_address,
        cost = body.course_cost,
        has_proof = proof.is_some(),
        "Enrollment requested"
    );

    let decision = gate
        .process(proof.clone(), &requirement, PAY_THEN_ENROLL)
        .await?;
    let response = match decision {
        GateDecision::Challenged(payment) => payment_required(PaymentRequiredResponse {
            error: "Payment Required".to_string(),
            course_id: Some(course_id),
            payment,
        }),
        GateDecision::Settled(VerificationOutcome::Verified(payment)) => {
            tracing::info!(%wallet_address, "Payment verified, enrolling");
            let message = format!("Successfully enrolled in course {course_id}");
            (
                StatusCode::OK,
                Json(EnrollResponse {
                    success: true,
                    course_id,
                    wallet_address,
                    payment,
                    message,
                }),
            )
                .into_response()
        }
        GateDecision::Settled(VerificationOutcome::NotFound { reason }) => {
            let tx_hash = proof.as_ref().and_then(PaymentProof::tx_hash);
            let body = not_found(reason, tx_hash).hint(FINALIZATION_HINT);
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
        GateDecision::Settled(VerificationOutcome::Rejected { reason, block_hash }) => {
            let body = RejectionResponse::new(reason, "Payment verification failed")
                .details(no_transfer(&requirement, &block_hash));
            (StatusCode::PAYMENT_REQUIRED, Json(body)).into_response()
        }
    };
    Ok(response)
}

/// `GET /premium`: A resource priced per request through the `X-Payment` header.
///
/// `recipient` and `amount` query parameters override the defaults.
#[instrument(skip_all)]
pub async fn get_premium(
    State(gate): State<Arc<PaymentGate>>,
    query: Result<Query<PremiumQuery>, QueryRejection>,
    headers: HeaderMap,
) -> Result<Response, GateError> {
    let Query(query) = query.map_err(|e| GateError::MalformedRequest(e.body_text()))?;
    let settings = gate.settings();
    let requirement = PaymentRequirement::new(
        query
            .recipient
            .unwrap_or_else(|| settings.default_recipient.clone()),
        query.amount.map(u128::from).unwrap_or(settings.premium_price),
    );
    let proof = match headers.get(X_PAYMENT) {
        None => None,
        Some(value) => {
            let value = value.to_str().map_err(|_| ProofError::MalformedHeader)?;
            if value.trim().is_empty() {
                None
            } else {
                Some(PaymentProof::from_header(value)?)
            }
        }
    };

    let decision = gate
        .process(proof.clone(), &requirement, PAY_THEN_RETRY_WITH_HEADER)
        .await?;
    let response = match decision {
        GateDecision::Challenged(payment) => payment_required(PaymentRequiredResponse {
            error: "Payment Required".to_string(),
            course_id: None,
            payment,
        }),
        GateDecision::Settled(VerificationOutcome::Verified(payment)) => (
            StatusCode::OK,
            Json(PremiumResponse {
                content: PREMIUM_CONTENT.to_string(),
                payment_verified: payment,
            }),
        )
            .into_response(),
        GateDecision::Settled(VerificationOutcome::NotFound { reason }) => {
            let tx_hash = proof.as_ref().and_then(PaymentProof::tx_hash);
            (StatusCode::NOT_FOUND, Json(not_found(reason, tx_hash))).into_response()
        }
        GateDecision::Settled(VerificationOutcome::Rejected { reason, block_hash }) => {
            let body = RejectionResponse::new(reason, "Payment not found")
                .details(no_transfer(&requirement, &block_hash));
            (StatusCode::PAYMENT_REQUIRED, Json(body)).into_response()
        }
    };
    Ok(response)
}

/// `GET /payment-info/{course_id}`: Payment instructions for a course, without a challenge.
#[instrument(skip_all, fields(course_id = %course_id))]
pub async fn get_payment_info(
    State(gate): State<Arc<PaymentGate>>,
    Path(course_id): Path<String>,
    query: Result<Query<PaymentInfoQuery>, QueryRejection>,
) -> Result<Response, GateError> {
    let Query(query) = query.map_err(|e| GateError::MalformedRequest(e.body_text()))?;
    let requirement = PaymentRequirement::new(
        query
            .recipient
            .unwrap_or_else(|| gate.settings().default_recipient.clone()),
        query.amount.unwrap_or(0),
    );
    let course_title = query
        .title
        .unwrap_or_else(|| format!("Course {course_id}"));
    let payment = gate.challenge(&requirement, PAY_THEN_VERIFY);
    Ok((
        StatusCode::OK,
        Json(PaymentInfoResponse {
            course_id,
            course_title,
            payment,
        }),
    )
        .into_response())
}

/// `GET /tx-to-block/{tx_hash}`: Locates the finalized block containing a transaction.
#[instrument(skip_all, fields(tx_hash = %tx_hash))]
pub async fn get_tx_to_block(
    State(gate): State<Arc<PaymentGate>>,
    Path(tx_hash): Path<String>,
) -> Result<Response, GateError> {
    let response = match gate.resolve_block(&tx_hash).await? {
        BlockLookup::Found {
            block_number,
            block_hash,
        } => (
            StatusCode::OK,
            Json(TxToBlockResponse {
                found: true,
                transaction_hash: tx_hash,
                block_hash,
                block_number,
            }),
        )
            .into_response(),
        BlockLookup::NotFound { reason } => {
            let body = RejectionResponse::new(
                reason,
                "Transaction not found in recent finalized blocks",
            )
            .found(false)
            .transaction_hash(tx_hash)
            .hint(FINALIZATION_HINT);
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
    };
    Ok(response)
}

/// `GET /health`: Reports the latest finalized block. Bootstraps the light client
/// if this is the first request.
#[instrument(skip_all)]
pub async fn get_health(State(gate): State<Arc<PaymentGate>>) -> Result<Response, GateError> {
    let latest_block = gate.latest_block().await?;
    let settings = gate.settings();
    Ok((
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            network: settings.network.clone(),
            latest_block,
            default_recipient: settings.default_recipient.clone(),
            default_recipient_hex: gate.default_recipient_hex().clone(),
        }),
    )
        .into_response())
}

/// `GET /debug/{block_hash}`: Dumps every event of a block.
#[instrument(skip_all, fields(block_hash = %block_hash))]
pub async fn get_debug_block(
    State(gate): State<Arc<PaymentGate>>,
    Path(block_hash): Path<String>,
) -> Result<Response, GateError> {
    let events = gate.block_events(&block_hash).await?;
    Ok((
        StatusCode::OK,
        Json(DebugBlockResponse {
            block_hash,
            total_events: events.len(),
            events,
        }),
    )
        .into_response())
}

fn required(value: Option<String>, field: &str) -> Result<String, GateError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GateError::MissingField(field.to_string()))
}

fn not_found(reason: RejectionReason, tx_hash: Option<&str>) -> RejectionResponse {
    let body = match reason {
        RejectionReason::DeadlineExceeded => RejectionResponse::new(
            reason,
            "Verification did not complete in time. Please retry.",
        ),
        _ => RejectionResponse::new(reason, "Transaction not found").details(match tx_hash {
            Some(tx_hash) => format!(
                "Transaction {tx_hash} not found in recent finalized blocks. Please wait for finalization and retry."
            ),
            None => "Transaction not found in recent finalized blocks.".to_string(),
        }),
    };
    match tx_hash {
        Some(tx_hash) => body.transaction_hash(tx_hash),
        None => body,
    }
}

fn no_transfer(requirement: &PaymentRequirement, block_hash: &str) -> String {
    format!(
        "No transfer of >= {} planck to {} in block {block_hash}",
        requirement.min_amount, requirement.recipient
    )
}

/// A 402 challenge, advertising the requirement in `X-Payment-Required` as well.
fn payment_required(body: PaymentRequiredResponse) -> Response {
    let advertised = advertise(&body.payment);
    let mut response = (StatusCode::PAYMENT_REQUIRED, Json(body)).into_response();
    let headers = response.headers_mut();
    match HeaderValue::try_from(advertised) {
        Ok(value) => {
            headers.insert(X_PAYMENT_REQUIRED, value);
            headers.insert(
                header::ACCESS_CONTROL_EXPOSE_HEADERS,
                HeaderValue::from_static("X-Payment-Required"),
            );
        }
        Err(e) => tracing::warn!(error = %e, "Recipient cannot be sent as a header value"),
    }
    response
}

fn advertise(payment: &PaymentInstructions) -> String {
    format!("recipient={};amount={}", payment.recipient, payment.amount)
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = match &self {
            GateError::Decode(_)
            | GateError::MalformedProof(_)
            | GateError::MalformedRequest(_)
            | GateError::MissingField(_) => {
                tracing::warn!(error = %self, "Rejected request");
                StatusCode::BAD_REQUEST
            }
            GateError::Configuration(_) | GateError::Upstream(_) => {
                tracing::error!(error = %self, "Light client failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = RejectionResponse::new(self.reason(), self.to_string());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::memory::{MemoryChain, block_hash};
    use crate::gate::tests::{ALICE, TX, gate, paid_chain};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn app(chain: &Arc<MemoryChain>) -> Router {
        routes().with_state(Arc::new(gate(chain)))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = app.oneshot(request).await.expect("infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn root_greets() {
        let chain = Arc::new(MemoryChain::new(1));
        let response = app(&chain).oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn enroll_without_proof_is_challenged() {
        let chain = Arc::new(MemoryChain::new(100));
        let (status, headers, body) = send(
            app(&chain),
            post_json(
                "/enroll/123",
                json!({ "walletAddress": "5Fpayer", "courseCost": 1_000_000_000u64 }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["courseId"], "123");
        assert_eq!(body["payment"]["recipient"], ALICE);
        assert_eq!(body["payment"]["amount"], 1_000_000_000u64);
        assert_eq!(body["payment"]["network"], "paseo");
        assert_eq!(
            body["payment"]["recipientHex"],
            "0xd43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d"
        );
        assert_eq!(
            headers[X_PAYMENT_REQUIRED],
            format!("recipient={ALICE};amount=1000000000").as_str()
        );
        assert_eq!(
            headers[header::ACCESS_CONTROL_EXPOSE_HEADERS],
            "X-Payment-Required"
        );
        assert_eq!(chain.head_calls(), 0);
    }

    #[tokio::test]
    async fn enroll_with_empty_proof_object_is_challenged() {
        let chain = Arc::new(MemoryChain::new(100));
        let (status, _, _) = send(
            app(&chain),
            post_json(
                "/enroll/7",
                json!({ "walletAddress": "5Fpayer", "courseCost": 10, "paymentProof": {} }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    }

    #[tokio::test]
    async fn enroll_with_paid_tx_succeeds() {
        let chain = Arc::new(paid_chain());
        let (status, _, body) = send(
            app(&chain),
            post_json(
                "/enroll/123",
                json!({
                    "walletAddress": "5Fpayer",
                    "courseCost": 1_000_000_000u64,
                    "paymentProof": { "transactionHash": TX },
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["walletAddress"], "5Fpayer");
        assert_eq!(body["payment"]["block_hash"], block_hash(97));
        assert_eq!(body["payment"]["transactionHash"], TX);
        assert_eq!(body["message"], "Successfully enrolled in course 123");
    }

    #[tokio::test]
    async fn enroll_with_unknown_tx_is_not_found_with_hint() {
        let chain = Arc::new(MemoryChain::new(100));
        let (status, _, body) = send(
            app(&chain),
            post_json(
                "/enroll/123",
                json!({
                    "walletAddress": "5Fpayer",
                    "courseCost": 1,
                    "paymentProof": { "transactionHash": TX },
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["reason"], "tx_not_finalized");
        assert!(body["hint"].as_str().unwrap().contains("12 seconds"));
    }

    #[tokio::test]
    async fn enroll_with_short_payment_needs_payment() {
        let chain = Arc::new(paid_chain());
        let (status, _, body) = send(
            app(&chain),
            post_json(
                "/enroll/123",
                json!({
                    "walletAddress": "5Fpayer",
                    "courseCost": 5_000_000_000u64,
                    "paymentProof": { "transactionHash": TX },
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["reason"], "no_qualifying_transfer");
    }

    #[tokio::test]
    async fn enroll_requires_wallet_address() {
        let chain = Arc::new(MemoryChain::new(100));
        let (status, _, body) = send(
            app(&chain),
            post_json("/enroll/123", json!({ "courseCost": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reason"], "missing_fields");
    }

    #[tokio::test]
    async fn verify_with_block_hash_skips_search() {
        let chain = Arc::new(paid_chain());
        let (status, _, body) = send(
            app(&chain),
            post_json(
                "/verify",
                json!({
                    "blockHash": block_hash(97),
                    "recipient": ALICE,
                    "amount": 1_000_000_000u64,
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verified"], true);
        assert_eq!(body["payment"]["amount"], 2_000_000_000u64);
        assert_eq!(body["payment"]["to_ss58"], ALICE);
        assert_eq!(chain.head_calls(), 0);
        assert_eq!(chain.block_calls(), 0);
    }

    #[tokio::test]
    async fn verify_without_match_is_unverified_but_ok() {
        let chain = Arc::new(paid_chain());
        let (status, _, body) = send(
            app(&chain),
            post_json(
                "/verify",
                json!({ "transactionHash": TX, "recipient": ALICE, "amount": 3_000_000_000u64 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verified"], false);
        assert_eq!(body["reason"], "no_qualifying_transfer");
    }

    #[tokio::test]
    async fn verify_unknown_tx_is_not_found() {
        let chain = Arc::new(MemoryChain::new(100));
        let (status, _, body) = send(
            app(&chain),
            post_json(
                "/verify",
                json!({ "transactionHash": TX, "recipient": ALICE, "amount": 1 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["verified"], false);
        assert_eq!(body["reason"], "tx_not_finalized");
        assert_eq!(body["transactionHash"], TX);
    }

    #[tokio::test]
    async fn verify_rejects_incomplete_requests() {
        let chain = Arc::new(paid_chain());

        let (status, _, body) = send(
            app(&chain),
            post_json("/verify", json!({ "recipient": ALICE, "amount": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reason"], "missing_fields");

        let (status, _, body) = send(
            app(&chain),
            post_json("/verify", json!({ "transactionHash": TX, "amount": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reason"], "missing_fields");

        let (status, _, body) = send(
            app(&chain),
            post_json(
                "/verify",
                json!({ "transactionHash": TX, "recipient": "nope0OIl", "amount": 1 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reason"], "invalid_recipient");

        let request = Request::post("/verify")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _, body) = send(app(&chain), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reason"], "malformed_request");
        assert_eq!(chain.head_calls(), 0);
    }

    #[tokio::test]
    async fn premium_without_header_is_challenged_at_default_price() {
        let chain = Arc::new(MemoryChain::new(100));
        let (status, headers, body) = send(app(&chain), get("/premium")).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["payment"]["amount"], 1_000_000_000u64);
        assert!(body.get("courseId").is_none());
        assert!(headers.contains_key(X_PAYMENT_REQUIRED));

        let (status, _, body) = send(app(&chain), get("/premium?amount=42")).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["payment"]["amount"], 42);
    }

    #[tokio::test]
    async fn premium_with_paid_header_serves_content() {
        let chain = Arc::new(paid_chain());
        let request = Request::get("/premium")
            .header(X_PAYMENT, format!("tx={TX}"))
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(app(&chain), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], PREMIUM_CONTENT);
        assert_eq!(body["payment_verified"]["event_index"], 1);
    }

    #[tokio::test]
    async fn premium_with_malformed_header_is_bad_request() {
        let chain = Arc::new(paid_chain());
        let request = Request::get("/premium")
            .header(X_PAYMENT, "receipt=0x01")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(app(&chain), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reason"], "malformed_proof");
    }

    #[tokio::test]
    async fn premium_with_unknown_tx_is_not_found() {
        let chain = Arc::new(MemoryChain::new(100));
        let request = Request::get("/premium")
            .header(X_PAYMENT, format!("tx={TX}"))
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(app(&chain), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["reason"], "tx_not_finalized");
        assert_eq!(body["transactionHash"], TX);
        assert!(headers.get(X_PAYMENT_REQUIRED).is_none());
    }

    #[tokio::test]
    async fn premium_underpaid_block_needs_payment() {
        let chain = Arc::new(paid_chain());
        let request = Request::get("/premium?amount=3000000000")
            .header(X_PAYMENT, format!("block={}", block_hash(97)))
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(app(&chain), request).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["reason"], "no_qualifying_transfer");
        assert_eq!(chain.block_calls(), 0);
    }

    #[tokio::test]
    async fn payment_info_defaults_title_and_recipient() {
        let chain = Arc::new(MemoryChain::new(100));
        let (status, _, body) = send(app(&chain), get("/payment-info/9?amount=500")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["courseId"], "9");
        assert_eq!(body["courseTitle"], "Course 9");
        assert_eq!(body["payment"]["recipient"], ALICE);
        assert_eq!(body["payment"]["amount"], 500);
        assert_eq!(body["payment"]["currency"], "PAS");
    }

    #[tokio::test]
    async fn tx_to_block_reports_found_and_missing() {
        let chain = Arc::new(paid_chain());
        let (status, _, body) = send(app(&chain), get(&format!("/tx-to-block/{TX}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["found"], true);
        assert_eq!(body["blockHash"], block_hash(97));
        assert_eq!(body["blockNumber"], 97);

        let missing = "0x00000000000000000000000000000000000000000000000000000000000000bb";
        let (status, _, body) = send(app(&chain), get(&format!("/tx-to-block/{missing}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["found"], false);
        assert_eq!(body["transactionHash"], missing);
    }

    #[tokio::test]
    async fn health_reports_head_or_upstream_failure() {
        let chain = Arc::new(MemoryChain::new(100));
        let (status, _, body) = send(app(&chain), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["latestBlock"], 100);
        assert_eq!(body["defaultRecipient"], ALICE);

        chain.set_unavailable(true);
        let (status, _, body) = send(app(&chain), get("/health")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["reason"], "upstream_unavailable");
    }

    #[tokio::test]
    async fn debug_lists_normalized_events() {
        let chain = Arc::new(paid_chain());
        let (status, _, body) = send(app(&chain), get(&format!("/debug/{}", block_hash(97)))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_events"], 1);
        assert_eq!(body["events"][0]["pallet"], "Balances");
        assert!(body["events"][0]["fields"]["to"].as_str().unwrap().starts_with("0xd435"));
    }
}
