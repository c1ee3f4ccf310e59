//! Wire types for the signing API.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;
use crate::session::{MetadataEntry, TransactionDeployment, TransactionSession, TxStatus};

/// Request body for `POST /api/tx`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub chain_ref: String,
    pub deployments: Vec<DeploymentRequest>,
    #[serde(default)]
    pub metadata: Vec<MetadataEntry>,
}

/// One deployment in a creation request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
    #[serde(default = "zero_value")]
    pub value: String,
    #[serde(default)]
    pub receiver: Option<String>,
}

fn zero_value() -> String {
    "0".to_string()
}

impl From<DeploymentRequest> for TransactionDeployment {
    fn from(req: DeploymentRequest) -> Self {
        TransactionDeployment::new(
            req.title,
            req.description,
            req.kind,
            req.data,
            req.value,
            req.receiver,
        )
    }
}

/// Body of `POST /api/tx/{session_id}/transaction/{index}`.
///
/// Only `transactionHash` influences the outcome; the rest is recorded or
/// echoed for the wallet page's benefit. The wallet's own view of the
/// status is never trusted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmDeploymentRequest {
    pub transaction_hash: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub signed_message: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

/// Response to a confirmation: the report echoed back plus the session as
/// it stands after verification.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmDeploymentResponse {
    pub transaction_hash: String,
    pub status: TxStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    pub session: SessionResponse,
}

/// Session representation served to the signing page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: Uuid,
    pub chain_ref: String,
    pub status: TxStatus,
    pub deployments: Vec<TransactionDeployment>,
    pub metadata: Vec<MetadataEntry>,
    pub signing_url: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl From<TransactionSession> for SessionResponse {
    fn from(session: TransactionSession) -> Self {
        let signing_url = session.signing_url();
        Self {
            id: session.id,
            chain_ref: session.chain_ref,
            status: session.status,
            deployments: session.deployments,
            metadata: session.metadata,
            signing_url,
            created_at: session.created_at,
            expires_at: session.expires_at,
        }
    }
}

/// JSON error body: `{"error": "..."}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Session errors mapped onto HTTP statuses.
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let status = match &err {
            SessionError::NotFound { .. } => StatusCode::NOT_FOUND,
            SessionError::EmptyDeployments
            | SessionError::InvalidIndex { .. }
            | SessionError::Chain(_) => StatusCode::BAD_REQUEST,
            SessionError::AlreadyFailed { .. }
            | SessionError::Verification(_)
            | SessionError::Storage(_)
            | SessionError::Plan(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_errors_map_to_expected_statuses() {
        let id = Uuid::new_v4();
        let api: ApiError = SessionError::NotFound { id }.into();
        assert_eq!(api.status, StatusCode::NOT_FOUND);

        let api: ApiError = SessionError::InvalidIndex { index: 9, len: 2 }.into();
        assert_eq!(api.status, StatusCode::BAD_REQUEST);

        let api: ApiError = SessionError::Verification(crate::error::VerifyError::Reverted {
            tx_hash: "0xdead".to_string(),
        })
        .into();
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn confirm_request_accepts_minimal_body() {
        let body: ConfirmDeploymentRequest = serde_json::from_str(
            r#"{"transactionHash": "0xabc"}"#,
        )
        .expect("minimal body parses");
        assert_eq!(body.transaction_hash, "0xabc");
        assert!(body.contract_address.is_none());
        assert!(body.signature.is_none());
    }

    #[test]
    fn deployment_request_uses_type_discriminator() {
        let body: DeploymentRequest = serde_json::from_str(
            r#"{"title": "Token", "type": "deploy-token", "data": "0x6080"}"#,
        )
        .expect("parses");
        assert_eq!(body.kind, "deploy-token");
        assert_eq!(body.value, "0");
    }
}
