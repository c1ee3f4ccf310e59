//! Transaction session data model.
//!
//! A session is a bounded-lifetime unit of work: one or more deployments
//! that each require an external wallet signature before the server
//! considers the operation complete. The member list is fixed at creation;
//! only statuses, hashes, and orchestrator-prepared payloads change
//! afterwards, and only through the confirmation protocol in
//! [`service::SessionService`].

#[cfg(feature = "libsql")]
pub mod libsql;
pub mod service;
pub mod store;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a session or of one deployment within it.
///
/// Transitions are monotonic: `pending -> {confirmed|failed}`, nothing
/// after a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Opaque key/value context supplied at session creation, preserved in
/// insertion order. Chain-agnostic; never interpreted by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
}

impl MetadataEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One signature-requiring step within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDeployment {
    /// Shown to the signer; no semantic effect on verification.
    pub title: String,
    pub description: String,
    /// Discriminator for hook dispatch, e.g. "deploy-token".
    #[serde(rename = "type")]
    pub kind: String,
    /// Encoded call/deploy payload, 0x-prefixed hex. Empty until the
    /// orchestrator has prepared a dependent step.
    pub data: String,
    /// Transfer amount in wei, decimal string.
    pub value: String,
    /// Destination address. Absent (or the zero address) signals a
    /// contract-creation transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    pub status: TxStatus,
    /// Hash observed after wallet submission, recorded at confirmation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Address from the receipt, for contract-creation steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
}

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

impl TransactionDeployment {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        kind: impl Into<String>,
        data: impl Into<String>,
        value: impl Into<String>,
        receiver: Option<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            kind: kind.into(),
            data: data.into(),
            value: value.into(),
            receiver,
            status: TxStatus::Pending,
            tx_hash: None,
            contract_address: None,
        }
    }

    pub fn is_contract_creation(&self) -> bool {
        match self.receiver.as_deref() {
            None => true,
            Some(addr) => addr.eq_ignore_ascii_case(ZERO_ADDRESS),
        }
    }
}

/// A signing session and its ordered deployments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSession {
    pub id: Uuid,
    /// Reference into the chain registry. Immutable after creation.
    pub chain_ref: String,
    /// Insertion order is execution/dependency order. Fixed at creation.
    pub deployments: Vec<TransactionDeployment>,
    pub status: TxStatus,
    pub metadata: Vec<MetadataEntry>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TransactionSession {
    pub fn new(
        chain_ref: impl Into<String>,
        deployments: Vec<TransactionDeployment>,
        metadata: Vec<MetadataEntry>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            chain_ref: chain_ref.into(),
            deployments,
            status: TxStatus::Pending,
            metadata,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// A session past `expires_at` is invalid for signing and confirmation.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Recompute the aggregate status from member statuses.
    ///
    /// The aggregate is a pure function of the members plus the session's
    /// own failure flag: a failed session stays failed, a session whose
    /// members are all confirmed becomes confirmed, everything else is
    /// pending. The aggregate is never set to confirmed independently of
    /// the members.
    pub fn recompute_status(&mut self) {
        if self.status == TxStatus::Failed {
            return;
        }
        if self
            .deployments
            .iter()
            .all(|d| d.status == TxStatus::Confirmed)
        {
            self.status = TxStatus::Confirmed;
        } else {
            self.status = TxStatus::Pending;
        }
    }

    /// Relative signing URL handed to the wallet page.
    pub fn signing_url(&self) -> String {
        format!("/tx/{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn deployment(kind: &str) -> TransactionDeployment {
        TransactionDeployment::new(
            format!("Deploy {kind}"),
            "test deployment",
            kind,
            "0x6080",
            "0",
            None,
        )
    }

    fn session(n: usize) -> TransactionSession {
        let deployments = (0..n).map(|i| deployment(&format!("step-{i}"))).collect();
        TransactionSession::new("localhost", deployments, Vec::new(), Duration::minutes(30))
    }

    #[test]
    fn aggregate_confirmed_iff_all_members_confirmed() {
        let mut s = session(3);
        assert_eq!(s.status, TxStatus::Pending);

        s.deployments[0].status = TxStatus::Confirmed;
        s.recompute_status();
        assert_eq!(s.status, TxStatus::Pending);

        s.deployments[1].status = TxStatus::Confirmed;
        s.deployments[2].status = TxStatus::Confirmed;
        s.recompute_status();
        assert_eq!(s.status, TxStatus::Confirmed);
    }

    #[test]
    fn failed_session_stays_failed() {
        let mut s = session(2);
        s.status = TxStatus::Failed;
        s.deployments[0].status = TxStatus::Confirmed;
        s.deployments[1].status = TxStatus::Confirmed;
        s.recompute_status();
        assert_eq!(s.status, TxStatus::Failed);
    }

    #[test]
    fn expiry_is_ttl_from_creation() {
        let s = session(1);
        assert!(!s.is_expired(Utc::now()));
        assert!(s.is_expired(s.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn missing_or_zero_receiver_signals_contract_creation() {
        let mut d = deployment("deploy-token");
        assert!(d.is_contract_creation());

        d.receiver = Some("0x0000000000000000000000000000000000000000".to_string());
        assert!(d.is_contract_creation());

        d.receiver = Some("0x00000000000000000000000000000000DeaDBeef".to_string());
        assert!(!d.is_contract_creation());
    }

    #[test]
    fn wire_format_uses_camel_case_and_type_discriminator() {
        let s = session(1);
        let value = serde_json::to_value(&s).expect("serializes");
        assert!(value["chainRef"].is_string());
        assert!(value["expiresAt"].is_string());
        assert_eq!(value["deployments"][0]["type"], "step-0");
        assert_eq!(value["deployments"][0]["status"], "pending");
    }

    #[test]
    fn signing_url_embeds_session_id() {
        let s = session(1);
        assert_eq!(s.signing_url(), format!("/tx/{}", s.id));
    }
}
