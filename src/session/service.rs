//! Session lifecycle and the confirmation protocol.
//!
//! The service owns every state transition: creation, lookup with expiry
//! enforcement, verified confirmation, and the expired-session sweep.
//! Confirmations for the same session are serialized through a per-session
//! lock so concurrent wallet callbacks cannot interleave member updates.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::store::SessionStore;
use super::{MetadataEntry, TransactionDeployment, TransactionSession, TxStatus};
use crate::chains::ChainRegistry;
use crate::error::{SessionError, VerifyError};
use crate::hooks::{HookContext, HookDispatcher};
use crate::orchestrator::DeploymentPlan;
use crate::verifier::TransactionVerifier;

/// What the wallet reported after submitting a transaction.
///
/// Everything here is untrusted input; the verifier decides the actual
/// outcome from the chain.
#[derive(Debug, Clone)]
pub struct ObservedConfirmation {
    pub tx_hash: String,
    pub contract_address: Option<String>,
}

/// Orchestrates signing sessions end to end.
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    chains: Arc<ChainRegistry>,
    verifier: Arc<dyn TransactionVerifier>,
    hooks: Arc<HookDispatcher>,
    ttl: Duration,
    /// One lock per live session; confirmations serialize on it.
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    /// Deployment plans for plan-backed sessions, advanced as members
    /// confirm. Dropped when the session reaches a terminal state.
    plans: Mutex<HashMap<Uuid, DeploymentPlan>>,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        chains: Arc<ChainRegistry>,
        verifier: Arc<dyn TransactionVerifier>,
        hooks: Arc<HookDispatcher>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            chains,
            verifier,
            hooks,
            ttl,
            locks: Mutex::new(HashMap::new()),
            plans: Mutex::new(HashMap::new()),
        }
    }

    /// Create a session from pre-encoded deployments.
    pub async fn create_session(
        &self,
        chain_ref: &str,
        deployments: Vec<TransactionDeployment>,
        metadata: Vec<MetadataEntry>,
    ) -> Result<TransactionSession, SessionError> {
        if deployments.is_empty() {
            return Err(SessionError::EmptyDeployments);
        }
        // Fail creation, not confirmation, on an unknown chain.
        self.chains.resolve(chain_ref)?;

        let session = TransactionSession::new(chain_ref, deployments, metadata, self.ttl);
        self.store.insert(&session).await?;

        tracing::info!(
            session_id = %session.id,
            chain = chain_ref,
            deployments = session.deployments.len(),
            expires_at = %session.expires_at,
            "session created"
        );
        Ok(session)
    }

    /// Create a session driven by a deployment plan.
    ///
    /// One member per plan step, in plan order. Steps whose dependencies
    /// are already satisfied get their payload encoded now; the rest carry
    /// an empty payload until the step they depend on confirms.
    pub async fn create_plan_session(
        &self,
        chain_ref: &str,
        plan: DeploymentPlan,
        metadata: Vec<MetadataEntry>,
    ) -> Result<TransactionSession, SessionError> {
        self.chains.resolve(chain_ref)?;

        let mut deployments = Vec::with_capacity(plan.len());
        for (i, step) in plan.steps().iter().enumerate() {
            let data = if plan.is_ready(i)? {
                plan.prepare(i)?
            } else {
                String::new()
            };
            let mut deployment = TransactionDeployment::new(
                step.title.clone(),
                step.description.clone(),
                step.kind.clone(),
                data,
                step.value.clone(),
                None,
            );
            deployment.status = TxStatus::Pending;
            deployments.push(deployment);
        }

        let session = TransactionSession::new(chain_ref, deployments, metadata, self.ttl);
        // Register the plan before the row is visible so a confirmation
        // racing the creation response cannot observe a plan-less session.
        self.plans.lock().await.insert(session.id, plan);
        if let Err(e) = self.store.insert(&session).await {
            self.plans.lock().await.remove(&session.id);
            return Err(e.into());
        }

        tracing::info!(
            session_id = %session.id,
            chain = chain_ref,
            steps = session.deployments.len(),
            "plan session created"
        );
        Ok(session)
    }

    /// Look up a live session. Expired sessions are reported as not found;
    /// a caller cannot distinguish "never existed" from "expired".
    pub async fn get_session(&self, id: Uuid) -> Result<TransactionSession, SessionError> {
        let session = self
            .store
            .get(id)
            .await?
            .ok_or(SessionError::NotFound { id })?;
        if session.is_expired(Utc::now()) {
            return Err(SessionError::NotFound { id });
        }
        Ok(session)
    }

    /// Confirm one deployment against the chain.
    ///
    /// Verifies the reported hash before mutating anything. On success the
    /// member is confirmed, dependent plan steps get their payloads
    /// encoded, the new state is persisted, and hooks run. On verification
    /// failure the member and the whole session are marked failed first,
    /// then the error propagates: an unverifiable report invalidates the
    /// session rather than leaving it half-trusted.
    ///
    /// Re-confirming an already-confirmed member is a no-op that returns
    /// the current state; receipts are immutable, so there is nothing new
    /// to learn.
    pub async fn confirm_deployment(
        &self,
        id: Uuid,
        index: usize,
        observed: ObservedConfirmation,
    ) -> Result<TransactionSession, SessionError> {
        let lock = self.session_lock(id).await;
        let _guard = lock.lock().await;

        let mut session = self.get_session(id).await?;

        let len = session.deployments.len();
        if index >= len {
            return Err(SessionError::InvalidIndex { index, len });
        }
        if session.status == TxStatus::Failed {
            return Err(SessionError::AlreadyFailed { id });
        }
        if session.deployments[index].status == TxStatus::Confirmed {
            tracing::debug!(
                session_id = %id,
                index,
                "deployment already confirmed, returning current state"
            );
            return Ok(session);
        }

        let chain = self.chains.resolve(&session.chain_ref)?;

        let receipt = match self.verifier.verify(&observed.tx_hash, &chain).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.fail_session(&mut session, index, &observed, &e).await?;
                return Err(e.into());
            }
        };

        {
            let member = &mut session.deployments[index];
            member.status = TxStatus::Confirmed;
            member.tx_hash = Some(observed.tx_hash.clone());
            // The receipt is authoritative; the wallet's report only fills
            // the gap when the node omits the field.
            member.contract_address = receipt
                .contract_address
                .clone()
                .or(observed.contract_address.clone());
        }
        session.recompute_status();

        self.advance_plan(&mut session, index).await?;
        self.store.update(&session).await?;

        tracing::info!(
            session_id = %id,
            index,
            tx_hash = %observed.tx_hash,
            session_status = session.status.as_str(),
            "deployment confirmed"
        );

        if session.status.is_terminal() {
            self.release(id).await;
        }
        drop(_guard);

        if let Some(ctx) = HookContext::from_confirmed(&session, index) {
            self.hooks.dispatch(&ctx).await;
        }

        Ok(session)
    }

    /// Remove sessions past their expiry, and the bookkeeping that goes
    /// with them. Returns the number of sessions removed.
    ///
    /// Lock and plan entries for purged sessions are dropped here as well:
    /// a session that expires while still pending never reaches the
    /// terminal-state cleanup in `confirm_deployment`, and the maps must
    /// not grow for the life of the process.
    pub async fn purge_expired(&self) -> Result<usize, SessionError> {
        let removed = self.store.purge_expired(Utc::now()).await?;
        if !removed.is_empty() {
            let mut locks = self.locks.lock().await;
            let mut plans = self.plans.lock().await;
            for id in &removed {
                locks.remove(id);
                plans.remove(id);
            }
            tracing::info!(removed = removed.len(), "purged expired sessions");
        }
        Ok(removed.len())
    }

    /// Mark the member and the whole session failed, persist, and poison
    /// any backing plan. Runs under the session lock.
    async fn fail_session(
        &self,
        session: &mut TransactionSession,
        index: usize,
        observed: &ObservedConfirmation,
        cause: &VerifyError,
    ) -> Result<(), SessionError> {
        let member = &mut session.deployments[index];
        member.status = TxStatus::Failed;
        member.tx_hash = Some(observed.tx_hash.clone());
        session.status = TxStatus::Failed;
        self.store.update(session).await?;

        if let Some(plan) = self.plans.lock().await.get_mut(&session.id) {
            let _ = plan.record_failed(index);
        }
        self.release(session.id).await;

        tracing::warn!(
            session_id = %session.id,
            index,
            tx_hash = %observed.tx_hash,
            error = %cause,
            "verification failed, session marked failed"
        );
        Ok(())
    }

    /// Record the confirmed step in the backing plan, then encode payloads
    /// for every step that just became ready.
    async fn advance_plan(
        &self,
        session: &mut TransactionSession,
        confirmed_index: usize,
    ) -> Result<(), SessionError> {
        let mut plans = self.plans.lock().await;
        let Some(plan) = plans.get_mut(&session.id) else {
            return Ok(());
        };

        match session.deployments[confirmed_index].contract_address.clone() {
            Some(address) => plan.record_confirmed(confirmed_index, address)?,
            // Without an address, dependent steps can never be prepared;
            // make the stall visible instead of silent.
            None => tracing::warn!(
                session_id = %session.id,
                index = confirmed_index,
                "plan step confirmed without a contract address; dependent steps stay blocked"
            ),
        }

        for (i, member) in session.deployments.iter_mut().enumerate() {
            if member.status == TxStatus::Pending && member.data.is_empty() && plan.is_ready(i)? {
                member.data = plan.prepare(i)?;
            }
        }

        if session.status.is_terminal() {
            plans.remove(&session.id);
        }
        Ok(())
    }

    async fn session_lock(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop per-session bookkeeping once the session is terminal.
    async fn release(&self, id: Uuid) {
        self.locks.lock().await.remove(&id);
        self.plans.lock().await.remove(&id);
    }
}
