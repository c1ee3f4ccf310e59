//! Post-confirmation hook dispatch.
//!
//! Hooks observe confirmed deployments; they never influence the
//! confirmation outcome. A hook that returns an error is logged and the
//! remaining hooks still run, so one misbehaving integration cannot block
//! a signing session.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::HookError;
use crate::session::TransactionSession;

/// Snapshot handed to hooks after a deployment confirms.
///
/// Carries owned copies; the session lock is already released by the time
/// hooks run.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub session_id: Uuid,
    pub chain_ref: String,
    /// Discriminator of the confirmed deployment, e.g. "deploy-token".
    pub kind: String,
    pub deployment_index: usize,
    pub tx_hash: String,
    pub contract_address: Option<String>,
    /// State of the whole session after this confirmation landed.
    pub session: TransactionSession,
}

impl HookContext {
    pub fn from_confirmed(session: &TransactionSession, index: usize) -> Option<Self> {
        let deployment = session.deployments.get(index)?;
        Some(Self {
            session_id: session.id,
            chain_ref: session.chain_ref.clone(),
            kind: deployment.kind.clone(),
            deployment_index: index,
            tx_hash: deployment.tx_hash.clone()?,
            contract_address: deployment.contract_address.clone(),
            session: session.clone(),
        })
    }
}

/// A post-confirmation observer.
#[async_trait]
pub trait ConfirmationHook: Send + Sync {
    /// Stable name, used in log lines when the hook fails.
    fn name(&self) -> &str;

    async fn on_confirmed(&self, ctx: &HookContext) -> Result<(), HookError>;
}

/// Routes confirmation events to registered hooks.
///
/// Hooks register either for a specific deployment kind or for every
/// confirmation. Registration happens during startup wiring; dispatch is
/// read-only afterwards.
#[derive(Default)]
pub struct HookDispatcher {
    by_kind: HashMap<String, Vec<Arc<dyn ConfirmationHook>>>,
    any: Vec<Arc<dyn ConfirmationHook>>,
}

impl HookDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook for one deployment kind.
    pub fn register(&mut self, kind: impl Into<String>, hook: Arc<dyn ConfirmationHook>) {
        self.by_kind.entry(kind.into()).or_default().push(hook);
    }

    /// Register a hook for every confirmed deployment.
    pub fn register_any(&mut self, hook: Arc<dyn ConfirmationHook>) {
        self.any.push(hook);
    }

    /// Run every hook registered for this confirmation.
    ///
    /// Failures are logged at warn level and swallowed; the confirmation
    /// already succeeded on chain and must not be un-confirmed by an
    /// observer.
    pub async fn dispatch(&self, ctx: &HookContext) {
        let kind_hooks = self
            .by_kind
            .get(&ctx.kind)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for hook in kind_hooks.iter().chain(self.any.iter()) {
            if let Err(e) = hook.on_confirmed(ctx).await {
                tracing::warn!(
                    hook = hook.name(),
                    session_id = %ctx.session_id,
                    kind = %ctx.kind,
                    error = %e,
                    "confirmation hook failed"
                );
            } else {
                tracing::debug!(
                    hook = hook.name(),
                    session_id = %ctx.session_id,
                    kind = %ctx.kind,
                    "confirmation hook ran"
                );
            }
        }
    }
}

/// Built-in hook that remembers the latest deployed address per kind.
///
/// Lets operators (and the CLI) look up "where did the token land" after
/// a session finishes without replaying the session store.
#[derive(Default)]
pub struct AddressBook {
    addresses: RwLock<HashMap<String, String>>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn address_of(&self, kind: &str) -> Option<String> {
        self.addresses.read().await.get(kind).cloned()
    }
}

#[async_trait]
impl ConfirmationHook for AddressBook {
    fn name(&self) -> &str {
        "address-book"
    }

    async fn on_confirmed(&self, ctx: &HookContext) -> Result<(), HookError> {
        if let Some(address) = &ctx.contract_address {
            self.addresses
                .write()
                .await
                .insert(ctx.kind.clone(), address.clone());
        }
        Ok(())
    }
}

/// Hook that emits an info log line per confirmation. Registered for all
/// kinds by the default server wiring.
pub struct LogHook;

#[async_trait]
impl ConfirmationHook for LogHook {
    fn name(&self) -> &str {
        "log"
    }

    async fn on_confirmed(&self, ctx: &HookContext) -> Result<(), HookError> {
        tracing::info!(
            session_id = %ctx.session_id,
            chain = %ctx.chain_ref,
            kind = %ctx.kind,
            index = ctx.deployment_index,
            tx_hash = %ctx.tx_hash,
            contract_address = ctx.contract_address.as_deref().unwrap_or("-"),
            "deployment confirmed"
        );
        Ok(())
    }
}
