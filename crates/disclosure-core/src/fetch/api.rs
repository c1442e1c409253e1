//! Remote disclosure API contract and an in-memory implementation
//!
//! The service holds, for every owner, one sealed envelope per trusted
//! recipient. A batch fetch returns the envelopes addressed to the requester
//! for whichever of the requested owners have disclosed to it, silently
//! omitting the rest.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::envelope::SealedBox;
use crate::error::{DisclosureError, DisclosureResult};
use crate::identity::{Identity, RecipientPublicKey};
use crate::types::PrivateAttributes;

/// One envelope returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisclosureRecord {
    /// Owner of the disclosed attributes
    pub identity: Identity,
    /// Base64 transport encoding of an [`crate::envelope::Envelope`]
    pub encrypted_payload: String,
}

/// Who is asking, and the public key its envelopes were sealed to.
#[derive(Debug, Clone)]
pub struct Requester {
    pub identity: Identity,
    pub public_key: RecipientPublicKey,
}

/// Batched access to the remote disclosure service.
#[async_trait]
pub trait DisclosureApi: Send + Sync {
    /// Fetch envelopes addressed to `requester` for `identities`.
    ///
    /// Errors are batch-level ([`DisclosureError::Service`]); per-record
    /// problems surface later, when the coordinator opens each record.
    async fn batch_fetch(
        &self,
        identities: &[Identity],
        requester: &Requester,
    ) -> DisclosureResult<Vec<DisclosureRecord>>;
}

/// In-memory disclosure service.
///
/// Supports failure and latency injection and counts calls, which is what the
/// integration tests and the CLI simulation need from a fake transport.
#[derive(Default)]
pub struct InMemoryDisclosureApi {
    /// owner -> recipient -> encoded envelope
    disclosures: RwLock<HashMap<Identity, HashMap<Identity, String>>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<Identity>>>,
    failure: RwLock<Option<String>>,
    latency: RwLock<Duration>,
}

impl InMemoryDisclosureApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seal `attrs` for every trusted recipient and store the envelopes,
    /// replacing whatever `owner` disclosed before.
    pub fn publish(
        &self,
        owner: &Identity,
        attrs: &PrivateAttributes,
        recipients: &[(Identity, RecipientPublicKey)],
    ) -> DisclosureResult<()> {
        let sealed = SealedBox::seal(&attrs.to_json()?, recipients)?;

        let mut per_recipient = HashMap::with_capacity(recipients.len());
        for (recipient, _) in recipients {
            if let Some(envelope) = sealed.envelope_for(recipient) {
                per_recipient.insert(recipient.clone(), envelope.to_base64()?);
            }
        }

        debug!(owner = %owner, recipients = per_recipient.len(), "Published disclosure");
        self.disclosures.write().insert(owner.clone(), per_recipient);
        Ok(())
    }

    /// Store an arbitrary payload, bypassing sealing.
    pub fn insert_raw(&self, owner: &Identity, recipient: &Identity, payload: impl Into<String>) {
        self.disclosures
            .write()
            .entry(owner.clone())
            .or_default()
            .insert(recipient.clone(), payload.into());
    }

    /// Withdraw every disclosure made by `owner`.
    pub fn revoke(&self, owner: &Identity) {
        self.disclosures.write().remove(owner);
    }

    /// Make every subsequent call fail with a service error.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.write() = Some(reason.into());
    }

    /// Stop injecting failures.
    pub fn recover(&self) {
        *self.failure.write() = None;
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = latency;
    }

    /// Number of `batch_fetch` calls served (including failed ones).
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Identities requested by each call, in call order.
    pub fn requests(&self) -> Vec<Vec<Identity>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl DisclosureApi for InMemoryDisclosureApi {
    async fn batch_fetch(
        &self,
        identities: &[Identity],
        requester: &Requester,
    ) -> DisclosureResult<Vec<DisclosureRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(identities.to_vec());

        let latency = *self.latency.read();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if let Some(reason) = self.failure.read().clone() {
            return Err(DisclosureError::Service(reason));
        }

        let disclosures = self.disclosures.read();
        let records = identities
            .iter()
            .filter_map(|owner| {
                disclosures
                    .get(owner)
                    .and_then(|per_recipient| per_recipient.get(&requester.identity))
                    .map(|payload| DisclosureRecord {
                        identity: owner.clone(),
                        encrypted_payload: payload.clone(),
                    })
            })
            .collect();
        Ok(records)
    }
}
