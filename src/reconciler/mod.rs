//! Resource reconciliation engine.
//!
//! A [`Reconciler`] drives one resource kind through Create, Read, Delete and
//! Import against the remote gateway. Everything that differs between kinds
//! (request building, decoding, not-found codes, lifecycle states) lives in a
//! small [`ResourceKind`] descriptor, so the lifecycle logic exists once.

mod attachment;
mod lookup;
mod peer;

pub use attachment::{Attachment, AttachmentAttributes, AttachmentSpec};
pub use lookup::{AttachmentLookup, AttachmentLookupResult, LookupCriteria};
pub use peer::{Peer, PeerAttributes, PeerSpec};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{GatewayError, GatewayResult, Operation, ReconcileError, Result};
use crate::gateway::{GatewayClient, RemoteObject};
use crate::poller::{PollSettings, StatePoller, StateWait};
use crate::schema::ResourceSchema;
use crate::tags::TagSettings;

/// Lifecycle state type of a resource kind.
pub type KindState<K> = <<K as ResourceKind>::Remote as RemoteObject>::State;

/// Per-kind descriptor plugged into the generic [`Reconciler`].
#[async_trait]
pub trait ResourceKind: Send + Sync + 'static {
    /// Desired attributes supplied by the caller.
    type Spec: Debug + Send + Sync;
    /// Creation request sent to the gateway.
    type CreateRequest: Debug + Send + Sync;
    /// Remote object shape.
    type Remote: RemoteObject + Debug;
    /// Decoded local attribute model.
    type Attributes: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync;

    /// Short kind name used on the command line and in state.
    const NAME: &'static str;
    /// Human-readable kind used in messages.
    const DISPLAY: &'static str;
    /// Remote error codes meaning the identifier does not exist.
    const NOT_FOUND_CODES: &'static [&'static str];
    /// What a create waits for.
    const CREATION: StateWait<KindState<Self>>;
    /// What a delete waits for.
    const DELETION: StateWait<KindState<Self>>;
    /// States in which a read treats the object as already gone.
    const VANISHING: &'static [KindState<Self>];

    /// Attribute schema.
    fn schema() -> ResourceSchema;

    /// Builds the creation request, merging default tags.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::MissingAttribute`] when a required field is unset.
    fn build_create(
        spec: &Self::Spec,
        tags: &TagSettings,
    ) -> std::result::Result<Self::CreateRequest, ReconcileError>;

    /// Decodes a remote object into the local model.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Decode`] when a required nested structure is absent.
    fn decode(
        remote: &Self::Remote,
        tags: &TagSettings,
    ) -> std::result::Result<Self::Attributes, ReconcileError>;

    /// Submits the creation request.
    async fn submit_create(
        client: &dyn GatewayClient,
        request: &Self::CreateRequest,
    ) -> GatewayResult<Self::Remote>;

    /// Describes one object by identifier.
    async fn describe(client: &dyn GatewayClient, id: &str) -> GatewayResult<Option<Self::Remote>>;

    /// Submits the deletion.
    async fn submit_delete(client: &dyn GatewayClient, id: &str) -> GatewayResult<()>;

    /// Whether a gateway error says the object does not exist.
    fn is_missing(error: &GatewayError) -> bool {
        Self::NOT_FOUND_CODES.iter().any(|code| error.is_code(code))
    }
}

/// Local model of one managed resource.
///
/// `id` is only ever a remote-assigned identifier. `attributes` is `None`
/// until a read has decoded the remote object.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceData<A> {
    /// Remote identifier.
    pub id: Option<String>,
    /// Decoded attributes.
    pub attributes: Option<A>,
}

impl<A> Default for ResourceData<A> {
    fn default() -> Self {
        Self {
            id: None,
            attributes: None,
        }
    }
}

impl<A> ResourceData<A> {
    /// Creates an empty local model.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            id: None,
            attributes: None,
        }
    }

    /// Creates a local model holding only an identifier.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            attributes: None,
        }
    }

    /// Forgets the remote object.
    pub fn clear(&mut self) {
        self.id = None;
        self.attributes = None;
    }

    /// Returns true if the resource is tracked.
    #[must_use]
    pub const fn exists(&self) -> bool {
        self.id.is_some()
    }
}

/// Create/Read/Delete/Import for one resource kind.
pub struct Reconciler<K: ResourceKind> {
    client: Arc<dyn GatewayClient>,
    tags: TagSettings,
    create_poll: PollSettings,
    delete_poll: PollSettings,
    _kind: PhantomData<K>,
}

impl<K: ResourceKind> Reconciler<K> {
    /// Creates a reconciler with default poll settings.
    #[must_use]
    pub fn new(client: Arc<dyn GatewayClient>, tags: TagSettings) -> Self {
        Self {
            client,
            tags,
            create_poll: PollSettings::default(),
            delete_poll: PollSettings::default(),
            _kind: PhantomData,
        }
    }

    /// Uses `polling` for both waits.
    #[must_use]
    pub const fn with_polling(mut self, polling: PollSettings) -> Self {
        self.create_poll = polling;
        self.delete_poll = polling;
        self
    }

    /// Sets the create and delete deadlines.
    #[must_use]
    pub const fn with_timeouts(mut self, create: Duration, delete: Duration) -> Self {
        self.create_poll = self.create_poll.with_timeout(create);
        self.delete_poll = self.delete_poll.with_timeout(delete);
        self
    }

    /// Attribute schema of this kind.
    #[must_use]
    pub fn schema(&self) -> ResourceSchema {
        K::schema()
    }

    /// Creates the remote object and waits for it to become available.
    ///
    /// The identifier is stored as soon as the gateway assigns it. If the
    /// wait fails the identifier is kept, since the object exists remotely.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is incomplete, the gateway rejects
    /// it, or the object does not converge.
    pub async fn create(
        &self,
        spec: &K::Spec,
        data: &mut ResourceData<K::Attributes>,
    ) -> Result<()> {
        let request = K::build_create(spec, &self.tags)?;

        debug!("Creating {}: {request:?}", K::DISPLAY);
        let remote = K::submit_create(&*self.client, &request)
            .await
            .map_err(|source| ReconcileError::Operation {
                kind: K::DISPLAY.to_string(),
                operation: Operation::Create,
                id: None,
                source,
            })?;

        let id = remote.remote_id().to_string();
        info!("{} ({id}) created, waiting for availability", K::DISPLAY);
        data.id = Some(id.clone());
        data.attributes = None;

        self.wait(&id, Operation::Create, &K::CREATION, self.create_poll)
            .await?;

        self.read(data).await?;

        if data.exists() {
            Ok(())
        } else {
            Err(ReconcileError::NotFound {
                kind: K::DISPLAY.to_string(),
                id,
            }
            .into())
        }
    }

    /// Refreshes the local model from the remote object.
    ///
    /// An absent or vanishing object clears the local model without error.
    ///
    /// # Errors
    ///
    /// Returns an error if the describe call fails or the object cannot be decoded.
    pub async fn read(&self, data: &mut ResourceData<K::Attributes>) -> Result<()> {
        let Some(id) = data.id.clone() else {
            return Ok(());
        };

        match self.describe(&id).await? {
            None => {
                warn!("{} ({id}) not found, removing from state", K::DISPLAY);
                data.clear();
            }
            Some(remote) if K::VANISHING.contains(&remote.state()) => {
                warn!(
                    "{} ({id}) in deleted state ({}), removing from state",
                    K::DISPLAY,
                    remote.state()
                );
                data.clear();
            }
            Some(remote) => {
                data.attributes = Some(K::decode(&remote, &self.tags)?);
            }
        }

        Ok(())
    }

    /// Deletes the remote object and waits until it is gone.
    ///
    /// Deleting an object the gateway no longer knows succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway rejects the deletion or it does not converge.
    pub async fn delete(&self, data: &mut ResourceData<K::Attributes>) -> Result<()> {
        let Some(id) = data.id.clone() else {
            return Ok(());
        };

        info!("Deleting {} ({id})", K::DISPLAY);
        match K::submit_delete(&*self.client, &id).await {
            Ok(()) => {}
            Err(e) if K::is_missing(&e) => {
                debug!("{} ({id}) already gone", K::DISPLAY);
                data.clear();
                return Ok(());
            }
            Err(source) => {
                return Err(ReconcileError::Operation {
                    kind: K::DISPLAY.to_string(),
                    operation: Operation::Delete,
                    id: Some(id),
                    source,
                }
                .into());
            }
        }

        self.wait(&id, Operation::Delete, &K::DELETION, self.delete_poll)
            .await?;

        info!("{} ({id}) deleted", K::DISPLAY);
        data.clear();
        Ok(())
    }

    /// Populates a local model from a bare remote identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::NotFound`] if the object does not exist.
    pub async fn import(&self, id: &str) -> Result<ResourceData<K::Attributes>> {
        let mut data = ResourceData::with_id(id);
        self.read(&mut data).await?;

        if data.exists() {
            info!("Imported {} ({id})", K::DISPLAY);
            Ok(data)
        } else {
            Err(ReconcileError::NotFound {
                kind: K::DISPLAY.to_string(),
                id: id.to_string(),
            }
            .into())
        }
    }

    /// Describes by identifier, mapping the kind's not-found code to `None`.
    async fn describe(&self, id: &str) -> Result<Option<K::Remote>> {
        match K::describe(&*self.client, id).await {
            Ok(found) => Ok(found),
            Err(e) if K::is_missing(&e) => Ok(None),
            Err(source) => Err(ReconcileError::Operation {
                kind: K::DISPLAY.to_string(),
                operation: Operation::Read,
                id: Some(id.to_string()),
                source,
            }
            .into()),
        }
    }

    async fn wait(
        &self,
        id: &str,
        operation: Operation,
        wait: &StateWait<KindState<K>>,
        settings: PollSettings,
    ) -> Result<Option<K::Remote>> {
        StatePoller::new(settings)
            .wait(K::DISPLAY, id, operation, wait, || self.describe(id))
            .await
    }
}
