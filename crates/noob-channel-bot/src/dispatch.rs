//! Request dispatcher.
//!
//! The network client delivers three kinds of events: messages from partners
//! with an authenticated relationship, anonymous single-use requests, and
//! requests to establish a relationship. The dispatcher implements one handler
//! role per kind ([`Listener`], [`SingleUseCallback`], [`AuthCallbacks`]), each
//! delegating to the shared [`ChannelAllocator`].
//!
//! Failed admissions are logged and the event is dropped. Nothing is ever sent
//! back to a joiner whose admission failed.

use std::{collections::HashSet, fmt, sync::Arc, time::Duration};

use thiserror::Error;

use crate::{allocator::ChannelAllocator, env::Environment, storage::Storage};

/// Name the dispatcher registers its message listener under
pub const LISTENER_NAME: &str = "noob-channel-bot";

/// Default bound on how long a single-use response may take
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Identity of a remote party.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartnerId(pub [u8; 32]);

impl fmt::Display for PartnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for PartnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartnerId({self})")
    }
}

/// A party asking for, or holding, an authenticated relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    /// Partner identity
    pub id: PartnerId,
    /// Self-asserted username, if the request carried one
    pub username: Option<String>,
}

/// A message delivered over an authenticated relationship.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    /// Sender
    pub sender: PartnerId,
    /// Message body. The body of a join request carries no meaning.
    pub payload: Vec<u8>,
    /// Round the message arrived in
    pub round_id: u64,
}

/// Delivery receipt for an end-to-end send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Rounds the message was sent in
    pub round_ids: Vec<u64>,
}

/// A transport failed to send.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("send failed: {0}")]
pub struct SendError(pub String);

/// Anonymous request with a one-shot reply path.
pub struct SingleUseRequest {
    /// Transport-specific description of the requester, for logs only
    pub origin: String,
    /// Request body
    pub payload: Vec<u8>,
    /// Reply path, consumed by the first response
    pub responder: Box<dyn SingleUseResponder>,
}

impl fmt::Debug for SingleUseRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleUseRequest")
            .field("origin", &self.origin)
            .field("payload_len", &self.payload.len())
            .finish_non_exhaustive()
    }
}

/// End-to-end client operations the dispatcher depends on.
pub trait E2eClient: Send + Sync {
    /// Whether an authenticated relationship with `partner` exists.
    fn has_authenticated_channel(&self, partner: &PartnerId) -> bool;

    /// Send `payload` to `partner` over the authenticated relationship.
    fn send_e2e(&self, partner: &PartnerId, payload: &[u8]) -> Result<SendReport, SendError>;

    /// Accept a relationship request.
    fn confirm_relationship(&self, contact: &Contact) -> Result<(), SendError>;
}

/// One-shot reply path of a [`SingleUseRequest`].
pub trait SingleUseResponder: Send {
    /// Send the response, giving up after `timeout`.
    fn respond(self: Box<Self>, payload: &[u8], timeout: Duration) -> Result<(), SendError>;
}

/// Handler for messages over authenticated relationships.
pub trait Listener: Send + Sync {
    /// Handle one message.
    fn hear(&self, message: ReceivedMessage);

    /// Name the listener is registered under.
    fn name(&self) -> &str;
}

/// Handlers for relationship lifecycle events.
pub trait AuthCallbacks: Send + Sync {
    /// A party asks to establish a relationship.
    fn request(&self, requestor: Contact, round_id: u64);

    /// A relationship we requested was confirmed.
    fn confirm(&self, partner: Contact, round_id: u64);

    /// A partner reset the relationship.
    fn reset(&self, partner: Contact, round_id: u64);
}

/// Handler for anonymous single-use requests.
pub trait SingleUseCallback: Send + Sync {
    /// Handle one request.
    fn callback(&self, request: SingleUseRequest);
}

/// Decides which relationship requests are accepted.
pub trait ConfirmPolicy: Send + Sync {
    /// Whether to confirm a relationship with `contact`.
    fn should_confirm(&self, contact: &Contact) -> bool;
}

/// Confirm every relationship request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ConfirmPolicy for AcceptAll {
    fn should_confirm(&self, _contact: &Contact) -> bool {
        true
    }
}

/// Confirm only listed partners.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    allowed: HashSet<PartnerId>,
}

impl AllowList {
    /// Allow exactly `partners`.
    pub fn new(partners: impl IntoIterator<Item = PartnerId>) -> Self {
        Self { allowed: partners.into_iter().collect() }
    }
}

impl ConfirmPolicy for AllowList {
    fn should_confirm(&self, contact: &Contact) -> bool {
        self.allowed.contains(&contact.id)
    }
}

impl<F> ConfirmPolicy for F
where
    F: Fn(&Contact) -> bool + Send + Sync,
{
    fn should_confirm(&self, contact: &Contact) -> bool {
        self(contact)
    }
}

/// E2E client for deployments that only serve single-use requests.
///
/// Holds no relationships, so authenticated messages are always dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoE2eClient;

impl E2eClient for NoE2eClient {
    fn has_authenticated_channel(&self, _partner: &PartnerId) -> bool {
        false
    }

    fn send_e2e(&self, partner: &PartnerId, _payload: &[u8]) -> Result<SendReport, SendError> {
        Err(SendError(format!("no end-to-end client to reach {partner}")))
    }

    fn confirm_relationship(&self, contact: &Contact) -> Result<(), SendError> {
        Err(SendError(format!("no end-to-end client to confirm {}", contact.id)))
    }
}

/// Routes inbound events to the allocator and replies over the transport
/// that delivered them.
pub struct Dispatcher<E: Environment, S: Storage, C: E2eClient> {
    allocator: Arc<ChannelAllocator<E, S>>,
    client: C,
    confirm_policy: Box<dyn ConfirmPolicy>,
    response_timeout: Duration,
}

impl<E: Environment, S: Storage, C: E2eClient> Dispatcher<E, S, C> {
    /// Dispatcher that confirms every relationship request.
    pub fn new(allocator: Arc<ChannelAllocator<E, S>>, client: C) -> Self {
        Self {
            allocator,
            client,
            confirm_policy: Box::new(AcceptAll),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    /// Replace the relationship confirmation policy.
    #[must_use]
    pub fn with_confirm_policy(mut self, policy: impl ConfirmPolicy + 'static) -> Self {
        self.confirm_policy = Box::new(policy);
        self
    }

    /// Bound single-use responses to `timeout`.
    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Shared allocator.
    pub fn allocator(&self) -> &Arc<ChannelAllocator<E, S>> {
        &self.allocator
    }

    fn admit(&self, requester: &dyn fmt::Display) -> Option<Vec<u8>> {
        match self.allocator.admit_join() {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::error!("Failed to admit {}: {}", requester, e);
                None
            },
        }
    }
}

impl<E: Environment, S: Storage, C: E2eClient> Listener for Dispatcher<E, S, C> {
    fn hear(&self, message: ReceivedMessage) {
        let sender = message.sender;
        if !self.client.has_authenticated_channel(&sender) {
            tracing::warn!(
                "Dropping message from {} in round {}: no authenticated channel",
                sender,
                message.round_id
            );
            return;
        }

        tracing::info!("Join request from {} in round {}", sender, message.round_id);
        let Some(payload) = self.admit(&sender) else {
            return;
        };

        match self.client.send_e2e(&sender, &payload) {
            Ok(report) => {
                tracing::info!("Sent channel to {} in rounds {:?}", sender, report.round_ids);
            },
            Err(e) => tracing::error!("Failed to send channel to {}: {}", sender, e),
        }
    }

    fn name(&self) -> &str {
        LISTENER_NAME
    }
}

impl<E: Environment, S: Storage, C: E2eClient> AuthCallbacks for Dispatcher<E, S, C> {
    fn request(&self, requestor: Contact, round_id: u64) {
        if !self.confirm_policy.should_confirm(&requestor) {
            tracing::warn!(
                "Declined relationship request from {} in round {}",
                requestor.id,
                round_id
            );
            return;
        }

        match self.client.confirm_relationship(&requestor) {
            Ok(()) => tracing::info!("Confirmed relationship with {}", requestor.id),
            Err(e) => {
                tracing::error!("Failed to confirm relationship with {}: {}", requestor.id, e);
            },
        }
    }

    fn confirm(&self, partner: Contact, round_id: u64) {
        tracing::debug!("Relationship with {} confirmed in round {}", partner.id, round_id);
    }

    fn reset(&self, partner: Contact, round_id: u64) {
        tracing::debug!("Relationship with {} reset in round {}", partner.id, round_id);
    }
}

impl<E: Environment, S: Storage, C: E2eClient> SingleUseCallback for Dispatcher<E, S, C> {
    fn callback(&self, request: SingleUseRequest) {
        let SingleUseRequest { origin, payload: _, responder } = request;

        tracing::info!("Single-use join request from {}", origin);
        let Some(payload) = self.admit(&origin) else {
            return;
        };

        match responder.respond(&payload, self.response_timeout) {
            Ok(()) => tracing::info!("Sent channel to single-use requester {}", origin),
            Err(e) => tracing::error!("Failed to respond to {}: {}", origin, e),
        }
    }
}
