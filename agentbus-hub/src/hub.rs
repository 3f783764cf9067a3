//! The [`MessageHub`]: per-agent mailboxes layered over a durable
//! [`MessageStore`], so a message outlives both the sender's and the
//! recipient's process.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{atomic::{AtomicBool, Ordering}, Arc},
};

use agentbus_message_store::{Message, MessageId, MessageStore, MessageType};
use agentbus_retry::RetryPolicy;
use agentbus_tracing::traced;
use tokio::sync::{mpsc, RwLock};

use crate::error::{HubError, Result};

/// Bounded mailbox capacity. A full mailbox is not an error: the message
/// stays durably pending in the store and the recovery loop redelivers it
/// once the recipient drains its channel.
pub const MAILBOX_CAPACITY: usize = 100;

/// Routes messages between agents through bounded, per-agent mailboxes,
/// backed by a [`MessageStore`] so nothing is lost to a crash or a full
/// channel.
#[derive(Clone)]
pub struct MessageHub {
    store: Arc<dyn MessageStore>,
    retry_policy: RetryPolicy,
    mailboxes: Arc<RwLock<HashMap<String, mpsc::Sender<Message>>>>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for MessageHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageHub").finish_non_exhaustive()
    }
}

impl MessageHub {
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>, retry_policy: RetryPolicy) -> Self {
        Self {
            store,
            retry_policy,
            mailboxes: Arc::new(RwLock::new(HashMap::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(HubError::Closed);
        }
        Ok(())
    }

    /// Register `agent_id`, returning the receiving half of its mailbox.
    /// Registering an ID that's already registered replaces its mailbox —
    /// the old receiver stops getting new messages but keeps whatever it
    /// already buffered.
    #[traced]
    pub async fn register(&self, agent_id: &str) -> Result<mpsc::Receiver<Message>> {
        self.check_open()?;
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        self.mailboxes.write().await.insert(agent_id.to_string(), tx);
        Ok(rx)
    }

    /// Remove `agent_id`'s mailbox. Messages already persisted for it remain
    /// in the store; re-registering the same ID later does not replay them
    /// automatically — the recovery loop only redelivers to mailboxes that
    /// currently exist.
    pub async fn unregister(&self, agent_id: &str) {
        self.mailboxes.write().await.remove(agent_id);
    }

    /// Send a point-to-point message to `recipient_id`.
    ///
    /// 1. Reject if the hub is closed.
    /// 2. Reject if `recipient_id` has no registered mailbox.
    /// 3. Build and persist the [`Message`] before taking the mailbox lock —
    ///    a persistence failure is logged but does not abort delivery:
    ///    availability on the hot path matters more than the store ack being
    ///    the durability checkpoint for this particular send.
    /// 4. Attempt a non-blocking delivery into the recipient's mailbox. On
    ///    success, asynchronously ack the persisted copy. On failure (full
    ///    mailbox), do nothing further — the message is already persisted
    ///    and the recovery loop will retry it.
    /// 5. Return the message ID regardless of whether step 4 succeeded.
    ///
    /// # Errors
    /// Returns [`HubError::Closed`] or [`HubError::MailboxUnknown`].
    #[traced]
    pub async fn send(
        &self,
        sender_id: &str,
        recipient_id: &str,
        message_type: MessageType,
        content: impl Into<String> + Send,
        payload: BTreeMap<String, serde_json::Value>,
    ) -> Result<MessageId> {
        self.check_open()?;

        if !self.mailboxes.read().await.contains_key(recipient_id) {
            return Err(HubError::MailboxUnknown(recipient_id.to_string()));
        }

        let mut msg = Message::new(sender_id, recipient_id, message_type, content);
        msg.payload = payload;
        self.persist_best_effort(&msg).await;

        if self.try_deliver(&msg).await {
            self.ack_async(msg.id);
        }

        Ok(msg.id)
    }

    /// Persist `msg`, logging and swallowing a failure rather than aborting
    /// the send — per §4.5/§7, availability on the hot path wins over the
    /// store ack being the durability checkpoint for this one send.
    async fn persist_best_effort(&self, msg: &Message) {
        if let Err(err) = self.store.save(msg.clone()).await {
            tracing::warn!(error = %err, message_id = %msg.id, "failed to persist message before delivery");
        }
    }

    /// Ack `id` on a detached task so the send path never waits on the
    /// store's ack round-trip once the mailbox enqueue has already
    /// succeeded.
    fn ack_async(&self, id: MessageId) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(err) = store.ack(id).await {
                tracing::warn!(error = %err, message_id = %id, "failed to ack delivered message");
            }
        });
    }

    /// Send the same message to every currently registered mailbox except
    /// the sender's own. Each recipient gets its own persisted [`Message`]
    /// (all sharing an empty `recipient_id`, per [`Message::is_broadcast`]),
    /// so acking one recipient's copy never acks another's.
    #[traced]
    pub async fn broadcast(
        &self,
        sender_id: &str,
        content: impl Into<String> + Send,
        payload: BTreeMap<String, serde_json::Value>,
    ) -> Result<Vec<MessageId>> {
        self.check_open()?;
        let content = content.into();
        let recipients: Vec<String> = self
            .mailboxes
            .read()
            .await
            .keys()
            .filter(|id| id.as_str() != sender_id)
            .cloned()
            .collect();

        let mut ids = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let mut msg = Message::new(sender_id, String::new(), MessageType::Broadcast, content.clone());
            msg.topic = recipient.clone();
            msg.payload = payload.clone();
            self.persist_best_effort(&msg).await;
            if self.try_deliver(&msg).await {
                self.ack_async(msg.id);
            }
            ids.push(msg.id);
        }
        Ok(ids)
    }

    /// Acknowledge a message once its recipient has finished processing it.
    #[traced]
    pub async fn ack(&self, id: MessageId) -> Result<()> {
        self.check_open()?;
        self.store.ack(id).await.map_err(Into::into)
    }

    async fn try_deliver(&self, msg: &Message) -> bool {
        let mailboxes = self.mailboxes.read().await;
        mailboxes
            .get(&msg.topic)
            .is_some_and(|tx| tx.try_send(msg.clone()).is_ok())
    }

    /// The minimum age an unacked message must reach before the recovery
    /// sweep will consider redelivering it, per §4.5: a message that simply
    /// hasn't been acked yet (e.g. one that overflowed a mailbox moments
    /// ago) is not the same as one that's actually stuck.
    fn recovery_min_age() -> chrono::Duration {
        chrono::Duration::minutes(5)
    }

    /// Sweep every registered mailbox's topic for unacked messages older
    /// than [`Self::recovery_min_age`] and attempt redelivery. Returns the
    /// number of messages redelivered.
    ///
    /// This is what rescues a message that was persisted in [`Self::send`]
    /// but couldn't be pushed into a full mailbox at the time, or whose
    /// recipient registered only after the message was sent.
    ///
    /// # Errors
    /// Propagates a [`agentbus_message_store::MessageStoreError`] from the
    /// store scan.
    #[traced]
    pub async fn recover_once(&self, batch_size: usize) -> Result<usize> {
        self.check_open()?;
        let topics: Vec<String> = self.mailboxes.read().await.keys().cloned().collect();
        let mut redelivered = 0;

        for topic in topics {
            let stale = self.store.unacked_older_than(&topic, Self::recovery_min_age()).await?;
            for msg in stale.into_iter().take(batch_size) {
                if !self.retry_policy.should_retry(&msg) {
                    continue;
                }
                if self.try_deliver(&msg).await {
                    self.store.increment_retry(msg.id).await?;
                    redelivered += 1;
                }
            }
        }
        Ok(redelivered)
    }

    /// Run [`Self::recover_once`] on a fixed interval until the hub is
    /// closed. Intended to be spawned as a background task alongside the
    /// hub's lifetime.
    pub async fn run_recovery_loop(&self, interval: std::time::Duration, batch_size: usize) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if self.closed.load(Ordering::Acquire) {
                return;
            }
            if let Err(err) = self.recover_once(batch_size).await {
                tracing::warn!(error = %err, "message hub recovery sweep failed");
            }
        }
    }

    /// The configured retry policy, exposed so coordinators can reason about
    /// how long an unacked message might sit before redelivery.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Close the hub exactly once: drop every mailbox sender (so registered
    /// receivers observe a clean channel close) and close the backing
    /// store. Calling this more than once is a no-op, not an error.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.mailboxes.write().await.clear();
        self.store.close().await?;
        Ok(())
    }
}
