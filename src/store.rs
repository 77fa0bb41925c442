//! Observable conversation state container.
//!
//! Pure state plus notification — no business logic. The session controller
//! is the only writer of messages; the presentation layer subscribes and
//! renders. Pass the store by handle (`Arc`) through constructors rather
//! than reaching for ambient globals.

use crate::session::messages::{ChatTurn, Message, Topic};
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Capacity of the store's event channel.
///
/// Slow subscribers miss events rather than block mutation.
const EVENT_CHANNEL_SIZE: usize = 64;

/// Change notification emitted after each store mutation.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A message was appended to the log.
    MessageAppended(Message),
    /// The message log was emptied.
    Cleared,
    /// The selected topic changed.
    TopicChanged(Topic),
    /// The recording indicator flag changed.
    RecordingChanged(bool),
    /// The processing indicator flag changed.
    ProcessingChanged(bool),
}

#[derive(Debug, Default)]
struct Inner {
    messages: Vec<Message>,
    topic: Topic,
    recording: bool,
    processing: bool,
}

/// Ordered message log plus the UI-facing indicator flags and topic.
///
/// Observers are notified synchronously after each mutation via a broadcast
/// subscription.
#[derive(Debug)]
pub struct ConversationStore {
    inner: Mutex<Inner>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    /// Create an empty store with the default topic.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            inner: Mutex::new(Inner::default()),
            events,
        }
    }

    /// Subscribe to change notifications.
    ///
    /// Events are delivered in mutation order. A receiver that falls more
    /// than the channel capacity behind observes a lag error and should
    /// re-read the snapshot.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Append a message to the end of the log and notify observers.
    pub fn append(&self, message: Message) {
        self.lock().messages.push(message.clone());
        let _ = self.events.send(StoreEvent::MessageAppended(message));
    }

    /// Empty the message log and notify observers.
    ///
    /// The selected topic is retained.
    pub fn clear(&self) {
        self.lock().messages.clear();
        let _ = self.events.send(StoreEvent::Cleared);
    }

    /// Change the selected topic and notify observers.
    pub fn set_topic(&self, topic: Topic) {
        self.lock().topic = topic;
        let _ = self.events.send(StoreEvent::TopicChanged(topic));
    }

    /// Set the recording indicator flag.
    pub fn set_recording(&self, recording: bool) {
        self.lock().recording = recording;
        let _ = self.events.send(StoreEvent::RecordingChanged(recording));
    }

    /// Set the processing indicator flag.
    pub fn set_processing(&self, processing: bool) {
        self.lock().processing = processing;
        let _ = self.events.send(StoreEvent::ProcessingChanged(processing));
    }

    /// Snapshot of the ordered message log.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    /// Look up a message by id.
    #[must_use]
    pub fn message(&self, id: uuid::Uuid) -> Option<Message> {
        self.lock().messages.iter().find(|m| m.id == id).cloned()
    }

    /// Role/content projection of the full history, for the inference call.
    #[must_use]
    pub fn history(&self) -> Vec<ChatTurn> {
        self.lock().messages.iter().map(Message::as_chat_turn).collect()
    }

    /// Currently selected topic.
    #[must_use]
    pub fn topic(&self) -> Topic {
        self.lock().topic
    }

    /// Whether the recording indicator is set.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.lock().recording
    }

    /// Whether the processing indicator is set.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.lock().processing
    }

    /// Number of messages in the log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Mutation never panics while holding the lock, so poisoning only
        // occurs if a caller's clone panicked; recover rather than wedge.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
