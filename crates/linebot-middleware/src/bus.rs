//! Typed, topic-based publish/subscribe bus for behaviour events.
//!
//! Built on [`tokio::sync::broadcast`]: every subscriber sees every event on
//! its lane and a slow subscriber never blocks the control loop.  Behaviour
//! threads publish synchronously; dashboard or voice collaborators may
//! consume either asynchronously ([`TopicReceiver::recv`]) or by polling
//! ([`TopicReceiver::try_recv`]).
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Telemetry`] | Lost streaks, obstacle readings, arrow decisions |
//! | [`Topic::Recovery`] | Recovery start / finish, with attempts and outcome |
//! | [`Topic::Alerts`] | Behaviour changes and hardware faults |
//!
//! Every event is also mirrored to a global channel for collaborators that
//! want the whole stream.

use linebot_types::{Event, EventPayload};
use tokio::sync::broadcast;
use tracing::trace;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Telemetry,
    Recovery,
    Alerts,
}

impl Topic {
    /// The lane an event payload belongs on.
    pub fn for_payload(payload: &EventPayload) -> Topic {
        match payload {
            EventPayload::LineLost { .. }
            | EventPayload::ObstacleDetected { .. }
            | EventPayload::ArrowDecision(_) => Topic::Telemetry,
            EventPayload::RecoveryStarted { .. } | EventPayload::RecoveryFinished { .. } => {
                Topic::Recovery
            }
            EventPayload::BehaviorChanged(_) | EventPayload::Fault { .. } => Topic::Alerts,
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    global: broadcast::Sender<Event>,
    telemetry: broadcast::Sender<Event>,
    recovery: broadcast::Sender<Event>,
    alerts: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus.  `capacity` applies to every channel independently
    /// and must be non-zero.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (global, _) = broadcast::channel(capacity);
        let (telemetry, _) = broadcast::channel(capacity);
        let (recovery, _) = broadcast::channel(capacity);
        let (alerts, _) = broadcast::channel(capacity);
        Self {
            global,
            telemetry,
            recovery,
            alerts,
        }
    }

    /// Publish `event` to `topic` and to the global channel.
    ///
    /// Best effort: returns how many receivers were handed the event, which
    /// is `0` when nobody is listening.
    pub fn publish_to(&self, topic: Topic, event: Event) -> usize {
        let on_topic = self.topic_sender(topic).send(event.clone()).unwrap_or(0);
        let on_global = self.global.send(event).unwrap_or(0);
        trace!(?topic, receivers = on_topic + on_global, "event published");
        on_topic + on_global
    }

    /// Wrap `payload` in an [`Event`] from `source` and publish it on the
    /// lane chosen by [`Topic::for_payload`].
    pub fn emit(&self, source: &str, payload: EventPayload) -> usize {
        let topic = Topic::for_payload(&payload);
        self.publish_to(topic, Event::new(source, payload))
    }

    /// Subscribe to a single [`Topic`].
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic: Some(topic),
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Subscribe to every event regardless of topic.
    pub fn subscribe(&self) -> TopicReceiver {
        TopicReceiver {
            topic: None,
            receiver: self.global.subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Telemetry => &self.telemetry,
            Topic::Recovery => &self.recovery,
            Topic::Alerts => &self.alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// A receiver bound to one topic, or to the global channel.
pub struct TopicReceiver {
    topic: Option<Topic>,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(RecvError::Lagged(n))` – the subscriber fell behind and `n`
    ///   events were dropped.
    /// * `Err(RecvError::Closed)` – every sender has been dropped.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking poll for synchronous consumers.
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Drain every event currently buffered, skipping over lag gaps.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return events,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to, `None` for the global stream.
    pub fn topic(&self) -> Option<Topic> {
        self.topic
    }
}
