use tokio::sync::broadcast;

/// Broadcast publisher for worker-local lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher<E: Clone> {
    sender: broadcast::Sender<PublishedEvent<E>>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent<E> {
    pub event: E,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl<E: Clone> EventPublisher<E> {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to every current subscriber
    pub fn publish(&self, event: E) {
        let published = PublishedEvent {
            event,
            published_at: chrono::Utc::now(),
        };

        // send() only fails when nobody is subscribed, which is fine for lifecycle events
        let _ = self.sender.send(published);
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent<E>> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: Clone> Default for EventPublisher<E> {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let publisher: EventPublisher<String> = EventPublisher::new(4);
        publisher.publish("nobody listening".to_string());
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let publisher: EventPublisher<u32> = EventPublisher::new(4);
        let mut receiver = publisher.subscribe();

        publisher.publish(1);
        publisher.publish(2);

        assert_eq!(receiver.recv().await.unwrap().event, 1);
        assert_eq!(receiver.recv().await.unwrap().event, 2);
    }
}
