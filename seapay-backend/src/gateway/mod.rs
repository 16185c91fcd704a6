pub mod protocol;

use protocol::GatewayEvent;
use tokio::sync::mpsc;

/// Sends the events of one chat turn, in order, to the response stream
#[derive(Clone)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl EventEmitter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit an event. A client that disconnected mid-turn is not an error;
    /// the turn still completes and is persisted.
    pub fn emit(&self, event: GatewayEvent) {
        log::debug!("[GATEWAY] {}", event.event);
        if self.tx.send(event).is_err() {
            log::debug!("[GATEWAY] Stream receiver dropped, event discarded");
        }
    }

    pub fn emit_opt(&self, event: Option<GatewayEvent>) {
        if let Some(event) = event {
            self.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (emitter, mut rx) = EventEmitter::channel();
        emitter.emit(GatewayEvent::progress_update("t", "one"));
        emitter.clone().emit(GatewayEvent::progress_update("t", "two"));
        emitter.emit_opt(None);
        drop(emitter);

        assert_eq!(rx.recv().await.unwrap().data["text"], "one");
        assert_eq!(rx.recv().await.unwrap().data["text"], "two");
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_emit_after_disconnect_is_harmless() {
        let (emitter, rx) = EventEmitter::channel();
        drop(rx);
        emitter.emit(GatewayEvent::stream_done(None));
    }
}
