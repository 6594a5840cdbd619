use agent_chat_stream_schema::OutboundRequest;
use tokio::sync::mpsc;

/// Outbound side of the client. Sending never blocks the reducer and never
/// reports delivery.
pub trait RequestSink: Send + Sync {
    fn send(&self, request: OutboundRequest);
}

/// Forwards requests over an unbounded channel to whatever owns the
/// transport.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<OutboundRequest>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundRequest>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl RequestSink for ChannelSink {
    fn send(&self, request: OutboundRequest) {
        if let Err(err) = self.sender.send(request) {
            tracing::warn!(request = ?err.0, "transport gone; dropping outbound request");
        }
    }
}
