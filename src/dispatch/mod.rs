// Webhook event dispatch
// Events arrive from the LINE webhook endpoint already parsed and
// signature-verified; this module routes them through an explicit handler
// table built once at startup.

pub mod chat;


use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

pub use chat::ChatHandler;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    TextMessage {
        user_id: String,
        reply_token: String,
        text: String,
    },
    Follow {
        user_id: String,
    },
    Unfollow {
        user_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TextMessage,
    Follow,
    Unfollow,
}

impl Event {
    #[inline]
    pub fn kind(&self) -> EventKind {
        match *self {
            Event::TextMessage { .. } => EventKind::TextMessage,
            Event::Follow { .. } => EventKind::Follow,
            Event::Unfollow { .. } => EventKind::Unfollow,
        }
    }
}

/// Outbound reply produced by a handler. Delivery over the LINE reply API
/// is the caller's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub reply_token: String,
    pub text: String,
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> Result<Option<Reply>>;
}

/// Dispatch table keyed by event kind, constructed once and passed into
/// the request path.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<EventKind, Box<dyn EventHandler>>,
}

impl Dispatcher {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn register(&mut self, kind: EventKind, handler: Box<dyn EventHandler>) {
        self.handlers.insert(kind, handler);
    }

    /// Route an event to its handler. Events without a registered handler
    /// are ignored rather than treated as errors.
    #[inline]
    pub async fn dispatch(&self, event: &Event) -> Result<Option<Reply>> {
        match self.handlers.get(&event.kind()) {
            Some(handler) => handler.handle(event).await,
            None => {
                debug!("No handler registered for {:?}", event.kind());
                Ok(None)
            }
        }
    }
}
