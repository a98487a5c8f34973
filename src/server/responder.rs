//! Cross-thread path from pipeline threads back to the connection loop.
//!
//! Only the loop thread touches sockets. Other threads drop `(SessionId, WireResponse)` pairs into the mailbox and
//! wake the poller; the loop drains the mailbox on every wake.

use std::fmt;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use polling::Poller;

use super::session::SessionId;
use crate::protocol::WireResponse;

#[derive(Clone)]
pub struct Responder {
    mailbox: Arc<Mutex<Vec<(SessionId, WireResponse)>>>,
    waker: Option<Arc<Poller>>,
}

impl Responder {
    /// A responder nobody wakes up for. Responses wait until [`Responder::drain`] is called.
    pub fn new() -> Self {
        Self {
            mailbox: Arc::new(Mutex::new(Vec::new())),
            waker: None,
        }
    }

    pub(crate) fn with_waker(poller: Arc<Poller>) -> Self {
        Self {
            mailbox: Arc::new(Mutex::new(Vec::new())),
            waker: Some(poller),
        }
    }

    pub fn send(&self, session: SessionId, response: WireResponse) -> io::Result<()> {
        self.mailbox.lock().push((session, response));
        match &self.waker {
            Some(poller) => poller.notify(),
            None => Ok(()),
        }
    }

    /// Takes everything delivered so far, oldest first.
    pub fn drain(&self) -> Vec<(SessionId, WireResponse)> {
        std::mem::take(&mut *self.mailbox.lock())
    }
}

impl Default for Responder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("pending", &self.mailbox.lock().len())
            .field("wired", &self.waker.is_some())
            .finish()
    }
}

/// Where the final response for a batch goes.
#[derive(Debug, Clone)]
pub enum ReplyRoute {
    Session { id: SessionId, responder: Responder },
    /// The client was answered at admission time. Nothing more is sent.
    Detached,
}

impl ReplyRoute {
    pub fn session(id: SessionId, responder: Responder) -> Self {
        ReplyRoute::Session { id, responder }
    }

    pub fn send(&self, response: WireResponse) -> io::Result<()> {
        match self {
            ReplyRoute::Session { id, responder } => responder.send(*id, response),
            ReplyRoute::Detached => {
                tracing::debug!(is_success = response.is_success, "detached batch, response not sent");
                Ok(())
            }
        }
    }

    pub fn is_detached(&self) -> bool {
        matches!(self, ReplyRoute::Detached)
    }
}
