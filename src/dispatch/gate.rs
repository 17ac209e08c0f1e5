use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{ChatBackend, ChatReply, ChatRequest, DispatchError};
use crate::session::{lock_session, SessionStore, SharedSession};

/// A successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub reply: ChatReply,
    /// `true` when this reply carried a session identifier the session did
    /// not have yet.
    pub session_started: bool,
}

pub type DispatchFuture =
    Pin<Box<dyn Future<Output = Result<Delivery, DispatchError>> + Send + 'static>>;

/// Clears the in-flight flag when the request resolves or is dropped.
struct InFlightTicket(Arc<AtomicBool>);

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// DispatchGate
// ---------------------------------------------------------------------------

/// Single-flight guard in front of the [`ChatBackend`].
#[derive(Clone)]
pub struct DispatchGate {
    backend: Arc<dyn ChatBackend>,
    session: SharedSession,
    store: Option<SessionStore>,
    in_flight: Arc<AtomicBool>,
}

impl DispatchGate {
    /// `store`, when given, receives every newly adopted session identifier.
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        session: SharedSession,
        store: Option<SessionStore>,
    ) -> Self {
        Self {
            backend,
            session,
            store,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Claim the single flight slot and build the request.
    ///
    /// Rejection is synchronous: a second call while a request is in flight
    /// returns [`DispatchError::AlreadySending`] without touching the first.
    /// The session identifier is read now, at dispatch start.
    pub fn begin(&self, text: &str) -> Result<DispatchFuture, DispatchError> {
        let message = text.trim();
        if message.is_empty() {
            return Err(DispatchError::EmptyMessage);
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            log::warn!("dispatch: rejected, a request is already in flight");
            return Err(DispatchError::AlreadySending);
        }
        let ticket = InFlightTicket(Arc::clone(&self.in_flight));

        let request = ChatRequest {
            message: message.to_string(),
            session_id: lock_session(&self.session).session_id().map(str::to_string),
        };
        let backend = Arc::clone(&self.backend);
        let session = Arc::clone(&self.session);
        let store = self.store.clone();

        log::debug!(
            "dispatch: sending {} chars (session {})",
            request.message.len(),
            request.session_id.as_deref().unwrap_or("new")
        );

        Ok(Box::pin(async move {
            let _ticket = ticket;
            let reply = backend.chat(request).await.map_err(|e| {
                log::error!("dispatch: {e}");
                e
            })?;

            let session_started = match &reply.session_id {
                Some(id) => {
                    let changed = lock_session(&session).adopt_session_id(id.clone());
                    if changed {
                        log::info!("dispatch: session {id} adopted");
                        if let Some(store) = &store {
                            if let Err(e) = store.save(id) {
                                log::warn!("dispatch: could not persist session id: {e}");
                            }
                        }
                    }
                    changed
                }
                None => false,
            };

            log::info!("dispatch: reply received ({} chars)", reply.text.len());
            Ok(Delivery {
                reply,
                session_started,
            })
        }))
    }

    /// [`begin`](Self::begin) and await the result.
    pub async fn send(&self, text: &str) -> Result<Delivery, DispatchError> {
        self.begin(text)?.await
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// Backend with scripted replies that records every request.
    ///
    /// With `hold` set, each call waits for `release.notify_one()`.
    pub struct ScriptedBackend {
        pub replies: Mutex<Vec<Result<ChatReply, DispatchError>>>,
        pub requests: Mutex<Vec<ChatRequest>>,
        pub hold: AtomicBool,
        pub release: Notify,
    }

    impl ScriptedBackend {
        pub fn new(replies: Vec<Result<ChatReply, DispatchError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                requests: Mutex::new(Vec::new()),
                hold: AtomicBool::new(false),
                release: Notify::new(),
            })
        }

        pub fn replying(text: &str, session_id: Option<&str>) -> Arc<Self> {
            Self::new(vec![Ok(reply(text, session_id))])
        }

        pub fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    pub fn reply(text: &str, session_id: Option<&str>) -> ChatReply {
        ChatReply {
            text: text.into(),
            session_id: session_id.map(str::to_string),
            image: None,
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn chat(&self, request: ChatRequest) -> Result<ChatReply, DispatchError> {
            self.requests.lock().unwrap().push(request);
            if self.hold.load(Ordering::SeqCst) {
                self.release.notified().await;
            }
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Err(DispatchError::Connectivity("no scripted reply".into()))
            } else {
                replies.remove(0)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::testing::{reply, ScriptedBackend};
    use super::*;
    use crate::session::{new_shared_session, Session};
    use tempfile::tempdir;

    fn gate(backend: Arc<ScriptedBackend>) -> (DispatchGate, SharedSession) {
        let session = new_shared_session(Session::default());
        (DispatchGate::new(backend, Arc::clone(&session), None), session)
    }

    #[tokio::test]
    async fn first_turn_sends_null_session_and_adopts_id() {
        let backend = ScriptedBackend::replying("Hi there", Some("abc"));
        let (gate, session) = gate(Arc::clone(&backend));

        let delivery = gate.send("hello").await.unwrap();
        assert_eq!(delivery.reply.text, "Hi there");
        assert!(delivery.session_started);
        assert_eq!(
            backend.requests(),
            vec![ChatRequest {
                message: "hello".into(),
                session_id: None
            }]
        );
        assert_eq!(lock_session(&session).session_id(), Some("abc"));
    }

    #[tokio::test]
    async fn later_turns_carry_session_id() {
        let backend = ScriptedBackend::new(vec![
            Ok(reply("one", Some("abc"))),
            Ok(reply("two", Some("abc"))),
        ]);
        let (gate, _) = gate(Arc::clone(&backend));

        gate.send("first").await.unwrap();
        let second = gate.send("second").await.unwrap();
        assert!(!second.session_started);
        assert_eq!(backend.requests()[1].session_id.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn second_send_is_rejected_while_first_in_flight() {
        let backend = ScriptedBackend::replying("Hi", None);
        backend.hold.store(true, Ordering::SeqCst);
        let (gate, _) = gate(Arc::clone(&backend));

        let first = tokio::spawn(gate.begin("one").unwrap());
        tokio::task::yield_now().await;

        assert_eq!(gate.send("two").await, Err(DispatchError::AlreadySending));
        assert!(gate.is_in_flight());

        backend.release.notify_one();
        let delivered = first.await.unwrap().unwrap();
        assert_eq!(delivered.reply.text, "Hi");
        assert_eq!(backend.requests().len(), 1);
        assert!(!gate.is_in_flight());
    }

    #[tokio::test]
    async fn failure_releases_the_slot() {
        let backend = ScriptedBackend::new(vec![
            Err(DispatchError::Backend {
                status: 500,
                detail: Some("boom".into()),
            }),
            Ok(reply("recovered", None)),
        ]);
        let (gate, _) = gate(Arc::clone(&backend));

        let err = gate.send("one").await.unwrap_err();
        assert_eq!(err.user_message(), "boom");
        assert!(gate.send("two").await.is_ok());
        assert_eq!(backend.requests().len(), 2, "no automatic retry");
    }

    #[tokio::test]
    async fn dropping_a_pending_request_releases_the_slot() {
        let backend = ScriptedBackend::replying("Hi", None);
        let (gate, _) = gate(backend);
        let pending = gate.begin("one").unwrap();
        assert!(gate.is_in_flight());
        drop(pending);
        assert!(!gate.is_in_flight());
    }

    #[tokio::test]
    async fn blank_text_is_never_sent() {
        let backend = ScriptedBackend::replying("Hi", None);
        let (gate, _) = gate(Arc::clone(&backend));
        assert_eq!(gate.send("   ").await, Err(DispatchError::EmptyMessage));
        assert!(backend.requests().is_empty());
        assert!(!gate.is_in_flight());
    }

    #[tokio::test]
    async fn adopted_id_is_persisted() {
        let dir = tempdir().expect("temp dir");
        let store = SessionStore::at(dir.path().join("session.json"));
        let session = new_shared_session(Session::default());
        let gate = DispatchGate::new(
            ScriptedBackend::replying("Hi", Some("xyz")),
            session,
            Some(store.clone()),
        );

        gate.send("hello").await.unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("xyz"));
    }
}
