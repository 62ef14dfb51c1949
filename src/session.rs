//! Interactive response selection.
//!
//! When an action has several example responses, the request handler can
//! suspend and let a connected control client pick one. The session is a
//! single rendezvous shared by the whole process: requests enqueue questions,
//! and one control client at a time drains that queue over a duplex
//! connection, answering one question before it is shown the next.
//!
//! Each question carries an id and owns its own oneshot waiter, so an answer
//! always reaches the request that asked for it. Every wait is bounded: when
//! no answer arrives in time the request falls back to its default response.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info, warn};

pub type QuestionId = u64;

/// Choices offered to the control client for one pending request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Question {
    /// Assigned by the session when the question is asked.
    pub id: QuestionId,
    pub method: String,
    pub uri: String,
    /// Name of the variant served when no usable answer arrives.
    pub default: String,
    /// Variant name to variant body.
    pub answers: BTreeMap<String, String>,
}

impl Question {
    pub fn new(
        method: impl Into<String>,
        uri: impl Into<String>,
        default: impl Into<String>,
        answers: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: 0,
            method: method.into(),
            uri: uri.into(),
            default: default.into(),
            answers,
        }
    }
}

/// Outcome of asking a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Text sent by the control client.
    Text(String),
    /// No answer before the deadline.
    TimedOut,
    /// The control client went away while the question was outstanding.
    Abandoned,
}

impl Answer {
    /// The client's text, if the question was actually answered.
    pub fn text(&self) -> Option<&str> {
        match self {
            Answer::Text(text) => Some(text),
            Answer::TimedOut | Answer::Abandoned => None,
        }
    }
}

/// Something that can decide which variant a request receives.
#[async_trait]
pub trait Arbiter: Send + Sync {
    async fn ask(&self, question: Question) -> Answer;
}

/// The control connection was closed by the peer.
#[derive(Debug, thiserror::Error)]
#[error("control connection closed")]
pub struct TransportClosed;

/// Duplex text channel to a control client.
#[async_trait]
pub trait ControlTransport: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportClosed>;

    /// Next text message, or `None` once the client has disconnected.
    async fn recv_text(&mut self) -> Option<String>;
}

#[async_trait]
impl ControlTransport for WebSocket {
    async fn send_text(&mut self, text: String) -> Result<(), TransportClosed> {
        self.send(Message::Text(text.into()))
            .await
            .map_err(|_| TransportClosed)
    }

    async fn recv_text(&mut self) -> Option<String> {
        loop {
            match self.recv().await? {
                Ok(Message::Text(text)) => return Some(text.as_str().to_owned()),
                Ok(Message::Binary(bytes)) => {
                    return Some(String::from_utf8_lossy(&bytes).into_owned())
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                Ok(Message::Close(_)) | Err(_) => return None,
            }
        }
    }
}

/// Reply naming the question it answers.
#[derive(Debug, Deserialize)]
struct TaggedReply {
    id: QuestionId,
    answer: String,
}

#[derive(Debug, Serialize)]
struct Expired {
    id: QuestionId,
    expired: bool,
}

#[derive(Debug, Serialize)]
struct Busy<'a> {
    error: &'a str,
    message: &'a str,
}

enum Awaited {
    Answered(String),
    Expired,
    Disconnected,
}

/// Questions not yet shown to a client, and the requests waiting on them.
#[derive(Default)]
struct Rendezvous {
    queue: VecDeque<Question>,
    waiters: HashMap<QuestionId, oneshot::Sender<Answer>>,
}

impl Rendezvous {
    /// Next question whose request is still waiting, with its waiter.
    fn next(&mut self) -> Option<(Question, oneshot::Sender<Answer>)> {
        while let Some(question) = self.queue.pop_front() {
            match self.waiters.remove(&question.id) {
                Some(waiter) if !waiter.is_closed() => return Some((question, waiter)),
                _ => debug!(question_id = question.id, "Skipping question, request no longer waiting"),
            }
        }
        None
    }
}

/// Process-wide rendezvous between waiting requests and the control client.
pub struct InteractiveSession {
    state: Mutex<Rendezvous>,
    queued: Notify,
    /// Held by the connected client for as long as it is connected.
    client: tokio::sync::Mutex<()>,
    waiting: AtomicUsize,
    next_id: AtomicU64,
    answer_timeout: Duration,
    questions_asked: AtomicU64,
    questions_answered: AtomicU64,
    questions_timed_out: AtomicU64,
    questions_abandoned: AtomicU64,
}

/// Withdraws a question when its request stops waiting, however that happens.
struct WaiterGuard<'a> {
    session: &'a InteractiveSession,
    id: QuestionId,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.session.lock_state();
        state.waiters.remove(&self.id);
        state.queue.retain(|q| q.id != self.id);
        drop(state);
        self.session.waiting.fetch_sub(1, Ordering::Relaxed);
    }
}

impl InteractiveSession {
    pub fn new(answer_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(Rendezvous::default()),
            queued: Notify::new(),
            client: tokio::sync::Mutex::new(()),
            waiting: AtomicUsize::new(0),
            next_id: AtomicU64::new(0),
            answer_timeout,
            questions_asked: AtomicU64::new(0),
            questions_answered: AtomicU64::new(0),
            questions_timed_out: AtomicU64::new(0),
            questions_abandoned: AtomicU64::new(0),
        }
    }

    pub fn answer_timeout(&self) -> Duration {
        self.answer_timeout
    }

    /// Requests still waiting for an answer, including the one shown to the client.
    pub fn pending_questions(&self) -> usize {
        self.waiting.load(Ordering::Relaxed)
    }

    /// Questions not yet shown to a client.
    pub fn queued_questions(&self) -> usize {
        self.lock_state().queue.len()
    }

    /// Whether a control client currently holds the session.
    pub fn has_client(&self) -> bool {
        self.client.try_lock().is_err()
    }

    pub fn total_asked(&self) -> u64 {
        self.questions_asked.load(Ordering::Relaxed)
    }

    pub fn total_answered(&self) -> u64 {
        self.questions_answered.load(Ordering::Relaxed)
    }

    pub fn total_timed_out(&self) -> u64 {
        self.questions_timed_out.load(Ordering::Relaxed)
    }

    pub fn total_abandoned(&self) -> u64 {
        self.questions_abandoned.load(Ordering::Relaxed)
    }

    fn lock_state(&self) -> MutexGuard<'_, Rendezvous> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put a question back at the head of the queue if its request still waits.
    fn requeue(&self, question: Question, waiter: oneshot::Sender<Answer>) {
        if waiter.is_closed() {
            return;
        }
        let mut state = self.lock_state();
        state.waiters.insert(question.id, waiter);
        state.queue.push_front(question);
        drop(state);
        self.queued.notify_one();
    }

    /// Serve one control client until it disconnects.
    ///
    /// A second client connecting while one is active is told the session is
    /// busy and dropped.
    pub async fn serve_client<T: ControlTransport>(&self, mut transport: T) {
        let Ok(_client) = self.client.try_lock() else {
            warn!("Rejecting control client, another client is connected");
            let busy = Busy {
                error: "busy",
                message: "another control client is connected",
            };
            if let Ok(text) = serde_json::to_string(&busy) {
                let _ = transport.send_text(text).await;
            }
            return;
        };

        info!(
            queued = self.queued_questions(),
            "Control client connected"
        );

        'serve: loop {
            debug!("Standing by for questions");
            let (question, mut waiter) = loop {
                let next = self.lock_state().next();
                if let Some(next) = next {
                    break next;
                }
                tokio::select! {
                    _ = self.queued.notified() => {}
                    message = transport.recv_text() => match message {
                        Some(text) => {
                            debug!(message = %text, "Ignoring control message, no question outstanding");
                        }
                        None => break 'serve,
                    },
                }
            };

            let id = question.id;
            let payload = match serde_json::to_string(&question) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(question_id = id, error = %e, "Failed to encode question");
                    continue;
                }
            };

            if transport.send_text(payload).await.is_err() {
                // Hand the question to whichever client connects next.
                self.requeue(question, waiter);
                break;
            }
            debug!(question_id = id, uri = %question.uri, "Question sent to control client");

            let outcome = loop {
                tokio::select! {
                    message = transport.recv_text() => match message {
                        Some(text) => match serde_json::from_str::<TaggedReply>(&text) {
                            Ok(reply) if reply.id == id => break Awaited::Answered(reply.answer),
                            Ok(reply) => {
                                warn!(
                                    question_id = id,
                                    reply_id = reply.id,
                                    "Ignoring answer for a question that is not outstanding"
                                );
                            }
                            Err(_) => break Awaited::Answered(text),
                        },
                        None => break Awaited::Disconnected,
                    },
                    _ = waiter.closed() => break Awaited::Expired,
                }
            };

            match outcome {
                Awaited::Answered(text) => {
                    info!(question_id = id, answer = %text, "Got answer from control client");
                    if waiter.send(Answer::Text(text)).is_err() {
                        debug!(question_id = id, "Answer arrived after the request stopped waiting");
                    }
                }
                Awaited::Expired => {
                    let notice = Expired { id, expired: true };
                    if let Ok(text) = serde_json::to_string(&notice) {
                        if transport.send_text(text).await.is_err() {
                            break;
                        }
                    }
                }
                Awaited::Disconnected => break,
            }
        }

        info!("Control client disconnected");
    }
}

#[async_trait]
impl Arbiter for InteractiveSession {
    async fn ask(&self, mut question: Question) -> Answer {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        question.id = id;
        self.questions_asked.fetch_add(1, Ordering::Relaxed);

        info!(
            question_id = id,
            method = %question.method,
            uri = %question.uri,
            choices = question.answers.len(),
            "Asking control client"
        );

        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.lock_state();
            state.waiters.insert(id, tx);
            state.queue.push_back(question);
        }
        self.waiting.fetch_add(1, Ordering::Relaxed);
        let _guard = WaiterGuard { session: self, id };
        self.queued.notify_one();

        match tokio::time::timeout(self.answer_timeout, rx).await {
            Ok(Ok(answer)) => {
                self.questions_answered.fetch_add(1, Ordering::Relaxed);
                answer
            }
            Ok(Err(_)) => {
                self.questions_abandoned.fetch_add(1, Ordering::Relaxed);
                warn!(question_id = id, "Control client left without answering");
                Answer::Abandoned
            }
            Err(_) => {
                self.questions_timed_out.fetch_add(1, Ordering::Relaxed);
                warn!(
                    question_id = id,
                    timeout_ms = self.answer_timeout.as_millis() as u64,
                    "No answer from control client in time"
                );
                Answer::TimedOut
            }
        }
    }
}
