// src/session/registry.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use uuid::Uuid;

use super::engine::{QuizSession, Scorecard, SelectOutcome, SubmitOutcome, TickOutcome};
use super::store::{ResultDraft, ResultStore, StudentIdentity};

/// Keyed map of every live session in the process.
///
/// Entries are fully independent: one test-taker's session never shares
/// state with another's. Timed sessions get a dedicated countdown task whose
/// handle the entry owns, so retiring the entry (explicit submit, abandon,
/// shutdown) always retires the task too.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<String, SessionEntry>>>,
    store: Arc<dyn ResultStore>,
}

struct SessionEntry {
    session: QuizSession,
    taker: Option<StudentIdentity>,
    timer: Option<TimerGuard>,
}

/// Owns the countdown task of one session; dropping the guard aborts it.
struct TimerGuard(tokio::task::JoinHandle<()>);

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// What the registry hands back from a submit call, with the lock released.
pub enum SubmitOutput {
    Finalized {
        scorecard: Scorecard,
        draft: Option<ResultDraft>,
    },
    NeedsConfirmation {
        unanswered: Vec<usize>,
    },
    Ignored,
}

enum TickFlow {
    Continue,
    Stop,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn ResultStore>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            store,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a live session and starts its countdown if the quiz is
    /// timed. Returns the opaque token the client uses from here on.
    pub fn insert(&self, session: QuizSession, taker: Option<StudentIdentity>) -> String {
        let token = Uuid::new_v4().to_string();
        let timed = session.remaining_seconds().is_some();

        self.lock().insert(
            token.clone(),
            SessionEntry {
                session,
                taker,
                timer: None,
            },
        );

        if timed {
            let guard = TimerGuard(tokio::spawn(tick_loop(self.clone(), token.clone())));
            if let Some(entry) = self.lock().get_mut(&token) {
                entry.timer = Some(guard);
            }
        }

        token
    }

    /// Read access to one session.
    pub fn with_session<R>(&self, token: &str, f: impl FnOnce(&QuizSession) -> R) -> Option<R> {
        self.lock().get(token).map(|entry| f(&entry.session))
    }

    pub fn select(&self, token: &str, question_id: Uuid, option_index: usize) -> Option<SelectOutcome> {
        let mut entries = self.lock();
        let entry = entries.get_mut(token)?;
        Some(entry.session.select(question_id, option_index))
    }

    pub fn cancel_submit(&self, token: &str) -> Option<()> {
        let mut entries = self.lock();
        let entry = entries.get_mut(token)?;
        entry.session.cancel_submit();
        Some(())
    }

    /// Drives the state machine's submit transition and, on finalization,
    /// stops the countdown and extracts the persistable draft (enrolled
    /// takers only). The caller performs the actual write via [`persist`],
    /// outside the registry lock.
    ///
    /// [`persist`]: SessionRegistry::persist
    pub fn submit(&self, token: &str, force: bool) -> Option<SubmitOutput> {
        let mut entries = self.lock();
        let entry = entries.get_mut(token)?;

        match entry.session.submit(force) {
            SubmitOutcome::NeedsConfirmation { unanswered } => {
                Some(SubmitOutput::NeedsConfirmation { unanswered })
            }
            SubmitOutcome::Ignored => Some(SubmitOutput::Ignored),
            SubmitOutcome::Finalized => {
                entry.timer = None;
                let scorecard = entry.session.scorecard()?.clone();
                let draft = entry
                    .taker
                    .as_ref()
                    .and_then(|t| entry.session.result_draft(t));
                Some(SubmitOutput::Finalized { scorecard, draft })
            }
        }
    }

    /// Best-effort write of a finalized result. Failure is surfaced to the
    /// caller; the submitted in-memory state stands regardless.
    pub async fn persist(&self, draft: &ResultDraft) -> Result<i64, sqlx::Error> {
        self.store.save_result(draft).await
    }

    /// Drops a session (abandon / navigation away). Its timer dies with it.
    pub fn remove(&self, token: &str) -> bool {
        self.lock().remove(token).is_some()
    }

    /// One countdown step. On expiry the session has already force-submitted
    /// itself inside the engine; an enrolled taker's result is saved here,
    /// from the timer task, through the same store seam as an explicit
    /// submission.
    async fn tick_once(&self, token: &str) -> TickFlow {
        let expired_draft = {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(token) else {
                return TickFlow::Stop;
            };

            match entry.session.tick() {
                TickOutcome::Running { .. } => return TickFlow::Continue,
                TickOutcome::Inactive => return TickFlow::Stop,
                TickOutcome::Expired => {
                    tracing::info!("session {}: time limit reached, auto-submitted", token);
                    // Note: the entry keeps its (now finished) timer handle;
                    // aborting a completed task later is a no-op.
                    entry
                        .taker
                        .as_ref()
                        .and_then(|t| entry.session.result_draft(t))
                }
            }
        };

        if let Some(draft) = expired_draft {
            if let Err(e) = self.store.save_result(&draft).await {
                tracing::error!("failed to save timed-out result: {:?}", e);
            }
        }
        TickFlow::Stop
    }
}

/// Per-session countdown: one tick per wall-clock second until the session
/// expires, submits, or disappears.
async fn tick_loop(registry: SessionRegistry, token: String) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    // The first tick of a tokio interval fires immediately; swallow it so
    // the countdown starts a full second after session creation.
    interval.tick().await;

    loop {
        interval.tick().await;
        match registry.tick_once(&token).await {
            TickFlow::Continue => {}
            TickFlow::Stop => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz::{Question, Quiz};
    use crate::session::engine::{FeedbackPolicy, SessionState};
    use async_trait::async_trait;
    use sqlx::types::Json;

    struct MemStore {
        saved: Mutex<Vec<ResultDraft>>,
        fail: bool,
    }

    impl MemStore {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                saved: Mutex::new(Vec::new()),
                fail,
            })
        }

        fn count(&self) -> usize {
            self.saved.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ResultStore for MemStore {
        async fn save_result(&self, draft: &ResultDraft) -> Result<i64, sqlx::Error> {
            if self.fail {
                return Err(sqlx::Error::PoolClosed);
            }
            let mut saved = self.saved.lock().unwrap();
            saved.push(draft.clone());
            Ok(saved.len() as i64)
        }
    }

    fn test_quiz(time_limit: i32) -> Quiz {
        let questions = (0..3)
            .map(|i| Question {
                id: Uuid::new_v4(),
                text: format!("q{}", i),
                image: None,
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_index: 0,
            })
            .collect();
        Quiz {
            id: 1,
            teacher_id: 1,
            title: "registry quiz".to_string(),
            questions: Json(questions),
            time_limit,
            max_score: 10.0,
            is_public: false,
            access_code: None,
            allow_retake: true,
            shuffle_questions: false,
            assigned_class_ids: Json(Vec::new()),
            class_schedules: Json(HashMap::new()),
            created_at: None,
        }
    }

    fn taker() -> StudentIdentity {
        StudentIdentity {
            id: 11,
            name: "Lê Văn Cường".to_string(),
            class_id: 3,
        }
    }

    #[tokio::test]
    async fn submit_persists_exactly_once() {
        let store = MemStore::new(false);
        let registry = SessionRegistry::new(store.clone());
        let quiz = test_quiz(0);
        let session = QuizSession::start(&quiz, FeedbackPolicy::Deferred).unwrap();
        let token = registry.insert(session, Some(taker()));

        let Some(SubmitOutput::Finalized { draft, .. }) = registry.submit(&token, true) else {
            panic!("expected finalization");
        };
        registry.persist(&draft.unwrap()).await.unwrap();
        assert_eq!(store.count(), 1);

        // Second submit is a no-op and yields nothing to persist.
        assert!(matches!(registry.submit(&token, true), Some(SubmitOutput::Ignored)));
        assert_eq!(store.count(), 1);
    }

    #[tokio::test]
    async fn guest_sessions_produce_no_draft() {
        let registry = SessionRegistry::new(MemStore::new(false));
        let quiz = test_quiz(0);
        let session = QuizSession::start(&quiz, FeedbackPolicy::Immediate).unwrap();
        let token = registry.insert(session, None);

        let Some(SubmitOutput::Finalized { draft, .. }) = registry.submit(&token, true) else {
            panic!("expected finalization");
        };
        assert!(draft.is_none());
    }

    #[tokio::test]
    async fn failed_persist_leaves_session_submitted() {
        let store = MemStore::new(true);
        let registry = SessionRegistry::new(store.clone());
        let quiz = test_quiz(0);
        let session = QuizSession::start(&quiz, FeedbackPolicy::Deferred).unwrap();
        let token = registry.insert(session, Some(taker()));

        let Some(SubmitOutput::Finalized { draft, scorecard }) = registry.submit(&token, true)
        else {
            panic!("expected finalization");
        };
        assert!(registry.persist(&draft.unwrap()).await.is_err());

        // The score stands even though the save failed.
        assert!((scorecard.score - 0.0).abs() < 1e-9);
        let state = registry.with_session(&token, |s| s.state()).unwrap();
        assert_eq!(state, SessionState::Submitted);
    }

    /// Registers an entry without spawning the countdown task, so tests can
    /// drive ticks by hand without racing the real timer.
    fn insert_untimed(
        registry: &SessionRegistry,
        session: QuizSession,
        taker: Option<StudentIdentity>,
    ) -> String {
        let token = Uuid::new_v4().to_string();
        registry.lock().insert(
            token.clone(),
            SessionEntry {
                session,
                taker,
                timer: None,
            },
        );
        token
    }

    #[tokio::test]
    async fn ticking_down_auto_submits_and_persists() {
        let store = MemStore::new(false);
        let registry = SessionRegistry::new(store.clone());
        let quiz = test_quiz(1);
        let session = QuizSession::start(&quiz, FeedbackPolicy::Deferred).unwrap();
        let token = insert_untimed(&registry, session, Some(taker()));

        for _ in 0..59 {
            assert!(matches!(registry.tick_once(&token).await, TickFlow::Continue));
        }
        assert!(matches!(registry.tick_once(&token).await, TickFlow::Stop));

        let state = registry.with_session(&token, |s| s.state()).unwrap();
        assert_eq!(state, SessionState::Submitted);
        assert_eq!(store.count(), 1);

        let saved = store.saved.lock().unwrap();
        assert_eq!(saved[0].correct_count, 0);
        assert_eq!(saved[0].detail_stats.skipped, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn removed_sessions_stop_ticking() {
        let registry = SessionRegistry::new(MemStore::new(false));
        let quiz = test_quiz(1);
        let session = QuizSession::start(&quiz, FeedbackPolicy::Deferred).unwrap();
        let token = registry.insert(session, None);

        assert!(registry.remove(&token));
        assert!(!registry.remove(&token));
        assert!(matches!(registry.tick_once(&token).await, TickFlow::Stop));
    }
}
