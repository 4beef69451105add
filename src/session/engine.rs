// src/session/engine.rs

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use super::shuffle;
use super::store::{ResultDraft, StudentIdentity};
use crate::models::quiz::{Question, Quiz};
use crate::models::quiz_result::{DetailStats, QuizResult};

/// Variant label persisted when the presentation was not shuffled.
pub const NO_SHUFFLE_VARIANT: &str = "original";

/// How correctness is revealed to the test-taker.
///
/// Guests get per-question feedback the moment they answer, and their first
/// answer is final. Enrolled students may change answers freely and learn
/// nothing until submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackPolicy {
    Immediate,
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Initializing,
    LiveAnswering,
    ConfirmingSubmit,
    Submitted,
    Review,
}

#[derive(Debug)]
pub enum SessionError {
    /// A live session cannot be opened over a quiz with no questions.
    EmptyQuiz,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::EmptyQuiz => write!(f, "quiz has no questions"),
        }
    }
}

impl std::error::Error for SessionError {}

/// One question as the test-taker sees it: possibly re-ordered options and
/// the correct index remapped accordingly.
#[derive(Debug, Clone, Serialize)]
pub struct PresentedQuestion {
    pub id: Uuid,
    pub text: String,
    pub image: Option<String>,
    pub options: Vec<String>,
    pub correct_index: usize,
    /// False only in review mode, when the recorded id no longer exists in
    /// the quiz. Rendered as an explicit "question unavailable" placeholder,
    /// never silently replaced with unrelated content.
    pub available: bool,
}

impl PresentedQuestion {
    pub(super) fn unshuffled(q: &Question) -> Self {
        Self {
            id: q.id,
            text: q.text.clone(),
            image: q.image.clone(),
            options: q.options.clone(),
            correct_index: q.correct_index,
            available: true,
        }
    }

    fn placeholder(id: Uuid) -> Self {
        Self {
            id,
            text: String::new(),
            image: None,
            options: Vec::new(),
            correct_index: 0,
            available: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Correct,
    Wrong,
    Skipped,
}

/// Final (or reconstructed) grading of a session, in presented order.
#[derive(Debug, Clone, Serialize)]
pub struct Scorecard {
    pub score: f64,
    pub max_score: f64,
    pub correct_count: usize,
    pub total_questions: usize,
    pub verdicts: Vec<Verdict>,
    /// "1.A, 2.B, 3._" in presented order.
    pub transcript: String,
    pub variant: String,
    pub question_order: Vec<Uuid>,
    pub answers: HashMap<Uuid, usize>,
    pub breakdown: DetailStats,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SelectOutcome {
    Recorded,
    RecordedWithFeedback { correct: bool },
    Ignored,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    Finalized,
    NeedsConfirmation { unanswered: Vec<usize> },
    Ignored,
}

#[derive(Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// No countdown: unlimited quiz, review session, or already submitted.
    Inactive,
    Running { remaining: u64 },
    /// Countdown hit zero; the session force-submitted itself.
    Expired,
}

/// A single test-taker's working state for one attempt (or one replay).
///
/// The session owns everything transient: the presented order, the answer
/// map, the live feedback map, and the countdown. It never touches storage;
/// callers persist the `ResultDraft` it produces.
pub struct QuizSession {
    quiz_id: i64,
    quiz_title: String,
    max_score: f64,
    policy: FeedbackPolicy,
    state: SessionState,
    presented: Vec<PresentedQuestion>,
    variant_code: Option<u16>,
    answers: HashMap<Uuid, usize>,
    feedback: HashMap<Uuid, bool>,
    remaining_seconds: Option<u64>,
    scorecard: Option<Scorecard>,
}

impl QuizSession {
    /// Opens a live session over a quiz.
    pub fn start(quiz: &Quiz, policy: FeedbackPolicy) -> Result<Self, SessionError> {
        Self::start_with_rng(quiz, policy, &mut rand::thread_rng())
    }

    pub fn start_with_rng(
        quiz: &Quiz,
        policy: FeedbackPolicy,
        rng: &mut impl rand::Rng,
    ) -> Result<Self, SessionError> {
        if quiz.questions.is_empty() {
            return Err(SessionError::EmptyQuiz);
        }

        let mut session = Self {
            quiz_id: quiz.id,
            quiz_title: quiz.title.clone(),
            max_score: quiz.max_score,
            policy,
            state: SessionState::Initializing,
            presented: Vec::new(),
            variant_code: None,
            answers: HashMap::new(),
            feedback: HashMap::new(),
            remaining_seconds: (quiz.time_limit > 0).then(|| quiz.time_limit as u64 * 60),
            scorecard: None,
        };

        let (presented, variant) =
            shuffle::presentation_order(&quiz.questions, quiz.shuffle_questions, rng);
        session.presented = presented;
        session.variant_code = variant;
        session.state = SessionState::LiveAnswering;

        Ok(session)
    }

    /// Reconstructs a past attempt from its persisted result: same presented
    /// order, same answers, permanently read-only.
    ///
    /// Correctness is recomputed against the quiz's *current* correct
    /// indices. A recorded question id the quiz no longer contains becomes an
    /// explicit unavailable placeholder.
    pub fn review(quiz: &Quiz, result: &QuizResult) -> Result<Self, SessionError> {
        let presented: Vec<PresentedQuestion> = if result.question_order.is_empty() {
            // Legacy results recorded no order; fall back to the quiz's
            // current natural order as a best effort.
            quiz.questions.iter().map(PresentedQuestion::unshuffled).collect()
        } else {
            result
                .question_order
                .iter()
                .map(|qid| {
                    quiz.questions
                        .iter()
                        .find(|q| q.id == *qid)
                        .map(PresentedQuestion::unshuffled)
                        .unwrap_or_else(|| PresentedQuestion::placeholder(*qid))
                })
                .collect()
        };

        if presented.is_empty() {
            return Err(SessionError::EmptyQuiz);
        }

        let mut session = Self {
            quiz_id: result.quiz_id,
            quiz_title: result.quiz_title.clone(),
            max_score: result.max_score,
            policy: FeedbackPolicy::Deferred,
            state: SessionState::Review,
            presented,
            variant_code: None,
            answers: result.user_answers.0.clone(),
            feedback: HashMap::new(),
            remaining_seconds: None,
            scorecard: None,
        };

        let (card, feedback) = session.compute_scorecard(result.quiz_variant.clone());
        session.feedback = feedback;
        session.scorecard = Some(card);

        Ok(session)
    }

    /// Records a selection.
    ///
    /// A no-op once the session is submitted, reviewing, or mid-confirmation.
    /// Under `Immediate` feedback the first answer per question is final and
    /// correctness is returned at once; under `Deferred` the selection may be
    /// overwritten until submission.
    pub fn select(&mut self, question_id: Uuid, option_index: usize) -> SelectOutcome {
        if self.state != SessionState::LiveAnswering {
            return SelectOutcome::Ignored;
        }

        let Some(question) = self.presented.iter().find(|q| q.id == question_id) else {
            return SelectOutcome::Ignored;
        };
        if option_index >= question.options.len() {
            return SelectOutcome::Ignored;
        }

        match self.policy {
            FeedbackPolicy::Immediate => {
                if self.answers.contains_key(&question_id) {
                    return SelectOutcome::Ignored;
                }
                let correct = option_index == question.correct_index;
                self.answers.insert(question_id, option_index);
                self.feedback.insert(question_id, correct);
                SelectOutcome::RecordedWithFeedback { correct }
            }
            FeedbackPolicy::Deferred => {
                self.answers.insert(question_id, option_index);
                SelectOutcome::Recorded
            }
        }
    }

    /// Finalizes the session, or asks for confirmation first.
    ///
    /// A non-forced submit of a deferred-feedback session with unanswered
    /// questions moves to `ConfirmingSubmit` and reports the 1-based gaps.
    /// Submitting again after finalization is a no-op.
    pub fn submit(&mut self, force: bool) -> SubmitOutcome {
        match self.state {
            SessionState::LiveAnswering | SessionState::ConfirmingSubmit => {}
            _ => return SubmitOutcome::Ignored,
        }

        if !force && self.policy == FeedbackPolicy::Deferred {
            let unanswered = self.unanswered_positions();
            if !unanswered.is_empty() {
                self.state = SessionState::ConfirmingSubmit;
                return SubmitOutcome::NeedsConfirmation { unanswered };
            }
        }

        self.finalize();
        SubmitOutcome::Finalized
    }

    /// Returns from the confirmation prompt without submitting.
    pub fn cancel_submit(&mut self) {
        if self.state == SessionState::ConfirmingSubmit {
            self.state = SessionState::LiveAnswering;
        }
    }

    /// Advances the countdown by one second.
    ///
    /// Reaching zero force-submits the session; the caller learns this via
    /// `Expired` and stops ticking. Sessions without a limit, reviews, and
    /// submitted sessions report `Inactive`.
    pub fn tick(&mut self) -> TickOutcome {
        match self.state {
            SessionState::LiveAnswering | SessionState::ConfirmingSubmit => {}
            _ => return TickOutcome::Inactive,
        }
        let Some(remaining) = self.remaining_seconds.as_mut() else {
            return TickOutcome::Inactive;
        };

        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.submit(true);
            return TickOutcome::Expired;
        }
        TickOutcome::Running { remaining: *remaining }
    }

    fn finalize(&mut self) {
        let (card, feedback) = self.compute_scorecard(self.variant_label());
        self.feedback = feedback;
        self.scorecard = Some(card);
        self.remaining_seconds = None;
        self.state = SessionState::Submitted;
    }

    /// Grades every presented question: unanswered counts as skipped and
    /// scores zero, exactly like a wrong answer.
    fn compute_scorecard(&self, variant: String) -> (Scorecard, HashMap<Uuid, bool>) {
        let total = self.presented.len();
        let mut correct_count = 0usize;
        let mut verdicts = Vec::with_capacity(total);
        let mut breakdown = DetailStats::default();
        let mut feedback = HashMap::new();
        let mut transcript = Vec::with_capacity(total);

        for (idx, q) in self.presented.iter().enumerate() {
            let pos = idx + 1;
            match self.answers.get(&q.id) {
                None => {
                    verdicts.push(Verdict::Skipped);
                    breakdown.skipped.push(pos);
                    transcript.push(format!("{}._", pos));
                }
                Some(&sel) => {
                    let correct = q.available && sel == q.correct_index;
                    feedback.insert(q.id, correct);
                    let letter = (b'A' + (sel as u8).min(25)) as char;
                    transcript.push(format!("{}.{}", pos, letter));
                    if correct {
                        correct_count += 1;
                        verdicts.push(Verdict::Correct);
                        breakdown.correct.push(pos);
                    } else {
                        verdicts.push(Verdict::Wrong);
                        breakdown.wrong.push(pos);
                    }
                }
            }
        }

        let score = if total == 0 {
            0.0
        } else {
            (correct_count as f64 / total as f64) * self.max_score
        };

        let card = Scorecard {
            score,
            max_score: self.max_score,
            correct_count,
            total_questions: total,
            verdicts,
            transcript: transcript.join(", "),
            variant,
            question_order: self.presented.iter().map(|q| q.id).collect(),
            answers: self.answers.clone(),
            breakdown,
        };
        (card, feedback)
    }

    /// 1-based positions (in presented order) with no recorded answer.
    pub fn unanswered_positions(&self) -> Vec<usize> {
        self.presented
            .iter()
            .enumerate()
            .filter(|(_, q)| !self.answers.contains_key(&q.id))
            .map(|(i, _)| i + 1)
            .collect()
    }

    /// Builds the persistable snapshot of a finalized session.
    /// Returns None until the session is submitted.
    pub fn result_draft(&self, student: &StudentIdentity) -> Option<ResultDraft> {
        let card = self.scorecard.as_ref()?;
        if self.state != SessionState::Submitted {
            return None;
        }
        Some(ResultDraft {
            quiz_id: self.quiz_id,
            quiz_title: self.quiz_title.clone(),
            student_id: student.id,
            student_name: student.name.clone(),
            class_id: student.class_id,
            score: card.score,
            max_score: card.max_score,
            correct_count: card.correct_count as i32,
            total_questions: card.total_questions as i32,
            answer_history: card.transcript.clone(),
            quiz_variant: card.variant.clone(),
            question_order: card.question_order.clone(),
            user_answers: card.answers.clone(),
            detail_stats: card.breakdown.clone(),
        })
    }

    /// Display label for the presentation variant.
    pub fn variant_label(&self) -> String {
        self.variant_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| NO_SHUFFLE_VARIANT.to_string())
    }

    /// Live running score for immediate-feedback sessions: display only,
    /// never persisted on its own.
    pub fn live_score(&self) -> f64 {
        if self.presented.is_empty() {
            return 0.0;
        }
        (self.live_correct_count() as f64 / self.presented.len() as f64) * self.max_score
    }

    pub fn live_correct_count(&self) -> usize {
        self.feedback.values().filter(|c| **c).count()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn policy(&self) -> FeedbackPolicy {
        self.policy
    }

    pub fn presented(&self) -> &[PresentedQuestion] {
        &self.presented
    }

    pub fn answers(&self) -> &HashMap<Uuid, usize> {
        &self.answers
    }

    pub fn feedback(&self) -> &HashMap<Uuid, bool> {
        &self.feedback
    }

    pub fn remaining_seconds(&self) -> Option<u64> {
        self.remaining_seconds
    }

    pub fn scorecard(&self) -> Option<&Scorecard> {
        self.scorecard.as_ref()
    }

    pub fn variant_code(&self) -> Option<u16> {
        self.variant_code
    }

    pub fn quiz_id(&self) -> i64 {
        self.quiz_id
    }

    pub fn quiz_title(&self) -> &str {
        &self.quiz_title
    }

    pub fn max_score(&self) -> f64 {
        self.max_score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json;

    fn question(tag: &str, options: [&str; 4], correct: usize) -> Question {
        Question {
            id: Uuid::new_v4(),
            text: format!("What is {}?", tag),
            image: None,
            options: options.iter().map(|s| s.to_string()).collect(),
            correct_index: correct,
        }
    }

    fn quiz_with(questions: Vec<Question>, shuffle: bool, time_limit: i32) -> Quiz {
        Quiz {
            id: 7,
            teacher_id: 1,
            title: "Unit test quiz".to_string(),
            questions: Json(questions),
            time_limit,
            max_score: 10.0,
            is_public: true,
            access_code: None,
            allow_retake: true,
            shuffle_questions: shuffle,
            assigned_class_ids: Json(Vec::new()),
            class_schedules: Json(std::collections::HashMap::new()),
            created_at: None,
        }
    }

    fn plain_quiz(n: usize) -> Quiz {
        let questions = (0..n)
            .map(|i| question(&format!("q{}", i), ["w", "x", "y", "z"], i % 4))
            .collect();
        quiz_with(questions, false, 0)
    }

    fn distinct_options_quiz(n: usize, shuffle: bool) -> Quiz {
        let questions = (0..n)
            .map(|i| {
                let opts = [
                    format!("{}-a", i),
                    format!("{}-b", i),
                    format!("{}-c", i),
                    format!("{}-d", i),
                ];
                Question {
                    id: Uuid::new_v4(),
                    text: format!("question {}", i),
                    image: None,
                    options: opts.to_vec(),
                    correct_index: i % 4,
                }
            })
            .collect();
        quiz_with(questions, shuffle, 0)
    }

    #[test]
    fn empty_quiz_is_refused() {
        let quiz = quiz_with(Vec::new(), false, 0);
        assert!(QuizSession::start(&quiz, FeedbackPolicy::Deferred).is_err());
    }

    #[test]
    fn no_shuffle_keeps_stored_order() {
        let quiz = plain_quiz(5);
        let session = QuizSession::start(&quiz, FeedbackPolicy::Deferred).unwrap();

        assert_eq!(session.state(), SessionState::LiveAnswering);
        assert_eq!(session.variant_code(), None);
        assert_eq!(session.variant_label(), NO_SHUFFLE_VARIANT);

        for (presented, original) in session.presented().iter().zip(quiz.questions.iter()) {
            assert_eq!(presented.id, original.id);
            assert_eq!(presented.options, original.options);
            assert_eq!(presented.correct_index, original.correct_index);
        }
    }

    #[test]
    fn shuffle_presents_a_permutation() {
        let quiz = distinct_options_quiz(12, true);
        let session = QuizSession::start(&quiz, FeedbackPolicy::Deferred).unwrap();

        let mut original_ids: Vec<Uuid> = quiz.questions.iter().map(|q| q.id).collect();
        let mut presented_ids: Vec<Uuid> = session.presented().iter().map(|q| q.id).collect();
        original_ids.sort();
        presented_ids.sort();
        assert_eq!(original_ids, presented_ids, "no duplicates, no omissions");

        for presented in session.presented() {
            let original = quiz.questions.iter().find(|q| q.id == presented.id).unwrap();
            let mut a = original.options.clone();
            let mut b = presented.options.clone();
            a.sort();
            b.sort();
            assert_eq!(a, b, "options are a permutation");
            assert_eq!(
                presented.options[presented.correct_index],
                original.options[original.correct_index],
                "correct index follows the correct option"
            );
        }

        let code = session.variant_code().unwrap();
        assert!((100..=999).contains(&code));
    }

    #[test]
    fn shuffle_handles_duplicate_option_text() {
        // Two identical option strings; the correct slot must still be
        // tracked through the permutation.
        let q = question("dup", ["same", "same", "other", "else"], 1);
        let quiz = quiz_with(vec![q], true, 0);

        for _ in 0..50 {
            let session = QuizSession::start(&quiz, FeedbackPolicy::Deferred).unwrap();
            let presented = &session.presented()[0];
            assert_eq!(presented.options[presented.correct_index], "same");
        }
    }

    #[test]
    fn deferred_selection_can_be_changed() {
        let quiz = plain_quiz(3);
        let mut session = QuizSession::start(&quiz, FeedbackPolicy::Deferred).unwrap();
        let qid = session.presented()[0].id;

        assert_eq!(session.select(qid, 1), SelectOutcome::Recorded);
        assert_eq!(session.select(qid, 2), SelectOutcome::Recorded);
        assert_eq!(session.answers()[&qid], 2);
        assert!(session.feedback().is_empty(), "no feedback before submit");
    }

    #[test]
    fn immediate_mode_locks_first_answer() {
        let quiz = plain_quiz(3);
        let mut session = QuizSession::start(&quiz, FeedbackPolicy::Immediate).unwrap();
        let qid = session.presented()[0].id;
        let correct = session.presented()[0].correct_index;
        let wrong = (correct + 1) % 4;

        assert_eq!(
            session.select(qid, wrong),
            SelectOutcome::RecordedWithFeedback { correct: false }
        );
        // Second try bounces off, even when it would have been right.
        assert_eq!(session.select(qid, correct), SelectOutcome::Ignored);
        assert_eq!(session.answers()[&qid], wrong);
    }

    #[test]
    fn immediate_mode_live_score_updates() {
        let quiz = plain_quiz(4);
        let mut session = QuizSession::start(&quiz, FeedbackPolicy::Immediate).unwrap();
        let first = &session.presented()[0];
        let (qid, correct) = (first.id, first.correct_index);

        session.select(qid, correct);
        assert_eq!(session.live_correct_count(), 1);
        assert!((session.live_score() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn invalid_selections_are_ignored() {
        let quiz = plain_quiz(2);
        let mut session = QuizSession::start(&quiz, FeedbackPolicy::Deferred).unwrap();
        let qid = session.presented()[0].id;

        assert_eq!(session.select(Uuid::new_v4(), 0), SelectOutcome::Ignored);
        assert_eq!(session.select(qid, 4), SelectOutcome::Ignored);
    }

    #[test]
    fn scoring_counts_skipped_as_wrong() {
        // 4 questions: two right, one wrong, one skipped -> 2/4 * 10 = 5.0.
        let quiz = plain_quiz(4);
        let mut session = QuizSession::start(&quiz, FeedbackPolicy::Deferred).unwrap();
        let presented: Vec<(Uuid, usize)> = session
            .presented()
            .iter()
            .map(|q| (q.id, q.correct_index))
            .collect();

        session.select(presented[0].0, presented[0].1);
        session.select(presented[1].0, presented[1].1);
        session.select(presented[2].0, (presented[2].1 + 1) % 4);

        assert_eq!(session.submit(true), SubmitOutcome::Finalized);
        let card = session.scorecard().unwrap();

        assert_eq!(card.correct_count, 2);
        assert_eq!(card.total_questions, 4);
        assert!((card.score - 5.0).abs() < 1e-9);
        assert_eq!(card.breakdown.correct, vec![1, 2]);
        assert_eq!(card.breakdown.wrong, vec![3]);
        assert_eq!(card.breakdown.skipped, vec![4]);
        assert_eq!(
            card.verdicts,
            vec![Verdict::Correct, Verdict::Correct, Verdict::Wrong, Verdict::Skipped]
        );
        assert!(card.transcript.ends_with("4._"));
    }

    #[test]
    fn transcript_uses_letters_in_presented_order() {
        let quiz = plain_quiz(3);
        let mut session = QuizSession::start(&quiz, FeedbackPolicy::Deferred).unwrap();
        let ids: Vec<Uuid> = session.presented().iter().map(|q| q.id).collect();

        session.select(ids[0], 0);
        session.select(ids[2], 3);
        session.submit(true);

        assert_eq!(session.scorecard().unwrap().transcript, "1.A, 2._, 3.D");
    }

    #[test]
    fn unforced_submit_with_gaps_asks_for_confirmation() {
        let quiz = plain_quiz(3);
        let mut session = QuizSession::start(&quiz, FeedbackPolicy::Deferred).unwrap();
        let ids: Vec<Uuid> = session.presented().iter().map(|q| q.id).collect();
        session.select(ids[1], 0);

        match session.submit(false) {
            SubmitOutcome::NeedsConfirmation { unanswered } => {
                assert_eq!(unanswered, vec![1, 3]);
            }
            other => panic!("expected confirmation, got {:?}", other),
        }
        assert_eq!(session.state(), SessionState::ConfirmingSubmit);

        // Going back changes nothing.
        session.cancel_submit();
        assert_eq!(session.state(), SessionState::LiveAnswering);
        assert_eq!(session.answers().len(), 1);

        // Confirming submits with the gaps skipped.
        session.submit(false);
        assert_eq!(session.submit(true), SubmitOutcome::Finalized);
        assert_eq!(session.state(), SessionState::Submitted);
    }

    #[test]
    fn unforced_submit_without_gaps_goes_straight_through() {
        let quiz = plain_quiz(2);
        let mut session = QuizSession::start(&quiz, FeedbackPolicy::Deferred).unwrap();
        for q in session.presented().to_vec() {
            session.select(q.id, 0);
        }
        assert_eq!(session.submit(false), SubmitOutcome::Finalized);
    }

    #[test]
    fn submit_is_idempotent() {
        let quiz = plain_quiz(2);
        let mut session = QuizSession::start(&quiz, FeedbackPolicy::Deferred).unwrap();
        assert_eq!(session.submit(true), SubmitOutcome::Finalized);
        let first_score = session.scorecard().unwrap().score;

        assert_eq!(session.submit(true), SubmitOutcome::Ignored);
        assert_eq!(session.select(session.presented()[0].id, 0), SelectOutcome::Ignored);
        assert_eq!(session.scorecard().unwrap().score, first_score);
    }

    #[test]
    fn countdown_expiry_forces_submission() {
        // 1-minute limit, nothing answered: after 60 ticks the session has
        // submitted itself with everything skipped.
        let quiz = quiz_with(
            (0..3).map(|i| question(&format!("t{}", i), ["a", "b", "c", "d"], 0)).collect(),
            false,
            1,
        );
        let mut session = QuizSession::start(&quiz, FeedbackPolicy::Deferred).unwrap();
        assert_eq!(session.remaining_seconds(), Some(60));

        for _ in 0..59 {
            assert!(matches!(session.tick(), TickOutcome::Running { .. }));
        }
        assert_eq!(session.tick(), TickOutcome::Expired);

        assert_eq!(session.state(), SessionState::Submitted);
        let card = session.scorecard().unwrap();
        assert_eq!(card.correct_count, 0);
        assert_eq!(card.breakdown.skipped, vec![1, 2, 3]);
        assert_eq!(session.tick(), TickOutcome::Inactive);
    }

    #[test]
    fn tick_is_inactive_without_a_limit() {
        let quiz = plain_quiz(2);
        let mut session = QuizSession::start(&quiz, FeedbackPolicy::Deferred).unwrap();
        assert_eq!(session.remaining_seconds(), None);
        assert_eq!(session.tick(), TickOutcome::Inactive);
    }

    fn result_for(
        quiz: &Quiz,
        order: Vec<Uuid>,
        answers: HashMap<Uuid, usize>,
    ) -> QuizResult {
        QuizResult {
            id: 1,
            quiz_id: quiz.id,
            quiz_title: quiz.title.clone(),
            student_id: 5,
            student_name: "Nguyễn Văn An".to_string(),
            class_id: 2,
            score: 0.0,
            max_score: quiz.max_score,
            correct_count: 0,
            total_questions: order.len() as i32,
            submitted_at: None,
            answer_history: String::new(),
            quiz_variant: "214".to_string(),
            question_order: Json(order),
            user_answers: Json(answers),
            detail_stats: Json(DetailStats::default()),
        }
    }

    #[test]
    fn review_replays_the_recorded_order_and_answers() {
        // Quiz with correct indices q1->1, q2->0, q3->2; the student saw
        // [q2, q1, q3], answered q1=1, q2=0, skipped q3.
        let q1 = question("one", ["a", "b", "c", "d"], 1);
        let q2 = question("two", ["e", "f", "g", "h"], 0);
        let q3 = question("three", ["i", "j", "k", "l"], 2);
        let (id1, id2, id3) = (q1.id, q2.id, q3.id);
        let quiz = quiz_with(vec![q1, q2, q3], true, 30);

        let mut answers = HashMap::new();
        answers.insert(id1, 1);
        answers.insert(id2, 0);
        let result = result_for(&quiz, vec![id2, id1, id3], answers);

        let session = QuizSession::review(&quiz, &result).unwrap();

        assert_eq!(session.state(), SessionState::Review);
        assert_eq!(session.remaining_seconds(), None, "no timer in review");
        let presented_ids: Vec<Uuid> = session.presented().iter().map(|q| q.id).collect();
        assert_eq!(presented_ids, vec![id2, id1, id3]);

        let card = session.scorecard().unwrap();
        assert_eq!(card.correct_count, 2);
        assert_eq!(
            card.verdicts,
            vec![Verdict::Correct, Verdict::Correct, Verdict::Skipped]
        );
        assert_eq!(card.variant, "214", "variant comes from the record");
    }

    #[test]
    fn review_is_permanently_locked() {
        let quiz = plain_quiz(2);
        let ids: Vec<Uuid> = quiz.questions.iter().map(|q| q.id).collect();
        let result = result_for(&quiz, ids.clone(), HashMap::new());
        let mut session = QuizSession::review(&quiz, &result).unwrap();

        assert_eq!(session.select(ids[0], 0), SelectOutcome::Ignored);
        assert_eq!(session.submit(true), SubmitOutcome::Ignored);
        assert_eq!(session.tick(), TickOutcome::Inactive);
        assert_eq!(session.state(), SessionState::Review);
    }

    #[test]
    fn review_reflects_edited_correct_index() {
        // The teacher changed the correct answer after submission: review
        // grades against the current index, not a frozen snapshot.
        let q = question("edited", ["a", "b", "c", "d"], 0);
        let qid = q.id;
        let mut quiz = quiz_with(vec![q], false, 0);

        let mut answers = HashMap::new();
        answers.insert(qid, 0);
        let result = result_for(&quiz, vec![qid], answers);

        let before = QuizSession::review(&quiz, &result).unwrap();
        assert_eq!(before.scorecard().unwrap().correct_count, 1);

        quiz.questions.0[0].correct_index = 2;
        let after = QuizSession::review(&quiz, &result).unwrap();
        assert_eq!(after.scorecard().unwrap().correct_count, 0);
    }

    #[test]
    fn review_marks_deleted_questions_unavailable() {
        let q1 = question("kept", ["a", "b", "c", "d"], 0);
        let id1 = q1.id;
        let ghost = Uuid::new_v4();
        let quiz = quiz_with(vec![q1], false, 0);

        let mut answers = HashMap::new();
        answers.insert(id1, 0);
        answers.insert(ghost, 2);
        let result = result_for(&quiz, vec![ghost, id1], answers);

        let session = QuizSession::review(&quiz, &result).unwrap();
        let placeholder = &session.presented()[0];
        assert_eq!(placeholder.id, ghost);
        assert!(!placeholder.available);

        // The unavailable question can never count as correct.
        let card = session.scorecard().unwrap();
        assert_eq!(card.correct_count, 1);
        assert_eq!(card.verdicts[0], Verdict::Wrong);
    }

    #[test]
    fn review_falls_back_to_natural_order_for_legacy_results() {
        let quiz = plain_quiz(3);
        let result = result_for(&quiz, Vec::new(), HashMap::new());
        let session = QuizSession::review(&quiz, &result).unwrap();

        let presented_ids: Vec<Uuid> = session.presented().iter().map(|q| q.id).collect();
        let quiz_ids: Vec<Uuid> = quiz.questions.iter().map(|q| q.id).collect();
        assert_eq!(presented_ids, quiz_ids);
    }

    #[test]
    fn result_draft_snapshots_the_submission() {
        let quiz = plain_quiz(2);
        let mut session = QuizSession::start(&quiz, FeedbackPolicy::Deferred).unwrap();
        let taker = StudentIdentity {
            id: 9,
            name: "Trần Thị Bích".to_string(),
            class_id: 4,
        };

        assert!(session.result_draft(&taker).is_none(), "not before submit");

        let q = &session.presented()[0];
        let (qid, correct) = (q.id, q.correct_index);
        session.select(qid, correct);
        session.submit(true);

        let draft = session.result_draft(&taker).unwrap();
        assert_eq!(draft.quiz_id, quiz.id);
        assert_eq!(draft.student_id, 9);
        assert_eq!(draft.class_id, 4);
        assert_eq!(draft.correct_count, 1);
        assert_eq!(draft.total_questions, 2);
        assert_eq!(draft.question_order.len(), 2);
        assert_eq!(draft.user_answers[&qid], correct);
        assert_eq!(draft.quiz_variant, NO_SHUFFLE_VARIANT);
    }
}
