// src/session/shuffle.rs

use rand::Rng;
use rand::seq::SliceRandom;

use super::engine::PresentedQuestion;
use crate::models::quiz::Question;

/// Computes the presented question list for a new session.
///
/// With shuffling off, the stored order is returned untouched. With
/// shuffling on, the question order and each question's option order are
/// permuted independently (Fisher-Yates via `SliceRandom`), and a cosmetic
/// 3-digit variant code is drawn for display.
///
/// The chosen permutation is not reproducible from a seed; callers persist
/// its *result* (the presented id order) for later replay.
pub fn presentation_order(
    questions: &[Question],
    shuffle: bool,
    rng: &mut impl Rng,
) -> (Vec<PresentedQuestion>, Option<u16>) {
    if !shuffle {
        let presented = questions.iter().map(PresentedQuestion::unshuffled).collect();
        return (presented, None);
    }

    let mut order: Vec<usize> = (0..questions.len()).collect();
    order.shuffle(rng);

    let presented = order
        .into_iter()
        .map(|i| shuffle_options(&questions[i], rng))
        .collect();

    let variant: u16 = rng.gen_range(100..=999);
    (presented, Some(variant))
}

/// Permutes one question's options.
///
/// The correct answer is tracked through the permutation itself rather than
/// re-located by text, so questions with duplicate option strings keep a
/// well-defined correct index.
fn shuffle_options(q: &Question, rng: &mut impl Rng) -> PresentedQuestion {
    let mut perm: Vec<usize> = (0..q.options.len()).collect();
    perm.shuffle(rng);

    let options = perm.iter().map(|&i| q.options[i].clone()).collect();
    let correct_index = perm.iter().position(|&i| i == q.correct_index).unwrap_or(0);

    PresentedQuestion {
        id: q.id,
        text: q.text.clone(),
        image: q.image.clone(),
        options,
        correct_index,
        available: true,
    }
}
