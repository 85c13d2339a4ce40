use std::collections::BTreeSet;

use crate::quiz::action::ActionError;
use crate::quiz::bank::QuestionBank;
use crate::quiz::{Answer, Question, QuestionKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleOutcome {
    pub delta: u32,
    pub is_correct: bool,
    pub correct: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiOutcome {
    pub delta: u32,
    pub correct: BTreeSet<usize>,
}

pub fn score_single(question: &Question, chosen: usize) -> Result<SingleOutcome, ActionError> {
    match &question.answer {
        Answer::Single(correct) => {
            let is_correct = chosen == *correct;
            Ok(SingleOutcome {
                delta: u32::from(is_correct),
                is_correct,
                correct: *correct,
            })
        }
        Answer::Multi(_) => Err(mismatch(question, QuestionKind::Single)),
    }
}

/// One point per correctly selected option. Wrong picks and omissions cost nothing.
pub fn score_multi(
    question: &Question,
    selected: &BTreeSet<usize>,
) -> Result<MultiOutcome, ActionError> {
    match &question.answer {
        Answer::Multi(correct) => Ok(MultiOutcome {
            delta: selected.intersection(correct).count() as u32,
            correct: correct.clone(),
        }),
        Answer::Single(_) => Err(mismatch(question, QuestionKind::Multi)),
    }
}

pub fn total_possible(bank: &QuestionBank) -> u32 {
    bank.iter().map(|q| q.answer.points()).sum()
}

fn mismatch(question: &Question, expected: QuestionKind) -> ActionError {
    ActionError::TypeMismatch {
        question: question.id,
        expected,
        found: question.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(correct: usize) -> Question {
        Question {
            id: 0,
            prompt: "Grandpa's favourite tea?".to_string(),
            options: vec!["Black".into(), "Green".into(), "Mint".into()],
            answer: Answer::Single(correct),
        }
    }

    fn multi(correct: &[usize]) -> Question {
        Question {
            id: 1,
            prompt: "Which cities has grandpa lived in?".to_string(),
            options: vec!["Kharkiv".into(), "Lviv".into(), "Dnipro".into(), "Poltava".into()],
            answer: Answer::Multi(correct.iter().copied().collect()),
        }
    }

    #[test]
    fn single_scores_one_only_for_the_correct_index() {
        let question = single(1);
        for chosen in 0..question.options.len() {
            let outcome = score_single(&question, chosen).unwrap();
            assert_eq!(outcome.is_correct, chosen == 1);
            assert_eq!(outcome.delta, if chosen == 1 { 1 } else { 0 });
            assert_eq!(outcome.correct, 1);
        }
    }

    #[test]
    fn multi_counts_the_intersection_for_every_subset() {
        let question = multi(&[0, 2]);
        let correct = BTreeSet::from([0, 2]);
        // every subset of the four options
        for mask in 0u32..16 {
            let selected: BTreeSet<usize> = (0..4).filter(|i| mask & (1 << i) != 0).collect();
            let outcome = score_multi(&question, &selected).unwrap();
            assert_eq!(outcome.delta as usize, selected.intersection(&correct).count());
            assert!(outcome.delta <= 2);
        }
    }

    #[test]
    fn wrong_picks_never_subtract() {
        let question = multi(&[0, 2]);
        let outcome = score_multi(&question, &BTreeSet::from([0, 1, 2, 3])).unwrap();
        assert_eq!(outcome.delta, 2);

        let outcome = score_multi(&question, &BTreeSet::from([1, 3])).unwrap();
        assert_eq!(outcome.delta, 0);
        assert_eq!(outcome.correct, BTreeSet::from([0, 2]));
    }

    #[test]
    fn wrong_kind_is_a_type_mismatch() {
        assert!(matches!(
            score_single(&multi(&[0]), 0),
            Err(ActionError::TypeMismatch {
                expected: QuestionKind::Single,
                found: QuestionKind::Multi,
                ..
            })
        ));
        assert!(matches!(
            score_multi(&single(0), &BTreeSet::new()),
            Err(ActionError::TypeMismatch {
                expected: QuestionKind::Multi,
                ..
            })
        ));
    }

    #[test]
    fn total_counts_each_correct_multi_option() {
        let bank = QuestionBank::new(vec![single(1), multi(&[0, 2])]).unwrap();
        assert_eq!(total_possible(&bank), 3);

        let bank = QuestionBank::new(vec![single(0), single(2), multi(&[0, 1, 3])]).unwrap();
        assert_eq!(total_possible(&bank), 5);
    }
}
