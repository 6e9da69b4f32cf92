//! Local grading: exact numeric comparison against the stored answer.
//!
//! Used only when the model is not configured or its judgment call fails.

use crate::domain::{Evaluation, Judge};
use crate::util::format_answer;

/// Exact equality, no epsilon: `0.1 + 0.2` is not `0.3`.
pub fn is_exact_match(user_answer: f64, correct_answer: f64) -> bool {
  user_answer == correct_answer
}

pub fn grade_locally(correct_answer: f64, user_answer: f64) -> Evaluation {
  let is_correct = is_exact_match(user_answer, correct_answer);
  let feedback_text = if is_correct {
    format!("Your answer is correct! {} is the right answer.", format_answer(correct_answer))
  } else {
    format!(
      "Your answer is incorrect. You answered {}, but the correct answer is {}.",
      format_answer(user_answer),
      format_answer(correct_answer)
    )
  };
  Evaluation { is_correct, feedback_text, judged_by: Judge::Local }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn equal_answers_are_correct() {
    let e = grade_locally(8.0, 8.0);
    assert!(e.is_correct);
    assert_eq!(e.judged_by, Judge::Local);
    assert!(e.feedback_text.contains("correct"));
  }

  #[test]
  fn different_answers_are_incorrect() {
    let e = grade_locally(8.0, 7.0);
    assert!(!e.is_correct);
    assert!(e.feedback_text.contains("the correct answer is 8"));
  }

  #[test]
  fn comparison_has_no_tolerance() {
    assert!(!is_exact_match(0.1 + 0.2, 0.3));
    assert!(!is_exact_match(2.4999999, 2.5));
    assert!(is_exact_match(2.5, 2.5));
    assert!(is_exact_match(-0.0, 0.0));
  }
}
