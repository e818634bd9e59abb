use crate::db::models::{AnswerRecord, QuestionOption};
use crate::db::types::QuestionType;

/// The answer-defining view of one exam question, with the per-exam marks
/// from the exam's question list (which may differ from the bank default).
#[derive(Debug, Clone)]
pub(crate) struct ScorableQuestion {
    pub(crate) id: String,
    pub(crate) question_type: QuestionType,
    pub(crate) options: Vec<QuestionOption>,
    pub(crate) reference_answer: Option<String>,
    pub(crate) marks: f64,
    pub(crate) negative_marks: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScoringSummary {
    pub(crate) total_marks: f64,
    pub(crate) marks_obtained: f64,
    pub(crate) percentage: f64,
    pub(crate) grade: &'static str,
    pub(crate) passed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttemptStats {
    pub(crate) attempted: i32,
    pub(crate) correct: i32,
    pub(crate) incorrect: i32,
    pub(crate) skipped: i32,
    pub(crate) time_spent_seconds: i64,
}

/// Score an attempt. Pure: identical inputs always produce identical output.
/// Writes per-answer marks/correctness into the answer slots and returns the
/// aggregate summary and stats. Essays are never auto-scored; their marks
/// stay 0 pending a manual grade.
pub(crate) fn score(
    questions: &[ScorableQuestion],
    answers: &mut [AnswerRecord],
    passing_marks: f64,
) -> (ScoringSummary, AttemptStats) {
    let total_marks: f64 = questions.iter().map(|question| question.marks).sum();

    let mut raw_obtained = 0.0_f64;
    let mut attempted = 0;
    let mut correct = 0;
    let mut incorrect = 0;
    let mut time_spent_seconds = 0_i64;

    for answer in answers.iter_mut() {
        time_spent_seconds += answer.time_spent_seconds.max(0);

        let Some(question) = questions.iter().find(|q| q.id == answer.question_id) else {
            continue;
        };

        if !answer.is_attempted() {
            answer.is_correct = None;
            answer.marks_obtained = 0.0;
            continue;
        }

        attempted += 1;

        match check_answer(question, answer) {
            Some(true) => {
                answer.is_correct = Some(true);
                answer.marks_obtained = question.marks;
                raw_obtained += question.marks;
                correct += 1;
            }
            Some(false) => {
                answer.is_correct = Some(false);
                answer.marks_obtained = 0.0;
                raw_obtained -= question.negative_marks;
                incorrect += 1;
            }
            // Essay: correctness undetermined until manually graded.
            None => {
                answer.is_correct = None;
                answer.marks_obtained = 0.0;
            }
        }
    }

    let marks_obtained = raw_obtained.max(0.0);
    let (percentage, grade, passed) = recompute(total_marks, marks_obtained, passing_marks);

    let stats = AttemptStats {
        attempted,
        correct,
        incorrect,
        skipped: questions.len() as i32 - attempted,
        time_spent_seconds,
    };

    (ScoringSummary { total_marks, marks_obtained, percentage, grade, passed }, stats)
}

/// The single home of the derived scoring arithmetic, shared by the scorer
/// and the manual-grading path so the two can never diverge.
pub(crate) fn recompute(
    total_marks: f64,
    marks_obtained: f64,
    passing_marks: f64,
) -> (f64, &'static str, bool) {
    let percentage = if total_marks > 0.0 {
        (marks_obtained / total_marks * 100.0).round()
    } else {
        0.0
    };

    (percentage, letter_grade(percentage), marks_obtained >= passing_marks)
}

/// Fixed percentage bands. The exact boundaries are an externally visible
/// contract; clients render these letters verbatim.
pub(crate) fn letter_grade(percentage: f64) -> &'static str {
    if percentage >= 90.0 {
        "A+"
    } else if percentage >= 80.0 {
        "A"
    } else if percentage >= 70.0 {
        "B+"
    } else if percentage >= 60.0 {
        "B"
    } else if percentage >= 50.0 {
        "C+"
    } else if percentage >= 40.0 {
        "C"
    } else if percentage >= 30.0 {
        "D"
    } else {
        "F"
    }
}

fn check_answer(question: &ScorableQuestion, answer: &AnswerRecord) -> Option<bool> {
    match question.question_type {
        QuestionType::SingleSelect | QuestionType::MultiSelect | QuestionType::TrueFalse => {
            let mut correct: Vec<i32> = question
                .options
                .iter()
                .enumerate()
                .filter(|(_, option)| option.is_correct)
                .map(|(index, _)| index as i32)
                .collect();
            let mut selected = answer.selected_options.clone();
            correct.sort_unstable();
            selected.sort_unstable();
            selected.dedup();
            Some(!correct.is_empty() && selected == correct)
        }
        QuestionType::FillBlank => {
            let expected = question.reference_answer.as_deref().unwrap_or("");
            let given = answer.text_answer.as_deref().unwrap_or("");
            Some(
                !expected.trim().is_empty()
                    && given.trim().eq_ignore_ascii_case(expected.trim()),
            )
        }
        QuestionType::Essay => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(text: &str, is_correct: bool) -> QuestionOption {
        QuestionOption { text: text.to_string(), is_correct }
    }

    fn single_select(id: &str, marks: f64, correct_index: usize) -> ScorableQuestion {
        ScorableQuestion {
            id: id.to_string(),
            question_type: QuestionType::SingleSelect,
            options: (0..4).map(|index| option(&format!("opt{index}"), index == correct_index)).collect(),
            reference_answer: None,
            marks,
            negative_marks: 0.0,
        }
    }

    fn answered(question_id: &str, selected: Vec<i32>) -> AnswerRecord {
        let mut answer = AnswerRecord::empty(question_id.to_string());
        answer.selected_options = selected;
        answer
    }

    #[test]
    fn single_answer_exam_full_marks() {
        let questions = vec![single_select("q1", 5.0, 0)];
        let mut answers = vec![answered("q1", vec![0])];

        let (summary, stats) = score(&questions, &mut answers, 2.0);

        assert_eq!(summary.marks_obtained, 5.0);
        assert_eq!(summary.percentage, 100.0);
        assert_eq!(summary.grade, "A+");
        assert!(summary.passed);
        assert_eq!(stats.attempted, 1);
        assert_eq!(stats.correct, 1);
        assert_eq!(stats.skipped, 0);
        assert_eq!(answers[0].is_correct, Some(true));
        assert_eq!(answers[0].marks_obtained, 5.0);
    }

    #[test]
    fn scoring_is_deterministic() {
        let questions = vec![single_select("q1", 5.0, 1), single_select("q2", 5.0, 2)];
        let mut first = vec![answered("q1", vec![1]), answered("q2", vec![0])];
        let mut second = first.clone();

        let (summary_a, stats_a) = score(&questions, &mut first, 5.0);
        let (summary_b, stats_b) = score(&questions, &mut second, 5.0);

        assert_eq!(summary_a, summary_b);
        assert_eq!(stats_a, stats_b);
    }

    #[test]
    fn fifty_percent_is_c_plus_but_can_still_fail() {
        // 5/10 with passing marks 6: the 50% band is C+, not F, while the
        // pass flag comes from raw marks against passing marks.
        let questions = vec![single_select("q1", 5.0, 0), single_select("q2", 5.0, 1)];
        let mut answers = vec![answered("q1", vec![0]), answered("q2", vec![3])];

        let (summary, stats) = score(&questions, &mut answers, 6.0);

        assert_eq!(summary.marks_obtained, 5.0);
        assert_eq!(summary.percentage, 50.0);
        assert_eq!(summary.grade, "C+");
        assert!(!summary.passed);
        assert_eq!(stats.correct, 1);
        assert_eq!(stats.incorrect, 1);
    }

    #[test]
    fn grade_band_boundaries() {
        assert_eq!(letter_grade(90.0), "A+");
        assert_eq!(letter_grade(89.0), "A");
        assert_eq!(letter_grade(80.0), "A");
        assert_eq!(letter_grade(70.0), "B+");
        assert_eq!(letter_grade(60.0), "B");
        assert_eq!(letter_grade(50.0), "C+");
        assert_eq!(letter_grade(49.0), "C");
        assert_eq!(letter_grade(40.0), "C");
        assert_eq!(letter_grade(30.0), "D");
        assert_eq!(letter_grade(29.0), "F");
        assert_eq!(letter_grade(0.0), "F");
    }

    #[test]
    fn multi_select_requires_exact_option_set() {
        let question = ScorableQuestion {
            id: "q1".to_string(),
            question_type: QuestionType::MultiSelect,
            options: vec![option("a", true), option("b", true), option("c", false)],
            reference_answer: None,
            marks: 4.0,
            negative_marks: 0.0,
        };

        let mut exact = vec![answered("q1", vec![1, 0])];
        let (summary, _) = score(std::slice::from_ref(&question), &mut exact, 0.0);
        assert_eq!(summary.marks_obtained, 4.0);

        let mut partial = vec![answered("q1", vec![0])];
        let (summary, _) = score(std::slice::from_ref(&question), &mut partial, 0.0);
        assert_eq!(summary.marks_obtained, 0.0);

        let mut superset = vec![answered("q1", vec![0, 1, 2])];
        let (summary, _) = score(std::slice::from_ref(&question), &mut superset, 0.0);
        assert_eq!(summary.marks_obtained, 0.0);
    }

    #[test]
    fn fill_blank_is_case_insensitive_and_trimmed() {
        let question = ScorableQuestion {
            id: "q1".to_string(),
            question_type: QuestionType::FillBlank,
            options: Vec::new(),
            reference_answer: Some("Photosynthesis".to_string()),
            marks: 3.0,
            negative_marks: 0.0,
        };

        let mut answers = vec![AnswerRecord::empty("q1".to_string())];
        answers[0].text_answer = Some("  photosynthesis ".to_string());

        let (summary, _) = score(std::slice::from_ref(&question), &mut answers, 0.0);
        assert_eq!(summary.marks_obtained, 3.0);
        assert_eq!(answers[0].is_correct, Some(true));
    }

    #[test]
    fn essay_is_never_auto_scored() {
        let question = ScorableQuestion {
            id: "q1".to_string(),
            question_type: QuestionType::Essay,
            options: Vec::new(),
            reference_answer: None,
            marks: 10.0,
            negative_marks: 0.0,
        };

        let mut answers = vec![AnswerRecord::empty("q1".to_string())];
        answers[0].text_answer = Some("A long-form response.".to_string());

        let (summary, stats) = score(std::slice::from_ref(&question), &mut answers, 4.0);

        assert_eq!(summary.marks_obtained, 0.0);
        assert_eq!(answers[0].is_correct, None);
        // The essay counts as attempted even though it carries no auto marks.
        assert_eq!(stats.attempted, 1);
        assert_eq!(stats.correct, 0);
        assert_eq!(stats.incorrect, 0);
    }

    #[test]
    fn negative_marking_floors_total_at_zero() {
        let mut question = single_select("q1", 2.0, 0);
        question.negative_marks = 1.0;
        let mut wrong_only = single_select("q2", 2.0, 0);
        wrong_only.negative_marks = 5.0;

        let questions = vec![question, wrong_only];
        let mut answers = vec![answered("q1", vec![0]), answered("q2", vec![1])];

        let (summary, _) = score(&questions, &mut answers, 1.0);

        // 2.0 earned minus 5.0 penalty floors at 0, never negative.
        assert_eq!(summary.marks_obtained, 0.0);
        assert!(!summary.passed);
    }

    #[test]
    fn skipped_questions_take_no_penalty() {
        let mut question = single_select("q1", 5.0, 0);
        question.negative_marks = 2.0;
        let questions = vec![question, single_select("q2", 5.0, 1)];
        let mut answers =
            vec![AnswerRecord::empty("q1".to_string()), answered("q2", vec![1])];

        let (summary, stats) = score(&questions, &mut answers, 0.0);

        assert_eq!(summary.marks_obtained, 5.0);
        assert_eq!(stats.skipped, 1);
        assert_eq!(answers[0].is_correct, None);
    }

    #[test]
    fn patches_for_unknown_questions_are_ignored() {
        let questions = vec![single_select("q1", 5.0, 0)];
        let mut answers = vec![answered("q1", vec![0]), answered("ghost", vec![2])];

        let (summary, stats) = score(&questions, &mut answers, 0.0);

        assert_eq!(summary.marks_obtained, 5.0);
        assert_eq!(stats.attempted, 1);
    }

    #[test]
    fn recompute_matches_override_scenario() {
        // An essay scored 0 by the scorer, then manually set to 8 of 10.
        let (percentage, grade, passed) = recompute(10.0, 8.0, 6.0);
        assert_eq!(percentage, 80.0);
        assert_eq!(grade, "A");
        assert!(passed);
    }

    #[test]
    fn recompute_handles_zero_total() {
        let (percentage, grade, passed) = recompute(0.0, 0.0, 0.0);
        assert_eq!(percentage, 0.0);
        assert_eq!(grade, "F");
        assert!(passed);
    }
}
