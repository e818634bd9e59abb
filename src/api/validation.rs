use crate::api::errors::ApiError;
use crate::db::types::QuestionType;
use crate::schemas::question::OptionCreate;

/// Cross-field question invariants the derive-level validators cannot see:
/// selectable types need a real option set with at least one correct answer,
/// fill-blank needs an authoritative reference answer.
pub(crate) fn validate_question_shape(
    question_type: QuestionType,
    options: &[OptionCreate],
    reference_answer: Option<&str>,
) -> Result<(), ApiError> {
    if question_type.is_selectable() {
        if options.len() < 2 {
            return Err(ApiError::BadRequest(
                "Selectable questions need at least 2 options".to_string(),
            ));
        }
        if question_type == QuestionType::TrueFalse && options.len() != 2 {
            return Err(ApiError::BadRequest(
                "True/false questions need exactly 2 options".to_string(),
            ));
        }
        if !options.iter().any(|option| option.is_correct) {
            return Err(ApiError::BadRequest(
                "At least one option must be marked correct".to_string(),
            ));
        }
        return Ok(());
    }

    if !options.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "Options are not allowed for {question_type:?} questions"
        )));
    }

    if question_type == QuestionType::FillBlank
        && reference_answer.map(str::trim).unwrap_or("").is_empty()
    {
        return Err(ApiError::BadRequest(
            "Fill-blank questions need a reference answer".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(text: &str, is_correct: bool) -> OptionCreate {
        OptionCreate { text: text.to_string(), is_correct }
    }

    #[test]
    fn selectable_needs_two_options_one_correct() {
        let single = vec![option("a", true)];
        assert!(validate_question_shape(QuestionType::SingleSelect, &single, None).is_err());

        let none_correct = vec![option("a", false), option("b", false)];
        assert!(
            validate_question_shape(QuestionType::SingleSelect, &none_correct, None).is_err()
        );

        let valid = vec![option("a", true), option("b", false)];
        assert!(validate_question_shape(QuestionType::SingleSelect, &valid, None).is_ok());
    }

    #[test]
    fn true_false_needs_exactly_two() {
        let three = vec![option("t", true), option("f", false), option("maybe", false)];
        assert!(validate_question_shape(QuestionType::TrueFalse, &three, None).is_err());

        let two = vec![option("t", true), option("f", false)];
        assert!(validate_question_shape(QuestionType::TrueFalse, &two, None).is_ok());
    }

    #[test]
    fn fill_blank_needs_reference_answer() {
        assert!(validate_question_shape(QuestionType::FillBlank, &[], None).is_err());
        assert!(validate_question_shape(QuestionType::FillBlank, &[], Some("  ")).is_err());
        assert!(validate_question_shape(QuestionType::FillBlank, &[], Some("42")).is_ok());
    }

    #[test]
    fn essay_rejects_options() {
        let options = vec![option("a", false), option("b", false)];
        assert!(validate_question_shape(QuestionType::Essay, &options, None).is_err());
        assert!(validate_question_shape(QuestionType::Essay, &[], None).is_ok());
    }
}
