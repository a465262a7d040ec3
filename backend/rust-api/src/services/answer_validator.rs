use crate::models::{
    catalog::{
        loosely_equal, value_as_number, value_text, CodeTestSolution, FillBlankSolution,
        LiteralSolution, MultipleChoiceSolution,
    },
    progress::SubmittedAnswer,
    Exercise, ExerciseKind,
};

/// Stateless grading. Knows whether an answer is right, nothing about rewards.
pub struct AnswerValidator;

impl AnswerValidator {
    pub fn grade(exercise: &Exercise, answer: &SubmittedAnswer) -> bool {
        match &exercise.kind {
            ExerciseKind::MultipleChoice(solution) => {
                grade_multiple_choice(solution, answer.raw_text().trim())
            }
            ExerciseKind::FillBlank(solution) => grade_fill_blank(solution, answer),
            ExerciseKind::CodeTest(solution) => grade_code_test(solution, answer.raw_text().trim()),
            ExerciseKind::Literal(solution) => grade_literal(solution, answer.raw_text().trim()),
        }
    }
}

fn grade_multiple_choice(solution: &MultipleChoiceSolution, answer: &str) -> bool {
    if let Some(correct_answer) = &solution.correct_answer {
        if value_as_number(correct_answer).is_some() {
            let by_id = solution.options.iter().find(|option| {
                option
                    .id
                    .as_ref()
                    .is_some_and(|id| loosely_equal(id, correct_answer))
            });
            if let Some(option) = by_id {
                return answer == option.answer_text().trim();
            }
        }
        return answer == value_text(correct_answer).trim();
    }

    solution
        .options
        .iter()
        .find(|option| option.is_marked_correct())
        .is_some_and(|option| answer == option.answer_text().trim())
}

fn grade_fill_blank(solution: &FillBlankSolution, answer: &SubmittedAnswer) -> bool {
    let segments: Vec<String> = match answer {
        SubmittedAnswer::Text(text) => text.trim().split('|').map(str::to_string).collect(),
        SubmittedAnswer::Segments(segments) => segments.clone(),
    };

    if segments.len() != solution.expected_answers.len() {
        return false;
    }

    segments
        .iter()
        .zip(&solution.expected_answers)
        .all(|(given, expected)| given.trim() == value_text(expected).trim())
}

// Output comparison only; running submitted code is a separate service.
fn grade_code_test(solution: &CodeTestSolution, answer: &str) -> bool {
    let expected = solution
        .expected_output
        .as_ref()
        .map(value_text)
        .unwrap_or_default();
    answer == expected.trim()
}

fn grade_literal(solution: &LiteralSolution, answer: &str) -> bool {
    let expected = solution
        .correct_answer
        .as_ref()
        .map(value_text)
        .unwrap_or_default();
    answer == expected.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExerciseDocument;
    use serde_json::{json, Value};

    fn exercise(kind: &str, solution: Value) -> Exercise {
        Exercise::from(ExerciseDocument {
            id: "ex-1".into(),
            part_id: "part-1".into(),
            kind: kind.into(),
            solution,
            exp_reward: 10,
            is_active: true,
        })
    }

    fn grade(exercise: &Exercise, answer: &str) -> bool {
        AnswerValidator::grade(exercise, &SubmittedAnswer::from(answer))
    }

    fn options() -> Value {
        json!([
            { "id": 1, "text": "let" },
            { "id": 2, "text": "const" },
            { "id": 3, "text": "var" }
        ])
    }

    #[test]
    fn multiple_choice_resolves_numeric_id_to_option_text() {
        let ex = exercise(
            "multiple_choice",
            json!({ "correct_answer": 2, "options": options() }),
        );
        assert!(grade(&ex, "const"));
        assert!(grade(&ex, "  const  "));
        assert!(!grade(&ex, "let"));
        assert!(!grade(&ex, "2"));
    }

    #[test]
    fn multiple_choice_numeric_string_id_resolves_too() {
        let ex = exercise(
            "multiple_choice",
            json!({ "correct_answer": "3", "options": options() }),
        );
        assert!(grade(&ex, "var"));
        assert!(!grade(&ex, "3"));
    }

    #[test]
    fn multiple_choice_unmatched_numeric_id_compares_literally() {
        let ex = exercise(
            "multiple_choice",
            json!({ "correct_answer": 42, "options": options() }),
        );
        assert!(grade(&ex, "42"));
        assert!(!grade(&ex, "let"));
    }

    #[test]
    fn multiple_choice_text_answer_compares_directly() {
        let ex = exercise(
            "multiple_choice",
            json!({ "correct_answer": " Ownership ", "options": [] }),
        );
        assert!(grade(&ex, "Ownership"));
        assert!(!grade(&ex, "ownership"));
    }

    #[test]
    fn multiple_choice_uses_flagged_option() {
        let ex = exercise(
            "multiple_choice",
            json!({ "options": [
                { "id": "a", "text": "Box", "correct": false },
                { "id": "b", "text": "Rc", "correct": true }
            ]}),
        );
        assert!(grade(&ex, "Rc"));
        assert!(!grade(&ex, "Box"));

        let by_id = exercise(
            "multiple_choice",
            json!({ "options": [{ "id": "b", "correct": true }] }),
        );
        assert!(grade(&by_id, "b"));
    }

    #[test]
    fn multiple_choice_without_answer_is_never_correct() {
        let ex = exercise("multiple_choice", json!({ "options": [{ "id": 1, "text": "x" }] }));
        assert!(!grade(&ex, "x"));
        assert!(!grade(&ex, ""));
    }

    #[test]
    fn fill_blank_requires_every_segment_in_order() {
        let ex = exercise("fill_blank", json!({ "expected_answers": ["a", "b"] }));
        assert!(grade(&ex, "a|b"));
        assert!(grade(&ex, " a | b "));
        assert!(!grade(&ex, "a"));
        assert!(!grade(&ex, "a|B"));
        assert!(!grade(&ex, "b|a"));
        assert!(!grade(&ex, "a|b|c"));
    }

    #[test]
    fn fill_blank_accepts_structured_segments() {
        let ex = exercise("fill_blank", json!({ "expected_answers": ["fn", 5] }));
        let answer = SubmittedAnswer::Segments(vec!["fn".into(), " 5".into()]);
        assert!(AnswerValidator::grade(&ex, &answer));

        let short = SubmittedAnswer::Segments(vec!["fn".into()]);
        assert!(!AnswerValidator::grade(&ex, &short));
    }

    #[test]
    fn code_test_compares_trimmed_output() {
        let ex = exercise("code_test", json!({ "expected_output": "Hello\n" }));
        assert!(grade(&ex, "Hello"));
        assert!(!grade(&ex, "hello"));

        let missing = exercise("code_test", json!({}));
        assert!(grade(&missing, "   "));
        assert!(!grade(&missing, "anything"));
    }

    #[test]
    fn unknown_type_uses_correct_answer() {
        let ex = exercise("short_answer", json!({ "correct_answer": "borrow" }));
        assert!(grade(&ex, "borrow "));
        assert!(!grade(&ex, "move"));
    }

    #[test]
    fn grading_is_pure() {
        let ex = exercise("fill_blank", json!({ "expected_answers": ["a", "b"] }));
        let answer = SubmittedAnswer::from("a|b");
        let first = AnswerValidator::grade(&ex, &answer);
        let second = AnswerValidator::grade(&ex, &answer);
        assert_eq!(first, second);
        assert_eq!(answer, SubmittedAnswer::from("a|b"));
    }
}
