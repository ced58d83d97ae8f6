use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::LoadError;
use crate::models::Question;

/// Load the shared question pool from a JSON array of questions.
pub fn load_questions_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<Question>, LoadError> {
    let path = path.as_ref();

    let json_content = fs::read_to_string(path)?;
    let questions = parse_questions(&json_content)?;

    info!(path = %path.display(), count = questions.len(), "loaded questions");
    Ok(questions)
}

pub fn parse_questions(json_content: &str) -> Result<Vec<Question>, LoadError> {
    let questions: Vec<Question> = serde_json::from_str(json_content)?;

    if questions.is_empty() {
        return Err(LoadError::Empty);
    }

    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_questions() {
        let json = r#"[
            {
                "id": "q1",
                "question_text": "2 + 2 = ?",
                "options": {"A": "3", "B": "4", "C": "5", "D": "22"},
                "correct_answer": "B"
            }
        ]"#;

        let questions = parse_questions(json).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].id, "q1");
        assert_eq!(questions[0].text, "2 + 2 = ?");
        assert_eq!(questions[0].options["D"], "22");
        assert!(questions[0].is_correct("B"));
        assert!(!questions[0].is_correct("b"));
    }

    #[test]
    fn test_parse_rejects_empty_pool() {
        assert!(matches!(parse_questions("[]"), Err(LoadError::Empty)));
    }

    #[test]
    fn test_parse_rejects_bad_json() {
        assert!(matches!(parse_questions("{"), Err(LoadError::Json(_))));
    }
}
