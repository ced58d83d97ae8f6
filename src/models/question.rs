use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single quiz question as stored in the question file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(rename = "question_text")]
    pub text: String,
    /// Option label (e.g. `"A"`) to option text.
    pub options: BTreeMap<String, String>,
    /// Label of the correct option, compared verbatim against submissions.
    pub correct_answer: String,
}

impl Question {
    /// Exact-match check, no trimming or case folding.
    pub fn is_correct(&self, answer: &str) -> bool {
        self.correct_answer == answer
    }
}
