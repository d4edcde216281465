//! Completion verdicts parsed from oracle answers
//!
//! The completion question is asked as yes/no, but answers arrive as free
//! text in whatever language the oracle picks. Parsing is clause and token
//! based:
//!
//! - An affirmative token (`yes`, `done`, `complete`, `completed`,
//!   `finished`, `是`, `完成`) means complete
//! - A negation (`no`, `not`, `否`, `未`, `不`, `没`) as the first token of the
//!   answer, or anywhere before the affirmative within its clause, means
//!   incomplete
//! - Anything else is undetermined and the caller falls back to its own limits

use serde::{Deserialize, Serialize};

const AFFIRMATIVE: &[&[&str]] = &[
    &["yes"],
    &["done"],
    &["complete"],
    &["completed"],
    &["finished"],
    &["是"],
    &["完", "成"],
];

// `没有` tokenizes to `没`, `有`
const NEGATION: &[&str] = &["no", "not", "否", "未", "不", "没"];

/// Oracle judgement on whether the task is finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// The oracle affirmed completion
    Complete { answer: String },
    /// The oracle explicitly denied completion
    Incomplete,
    /// No usable answer (no history, oracle failure, or an unclear reply)
    Undetermined,
}

impl Verdict {
    pub fn parse(answer: &str) -> Self {
        let clauses: Vec<Vec<String>> = answer
            .split(is_clause_break)
            .map(tokenize)
            .filter(|tokens| !tokens.is_empty())
            .collect();

        let Some(first) = clauses.first() else {
            return Verdict::Undetermined;
        };
        if is_negation(&first[0]) {
            return Verdict::Incomplete;
        }

        // The first clause carrying an affirmative decides
        for tokens in &clauses {
            let Some(i) = first_affirmative(tokens) else {
                continue;
            };
            if tokens[..i].iter().any(|t| is_negation(t)) {
                return Verdict::Incomplete;
            }
            return Verdict::Complete {
                answer: answer.trim().to_string(),
            };
        }
        Verdict::Undetermined
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Verdict::Complete { .. })
    }
}

fn first_affirmative(tokens: &[String]) -> Option<usize> {
    (0..tokens.len()).find(|&i| AFFIRMATIVE.iter().any(|term| matches_at(tokens, i, term)))
}

fn is_negation(token: &str) -> bool {
    NEGATION.contains(&token)
}

fn is_clause_break(c: char) -> bool {
    matches!(
        c,
        '.' | ',' | ';' | ':' | '!' | '?' | '\n' | '，' | '。' | '；' | '：' | '！' | '？'
    )
}

/// Lowercased ASCII words, with every other alphanumeric character (CJK) as its own token
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            word.push(c.to_ascii_lowercase());
            continue;
        }
        if !word.is_empty() {
            tokens.push(std::mem::take(&mut word));
        }
        if !c.is_ascii() && c.is_alphanumeric() {
            tokens.push(c.to_string());
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }
    tokens
}

fn matches_at(tokens: &[String], start: usize, term: &[&str]) -> bool {
    tokens
        .get(start..start + term.len())
        .is_some_and(|window| window.iter().zip(term).all(|(a, b)| a == b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affirmative_answers() {
        for answer in ["Yes", "yes.", "Done!", "The task is complete", "是", "任务已完成", "YES, finished"] {
            assert!(Verdict::parse(answer).is_complete(), "{answer}");
        }
    }

    #[test]
    fn test_complete_keeps_answer_text() {
        assert_eq!(
            Verdict::parse("  Yes, the draft was saved\n"),
            Verdict::Complete {
                answer: "Yes, the draft was saved".to_string()
            }
        );
    }

    #[test]
    fn test_negated_answers() {
        for answer in [
            "No",
            "no, not yet",
            "Not done",
            "The task is not complete",
            "The task is not yet complete",
            "It has not been completed",
            "I am not sure it is done",
            "否",
            "未完成",
            "不是",
            "没有完成",
            "还没完成",
        ] {
            assert_eq!(Verdict::parse(answer), Verdict::Incomplete, "{answer}");
        }
    }

    #[test]
    fn test_negation_in_earlier_clause_does_not_cancel() {
        for answer in [
            "The form showed no errors, and the task is complete",
            "页面没有报错，任务已完成",
        ] {
            assert!(Verdict::parse(answer).is_complete(), "{answer}");
        }
    }

    #[test]
    fn test_first_affirmative_clause_decides() {
        assert_eq!(
            Verdict::parse("The page loaded. It is not done, the upload is pending"),
            Verdict::Incomplete
        );
    }

    #[test]
    fn test_unclear_answers() {
        for answer in ["", "   ", "The upload dialog is still open", "incomplete"] {
            assert_eq!(Verdict::parse(answer), Verdict::Undetermined, "{answer}");
        }
    }

    #[test]
    fn test_tokenize_mixed_script() {
        assert_eq!(tokenize("Yes,完成 OK"), vec!["yes", "完", "成", "ok"]);
    }
}
