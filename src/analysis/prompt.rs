//! Prompt text and response extraction for the analysis service.

use serde::de::DeserializeOwned;

use super::client::AnalysisError;
use crate::domain::{AnalysisResult, RefactorSuggestion};

pub const ANALYSIS_SYSTEM_PROMPT: &str = "You are a meticulous code reviewer. \
Respond with a single JSON object and nothing else.";

pub const REFACTOR_SYSTEM_PROMPT: &str = "You are a careful refactoring assistant. \
Preserve behavior. Respond with a single JSON object and nothing else.";

pub fn analysis_prompt(content: &str, language: &str) -> String {
    format!(
        "Analyze this {language} code for bugs, performance problems, type safety, \
security issues and code organization.\n\n\
Respond as JSON:\n\
{{\"issues\": [{{\"title\": string, \"description\": string, \"severity\": \"high\" | \"medium\" | \"low\"}}], \
\"score\": integer from 0 (unmaintainable) to 100 (exemplary)}}\n\n\
```{language}\n{content}\n```"
    )
}

pub fn refactor_prompt(content: &str, language: &str) -> String {
    format!(
        "Refactor this {language} code to improve quality and readability, fix likely bugs \
and follow best practices. Return the complete file.\n\n\
Respond as JSON:\n\
{{\"code\": string, \"explanation\": string}}\n\n\
```{language}\n{content}\n```"
    )
}

/// Locate the JSON object in a model response.
///
/// Accepts bare JSON, fenced blocks, or JSON surrounded by prose.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, AnalysisError> {
    let json = extract_json(text).ok_or_else(|| AnalysisError::Malformed("no JSON object in response".to_string()))?;
    serde_json::from_str(json).map_err(|e| AnalysisError::Malformed(e.to_string()))
}

/// Parse an analysis response. Issues and score are both required.
pub fn parse_analysis(text: &str) -> Result<AnalysisResult, AnalysisError> {
    let raw: AnalysisResult = parse_json(text)?;
    Ok(AnalysisResult::new(raw.issues, raw.score))
}

pub fn parse_refactor(text: &str) -> Result<RefactorSuggestion, AnalysisError> {
    parse_json(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Severity;

    #[test]
    fn test_prompts_embed_content() {
        let prompt = analysis_prompt("let x = 1;", "TypeScript");
        assert!(prompt.contains("```TypeScript\nlet x = 1;\n```"));
        assert!(refactor_prompt("x", "Python").contains("\"code\""));
    }

    #[test]
    fn test_extract_json_from_fence() {
        let text = "Here you go:\n```json\n{\"score\": 90, \"issues\": []}\n```\n";
        assert_eq!(extract_json(text), Some("{\"score\": 90, \"issues\": []}"));
        assert_eq!(extract_json("no braces"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn test_parse_analysis_accepts_original_field_names() {
        let text = r#"{"suggestions": [{"title": "n+1 query", "importance": "high"}], "score": 40}"#;
        let result = parse_analysis(text).unwrap();
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].severity, Severity::High);
        assert_eq!(result.score, 40);
    }

    #[test]
    fn test_parse_analysis_clamps_score() {
        let result = parse_analysis(r#"{"issues": [], "score": 250}"#).unwrap();
        assert_eq!(result.score, 100);
    }

    #[test]
    fn test_parse_analysis_rejects_missing_score() {
        let err = parse_analysis(r#"{"issues": []}"#).unwrap_err();
        assert!(matches!(err, AnalysisError::Malformed(_)));
    }

    #[test]
    fn test_parse_analysis_rejects_unknown_severity() {
        let err = parse_analysis(r#"{"issues": [{"severity": "critical"}], "score": 10}"#).unwrap_err();
        assert!(matches!(err, AnalysisError::Malformed(_)));
    }

    #[test]
    fn test_parse_refactor() {
        let suggestion = parse_refactor(r#"{"code": "fn a() {}"}"#).unwrap();
        assert_eq!(suggestion.code, "fn a() {}");
        assert!(suggestion.explanation.is_empty());
    }
}
