// Allow dead code: API response structs have fields for completeness
#![allow(dead_code)]

use serde::Deserialize;

/// A knowledge base visible to the logged-in user.
#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeBase {
    pub kb_id: i64,
    pub kb_name: String,
    #[serde(default)]
    pub kb_description: Option<String>,
    #[serde(default)]
    pub keywords: Option<String>,
}

impl KnowledgeBase {
    pub fn display_description(&self) -> &str {
        self.kb_description
            .as_deref()
            .filter(|d| !d.is_empty())
            .unwrap_or("No description")
    }
}

/// One scored paragraph returned by a recall query.
///
/// Scoring fields are filled in server-side after retrieval; older
/// deployments omit them, so every one of them is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct RecallHit {
    pub content: String,
    #[serde(default)]
    pub parent_description: Option<String>,
    #[serde(default)]
    pub context_relevance: Option<f64>,
    #[serde(default)]
    pub context_sufficiency: Option<f64>,
    #[serde(default)]
    pub context_clarity: Option<f64>,
    #[serde(default)]
    pub total_score: Option<f64>,
    #[serde(default)]
    pub diagnosis: Option<String>,
}

impl RecallHit {
    /// Total score formatted for list display.
    pub fn score_display(&self) -> String {
        match self.total_score {
            Some(score) => format!("{:.2}", score),
            None => "-".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recall_hit_parses_without_scores() {
        let hit: RecallHit =
            serde_json::from_str(r#"{"content": "paragraph text"}"#).unwrap();
        assert_eq!(hit.content, "paragraph text");
        assert!(hit.total_score.is_none());
        assert_eq!(hit.score_display(), "-");
    }

    #[test]
    fn test_recall_hit_score_display() {
        let hit: RecallHit = serde_json::from_str(
            r#"{"content": "x", "total_score": 2.4567, "diagnosis": "ok"}"#,
        )
        .unwrap();
        assert_eq!(hit.score_display(), "2.46");
    }
}
