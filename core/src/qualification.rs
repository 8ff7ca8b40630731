use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::tools::LeakTag;

pub const BASE_SCORE: i32 = 50;
pub const DIAGNOSIS_BONUS: i32 = 10;
pub const SUMMARY_BONUS: i32 = 10;
pub const BOOK_THRESHOLD: i32 = 55;

/// What the agent should do next with a qualified lead.
///
/// `NotFit` and `Transfer` belong to the taxonomy the voice prompt understands
/// but [`score_qualification`] never produces them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum RecommendedAction {
    #[serde(rename = "book")]
    Book,
    #[serde(rename = "park")]
    Park,
    #[serde(rename = "not-fit")]
    NotFit,
    #[serde(rename = "transfer")]
    Transfer,
}

impl RecommendedAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Park => "park",
            Self::NotFit => "not-fit",
            Self::Transfer => "transfer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualificationScore {
    pub score: i32,
    pub recommended_action: RecommendedAction,
}

/// Score a qualification from the request fields alone.
///
/// An empty summary counts as absent.
pub fn score_qualification(
    diagnosis_tag: Option<LeakTag>,
    one_sentence_summary: Option<&str>,
) -> QualificationScore {
    let mut score = BASE_SCORE;
    if diagnosis_tag.is_some() {
        score += DIAGNOSIS_BONUS;
    }
    if one_sentence_summary.is_some_and(|s| !s.is_empty()) {
        score += SUMMARY_BONUS;
    }

    let recommended_action = if score >= BOOK_THRESHOLD {
        RecommendedAction::Book
    } else {
        RecommendedAction::Park
    };

    QualificationScore {
        score,
        recommended_action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_and_summary_score_seventy_and_book() {
        let result = score_qualification(Some(LeakTag::LeakSpeed), Some("Slow replies lose leads."));
        assert_eq!(result.score, 70);
        assert_eq!(result.recommended_action, RecommendedAction::Book);
    }

    #[test]
    fn nothing_scores_fifty_and_parks() {
        let result = score_qualification(None, None);
        assert_eq!(result.score, 50);
        assert_eq!(result.recommended_action, RecommendedAction::Park);
    }

    #[test]
    fn either_signal_alone_is_enough_to_book() {
        assert_eq!(
            score_qualification(Some(LeakTag::LeakTraffic), None).recommended_action,
            RecommendedAction::Book
        );
        let summary_only = score_qualification(None, Some("Needs more enquiries."));
        assert_eq!(summary_only.score, 60);
        assert_eq!(summary_only.recommended_action, RecommendedAction::Book);
    }

    #[test]
    fn empty_summary_does_not_count() {
        assert_eq!(score_qualification(None, Some("")).score, 50);
    }

    #[test]
    fn action_serializes_with_hyphenated_names() {
        assert_eq!(
            serde_json::to_value(RecommendedAction::NotFit).unwrap(),
            serde_json::json!("not-fit")
        );
        assert_eq!(RecommendedAction::Transfer.as_str(), "transfer");
    }
}
