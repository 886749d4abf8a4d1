use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::gigmodel::*;

// Gig DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateGigDto {
    pub poster_id: Uuid,

    #[validate(length(min = 3, max = 200, message = "Title must be between 3 and 200 characters"))]
    pub title: String,

    #[validate(length(min = 10, max = 2000, message = "Description must be between 10 and 2000 characters"))]
    pub description: String,

    #[validate(range(min = 0, message = "Budget cannot be negative"))]
    pub budget: i64,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct AssignSeekerDto {
    pub poster_id: Uuid,
    pub seeker_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GigResponseDto {
    pub id: Uuid,
    pub poster_id: Uuid,
    pub seeker_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub budget: i64,
    pub status: GigStatus,
    pub escrow_released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Gig> for GigResponseDto {
    fn from(gig: Gig) -> Self {
        Self {
            seeker_id: gig.seeker_id(),
            status: gig.status(),
            id: gig.id,
            poster_id: gig.poster_id,
            title: gig.title,
            description: gig.description,
            budget: gig.budget,
            escrow_released_at: gig.escrow_released_at,
            created_at: gig.created_at,
            updated_at: gig.updated_at,
        }
    }
}

// Completion DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CompletionActionDto {
    pub actor_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompletionStatusQuery {
    pub viewer_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InitiateCompletionResponseDto {
    pub status: GigStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmCompletionResponseDto {
    pub status: GigStatus,
    pub mutually_confirmed: bool,
    pub escrow_released: bool,
}

// Review DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateReviewDto {
    pub reviewer_id: Uuid,

    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i32,

    #[validate(length(max = 1000, message = "Comment cannot exceed 1000 characters"))]
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: &str, data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            data: Some(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_gig_bounds_are_enforced() {
        let body = CreateGigDto {
            poster_id: Uuid::new_v4(),
            title: "Go".to_string(),
            description: "Too short".to_string(),
            budget: -1,
        };
        let errors = body.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("description"));
        assert!(fields.contains_key("budget"));
    }

    #[test]
    fn review_comment_defaults_to_empty() {
        let body: CreateReviewDto = serde_json::from_value(serde_json::json!({
            "reviewer_id": Uuid::new_v4(),
            "rating": 5
        }))
        .unwrap();
        assert!(body.comment.is_empty());
        assert!(body.validate().is_ok());
    }
}
