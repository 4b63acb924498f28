//! Ratings, comments and reviews. Only customers who received a product may
//! give feedback on it; text waits for a product manager's approval.

use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::domain::aggregates::{Comment, ModerationStatus, ProductReview, Rating, ReviewError, Role};
use crate::domain::value_objects::Score;
use crate::{AppState, EcommerceError, Result};

#[derive(Debug, Deserialize)]
pub struct RatingInput {
    pub score: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CommentInput {
    #[validate(length(min = 1, max = 1000))]
    pub text: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewInput {
    pub rating: i64,
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModerationInput {
    pub approve: bool,
}

async fn ensure_purchased(state: &AppState, auth: &AuthUser, product_id: Uuid) -> Result<()> {
    state.store.find_product(product_id).await?.ok_or(EcommerceError::NotFound("product"))?;
    if !state.store.has_delivered_purchase(auth.id(), product_id).await? {
        return Err(ReviewError::NotPurchased.into());
    }
    Ok(())
}

/// A second rating from the same user replaces the first.
pub async fn rate_product(state: &AppState, auth: &AuthUser, product_id: Uuid, input: RatingInput) -> Result<Rating> {
    let score = Score::new(input.score)?;
    ensure_purchased(state, auth, product_id).await?;
    state.store.save_rating(Rating::new(auth.id(), product_id, score)).await
}

pub async fn comment_on_product(state: &AppState, auth: &AuthUser, product_id: Uuid, input: CommentInput) -> Result<Comment> {
    input.validate()?;
    ensure_purchased(state, auth, product_id).await?;
    let comment = state.store.create_comment(Comment::new(auth.id(), product_id, &input.text)?).await?;
    tracing::info!(product_id = %product_id, comment_id = %comment.id, "comment awaiting moderation");
    Ok(comment)
}

/// Stores the review and records its score as the user's rating.
pub async fn review_product(state: &AppState, auth: &AuthUser, product_id: Uuid, input: ReviewInput) -> Result<ProductReview> {
    input.validate()?;
    let score = Score::new(input.rating)?;
    ensure_purchased(state, auth, product_id).await?;
    let review = ProductReview::new(auth.id(), product_id, score, input.comment.as_deref())?;
    let review = state.store.create_review(review).await?;
    state.store.save_rating(Rating::new(auth.id(), product_id, score)).await?;
    tracing::info!(product_id = %product_id, review_id = %review.id, status = %review.status, "review submitted");
    Ok(review)
}

pub async fn approved_reviews(state: &AppState, product_id: Uuid) -> Result<Vec<ProductReview>> {
    state.store.find_product(product_id).await?.ok_or(EcommerceError::NotFound("product"))?;
    state.store.reviews(Some(product_id), Some(ModerationStatus::Approved)).await
}

pub async fn list_comments(state: &AppState, auth: &AuthUser, status: Option<ModerationStatus>) -> Result<Vec<Comment>> {
    auth.require(Role::ProductManager)?;
    state.store.comments(None, status).await
}

pub async fn list_reviews(state: &AppState, auth: &AuthUser, status: Option<ModerationStatus>) -> Result<Vec<ProductReview>> {
    auth.require(Role::ProductManager)?;
    state.store.reviews(None, status).await
}

pub async fn moderate_comment(state: &AppState, auth: &AuthUser, comment_id: Uuid, approve: bool) -> Result<Comment> {
    auth.require(Role::ProductManager)?;
    let status = ModerationStatus::from_decision(approve);
    let comment = state.store.set_comment_status(comment_id, status).await?.ok_or(EcommerceError::NotFound("comment"))?;
    tracing::info!(comment_id = %comment_id, status = %status, "comment moderated");
    Ok(comment)
}

pub async fn moderate_review(state: &AppState, auth: &AuthUser, review_id: Uuid, approve: bool) -> Result<ProductReview> {
    auth.require(Role::ProductManager)?;
    let status = ModerationStatus::from_decision(approve);
    let review = state.store.set_review_status(review_id, status).await?.ok_or(EcommerceError::NotFound("review"))?;
    tracing::info!(review_id = %review_id, status = %status, "review moderated");
    Ok(review)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::product_detail;
    use crate::services::testing::{self, delivered, placed};

    #[tokio::test]
    async fn test_feedback_requires_delivered_purchase() {
        let (state, _) = testing::state();
        let buyer = testing::user(&state, "waiting", Role::Customer).await;
        let (_, product_id) = placed(&state, &buyer, 5, 1).await;
        let err = rate_product(&state, &buyer, product_id, RatingInput { score: 5 }).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Review(ReviewError::NotPurchased)));
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);

        let (_, product_id) = delivered(&state, &buyer, 1).await;
        assert!(rate_product(&state, &buyer, product_id, RatingInput { score: 6 }).await.is_err());
        rate_product(&state, &buyer, product_id, RatingInput { score: 2 }).await.unwrap();
        rate_product(&state, &buyer, product_id, RatingInput { score: 4 }).await.unwrap();
        let summary = state.store.rating_summary(product_id).await.unwrap();
        assert_eq!(summary.count, 1);
        assert_eq!(summary.average, Some(4.0));
    }

    #[tokio::test]
    async fn test_comments_are_public_after_approval() {
        let (state, _) = testing::state();
        let buyer = testing::user(&state, "talker", Role::Customer).await;
        let pm = testing::user(&state, "moderator", Role::ProductManager).await;
        let (_, product_id) = delivered(&state, &buyer, 1).await;

        let comment = comment_on_product(&state, &buyer, product_id, CommentInput { text: "Great <b>value</b>".into() }).await.unwrap();
        assert_eq!(comment.text, "Great &lt;b&gt;value&lt;/b&gt;");
        assert!(product_detail(&state, None, product_id).await.unwrap().comments.is_empty());

        let script = CommentInput { text: "<script>alert(1)</script>".into() };
        assert!(matches!(comment_on_product(&state, &buyer, product_id, script).await, Err(EcommerceError::Review(ReviewError::Text(_)))));

        assert!(matches!(moderate_comment(&state, &buyer, comment.id, true).await, Err(EcommerceError::Forbidden)));
        assert_eq!(list_comments(&state, &pm, Some(ModerationStatus::Pending)).await.unwrap().len(), 1);
        moderate_comment(&state, &pm, comment.id, true).await.unwrap();
        assert_eq!(product_detail(&state, None, product_id).await.unwrap().comments.len(), 1);
        assert!(matches!(moderate_comment(&state, &pm, Uuid::now_v7(), false).await, Err(EcommerceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_review_records_rating() {
        let (state, _) = testing::state();
        let buyer = testing::user(&state, "critic", Role::Customer).await;
        let pm = testing::user(&state, "editor", Role::ProductManager).await;
        let (_, product_id) = delivered(&state, &buyer, 1).await;

        let silent = review_product(&state, &buyer, product_id, ReviewInput { rating: 3, comment: None }).await.unwrap();
        assert_eq!(silent.status, ModerationStatus::Approved);
        let worded = review_product(&state, &buyer, product_id, ReviewInput { rating: 5, comment: Some("Love it".into()) }).await.unwrap();
        assert_eq!(worded.status, ModerationStatus::Pending);
        assert_eq!(state.store.rating_summary(product_id).await.unwrap().average, Some(5.0));

        assert_eq!(approved_reviews(&state, product_id).await.unwrap().len(), 1);
        moderate_review(&state, &pm, worded.id, false).await.unwrap();
        assert_eq!(list_reviews(&state, &pm, Some(ModerationStatus::Rejected)).await.unwrap().len(), 1);
        assert_eq!(approved_reviews(&state, product_id).await.unwrap().len(), 1);
    }
}
