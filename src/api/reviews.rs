use axum::{extract::{Path, State}, http::StatusCode, Json};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::domain::aggregates::{Comment, ProductReview, Rating};
use crate::services::reviews::{self as feedback, CommentInput, RatingInput, ReviewInput};
use crate::{AppState, Result};

pub async fn list(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Vec<ProductReview>>> {
    Ok(Json(feedback::approved_reviews(&s, id).await?))
}

pub async fn rate(State(s): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>, Json(input): Json<RatingInput>) -> Result<Json<Rating>> {
    Ok(Json(feedback::rate_product(&s, &auth, id, input).await?))
}

pub async fn comment(State(s): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>, Json(input): Json<CommentInput>) -> Result<(StatusCode, Json<Comment>)> {
    Ok((StatusCode::CREATED, Json(feedback::comment_on_product(&s, &auth, id, input).await?)))
}

pub async fn review(State(s): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>, Json(input): Json<ReviewInput>) -> Result<(StatusCode, Json<ProductReview>)> {
    Ok((StatusCode::CREATED, Json(feedback::review_product(&s, &auth, id, input).await?)))
}
