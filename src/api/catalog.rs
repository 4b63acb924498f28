use axum::{extract::{Path, Query, State}, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::domain::aggregates::{Category, Product};
use crate::services::catalog::{self, ProductDetail};
use crate::store::{Page, ProductQuery, ProductSort, DEFAULT_PER_PAGE};
use crate::{AppState, Result};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub q: Option<String>,
    pub category: Option<Uuid>,
    pub sort: Option<ProductSort>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl From<ListParams> for ProductQuery {
    fn from(p: ListParams) -> Self {
        ProductQuery {
            search: p.q, category_id: p.category, sort: p.sort.unwrap_or_default(), include_inactive: false,
            page: p.page.unwrap_or(1), per_page: p.per_page.unwrap_or(DEFAULT_PER_PAGE),
        }
    }
}

pub async fn list_categories(State(s): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(s.store.list_categories().await?))
}

pub async fn list_products(State(s): State<AppState>, Query(p): Query<ListParams>) -> Result<Json<Page<Product>>> {
    Ok(Json(catalog::list_products(&s, p.into()).await?))
}

pub async fn get_product(State(s): State<AppState>, viewer: Option<AuthUser>, Path(id): Path<Uuid>) -> Result<Json<ProductDetail>> {
    Ok(Json(catalog::product_detail(&s, viewer.as_ref(), id).await?))
}
