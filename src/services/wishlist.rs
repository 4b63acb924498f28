use uuid::Uuid;

use crate::auth::AuthUser;
use crate::domain::aggregates::{Product, WishlistEntry};
use crate::{AppState, EcommerceError, Result};

/// Wishlisted products, most recently added first.
pub async fn wishlist(state: &AppState, auth: &AuthUser) -> Result<Vec<Product>> {
    let ids: Vec<Uuid> = state.store.wishlist(auth.id()).await?.into_iter().map(|e| e.product_id).collect();
    state.store.products_by_ids(&ids).await
}

/// Returns false when the product was already wishlisted.
pub async fn add(state: &AppState, auth: &AuthUser, product_id: Uuid) -> Result<bool> {
    let product = state.store.find_product(product_id).await?.ok_or(EcommerceError::NotFound("product"))?;
    if !product.is_active { return Err(EcommerceError::NotFound("product")); }
    state.store.add_to_wishlist(WishlistEntry::new(auth.id(), product_id)).await
}

pub async fn remove(state: &AppState, auth: &AuthUser, product_id: Uuid) -> Result<()> {
    if !state.store.remove_from_wishlist(auth.id(), product_id).await? {
        return Err(EcommerceError::NotFound("wishlist entry"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::Role;
    use crate::services::testing;

    #[tokio::test]
    async fn test_wishlist_round() {
        let (state, _) = testing::state();
        let user = testing::user(&state, "dreamer", Role::Customer).await;
        let product = testing::product(&state, "WS-1", 0, 999).await;
        assert!(add(&state, &user, product.id).await.unwrap());
        assert!(!add(&state, &user, product.id).await.unwrap());
        assert_eq!(wishlist(&state, &user).await.unwrap()[0].id, product.id);
        remove(&state, &user, product.id).await.unwrap();
        assert!(matches!(remove(&state, &user, product.id).await, Err(EcommerceError::NotFound(_))));
        assert!(add(&state, &user, Uuid::now_v7()).await.is_err());
    }
}
