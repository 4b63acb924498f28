//! Cart workflows for signed-in users and anonymous sessions.

use uuid::Uuid;

use crate::domain::aggregates::cart::check_addition;
use crate::domain::aggregates::{Cart, CartError, CartItem, CartOwner};
use crate::domain::value_objects::Quantity;
use crate::{AppState, EcommerceError, Result};

pub async fn view(state: &AppState, owner: &CartOwner) -> Result<Cart> {
    let items = state.store.cart_items(owner).await?;
    let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let products = state.store.products_by_ids(&ids).await?;
    Ok(Cart::priced(&items, products))
}

/// Adds units of a product, merging with a line already in the cart.
pub async fn add_item(state: &AppState, owner: &CartOwner, product_id: Uuid, quantity: Quantity) -> Result<CartItem> {
    let product = state.store.find_product(product_id).await?.ok_or(EcommerceError::NotFound("product"))?;
    let existing = state.store.cart_items(owner).await?.into_iter().find(|i| i.product_id == product_id);
    let merged = check_addition(&product, existing.as_ref().map(|i| i.quantity), quantity)?;
    let item = match existing {
        Some(mut item) => {
            item.quantity = merged;
            item
        }
        None => CartItem::new(owner.clone(), product_id, merged),
    };
    state.store.save_cart_item(item).await
}

pub async fn set_quantity(state: &AppState, owner: &CartOwner, item_id: Uuid, quantity: Quantity) -> Result<CartItem> {
    let mut item = state.store.cart_items(owner).await?
        .into_iter()
        .find(|i| i.id == item_id)
        .ok_or(CartError::ItemNotFound)?;
    let product = state.store.find_product(item.product_id).await?.ok_or(EcommerceError::NotFound("product"))?;
    item.quantity = check_addition(&product, None, quantity)?;
    state.store.save_cart_item(item).await
}

pub async fn remove_item(state: &AppState, owner: &CartOwner, item_id: Uuid) -> Result<()> {
    if !state.store.remove_cart_item(owner, item_id).await? {
        return Err(CartError::ItemNotFound.into());
    }
    Ok(())
}

/// Moves an anonymous session's cart into the user's cart at login.
/// Lines for a product the user already has are summed. A line whose
/// merged quantity the product cannot cover stays in the session cart.
pub async fn merge_session_cart(state: &AppState, session_key: &str, user_id: Uuid) -> Result<usize> {
    let session = CartOwner::Session(session_key.to_string());
    let user = CartOwner::User(user_id);
    let incoming = state.store.cart_items(&session).await?;
    if incoming.is_empty() { return Ok(0); }
    let mut existing = state.store.cart_items(&user).await?;

    let mut merged = 0;
    for mut item in incoming {
        let Some(product) = state.store.find_product(item.product_id).await? else {
            tracing::warn!(product_id = %item.product_id, "session cart line for a missing product left in place");
            continue;
        };
        let line = existing.iter_mut().find(|e| e.product_id == item.product_id);
        let quantity = match check_addition(&product, line.as_ref().map(|l| l.quantity), item.quantity) {
            Ok(quantity) => quantity,
            Err(e) => {
                tracing::warn!(user_id = %user_id, product_id = %product.id, error = %e, "session cart line not merged");
                continue;
            }
        };
        match line {
            Some(line) => {
                line.quantity = quantity;
                state.store.save_cart_item(line.clone()).await?;
                state.store.remove_cart_item(&session, item.id).await?;
            }
            None => {
                item.owner = user.clone();
                existing.push(state.store.save_cart_item(item).await?);
            }
        }
        merged += 1;
    }
    tracing::info!(user_id = %user_id, lines = merged, "merged session cart");
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{ProductError, Role};
    use crate::services::testing;

    fn qty(n: i64) -> Quantity { Quantity::new(n).unwrap() }

    #[tokio::test]
    async fn test_add_merges_and_respects_stock() {
        let (state, _) = testing::state();
        let product = testing::product(&state, "C-1", 5, 1000).await;
        let owner = CartOwner::Session("s1".into());
        add_item(&state, &owner, product.id, qty(2)).await.unwrap();
        let item = add_item(&state, &owner, product.id, qty(3)).await.unwrap();
        assert_eq!(item.quantity.value(), 5);
        let err = add_item(&state, &owner, product.id, qty(1)).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Cart(CartError::Product(ProductError::InsufficientStock { .. }))));
        let cart = view(&state, &owner).await.unwrap();
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.subtotal, rust_decimal::Decimal::new(5000, 2));
    }

    #[tokio::test]
    async fn test_set_quantity_and_remove() {
        let (state, _) = testing::state();
        let product = testing::product(&state, "C-2", 5, 1000).await;
        let owner = CartOwner::Session("s2".into());
        let item = add_item(&state, &owner, product.id, qty(1)).await.unwrap();
        assert_eq!(set_quantity(&state, &owner, item.id, qty(4)).await.unwrap().quantity.value(), 4);
        assert!(set_quantity(&state, &owner, item.id, qty(6)).await.is_err());
        let other = CartOwner::Session("intruder".into());
        assert!(matches!(remove_item(&state, &other, item.id).await, Err(EcommerceError::Cart(CartError::ItemNotFound))));
        remove_item(&state, &owner, item.id).await.unwrap();
        assert!(view(&state, &owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_cart_merges_into_user_cart() {
        let (state, _) = testing::state();
        let a = testing::product(&state, "C-3", 10, 1000).await;
        let b = testing::product(&state, "C-4", 10, 500).await;
        let user = testing::user(&state, "merger", Role::Customer).await;
        let user_owner = CartOwner::User(user.id());
        let session = CartOwner::Session("anon".into());
        add_item(&state, &user_owner, a.id, qty(1)).await.unwrap();
        add_item(&state, &session, a.id, qty(2)).await.unwrap();
        add_item(&state, &session, b.id, qty(1)).await.unwrap();

        assert_eq!(merge_session_cart(&state, "anon", user.id()).await.unwrap(), 2);
        let items = state.store.cart_items(&user_owner).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items.iter().find(|i| i.product_id == a.id).unwrap().quantity.value(), 3);
        assert!(state.store.cart_items(&session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_merge_never_exceeds_stock() {
        let (state, _) = testing::state();
        let scarce = testing::product(&state, "C-5", 5, 1000).await;
        let plenty = testing::product(&state, "C-6", 10, 500).await;
        let user = testing::user(&state, "capped", Role::Customer).await;
        let user_owner = CartOwner::User(user.id());
        let session = CartOwner::Session("anon-capped".into());
        add_item(&state, &user_owner, scarce.id, qty(4)).await.unwrap();
        add_item(&state, &session, scarce.id, qty(4)).await.unwrap();
        add_item(&state, &session, plenty.id, qty(2)).await.unwrap();

        assert_eq!(merge_session_cart(&state, "anon-capped", user.id()).await.unwrap(), 1);
        let items = state.store.cart_items(&user_owner).await.unwrap();
        assert_eq!(items.iter().find(|i| i.product_id == scarce.id).unwrap().quantity.value(), 4);
        assert_eq!(items.iter().find(|i| i.product_id == plenty.id).unwrap().quantity.value(), 2);

        let left = state.store.cart_items(&session).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].product_id, scarce.id);
        assert_eq!(left[0].quantity.value(), 4);
    }

    #[tokio::test]
    async fn test_session_merge_skips_inactive_product() {
        let (state, _) = testing::state();
        let product = testing::product(&state, "C-7", 5, 1000).await;
        let user = testing::user(&state, "late", Role::Customer).await;
        let session = CartOwner::Session("anon-late".into());
        add_item(&state, &session, product.id, qty(1)).await.unwrap();
        let mut retired = product.clone();
        retired.is_active = false;
        state.store.save_product(retired).await.unwrap();

        assert_eq!(merge_session_cart(&state, "anon-late", user.id()).await.unwrap(), 0);
        assert!(state.store.cart_items(&CartOwner::User(user.id())).await.unwrap().is_empty());
        assert_eq!(state.store.cart_items(&session).await.unwrap().len(), 1);
    }
}
