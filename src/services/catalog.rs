//! Catalog reads and staff catalog management.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::domain::aggregates::{Category, Comment, ModerationStatus, NewProduct, Product, ProductReview, RatingSummary, Role};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::Discount;
use crate::services::{email, publish, send_email};
use crate::store::{Page, ProductQuery};
use crate::{AppState, EcommerceError, Result};

/// Catalog fields a product manager edits. Pricing belongs to sales managers.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 100))]
    pub model: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub serial_number: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub quantity_in_stock: i32,
    pub cost: Option<Decimal>,
    #[validate(length(max = 200))]
    pub warranty_status: Option<String>,
    #[validate(length(max = 500))]
    pub distributor_info: Option<String>,
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct PricingInput {
    pub price: Decimal,
    pub cost: Option<Decimal>,
    pub discount_percent: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CategoryInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub discounted_price: Decimal,
    pub in_stock: bool,
    pub rating: RatingSummary,
    pub comments: Vec<Comment>,
    pub reviews: Vec<ProductReview>,
}

pub async fn list_products(state: &AppState, mut query: ProductQuery) -> Result<Page<Product>> {
    query.include_inactive = false;
    state.store.list_products(&query).await
}

pub async fn list_all_products(state: &AppState, auth: &AuthUser, mut query: ProductQuery) -> Result<Page<Product>> {
    auth.require_staff()?;
    query.include_inactive = true;
    state.store.list_products(&query).await
}

/// Unpriced products are only visible to staff.
pub async fn product_detail(state: &AppState, viewer: Option<&AuthUser>, product_id: Uuid) -> Result<ProductDetail> {
    let product = state.store.find_product(product_id).await?.ok_or(EcommerceError::NotFound("product"))?;
    let is_staff = viewer.map(|v| v.role().is_staff()).unwrap_or(false);
    if !product.is_active && !is_staff {
        return Err(EcommerceError::NotFound("product"));
    }
    let approved = Some(ModerationStatus::Approved);
    Ok(ProductDetail {
        discounted_price: product.discounted_price(),
        in_stock: product.is_available(),
        rating: state.store.rating_summary(product.id).await?,
        comments: state.store.comments(Some(product.id), approved).await?,
        reviews: state.store.reviews(Some(product.id), approved).await?,
        product,
    })
}

pub async fn create_product(state: &AppState, auth: &AuthUser, input: ProductInput) -> Result<Product> {
    auth.require(Role::ProductManager)?;
    input.validate()?;
    ensure_category(state, input.category_id).await?;
    let product = Product::create(NewProduct {
        name: input.name, model: input.model, serial_number: input.serial_number, description: input.description,
        quantity_in_stock: input.quantity_in_stock, price: None, cost: input.cost,
        warranty_status: input.warranty_status, distributor_info: input.distributor_info, category_id: input.category_id,
    })?;
    let product = state.store.create_product(product).await?;
    tracing::info!(product_id = %product.id, "product created");
    Ok(product)
}

/// Updates descriptive fields. Stock has its own operation.
pub async fn update_product(state: &AppState, auth: &AuthUser, product_id: Uuid, input: ProductInput) -> Result<Product> {
    auth.require(Role::ProductManager)?;
    input.validate()?;
    ensure_category(state, input.category_id).await?;
    let mut product = state.store.find_product(product_id).await?.ok_or(EcommerceError::NotFound("product"))?;
    // Run the same field rules as creation.
    let checked = Product::create(NewProduct {
        name: input.name, model: input.model, serial_number: input.serial_number, description: input.description,
        quantity_in_stock: 0, price: Some(product.price), cost: input.cost.or(Some(product.cost)),
        warranty_status: input.warranty_status, distributor_info: input.distributor_info, category_id: input.category_id,
    })?;
    product.name = checked.name;
    product.model = checked.model;
    product.serial_number = checked.serial_number;
    product.description = checked.description;
    product.cost = checked.cost;
    product.warranty_status = checked.warranty_status;
    product.distributor_info = checked.distributor_info;
    product.category_id = checked.category_id;
    product.updated_at = checked.updated_at;
    state.store.save_product(product).await
}

pub async fn delete_product(state: &AppState, auth: &AuthUser, product_id: Uuid) -> Result<()> {
    auth.require(Role::ProductManager)?;
    if !state.store.delete_product(product_id).await? {
        return Err(EcommerceError::NotFound("product"));
    }
    tracing::info!(product_id = %product_id, "product deleted");
    Ok(())
}

pub async fn set_stock(state: &AppState, auth: &AuthUser, product_id: Uuid, quantity: i32) -> Result<Product> {
    auth.require(Role::ProductManager)?;
    let product = state.store.set_stock(product_id, quantity).await?;
    tracing::info!(product_id = %product_id, stock = quantity, "stock updated");
    Ok(product)
}

/// Sets price, cost and discount, publishing the product. When the discount
/// goes up, everyone with the product on their wishlist gets an email.
pub async fn set_pricing(state: &AppState, auth: &AuthUser, product_id: Uuid, input: PricingInput) -> Result<Product> {
    auth.require(Role::SalesManager)?;
    let discount = input.discount_percent.map(Discount::new).transpose()?;
    let mut product = state.store.find_product(product_id).await?.ok_or(EcommerceError::NotFound("product"))?;
    let before = product.discount;
    product.set_pricing(input.price, input.cost, discount)?;
    let raised = product.discount.percent() > before.percent();
    let product = state.store.save_product(product).await?;
    tracing::info!(product_id = %product.id, price = %product.price, discount = %product.discount.percent(), "pricing updated");

    if raised {
        publish(state, DomainEvent::ProductDiscounted {
            product_id: product.id, percent: product.discount.percent(), price: product.discounted_price(),
        }).await;
        alert_watchers(state, &product).await;
    }
    Ok(product)
}

async fn alert_watchers(state: &AppState, product: &Product) {
    let watchers = match state.store.wishlist_watchers(product.id).await {
        Ok(watchers) => watchers,
        Err(e) => {
            tracing::warn!(product_id = %product.id, error = %e, "could not load wishlist watchers");
            return;
        }
    };
    for user in watchers {
        let body = format!(
            "Hi {},\n\n{} from your wishlist is now {}% off: {:.2} instead of {:.2}.\n",
            user.display_name(), product.name, product.discount.percent(), product.discounted_price(), product.price,
        );
        send_email(state, email(state, &user.email, format!("Price drop: {}", product.name), body)).await;
    }
}

pub async fn create_category(state: &AppState, auth: &AuthUser, input: CategoryInput) -> Result<Category> {
    auth.require(Role::ProductManager)?;
    input.validate()?;
    state.store.create_category(Category::create(input.name, input.description)).await
}

pub async fn delete_category(state: &AppState, auth: &AuthUser, category_id: Uuid) -> Result<()> {
    auth.require(Role::ProductManager)?;
    if !state.store.delete_category(category_id).await? {
        return Err(EcommerceError::NotFound("category"));
    }
    Ok(())
}

async fn ensure_category(state: &AppState, category_id: Option<Uuid>) -> Result<()> {
    if let Some(id) = category_id {
        state.store.find_category(id).await?.ok_or(EcommerceError::NotFound("category"))?;
    }
    Ok(())
}
