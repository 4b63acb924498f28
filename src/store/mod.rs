//! Persistence boundary.
//!
//! Handlers and services only talk to [`Store`]. [`postgres::PgStore`] is the
//! production backend; [`memory::MemoryStore`] keeps everything in process and
//! backs tests and database-less development runs. Both apply the checkout
//! and status-transition workflows atomically.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::{
    CartItem, CartOwner, Category, Comment, ModerationStatus, Order, OrderDraft, OrderStatus, OrderTransition, Product,
    ProductReview, Rating, RatingSummary, RefundRequest, RefundStatus, SensitiveData, Session, User, WishlistEntry,
};
use crate::invoice::{Invoice, InvoiceSummary};
use crate::Result;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// `?sort=` values. A leading `-` means descending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum ProductSort {
    #[default]
    #[serde(rename = "newest")]
    Newest,
    #[serde(rename = "name")]
    Name,
    #[serde(rename = "price")]
    PriceAsc,
    #[serde(rename = "-price")]
    PriceDesc,
    #[serde(rename = "popularity")]
    PopularityAsc,
    #[serde(rename = "-popularity")]
    PopularityDesc,
}

#[derive(Clone, Debug)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
    pub sort: ProductSort,
    pub include_inactive: bool,
    pub page: u32,
    pub per_page: u32,
}

impl Default for ProductQuery {
    fn default() -> Self {
        Self { search: None, category_id: None, sort: ProductSort::default(), include_inactive: false, page: 1, per_page: DEFAULT_PER_PAGE }
    }
}

impl ProductQuery {
    pub fn page(&self) -> u32 { self.page.max(1) }
    pub fn per_page(&self) -> u32 { self.per_page.clamp(1, MAX_PER_PAGE) }
    pub fn offset(&self) -> u32 { (self.page() - 1) * self.per_page() }
    pub fn search_term(&self) -> Option<&str> { self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
}

#[async_trait]
pub trait Store: Send + Sync {
    // Users and sessions
    async fn create_user(&self, user: User) -> Result<User>;
    async fn find_user(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn update_user(&self, user: User) -> Result<User>;
    async fn create_session(&self, session: Session) -> Result<()>;
    async fn find_session(&self, token_hash: &str) -> Result<Option<Session>>;
    async fn delete_session(&self, token_hash: &str) -> Result<()>;
    /// Removes every session expired at `now`. Returns how many went.
    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64>;
    /// Removes the user's sessions except `keep`.
    async fn revoke_user_sessions(&self, user_id: Uuid, keep: Option<&str>) -> Result<u64>;
    async fn save_sensitive_data(&self, data: SensitiveData) -> Result<()>;
    async fn sensitive_data(&self, user_id: Uuid) -> Result<Option<SensitiveData>>;

    // Catalog
    async fn list_categories(&self) -> Result<Vec<Category>>;
    async fn find_category(&self, id: Uuid) -> Result<Option<Category>>;
    async fn create_category(&self, category: Category) -> Result<Category>;
    async fn delete_category(&self, id: Uuid) -> Result<bool>;
    async fn list_products(&self, query: &ProductQuery) -> Result<Page<Product>>;
    async fn find_product(&self, id: Uuid) -> Result<Option<Product>>;
    async fn products_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>>;
    async fn create_product(&self, product: Product) -> Result<Product>;
    /// Saves catalog fields. Stock and sales counters are left alone; they
    /// only change through [`Store::set_stock`] and the order workflows.
    async fn save_product(&self, product: Product) -> Result<Product>;
    async fn set_stock(&self, product_id: Uuid, quantity: i32) -> Result<Product>;
    async fn delete_product(&self, id: Uuid) -> Result<bool>;
    async fn count_products(&self) -> Result<i64>;

    // Carts
    async fn cart_items(&self, owner: &CartOwner) -> Result<Vec<CartItem>>;
    /// Inserts or replaces the item with the same id.
    async fn save_cart_item(&self, item: CartItem) -> Result<CartItem>;
    async fn remove_cart_item(&self, owner: &CartOwner, item_id: Uuid) -> Result<bool>;
    async fn clear_cart(&self, owner: &CartOwner) -> Result<()>;

    // Orders
    /// Reserves stock for every line, records the order with its items,
    /// delivery and payment confirmation, and removes the ordered products
    /// from the user's cart. All or nothing.
    async fn place_order(&self, draft: OrderDraft) -> Result<Order>;
    async fn find_order(&self, id: Uuid) -> Result<Option<Order>>;
    async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>>;
    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>>;
    async fn orders_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Order>>;
    /// Applies a planned transition if the order is still in `from`,
    /// restocking and approving the refund in the same unit of work.
    async fn apply_transition(&self, transition: &OrderTransition) -> Result<Order>;
    async fn has_delivered_purchase(&self, user_id: Uuid, product_id: Uuid) -> Result<bool>;

    // Invoices
    async fn save_invoice(&self, invoice: Invoice) -> Result<()>;
    async fn invoice_for_order(&self, order_id: Uuid) -> Result<Option<Invoice>>;
    async fn list_invoices(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<InvoiceSummary>>;

    // Ratings, comments, reviews
    /// One rating per user and product; a second one replaces the score.
    async fn save_rating(&self, rating: Rating) -> Result<Rating>;
    async fn rating_summary(&self, product_id: Uuid) -> Result<RatingSummary>;
    async fn create_comment(&self, comment: Comment) -> Result<Comment>;
    async fn comments(&self, product_id: Option<Uuid>, status: Option<ModerationStatus>) -> Result<Vec<Comment>>;
    async fn set_comment_status(&self, id: Uuid, status: ModerationStatus) -> Result<Option<Comment>>;
    async fn create_review(&self, review: ProductReview) -> Result<ProductReview>;
    async fn reviews(&self, product_id: Option<Uuid>, status: Option<ModerationStatus>) -> Result<Vec<ProductReview>>;
    async fn set_review_status(&self, id: Uuid, status: ModerationStatus) -> Result<Option<ProductReview>>;

    // Wishlists
    /// False when the product was already on the list.
    async fn add_to_wishlist(&self, entry: WishlistEntry) -> Result<bool>;
    async fn remove_from_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<bool>;
    async fn wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistEntry>>;
    async fn wishlist_watchers(&self, product_id: Uuid) -> Result<Vec<User>>;

    // Refunds
    /// Fails with a conflict while another pending or approved request exists.
    async fn create_refund(&self, refund: RefundRequest) -> Result<RefundRequest>;
    async fn find_refund(&self, id: Uuid) -> Result<Option<RefundRequest>>;
    async fn refunds(&self, status: Option<RefundStatus>) -> Result<Vec<RefundRequest>>;
    async fn refunds_for_order(&self, order_id: Uuid) -> Result<Vec<RefundRequest>>;
    /// Records a rejection if the request is still pending.
    async fn reject_refund(&self, id: Uuid, decided_by: Uuid, at: DateTime<Utc>) -> Result<RefundRequest>;
}
