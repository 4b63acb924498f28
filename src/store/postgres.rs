//! PostgreSQL store backed by sqlx.
//!
//! Multi-row workflows run in a transaction. Stock is decremented with a
//! conditional update, so two checkouts racing for the last unit cannot both
//! succeed; status changes only apply while the order is still in the
//! status they were planned against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use uuid::Uuid;

use super::{Page, ProductQuery, ProductSort, Store};
use crate::domain::aggregates::{
    CartItem, CartOwner, Category, Comment, Delivery, ModerationStatus, Order, OrderDraft, OrderItem, OrderStatus,
    OrderTransition, Product, ProductError, ProductReview, Rating, RatingSummary, RefundError, RefundRequest,
    RefundStatus, SensitiveData, Session, User, WishlistEntry,
};
use crate::domain::value_objects::{Discount, Quantity, Score};
use crate::invoice::{Invoice, InvoiceSummary};
use crate::{EcommerceError, Result};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    /// Connects and brings the schema up to date.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| EcommerceError::StorageError(format!("migration failed: {e}")))?;
        Ok(Self { pool })
    }

    async fn load_orders(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let items = sqlx::query_as::<_, OrderItemRow>("SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY id")
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
        let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for item in items {
            let item = OrderItem::try_from(item)?;
            by_order.entry(item.order_id).or_default().push(item);
        }
        rows.into_iter().map(|row| {
            let items = by_order.remove(&row.id).unwrap_or_default();
            row.into_order(items)
        }).collect()
    }

    async fn load_order(&self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("{ORDER_SELECT} WHERE o.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(self.load_orders(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

fn corrupt(detail: impl std::fmt::Display) -> EcommerceError {
    EcommerceError::StorageError(format!("unexpected stored value: {detail}"))
}

/// Turns unique-constraint violations into conflicts.
fn conflict_on_unique(message: &'static str) -> impl FnOnce(sqlx::Error) -> EcommerceError {
    move |e| {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() { return EcommerceError::Conflict(message.to_string()); }
        }
        e.into()
    }
}

const USER_COLUMNS: &str = "u.id, u.username, u.email, u.password_hash, u.role, u.first_name, u.last_name, u.created_at";

const ORDER_SELECT: &str = "SELECT o.id, o.user_id, o.status, o.total_price, o.payment_confirmed_at, o.created_at, \
     o.updated_at, d.address, d.shipped_at, d.delivered_at FROM orders o JOIN deliveries d ON d.order_id = o.id";

// =============================================================================
// Rows
// =============================================================================

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    first_name: Option<String>,
    last_name: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = EcommerceError;
    fn try_from(r: UserRow) -> Result<Self> {
        Ok(User {
            id: r.id, username: r.username, email: r.email, password_hash: r.password_hash,
            role: r.role.parse().map_err(corrupt)?, first_name: r.first_name, last_name: r.last_name,
            created_at: r.created_at,
        })
    }
}

#[derive(FromRow)]
struct SessionRow {
    token_hash: String,
    user_id: Uuid,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct SensitiveRow {
    user_id: Uuid,
    home_address: Option<String>,
    phone_number: Option<String>,
    tax_id: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(FromRow)]
struct CategoryRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(r: CategoryRow) -> Self {
        Category { id: r.id, name: r.name, description: r.description, created_at: r.created_at }
    }
}

#[derive(FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    model: Option<String>,
    serial_number: String,
    description: Option<String>,
    quantity_in_stock: i32,
    price: Decimal,
    cost: Decimal,
    discount_percent: Decimal,
    warranty_status: Option<String>,
    distributor_info: Option<String>,
    category_id: Option<Uuid>,
    is_active: bool,
    units_sold: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = EcommerceError;
    fn try_from(r: ProductRow) -> Result<Self> {
        Ok(Product {
            id: r.id, name: r.name, model: r.model, serial_number: r.serial_number, description: r.description,
            quantity_in_stock: r.quantity_in_stock, price: r.price, cost: r.cost,
            discount: Discount::new(r.discount_percent).map_err(corrupt)?, warranty_status: r.warranty_status,
            distributor_info: r.distributor_info, category_id: r.category_id, is_active: r.is_active,
            units_sold: r.units_sold, created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(FromRow)]
struct CartItemRow {
    id: Uuid,
    user_id: Option<Uuid>,
    session_key: Option<String>,
    product_id: Uuid,
    quantity: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<CartItemRow> for CartItem {
    type Error = EcommerceError;
    fn try_from(r: CartItemRow) -> Result<Self> {
        let owner = match (r.user_id, r.session_key) {
            (Some(user_id), None) => CartOwner::User(user_id),
            (None, Some(key)) => CartOwner::Session(key),
            _ => return Err(corrupt(format!("cart item {} has no single owner", r.id))),
        };
        Ok(CartItem {
            id: r.id, owner, product_id: r.product_id,
            quantity: Quantity::new(i64::from(r.quantity)).map_err(corrupt)?, created_at: r.created_at,
        })
    }
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    status: String,
    total_price: Decimal,
    payment_confirmed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    address: String,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order> {
        Ok(Order {
            id: self.id, user_id: self.user_id, status: self.status.parse().map_err(corrupt)?,
            total_price: self.total_price,
            delivery: Delivery { address: self.address, shipped_at: self.shipped_at, delivered_at: self.delivered_at },
            payment_confirmed_at: self.payment_confirmed_at, items, created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
    discount_percent: Decimal,
    price_at_purchase: Decimal,
    cost_at_purchase: Decimal,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = EcommerceError;
    fn try_from(r: OrderItemRow) -> Result<Self> {
        Ok(OrderItem {
            id: r.id, order_id: r.order_id, product_id: r.product_id, product_name: r.product_name,
            quantity: Quantity::new(i64::from(r.quantity)).map_err(corrupt)?, unit_price: r.unit_price,
            discount: Discount::new(r.discount_percent).map_err(corrupt)?, price_at_purchase: r.price_at_purchase,
            cost_at_purchase: r.cost_at_purchase,
        })
    }
}

#[derive(FromRow)]
struct InvoiceRow {
    id: Uuid,
    order_id: Uuid,
    number: String,
    issued_at: DateTime<Utc>,
    total: Decimal,
    pdf: Vec<u8>,
}

#[derive(FromRow)]
struct InvoiceSummaryRow {
    id: Uuid,
    order_id: Uuid,
    number: String,
    issued_at: DateTime<Utc>,
    total: Decimal,
}

#[derive(FromRow)]
struct RatingRow {
    id: Uuid,
    user_id: Uuid,
    product_id: Uuid,
    score: i16,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RatingRow> for Rating {
    type Error = EcommerceError;
    fn try_from(r: RatingRow) -> Result<Self> {
        Ok(Rating {
            id: r.id, user_id: r.user_id, product_id: r.product_id,
            score: Score::new(i64::from(r.score)).map_err(corrupt)?, created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(FromRow)]
struct CommentRow {
    id: Uuid,
    user_id: Uuid,
    product_id: Uuid,
    text: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<CommentRow> for Comment {
    type Error = EcommerceError;
    fn try_from(r: CommentRow) -> Result<Self> {
        Ok(Comment {
            id: r.id, user_id: r.user_id, product_id: r.product_id, text: r.text,
            status: r.status.parse().map_err(corrupt)?, created_at: r.created_at,
        })
    }
}

#[derive(FromRow)]
struct ReviewRow {
    id: Uuid,
    user_id: Uuid,
    product_id: Uuid,
    rating: i16,
    comment: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for ProductReview {
    type Error = EcommerceError;
    fn try_from(r: ReviewRow) -> Result<Self> {
        Ok(ProductReview {
            id: r.id, user_id: r.user_id, product_id: r.product_id,
            rating: Score::new(i64::from(r.rating)).map_err(corrupt)?, comment: r.comment,
            status: r.status.parse().map_err(corrupt)?, created_at: r.created_at,
        })
    }
}

#[derive(FromRow)]
struct WishlistRow {
    user_id: Uuid,
    product_id: Uuid,
    added_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct RefundRow {
    id: Uuid,
    order_id: Uuid,
    user_id: Uuid,
    reason: String,
    amount: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    decided_at: Option<DateTime<Utc>>,
    decided_by: Option<Uuid>,
}

impl TryFrom<RefundRow> for RefundRequest {
    type Error = EcommerceError;
    fn try_from(r: RefundRow) -> Result<Self> {
        Ok(RefundRequest {
            id: r.id, order_id: r.order_id, user_id: r.user_id, reason: r.reason, amount: r.amount,
            status: r.status.parse().map_err(corrupt)?, created_at: r.created_at, decided_at: r.decided_at,
            decided_by: r.decided_by,
        })
    }
}

fn convert<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = EcommerceError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn push_product_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &ProductQuery) {
    if !query.include_inactive {
        qb.push(" AND is_active");
    }
    if let Some(category_id) = query.category_id {
        qb.push(" AND category_id = ").push_bind(category_id);
    }
    if let Some(term) = query.search_term() {
        let pattern = format!("%{}%", term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_"));
        qb.push(" AND (name ILIKE ").push_bind(pattern.clone())
            .push(" OR description ILIKE ").push_bind(pattern.clone())
            .push(" OR model ILIKE ").push_bind(pattern)
            .push(")");
    }
}

// =============================================================================
// Store
// =============================================================================

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, user: User) -> Result<User> {
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, role, first_name, last_name, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(user.id).bind(&user.username).bind(&user.email).bind(&user.password_hash).bind(user.role.as_str())
        .bind(&user.first_name).bind(&user.last_name).bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(conflict_on_unique("email or username already registered"))?;
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users u WHERE u.email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn update_user(&self, user: User) -> Result<User> {
        let result = sqlx::query(
            "UPDATE users SET username = $2, email = $3, password_hash = $4, role = $5, first_name = $6, last_name = $7 \
             WHERE id = $1",
        )
        .bind(user.id).bind(&user.username).bind(&user.email).bind(&user.password_hash).bind(user.role.as_str())
        .bind(&user.first_name).bind(&user.last_name)
        .execute(&self.pool)
        .await
        .map_err(conflict_on_unique("email or username already registered"))?;
        if result.rows_affected() == 0 { return Err(EcommerceError::NotFound("user")); }
        Ok(user)
    }

    async fn create_session(&self, session: Session) -> Result<()> {
        sqlx::query("INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES ($1, $2, $3, $4)")
            .bind(&session.token_hash).bind(session.user_id).bind(session.created_at).bind(session.expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_session(&self, token_hash: &str) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Session { token_hash: r.token_hash, user_id: r.user_id, created_at: r.created_at, expires_at: r.expires_at }))
    }

    async fn delete_session(&self, token_hash: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = $1").bind(token_hash).execute(&self.pool).await?;
        Ok(())
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let done = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1").bind(now).execute(&self.pool).await?;
        Ok(done.rows_affected())
    }

    async fn revoke_user_sessions(&self, user_id: Uuid, keep: Option<&str>) -> Result<u64> {
        let done = sqlx::query("DELETE FROM sessions WHERE user_id = $1 AND token_hash IS DISTINCT FROM $2")
            .bind(user_id)
            .bind(keep)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    async fn save_sensitive_data(&self, data: SensitiveData) -> Result<()> {
        sqlx::query(
            "INSERT INTO sensitive_data (user_id, home_address, phone_number, tax_id, updated_at) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (user_id) DO UPDATE SET home_address = EXCLUDED.home_address, \
             phone_number = EXCLUDED.phone_number, tax_id = EXCLUDED.tax_id, updated_at = EXCLUDED.updated_at",
        )
        .bind(data.user_id).bind(&data.home_address).bind(&data.phone_number).bind(&data.tax_id).bind(data.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn sensitive_data(&self, user_id: Uuid) -> Result<Option<SensitiveData>> {
        let row = sqlx::query_as::<_, SensitiveRow>("SELECT * FROM sensitive_data WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| SensitiveData {
            user_id: r.user_id, home_address: r.home_address, phone_number: r.phone_number, tax_id: r.tax_id,
            updated_at: r.updated_at,
        }))
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories ORDER BY LOWER(name)").fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn find_category(&self, id: Uuid) -> Result<Option<Category>> {
        let row = sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(Category::from))
    }

    async fn create_category(&self, category: Category) -> Result<Category> {
        sqlx::query("INSERT INTO categories (id, name, description, created_at) VALUES ($1, $2, $3, $4)")
            .bind(category.id).bind(&category.name).bind(&category.description).bind(category.created_at)
            .execute(&self.pool)
            .await
            .map_err(conflict_on_unique("category already exists"))?;
        Ok(category)
    }

    async fn delete_category(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<Page<Product>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products WHERE TRUE");
        push_product_filters(&mut count, query);
        let (total,): (i64,) = count.build_query_as::<(i64,)>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM products WHERE TRUE");
        push_product_filters(&mut select, query);
        select.push(match query.sort {
            ProductSort::Newest => " ORDER BY created_at DESC, id",
            ProductSort::Name => " ORDER BY LOWER(name), id",
            ProductSort::PriceAsc => " ORDER BY price ASC, id",
            ProductSort::PriceDesc => " ORDER BY price DESC, id",
            ProductSort::PopularityDesc => " ORDER BY units_sold DESC, id",
            ProductSort::PopularityAsc => " ORDER BY units_sold ASC, id",
        });
        select.push(" LIMIT ").push_bind(i64::from(query.per_page()));
        select.push(" OFFSET ").push_bind(i64::from(query.offset()));
        let rows = select.build_query_as::<ProductRow>().fetch_all(&self.pool).await?;
        Ok(Page { data: convert(rows)?, total, page: query.page() })
    }

    async fn find_product(&self, id: Uuid) -> Result<Option<Product>> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        convert(rows)
    }

    async fn create_product(&self, p: Product) -> Result<Product> {
        sqlx::query(
            "INSERT INTO products (id, name, model, serial_number, description, quantity_in_stock, price, cost, \
             discount_percent, warranty_status, distributor_info, category_id, is_active, units_sold, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(p.id).bind(&p.name).bind(&p.model).bind(&p.serial_number).bind(&p.description).bind(p.quantity_in_stock)
        .bind(p.price).bind(p.cost).bind(p.discount.percent()).bind(&p.warranty_status).bind(&p.distributor_info)
        .bind(p.category_id).bind(p.is_active).bind(p.units_sold).bind(p.created_at).bind(p.updated_at)
        .execute(&self.pool)
        .await
        .map_err(conflict_on_unique("serial number already exists"))?;
        Ok(p)
    }

    async fn save_product(&self, p: Product) -> Result<Product> {
        let row = sqlx::query_as::<_, ProductRow>(
            "UPDATE products SET name = $2, model = $3, serial_number = $4, description = $5, price = $6, cost = $7, \
             discount_percent = $8, warranty_status = $9, distributor_info = $10, category_id = $11, is_active = $12, \
             updated_at = $13 WHERE id = $1 RETURNING *",
        )
        .bind(p.id).bind(&p.name).bind(&p.model).bind(&p.serial_number).bind(&p.description)
        .bind(p.price).bind(p.cost).bind(p.discount.percent()).bind(&p.warranty_status).bind(&p.distributor_info)
        .bind(p.category_id).bind(p.is_active).bind(p.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(conflict_on_unique("serial number already exists"))?;
        row.map(Product::try_from).transpose()?.ok_or(EcommerceError::NotFound("product"))
    }

    async fn set_stock(&self, product_id: Uuid, quantity: i32) -> Result<Product> {
        if quantity < 0 { return Err(ProductError::NegativeStock.into()); }
        sqlx::query_as::<_, ProductRow>("UPDATE products SET quantity_in_stock = $2, updated_at = $3 WHERE id = $1 RETURNING *")
            .bind(product_id)
            .bind(quantity)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?
            .map(Product::try_from)
            .transpose()?
            .ok_or(EcommerceError::NotFound("product"))
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_products(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products").fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn cart_items(&self, owner: &CartOwner) -> Result<Vec<CartItem>> {
        let query = match owner {
            CartOwner::User(id) => sqlx::query_as::<_, CartItemRow>("SELECT * FROM cart_items WHERE user_id = $1 ORDER BY created_at").bind(*id),
            CartOwner::Session(key) => sqlx::query_as::<_, CartItemRow>("SELECT * FROM cart_items WHERE session_key = $1 ORDER BY created_at").bind(key.clone()),
        };
        convert(query.fetch_all(&self.pool).await?)
    }

    async fn save_cart_item(&self, item: CartItem) -> Result<CartItem> {
        let (user_id, session_key) = match &item.owner {
            CartOwner::User(id) => (Some(*id), None),
            CartOwner::Session(key) => (None, Some(key.clone())),
        };
        sqlx::query(
            "INSERT INTO cart_items (id, user_id, session_key, product_id, quantity, created_at) VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO UPDATE SET user_id = EXCLUDED.user_id, session_key = EXCLUDED.session_key, \
             quantity = EXCLUDED.quantity",
        )
        .bind(item.id).bind(user_id).bind(session_key).bind(item.product_id).bind(item.quantity.as_i32()).bind(item.created_at)
        .execute(&self.pool)
        .await
        .map_err(conflict_on_unique("product is already in the cart"))?;
        Ok(item)
    }

    async fn remove_cart_item(&self, owner: &CartOwner, item_id: Uuid) -> Result<bool> {
        let query = match owner {
            CartOwner::User(id) => sqlx::query("DELETE FROM cart_items WHERE id = $1 AND user_id = $2").bind(item_id).bind(*id),
            CartOwner::Session(key) => sqlx::query("DELETE FROM cart_items WHERE id = $1 AND session_key = $2").bind(item_id).bind(key.clone()),
        };
        Ok(query.execute(&self.pool).await?.rows_affected() > 0)
    }

    async fn clear_cart(&self, owner: &CartOwner) -> Result<()> {
        let query = match owner {
            CartOwner::User(id) => sqlx::query("DELETE FROM cart_items WHERE user_id = $1").bind(*id),
            CartOwner::Session(key) => sqlx::query("DELETE FROM cart_items WHERE session_key = $1").bind(key.clone()),
        };
        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn place_order(&self, draft: OrderDraft) -> Result<Order> {
        let order = draft.into_order();
        let mut tx = self.pool.begin().await?;

        for item in &order.items {
            let reserved = sqlx::query(
                "UPDATE products SET quantity_in_stock = quantity_in_stock - $2, units_sold = units_sold + $2, updated_at = $3 \
                 WHERE id = $1 AND is_active AND quantity_in_stock >= $2",
            )
            .bind(item.product_id).bind(item.quantity.as_i32()).bind(order.created_at)
            .execute(&mut *tx)
            .await?;
            if reserved.rows_affected() == 0 {
                // Dropping the transaction rolls back earlier reservations.
                let available: Option<(i32, bool)> = sqlx::query_as("SELECT quantity_in_stock, is_active FROM products WHERE id = $1")
                    .bind(item.product_id)
                    .fetch_optional(&mut *tx)
                    .await?;
                return Err(match available {
                    Some((stock, true)) => ProductError::InsufficientStock {
                        product_id: item.product_id, requested: item.quantity.value(), available: stock.max(0) as u32,
                    },
                    _ => ProductError::Unavailable { product_id: item.product_id },
                }.into());
            }
        }

        sqlx::query(
            "INSERT INTO orders (id, user_id, status, total_price, payment_confirmed_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(order.id).bind(order.user_id).bind(order.status.as_str()).bind(order.total_price)
        .bind(order.payment_confirmed_at).bind(order.created_at).bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, product_name, quantity, unit_price, discount_percent, \
                 price_at_purchase, cost_at_purchase) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(item.id).bind(item.order_id).bind(item.product_id).bind(&item.product_name).bind(item.quantity.as_i32())
            .bind(item.unit_price).bind(item.discount.percent()).bind(item.price_at_purchase).bind(item.cost_at_purchase)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("INSERT INTO deliveries (order_id, address) VALUES ($1, $2)")
            .bind(order.id).bind(&order.delivery.address)
            .execute(&mut *tx)
            .await?;

        let product_ids: Vec<Uuid> = order.items.iter().map(|i| i.product_id).collect();
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = ANY($2)")
            .bind(order.user_id).bind(&product_ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(order)
    }

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>> {
        self.load_order(id).await
    }

    async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!("{ORDER_SELECT} WHERE o.user_id = $1 ORDER BY o.created_at DESC"))
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        self.load_orders(rows).await
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "{ORDER_SELECT} WHERE ($1::text IS NULL OR o.status = $1) ORDER BY o.created_at DESC"
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        self.load_orders(rows).await
    }

    async fn orders_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "{ORDER_SELECT} WHERE o.created_at BETWEEN $1 AND $2 ORDER BY o.created_at"
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        self.load_orders(rows).await
    }

    async fn apply_transition(&self, t: &OrderTransition) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query("UPDATE orders SET status = $3, updated_at = $4 WHERE id = $1 AND status = $2")
            .bind(t.order_id).bind(t.from.as_str()).bind(t.to.as_str()).bind(t.at)
            .execute(&mut *tx)
            .await?;
        if moved.rows_affected() == 0 {
            let current: Option<(String,)> = sqlx::query_as("SELECT status FROM orders WHERE id = $1")
                .bind(t.order_id)
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match current {
                Some((status,)) => EcommerceError::Conflict(format!("order is already {status}")),
                None => EcommerceError::NotFound("order"),
            });
        }

        match t.to {
            OrderStatus::InTransit => {
                sqlx::query("UPDATE deliveries SET shipped_at = $2 WHERE order_id = $1").bind(t.order_id).bind(t.at).execute(&mut *tx).await?;
            }
            OrderStatus::Delivered => {
                sqlx::query("UPDATE deliveries SET delivered_at = $2 WHERE order_id = $1").bind(t.order_id).bind(t.at).execute(&mut *tx).await?;
            }
            _ => {}
        }

        for (product_id, qty) in &t.restock {
            sqlx::query(
                "UPDATE products SET quantity_in_stock = quantity_in_stock + $2, \
                 units_sold = GREATEST(units_sold - $2, 0), updated_at = $3 WHERE id = $1",
            )
            .bind(product_id).bind(qty.as_i32()).bind(t.at)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(decision) = &t.refund {
            let approved = sqlx::query(
                "UPDATE refund_requests SET status = 'approved', decided_at = $3, decided_by = $2 WHERE id = $1 AND status = 'pending'",
            )
            .bind(decision.refund_id).bind(decision.decided_by).bind(t.at)
            .execute(&mut *tx)
            .await?;
            if approved.rows_affected() == 0 {
                let current: Option<(String,)> = sqlx::query_as("SELECT status FROM refund_requests WHERE id = $1")
                    .bind(decision.refund_id)
                    .fetch_optional(&mut *tx)
                    .await?;
                return Err(match current {
                    Some((status,)) => RefundError::AlreadyDecided(status.parse().map_err(corrupt)?).into(),
                    None => EcommerceError::NotFound("refund request"),
                });
            }
        }

        tx.commit().await?;
        self.load_order(t.order_id).await?.ok_or(EcommerceError::NotFound("order"))
    }

    async fn has_delivered_purchase(&self, user_id: Uuid, product_id: Uuid) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM orders o JOIN order_items i ON i.order_id = o.id \
             WHERE o.user_id = $1 AND i.product_id = $2 AND o.status = 'delivered')",
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn save_invoice(&self, invoice: Invoice) -> Result<()> {
        sqlx::query(
            "INSERT INTO invoices (id, order_id, number, issued_at, total, pdf) VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (order_id) DO UPDATE SET id = EXCLUDED.id, number = EXCLUDED.number, \
             issued_at = EXCLUDED.issued_at, total = EXCLUDED.total, pdf = EXCLUDED.pdf",
        )
        .bind(invoice.id).bind(invoice.order_id).bind(&invoice.number).bind(invoice.issued_at).bind(invoice.total).bind(&invoice.pdf)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn invoice_for_order(&self, order_id: Uuid) -> Result<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>("SELECT * FROM invoices WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Invoice { id: r.id, order_id: r.order_id, number: r.number, issued_at: r.issued_at, total: r.total, pdf: r.pdf }))
    }

    async fn list_invoices(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<InvoiceSummary>> {
        let rows = sqlx::query_as::<_, InvoiceSummaryRow>(
            "SELECT id, order_id, number, issued_at, total FROM invoices WHERE issued_at BETWEEN $1 AND $2 ORDER BY issued_at DESC",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| InvoiceSummary { id: r.id, order_id: r.order_id, number: r.number, issued_at: r.issued_at, total: r.total }).collect())
    }

    async fn save_rating(&self, rating: Rating) -> Result<Rating> {
        let row = sqlx::query_as::<_, RatingRow>(
            "INSERT INTO ratings (id, user_id, product_id, score, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id, product_id) DO UPDATE SET score = EXCLUDED.score, updated_at = EXCLUDED.updated_at \
             RETURNING *",
        )
        .bind(rating.id).bind(rating.user_id).bind(rating.product_id).bind(i16::from(rating.score.value()))
        .bind(rating.created_at).bind(rating.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Rating::try_from(row)
    }

    async fn rating_summary(&self, product_id: Uuid) -> Result<RatingSummary> {
        let (average, count): (Option<f64>, i64) =
            sqlx::query_as("SELECT AVG(score)::float8, COUNT(*) FROM ratings WHERE product_id = $1")
                .bind(product_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(RatingSummary { average, count })
    }

    async fn create_comment(&self, c: Comment) -> Result<Comment> {
        sqlx::query("INSERT INTO comments (id, user_id, product_id, text, status, created_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(c.id).bind(c.user_id).bind(c.product_id).bind(&c.text).bind(c.status.as_str()).bind(c.created_at)
            .execute(&self.pool)
            .await?;
        Ok(c)
    }

    async fn comments(&self, product_id: Option<Uuid>, status: Option<ModerationStatus>) -> Result<Vec<Comment>> {
        let rows = sqlx::query_as::<_, CommentRow>(
            "SELECT * FROM comments WHERE ($1::uuid IS NULL OR product_id = $1) AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC",
        )
        .bind(product_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    async fn set_comment_status(&self, id: Uuid, status: ModerationStatus) -> Result<Option<Comment>> {
        sqlx::query_as::<_, CommentRow>("UPDATE comments SET status = $2 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Comment::try_from)
            .transpose()
    }

    async fn create_review(&self, r: ProductReview) -> Result<ProductReview> {
        sqlx::query(
            "INSERT INTO product_reviews (id, user_id, product_id, rating, comment, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(r.id).bind(r.user_id).bind(r.product_id).bind(i16::from(r.rating.value())).bind(&r.comment)
        .bind(r.status.as_str()).bind(r.created_at)
        .execute(&self.pool)
        .await?;
        Ok(r)
    }

    async fn reviews(&self, product_id: Option<Uuid>, status: Option<ModerationStatus>) -> Result<Vec<ProductReview>> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            "SELECT * FROM product_reviews WHERE ($1::uuid IS NULL OR product_id = $1) AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC",
        )
        .bind(product_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    async fn set_review_status(&self, id: Uuid, status: ModerationStatus) -> Result<Option<ProductReview>> {
        sqlx::query_as::<_, ReviewRow>("UPDATE product_reviews SET status = $2 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(ProductReview::try_from)
            .transpose()
    }

    async fn add_to_wishlist(&self, entry: WishlistEntry) -> Result<bool> {
        let result = sqlx::query("INSERT INTO wishlist (user_id, product_id, added_at) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING")
            .bind(entry.user_id).bind(entry.product_id).bind(entry.added_at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_from_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM wishlist WHERE user_id = $1 AND product_id = $2")
            .bind(user_id).bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistEntry>> {
        let rows = sqlx::query_as::<_, WishlistRow>("SELECT * FROM wishlist WHERE user_id = $1 ORDER BY added_at DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| WishlistEntry { user_id: r.user_id, product_id: r.product_id, added_at: r.added_at }).collect())
    }

    async fn wishlist_watchers(&self, product_id: Uuid) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users u JOIN wishlist w ON w.user_id = u.id WHERE w.product_id = $1"
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    async fn create_refund(&self, r: RefundRequest) -> Result<RefundRequest> {
        sqlx::query(
            "INSERT INTO refund_requests (id, order_id, user_id, reason, amount, status, created_at, decided_at, decided_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(r.id).bind(r.order_id).bind(r.user_id).bind(&r.reason).bind(r.amount).bind(r.status.as_str())
        .bind(r.created_at).bind(r.decided_at).bind(r.decided_by)
        .execute(&self.pool)
        .await
        .map_err(conflict_on_unique("a refund has already been requested for this order"))?;
        Ok(r)
    }

    async fn find_refund(&self, id: Uuid) -> Result<Option<RefundRequest>> {
        sqlx::query_as::<_, RefundRow>("SELECT * FROM refund_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(RefundRequest::try_from)
            .transpose()
    }

    async fn refunds(&self, status: Option<RefundStatus>) -> Result<Vec<RefundRequest>> {
        let rows = sqlx::query_as::<_, RefundRow>(
            "SELECT * FROM refund_requests WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC",
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    async fn refunds_for_order(&self, order_id: Uuid) -> Result<Vec<RefundRequest>> {
        let rows = sqlx::query_as::<_, RefundRow>("SELECT * FROM refund_requests WHERE order_id = $1 ORDER BY created_at DESC")
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;
        convert(rows)
    }

    async fn reject_refund(&self, id: Uuid, decided_by: Uuid, at: DateTime<Utc>) -> Result<RefundRequest> {
        let row = sqlx::query_as::<_, RefundRow>(
            "UPDATE refund_requests SET status = 'rejected', decided_at = $3, decided_by = $2 \
             WHERE id = $1 AND status = 'pending' RETURNING *",
        )
        .bind(id)
        .bind(decided_by)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => RefundRequest::try_from(row),
            None => match self.find_refund(id).await? {
                Some(existing) => Err(RefundError::AlreadyDecided(existing.status).into()),
                None => Err(EcommerceError::NotFound("refund request")),
            },
        }
    }
}
