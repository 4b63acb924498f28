//! In-process store. A single lock guards all state, so multi-entity
//! workflows such as checkout are trivially atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Page, ProductQuery, ProductSort, Store};
use crate::domain::aggregates::{
    CartItem, CartOwner, Category, Comment, ModerationStatus, Order, OrderDraft, OrderStatus, OrderTransition, Product,
    ProductError, ProductReview, Rating, RatingSummary, RefundRequest, RefundStatus, SensitiveData, Session, User,
    WishlistEntry,
};
use crate::invoice::{Invoice, InvoiceSummary};
use crate::{EcommerceError, Result};

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    sessions: HashMap<String, Session>,
    sensitive: HashMap<Uuid, SensitiveData>,
    categories: HashMap<Uuid, Category>,
    products: HashMap<Uuid, Product>,
    cart: HashMap<Uuid, CartItem>,
    orders: HashMap<Uuid, Order>,
    invoices: HashMap<Uuid, Invoice>,
    ratings: HashMap<(Uuid, Uuid), Rating>,
    comments: Vec<Comment>,
    reviews: Vec<ProductReview>,
    wishlist: BTreeMap<(Uuid, Uuid), WishlistEntry>,
    refunds: HashMap<Uuid, RefundRequest>,
}

impl State {
    fn identity_taken(&self, user: &User) -> bool {
        self.users.values().any(|u| u.id != user.id && (u.email == user.email || u.username == user.username))
    }

    fn serial_taken(&self, product: &Product) -> bool {
        self.products.values().any(|p| p.id != product.id && p.serial_number == product.serial_number)
    }
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> DateTime<Utc>) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

fn matches_search(product: &Product, term: &str) -> bool {
    let term = term.to_lowercase();
    let hit = |field: Option<&str>| field.map(|f| f.to_lowercase().contains(&term)).unwrap_or(false);
    hit(Some(product.name.as_str())) || hit(product.description.as_deref()) || hit(product.model.as_deref())
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: User) -> Result<User> {
        let mut state = self.state.write().await;
        if state.identity_taken(&user) {
            return Err(EcommerceError::Conflict("email or username already registered".into()));
        }
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.state.read().await.users.values().find(|u| u.email == email).cloned())
    }

    async fn update_user(&self, user: User) -> Result<User> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&user.id) { return Err(EcommerceError::NotFound("user")); }
        if state.identity_taken(&user) {
            return Err(EcommerceError::Conflict("email or username already registered".into()));
        }
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn create_session(&self, session: Session) -> Result<()> {
        self.state.write().await.sessions.insert(session.token_hash.clone(), session);
        Ok(())
    }

    async fn find_session(&self, token_hash: &str) -> Result<Option<Session>> {
        Ok(self.state.read().await.sessions.get(token_hash).cloned())
    }

    async fn delete_session(&self, token_hash: &str) -> Result<()> {
        self.state.write().await.sessions.remove(token_hash);
        Ok(())
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| !s.is_expired(now));
        Ok((before - state.sessions.len()) as u64)
    }

    async fn revoke_user_sessions(&self, user_id: Uuid, keep: Option<&str>) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|hash, s| s.user_id != user_id || keep == Some(hash.as_str()));
        Ok((before - state.sessions.len()) as u64)
    }

    async fn save_sensitive_data(&self, data: SensitiveData) -> Result<()> {
        self.state.write().await.sensitive.insert(data.user_id, data);
        Ok(())
    }

    async fn sensitive_data(&self, user_id: Uuid) -> Result<Option<SensitiveData>> {
        Ok(self.state.read().await.sensitive.get(&user_id).cloned())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let mut categories: Vec<Category> = self.state.read().await.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(categories)
    }

    async fn find_category(&self, id: Uuid) -> Result<Option<Category>> {
        Ok(self.state.read().await.categories.get(&id).cloned())
    }

    async fn create_category(&self, category: Category) -> Result<Category> {
        let mut state = self.state.write().await;
        if state.categories.values().any(|c| c.name.eq_ignore_ascii_case(&category.name)) {
            return Err(EcommerceError::Conflict(format!("category {} already exists", category.name)));
        }
        state.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn delete_category(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.categories.remove(&id).is_none() { return Ok(false); }
        for product in state.products.values_mut().filter(|p| p.category_id == Some(id)) {
            product.category_id = None;
        }
        Ok(true)
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<Page<Product>> {
        let state = self.state.read().await;
        let mut products: Vec<Product> = state.products.values()
            .filter(|p| query.include_inactive || p.is_active)
            .filter(|p| query.category_id.map_or(true, |c| p.category_id == Some(c)))
            .filter(|p| query.search_term().map_or(true, |t| matches_search(p, t)))
            .cloned()
            .collect();
        match query.sort {
            ProductSort::Newest => newest_first(&mut products, |p| p.created_at),
            ProductSort::Name => products.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase())),
            ProductSort::PriceAsc => products.sort_by(|a, b| a.price.cmp(&b.price)),
            ProductSort::PriceDesc => products.sort_by(|a, b| b.price.cmp(&a.price)),
            ProductSort::PopularityDesc => products.sort_by(|a, b| b.units_sold.cmp(&a.units_sold)),
            ProductSort::PopularityAsc => products.sort_by(|a, b| a.units_sold.cmp(&b.units_sold)),
        }
        let total = products.len() as i64;
        let data = products.into_iter().skip(query.offset() as usize).take(query.per_page() as usize).collect();
        Ok(Page { data, total, page: query.page() })
    }

    async fn find_product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        Ok(ids.iter().filter_map(|id| state.products.get(id).cloned()).collect())
    }

    async fn create_product(&self, product: Product) -> Result<Product> {
        let mut state = self.state.write().await;
        if state.serial_taken(&product) {
            return Err(EcommerceError::Conflict(format!("serial number {} already exists", product.serial_number)));
        }
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn save_product(&self, mut product: Product) -> Result<Product> {
        let mut state = self.state.write().await;
        if state.serial_taken(&product) {
            return Err(EcommerceError::Conflict(format!("serial number {} already exists", product.serial_number)));
        }
        let current = state.products.get_mut(&product.id).ok_or(EcommerceError::NotFound("product"))?;
        product.quantity_in_stock = current.quantity_in_stock;
        product.units_sold = current.units_sold;
        *current = product.clone();
        Ok(product)
    }

    async fn set_stock(&self, product_id: Uuid, quantity: i32) -> Result<Product> {
        let mut state = self.state.write().await;
        let product = state.products.get_mut(&product_id).ok_or(EcommerceError::NotFound("product"))?;
        product.set_stock(quantity)?;
        Ok(product.clone())
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.products.remove(&id).is_none() { return Ok(false); }
        state.cart.retain(|_, item| item.product_id != id);
        state.wishlist.retain(|(_, product_id), _| *product_id != id);
        state.ratings.retain(|(_, product_id), _| *product_id != id);
        state.comments.retain(|c| c.product_id != id);
        state.reviews.retain(|r| r.product_id != id);
        Ok(true)
    }

    async fn count_products(&self) -> Result<i64> {
        Ok(self.state.read().await.products.len() as i64)
    }

    async fn cart_items(&self, owner: &CartOwner) -> Result<Vec<CartItem>> {
        let mut items: Vec<CartItem> = self.state.read().await.cart.values().filter(|i| &i.owner == owner).cloned().collect();
        items.sort_by_key(|i| i.created_at);
        Ok(items)
    }

    async fn save_cart_item(&self, item: CartItem) -> Result<CartItem> {
        let mut state = self.state.write().await;
        let duplicate = state.cart.values().any(|i| i.id != item.id && i.owner == item.owner && i.product_id == item.product_id);
        if duplicate {
            return Err(EcommerceError::Conflict("product is already in the cart".into()));
        }
        state.cart.insert(item.id, item.clone());
        Ok(item)
    }

    async fn remove_cart_item(&self, owner: &CartOwner, item_id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.cart.get(&item_id) {
            Some(item) if &item.owner == owner => Ok(state.cart.remove(&item_id).is_some()),
            _ => Ok(false),
        }
    }

    async fn clear_cart(&self, owner: &CartOwner) -> Result<()> {
        self.state.write().await.cart.retain(|_, item| &item.owner != owner);
        Ok(())
    }

    async fn place_order(&self, draft: OrderDraft) -> Result<Order> {
        let mut state = self.state.write().await;
        // Reserve on copies first so a failing line leaves stock untouched.
        let mut reserved: HashMap<Uuid, Product> = HashMap::new();
        for line in &draft.lines {
            if !reserved.contains_key(&line.product_id) {
                let product = state.products.get(&line.product_id).cloned()
                    .ok_or(ProductError::Unavailable { product_id: line.product_id })?;
                reserved.insert(line.product_id, product);
            }
            if let Some(product) = reserved.get_mut(&line.product_id) {
                product.reserve(line.quantity)?;
            }
        }
        state.products.extend(reserved);

        let order = draft.into_order();
        let owner = CartOwner::User(order.user_id);
        state.cart.retain(|_, item| !(item.owner == owner && order.contains_product(item.product_id)));
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self.state.read().await.orders.values().filter(|o| o.user_id == user_id).cloned().collect();
        newest_first(&mut orders, |o| o.created_at);
        Ok(orders)
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self.state.read().await.orders.values()
            .filter(|o| status.map_or(true, |s| o.status == s))
            .cloned()
            .collect();
        newest_first(&mut orders, |o| o.created_at);
        Ok(orders)
    }

    async fn orders_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self.state.read().await.orders.values()
            .filter(|o| o.created_at >= from && o.created_at <= to)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn apply_transition(&self, t: &OrderTransition) -> Result<Order> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let current = state.orders.get(&t.order_id).ok_or(EcommerceError::NotFound("order"))?;
        if current.status != t.from {
            return Err(EcommerceError::Conflict(format!("order is already {}", current.status)));
        }
        if let Some(decision) = &t.refund {
            state.refunds.get(&decision.refund_id).ok_or(EcommerceError::NotFound("refund request"))?.ensure_pending()?;
        }

        for (product_id, qty) in &t.restock {
            if let Some(product) = state.products.get_mut(product_id) {
                product.restock(*qty);
            }
        }
        if let Some(decision) = &t.refund {
            if let Some(refund) = state.refunds.get_mut(&decision.refund_id) {
                refund.decide(RefundStatus::Approved, decision.decided_by, t.at)?;
            }
        }
        let order = state.orders.get_mut(&t.order_id).ok_or(EcommerceError::NotFound("order"))?;
        order.apply(t);
        Ok(order.clone())
    }

    async fn has_delivered_purchase(&self, user_id: Uuid, product_id: Uuid) -> Result<bool> {
        Ok(self.state.read().await.orders.values()
            .any(|o| o.user_id == user_id && o.status == OrderStatus::Delivered && o.contains_product(product_id)))
    }

    async fn save_invoice(&self, invoice: Invoice) -> Result<()> {
        self.state.write().await.invoices.insert(invoice.order_id, invoice);
        Ok(())
    }

    async fn invoice_for_order(&self, order_id: Uuid) -> Result<Option<Invoice>> {
        Ok(self.state.read().await.invoices.get(&order_id).cloned())
    }

    async fn list_invoices(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<InvoiceSummary>> {
        let state = self.state.read().await;
        let mut invoices: Vec<InvoiceSummary> = state.invoices.values()
            .filter(|i| i.issued_at >= from && i.issued_at <= to)
            .map(Invoice::summary)
            .collect();
        newest_first(&mut invoices, |i| i.issued_at);
        Ok(invoices)
    }

    async fn save_rating(&self, rating: Rating) -> Result<Rating> {
        let mut state = self.state.write().await;
        let saved = state.ratings.entry((rating.user_id, rating.product_id))
            .and_modify(|existing| {
                existing.score = rating.score;
                existing.updated_at = rating.updated_at;
            })
            .or_insert(rating);
        Ok(saved.clone())
    }

    async fn rating_summary(&self, product_id: Uuid) -> Result<RatingSummary> {
        let state = self.state.read().await;
        Ok(RatingSummary::from_scores(state.ratings.values().filter(|r| r.product_id == product_id).map(|r| r.score)))
    }

    async fn create_comment(&self, comment: Comment) -> Result<Comment> {
        self.state.write().await.comments.push(comment.clone());
        Ok(comment)
    }

    async fn comments(&self, product_id: Option<Uuid>, status: Option<ModerationStatus>) -> Result<Vec<Comment>> {
        let mut comments: Vec<Comment> = self.state.read().await.comments.iter()
            .filter(|c| product_id.map_or(true, |p| c.product_id == p) && status.map_or(true, |s| c.status == s))
            .cloned()
            .collect();
        newest_first(&mut comments, |c| c.created_at);
        Ok(comments)
    }

    async fn set_comment_status(&self, id: Uuid, status: ModerationStatus) -> Result<Option<Comment>> {
        let mut state = self.state.write().await;
        Ok(state.comments.iter_mut().find(|c| c.id == id).map(|c| {
            c.status = status;
            c.clone()
        }))
    }

    async fn create_review(&self, review: ProductReview) -> Result<ProductReview> {
        self.state.write().await.reviews.push(review.clone());
        Ok(review)
    }

    async fn reviews(&self, product_id: Option<Uuid>, status: Option<ModerationStatus>) -> Result<Vec<ProductReview>> {
        let mut reviews: Vec<ProductReview> = self.state.read().await.reviews.iter()
            .filter(|r| product_id.map_or(true, |p| r.product_id == p) && status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        newest_first(&mut reviews, |r| r.created_at);
        Ok(reviews)
    }

    async fn set_review_status(&self, id: Uuid, status: ModerationStatus) -> Result<Option<ProductReview>> {
        let mut state = self.state.write().await;
        Ok(state.reviews.iter_mut().find(|r| r.id == id).map(|r| {
            r.status = status;
            r.clone()
        }))
    }

    async fn add_to_wishlist(&self, entry: WishlistEntry) -> Result<bool> {
        let mut state = self.state.write().await;
        let key = (entry.user_id, entry.product_id);
        if state.wishlist.contains_key(&key) { return Ok(false); }
        state.wishlist.insert(key, entry);
        Ok(true)
    }

    async fn remove_from_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<bool> {
        Ok(self.state.write().await.wishlist.remove(&(user_id, product_id)).is_some())
    }

    async fn wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistEntry>> {
        let mut entries: Vec<WishlistEntry> = self.state.read().await.wishlist.values().filter(|e| e.user_id == user_id).cloned().collect();
        newest_first(&mut entries, |e| e.added_at);
        Ok(entries)
    }

    async fn wishlist_watchers(&self, product_id: Uuid) -> Result<Vec<User>> {
        let state = self.state.read().await;
        Ok(state.wishlist.values()
            .filter(|e| e.product_id == product_id)
            .filter_map(|e| state.users.get(&e.user_id).cloned())
            .collect())
    }

    async fn create_refund(&self, refund: RefundRequest) -> Result<RefundRequest> {
        let mut state = self.state.write().await;
        if state.refunds.values().any(|r| r.order_id == refund.order_id && r.status.is_active()) {
            return Err(EcommerceError::Conflict("a refund has already been requested for this order".into()));
        }
        state.refunds.insert(refund.id, refund.clone());
        Ok(refund)
    }

    async fn find_refund(&self, id: Uuid) -> Result<Option<RefundRequest>> {
        Ok(self.state.read().await.refunds.get(&id).cloned())
    }

    async fn refunds(&self, status: Option<RefundStatus>) -> Result<Vec<RefundRequest>> {
        let mut refunds: Vec<RefundRequest> = self.state.read().await.refunds.values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        newest_first(&mut refunds, |r| r.created_at);
        Ok(refunds)
    }

    async fn refunds_for_order(&self, order_id: Uuid) -> Result<Vec<RefundRequest>> {
        let mut refunds: Vec<RefundRequest> = self.state.read().await.refunds.values().filter(|r| r.order_id == order_id).cloned().collect();
        newest_first(&mut refunds, |r| r.created_at);
        Ok(refunds)
    }

    async fn reject_refund(&self, id: Uuid, decided_by: Uuid, at: DateTime<Utc>) -> Result<RefundRequest> {
        let mut state = self.state.write().await;
        let refund = state.refunds.get_mut(&id).ok_or(EcommerceError::NotFound("refund request"))?;
        refund.decide(RefundStatus::Rejected, decided_by, at)?;
        Ok(refund.clone())
    }
}
