//! Aggregates module
pub mod cart;
pub mod order;
pub mod product;
pub mod refund;
pub mod review;
pub mod user;
pub mod wishlist;

pub use cart::{Cart, CartError, CartItem, CartLine, CartOwner};
pub use order::{Delivery, Order, OrderDraft, OrderError, OrderItem, OrderStatus, OrderTransition, RefundDecision};
pub use product::{Category, NewProduct, Product, ProductError};
pub use refund::{RefundError, RefundRequest, RefundStatus};
pub use review::{Comment, ModerationStatus, ProductReview, Rating, RatingSummary, ReviewError};
pub use user::{Role, SensitiveData, Session, User};
pub use wishlist::WishlistEntry;
