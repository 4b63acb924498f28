//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::{non_negative_money, round_money, Discount, Quantity};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn create(name: impl Into<String>, description: Option<String>) -> Self {
        Self { id: Uuid::now_v7(), name: name.into().trim().to_string(), description, created_at: Utc::now() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub model: Option<String>,
    pub serial_number: String,
    pub description: Option<String>,
    pub quantity_in_stock: i32,
    pub price: Decimal,
    pub cost: Decimal,
    pub discount: Discount,
    pub warranty_status: Option<String>,
    pub distributor_info: Option<String>,
    pub category_id: Option<Uuid>,
    /// Visible in the catalog once a sales manager has priced it.
    pub is_active: bool,
    /// Units sold, used as popularity.
    pub units_sold: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a product manager supplies when listing a new product.
#[derive(Clone, Debug, Default)]
pub struct NewProduct {
    pub name: String,
    pub model: Option<String>,
    pub serial_number: String,
    pub description: Option<String>,
    pub quantity_in_stock: i32,
    pub price: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub warranty_status: Option<String>,
    pub distributor_info: Option<String>,
    pub category_id: Option<Uuid>,
}

impl Product {
    pub fn create(input: NewProduct) -> Result<Self, ProductError> {
        let name = input.name.trim().to_string();
        if name.is_empty() { return Err(ProductError::MissingName); }
        let serial_number = input.serial_number.trim().to_uppercase();
        if serial_number.is_empty() { return Err(ProductError::MissingSerialNumber); }
        if input.quantity_in_stock < 0 { return Err(ProductError::NegativeStock); }
        let price = non_negative_money(input.price.unwrap_or(Decimal::ZERO)).map_err(|_| ProductError::InvalidPrice)?;
        // Without an explicit cost, assume half the list price.
        let cost = match input.cost {
            Some(cost) => non_negative_money(cost).map_err(|_| ProductError::InvalidCost)?,
            None => round_money(price / Decimal::TWO),
        };
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(), name, model: input.model, serial_number, description: input.description,
            quantity_in_stock: input.quantity_in_stock, price, cost, discount: Discount::NONE,
            warranty_status: input.warranty_status, distributor_info: input.distributor_info,
            category_id: input.category_id, is_active: price > Decimal::ZERO, units_sold: 0,
            created_at: now, updated_at: now,
        })
    }

    pub fn discounted_price(&self) -> Decimal { self.discount.apply(self.price) }
    pub fn is_available(&self) -> bool { self.is_active && self.quantity_in_stock > 0 }

    /// Sales-manager pricing. A positive price publishes the product.
    pub fn set_pricing(&mut self, price: Decimal, cost: Option<Decimal>, discount: Option<Discount>) -> Result<(), ProductError> {
        if price <= Decimal::ZERO { return Err(ProductError::InvalidPrice); }
        self.price = round_money(price);
        if let Some(cost) = cost {
            self.cost = non_negative_money(cost).map_err(|_| ProductError::InvalidCost)?;
        } else if self.cost.is_zero() {
            self.cost = round_money(self.price / Decimal::TWO);
        }
        if let Some(discount) = discount { self.set_discount(discount); }
        self.is_active = true;
        self.touch();
        Ok(())
    }

    /// Returns true when the discount went up, which is what wishlist alerts fire on.
    pub fn set_discount(&mut self, discount: Discount) -> bool {
        let raised = discount.percent() > self.discount.percent();
        self.discount = discount;
        self.touch();
        raised
    }

    pub fn set_stock(&mut self, quantity: i32) -> Result<(), ProductError> {
        if quantity < 0 { return Err(ProductError::NegativeStock); }
        self.quantity_in_stock = quantity;
        self.touch();
        Ok(())
    }

    /// Ensures `qty` more units could be taken from stock.
    pub fn ensure_stock(&self, qty: Quantity) -> Result<(), ProductError> {
        if !self.is_active { return Err(ProductError::Unavailable { product_id: self.id }); }
        if i64::from(self.quantity_in_stock) < i64::from(qty.value()) {
            return Err(ProductError::InsufficientStock { product_id: self.id, requested: qty.value(), available: self.quantity_in_stock.max(0) as u32 });
        }
        Ok(())
    }

    pub fn reserve(&mut self, qty: Quantity) -> Result<(), ProductError> {
        self.ensure_stock(qty)?;
        self.quantity_in_stock -= qty.as_i32();
        self.units_sold += i64::from(qty.value());
        self.touch();
        Ok(())
    }

    pub fn restock(&mut self, qty: Quantity) {
        self.quantity_in_stock = self.quantity_in_stock.saturating_add(qty.as_i32());
        self.units_sold = (self.units_sold - i64::from(qty.value())).max(0);
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("product name is required")]
    MissingName,
    #[error("serial number is required")]
    MissingSerialNumber,
    #[error("price must be positive")]
    InvalidPrice,
    #[error("cost must not be negative")]
    InvalidCost,
    #[error("stock must not be negative")]
    NegativeStock,
    #[error("product {product_id} is not available")]
    Unavailable { product_id: Uuid },
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock { product_id: Uuid, requested: u32, available: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listed(stock: i32) -> Product {
        Product::create(NewProduct {
            name: "Test Product".into(), serial_number: "sn0001".into(), quantity_in_stock: stock,
            price: Some(Decimal::new(10000, 2)), ..Default::default()
        }).unwrap()
    }

    #[test]
    fn test_product_create() {
        let p = listed(10);
        assert_eq!(p.serial_number, "SN0001");
        assert_eq!(p.cost, Decimal::new(5000, 2));
        assert!(p.is_active);
        assert!(p.is_available());
    }

    #[test]
    fn test_unpriced_product_stays_hidden() {
        let mut p = Product::create(NewProduct { name: "Draft".into(), serial_number: "X".into(), quantity_in_stock: 3, ..Default::default() }).unwrap();
        assert!(!p.is_active);
        assert!(p.ensure_stock(Quantity::new(1).unwrap()).is_err());
        p.set_pricing(Decimal::new(40, 0), None, Some(Discount::new(Decimal::new(10, 0)).unwrap())).unwrap();
        assert!(p.is_active);
        assert_eq!(p.cost, Decimal::new(20, 0));
        assert_eq!(p.discounted_price(), Decimal::new(3600, 2));
    }

    #[test]
    fn test_reserve_never_goes_negative() {
        let mut p = listed(5);
        p.reserve(Quantity::new(3).unwrap()).unwrap();
        assert_eq!(p.quantity_in_stock, 2);
        assert_eq!(p.units_sold, 3);
        let err = p.reserve(Quantity::new(3).unwrap()).unwrap_err();
        assert!(matches!(err, ProductError::InsufficientStock { requested: 3, available: 2, .. }));
        assert_eq!(p.quantity_in_stock, 2);
        p.restock(Quantity::new(3).unwrap());
        assert_eq!(p.quantity_in_stock, 5);
        assert_eq!(p.units_sold, 0);
    }

    #[test]
    fn test_discount_raise_is_reported() {
        let mut p = listed(1);
        assert!(p.set_discount(Discount::new(Decimal::new(20, 0)).unwrap()));
        assert!(!p.set_discount(Discount::new(Decimal::new(5, 0)).unwrap()));
        assert_eq!(p.discounted_price(), Decimal::new(9500, 2));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(Product::create(NewProduct { name: " ".into(), serial_number: "A".into(), ..Default::default() }).is_err());
        assert!(listed(1).set_stock(-1).is_err());
        assert!(listed(1).set_pricing(Decimal::ZERO, None, None).is_err());
    }
}
