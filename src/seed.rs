//! Startup data: staff accounts from configuration and an optional demo catalog.

use rand::Rng;
use rust_decimal::Decimal;

use crate::domain::aggregates::{Category, NewProduct, Product, Role};
use crate::services::accounts::ensure_staff_account;
use crate::{AppState, Result};

const DEMO_CATALOG: &[(&str, &[&str])] = &[
    ("Lighting", &["Desk Lamp", "Floor Lamp", "LED Strip", "Reading Light"]),
    ("Kitchen", &["Chef Knife", "Cast Iron Pan", "Kettle", "Pepper Mill"]),
    ("Audio", &["Bookshelf Speaker", "Wireless Headphones", "Turntable"]),
];

pub async fn bootstrap_staff(state: &AppState) -> Result<()> {
    let accounts = [
        (&state.config.product_manager, Role::ProductManager),
        (&state.config.sales_manager, Role::SalesManager),
    ];
    for (account, role) in accounts {
        if let Some(account) = account {
            ensure_staff_account(state, &account.email, &account.password, role).await?;
        }
    }
    Ok(())
}

/// Fills an empty catalog with priced demo products. Returns how many were created.
pub async fn seed_demo_catalog(state: &AppState) -> Result<usize> {
    if state.store.count_products().await? > 0 {
        tracing::info!("catalog not empty; skipping demo data");
        return Ok(0);
    }
    let mut created = 0;
    for (index, (category, names)) in DEMO_CATALOG.iter().enumerate() {
        let category = state.store.create_category(Category::create(*category, None)).await?;
        for product in demo_products(index, names, category.id) {
            state.store.create_product(product).await?;
            created += 1;
        }
    }
    tracing::info!(products = created, "demo catalog seeded");
    Ok(created)
}

fn demo_products(index: usize, names: &[&str], category_id: uuid::Uuid) -> Vec<Product> {
    let mut rng = rand::thread_rng();
    names.iter().enumerate().filter_map(|(n, name)| {
        let cents: i64 = rng.gen_range(999..=49_999);
        Product::create(NewProduct {
            name: name.to_string(),
            model: Some(format!("M{}", rng.gen_range(100..999))),
            serial_number: format!("DEMO-{index}-{n:03}"),
            description: Some(format!("{name} from the demo catalog.")),
            quantity_in_stock: rng.gen_range(0..=40),
            price: Some(Decimal::new(cents, 2)),
            warranty_status: Some("12 months".into()),
            category_id: Some(category_id),
            ..Default::default()
        }).ok()
    }).collect()
}
