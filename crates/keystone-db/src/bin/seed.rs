//! # Seed Data Generator
//!
//! Populates the database with demo tenants for development.
//!
//! ## Usage
//! ```bash
//! # Seed three tenants with 10 orders each (default)
//! cargo run -p keystone-db --bin seed
//!
//! # Custom amount of orders per tenant
//! cargo run -p keystone-db --bin seed -- --orders 50
//!
//! # Specify database path
//! cargo run -p keystone-db --bin seed -- --db ./data/keystone.db
//! ```
//!
//! ## Generated Data
//! For every demo tenant:
//! - The tenant row
//! - Default `sales.*` and `general.*` settings (tax mode and scale differ
//!   between tenants so isolation is visible)
//! - A batch of placed orders, each queuing an `OrderPlaced` event

use rust_decimal::Decimal;
use std::env;

use keystone_core::{
    Discount, Money, NewOrder, NewTenant, Rate, SaleLine, SettingValue, TaxMode, TenantId,
};
use keystone_db::{Database, DbConfig, TenantScope};

/// (slug, name, tax mode, currency scale, tax rate in bps)
const TENANTS: &[(&str, &str, &str, i64, u32)] = &[
    ("acme", "Acme Trading Ltd", "exclusive", 2, 825),
    ("globex", "Globex GmbH", "inclusive", 2, 1900),
    ("yoyodyne", "Yoyodyne KK", "exclusive", 0, 1000),
];

/// (description, unit price)
const CATALOG: &[(&str, &str)] = &[
    ("Consulting hour", "150.00"),
    ("Support plan (monthly)", "49.90"),
    ("Onboarding workshop", "1200.00"),
    ("Licence seat", "19.99"),
    ("Hardware token", "35.50"),
    ("Data migration", "480.00"),
];

const CUSTOMERS: &[&str] = &["Initech", "Umbrella Corp", "Stark Industries", "Wayne Enterprises"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut orders_per_tenant: usize = 10;
    let mut db_path = String::from("./keystone_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--orders" | "-o" => {
                if i + 1 < args.len() {
                    orders_per_tenant = args[i + 1].parse().unwrap_or(10);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Keystone ERP Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -o, --orders <N>   Orders per tenant (default: 10)");
                println!("  -d, --db <PATH>    Database file path (default: ./keystone_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Keystone ERP Seed Data Generator");
    println!("===================================");
    println!("Database: {}", db_path);
    println!("Orders per tenant: {}", orders_per_tenant);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    for (slug, name, tax_mode, scale, tax_bps) in TENANTS {
        if db.tenants().get_by_slug(slug).await?.is_some() {
            println!("⚠ Tenant '{}' already exists, skipping", slug);
            continue;
        }

        let tenant = db
            .tenants()
            .create(NewTenant {
                name: name.to_string(),
                slug: slug.to_string(),
            })
            .await?;
        println!();
        println!("✓ Tenant {} ({})", tenant.slug, tenant.id);

        seed_settings(&db, &tenant.id, tax_mode, *scale).await?;
        println!("  ✓ Settings written");

        let mode: TaxMode = tax_mode.parse()?;
        let orders = db.orders(TenantScope::tenant(tenant.id.clone()));

        for n in 0..orders_per_tenant {
            let input = generate_order(n, *tax_bps);
            let priced = input.price(mode, *scale as u32)?;
            let order = orders.place(input, &priced).await?;

            if n % 5 == 0 {
                println!(
                    "  Order {} total {}",
                    order.order_number,
                    order.total.to_fixed(order.currency_scale)
                );
            }
        }
        println!("  ✓ {} orders placed", orders_per_tenant);
    }

    println!();
    println!(
        "✓ Seed complete! {} domain events pending dispatch",
        db.outbox().count_pending().await?
    );

    Ok(())
}

async fn seed_settings(
    db: &Database,
    tenant: &TenantId,
    tax_mode: &str,
    scale: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = db.settings(TenantScope::tenant(tenant.clone()));

    settings
        .upsert("sales.tax_mode", "sales", SettingValue::Text(tax_mode.to_string()))
        .await?;
    settings
        .upsert("sales.currency_scale", "sales", SettingValue::Integer(scale))
        .await?;
    settings
        .upsert("sales.quotation_validity_days", "sales", SettingValue::Integer(30))
        .await?;
    settings
        .upsert("general.timezone", "general", SettingValue::Text("UTC".to_string()))
        .await?;

    Ok(())
}

/// Builds a deterministic order from the catalog.
fn generate_order(seed: usize, tax_bps: u32) -> NewOrder {
    let line_count = 1 + seed % 3;

    let lines = (0..line_count)
        .map(|i| {
            let (description, price) = CATALOG[(seed + i * 2) % CATALOG.len()];
            SaleLine {
                description: description.to_string(),
                quantity: Decimal::from((1 + (seed + i) % 4) as i64),
                unit_price: Money::parse(price).unwrap_or_default(),
                discount: Discount::None,
                tax_rate: Rate::from_bps(tax_bps),
            }
        })
        .collect();

    // Every fourth order gets a 5% order-level discount
    let discount = if seed % 4 == 3 {
        Discount::Percentage(Rate::from_bps(500))
    } else {
        Discount::None
    };

    NewOrder {
        tenant_id: None,
        customer_name: CUSTOMERS[seed % CUSTOMERS.len()].to_string(),
        lines,
        discount,
        notes: None,
    }
}
