//! # Catalog Seeder
//!
//! Fills an empty database with a demo catalog.
//!
//! ## Usage
//! ```bash
//! # 200 products (default)
//! cargo run -p storefront-db --bin seed
//!
//! # Custom amount and path
//! cargo run -p storefront-db --bin seed -- --count 1000 --db ./data/storefront.db
//! ```
//!
//! Codes look like `{CATEGORY}-{ITEM}-{NNN}`; prices run 4.99 to 59.99 plus
//! a variant addon, stock 0 to 40.

use chrono::Utc;
use std::env;
use storefront_core::{NewProduct, ProductQuery};
use storefront_db::{Database, DbConfig};
use uuid::Uuid;

const CATEGORIES: &[(&str, &str, &[&str])] = &[
    (
        "TEA",
        "tea",
        &[
            "Yerba Mate",
            "Green Tea",
            "Black Tea",
            "Rooibos",
            "Chamomile",
            "Earl Grey",
            "Oolong",
            "Matcha",
        ],
    ),
    (
        "KIT",
        "kitchenware",
        &[
            "Gourd",
            "Bombilla",
            "Thermos",
            "Teapot",
            "Infuser",
            "Mug",
            "Kettle",
            "Tray",
        ],
    ),
    (
        "SNK",
        "snacks",
        &[
            "Alfajor",
            "Shortbread",
            "Almonds",
            "Dried Figs",
            "Dark Chocolate",
            "Granola",
            "Honey Biscuits",
            "Rice Crackers",
        ],
    ),
];

/// Variant name and price addon in cents.
const VARIANTS: &[(&str, i64)] = &[
    ("Classic", 0),
    ("Large", 250),
    ("Organic", 400),
    ("Gift Box", 900),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 200;
    let mut db_path = String::from("./storefront_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
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
                println!("Storefront catalog seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to generate (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: ./storefront_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Storefront catalog seeder");
    println!("Database: {}", db_path);
    println!("Products: {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    let products = db.products();

    let (_, existing) = products.list(&ProductQuery::default()).await?;
    if existing > 0 {
        println!("Database already has {} products, skipping.", existing);
        println!("Delete the database file to regenerate.");
        return Ok(());
    }

    let start = std::time::Instant::now();
    let mut generated = 0;
    let mut seed = 0;

    'outer: for (code, category, items) in CATEGORIES {
        for item in items.iter() {
            for (variant, addon) in VARIANTS {
                if generated >= count {
                    break 'outer;
                }

                let input = generate_product(code, category, item, variant, *addon, seed);
                seed += 1;

                let product = input.into_product(Uuid::new_v4().to_string(), Utc::now());
                if let Err(e) = products.insert(&product).await {
                    eprintln!("Failed to insert {}: {}", product.code, e);
                    continue;
                }

                generated += 1;
                if generated % 50 == 0 {
                    println!("  Generated {} products...", generated);
                }
            }
        }
    }

    println!();
    println!("Generated {} products in {:?}", generated, start.elapsed());

    db.close().await;
    Ok(())
}

/// Builds one product with deterministic pseudo-random price and stock.
fn generate_product(
    code: &str,
    category: &str,
    item: &str,
    variant: &str,
    price_addon: i64,
    seed: usize,
) -> NewProduct {
    let initials: String = item
        .split_whitespace()
        .filter_map(|w| w.chars().next())
        .collect();

    NewProduct {
        title: format!("{} {}", item, variant),
        description: format!("{} ({}), from the {} shelf", item, variant, category),
        code: format!("{}-{}-{:03}", code, initials, seed),
        price_cents: 499 + ((seed * 37) % 5500) as i64 + price_addon,
        stock: (seed % 41) as i64,
        category: category.to_string(),
        thumbnails: vec![format!("https://img.storefront.dev/{}/{}.jpg", category, seed)],
        is_active: Some(seed % 13 != 0),
    }
}
