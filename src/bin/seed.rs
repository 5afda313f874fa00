use anyhow::Context;
use chrono::Utc;
use marketplace_checkout::{
    config::AppConfig,
    db::{create_orm_conn, raw_pool, run_migrations},
    demo::{DEMO_ADMIN, DEMO_GATEWAY, DEMO_USER, DemoData},
    middleware::auth::{ROLE_ADMIN, ROLE_PAYMENT_GATEWAY, issue_token},
    models::{Product, PromoCode, Seller},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    let url = config
        .database_url
        .clone()
        .context("DATABASE_URL must be set to seed")?;

    let orm = create_orm_conn(&url).await?;
    // Ensure migrations are applied.
    run_migrations(&orm).await?;
    let pool = raw_pool(&orm);

    let demo = DemoData::new(Utc::now());
    seed_sellers(&pool, &demo.sellers).await?;
    seed_products(&pool, &demo.products).await?;
    seed_promo_codes(&pool, &demo.promo_codes).await?;

    let day = 24 * 3600;
    println!("Seed completed.");
    println!("user token:    {}", issue_token(&config.jwt_secret, DEMO_USER, "user", day)?);
    println!("admin token:   {}", issue_token(&config.jwt_secret, DEMO_ADMIN, ROLE_ADMIN, day)?);
    println!(
        "gateway token: {}",
        issue_token(&config.jwt_secret, DEMO_GATEWAY, ROLE_PAYMENT_GATEWAY, day)?
    );
    Ok(())
}

async fn seed_sellers(pool: &sqlx::PgPool, sellers: &[Seller]) -> anyhow::Result<()> {
    for seller in sellers {
        sqlx::query(
            r#"
            INSERT INTO sellers (id, name, commission_rate)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(seller.id)
        .bind(&seller.name)
        .bind(seller.commission_rate)
        .execute(pool)
        .await?;
    }

    println!("Seeded sellers");
    Ok(())
}

async fn seed_products(pool: &sqlx::PgPool, products: &[Product]) -> anyhow::Result<()> {
    for product in products {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price, discount_price, stock, seller_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(product.price)
        .bind(product.discount_price)
        .bind(i32::try_from(product.stock)?)
        .bind(product.seller_id)
        .execute(pool)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}

async fn seed_promo_codes(pool: &sqlx::PgPool, codes: &[PromoCode]) -> anyhow::Result<()> {
    for promo in codes {
        let max_uses = promo.max_uses.map(i32::try_from).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO promo_codes
                (code, discount_kind, discount_value, min_order_amount, valid_from, valid_until, max_uses)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(&promo.code)
        .bind(promo.kind.as_str())
        .bind(promo.value)
        .bind(promo.min_order_amount)
        .bind(promo.valid_from)
        .bind(promo.valid_until)
        .bind(max_uses)
        .execute(pool)
        .await?;
    }

    println!("Seeded promo codes");
    Ok(())
}
