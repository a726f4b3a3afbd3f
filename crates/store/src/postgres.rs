use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{
    CartId, CartItemId, CategoryId, OrderId, OrderItemId, Page, PageRequest, PaymentId, ProductId,
    ShippingId, UserId,
};
use domain::{
    Cart, CartItem, CartLine, Category, DomainError, Money, Order, OrderItem, OrderStatus, Payment,
    PaymentOutcome, PaymentStatus, Product, ProductQuery, Role, Shipping, ShippingDetails,
    ShippingStatus, SortBy, User, UserSummary,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{
        BulkCategoryDeletion, CartStore, CatalogStats, CatalogStore, CategoryDeletion,
        OrderFilter, OrderStore, PaymentStore, ShippingStore, UserStore,
    },
};

/// Creates a connection pool for the given database URL.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;
    tracing::debug!("Connected to PostgreSQL");
    Ok(pool)
}

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }
}

const PRODUCT_COLUMNS: &str =
    "p.id, p.name, p.description, p.price_cents, p.image_url, p.stock, p.category_id, p.created_at, p.updated_at";
const CATEGORY_COLUMNS: &str = "id, name, description, parent_id, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, user_id, status, total_cents, created_at, updated_at";
const PAYMENT_COLUMNS: &str = "id, order_id, amount_cents, currency, status, method, transaction_id, refund_reason, created_at, updated_at";
const SHIPPING_COLUMNS: &str = "id, order_id, address, city, postal_code, phone, estimated_delivery, status, tracking_number, created_at, updated_at";
const USER_COLUMNS: &str = "id, name, email, password_hash, role, reset_token, reset_token_expires_at, created_at, updated_at";

fn to_db_int(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{value} exceeds INTEGER")))
}

fn get_u32(row: &PgRow, column: &str) -> Result<u32> {
    let value: i32 = row.try_get(column)?;
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {column}: {value}")))
}

fn get_count(row: &PgRow, column: &str) -> Result<u64> {
    let value: i64 = row.try_get(column)?;
    Ok(value.max(0) as u64)
}

fn parse<T: FromStr<Err = DomainError>>(value: &str) -> Result<T> {
    value.parse().map_err(|e: DomainError| StoreError::Corrupt(e.to_string()))
}

/// Maps a uniqueness or foreign-key violation to `Conflict`.
fn conflict_on_constraint(err: sqlx::Error, message: impl Into<String>) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && (db_err.is_unique_violation() || db_err.is_foreign_key_violation())
    {
        return StoreError::Conflict(message.into());
    }
    StoreError::Database(err)
}

/// Escapes `%`, `_` and `\` so user text matches literally in `ILIKE`.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        image_url: row.try_get("image_url")?,
        stock: get_u32(row, "stock")?,
        category_id: CategoryId::from_uuid(row.try_get("category_id")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_category(row: &PgRow) -> Result<Category> {
    Ok(Category {
        id: CategoryId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        parent_id: row
            .try_get::<Option<Uuid>, _>("parent_id")?
            .map(CategoryId::from_uuid),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_cart(row: &PgRow) -> Result<Cart> {
    Ok(Cart {
        id: CartId::from_uuid(row.try_get("id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_cart_item(row: &PgRow) -> Result<CartItem> {
    Ok(CartItem {
        id: CartItemId::from_uuid(row.try_get("id")?),
        cart_id: CartId::from_uuid(row.try_get("cart_id")?),
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        quantity: get_u32(row, "quantity")?,
    })
}

fn row_to_order_item(row: &PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::from_uuid(row.try_get("id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        quantity: get_u32(row, "quantity")?,
        price: Money::from_cents(row.try_get("price_cents")?),
    })
}

fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
    let status: String = row.try_get("status")?;
    Ok(Order {
        id: OrderId::from_uuid(row.try_get("id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        status: parse(&status)?,
        total: Money::from_cents(row.try_get("total_cents")?),
        items,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_payment(row: &PgRow) -> Result<Payment> {
    let status: String = row.try_get("status")?;
    let method: String = row.try_get("method")?;
    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get("id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        amount: Money::from_cents(row.try_get("amount_cents")?),
        currency: row.try_get("currency")?,
        status: parse(&status)?,
        method: parse(&method)?,
        transaction_id: row.try_get("transaction_id")?,
        refund_reason: row.try_get("refund_reason")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_shipping(row: &PgRow) -> Result<Shipping> {
    let status: String = row.try_get("status")?;
    Ok(Shipping {
        id: ShippingId::from_uuid(row.try_get("id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        details: ShippingDetails {
            address: row.try_get("address")?,
            city: row.try_get("city")?,
            postal_code: row.try_get("postal_code")?,
            phone: row.try_get("phone")?,
            estimated_delivery: row.try_get("estimated_delivery")?,
        },
        status: parse(&status)?,
        tracking_number: row.try_get("tracking_number")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_user(row: &PgRow) -> Result<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: UserId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: parse(&role)?,
        reset_token: row.try_get("reset_token")?,
        reset_token_expires_at: row.try_get("reset_token_expires_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Loads the lines of the given orders, keyed by order id.
async fn fetch_order_items<'e, E: PgExecutor<'e>>(
    executor: E,
    order_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
    let rows = sqlx::query(
        r#"
        SELECT id, order_id, product_id, quantity, price_cents
        FROM order_items
        WHERE order_id = ANY($1)
        ORDER BY id
        "#,
    )
    .bind(order_ids)
    .fetch_all(executor)
    .await?;

    let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for row in &rows {
        let item = row_to_order_item(row)?;
        items.entry(item.order_id.as_uuid()).or_default().push(item);
    }
    Ok(items)
}

/// Removes every line from the carts of `user_id`.
async fn clear_cart_of<'e, E: PgExecutor<'e>>(executor: E, user_id: UserId) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM cart_items WHERE cart_id IN (SELECT id FROM carts WHERE user_id = $1)",
    )
    .bind(user_id.as_uuid())
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

impl PostgresStore {
    async fn orders_with_items(&self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let ids: Vec<Uuid> = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<_, _>>()?;
        let mut items = fetch_order_items(&self.pool, &ids).await?;
        rows.iter()
            .zip(ids)
            .map(|(row, id)| row_to_order(row, items.remove(&id).unwrap_or_default()))
            .collect()
    }

    fn push_product_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ProductQuery) {
        builder.push(" WHERE TRUE");
        if let Some(text) = &query.text {
            let pattern = format!("%{}%", escape_like(text));
            builder
                .push(" AND (p.name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR p.description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(category) = &query.category {
            builder
                .push(" AND p.category_id IN (SELECT id FROM categories WHERE LOWER(name) = LOWER(")
                .push_bind(category.clone())
                .push("))");
        }
        if let Some(min) = query.min_price {
            builder.push(" AND p.price_cents >= ").push_bind(min.cents());
        }
        if let Some(max) = query.max_price {
            builder.push(" AND p.price_cents <= ").push_bind(max.cents());
        }
        match query.in_stock {
            Some(true) => {
                builder.push(" AND p.stock > 0");
            }
            Some(false) => {
                builder.push(" AND p.stock = 0");
            }
            None => {}
        }
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price_cents, image_url, stock, category_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(&product.image_url)
        .bind(to_db_int(product.stock)?)
        .bind(product.category_id.as_uuid())
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_on_constraint(e, format!("category {} does not exist", product.category_id))
        })?;
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p ORDER BY p.name, p.id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_product).collect()
    }

    async fn update_product(&self, product: &Product) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = $2, description = $3, price_cents = $4, image_url = $5, stock = $6,
                category_id = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(&product.image_url)
        .bind(to_db_int(product.stock)?)
        .bind(product.category_id.as_uuid())
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_on_constraint(e, format!("category {} does not exist", product.category_id))
        })?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_on_constraint(e, "product is referenced by existing orders"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn search_products(&self, query: &ProductQuery) -> Result<Page<Product>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products p");
        Self::push_product_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p"
        ));
        Self::push_product_filters(&mut select, query);
        select.push(match query.sort_by {
            SortBy::Newest => " ORDER BY p.created_at DESC, p.id",
            SortBy::PriceAsc => " ORDER BY p.price_cents ASC, p.id",
            SortBy::PriceDesc => " ORDER BY p.price_cents DESC, p.id",
            SortBy::BestSelling => {
                " ORDER BY (SELECT COUNT(*) FROM order_items oi WHERE oi.product_id = p.id) DESC, p.id"
            }
        });
        select
            .push(" LIMIT ")
            .push_bind(i64::from(query.page.limit))
            .push(" OFFSET ")
            .push_bind(query.page.offset() as i64);

        let rows = select.build().fetch_all(&self.pool).await?;
        let items = rows.iter().map(row_to_product).collect::<Result<Vec<_>>>()?;
        Ok(Page::new(items, total.max(0) as u64, query.page))
    }

    async fn catalog_stats(&self) -> Result<CatalogStats> {
        let row = sqlx::query(
            r#"
            SELECT MIN(price_cents) AS min_price,
                   MAX(price_cents) AS max_price,
                   COUNT(*) FILTER (WHERE stock > 0) AS in_stock,
                   COUNT(*) FILTER (WHERE stock = 0) AS out_of_stock
            FROM products
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CatalogStats {
            min_price: row
                .try_get::<Option<i64>, _>("min_price")?
                .map(Money::from_cents),
            max_price: row
                .try_get::<Option<i64>, _>("max_price")?
                .map(Money::from_cents),
            in_stock: get_count(&row, "in_stock")?,
            out_of_stock: get_count(&row, "out_of_stock")?,
        })
    }

    async fn insert_category(&self, category: &Category) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO categories (id, name, description, parent_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(category.id.as_uuid())
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.parent_id.map(|p| p.as_uuid()))
        .bind(category.created_at)
        .bind(category.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_constraint(e, format!("category name '{}' is taken", category.name)))?;
        Ok(())
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>> {
        let row = sqlx::query(&format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_category).transpose()
    }

    async fn find_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        let row = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE LOWER(name) = LOWER($1)"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_category).transpose()
    }

    async fn list_categories(&self) -> Result<Vec<(Category, u64)>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.name, c.description, c.parent_id, c.created_at, c.updated_at,
                   (SELECT COUNT(*) FROM products p WHERE p.category_id = c.id) AS product_count
            FROM categories c
            ORDER BY c.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| Ok((row_to_category(row)?, get_count(row, "product_count")?)))
            .collect()
    }

    async fn update_category(&self, category: &Category) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE categories
            SET name = $2, description = $3, parent_id = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(category.id.as_uuid())
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.parent_id.map(|p| p.as_uuid()))
        .bind(category.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_constraint(e, format!("category name '{}' is taken", category.name)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_category(&self, id: CategoryId) -> Result<CategoryDeletion> {
        let mut tx = self.pool.begin().await?;

        // Row lock blocks concurrent inserts that would reference this category.
        let exists = sqlx::query("SELECT id FROM categories WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !exists {
            return Ok(CategoryDeletion::NotFound);
        }

        let has_products: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE category_id = $1)")
                .bind(id.as_uuid())
                .fetch_one(&mut *tx)
                .await?;
        if has_products {
            return Ok(CategoryDeletion::HasProducts);
        }

        let has_children: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM categories WHERE parent_id = $1)")
                .bind(id.as_uuid())
                .fetch_one(&mut *tx)
                .await?;
        if has_children {
            return Ok(CategoryDeletion::HasSubCategories);
        }

        sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(CategoryDeletion::Deleted)
    }

    async fn delete_all_categories(&self) -> Result<BulkCategoryDeletion> {
        let mut tx = self.pool.begin().await?;

        let has_products: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products)")
            .fetch_one(&mut *tx)
            .await?;
        if has_products {
            return Ok(BulkCategoryDeletion::BlockedByProducts);
        }

        let result = sqlx::query("DELETE FROM categories")
            .execute(&mut *tx)
            .await
            .map_err(|e| conflict_on_constraint(e, "categories still have products"))?;
        tx.commit().await?;
        Ok(BulkCategoryDeletion::Deleted(result.rows_affected()))
    }

    async fn products_in_category(&self, id: CategoryId) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.category_id = $1 ORDER BY p.name"
        ))
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_product).collect()
    }
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn cart_for_user(&self, user_id: UserId) -> Result<Cart> {
        let cart = Cart::new(user_id);
        sqlx::query(
            r#"
            INSERT INTO carts (id, user_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(cart.id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT id, user_id, created_at, updated_at FROM carts WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
        row_to_cart(&row)
    }

    async fn cart_lines(&self, cart_id: CartId) -> Result<Vec<CartLine>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT ci.id AS item_id, ci.cart_id, ci.quantity, {PRODUCT_COLUMNS}
            FROM cart_items ci
            JOIN products p ON p.id = ci.product_id
            WHERE ci.cart_id = $1
            ORDER BY ci.added_at, ci.id
            "#
        ))
        .bind(cart_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let product = row_to_product(row)?;
                Ok(CartLine {
                    item: CartItem {
                        id: CartItemId::from_uuid(row.try_get("item_id")?),
                        cart_id: CartId::from_uuid(row.try_get("cart_id")?),
                        product_id: product.id,
                        quantity: get_u32(row, "quantity")?,
                    },
                    product,
                })
            })
            .collect()
    }

    async fn get_cart_item(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> Result<Option<CartItem>> {
        let row = sqlx::query(
            "SELECT id, cart_id, product_id, quantity FROM cart_items WHERE id = $1 AND cart_id = $2",
        )
        .bind(item_id.as_uuid())
        .bind(cart_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_cart_item).transpose()
    }

    async fn add_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem> {
        let row = sqlx::query(
            r#"
            INSERT INTO cart_items (id, cart_id, product_id, quantity, added_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (cart_id, product_id)
            DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity
            RETURNING id, cart_id, product_id, quantity
            "#,
        )
        .bind(CartItemId::new().as_uuid())
        .bind(cart_id.as_uuid())
        .bind(product_id.as_uuid())
        .bind(to_db_int(quantity)?)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                StoreError::ProductNotFound(product_id)
            }
            other => StoreError::Database(other),
        })?;
        row_to_cart_item(&row)
    }

    async fn set_cart_item_quantity(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<Option<CartItem>> {
        let row = sqlx::query(
            r#"
            UPDATE cart_items SET quantity = $3
            WHERE id = $1 AND cart_id = $2
            RETURNING id, cart_id, product_id, quantity
            "#,
        )
        .bind(item_id.as_uuid())
        .bind(cart_id.as_uuid())
        .bind(to_db_int(quantity)?)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_cart_item).transpose()
    }

    async fn remove_cart_item(&self, cart_id: CartId, item_id: CartItemId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND cart_id = $2")
            .bind(item_id.as_uuid())
            .bind(cart_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_cart(&self, user_id: UserId) -> Result<u64> {
        clear_cart_of(&self.pool, user_id).await
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn place_order(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        // Lock products in a stable order so concurrent checkouts cannot deadlock.
        let mut lines: Vec<&OrderItem> = order.items.iter().collect();
        lines.sort_by_key(|item| item.product_id);

        for item in lines {
            let quantity = to_db_int(item.quantity)?;
            let updated = sqlx::query(
                r#"
                UPDATE products SET stock = stock - $2, updated_at = $3
                WHERE id = $1 AND stock >= $2
                "#,
            )
            .bind(item.product_id.as_uuid())
            .bind(quantity)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if updated == 0 {
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
                        .bind(item.product_id.as_uuid())
                        .fetch_one(&mut *tx)
                        .await?;
                return Err(if exists {
                    StoreError::InsufficientStock(item.product_id)
                } else {
                    StoreError::ProductNotFound(item.product_id)
                });
            }
        }

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, status, total_cents, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.total.cents())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, quantity, price_cents)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(order.id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(to_db_int(item.quantity)?)
            .bind(item.price.cents())
            .execute(&mut *tx)
            .await?;
        }

        clear_cart_of(&mut *tx, order.user_id).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId, owner: Option<UserId>) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND ($2::uuid IS NULL OR user_id = $2)"
        ))
        .bind(id.as_uuid())
        .bind(owner.map(|u| u.as_uuid()))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.orders_with_items(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE ($1::uuid IS NULL OR user_id = $1) AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC, id
            "#
        ))
        .bind(filter.user_id.map(|u| u.as_uuid()))
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        self.orders_with_items(rows).await
    }

    async fn page_orders(&self, filter: OrderFilter, page: PageRequest) -> Result<Page<Order>> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM orders
            WHERE ($1::uuid IS NULL OR user_id = $1) AND ($2::text IS NULL OR status = $2)
            "#,
        )
        .bind(filter.user_id.map(|u| u.as_uuid()))
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE ($1::uuid IS NULL OR user_id = $1) AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC, id
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(filter.user_id.map(|u| u.as_uuid()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let orders = self.orders_with_items(rows).await?;
        Ok(Page::new(orders, total.max(0) as u64, page))
    }

    async fn count_orders(&self, user_id: Option<UserId>) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE ($1::uuid IS NULL OR user_id = $1)")
                .bind(user_id.map(|u| u.as_uuid()))
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }

    async fn cancel_order(&self, id: OrderId, owner: Option<UserId>) -> Result<Option<Order>> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let row = sqlx::query(&format!(
            r#"
            UPDATE orders SET status = 'cancelled', updated_at = $3
            WHERE id = $1 AND status = 'pending' AND ($2::uuid IS NULL OR user_id = $2)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(owner.map(|u| u.as_uuid()))
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        restore_stock(&mut tx, id, now).await?;
        let mut items = fetch_order_items(&mut *tx, &[id.as_uuid()]).await?;
        let order = row_to_order(&row, items.remove(&id.as_uuid()).unwrap_or_default())?;

        tx.commit().await?;
        Ok(Some(order))
    }

    async fn transition_order(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let row = sqlx::query(&format!(
            r#"
            UPDATE orders SET status = $3, updated_at = $4
            WHERE id = $1 AND status = $2
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        if to == OrderStatus::Cancelled {
            restore_stock(&mut tx, id, now).await?;
        }
        let mut items = fetch_order_items(&mut *tx, &[id.as_uuid()]).await?;
        let order = row_to_order(&row, items.remove(&id.as_uuid()).unwrap_or_default())?;

        tx.commit().await?;
        Ok(Some(order))
    }

    async fn delete_order(&self, id: OrderId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_orders(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM orders").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

/// Gives every line of the order back to its product's stock.
async fn restore_stock(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    order_id: OrderId,
    now: chrono::DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE products p SET stock = p.stock + oi.quantity, updated_at = $2
        FROM order_items oi
        WHERE oi.order_id = $1 AND p.id = oi.product_id
        "#,
    )
    .bind(order_id.as_uuid())
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl PaymentStore for PostgresStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, amount_cents, currency, status, method, transaction_id, refund_reason, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(payment.amount.cents())
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(payment.method.as_str())
        .bind(&payment.transaction_id)
        .bind(&payment.refund_reason)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_constraint(e, "payment conflicts with an existing record"))?;
        Ok(())
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_payment).transpose()
    }

    async fn find_payment_by_transaction(&self, transaction_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_id = $1"
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_payment).transpose()
    }

    async fn latest_payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_payment).transpose()
    }

    async fn list_payments(&self) -> Result<Vec<Payment>> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_payment).collect()
    }

    async fn settle_payment(
        &self,
        id: PaymentId,
        outcome: PaymentOutcome,
    ) -> Result<Option<(Payment, Order)>> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let row = sqlx::query(&format!(
            r#"
            UPDATE payments SET status = $2, updated_at = $3
            WHERE id = $1 AND status = 'pending'
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(outcome.as_str())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let payment = row_to_payment(&row)?;

        let order_status = match outcome {
            PaymentOutcome::Completed => OrderStatus::Paid,
            PaymentOutcome::Failed => OrderStatus::PaymentFailed,
        };
        sqlx::query(
            r#"
            UPDATE orders SET status = $2, updated_at = $3
            WHERE id = $1 AND status IN ('pending', 'payment_failed')
            "#,
        )
        .bind(payment.order_id.as_uuid())
        .bind(order_status.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let order_row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(payment.order_id.as_uuid())
            .fetch_one(&mut *tx)
            .await?;
        let mut items = fetch_order_items(&mut *tx, &[payment.order_id.as_uuid()]).await?;
        let order = row_to_order(
            &order_row,
            items.remove(&payment.order_id.as_uuid()).unwrap_or_default(),
        )?;

        if outcome == PaymentOutcome::Completed {
            clear_cart_of(&mut *tx, order.user_id).await?;
        }

        tx.commit().await?;
        Ok(Some((payment, order)))
    }

    async fn refund_payment(&self, id: PaymentId, reason: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE payments SET status = $2, refund_reason = $3, updated_at = $4
            WHERE id = $1 AND status = 'completed'
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(PaymentStatus::Refunded.as_str())
        .bind(reason)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_payment).transpose()
    }

    async fn completed_revenue(&self) -> Result<Money> {
        let cents: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM payments WHERE status = 'completed'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(Money::from_cents(cents))
    }
}

#[async_trait]
impl ShippingStore for PostgresStore {
    async fn insert_shipping(&self, shipping: &Shipping) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO shipping (id, order_id, address, city, postal_code, phone, estimated_delivery, status, tracking_number, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(shipping.id.as_uuid())
        .bind(shipping.order_id.as_uuid())
        .bind(&shipping.details.address)
        .bind(&shipping.details.city)
        .bind(&shipping.details.postal_code)
        .bind(&shipping.details.phone)
        .bind(shipping.details.estimated_delivery)
        .bind(shipping.status.as_str())
        .bind(&shipping.tracking_number)
        .bind(shipping.created_at)
        .bind(shipping.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_on_constraint(
                e,
                format!("order {} already has a shipping record", shipping.order_id),
            )
        })?;
        Ok(())
    }

    async fn get_shipping(&self, id: ShippingId) -> Result<Option<Shipping>> {
        let row = sqlx::query(&format!("SELECT {SHIPPING_COLUMNS} FROM shipping WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_shipping).transpose()
    }

    async fn shipping_for_order(&self, order_id: OrderId) -> Result<Option<Shipping>> {
        let row = sqlx::query(&format!(
            "SELECT {SHIPPING_COLUMNS} FROM shipping WHERE order_id = $1"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_shipping).transpose()
    }

    async fn list_shipping(&self, status: Option<ShippingStatus>) -> Result<Vec<Shipping>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SHIPPING_COLUMNS} FROM shipping
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC
            "#
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_shipping).collect()
    }

    async fn update_shipping_details(
        &self,
        id: ShippingId,
        details: &ShippingDetails,
    ) -> Result<Option<Shipping>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE shipping
            SET address = $2, city = $3, postal_code = $4, phone = $5, estimated_delivery = $6, updated_at = $7
            WHERE id = $1 AND status = 'pending'
            RETURNING {SHIPPING_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(&details.address)
        .bind(&details.city)
        .bind(&details.postal_code)
        .bind(&details.phone)
        .bind(details.estimated_delivery)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_shipping).transpose()
    }

    async fn advance_shipping(
        &self,
        id: ShippingId,
        from: ShippingStatus,
        to: ShippingStatus,
        tracking_number: Option<&str>,
    ) -> Result<Option<Shipping>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE shipping
            SET status = $3, tracking_number = COALESCE($4, tracking_number), updated_at = $5
            WHERE id = $1 AND status = $2
            RETURNING {SHIPPING_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(tracking_number)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_shipping).transpose()
    }

    async fn delete_shipping(&self, id: ShippingId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM shipping WHERE id = $1 AND status = 'pending'")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, reset_token, reset_token_expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.reset_token)
        .bind(user.reset_token_expires_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_constraint(e, format!("email {} is already registered", user.email)))?;
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_user_by_reset_token(&self, digest: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE reset_token = $1"))
            .bind(digest)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn list_users(&self, role: Option<Role>) -> Result<Vec<UserSummary>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {USER_COLUMNS},
                   (SELECT COUNT(*) FROM orders o WHERE o.user_id = users.id) AS order_count
            FROM users
            WHERE ($1::text IS NULL OR role = $1)
            ORDER BY created_at DESC
            "#
        ))
        .bind(role.map(|r| r.as_str()))
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(UserSummary {
                    user: row_to_user(row)?,
                    order_count: get_count(row, "order_count")?,
                })
            })
            .collect()
    }

    async fn update_user(&self, user: &User) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET name = $2, email = $3, password_hash = $4, role = $5, reset_token = $6,
                reset_token_expires_at = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.reset_token)
        .bind(user.reset_token_expires_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_constraint(e, format!("email {} is already registered", user.email)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&self, id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_on_constraint(e, "user still has orders"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_users(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_like_escapes_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn to_db_int_rejects_overflow() {
        assert_eq!(to_db_int(42).unwrap(), 42);
        assert!(to_db_int(u32::MAX).is_err());
    }
}
