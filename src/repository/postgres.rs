use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    ActiveValue::NotSet,
    sea_query::{Expr, OnConflict},
};
use uuid::Uuid;

use crate::{
    entity::{
        cart_items::{ActiveModel as CartItemActive, Column as CartCol, Entity as CartItems},
        commissions::{
            ActiveModel as CommissionActive, Column as CommissionCol, Entity as Commissions,
            Model as CommissionModel,
        },
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
        promo_codes::{Column as PromoCol, Entity as PromoCodes, Model as PromoModel},
        sellers::{Entity as Sellers, Model as SellerModel},
    },
    error::{AppError, AppResult},
    models::{
        CartLine, CartOwner, Commission, Order, OrderLine, OrderStatus, OrderWithLines,
        PaymentStatus, Product, PromoCode, Seller,
    },
    repository::{CartBackend, Catalog, OrderStore, to_i32, to_u32},
};

#[derive(Debug, Clone)]
pub struct PgCatalog {
    db: DatabaseConnection,
}

impl PgCatalog {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn product(&self, id: Uuid) -> AppResult<Option<Product>> {
        Products::find_by_id(id)
            .one(&self.db)
            .await?
            .map(product_from_entity)
            .transpose()
    }

    async fn products(&self, ids: &[Uuid]) -> AppResult<Vec<Product>> {
        Products::find()
            .filter(ProdCol::Id.is_in(ids.iter().copied()))
            .all(&self.db)
            .await?
            .into_iter()
            .map(product_from_entity)
            .collect()
    }

    async fn seller(&self, id: Uuid) -> AppResult<Option<Seller>> {
        Ok(Sellers::find_by_id(id)
            .one(&self.db)
            .await?
            .map(seller_from_entity))
    }

    async fn promo_code(&self, code: &str) -> AppResult<Option<PromoCode>> {
        PromoCodes::find_by_id(code.to_string())
            .one(&self.db)
            .await?
            .map(promo_from_entity)
            .transpose()
    }

    async fn redeem_promo_code(&self, code: &str) -> AppResult<bool> {
        let result = PromoCodes::update_many()
            .col_expr(PromoCol::UsedCount, Expr::col(PromoCol::UsedCount).add(1))
            .filter(PromoCol::Code.eq(code))
            .filter(PromoCol::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(PromoCol::MaxUses.is_null())
                    .add(Expr::col(PromoCol::UsedCount).lt(Expr::col(PromoCol::MaxUses))),
            )
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn release_promo_code(&self, code: &str) -> AppResult<()> {
        PromoCodes::update_many()
            .col_expr(PromoCol::UsedCount, Expr::col(PromoCol::UsedCount).sub(1))
            .filter(PromoCol::Code.eq(code))
            .filter(PromoCol::UsedCount.gt(0))
            .exec(&self.db)
            .await?;
        Ok(())
    }
}

/// Durable cart lines for registered users.
#[derive(Debug, Clone)]
pub struct PgCartBackend {
    db: DatabaseConnection,
}

impl PgCartBackend {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn cart_user(owner: &CartOwner) -> AppResult<Uuid> {
    match owner {
        CartOwner::User(id) => Ok(*id),
        CartOwner::Guest(_) => Err(AppError::Internal(anyhow::anyhow!(
            "guest carts are not stored in postgres"
        ))),
    }
}

#[async_trait]
impl CartBackend for PgCartBackend {
    async fn lines(&self, owner: &CartOwner) -> AppResult<Vec<CartLine>> {
        let user_id = cart_user(owner)?;
        CartItems::find()
            .filter(CartCol::UserId.eq(user_id))
            .order_by_asc(CartCol::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|item| {
                Ok(CartLine {
                    product_id: item.product_id,
                    quantity: to_u32(item.quantity)?,
                })
            })
            .collect()
    }

    async fn put(&self, owner: &CartOwner, product_id: Uuid, quantity: u32) -> AppResult<CartLine> {
        let user_id = cart_user(owner)?;
        let item = CartItemActive {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            product_id: Set(product_id),
            quantity: Set(to_i32(quantity)?),
            created_at: NotSet,
            updated_at: Set(Utc::now().into()),
        };

        CartItems::insert(item)
            .on_conflict(
                OnConflict::columns([CartCol::UserId, CartCol::ProductId])
                    .update_columns([CartCol::Quantity, CartCol::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(CartLine { product_id, quantity })
    }

    async fn remove(&self, owner: &CartOwner, product_id: Uuid) -> AppResult<bool> {
        let user_id = cart_user(owner)?;
        let result = CartItems::delete_many()
            .filter(CartCol::UserId.eq(user_id))
            .filter(CartCol::ProductId.eq(product_id))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn clear(&self, owner: &CartOwner) -> AppResult<()> {
        let user_id = cart_user(owner)?;
        CartItems::delete_many()
            .filter(CartCol::UserId.eq(user_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PgOrderStore {
    db: DatabaseConnection,
}

impl PgOrderStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find_order(&self, id: Uuid) -> AppResult<Option<Order>> {
        Orders::find_by_id(id)
            .one(&self.db)
            .await?
            .map(order_from_entity)
            .transpose()
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: &Order, lines: &[OrderLine]) -> AppResult<()> {
        let txn = self.db.begin().await?;

        OrderActive {
            id: Set(order.id),
            user_id: Set(order.user_id),
            invoice_number: Set(order.invoice_number.clone()),
            status: Set(order.status.as_str().into()),
            payment_status: Set(order.payment_status.as_str().into()),
            subtotal: Set(order.subtotal),
            shipping_cost: Set(order.shipping_cost),
            discount_amount: Set(order.discount_amount),
            grand_total: Set(order.grand_total),
            promo_code: Set(order.promo_code.clone()),
            shipping_address: Set(order.shipping_address.clone()),
            paid_at: Set(order.paid_at.map(Into::into)),
            cancelled_at: Set(order.cancelled_at.map(Into::into)),
            created_at: Set(order.created_at.into()),
            updated_at: Set(order.updated_at.into()),
        }
        .insert(&txn)
        .await?;

        for line in lines {
            OrderItemActive {
                id: Set(line.id),
                order_id: Set(line.order_id),
                product_id: Set(line.product_id),
                product_name: Set(line.product_name.clone()),
                seller_id: Set(line.seller_id),
                unit_price: Set(line.unit_price),
                quantity: Set(to_i32(line.quantity)?),
                line_total: Set(line.line_total),
                created_at: NotSet,
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<OrderWithLines>> {
        let Some(order) = self.find_order(id).await? else {
            return Ok(None);
        };

        let lines = OrderItems::find()
            .filter(OrderItemCol::OrderId.eq(id))
            .order_by_asc(OrderItemCol::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(order_line_from_entity)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Some(OrderWithLines { order, lines }))
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        status: Option<OrderStatus>,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<Order>, u64)> {
        let mut condition = Condition::all().add(OrderCol::UserId.eq(user_id));
        if let Some(status) = status {
            condition = condition.add(OrderCol::Status.eq(status.as_str()));
        }

        let finder = Orders::find()
            .filter(condition)
            .order_by_desc(OrderCol::CreatedAt);

        let total = finder.clone().count(&self.db).await?;

        let orders = finder
            .limit(limit)
            .offset(offset)
            .all(&self.db)
            .await?
            .into_iter()
            .map(order_from_entity)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((orders, total))
    }

    async fn transition(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Order>> {
        let mut update = Orders::update_many()
            .col_expr(OrderCol::Status, Expr::value(to.as_str()))
            .col_expr(OrderCol::UpdatedAt, Expr::value(at.fixed_offset()));
        if to == OrderStatus::Cancelled {
            update = update.col_expr(OrderCol::CancelledAt, Expr::value(Some(at.fixed_offset())));
        }

        let result = update
            .filter(OrderCol::Id.eq(id))
            .filter(OrderCol::Status.eq(from.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.find_order(id).await
    }

    async fn set_payment_status(
        &self,
        id: Uuid,
        from: &[PaymentStatus],
        to: PaymentStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Order>> {
        let mut update = Orders::update_many()
            .col_expr(OrderCol::PaymentStatus, Expr::value(to.as_str()))
            .col_expr(OrderCol::UpdatedAt, Expr::value(at.fixed_offset()));
        if to == PaymentStatus::Paid {
            update = update.col_expr(OrderCol::PaidAt, Expr::value(Some(at.fixed_offset())));
        }

        let result = update
            .filter(OrderCol::Id.eq(id))
            .filter(OrderCol::PaymentStatus.is_in(from.iter().map(PaymentStatus::as_str)))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.find_order(id).await
    }

    async fn insert_commission(&self, commission: &Commission) -> AppResult<bool> {
        let active = CommissionActive {
            id: Set(commission.id),
            seller_id: Set(commission.seller_id),
            order_id: Set(commission.order_id),
            rate: Set(commission.rate),
            base_amount: Set(commission.base_amount),
            amount: Set(commission.amount),
            created_at: Set(commission.created_at.into()),
        };

        let inserted = Commissions::insert(active)
            .on_conflict(
                OnConflict::columns([CommissionCol::SellerId, CommissionCol::OrderId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await;

        match inserted {
            Ok(rows) => Ok(rows > 0),
            Err(DbErr::RecordNotInserted) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn commissions(&self, order_id: Uuid) -> AppResult<Vec<Commission>> {
        Ok(Commissions::find()
            .filter(CommissionCol::OrderId.eq(order_id))
            .order_by_asc(CommissionCol::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(commission_from_entity)
            .collect())
    }
}

fn parse_column<T: std::str::FromStr<Err = String>>(value: &str) -> AppResult<T> {
    value
        .parse::<T>()
        .map_err(|err| AppError::Internal(anyhow::anyhow!(err)))
}

pub(crate) fn product_from_entity(model: ProductModel) -> AppResult<Product> {
    Ok(Product {
        id: model.id,
        name: model.name,
        price: model.price,
        discount_price: model.discount_price,
        discount_until: model.discount_until.map(|dt| dt.with_timezone(&Utc)),
        stock: to_u32(model.stock)?,
        seller_id: model.seller_id,
        is_active: model.is_active,
    })
}

fn seller_from_entity(model: SellerModel) -> Seller {
    Seller {
        id: model.id,
        name: model.name,
        commission_rate: model.commission_rate,
    }
}

fn promo_from_entity(model: PromoModel) -> AppResult<PromoCode> {
    Ok(PromoCode {
        code: model.code,
        kind: parse_column(&model.discount_kind)?,
        value: model.discount_value,
        min_order_amount: model.min_order_amount,
        valid_from: model.valid_from.with_timezone(&Utc),
        valid_until: model.valid_until.with_timezone(&Utc),
        max_uses: model.max_uses.map(to_u32).transpose()?,
        used_count: to_u32(model.used_count)?,
        is_active: model.is_active,
    })
}

fn order_from_entity(model: OrderModel) -> AppResult<Order> {
    Ok(Order {
        id: model.id,
        user_id: model.user_id,
        invoice_number: model.invoice_number,
        status: parse_column(&model.status)?,
        payment_status: parse_column(&model.payment_status)?,
        subtotal: model.subtotal,
        shipping_cost: model.shipping_cost,
        discount_amount: model.discount_amount,
        grand_total: model.grand_total,
        promo_code: model.promo_code,
        shipping_address: model.shipping_address,
        paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
        cancelled_at: model.cancelled_at.map(|dt| dt.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn order_line_from_entity(model: OrderItemModel) -> AppResult<OrderLine> {
    Ok(OrderLine {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        product_name: model.product_name,
        seller_id: model.seller_id,
        unit_price: model.unit_price,
        quantity: to_u32(model.quantity)?,
        line_total: model.line_total,
    })
}

fn commission_from_entity(model: CommissionModel) -> Commission {
    Commission {
        id: model.id,
        seller_id: model.seller_id,
        order_id: model.order_id,
        rate: model.rate,
        base_amount: model.base_amount,
        amount: model.amount,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
