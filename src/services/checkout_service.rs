//! Cart to order conversion and the order state machine.
//!
//! There is no transaction spanning the cart, inventory and order stores, so
//! checkout compensates instead: every step that fails undoes the steps
//! before it (releases reservations, hands back the promo redemption) before
//! the error is returned.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    dto::orders::CheckoutRequest,
    error::{AppError, AppResult},
    models::{
        CartOwner, Commission, Order, OrderLine, OrderStatus, OrderWithLines, PaymentStatus,
        Product, PromoCode,
    },
    repository::{Catalog, OrderStore},
    services::{
        cart_service::CartStore,
        commission::CommissionCalculator,
        inventory::{InventoryLedger, ReservationToken},
        notification::{NotificationDispatcher, OrderEvent, dispatch},
        pricing::{PricingEngine, PricingInput},
        retry::retry_transient,
    },
};

#[derive(Clone)]
pub struct CheckoutService {
    carts: Arc<CartStore>,
    catalog: Arc<dyn Catalog>,
    inventory: Arc<dyn InventoryLedger>,
    orders: Arc<dyn OrderStore>,
    pricing: PricingEngine,
    commissions: CommissionCalculator,
    notifier: Arc<dyn NotificationDispatcher>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

/// Marks a user as checking out until dropped.
struct InFlightGuard {
    users: Arc<Mutex<HashSet<Uuid>>>,
    user_id: Uuid,
}

impl InFlightGuard {
    fn acquire(users: &Arc<Mutex<HashSet<Uuid>>>, user_id: Uuid) -> AppResult<Self> {
        let mut set = users.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(user_id) {
            return Err(AppError::CheckoutInProgress);
        }
        Ok(Self {
            users: users.clone(),
            user_id,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.user_id);
    }
}

impl CheckoutService {
    pub fn new(
        carts: Arc<CartStore>,
        catalog: Arc<dyn Catalog>,
        inventory: Arc<dyn InventoryLedger>,
        orders: Arc<dyn OrderStore>,
        pricing: PricingEngine,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            commissions: CommissionCalculator::new(catalog.clone()),
            carts,
            catalog,
            inventory,
            orders,
            pricing,
            notifier,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Turns the user's cart into a pending order.
    pub async fn checkout(&self, user_id: Uuid, request: CheckoutRequest) -> AppResult<OrderWithLines> {
        let shipping_address = request.shipping_address.trim().to_string();
        if shipping_address.is_empty() {
            return Err(AppError::BadRequest("shipping_address is required".into()));
        }

        let _guard = InFlightGuard::acquire(&self.in_flight, user_id)?;
        let owner = CartOwner::User(user_id);
        let now = Utc::now();

        let cart_lines = retry_transient("load cart", || self.carts.get_lines(&owner)).await?;
        if cart_lines.is_empty() {
            return Err(AppError::EmptyCart);
        }

        let ids: Vec<Uuid> = cart_lines.iter().map(|line| line.product_id).collect();
        let products: HashMap<Uuid, Product> =
            retry_transient("load products", || self.catalog.products(&ids))
                .await?
                .into_iter()
                .map(|product| (product.id, product))
                .collect();

        let mut inputs = Vec::with_capacity(cart_lines.len());
        for line in &cart_lines {
            let product = products
                .get(&line.product_id)
                .filter(|product| product.is_active)
                .ok_or(AppError::ProductUnavailable {
                    product_id: line.product_id,
                })?;
            inputs.push(PricingInput {
                product,
                quantity: line.quantity,
            });
        }

        let promo = match request
            .promo_code
            .as_deref()
            .map(PromoCode::normalize)
            .filter(|code| !code.is_empty())
        {
            Some(code) => Some(
                retry_transient("load promo code", || self.catalog.promo_code(&code))
                    .await?
                    .ok_or_else(|| AppError::InvalidPromoCode(code.clone()))?,
            ),
            None => None,
        };

        let priced = self.pricing.price_cart(&inputs, promo.as_ref(), now)?;

        let mut tokens: Vec<ReservationToken> = Vec::with_capacity(inputs.len());
        for input in &inputs {
            let reserved = retry_transient("reserve stock", || {
                self.inventory.reserve(input.product.id, input.quantity)
            })
            .await;
            match reserved {
                Ok(token) => tokens.push(token),
                Err(err) => {
                    self.release_held(&tokens).await;
                    tracing::info!(%user_id, product_id = %input.product.id, error = %err, "checkout reservation failed");
                    return Err(err);
                }
            }
        }

        if let Some(promo) = &promo {
            match retry_transient("redeem promo code", || self.catalog.redeem_promo_code(&promo.code)).await {
                Ok(true) => {}
                Ok(false) => {
                    self.release_held(&tokens).await;
                    return Err(AppError::InvalidPromoCode(promo.code.clone()));
                }
                Err(err) => {
                    self.release_held(&tokens).await;
                    return Err(err);
                }
            }
        }
        let promo_code = promo.map(|promo| promo.code);

        let order_id = Uuid::new_v4();
        let order = Order {
            id: order_id,
            user_id,
            invoice_number: build_invoice_number(order_id, now),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            subtotal: priced.subtotal,
            shipping_cost: priced.shipping_cost,
            discount_amount: priced.discount_amount,
            grand_total: priced.grand_total,
            promo_code: promo_code.clone(),
            shipping_address,
            paid_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };
        let lines: Vec<OrderLine> = priced
            .lines
            .iter()
            .zip(&inputs)
            .map(|(line, input)| OrderLine {
                // Time-ordered so storage can return lines in checkout order.
                id: Uuid::now_v7(),
                order_id,
                product_id: line.product_id,
                product_name: input.product.name.clone(),
                seller_id: input.product.seller_id,
                unit_price: line.unit_price,
                quantity: line.quantity,
                line_total: line.line_total,
            })
            .collect();

        if let Err(err) = retry_transient("persist order", || self.orders.insert(&order, &lines)).await {
            self.release_held(&tokens).await;
            self.release_promo(promo_code.as_deref()).await;
            return Err(err);
        }

        for (index, token) in tokens.iter().enumerate() {
            if let Err(err) = retry_transient("commit reservation", || self.inventory.commit(token)).await {
                tracing::error!(%order_id, reservation_id = %token.id, error = %err, "commit failed, rolling order back");
                self.abort_persisted(&order, &tokens[..index], &tokens[index..]).await;
                self.release_promo(promo_code.as_deref()).await;
                return Err(err);
            }
        }

        if let Err(err) = self.carts.clear(&owner).await {
            tracing::warn!(%order_id, %user_id, error = %err, "cart not cleared after checkout");
        }

        tracing::info!(%order_id, %user_id, grand_total = %order.grand_total, "order created");
        dispatch(self.notifier.clone(), OrderEvent::OrderCreated, order.clone());

        Ok(OrderWithLines { order, lines })
    }

    /// Applies a payment report from the gateway.
    pub async fn record_payment(&self, order_id: Uuid, status: PaymentStatus) -> AppResult<OrderWithLines> {
        match status {
            PaymentStatus::Paid => self.confirm_payment(order_id).await,
            PaymentStatus::Failed => {
                let current = self.order(order_id).await?;
                if current.order.payment_status == PaymentStatus::Paid {
                    return Err(AppError::BadRequest("order is already paid".into()));
                }
                let updated = self
                    .orders
                    .set_payment_status(
                        order_id,
                        &[PaymentStatus::Unpaid, PaymentStatus::Failed],
                        PaymentStatus::Failed,
                        Utc::now(),
                    )
                    .await?
                    .ok_or_else(|| AppError::BadRequest("order is already paid".into()))?;
                tracing::info!(%order_id, "payment failed");
                Ok(OrderWithLines {
                    order: updated,
                    lines: current.lines,
                })
            }
            PaymentStatus::Unpaid => Err(AppError::BadRequest(
                "payment status must be paid or failed".into(),
            )),
        }
    }

    async fn confirm_payment(&self, order_id: Uuid) -> AppResult<OrderWithLines> {
        let current = self.order(order_id).await?;

        if current.order.payment_status == PaymentStatus::Paid {
            if current.order.status == OrderStatus::Pending {
                // An earlier report stored the payment but never confirmed.
                tracing::warn!(%order_id, "paid order still pending, confirming");
                return match self.confirm(order_id).await {
                    Err(AppError::InvalidTransition {
                        from: OrderStatus::Confirmed,
                        ..
                    }) => self.order(order_id).await,
                    result => result,
                };
            }
            tracing::info!(%order_id, "duplicate paid report");
            self.record_commissions(&current.order, &current.lines).await;
            return Ok(current);
        }
        if current.order.status != OrderStatus::Pending {
            return Err(AppError::InvalidTransition {
                from: current.order.status,
                to: OrderStatus::Confirmed,
            });
        }

        let paid = self
            .orders
            .set_payment_status(
                order_id,
                &[PaymentStatus::Unpaid, PaymentStatus::Failed],
                PaymentStatus::Paid,
                Utc::now(),
            )
            .await?;
        if paid.is_none() {
            // Another report got here first and owns the confirmation.
            return self.order(order_id).await;
        }

        self.confirm(order_id).await
    }

    /// Moves a pending order to confirmed and records its commissions.
    async fn confirm(&self, order_id: Uuid) -> AppResult<OrderWithLines> {
        let order = self
            .move_order(order_id, OrderStatus::Pending, OrderStatus::Confirmed)
            .await?;
        let lines = self.order(order_id).await?.lines;

        self.record_commissions(&order, &lines).await;
        tracing::info!(%order_id, "order confirmed");
        dispatch(self.notifier.clone(), OrderEvent::OrderConfirmed, order.clone());

        Ok(OrderWithLines { order, lines })
    }

    /// Admin-driven status change.
    pub async fn transition(&self, order_id: Uuid, to: OrderStatus) -> AppResult<OrderWithLines> {
        let current = self.order(order_id).await?;
        let from = current.order.status;
        if !from.can_transition_to(to) {
            return Err(AppError::InvalidTransition { from, to });
        }

        match to {
            OrderStatus::Confirmed => self.confirm(order_id).await,
            OrderStatus::Cancelled => self.cancel(order_id).await,
            _ => {
                let order = self.move_order(order_id, from, to).await?;
                tracing::info!(%order_id, %from, %to, "order status changed");
                if to == OrderStatus::Shipped {
                    dispatch(self.notifier.clone(), OrderEvent::OrderShipped, order.clone());
                }
                Ok(OrderWithLines {
                    order,
                    lines: current.lines,
                })
            }
        }
    }

    /// Cancels the order and puts every line's quantity back into stock.
    pub async fn cancel(&self, order_id: Uuid) -> AppResult<OrderWithLines> {
        let current = self.order(order_id).await?;
        let from = current.order.status;
        if !from.can_transition_to(OrderStatus::Cancelled) {
            return Err(AppError::InvalidTransition {
                from,
                to: OrderStatus::Cancelled,
            });
        }

        let order = self.move_order(order_id, from, OrderStatus::Cancelled).await?;

        for line in &current.lines {
            let restocked = retry_transient("restock", || {
                self.inventory.restock(line.product_id, line.quantity)
            })
            .await;
            if let Err(err) = restocked {
                tracing::error!(%order_id, product_id = %line.product_id, quantity = line.quantity, error = %err, "restock failed");
            }
        }

        tracing::info!(%order_id, %from, "order cancelled");
        dispatch(self.notifier.clone(), OrderEvent::OrderCancelled, order.clone());

        Ok(OrderWithLines {
            order,
            lines: current.lines,
        })
    }

    /// Writes any commission the order should have but does not. Existing
    /// rows are never touched.
    pub async fn repair_commissions(&self, order_id: Uuid) -> AppResult<Vec<Commission>> {
        let current = self.order(order_id).await?;
        let eligible = current.order.payment_status == PaymentStatus::Paid
            || matches!(
                current.order.status,
                OrderStatus::Confirmed | OrderStatus::Processing | OrderStatus::Shipped | OrderStatus::Delivered
            );
        if !eligible {
            return Err(AppError::BadRequest(
                "commissions are only owed on confirmed orders".into(),
            ));
        }

        let computed = self.commissions.compute(&current.order, &current.lines).await?;
        for commission in &computed {
            self.orders.insert_commission(commission).await?;
        }
        self.orders.commissions(order_id).await
    }

    pub async fn order(&self, order_id: Uuid) -> AppResult<OrderWithLines> {
        self.orders.get(order_id).await?.ok_or(AppError::NotFound)
    }

    pub async fn list_orders(
        &self,
        user_id: Uuid,
        status: Option<OrderStatus>,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<Order>, u64)> {
        self.orders.list_for_user(user_id, status, limit, offset).await
    }

    pub async fn commissions(&self, order_id: Uuid) -> AppResult<Vec<Commission>> {
        self.order(order_id).await?;
        self.orders.commissions(order_id).await
    }

    /// Compare-and-set on the order status. A lost race reports the status
    /// the order actually moved to.
    async fn move_order(&self, order_id: Uuid, from: OrderStatus, to: OrderStatus) -> AppResult<Order> {
        let moved = retry_transient("order transition", || {
            self.orders.transition(order_id, from, to, Utc::now())
        })
        .await?;
        if let Some(order) = moved {
            return Ok(order);
        }
        let latest = self.order(order_id).await?;
        Err(AppError::InvalidTransition {
            from: latest.order.status,
            to,
        })
    }

    /// Commission failures never fail the transition that triggered them.
    async fn record_commissions(&self, order: &Order, lines: &[OrderLine]) {
        let computed = match self.commissions.compute(order, lines).await {
            Ok(computed) => computed,
            Err(err) => {
                tracing::warn!(order_id = %order.id, error = %err, "commission computation failed");
                return;
            }
        };

        let mut written = 0;
        for commission in &computed {
            match self.orders.insert_commission(commission).await {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(err) => tracing::warn!(
                    order_id = %order.id,
                    seller_id = %commission.seller_id,
                    error = %err,
                    "commission not recorded"
                ),
            }
        }
        if written > 0 {
            tracing::info!(order_id = %order.id, count = written, "commissions recorded");
        }
    }

    async fn release_held(&self, tokens: &[ReservationToken]) {
        for token in tokens {
            if let Err(err) = self.inventory.release(token).await {
                tracing::error!(reservation_id = %token.id, product_id = %token.product_id, error = %err, "reservation release failed");
            }
        }
    }

    async fn release_promo(&self, code: Option<&str>) {
        let Some(code) = code else {
            return;
        };
        if let Err(err) = self.catalog.release_promo_code(code).await {
            tracing::error!(promo_code = code, error = %err, "promo redemption not released");
        }
    }

    /// Undoes an order that was stored but whose stock could not be committed.
    async fn abort_persisted(&self, order: &Order, committed: &[ReservationToken], pending: &[ReservationToken]) {
        let cancelled = retry_transient("cancel aborted order", || {
            self.orders
                .transition(order.id, OrderStatus::Pending, OrderStatus::Cancelled, Utc::now())
        })
        .await;
        if let Err(err) = cancelled {
            tracing::error!(order_id = %order.id, error = %err, "failed to cancel aborted order");
        }

        for token in pending {
            match self.inventory.release(token).await {
                Ok(()) | Err(AppError::InvalidTokenState(_)) => {}
                Err(err) => tracing::error!(reservation_id = %token.id, error = %err, "reservation release failed"),
            }
        }
        for token in committed {
            if let Err(err) = self.inventory.restock(token.product_id, token.quantity).await {
                tracing::error!(reservation_id = %token.id, error = %err, "restock failed");
            }
        }
    }
}

fn build_invoice_number(order_id: Uuid, at: DateTime<Utc>) -> String {
    let id = order_id.simple().to_string();
    format!("INV-{}-{}", at.format("%Y%m%d"), &id[..8])
}
