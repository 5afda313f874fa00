pub mod audit_logs;
pub mod cart_items;
pub mod commissions;
pub mod order_items;
pub mod orders;
pub mod products;
pub mod promo_codes;
pub mod sellers;
pub mod stock_reservations;

pub use audit_logs::Entity as AuditLogs;
pub use cart_items::Entity as CartItems;
pub use commissions::Entity as Commissions;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use products::Entity as Products;
pub use promo_codes::Entity as PromoCodes;
pub use sellers::Entity as Sellers;
pub use stock_reservations::Entity as StockReservations;
