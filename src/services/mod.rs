pub mod cart_service;
pub mod checkout_service;
pub mod commission;
pub mod inventory;
pub mod inventory_pg;
pub mod notification;
pub mod pricing;
pub mod retry;
