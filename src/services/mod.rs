//! Business logic. Each service owns an `Arc<DatabaseConnection>`; functions
//! that must join a caller's transaction are free functions generic over
//! `ConnectionTrait`.

pub mod cart;
pub mod catalog;
pub mod customers;
pub mod invoicing;
pub mod orders;
pub mod payments;

#[cfg(test)]
pub(crate) mod test_support;
