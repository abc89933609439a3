pub mod allowance_period;
pub mod expense;
pub mod postgres_repository;
pub mod session;
pub mod user;
pub mod weekly_period;
