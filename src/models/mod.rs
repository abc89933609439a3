pub mod allowance_period;
pub mod dashboard;
pub mod expense;
pub mod session;
pub mod user;
pub mod weekly_period;
