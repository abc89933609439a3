pub mod allowance;
pub mod cron;
pub mod dashboard;
pub mod error;
pub mod expense;
pub mod health;
pub mod user;
pub mod weekly_period;
