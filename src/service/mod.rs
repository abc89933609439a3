pub mod accounting;
pub mod budget;
pub mod history;
