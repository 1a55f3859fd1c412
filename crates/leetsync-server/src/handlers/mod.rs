pub mod command;
pub mod health;
pub mod page;
