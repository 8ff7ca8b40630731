pub mod agent;
pub mod booking;
pub mod call;
pub mod health;
pub mod lead;
pub mod org;
