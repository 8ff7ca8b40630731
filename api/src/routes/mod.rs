pub mod bookings;
pub mod health;
pub mod tools;
pub mod webhooks;
