pub mod auth;
pub mod bookings;
pub mod calls;
pub mod error;
pub mod normalize;
pub mod qualification;
pub mod tools;
