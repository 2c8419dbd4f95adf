//! Route handlers, one module per resource.

pub mod events;
pub mod health;
pub mod jobs;
pub mod stream;
pub mod uploads;
