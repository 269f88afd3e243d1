pub mod generations;
pub mod health;
pub mod models;
pub mod router;
