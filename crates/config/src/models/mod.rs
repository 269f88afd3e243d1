pub mod app_config;
pub mod generation;
pub mod server;

pub use app_config::*;
pub use generation::*;
pub use server::*;
