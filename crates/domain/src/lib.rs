pub mod entities;
pub mod repositories;
pub mod slug;
pub mod value_objects;

pub use entities::*;
pub use mediagen_errors::{GenerationError, GenerationResult};
pub use repositories::*;
pub use slug::generate_slug;
pub use value_objects::*;
