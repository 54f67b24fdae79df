#![forbid(unsafe_code)]

mod delta;
mod entity_type;
mod ids;
mod types;

pub use delta::*;
pub use entity_type::*;
pub use ids::*;
pub use types::*;
