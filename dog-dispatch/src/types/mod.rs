pub mod ids;
pub mod kind;
pub mod events;

pub use ids::{TaskId, DispatchKey};
pub use kind::GenerationKind;
pub use events::DispatchEvent;
