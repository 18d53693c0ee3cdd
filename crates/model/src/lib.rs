pub mod checkpoint;
pub mod core;
pub mod errors;
pub mod events;
pub mod harvest;
pub mod pagination;
