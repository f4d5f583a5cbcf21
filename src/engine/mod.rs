pub mod capacity;
pub mod lifecycle;
pub mod scope;
