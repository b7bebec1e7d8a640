pub mod hydrate;
pub mod patch;
pub mod path;
pub mod reorder;
pub mod session;
pub mod submit;
pub mod tree_store;
pub mod validation;
