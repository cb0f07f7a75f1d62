//! Type aliases for shared state.
//!
//! ## Modules
//!
//! - [`aliases`]: `Arc<Mutex<T>>` / `Arc<RwLock<T>>` shorthands and constructors.

pub mod aliases;

pub use aliases::*;
