pub mod context;
pub mod delegate;
pub mod engine;
pub mod testing;
pub mod tool;
pub mod worklog;

pub use context::*;
pub use delegate::*;
pub use engine::*;
pub use tool::*;
pub use worklog::*;
