pub mod fs;
pub mod memory;
pub mod traits;
pub mod validator;

pub use fs::*;
pub use memory::*;
pub use traits::*;
pub use validator::*;
