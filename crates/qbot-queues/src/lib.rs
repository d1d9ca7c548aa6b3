pub mod commit;
pub mod common;
pub mod feeder;
pub mod review;
pub mod style;
pub mod task;
pub mod upload;

pub use commit::*;
pub use common::*;
pub use feeder::*;
pub use review::*;
pub use style::*;
pub use task::*;
pub use upload::*;
