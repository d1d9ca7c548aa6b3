pub mod error;
pub mod ids;
pub mod model;
pub mod script_error;
pub mod status;

pub use error::*;
pub use ids::*;
pub use model::*;
pub use script_error::*;
pub use status::*;
