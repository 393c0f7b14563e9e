pub mod actor;
pub mod response;

pub use actor::{actor_middleware, Actor};
pub use response::{ApiResponse, ApiResult};
