pub mod get_handler;
pub mod delete_handler;
pub mod proxy_handler;

pub use get_handler::*;
pub use delete_handler::*;
pub use proxy_handler::*;