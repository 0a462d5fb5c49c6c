pub mod cast;
pub mod count;
pub mod filter;
pub mod limit;
pub mod projection;
pub mod rename;
pub mod schema;
pub mod set;
