pub mod cache;
pub mod rate_limit;
pub mod session;
