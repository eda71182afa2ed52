pub mod dispatch;
pub mod executor;
pub mod extract;
pub mod load_more;
pub mod partition;
