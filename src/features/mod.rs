pub mod antibot;
pub mod sink;
