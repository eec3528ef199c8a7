pub mod connect;
pub mod serve;
