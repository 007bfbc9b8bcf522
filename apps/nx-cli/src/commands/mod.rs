pub mod audit;
pub mod request;
pub mod serve;
