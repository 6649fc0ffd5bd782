pub mod http;
pub mod repository;
