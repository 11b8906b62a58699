pub mod cache;
pub mod db;
pub mod storage;
pub mod store;
