pub mod cache;
pub mod db;
pub mod gigdb;
pub mod memorydb;
