pub mod document_store;
pub mod dynamodb_store;
pub mod errors;
pub mod field_paths;
pub mod memory_store;
