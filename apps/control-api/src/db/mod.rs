pub mod kv;
pub mod status;
