pub mod kv;
pub mod relay_log;
