// Core modules implementing storage, key encoding, tables, and error modeling.
pub mod codec;
pub mod error;
pub mod frame;
pub mod keys;
pub mod log_store;
pub mod store;
pub mod table;
pub mod time_series;
pub mod value;
