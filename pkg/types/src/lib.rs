pub mod config;
pub mod endpoint;
pub mod endpoint_slice;
pub mod meta;
pub mod namespace;
pub mod node;
pub mod pod;
pub mod service;
