pub mod config;
pub mod context;
pub mod decode;
pub mod emit;
pub mod error;
pub mod lease;
pub mod pipeline;
pub mod source;
pub mod storage;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;
