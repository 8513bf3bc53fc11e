pub mod catalog;
pub mod cli;
pub mod completion;
pub mod lookup;
pub mod model;
pub mod relay;
pub mod search;
pub mod server;
pub mod storage;
pub mod store;
pub mod transcript;

#[cfg(test)]
pub(crate) mod test_support;
