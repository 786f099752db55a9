pub mod catalog;
pub mod config;
pub mod embed;
pub mod recommend;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;
