pub mod aggregate;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod harvest;
pub mod metrics;
pub mod pacing;
pub mod retry;
pub mod window;

#[cfg(test)]
pub(crate) mod test_support;
