pub mod config;
pub mod logging;

pub mod clock;
pub mod error;
pub mod fetch_head;
pub mod manager;
pub mod scheduler;
pub mod segmenter;
pub mod source;
pub mod task;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
