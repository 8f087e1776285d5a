mod args;
mod config;
mod range_source;
mod scanner;
mod sink;
#[cfg(test)]
mod tests;
mod unchained_runner;

pub use args::{Args, Command};
pub use config::{Config, IndexConfig, ScanConfig, SinkConfig};
pub use range_source::{FsRangeSource, RangeSource};
pub use scanner::Scanner;
pub use sink::{AppearanceSink, JsonLinesSink};
pub use unchained_runner::UnchainedRunner;
