pub mod cli;
pub mod github;
pub mod load_config;
pub mod notify;
pub mod s3;
pub mod store;

pub use cli::{run, Cli, Commands};
