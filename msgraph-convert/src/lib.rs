pub mod auth;
pub mod cli;
pub mod graph;
pub mod load_config;

pub use auth::ClientSecretCredential;
pub use cli::{run, Cli, Commands};
pub use graph::{build_converter, GraphClient, GraphPdfConverter};
