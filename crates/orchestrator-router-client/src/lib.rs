pub mod client;

pub use client::HttpRouterClient;
