pub mod client;

pub use client::{ClientConfig, DEFAULT_API_BASE_URL};
