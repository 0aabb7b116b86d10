pub mod client;

pub use client::MetadataClient;
