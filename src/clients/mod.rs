pub mod geo_client;

pub use geo_client::*;
