//! Polygon.io REST implementation of [`OptionsDataProvider`](crate::providers::OptionsDataProvider).

pub mod params;
pub mod provider;
pub mod response;

pub use provider::{PolygonProvider, PolygonSettings};
