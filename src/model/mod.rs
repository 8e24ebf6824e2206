//! Model module: the EfficientNet architecture and weight loading
//!
//! ## Architecture
//!
//! EfficientNet-B2 used as a frozen feature extractor with a 38-way
//! classifier head for PlantVillage disease classes. Only inference is
//! supported; weights come from a pretrained artifact.

pub mod config;
pub mod efficientnet;
pub mod loader;

// Re-export main types for convenience
pub use config::EfficientNetConfig;
pub use efficientnet::EfficientNet;
pub use loader::{load, ModelLoader, ModelState, WeightsFormat};
