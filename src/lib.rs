//! # LeafDisease
//!
//! Plant leaf disease classification with a pretrained EfficientNet-B2,
//! built on the Burn framework.
//!
//! One colour image goes in; a probability for every one of the 38
//! PlantVillage classes comes out, together with the time the prediction
//! took.
//!
//! ## Modules
//!
//! - `classes`: the fixed, ordered class registry
//! - `model`: EfficientNet architecture and weight loading
//! - `inference`: preprocessing, forward pass, results and timing
//! - `config`: TOML configuration for the predictor
//! - `utils`: errors, logging and formatting helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use leaf_disease::backend::{default_device, DefaultBackend};
//! use leaf_disease::{Predictor, PredictorConfig};
//!
//! let config = PredictorConfig::with_weights("effnetb2_feature_extractor.pth");
//! let predictor = Predictor::<DefaultBackend>::load(&config, default_device())?;
//!
//! let image = image::open("leaf.jpg")?;
//! let result = predictor.predict(&image)?;
//! for entry in result.top_k(3) {
//!     println!("{}: {:.3}", entry.label, entry.probability);
//! }
//! ```

pub mod backend;
pub mod classes;
pub mod config;
pub mod inference;
pub mod model;
pub mod utils;

// Re-export commonly used items for convenience
pub use classes::{ClassLabel, ClassRegistry, CLASS_NAMES, NUM_CLASSES};
pub use config::PredictorConfig;
pub use inference::{ClassProbability, PredictionResult, Predictor, Preprocessor};
pub use model::{EfficientNetConfig, ModelLoader, ModelState, WeightsFormat};
pub use utils::error::{
    InferenceError, LeafDiseaseError, LoadError, PreprocessError, Result,
};

/// Display title of the classifier
pub const APP_TITLE: &str = "LeafDisease v0.1";

/// One-line description of the model
pub const APP_DESCRIPTION: &str =
    "An EfficientNetB2 feature extractor trained on the PlantVillage dataset";

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
