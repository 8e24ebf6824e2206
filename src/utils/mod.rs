//! Utilities: error types, logging setup and small formatting helpers

pub mod error;
pub mod logging;

pub use error::{
    ConfigError, InferenceError, LeafDiseaseError, LoadError, PreprocessError, Result,
};
pub use logging::{init_logging, LogConfig, LogLevel};

/// Format a duration given in seconds, picking a readable unit
pub fn format_latency(seconds: f64) -> String {
    if seconds < 1e-3 {
        format!("{:.1} µs", seconds * 1e6)
    } else if seconds < 1.0 {
        format!("{:.2} ms", seconds * 1e3)
    } else {
        format!("{:.3} s", seconds)
    }
}

/// Format a probability as a percentage with a fixed-width bar
pub fn format_probability_bar(probability: f64, width: usize) -> String {
    let filled = (probability.clamp(0.0, 1.0) * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);

    format!(
        "[{}{}] {:5.1}%",
        "█".repeat(filled),
        "░".repeat(empty),
        probability * 100.0
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_latency() {
        assert_eq!(format_latency(0.0000125), "12.5 µs");
        assert_eq!(format_latency(0.01234), "12.34 ms");
        assert_eq!(format_latency(2.5), "2.500 s");
    }

    #[test]
    fn test_format_probability_bar() {
        let bar = format_probability_bar(0.5, 10);
        assert!(bar.contains("50.0%"));
        assert!(bar.contains("█████░░░░░"));
    }
}
