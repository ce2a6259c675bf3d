pub mod analyzer;
pub mod clients;
pub mod config;
pub mod deserializers;
pub mod error;
pub mod fallback;
pub mod http;
pub mod image;
pub mod parser;
pub mod prompts;
pub mod report;
pub mod schemas;
pub mod sessions;

pub use analyzer::{Analysis, AnalysisSource, ExperimentAnalyzer};
pub use error::{LensError, Result};
pub use schemas::{AnalysisResult, Component, ExperimentDomain, Severity, Step, Warning};
