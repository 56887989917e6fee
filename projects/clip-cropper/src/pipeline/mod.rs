// Clip window cropping pipeline stages

pub mod crop;
pub mod detection;
pub mod encode;
pub mod geometry;
pub mod orchestrator;
pub mod reader;
pub mod refine;
pub mod types;
