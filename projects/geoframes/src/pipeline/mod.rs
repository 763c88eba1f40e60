// Geotagging pipeline: metadata extraction, frame splitting, tagging

pub mod events;
pub mod extract;
pub mod geodesy;
pub mod interpolate;
pub mod orchestrator;
pub mod split;
pub mod tagging;
pub mod types;
