pub mod landmark;
pub mod measure;

pub use landmark::{BodyPart, Landmark, LandmarkSet};
pub use measure::{BodyMeasurement, MeasurementExtractor, REQUIRED_PARTS};
