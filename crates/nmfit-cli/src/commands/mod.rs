pub mod analyze;
pub mod fit;
