pub mod analyze;
pub mod refine;
