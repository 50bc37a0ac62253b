pub mod media;
pub mod stages;
