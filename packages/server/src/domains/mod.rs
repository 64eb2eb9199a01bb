// Business domains
pub mod smart_media;
pub mod templates;
