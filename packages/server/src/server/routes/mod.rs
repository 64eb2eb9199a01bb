// HTTP routes
pub mod health;
pub mod smart_media;

pub use health::*;
pub use smart_media::*;
