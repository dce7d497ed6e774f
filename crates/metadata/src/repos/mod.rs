//! Repository traits for metadata operations.

pub mod allowed_images;
pub mod image_state;
pub mod registry;

pub use allowed_images::AllowedImageRepo;
pub use image_state::ImageStateRepo;
pub use registry::RegistryRepo;
