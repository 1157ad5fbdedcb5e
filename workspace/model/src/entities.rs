//! This file serves as the root for all SeaORM entity modules.
//! We define the data models for the vehicle-detection gallery here:
//! users, uploaded image entries, and the per-admin viewed relation.

pub mod image_entry;
pub mod user;
pub mod viewed_image;

// The viewed_images join table gives SeaORM the many-to-many link
// between users and image entries.
pub mod prelude {
    //! A prelude module for easy importing of all entities.
    pub use super::image_entry::Entity as ImageEntry;
    pub use super::user::Entity as User;
    pub use super::viewed_image::Entity as ViewedImage;
}
