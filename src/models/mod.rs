pub mod chat;
pub mod common;
pub mod image;
pub mod upload;

pub use chat::*;
pub use common::*;
pub use image::*;
pub use upload::*;
