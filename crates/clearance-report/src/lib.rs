pub mod html;
pub mod stages;
pub mod text;
