// Library exports for richdoc

pub mod config;
pub mod draw_context;
pub mod error;
#[cfg(feature = "fltk")]
pub mod fltk_draw_context;
pub mod richtext;
