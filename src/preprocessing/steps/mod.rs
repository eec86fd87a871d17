//! Individual pixel transforms used to build preprocessing variants

pub mod contrast;
pub mod denoise;
pub mod equalize;
pub mod normalize;
pub mod sharpen;
pub mod threshold;
