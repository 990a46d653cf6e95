//! # swdec-core
//!
//! 软件解码器核心库, 提供错误分类、比特流游标、像素格式与有理数等基础设施.

pub mod bitreader;
pub mod bitwriter;
pub mod error;
pub mod pixel_format;
pub mod rational;

// 重导出常用类型
pub use error::{ErrorKind, SwdecError, SwdecResult};
pub use pixel_format::PixelFormat;
pub use rational::Rational;
