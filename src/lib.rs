//! # swdec
//!
//! 纯 Rust 实现的 MPEG-2 视频与 JPEG / Motion JPEG 软件解码器.
//!
//! - **MPEG-2**: 序列/GOP/图像头解析, 帧内与运动补偿解码, 显示重排, 跳帧
//! - **JPEG**: 基线, 扩展, 渐进与无损处理, 1/2, 1/4, 1/8 缩放输出, 多种色彩格式
//! - **配置**: JSON 配置文件 ([`config::DecoderConfig`])
//! - **日志**: 控制台 + 按天切换的日志文件 ([`logging::init`])
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use swdec::codec::{CodecId, DecoderParams, MediaData};
//!
//! let registry = swdec::default_codec_registry();
//! let mut decoder = registry.create_decoder(CodecId::Mjpeg).unwrap();
//! decoder.open(&DecoderParams::new(CodecId::Mjpeg)).unwrap();
//! let jpeg = std::fs::read("picture.jpg").unwrap();
//! decoder.send_data(&MediaData::from_data(jpeg)).unwrap();
//! decoder.send_data(&MediaData::end_of_stream()).unwrap();
//! while let Ok(frame) = decoder.receive_frame() {
//!     println!("{}x{} {}", frame.width, frame.height, frame.pixel_format);
//! }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `swdec-core` | 错误类型, 位读写, 像素格式, 有理数 |
//! | `swdec-codec` | 解码器框架与 MPEG-2 / MJPEG 解码器 |

/// 核心类型与工具
pub use swdec_core as core;

/// 解码器框架
pub use swdec_codec as codec;

pub mod config;
pub mod logging;

/// 获取 swdec 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 创建已注册所有内置解码器的注册表
pub fn default_codec_registry() -> swdec_codec::CodecRegistry {
    let mut registry = swdec_codec::CodecRegistry::new();
    swdec_codec::register_all(&mut registry);
    registry
}
