//! # swdec-codec
//!
//! MPEG-2 视频与 Motion JPEG 软件解码器.
//!
//! 所有解码器实现 [`Decoder`] trait, 采用 "送入数据, 取出帧" 的协作式调用:
//! 没有隐式后台线程, 并行只发生在一次调用内部的线程池里.
//!
//! ## 使用示例
//!
//! ```rust
//! use swdec_codec::{CodecId, CodecRegistry, DecoderParams, MediaData};
//!
//! let mut reg = CodecRegistry::new();
//! swdec_codec::register_all(&mut reg);
//!
//! let mut decoder = reg.create_decoder(CodecId::Mjpeg).unwrap();
//! decoder.open(&DecoderParams::new(CodecId::Mjpeg)).unwrap();
//! decoder.send_data(&MediaData::end_of_stream()).unwrap();
//! assert!(decoder.receive_frame().is_err());
//! ```

pub mod codec_id;
pub mod codec_parameters;
pub mod decoder;
pub mod decoders;
pub mod dsp;
pub mod frame;
pub mod media_data;
pub mod registry;

// 重导出常用类型
pub use codec_id::CodecId;
pub use codec_parameters::{DecodeFlags, DecoderParams, JpegScale, MAX_THREADS, SkipLevel};
pub use decoder::Decoder;
pub use frame::{PictureType, VideoFrame};
pub use media_data::MediaData;
pub use registry::CodecRegistry;

/// 注册所有内置解码器
pub fn register_all(registry: &mut CodecRegistry) {
    decoders::register_all_decoders(registry);
}
