//! JSON 形式的解码器配置
//!
//! ```json
//! {
//!     "codec": "mjpeg",
//!     "threads": 4,
//!     "jpeg_scale": 2,
//!     "output_format": "rgb24",
//!     "frame_rate": "30000/1001"
//! }
//! ```
//!
//! 省略的字段取默认值. 未知字段, 未知的编解码器名与越界数值都是
//! `InvalidArgument`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use swdec_codec::{CodecId, DecodeFlags, DecoderParams, JpegScale, MAX_THREADS, SkipLevel};
use swdec_core::{PixelFormat, Rational, SwdecError, SwdecResult};

use crate::logging::LoggingConfig;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecoderConfig {
    /// 编解码器名: "mpeg2video" / "mjpeg" 及其别名
    pub codec: String,
    /// 工作线程数, 1..=8
    pub threads: usize,
    /// 按显示顺序输出
    pub reorder: bool,
    /// 按 repeat_first_field 推算时间戳
    pub telecine_pts: bool,
    /// 0 不跳过, 1 跳过 B, 2 跳过 P 和 B, 3 全部跳过
    pub skip_level: i32,
    /// 8 或 16
    pub output_bit_depth: u8,
    /// JPEG 缩放分母: 1, 2, 4, 8
    pub jpeg_scale: u32,
    /// 像素格式名, 如 "yuv420p", "rgb24"
    pub output_format: Option<String>,
    /// "25" 或 "30000/1001"
    pub frame_rate: Option<String>,
    /// 显示宽高比, 如 "16/9"
    pub aspect_ratio: Option<String>,
    pub width: u32,
    pub height: u32,
    pub logging: Option<LoggingConfig>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            codec: "mpeg2video".into(),
            threads: 1,
            reorder: true,
            telecine_pts: false,
            skip_level: 0,
            output_bit_depth: 8,
            jpeg_scale: 1,
            output_format: None,
            frame_rate: None,
            aspect_ratio: None,
            width: 0,
            height: 0,
            logging: None,
        }
    }
}

impl DecoderConfig {
    pub fn from_json_str(text: &str) -> SwdecResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| SwdecError::InvalidArgument(format!("解析解码器配置失败: {e}")))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> SwdecResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SwdecError::InvalidArgument(format!("读取配置文件 {} 失败: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> SwdecResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SwdecError::Internal(format!("序列化解码器配置失败: {e}")))
    }

    /// 转换为解码器参数并检查取值范围
    pub fn to_params(&self) -> SwdecResult<DecoderParams> {
        let codec_id = CodecId::from_name(&self.codec).ok_or_else(|| {
            SwdecError::InvalidArgument(format!("未知的编解码器: {}", self.codec))
        })?;
        let mut params = DecoderParams::new(codec_id);

        if !(1..=MAX_THREADS).contains(&self.threads) {
            return Err(SwdecError::InvalidArgument(format!(
                "线程数必须在 1..={MAX_THREADS} 之间, 实际为 {}",
                self.threads
            )));
        }
        params.max_threads = self.threads;

        let mut flags = DecodeFlags::empty();
        flags.set(DecodeFlags::REORDER, self.reorder);
        flags.set(DecodeFlags::TELECINE_PTS, self.telecine_pts);
        params.flags = flags;

        if !(SkipLevel::None.level()..=SkipLevel::All.level()).contains(&self.skip_level) {
            return Err(SwdecError::InvalidArgument(format!(
                "跳帧等级 {} 越界",
                self.skip_level
            )));
        }
        params.skip_level = SkipLevel::from_level(self.skip_level);
        params.output_bit_depth = self.output_bit_depth;
        params.jpeg_scale = JpegScale::from_denominator(self.jpeg_scale)?;
        params.output_format = self
            .output_format
            .as_deref()
            .map(|name| {
                PixelFormat::from_name(name).ok_or_else(|| {
                    SwdecError::InvalidArgument(format!("未知的像素格式: {name}"))
                })
            })
            .transpose()?;
        params.frame_rate = self.frame_rate.as_deref().map(parse_rational).transpose()?;
        params.aspect_ratio = self
            .aspect_ratio
            .as_deref()
            .map(parse_rational)
            .transpose()?;
        params.width = self.width;
        params.height = self.height;
        params.validate()?;
        Ok(params)
    }
}

/// 解析 "30000/1001", "16:9" 或 "25" 形式的有理数
pub fn parse_rational(text: &str) -> SwdecResult<Rational> {
    let invalid = || SwdecError::InvalidArgument(format!("无效的有理数: {text}"));
    let text = text.trim();
    let value = match text.find(['/', ':']) {
        Some(pos) => {
            let num: i32 = text[..pos].trim().parse().map_err(|_| invalid())?;
            let den: i32 = text[pos + 1..].trim().parse().map_err(|_| invalid())?;
            Rational::new(num, den)
        }
        None => {
            let value: f64 = text.parse().map_err(|_| invalid())?;
            if value.fract() == 0.0 {
                Rational::new(value as i32, 1)
            } else {
                Rational::new((value * 1000.0).round() as i32, 1000).reduce()
            }
        }
    };
    if !value.is_valid() {
        return Err(invalid());
    }
    Ok(value)
}
