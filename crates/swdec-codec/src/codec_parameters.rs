//! 解码器配置参数.
//!
//! 在 `open` 时提供, 对整条流保持不变 (跳帧级别除外, 可在运行时调整).

use bitflags::bitflags;
use swdec_core::{PixelFormat, Rational, SwdecError, SwdecResult};

use crate::codec_id::CodecId;

/// 工作线程数上限
pub const MAX_THREADS: usize = 8;

bitflags! {
    /// 解码行为标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DecodeFlags: u32 {
        /// 按显示顺序输出 (B 帧重排)
        const REORDER = 0x01;
        /// repeat_first_field 参与帧时长计算 (3:2 下拉)
        const TELECINE_PTS = 0x02;
    }
}

/// 跳帧级别
///
/// 数值越大跳过的图片类型越多.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SkipLevel {
    /// 不跳过
    #[default]
    None = 0,
    /// 跳过 B 帧
    B = 1,
    /// 跳过 P 帧和 B 帧
    PB = 2,
    /// 全部跳过
    All = 3,
}

impl SkipLevel {
    /// 由数值构造, 超出范围时截断到 [None, All]
    pub fn from_level(level: i32) -> Self {
        match level {
            i32::MIN..=0 => Self::None,
            1 => Self::B,
            2 => Self::PB,
            _ => Self::All,
        }
    }

    /// 数值形式
    pub fn level(self) -> i32 {
        self as i32
    }
}

/// JPEG 重建缩放比例
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JpegScale {
    /// 1/1
    #[default]
    Full,
    /// 1/2
    Half,
    /// 1/4
    Quarter,
    /// 1/8
    Eighth,
}

impl JpegScale {
    /// 由分母 (1, 2, 4, 8) 构造
    pub fn from_denominator(den: u32) -> SwdecResult<Self> {
        match den {
            1 => Ok(Self::Full),
            2 => Ok(Self::Half),
            4 => Ok(Self::Quarter),
            8 => Ok(Self::Eighth),
            _ => Err(SwdecError::InvalidArgument(format!(
                "JPEG 缩放分母必须是 1/2/4/8, 实际为 {den}"
            ))),
        }
    }

    /// 缩放分母
    pub const fn denominator(self) -> u32 {
        match self {
            Self::Full => 1,
            Self::Half => 2,
            Self::Quarter => 4,
            Self::Eighth => 8,
        }
    }

    /// 每个 8x8 块重建后的边长
    pub const fn block_size(self) -> usize {
        8 / self.denominator() as usize
    }

    /// 缩放后的尺寸: ceil(dim / den)
    pub const fn scaled(self, dim: u32) -> u32 {
        dim.div_ceil(self.denominator())
    }
}

/// 解码器参数
#[derive(Debug, Clone)]
pub struct DecoderParams {
    /// 解码器标识
    pub codec_id: CodecId,
    /// 最大工作线程数 (实际使用 min(8, max_threads), 至少 1)
    pub max_threads: usize,
    /// 解码行为标志
    pub flags: DecodeFlags,
    /// 初始跳帧级别
    pub skip_level: SkipLevel,
    /// 输出样本位深: 8 或 16 (16 位容器)
    pub output_bit_depth: u8,
    /// JPEG 重建缩放
    pub jpeg_scale: JpegScale,
    /// 请求的输出像素格式, `None` 表示使用码流原生格式
    pub output_format: Option<PixelFormat>,
    /// 覆盖码流中的帧率
    pub frame_rate: Option<Rational>,
    /// 覆盖码流中的显示宽高比
    pub aspect_ratio: Option<Rational>,
    /// 预期宽度 (0 表示不检查)
    pub width: u32,
    /// 预期高度 (0 表示不检查)
    pub height: u32,
}

impl DecoderParams {
    /// 默认参数: 单线程, 重排输出, 8 位
    pub fn new(codec_id: CodecId) -> Self {
        Self {
            codec_id,
            max_threads: 1,
            flags: DecodeFlags::REORDER,
            skip_level: SkipLevel::None,
            output_bit_depth: 8,
            jpeg_scale: JpegScale::Full,
            output_format: None,
            frame_rate: None,
            aspect_ratio: None,
            width: 0,
            height: 0,
        }
    }

    /// 实际使用的线程数
    pub fn thread_count(&self) -> usize {
        self.max_threads.clamp(1, MAX_THREADS)
    }

    /// 检查参数组合
    pub fn validate(&self) -> SwdecResult<()> {
        if self.output_bit_depth != 8 && self.output_bit_depth != 16 {
            return Err(SwdecError::InvalidArgument(format!(
                "输出位深必须为 8 或 16, 实际为 {}",
                self.output_bit_depth
            )));
        }
        if let Some(fr) = self.frame_rate.filter(|fr| !fr.is_valid()) {
            return Err(SwdecError::InvalidArgument(format!("无效帧率覆盖: {fr}")));
        }
        if let Some(ar) = self.aspect_ratio.filter(|ar| !ar.is_valid()) {
            return Err(SwdecError::InvalidArgument(format!("无效宽高比覆盖: {ar}")));
        }
        Ok(())
    }
}
