//! MPEG-2 解码器类型定义

use crate::frame::PictureType;

use super::tables::{DEFAULT_INTRA_MATRIX, DEFAULT_NON_INTRA_MATRIX};

// ============================================================================
// 起始码
// ============================================================================

pub(super) const PICTURE_START_CODE: u32 = 0x100;
pub(super) const SLICE_START_CODE_MIN: u32 = 0x101;
pub(super) const SLICE_START_CODE_MAX: u32 = 0x1AF;
pub(super) const USER_DATA_START_CODE: u32 = 0x1B2;
pub(super) const SEQUENCE_HEADER_CODE: u32 = 0x1B3;
pub(super) const SEQUENCE_ERROR_CODE: u32 = 0x1B4;
pub(super) const EXTENSION_START_CODE: u32 = 0x1B5;
pub(super) const SEQUENCE_END_CODE: u32 = 0x1B7;
pub(super) const GROUP_START_CODE: u32 = 0x1B8;

/// 判断起始码是否为 slice
pub(super) fn is_slice_code(code: u32) -> bool {
    (SLICE_START_CODE_MIN..=SLICE_START_CODE_MAX).contains(&code)
}

// 扩展标识 (extension_start_code_identifier)
pub(super) const EXT_SEQUENCE: u32 = 1;
pub(super) const EXT_SEQUENCE_DISPLAY: u32 = 2;
pub(super) const EXT_QUANT_MATRIX: u32 = 3;
pub(super) const EXT_COPYRIGHT: u32 = 4;
pub(super) const EXT_SEQUENCE_SCALABLE: u32 = 5;
pub(super) const EXT_PICTURE_DISPLAY: u32 = 7;
pub(super) const EXT_PICTURE_CODING: u32 = 8;
pub(super) const EXT_PICTURE_SPATIAL_SCALABLE: u32 = 9;
pub(super) const EXT_PICTURE_TEMPORAL_SCALABLE: u32 = 10;

/// 用户数据队列上限
pub(super) const USER_DATA_QUEUE_LIMIT: usize = 300;

// ============================================================================
// 枚举
// ============================================================================

/// picture_coding_type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(super) enum PictureCodingType {
    #[default]
    I,
    P,
    B,
}

impl PictureCodingType {
    pub(super) fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::I),
            2 => Some(Self::P),
            3 => Some(Self::B),
            _ => None,
        }
    }

    pub(super) fn picture_type(self) -> PictureType {
        match self {
            Self::I => PictureType::I,
            Self::P => PictureType::P,
            Self::B => PictureType::B,
        }
    }
}

/// picture_structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(super) enum PictureStructure {
    TopField,
    BottomField,
    #[default]
    Frame,
}

impl PictureStructure {
    pub(super) fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::TopField),
            2 => Some(Self::BottomField),
            3 => Some(Self::Frame),
            _ => None,
        }
    }

    pub(super) fn is_field(self) -> bool {
        self != Self::Frame
    }

    /// 场奇偶性: 顶场 0, 底场 1; 帧图片返回 0
    pub(super) fn parity(self) -> usize {
        usize::from(self == Self::BottomField)
    }
}

/// chroma_format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(super) enum ChromaFormat {
    #[default]
    Yuv420,
    Yuv422,
    Yuv444,
}

impl ChromaFormat {
    pub(super) fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Yuv420),
            2 => Some(Self::Yuv422),
            3 => Some(Self::Yuv444),
            _ => None,
        }
    }

    /// 每个宏块的块数
    pub(super) fn block_count(self) -> usize {
        match self {
            Self::Yuv420 => 6,
            Self::Yuv422 => 8,
            Self::Yuv444 => 12,
        }
    }

    /// 色度水平/垂直下采样位移
    pub(super) fn shift(self) -> (u32, u32) {
        match self {
            Self::Yuv420 => (1, 1),
            Self::Yuv422 => (1, 0),
            Self::Yuv444 => (0, 0),
        }
    }
}

// ============================================================================
// 头部结构
// ============================================================================

/// GOP 时间码
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GopTimeCode {
    pub drop_frame: bool,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub pictures: u8,
    pub closed_gop: bool,
    pub broken_link: bool,
}

/// 视频信号描述 (sequence_display_extension)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalInfo {
    pub video_format: u8,
    pub colour_primaries: u8,
    pub transfer_characteristics: u8,
    pub matrix_coefficients: u8,
    pub display_width: u32,
    pub display_height: u32,
}

/// 量化矩阵 (自然顺序)
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct QuantMatrices {
    pub intra: [u8; 64],
    pub non_intra: [u8; 64],
    pub chroma_intra: [u8; 64],
    pub chroma_non_intra: [u8; 64],
}

impl Default for QuantMatrices {
    fn default() -> Self {
        Self {
            intra: DEFAULT_INTRA_MATRIX,
            non_intra: DEFAULT_NON_INTRA_MATRIX,
            chroma_intra: DEFAULT_INTRA_MATRIX,
            chroma_non_intra: DEFAULT_NON_INTRA_MATRIX,
        }
    }
}

/// 序列头与序列扩展
#[derive(Debug, Clone, Default)]
pub(super) struct SequenceHeader {
    pub width: u32,
    pub height: u32,
    pub aspect_ratio_code: u8,
    pub frame_rate_code: u8,
    pub frame_rate_ext_n: u8,
    pub frame_rate_ext_d: u8,
    pub bit_rate: u32,
    pub vbv_buffer_size: u32,
    pub profile: u8,
    pub level: u8,
    pub progressive_sequence: bool,
    pub chroma_format: ChromaFormat,
    pub low_delay: bool,
    /// 是否已解析到序列扩展 (没有则为 MPEG-1)
    pub has_extension: bool,
    pub signal: SignalInfo,
    pub gop: GopTimeCode,
}

impl SequenceHeader {
    pub(super) fn mb_width(&self) -> usize {
        self.width.div_ceil(16) as usize
    }

    /// 帧宏块行数, 隔行序列按 32 行对齐
    pub(super) fn mb_height(&self) -> usize {
        if self.progressive_sequence {
            self.height.div_ceil(16) as usize
        } else {
            2 * self.height.div_ceil(32) as usize
        }
    }

    pub(super) fn frame_rate(&self) -> f64 {
        super::tables::frame_rate(
            self.frame_rate_code,
            self.frame_rate_ext_n,
            self.frame_rate_ext_d,
        )
    }
}

/// 图片头与图片编码扩展
#[derive(Debug, Clone, Default)]
pub(super) struct PictureHeader {
    pub temporal_reference: u16,
    pub coding_type: PictureCodingType,
    pub vbv_delay: u16,
    /// f_code[s][t], s: 0 前向 1 后向, t: 0 水平 1 垂直
    pub f_code: [[u8; 2]; 2],
    pub intra_dc_precision: u8,
    pub picture_structure: PictureStructure,
    pub top_field_first: bool,
    pub frame_pred_frame_dct: bool,
    pub concealment_motion_vectors: bool,
    pub q_scale_type: bool,
    pub intra_vlc_format: bool,
    pub alternate_scan: bool,
    pub repeat_first_field: bool,
    pub chroma_420_type: bool,
    pub progressive_frame: bool,
    /// 是否已解析到图片编码扩展
    pub has_coding_extension: bool,
    /// 图片显示扩展中的偏移 (1/16 像素)
    pub frame_centre_offsets: Vec<(i16, i16)>,
}
