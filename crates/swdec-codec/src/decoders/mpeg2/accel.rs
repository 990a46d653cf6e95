//! 硬件加速提交接口
//!
//! 安装 [`AccelHook`] 后, 图片的 slice 数据不再经过软件引擎,
//! 而是连同图片参数与量化矩阵一起交给钩子. 钩子返回后, 该槽位对应的
//! 硬件表面即可被后续图片引用.

use swdec_core::SwdecResult;

use super::slice::SliceUnit;
use super::types::{
    ChromaFormat, PictureCodingType, PictureHeader, PictureStructure, QuantMatrices,
    SequenceHeader,
};
use crate::frame::PictureType;

/// 图片参数
#[derive(Debug, Clone, PartialEq)]
pub struct PictureParams {
    /// 当前图片的表面号 (DPB 槽位)
    pub surface_index: usize,
    /// 前向参考表面
    pub forward_reference: Option<usize>,
    /// 后向参考表面
    pub backward_reference: Option<usize>,
    pub width: u32,
    pub height: u32,
    pub picture_type: PictureType,
    /// 1 顶场, 2 底场, 3 帧
    pub picture_structure: u8,
    /// 是否为一帧中的第二场
    pub second_field: bool,
    pub f_code: [[u8; 2]; 2],
    pub intra_dc_precision: u8,
    pub top_field_first: bool,
    pub frame_pred_frame_dct: bool,
    pub concealment_motion_vectors: bool,
    pub q_scale_type: bool,
    pub intra_vlc_format: bool,
    pub alternate_scan: bool,
    pub repeat_first_field: bool,
    pub progressive_frame: bool,
    /// 1 表示 4:2:0, 2 表示 4:2:2, 3 表示 4:4:4
    pub chroma_format: u8,
}

/// 单个 slice 的参数, 数据不含起始码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceParams<'a> {
    pub data: &'a [u8],
    /// slice_vertical_position - 1
    pub mb_row: usize,
    /// slice 头中的 quantiser_scale_code
    pub quantiser_scale_code: u8,
}

/// 自然顺序的量化矩阵
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantMatrixParams {
    pub intra: [u8; 64],
    pub non_intra: [u8; 64],
    pub chroma_intra: [u8; 64],
    pub chroma_non_intra: [u8; 64],
}

/// 表面解码状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelStatus {
    /// 解码完成
    Ready,
    /// 仍在进行
    Pending,
    /// 完成但检测到码流错误
    Corrupted,
    /// 执行失败
    Failed,
}

/// 硬件加速钩子
pub trait AccelHook: Send {
    /// 提交一张图片 (或一场) 的全部 slice
    fn submit(
        &mut self,
        picture: &PictureParams,
        slices: &[SliceParams<'_>],
        matrices: &QuantMatrixParams,
    ) -> SwdecResult<()>;

    /// 查询表面的解码状态
    fn query_status(&mut self, surface_index: usize) -> SwdecResult<AccelStatus>;
}

pub(super) fn picture_params(
    seq: &SequenceHeader,
    pic: &PictureHeader,
    surface_index: usize,
    references: (Option<usize>, Option<usize>),
    second_field: bool,
) -> PictureParams {
    let (forward_reference, backward_reference) = match pic.coding_type {
        PictureCodingType::I => (None, None),
        PictureCodingType::P => (references.0, None),
        PictureCodingType::B => references,
    };
    PictureParams {
        surface_index,
        forward_reference,
        backward_reference,
        width: seq.width,
        height: seq.height,
        picture_type: pic.coding_type.picture_type(),
        picture_structure: match pic.picture_structure {
            PictureStructure::TopField => 1,
            PictureStructure::BottomField => 2,
            PictureStructure::Frame => 3,
        },
        second_field,
        f_code: pic.f_code,
        intra_dc_precision: pic.intra_dc_precision,
        top_field_first: pic.top_field_first,
        frame_pred_frame_dct: pic.frame_pred_frame_dct,
        concealment_motion_vectors: pic.concealment_motion_vectors,
        q_scale_type: pic.q_scale_type,
        intra_vlc_format: pic.intra_vlc_format,
        alternate_scan: pic.alternate_scan,
        repeat_first_field: pic.repeat_first_field,
        progressive_frame: pic.progressive_frame,
        chroma_format: match seq.chroma_format {
            ChromaFormat::Yuv420 => 1,
            ChromaFormat::Yuv422 => 2,
            ChromaFormat::Yuv444 => 3,
        },
    }
}

pub(super) fn slice_params<'a>(data: &'a [u8], slices: &[SliceUnit]) -> Vec<SliceParams<'a>> {
    slices
        .iter()
        .filter_map(|unit| {
            let payload = data.get(unit.start..unit.end)?;
            Some(SliceParams {
                data: payload,
                mb_row: unit.row_hint(),
                quantiser_scale_code: payload.first().map_or(0, |b| b >> 3),
            })
        })
        .collect()
}

pub(super) fn matrix_params(quant: &QuantMatrices) -> QuantMatrixParams {
    QuantMatrixParams {
        intra: quant.intra,
        non_intra: quant.non_intra,
        chroma_intra: quant.chroma_intra,
        chroma_non_intra: quant.chroma_non_intra,
    }
}
