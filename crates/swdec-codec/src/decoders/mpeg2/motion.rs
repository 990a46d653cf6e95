//! 运动向量重建与运动补偿预测
//!
//! 向量以半像素为单位. 场预测的垂直分量以场行为单位.

use super::picture::{RefFrame, RefPlane};
use super::types::ChromaFormat;

/// 运动类型 (frame_motion_type / field_motion_type)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(super) enum MotionType {
    /// 帧图片: 整帧预测; 场图片不使用
    #[default]
    Frame,
    /// 场预测
    Field,
    /// 场图片的 16x8 预测
    Mc16x8,
    /// 双基预测 (仅 P 图片)
    DualPrime,
}

/// 一个宏块的运动信息
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct MotionInfo {
    pub forward: bool,
    pub backward: bool,
    pub motion_type: MotionType,
    /// motion_vertical_field_select[r][s]
    pub field_select: [[usize; 2]; 2],
    /// vector[r][s][t]
    pub vectors: [[[i32; 2]; 2]; 2],
    /// 双基预测的反奇偶向量, 帧图片按目标场 (顶/底) 索引, 场图片只用第 0 项
    pub dual: [[i32; 2]; 2],
}

/// 由 motion_code, motion_residual 与预测值重建一个向量分量
///
/// 结果按 f_code 决定的范围回绕.
pub(super) fn reconstruct_component(prediction: i32, motion_code: i32, residual: i32, f_code: u8) -> i32 {
    let r_size = u32::from(f_code.max(1)) - 1;
    let f = 1i32 << r_size;
    let high = 16 * f - 1;
    let low = -16 * f;
    let range = 32 * f;
    let delta = if f == 1 || motion_code == 0 {
        motion_code
    } else {
        let magnitude = (motion_code.abs() - 1) * f + residual + 1;
        if motion_code < 0 { -magnitude } else { magnitude }
    };
    let mut vector = prediction + delta;
    if vector < low {
        vector += range;
    }
    if vector > high {
        vector -= range;
    }
    vector
}

/// 计算双基预测的反奇偶向量
///
/// 帧图片返回 [顶场取自底场, 底场取自顶场]; 场图片只有第 0 项有效.
pub(super) fn dual_prime_vectors(
    vector: [i32; 2],
    dmv: [i32; 2],
    frame_picture: bool,
    top_field_first: bool,
    bottom_field: bool,
) -> [[i32; 2]; 2] {
    let scale = |v: i32, m: i32| (v * m + i32::from(v > 0)) >> 1;
    let [mx, my] = vector;
    if frame_picture {
        let m = if top_field_first { 1 } else { 3 };
        let n = 4 - m;
        [
            [scale(mx, m) + dmv[0], scale(my, m) + dmv[1] - 1],
            [scale(mx, n) + dmv[0], scale(my, n) + dmv[1] + 1],
        ]
    } else {
        let e = if bottom_field { 1 } else { -1 };
        [
            [scale(mx, 1) + dmv[0], scale(my, 1) + dmv[1] + e],
            [0, 0],
        ]
    }
}

/// 宏块预测缓冲: 亮度 16x16, 色度按格式 8/16 宽, 8/16 高
#[derive(Debug, Clone)]
pub(super) struct PredBuffer {
    pub planes: [[u8; 256]; 3],
}

impl Default for PredBuffer {
    fn default() -> Self {
        Self {
            planes: [[128; 256]; 3],
        }
    }
}

impl PredBuffer {
    /// 与另一预测逐样本取平均 (向上取整)
    pub(super) fn average(&mut self, other: &PredBuffer) {
        for (dst, src) in self.planes.iter_mut().zip(&other.planes) {
            for (d, s) in dst.iter_mut().zip(src) {
                *d = ((u16::from(*d) + u16::from(*s) + 1) >> 1) as u8;
            }
        }
    }
}

/// 预测目标块的描述
#[derive(Debug, Clone, Copy)]
pub(super) struct BlockTarget {
    /// 亮度块左上角在参考平面中的整像素位置 (场预测时为场行)
    pub x: i32,
    pub y: i32,
    /// 亮度块尺寸
    pub width: usize,
    pub height: usize,
    /// 写入预测缓冲的起始行 (亮度行, 色度按格式缩放)
    pub dst_row: usize,
    /// 场预测写入帧宏块时的目标场, 不缩放
    pub dst_parity: usize,
    pub dst_step: usize,
}

/// 从参考帧取一个块的预测 (三个平面)
///
/// `field` 为 `Some(parity)` 时按场寻址. `reference` 为 `None` 时填充中灰.
pub(super) fn predict_block(
    reference: Option<&RefFrame<'_>>,
    field: Option<usize>,
    chroma: ChromaFormat,
    target: BlockTarget,
    vector: [i32; 2],
    out: &mut PredBuffer,
) {
    let (sx, sy) = chroma.shift();
    for plane in 0..3 {
        let (shift_x, shift_y) = if plane == 0 { (0, 0) } else { (sx, sy) };
        let mb_stride = 16 >> shift_x;
        // 4:2:0 与 4:2:2 的色度向量按截断除法缩放
        let mvx = if shift_x == 1 { vector[0] / 2 } else { vector[0] };
        let mvy = if shift_y == 1 { vector[1] / 2 } else { vector[1] };
        let width = target.width >> shift_x;
        let height = target.height >> shift_y;
        let x0 = target.x >> shift_x;
        let y0 = target.y >> shift_y;
        let dst_row = (target.dst_row >> shift_y) + target.dst_parity;
        let dst = &mut out.planes[plane];
        let Some(frame) = reference else {
            for k in 0..height {
                let row = dst_row + k * target.dst_step;
                dst[row * mb_stride..row * mb_stride + width].fill(128);
            }
            continue;
        };
        let src = &frame.planes[plane];
        fetch_half_pel(src, field, x0, y0, mvx, mvy, width, height, |k, i, v| {
            let row = dst_row + k * target.dst_step;
            dst[row * mb_stride + i] = v;
        });
    }
}

/// 半像素插值取样, 对每个输出样本调用 `put(行, 列, 值)`
#[allow(clippy::too_many_arguments)]
fn fetch_half_pel(
    src: &RefPlane<'_>,
    field: Option<usize>,
    x0: i32,
    y0: i32,
    mvx: i32,
    mvy: i32,
    width: usize,
    height: usize,
    mut put: impl FnMut(usize, usize, u8),
) {
    let ix = x0 + (mvx >> 1);
    let iy = y0 + (mvy >> 1);
    let hx = mvx & 1 != 0;
    let hy = mvy & 1 != 0;
    for k in 0..height {
        let y = iy + k as i32;
        for i in 0..width {
            let x = ix + i as i32;
            let a = u16::from(src.sample(x, y, field));
            let v = match (hx, hy) {
                (false, false) => a,
                (true, false) => (a + u16::from(src.sample(x + 1, y, field)) + 1) >> 1,
                (false, true) => (a + u16::from(src.sample(x, y + 1, field)) + 1) >> 1,
                (true, true) => {
                    (a + u16::from(src.sample(x + 1, y, field))
                        + u16::from(src.sample(x, y + 1, field))
                        + u16::from(src.sample(x + 1, y + 1, field))
                        + 2)
                        >> 2
                }
            };
            put(k, i, v as u8);
        }
    }
}
