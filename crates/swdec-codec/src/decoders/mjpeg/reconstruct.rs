//! 样本重建: 反量化 + 缩放 IDCT + 电平偏移
//!
//! 每个块按 zig-zag 顺序下最后一个非零系数分类稀疏度, 选择对应的 IDCT 路径.
//! 缩放 1/N 时每块输出 (8/N)x(8/N) 个样本. 块行之间互不依赖,
//! 提供线程池时按块行并行.

use rayon::ThreadPool;
use rayon::prelude::*;
use swdec_core::{SwdecError, SwdecResult};

use super::header::QuantTable;
use super::scan::CoefPlane;
use crate::codec_parameters::JpegScale;
use crate::dsp::{Sparsity, ZIGZAG_SCAN, idct_scaled};

/// 一个分量的样本, 行跨度等于宽度
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct SamplePlane {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u16>,
}

/// 单个系数或样本缓冲的字节上限
pub(super) const MAX_BUFFER_BYTES: u64 = 1 << 32;

/// 分配 `count` 个值为 `value` 的元素
///
/// 元素个数溢出, 超过 [`MAX_BUFFER_BYTES`] 或分配失败时返回 `OutOfMemory`.
pub(super) fn try_filled<T: Clone>(count: Option<usize>, value: T) -> SwdecResult<Vec<T>> {
    let count = count.ok_or_else(|| SwdecError::OutOfMemory("JPEG: 缓冲尺寸溢出".into()))?;
    let bytes = (count as u64).saturating_mul(std::mem::size_of::<T>() as u64);
    if bytes > MAX_BUFFER_BYTES {
        return Err(SwdecError::OutOfMemory(format!(
            "JPEG: 缓冲需要 {bytes} 字节, 超过上限 {MAX_BUFFER_BYTES}"
        )));
    }
    let mut buf = Vec::new();
    buf.try_reserve_exact(count)
        .map_err(|e| SwdecError::OutOfMemory(format!("JPEG: 分配 {bytes} 字节失败: {e}")))?;
    buf.resize(count, value);
    Ok(buf)
}

impl SamplePlane {
    pub fn new(width: usize, height: usize) -> SwdecResult<Self> {
        Ok(Self {
            width,
            height,
            data: try_filled(width.checked_mul(height), 0)?,
        })
    }

    /// 读取样本, 越界时取最近的边缘样本
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> u16 {
        let x = x.min(self.width.saturating_sub(1));
        let y = y.min(self.height.saturating_sub(1));
        self.data.get(y * self.width + x).copied().unwrap_or(0)
    }
}

/// zig-zag 顺序下最后一个非零系数的位置
fn last_nonzero(block: &[i32; 64]) -> usize {
    ZIGZAG_SCAN
        .iter()
        .rposition(|&pos| block[pos] != 0)
        .unwrap_or(0)
}

/// 重建一个块并写入输出行组
fn reconstruct_block(
    coefs: &[i32; 64],
    quant: &QuantTable,
    size: usize,
    precision: u8,
    out: &mut [u16],
    stride: usize,
    x0: usize,
) {
    let mut block = [0i32; 64];
    for (dst, (&c, &q)) in block.iter_mut().zip(coefs.iter().zip(quant.iter())) {
        *dst = c * i32::from(q);
    }
    let sparsity = Sparsity::from_last_index(last_nonzero(&block));
    idct_scaled(&mut block, size, sparsity);

    let center = 1i32 << (precision - 1);
    let max = (1i32 << precision) - 1;
    for y in 0..size {
        let row = &mut out[y * stride + x0..y * stride + x0 + size];
        for (x, dst) in row.iter_mut().enumerate() {
            *dst = (block[y * 8 + x] + center).clamp(0, max) as u16;
        }
    }
}

/// 重建一个分量的全部块
pub(super) fn reconstruct_component(
    plane: &CoefPlane,
    quant: &QuantTable,
    precision: u8,
    scale: JpegScale,
    pool: Option<&ThreadPool>,
) -> SwdecResult<SamplePlane> {
    let size = scale.block_size();
    let mut out = SamplePlane::new(plane.blocks_w * size, plane.blocks_h * size)?;
    let stride = out.width;
    let band = stride * size;
    if band == 0 {
        return Ok(out);
    }

    let row_job = |(by, rows): (usize, &mut [u16])| {
        for bx in 0..plane.blocks_w {
            let coefs = &plane.blocks[by * plane.blocks_w + bx];
            reconstruct_block(coefs, quant, size, precision, rows, stride, bx * size);
        }
    };
    match pool {
        Some(pool) => pool.install(|| {
            out.data
                .par_chunks_mut(band)
                .enumerate()
                .for_each(row_job)
        }),
        None => out.data.chunks_mut(band).enumerate().for_each(row_job),
    }
    Ok(out)
}
