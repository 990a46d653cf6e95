//! 图片内并行解码
//!
//! 在任何线程启动前, 按 slice 起始码位置把图片数据切成至多 N 段连续区间,
//! 每段对应互不重叠的宏块行. 各段写入各自独占的 [`PictureRegion`],
//! 所有段结束后才返回, 控制循环随后才会修改 DPB.

use std::ops::Range;

use log::{debug, trace};
use rayon::ThreadPool;
use rayon::prelude::*;
use swdec_core::{SwdecError, SwdecResult};

use super::picture::PictureBuffer;
use super::slice::{PictureContext, SliceStats, SliceUnit, decode_slices};
use crate::codec_parameters::MAX_THREADS;

/// 一个工作段: 宏块行区间与其中的 slice
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Band {
    pub first_row: usize,
    pub end_row: usize,
    pub slices: Range<usize>,
}

/// 按字节量均衡地在宏块行切换处切分
///
/// slice 行号不单调, 行号越界或 `splittable` 为 false (需要垂直位置扩展位)
/// 时退化为单段.
pub(super) fn partition(
    slices: &[SliceUnit],
    mb_rows: usize,
    threads: usize,
    splittable: bool,
) -> Vec<Band> {
    let whole = vec![Band {
        first_row: 0,
        end_row: mb_rows,
        slices: 0..slices.len(),
    }];
    if threads <= 1 || !splittable || slices.len() < 2 {
        return whole;
    }
    let ordered = slices
        .windows(2)
        .all(|w| w[0].row_hint() <= w[1].row_hint());
    if !ordered || slices.iter().any(|s| s.row_hint() >= mb_rows) {
        trace!("MPEG-2: slice 行号无序或越界, 单线程解码");
        return whole;
    }

    let total: usize = slices.iter().map(|s| s.end - s.start).sum();
    let target = total.div_ceil(threads).max(1);
    let mut bands = Vec::with_capacity(threads);
    let mut band_start = 0usize;
    let mut acc = 0usize;
    for (i, unit) in slices.iter().enumerate() {
        let row_changes = i > 0 && unit.row_hint() != slices[i - 1].row_hint();
        if row_changes && acc >= target && bands.len() + 1 < threads {
            bands.push(band_start..i);
            band_start = i;
            acc = 0;
        }
        acc += unit.end - unit.start;
    }
    bands.push(band_start..slices.len());

    let count = bands.len();
    bands
        .into_iter()
        .enumerate()
        .map(|(k, range)| {
            let first_row = if k == 0 {
                0
            } else {
                slices[range.start].row_hint()
            };
            let end_row = if k + 1 == count {
                mb_rows
            } else {
                slices[range.end].row_hint()
            };
            Band {
                first_row,
                end_row,
                slices: range,
            }
        })
        .collect()
}

/// 有界工作线程池, 大小为 min(8, 配置值)
pub(super) struct WorkerPool {
    pool: Option<ThreadPool>,
    threads: usize,
}

impl WorkerPool {
    pub(super) fn new(threads: usize) -> SwdecResult<Self> {
        let threads = threads.clamp(1, MAX_THREADS);
        let pool = if threads > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("swdec-mpeg2-{i}"))
                .build()
                .map_err(|e| SwdecError::Internal(format!("创建解码线程池失败: {e}")))?;
            Some(pool)
        } else {
            None
        };
        Ok(Self { pool, threads })
    }

    pub(super) fn threads(&self) -> usize {
        self.threads
    }

    /// 解码一张图片的全部 slice, 所有段结束后返回合并的统计
    pub(super) fn decode_picture(
        &self,
        ctx: &PictureContext<'_>,
        data: &[u8],
        slices: &[SliceUnit],
        target: &mut PictureBuffer,
    ) -> SliceStats {
        let mb_rows = ctx.mb_rows();
        let bands = partition(slices, mb_rows, self.threads, ctx.seq.height <= 2800);
        let rows: Vec<(usize, usize)> = bands.iter().map(|b| (b.first_row, b.end_row)).collect();
        let field_picture = ctx.pic.picture_structure.is_field();
        let regions = target.split_rows(&rows, field_picture);
        let jobs: Vec<_> = bands.into_iter().zip(regions).collect();

        match &self.pool {
            Some(pool) if jobs.len() > 1 => {
                debug!("MPEG-2: 图片切分为 {} 段并行解码", jobs.len());
                pool.install(|| {
                    jobs.into_par_iter()
                        .map(|(band, mut region)| {
                            decode_slices(ctx, data, &slices[band.slices], &mut region)
                        })
                        .reduce(SliceStats::default, |mut a, b| {
                            a.merge(b);
                            a
                        })
                })
            }
            _ => {
                let mut stats = SliceStats::default();
                for (band, mut region) in jobs {
                    stats.merge(decode_slices(ctx, data, &slices[band.slices], &mut region));
                }
                stats
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(row: usize, start: usize, len: usize) -> SliceUnit {
        SliceUnit {
            code: 0x101 + row as u32,
            start,
            end: start + len,
        }
    }

    #[test]
    fn test_partition_balances_bytes_at_row_changes() {
        let slices: Vec<SliceUnit> = (0..8).map(|r| unit(r, r * 100, 96)).collect();
        let bands = partition(&slices, 8, 4, true);
        assert_eq!(bands.len(), 4);
        assert_eq!(bands[0].first_row, 0);
        assert_eq!(bands[3].end_row, 8);
        for pair in bands.windows(2) {
            assert_eq!(pair[0].end_row, pair[1].first_row);
            assert_eq!(pair[0].slices.end, pair[1].slices.start);
        }
        let covered: usize = bands.iter().map(|b| b.slices.len()).sum();
        assert_eq!(covered, 8);
    }

    #[test]
    fn test_partition_keeps_same_row_slices_together() {
        // 两个 slice 同在第 0 行
        let slices = vec![unit(0, 0, 500), unit(0, 504, 500), unit(1, 1008, 10)];
        let bands = partition(&slices, 2, 3, true);
        assert_eq!(bands.len(), 2);
        assert_eq!(bands[0].slices, 0..2);
        assert_eq!(bands[1].first_row, 1);
    }

    #[test]
    fn test_partition_falls_back_to_single_band() {
        let slices = vec![unit(3, 0, 10), unit(1, 20, 10)];
        assert_eq!(partition(&slices, 4, 4, true).len(), 1);
        let slices = vec![unit(0, 0, 10), unit(1, 20, 10)];
        assert_eq!(partition(&slices, 4, 4, false).len(), 1);
        assert_eq!(partition(&slices, 4, 1, true).len(), 1);
    }

    #[test]
    fn test_pool_size_is_bounded() {
        assert_eq!(WorkerPool::new(64).unwrap().threads(), 8);
        assert_eq!(WorkerPool::new(0).unwrap().threads(), 1);
    }
}
