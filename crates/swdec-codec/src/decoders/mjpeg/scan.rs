//! DCT 扫描熵解码
//!
//! 系数按自然顺序累积在各分量的系数平面中, 所有扫描结束后统一重建.
//! 重启区间彼此独立: 每个区间重置 DC 预测与 EOB 游程, 一个区间解码失败
//! 只影响该区间内的 MCU.

use std::ops::Range;

use log::{trace, warn};
use swdec_core::bitreader::BitReader;
use swdec_core::{SwdecError, SwdecResult};

use super::header::TableSet;
use super::huffman::{HuffmanTable, receive_extend};
use super::markers::split_restart_segments;
use super::progressive;
use super::reconstruct::try_filled;
use super::types::{CodingProcess, FrameHeader, ScanHeader};
use crate::dsp::ZIGZAG_SCAN;

/// 一个分量的量化后系数, 按 MCU 对齐补齐
#[derive(Debug, Clone)]
pub(super) struct CoefPlane {
    pub blocks_w: usize,
    pub blocks_h: usize,
    /// 自然顺序
    pub blocks: Vec<[i32; 64]>,
}

impl CoefPlane {
    /// 按帧头为每个分量分配系数平面
    pub fn allocate(frame: &FrameHeader) -> SwdecResult<Vec<Self>> {
        let (mcus_x, mcus_y) = frame.mcu_count();
        frame
            .components
            .iter()
            .map(|c| {
                let blocks_w = mcus_x * usize::from(c.h);
                let blocks_h = mcus_y * usize::from(c.v);
                Ok(Self {
                    blocks_w,
                    blocks_h,
                    blocks: try_filled(blocks_w.checked_mul(blocks_h), [0; 64])?,
                })
            })
            .collect()
    }
}

/// 块解码方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BlockMode {
    /// 顺序模式: DC 与全部 AC
    Sequential,
    DcFirst,
    DcRefine,
    AcFirst,
    AcRefine,
}

impl BlockMode {
    pub fn of(process: CodingProcess, scan: &ScanHeader) -> Self {
        match (process, scan.ss == 0, scan.ah == 0) {
            (CodingProcess::Progressive, true, true) => Self::DcFirst,
            (CodingProcess::Progressive, true, false) => Self::DcRefine,
            (CodingProcess::Progressive, false, true) => Self::AcFirst,
            (CodingProcess::Progressive, false, false) => Self::AcRefine,
            _ => Self::Sequential,
        }
    }

    pub fn needs_dc_table(self) -> bool {
        matches!(self, Self::Sequential | Self::DcFirst)
    }

    pub fn needs_ac_table(self) -> bool {
        matches!(self, Self::Sequential | Self::AcFirst | Self::AcRefine)
    }
}

/// 按重启区间切分熵编码数据并逐段解码
///
/// `decode_range` 对每个区间以新的位读取器调用一次, 参数为区间覆盖的 MCU 序号.
/// 返回是否有区间解码失败或缺失.
pub(super) fn decode_segments<F>(
    entropy: &[u8],
    restart_interval: u16,
    total_mcus: usize,
    mut decode_range: F,
) -> bool
where
    F: FnMut(&mut BitReader<'_>, Range<usize>) -> SwdecResult<()>,
{
    let segments = split_restart_segments(entropy);
    let interval = if restart_interval == 0 {
        total_mcus.max(1)
    } else {
        usize::from(restart_interval)
    };
    let expected = total_mcus.div_ceil(interval);
    if segments.len() > expected {
        trace!(
            "JPEG: 熵编码数据含 {} 个区间, 只需要 {expected} 个",
            segments.len()
        );
    }

    let mut corrupted = false;
    for k in 0..expected {
        let Some(segment) = segments.get(k) else {
            warn!("JPEG: 缺少重启区间 {k}..{expected}, 其余 MCU 保持为空");
            corrupted = true;
            break;
        };
        if k > 0 {
            let want = ((k - 1) & 7) as u8;
            if segment.marker != Some(want) {
                warn!(
                    "JPEG: 重启标记不连续, 期望 RST{want}, 实际 {:?}, 继续解码",
                    segment.marker
                );
            }
        }
        let range = k * interval..((k + 1) * interval).min(total_mcus);
        let mut br = BitReader::new(&segment.data);
        if let Err(err) = decode_range(&mut br, range.clone()) {
            warn!("JPEG: 重启区间 {k} (MCU {range:?}) 解码失败: {err}");
            corrupted = true;
        }
    }
    corrupted
}

/// 解码一个 DCT 扫描, 返回是否检测到损坏
pub(super) fn decode_dct_scan(
    frame: &FrameHeader,
    scan: &ScanHeader,
    tables: &TableSet,
    restart_interval: u16,
    entropy: &[u8],
    planes: &mut [CoefPlane],
) -> SwdecResult<bool> {
    let mode = BlockMode::of(frame.process, scan);
    let mut dc_tables = Vec::with_capacity(scan.components.len());
    let mut ac_tables = Vec::with_capacity(scan.components.len());
    for sc in &scan.components {
        let dc = tables.dc[usize::from(sc.dc_table)].as_ref();
        let ac = tables.ac[usize::from(sc.ac_table)].as_ref();
        if (mode.needs_dc_table() && dc.is_none()) || (mode.needs_ac_table() && ac.is_none()) {
            return Err(SwdecError::InvalidData(format!(
                "JPEG: 扫描引用的 Huffman 表 {}/{} 未定义",
                sc.dc_table, sc.ac_table
            )));
        }
        dc_tables.push(dc);
        ac_tables.push(ac);
    }

    let (ss, se, al) = match mode {
        BlockMode::Sequential => (0, 63, 0),
        _ => (usize::from(scan.ss), usize::from(scan.se), u32::from(scan.al)),
    };
    let interleaved = scan.is_interleaved();
    let (mcus_x, mcus_y) = if interleaved {
        frame.mcu_count()
    } else {
        let (cw, ch) = frame.component_size(scan.components[0].index);
        (cw.div_ceil(8) as usize, ch.div_ceil(8) as usize)
    };
    let total = mcus_x * mcus_y;

    let corrupted = decode_segments(entropy, restart_interval, total, |br, range| {
        let mut dc_pred = [0i32; 4];
        let mut eobrun = 0u32;
        for mcu in range {
            let (mx, my) = (mcu % mcus_x, mcu / mcus_x);
            for (ci, sc) in scan.components.iter().enumerate() {
                let comp = &frame.components[sc.index];
                let plane = &mut planes[sc.index];
                let (h, v) = if interleaved {
                    (usize::from(comp.h), usize::from(comp.v))
                } else {
                    (1, 1)
                };
                for by in 0..v {
                    for bx in 0..h {
                        let idx = (my * v + by) * plane.blocks_w + mx * h + bx;
                        let block = plane.blocks.get_mut(idx).ok_or_else(|| {
                            SwdecError::Internal(format!("JPEG: 块下标 {idx} 越界"))
                        })?;
                        match mode {
                            BlockMode::Sequential => decode_sequential(
                                br,
                                block,
                                dc_tables[ci],
                                ac_tables[ci],
                                &mut dc_pred[ci],
                            )?,
                            BlockMode::DcFirst => progressive::decode_dc_first(
                                br,
                                block,
                                dc_tables[ci],
                                &mut dc_pred[ci],
                                al,
                            )?,
                            BlockMode::DcRefine => progressive::decode_dc_refine(br, block, al)?,
                            BlockMode::AcFirst => progressive::decode_ac_first(
                                br,
                                block,
                                ac_tables[ci],
                                ss..=se,
                                al,
                                &mut eobrun,
                            )?,
                            BlockMode::AcRefine => progressive::decode_ac_refine(
                                br,
                                block,
                                ac_tables[ci],
                                ss..=se,
                                al,
                                &mut eobrun,
                            )?,
                        }
                    }
                }
            }
        }
        Ok(())
    });
    Ok(corrupted)
}

pub(super) fn table(table: Option<&HuffmanTable>) -> SwdecResult<&HuffmanTable> {
    table.ok_or_else(|| SwdecError::Internal("JPEG: Huffman 表缺失".into()))
}

/// DC 差值: 类别 + 附加位
pub(super) fn decode_dc_diff(br: &mut BitReader<'_>, dc: &HuffmanTable) -> SwdecResult<i32> {
    let size = dc.decode(br)?;
    if size > 15 {
        return Err(SwdecError::Corrupted(format!("JPEG: DC 类别 {size} 无效")));
    }
    receive_extend(br, size)
}

/// 顺序模式的一个块
fn decode_sequential(
    br: &mut BitReader<'_>,
    block: &mut [i32; 64],
    dc: Option<&HuffmanTable>,
    ac: Option<&HuffmanTable>,
    pred: &mut i32,
) -> SwdecResult<()> {
    let (dc, ac) = (table(dc)?, table(ac)?);
    *pred += decode_dc_diff(br, dc)?;
    block[0] = *pred;

    let mut k = 1usize;
    while k < 64 {
        let rs = ac.decode(br)?;
        let (run, size) = (usize::from(rs >> 4), rs & 0x0F);
        if size == 0 {
            if run != 15 {
                break;
            }
            k += 16;
            continue;
        }
        k += run;
        if k > 63 {
            return Err(SwdecError::Corrupted(format!(
                "JPEG: AC 系数位置 {k} 越界"
            )));
        }
        block[ZIGZAG_SCAN[k]] = receive_extend(br, size)?;
        k += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_modes() {
        let mut scan = ScanHeader::default();
        assert_eq!(
            BlockMode::of(CodingProcess::Baseline, &scan),
            BlockMode::Sequential
        );
        scan.ss = 1;
        scan.se = 5;
        scan.ah = 2;
        scan.al = 1;
        assert_eq!(
            BlockMode::of(CodingProcess::Progressive, &scan),
            BlockMode::AcRefine
        );
        assert!(BlockMode::AcRefine.needs_ac_table());
        assert!(!BlockMode::DcRefine.needs_dc_table());
    }

    #[test]
    fn test_segments_are_isolated() {
        // 3 个区间, 每个 2 个 MCU; 第二个区间报告失败
        let entropy = [0xAA, 0xFF, 0xD0, 0xBB, 0xFF, 0xD1, 0xCC];
        let mut seen = Vec::new();
        let corrupted = decode_segments(&entropy, 2, 6, |br, range| {
            let byte = br.read_bits(8)?;
            seen.push((byte, range.clone()));
            if byte == 0xBB {
                return Err(SwdecError::Corrupted("bad".into()));
            }
            Ok(())
        });
        assert!(corrupted);
        assert_eq!(seen, vec![(0xAA, 0..2), (0xBB, 2..4), (0xCC, 4..6)]);
    }

    #[test]
    fn test_missing_segment_marks_corruption() {
        let mut calls = 0;
        let corrupted = decode_segments(&[0x00], 1, 3, |_, _| {
            calls += 1;
            Ok(())
        });
        assert!(corrupted);
        assert_eq!(calls, 1);
    }
}
