//! 无损模式 (SOF3) 预测解码
//!
//! 每个样本由已解码的左 (Ra), 上 (Rb), 左上 (Rc) 邻居预测, 码流中只有差值.
//! 扫描开始和每个重启区间的第一行只用左邻居预测, 第一个样本的预测值为
//! 2^(P-Pt-1); 其余行的第一列用上邻居预测.

use swdec_core::bitreader::BitReader;
use swdec_core::{SwdecError, SwdecResult};

use super::header::TableSet;
use super::huffman::{HuffmanTable, receive_extend};
use super::reconstruct::SamplePlane;
use super::scan::decode_segments;
use super::types::{FrameHeader, ScanHeader};

/// 按帧头为每个分量分配样本平面 (按 MCU 补齐)
pub(super) fn allocate(frame: &FrameHeader) -> SwdecResult<Vec<SamplePlane>> {
    let (mcus_x, mcus_y) = frame.mcu_count();
    frame
        .components
        .iter()
        .map(|c| SamplePlane::new(mcus_x * usize::from(c.h), mcus_y * usize::from(c.v)))
        .collect()
}

/// 预测器 1..=7
fn predict(selector: u8, ra: i32, rb: i32, rc: i32) -> i32 {
    match selector {
        1 => ra,
        2 => rb,
        3 => rc,
        4 => ra + rb - rc,
        5 => ra + ((rb - rc) >> 1),
        6 => rb + ((ra - rc) >> 1),
        _ => (ra + rb) >> 1,
    }
}

/// 差值: 类别 16 固定为 32768, 没有附加位
fn decode_diff(br: &mut BitReader<'_>, table: &HuffmanTable) -> SwdecResult<i32> {
    match table.decode(br)? {
        16 => Ok(32768),
        s if s < 16 => receive_extend(br, s),
        s => Err(SwdecError::Corrupted(format!("JPEG: 无损差值类别 {s} 无效"))),
    }
}

/// 解码一个无损扫描, 样本以点变换前的值写入平面; 返回是否检测到损坏
pub(super) fn decode_lossless_scan(
    frame: &FrameHeader,
    scan: &ScanHeader,
    tables: &TableSet,
    restart_interval: u16,
    entropy: &[u8],
    planes: &mut [SamplePlane],
) -> SwdecResult<bool> {
    let mut diff_tables = Vec::with_capacity(scan.components.len());
    for sc in &scan.components {
        let t = tables.dc[usize::from(sc.dc_table)].as_ref().ok_or_else(|| {
            SwdecError::InvalidData(format!("JPEG: 无损扫描引用的表 {} 未定义", sc.dc_table))
        })?;
        diff_tables.push(t);
    }
    let interleaved = scan.is_interleaved();
    let (mcus_x, mcus_y) = if interleaved {
        frame.mcu_count()
    } else {
        let (cw, ch) = frame.component_size(scan.components[0].index);
        (cw as usize, ch as usize)
    };
    let initial = 1i32 << (frame.precision - scan.al - 1);
    let selector = scan.ss;

    let corrupted = decode_segments(entropy, restart_interval, mcus_x * mcus_y, |br, range| {
        let first_row = range.start / mcus_x;
        let mut fresh = [true; 4];
        for mcu in range {
            let (mx, my) = (mcu % mcus_x, mcu / mcus_x);
            for (ci, sc) in scan.components.iter().enumerate() {
                let comp = &frame.components[sc.index];
                let (h, v) = if interleaved {
                    (usize::from(comp.h), usize::from(comp.v))
                } else {
                    (1, 1)
                };
                let plane = &mut planes[sc.index];
                for dy in 0..v {
                    for dx in 0..h {
                        let (x, y) = (mx * h + dx, my * v + dy);
                        if x >= plane.width || y >= plane.height {
                            return Err(SwdecError::Internal(format!(
                                "JPEG: 样本位置 ({x}, {y}) 越界"
                            )));
                        }
                        let at = |px: usize, py: usize| i32::from(plane.data[py * plane.width + px]);
                        let pred = if fresh[ci] || (y == first_row * v && x == 0) {
                            initial
                        } else if y == first_row * v {
                            at(x - 1, y)
                        } else if x == 0 {
                            at(x, y - 1)
                        } else {
                            predict(selector, at(x - 1, y), at(x, y - 1), at(x - 1, y - 1))
                        };
                        fresh[ci] = false;
                        let diff = decode_diff(br, diff_tables[ci])?;
                        let width = plane.width;
                        plane.data[y * width + x] = (pred + diff) as u16;
                    }
                }
            }
        }
        Ok(())
    });
    Ok(corrupted)
}
