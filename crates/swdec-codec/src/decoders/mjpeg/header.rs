//! JPEG 标记段负载解析
//!
//! 负载不含标记与长度字段. 多字节字段均为大端.

use log::{debug, trace, warn};
use swdec_core::{SwdecError, SwdecResult};

use super::huffman::HuffmanTable;
use super::markers::{SOF0, SOF1, SOF2, SOF3};
use super::types::{
    CodingProcess, ColorSpace, FrameComponent, FrameHeader, JfifInfo, ScanComponent, ScanHeader,
};
use crate::dsp::ZIGZAG_SCAN;

/// 自然顺序的量化表
pub(super) type QuantTable = [u16; 64];

/// 跨图像保留的量化表与 Huffman 表
///
/// MJPEG 帧经常省略 DHT 甚至 DQT, 沿用之前的定义.
#[derive(Debug, Clone, Default)]
pub(super) struct TableSet {
    pub quant: [Option<QuantTable>; 4],
    pub dc: [Option<HuffmanTable>; 4],
    pub ac: [Option<HuffmanTable>; 4],
}

fn short(what: &str) -> SwdecError {
    SwdecError::InvalidData(format!("JPEG: {what} 段长度不足"))
}

fn be16(data: &[u8], pos: usize) -> u16 {
    u16::from_be_bytes([data[pos], data[pos + 1]])
}

/// 解析 SOFn
pub(super) fn parse_sof(marker: u8, payload: &[u8]) -> SwdecResult<FrameHeader> {
    let process = match marker {
        SOF0 => CodingProcess::Baseline,
        SOF1 => CodingProcess::Extended,
        SOF2 => CodingProcess::Progressive,
        SOF3 => CodingProcess::Lossless,
        _ => {
            return Err(SwdecError::Unsupported(format!(
                "JPEG: 不支持的编码过程 SOF{}",
                marker - SOF0
            )));
        }
    };
    if payload.len() < 6 {
        return Err(short("SOF"));
    }
    let precision = payload[0];
    let height = u32::from(be16(payload, 1));
    let width = u32::from(be16(payload, 3));
    let count = usize::from(payload[5]);

    let precision_ok = match process {
        CodingProcess::Baseline => precision == 8,
        CodingProcess::Extended | CodingProcess::Progressive => precision == 8 || precision == 12,
        CodingProcess::Lossless => (2..=16).contains(&precision),
    };
    if !precision_ok {
        return Err(SwdecError::Unsupported(format!(
            "JPEG: {process:?} 不支持 {precision} 位精度"
        )));
    }
    if height == 0 {
        return Err(SwdecError::Unsupported(
            "JPEG: 不支持由 DNL 定义的图像高度".into(),
        ));
    }
    if width == 0 {
        return Err(SwdecError::InvalidData("JPEG: 图像宽度为 0".into()));
    }
    if !(1..=4).contains(&count) {
        return Err(SwdecError::Unsupported(format!("JPEG: 不支持 {count} 个分量")));
    }
    if payload.len() < 6 + 3 * count {
        return Err(short("SOF"));
    }

    let mut components = Vec::with_capacity(count);
    for chunk in payload[6..6 + 3 * count].chunks_exact(3) {
        let (h, v) = (chunk[1] >> 4, chunk[1] & 0x0F);
        if !(1..=4).contains(&h) || !(1..=4).contains(&v) {
            return Err(SwdecError::InvalidData(format!(
                "JPEG: 分量 {} 采样因子 {h}x{v} 无效",
                chunk[0]
            )));
        }
        if chunk[2] > 3 {
            return Err(SwdecError::InvalidData(format!(
                "JPEG: 量化表号 {} 越界",
                chunk[2]
            )));
        }
        if components.iter().any(|c: &FrameComponent| c.id == chunk[0]) {
            warn!("JPEG: 分量标识 {} 重复", chunk[0]);
        }
        components.push(FrameComponent {
            id: chunk[0],
            h,
            v,
            quant_table: chunk[2],
        });
    }

    let header = FrameHeader {
        process,
        precision,
        width,
        height,
        components,
    };
    debug!(
        "JPEG: 帧头 {process:?} {width}x{height} {precision} 位, 采样 {:?}",
        header
            .components
            .iter()
            .map(|c| (c.h, c.v))
            .collect::<Vec<_>>()
    );
    Ok(header)
}

/// 解析 DQT, 一个段可以包含多张表
pub(super) fn parse_dqt(payload: &[u8], tables: &mut TableSet) -> SwdecResult<()> {
    let mut pos = 0;
    while pos < payload.len() {
        let pq = payload[pos] >> 4;
        let tq = usize::from(payload[pos] & 0x0F);
        pos += 1;
        if pq > 1 || tq > 3 {
            return Err(SwdecError::InvalidData(format!(
                "JPEG: 量化表 Pq={pq} Tq={tq} 无效"
            )));
        }
        let size = if pq == 0 { 64 } else { 128 };
        if pos + size > payload.len() {
            return Err(short("DQT"));
        }
        let mut table = [0u16; 64];
        for (k, &natural) in ZIGZAG_SCAN.iter().enumerate() {
            table[natural] = if pq == 0 {
                u16::from(payload[pos + k])
            } else {
                be16(payload, pos + 2 * k)
            };
        }
        pos += size;
        trace!("JPEG: 量化表 {tq} ({} 位)", if pq == 0 { 8 } else { 16 });
        tables.quant[tq] = Some(table);
    }
    Ok(())
}

/// 解析 DHT, 一个段可以包含多张表
pub(super) fn parse_dht(payload: &[u8], tables: &mut TableSet) -> SwdecResult<()> {
    let mut pos = 0;
    while pos < payload.len() {
        if pos + 17 > payload.len() {
            return Err(short("DHT"));
        }
        let class = payload[pos] >> 4;
        let index = usize::from(payload[pos] & 0x0F);
        if class > 1 || index > 3 {
            return Err(SwdecError::InvalidData(format!(
                "JPEG: Huffman 表 Tc={class} Th={index} 无效"
            )));
        }
        let mut bits = [0u8; 16];
        bits.copy_from_slice(&payload[pos + 1..pos + 17]);
        let count: usize = bits.iter().map(|&b| usize::from(b)).sum();
        pos += 17;
        if pos + count > payload.len() {
            return Err(short("DHT"));
        }
        let table = HuffmanTable::new(&bits, &payload[pos..pos + count])?;
        pos += count;
        trace!(
            "JPEG: Huffman 表 {}{index}, {count} 个符号",
            if class == 0 { "DC" } else { "AC" }
        );
        if class == 0 {
            tables.dc[index] = Some(table);
        } else {
            tables.ac[index] = Some(table);
        }
    }
    Ok(())
}

/// 解析 DRI, 返回重启间隔 (MCU 数)
pub(super) fn parse_dri(payload: &[u8]) -> SwdecResult<u16> {
    if payload.len() < 2 {
        return Err(short("DRI"));
    }
    Ok(be16(payload, 0))
}

/// 解析 SOS 并按编码过程检查参数
pub(super) fn parse_sos(payload: &[u8], frame: &FrameHeader) -> SwdecResult<ScanHeader> {
    let count = usize::from(*payload.first().ok_or_else(|| short("SOS"))?);
    if !(1..=4).contains(&count) {
        return Err(SwdecError::InvalidData(format!(
            "JPEG: 扫描分量数 {count} 无效"
        )));
    }
    if payload.len() < 1 + 2 * count + 3 {
        return Err(short("SOS"));
    }
    let mut components = Vec::with_capacity(count);
    for chunk in payload[1..1 + 2 * count].chunks_exact(2) {
        let index = frame
            .components
            .iter()
            .position(|c| c.id == chunk[0])
            .ok_or_else(|| {
                SwdecError::InvalidData(format!("JPEG: 扫描引用了未知分量 {}", chunk[0]))
            })?;
        let (dc_table, ac_table) = (chunk[1] >> 4, chunk[1] & 0x0F);
        if dc_table > 3 || ac_table > 3 {
            return Err(SwdecError::InvalidData(format!(
                "JPEG: 扫描 Huffman 表号 {dc_table}/{ac_table} 越界"
            )));
        }
        components.push(ScanComponent {
            index,
            dc_table,
            ac_table,
        });
    }
    let tail = &payload[1 + 2 * count..];
    let scan = ScanHeader {
        components,
        ss: tail[0],
        se: tail[1],
        ah: tail[2] >> 4,
        al: tail[2] & 0x0F,
    };
    check_scan(&scan, frame)?;
    trace!(
        "JPEG: 扫描 {} 个分量, Ss={} Se={} Ah={} Al={}",
        count, scan.ss, scan.se, scan.ah, scan.al
    );
    Ok(scan)
}

fn check_scan(scan: &ScanHeader, frame: &FrameHeader) -> SwdecResult<()> {
    let invalid = |what: String| Err(SwdecError::InvalidData(format!("JPEG: {what}")));
    if scan.is_interleaved() && frame.process.is_dct() {
        let blocks: u32 = scan
            .components
            .iter()
            .map(|sc| {
                let c = &frame.components[sc.index];
                u32::from(c.h) * u32::from(c.v)
            })
            .sum();
        if blocks > 10 {
            return invalid(format!("交织扫描每个 MCU {blocks} 个块, 超过 10"));
        }
    }
    match frame.process {
        CodingProcess::Baseline | CodingProcess::Extended => {
            if scan.ss != 0 || scan.se != 63 || scan.ah != 0 || scan.al != 0 {
                warn!(
                    "JPEG: 顺序扫描参数异常 Ss={} Se={} Ah={} Al={}, 按完整频谱处理",
                    scan.ss, scan.se, scan.ah, scan.al
                );
            }
        }
        CodingProcess::Progressive => {
            if scan.ss == 0 && scan.se != 0 {
                return invalid(format!("渐进 DC 扫描 Se={} 不为 0", scan.se));
            }
            if scan.ss > 0 && (scan.se < scan.ss || scan.se > 63 || scan.is_interleaved()) {
                return invalid(format!(
                    "渐进 AC 扫描 Ss={} Se={} 分量数 {} 无效",
                    scan.ss,
                    scan.se,
                    scan.components.len()
                ));
            }
            if scan.al > 13 || (scan.ah != 0 && scan.ah != scan.al + 1) {
                return invalid(format!("逐次逼近 Ah={} Al={} 无效", scan.ah, scan.al));
            }
        }
        CodingProcess::Lossless => {
            if !(1..=7).contains(&scan.ss) {
                return invalid(format!("无损预测器 {} 无效", scan.ss));
            }
            if scan.al >= frame.precision {
                return invalid(format!("点变换 {} 不小于精度", scan.al));
            }
        }
    }
    Ok(())
}

/// 解析 APP0: JFIF 返回密度信息, JFXX 只记录扩展类型
pub(super) fn parse_app0(payload: &[u8]) -> Option<JfifInfo> {
    if payload.len() >= 14 && payload.starts_with(b"JFIF\0") {
        let info = JfifInfo {
            version: (payload[5], payload[6]),
            density_units: payload[7],
            x_density: be16(payload, 8),
            y_density: be16(payload, 10),
        };
        debug!(
            "JPEG: JFIF {}.{:02}, 密度 {}x{} (单位 {})",
            info.version.0, info.version.1, info.x_density, info.y_density, info.density_units
        );
        return Some(info);
    }
    if payload.len() >= 6 && payload.starts_with(b"JFXX\0") {
        debug!("JPEG: JFXX 扩展, 类型 0x{:02X}", payload[5]);
    }
    None
}

/// 解析 APP14 Adobe 段, 返回色彩变换标志
pub(super) fn parse_app14(payload: &[u8]) -> Option<u8> {
    if payload.len() >= 12 && payload.starts_with(b"Adobe") {
        let transform = payload[11];
        debug!("JPEG: Adobe 色彩变换 {transform}");
        return Some(transform);
    }
    None
}

/// 由分量数, Adobe 标志与分量标识推断色彩空间
pub(super) fn color_space(frame: &FrameHeader, adobe_transform: Option<u8>) -> SwdecResult<ColorSpace> {
    match frame.components.len() {
        1 => Ok(ColorSpace::Gray),
        3 => {
            let rgb_ids = frame
                .components
                .iter()
                .map(|c| c.id)
                .eq([b'R', b'G', b'B']);
            if adobe_transform == Some(0) || rgb_ids {
                Ok(ColorSpace::Rgb)
            } else {
                Ok(ColorSpace::YCbCr)
            }
        }
        4 if adobe_transform == Some(2) => Ok(ColorSpace::Ycck),
        4 => Ok(ColorSpace::Cmyk),
        n => Err(SwdecError::Unsupported(format!(
            "JPEG: 不支持 {n} 个分量的色彩空间"
        ))),
    }
}
