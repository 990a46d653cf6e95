//! JPEG 帧头与扫描头数据结构

use std::fmt;

/// 编码过程 (由 SOF 标记决定)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodingProcess {
    /// SOF0: 8 位基线顺序 DCT
    #[default]
    Baseline,
    /// SOF1: 8/12 位扩展顺序 DCT
    Extended,
    /// SOF2: 渐进 DCT
    Progressive,
    /// SOF3: 无损预测编码
    Lossless,
}

impl CodingProcess {
    pub fn is_dct(self) -> bool {
        !matches!(self, Self::Lossless)
    }
}

/// 图像色彩空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    Gray,
    YCbCr,
    Rgb,
    Cmyk,
    Ycck,
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gray => "gray",
            Self::YCbCr => "ycbcr",
            Self::Rgb => "rgb",
            Self::Cmyk => "cmyk",
            Self::Ycck => "ycck",
        };
        f.write_str(name)
    }
}

/// 帧头中的分量描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameComponent {
    /// 分量标识 (C_i)
    pub id: u8,
    /// 水平采样因子 1..=4
    pub h: u8,
    /// 垂直采样因子 1..=4
    pub v: u8,
    /// 量化表号 0..=3
    pub quant_table: u8,
}

/// SOF 帧头
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameHeader {
    pub process: CodingProcess,
    /// 样本精度 (位)
    pub precision: u8,
    pub width: u32,
    pub height: u32,
    pub components: Vec<FrameComponent>,
}

impl FrameHeader {
    pub fn max_h(&self) -> u32 {
        self.components.iter().map(|c| u32::from(c.h)).max().unwrap_or(1)
    }

    pub fn max_v(&self) -> u32 {
        self.components.iter().map(|c| u32::from(c.v)).max().unwrap_or(1)
    }

    /// MCU 的像素尺寸; DCT 模式为 8 * 最大采样因子, 无损模式为最大采样因子
    pub fn mcu_size(&self) -> (u32, u32) {
        let unit = if self.process.is_dct() { 8 } else { 1 };
        (unit * self.max_h(), unit * self.max_v())
    }

    /// 交织扫描的 MCU 列数与行数
    pub fn mcu_count(&self) -> (usize, usize) {
        let (mw, mh) = self.mcu_size();
        (
            self.width.div_ceil(mw) as usize,
            self.height.div_ceil(mh) as usize,
        )
    }

    /// 分量的实际样本尺寸: ceil(dim * 采样因子 / 最大采样因子)
    pub fn component_size(&self, index: usize) -> (u32, u32) {
        let c = &self.components[index];
        (
            (self.width * u32::from(c.h)).div_ceil(self.max_h()),
            (self.height * u32::from(c.v)).div_ceil(self.max_v()),
        )
    }
}

/// 扫描头中的分量引用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanComponent {
    /// 在帧分量列表中的下标
    pub index: usize,
    /// DC (无损模式下为差值) Huffman 表号
    pub dc_table: u8,
    /// AC Huffman 表号
    pub ac_table: u8,
}

/// SOS 扫描头
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanHeader {
    pub components: Vec<ScanComponent>,
    /// 频谱起点; 无损模式下为预测器编号
    pub ss: u8,
    /// 频谱终点
    pub se: u8,
    /// 逐次逼近高位
    pub ah: u8,
    /// 逐次逼近低位; 无损模式下为点变换
    pub al: u8,
}

impl ScanHeader {
    /// 单分量扫描不交织, MCU 为一个块 (无损模式为一个样本)
    pub fn is_interleaved(&self) -> bool {
        self.components.len() > 1
    }
}

/// APP0 JFIF 信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JfifInfo {
    pub version: (u8, u8),
    /// 0 无单位 (仅宽高比), 1 每英寸, 2 每厘米
    pub density_units: u8,
    pub x_density: u16,
    pub y_density: u16,
}

/// 最近解码图像的信息
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub precision: u8,
    pub process: CodingProcess,
    pub color_space: ColorSpace,
    /// 各分量的 (H, V) 采样因子
    pub sampling: Vec<(u8, u8)>,
    /// 重启间隔 (MCU 数), 0 表示未启用
    pub restart_interval: u16,
    pub jfif: Option<JfifInfo>,
    /// APP14 Adobe 色彩变换标志
    pub adobe_transform: Option<u8>,
    /// 最近一个 COM 段
    pub comment: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_420(width: u32, height: u32) -> FrameHeader {
        let comp = |id, h, v| FrameComponent {
            id,
            h,
            v,
            quant_table: 0,
        };
        FrameHeader {
            process: CodingProcess::Baseline,
            precision: 8,
            width,
            height,
            components: vec![comp(1, 2, 2), comp(2, 1, 1), comp(3, 1, 1)],
        }
    }

    #[test]
    fn test_mcu_geometry() {
        let header = header_420(35, 17);
        assert_eq!(header.mcu_size(), (16, 16));
        assert_eq!(header.mcu_count(), (3, 2));
        assert_eq!(header.component_size(0), (35, 17));
        assert_eq!(header.component_size(1), (18, 9));
    }
}
