//! 解码后的帧数据.
//!
//! 每个平面一块字节缓冲区加显式行跨度 (stride). 16 位容器格式按小端存储.

use swdec_core::{PixelFormat, Rational};

/// 视频帧
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// 各平面的像素数据
    pub data: Vec<Vec<u8>>,
    /// 各平面每行的字节数
    pub linesize: Vec<usize>,
    /// 宽度 (像素)
    pub width: u32,
    /// 高度 (像素)
    pub height: u32,
    /// 像素格式
    pub pixel_format: PixelFormat,
    /// 样本有效位数 (8..=16)
    pub bit_depth: u8,
    /// 显示时间 (秒)
    pub time: f64,
    /// 显示时长 (秒)
    pub duration: f64,
    /// 显示时间是否直接取自外部输入
    pub is_original_time: bool,
    /// 图片类型
    pub picture_type: PictureType,
    /// 是否在解码中检测到损坏
    pub corrupted: bool,
    /// 像素宽高比
    pub sample_aspect_ratio: Rational,
    /// 顶场优先
    pub top_field_first: bool,
    /// 重复首场 (3:2 下拉)
    pub repeat_first_field: bool,
    /// 逐行帧
    pub progressive: bool,
    /// 帧所在的 DPB 槽位
    pub surface_index: usize,
}

impl VideoFrame {
    /// 创建指定格式的帧, 平面按格式要求分配并填零
    pub fn new(width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        let planes = pixel_format.plane_count();
        let mut data = Vec::with_capacity(planes);
        let mut linesize = Vec::with_capacity(planes);
        for plane in 0..planes {
            let stride = pixel_format.plane_linesize(plane, width).unwrap_or(0);
            let rows = pixel_format.plane_height(plane, height).unwrap_or(0);
            data.push(vec![0u8; stride * rows]);
            linesize.push(stride);
        }
        Self {
            data,
            linesize,
            width,
            height,
            pixel_format,
            bit_depth: (pixel_format.bytes_per_sample() * 8) as u8,
            time: -1.0,
            duration: 0.0,
            is_original_time: false,
            picture_type: PictureType::None,
            corrupted: false,
            sample_aspect_ratio: Rational::new(1, 1),
            top_field_first: false,
            repeat_first_field: false,
            progressive: true,
            surface_index: 0,
        }
    }

    /// 读取一个样本 (8 位或 16 位容器), 越界返回 0
    pub fn sample(&self, plane: usize, x: usize, y: usize) -> u16 {
        let Some(buf) = self.data.get(plane) else {
            return 0;
        };
        let bps = self.pixel_format.bytes_per_sample();
        let off = y * self.linesize[plane] + x * bps;
        match bps {
            2 => buf
                .get(off..off + 2)
                .map(|b| u16::from_le_bytes([b[0], b[1]]))
                .unwrap_or(0),
            _ => buf.get(off).copied().map(u16::from).unwrap_or(0),
        }
    }

    /// 计算某平面全部有效样本的平均值
    ///
    /// 打包格式按样本计 (如 RGB24 的宽为 `width * 3`).
    pub fn plane_average(&self, plane: usize) -> f64 {
        let Some(rows) = self.pixel_format.plane_height(plane, self.height) else {
            return 0.0;
        };
        let bps = self.pixel_format.bytes_per_sample();
        let cols = self.linesize[plane] / bps.max(1);
        let mut sum = 0u64;
        for y in 0..rows {
            for x in 0..cols {
                sum += u64::from(self.sample(plane, x, y));
            }
        }
        let count = (rows * cols).max(1);
        sum as f64 / count as f64
    }
}

/// 图片类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PictureType {
    /// 未指定
    #[default]
    None,
    /// I 帧 (帧内编码)
    I,
    /// P 帧 (前向预测)
    P,
    /// B 帧 (双向预测)
    B,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_allocates_planes() {
        let frame = VideoFrame::new(35, 17, PixelFormat::Yuv420p);
        assert_eq!(frame.data.len(), 3);
        assert_eq!(frame.linesize, vec![35, 18, 18]);
        assert_eq!(frame.data[1].len(), 18 * 9);
        assert_eq!(frame.bit_depth, 8);
    }

    #[test]
    fn test_sample_16bit_little_endian() {
        let mut frame = VideoFrame::new(2, 1, PixelFormat::Gray16le);
        frame.data[0] = vec![0x34, 0x12, 0xFF, 0x0F];
        assert_eq!(frame.sample(0, 0, 0), 0x1234);
        assert_eq!(frame.sample(0, 1, 0), 0x0FFF);
        assert_eq!(frame.sample(0, 2, 0), 0);
        assert!((frame.plane_average(0) - (0x1234 as f64 + 0xFFF as f64) / 2.0).abs() < 1e-9);
    }
}
