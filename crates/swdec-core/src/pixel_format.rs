//! 像素格式定义.
//!
//! 解码器输出平面的存储格式. 8 位格式每个样本占 1 字节,
//! 16 位容器格式每个样本占 2 字节小端, 有效位数由帧的 `bit_depth` 给出.

use std::fmt;

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    /// 未指定
    None,

    // ========================
    // YUV 平面格式
    // ========================
    /// YUV 4:2:0 平面格式, 8 位
    Yuv420p,
    /// YUV 4:2:2 平面格式, 8 位
    Yuv422p,
    /// YUV 4:4:4 平面格式, 8 位
    Yuv444p,
    /// YUV 4:2:0 平面格式, 16 位容器
    Yuv420p16le,
    /// YUV 4:2:2 平面格式, 16 位容器
    Yuv422p16le,
    /// YUV 4:4:4 平面格式, 16 位容器
    Yuv444p16le,
    /// NV12: Y 平面 + UV 交错, 4:2:0, 8 位
    Nv12,

    // ========================
    // 打包格式
    // ========================
    /// RGB 各 8 位
    Rgb24,
    /// BGR 各 8 位
    Bgr24,
    /// RGBA 各 8 位
    Rgba,
    /// BGRA 各 8 位
    Bgra,
    /// RGB 各 16 位小端
    Rgb48le,
    /// CMYK 各 8 位
    Cmyk,

    // ========================
    // 灰度格式
    // ========================
    /// 灰度 8 位
    Gray8,
    /// 灰度 16 位小端
    Gray16le,
}

impl PixelFormat {
    /// 每个样本占用的字节数
    pub const fn bytes_per_sample(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Yuv420p16le | Self::Yuv422p16le | Self::Yuv444p16le => 2,
            Self::Rgb48le | Self::Gray16le => 2,
            _ => 1,
        }
    }

    /// 打包格式每个像素的样本数, 平面格式为 1
    pub const fn samples_per_pixel(&self) -> usize {
        match self {
            Self::Rgb24 | Self::Bgr24 | Self::Rgb48le => 3,
            Self::Rgba | Self::Bgra | Self::Cmyk => 4,
            _ => 1,
        }
    }

    /// 获取色度子采样 (log2 水平, log2 垂直)
    pub const fn chroma_subsampling(&self) -> (u32, u32) {
        match self {
            Self::Yuv420p | Self::Yuv420p16le | Self::Nv12 => (1, 1),
            Self::Yuv422p | Self::Yuv422p16le => (1, 0),
            _ => (0, 0),
        }
    }

    /// 是否为 YUV 平面格式
    pub const fn is_planar_yuv(&self) -> bool {
        matches!(
            self,
            Self::Yuv420p
                | Self::Yuv422p
                | Self::Yuv444p
                | Self::Yuv420p16le
                | Self::Yuv422p16le
                | Self::Yuv444p16le
        )
    }

    /// 平面数量
    pub const fn plane_count(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Yuv420p
            | Self::Yuv422p
            | Self::Yuv444p
            | Self::Yuv420p16le
            | Self::Yuv422p16le
            | Self::Yuv444p16le => 3,
            Self::Nv12 => 2,
            _ => 1,
        }
    }

    /// 同一子采样结构的 16 位容器版本
    ///
    /// 没有对应 16 位格式时返回 `None`.
    pub const fn to_16bit(&self) -> Option<Self> {
        match self {
            Self::Yuv420p | Self::Yuv420p16le => Some(Self::Yuv420p16le),
            Self::Yuv422p | Self::Yuv422p16le => Some(Self::Yuv422p16le),
            Self::Yuv444p | Self::Yuv444p16le => Some(Self::Yuv444p16le),
            Self::Gray8 | Self::Gray16le => Some(Self::Gray16le),
            Self::Rgb24 | Self::Rgb48le => Some(Self::Rgb48le),
            _ => None,
        }
    }

    /// 计算指定平面每行的字节数
    ///
    /// 格式为 None 或平面索引超出范围时返回 `None`.
    pub fn plane_linesize(&self, plane: usize, width: u32) -> Option<usize> {
        if plane >= self.plane_count() {
            return None;
        }
        let w = width as usize;
        let (sub_h, _) = self.chroma_subsampling();
        let luma = w * self.samples_per_pixel() * self.bytes_per_sample();
        Some(match (self, plane) {
            (_, 0) => luma,
            // NV12 的 UV 交错平面与亮度同宽
            (Self::Nv12, _) => w.div_ceil(2) * 2,
            _ => ((w + (1 << sub_h) - 1) >> sub_h) * self.bytes_per_sample(),
        })
    }

    /// 计算指定平面的行数
    pub fn plane_height(&self, plane: usize, height: u32) -> Option<usize> {
        if plane >= self.plane_count() {
            return None;
        }
        let h = height as usize;
        let (_, sub_v) = self.chroma_subsampling();
        Some(if plane == 0 {
            h
        } else {
            (h + (1 << sub_v) - 1) >> sub_v
        })
    }

    /// 计算整帧的字节数
    pub fn frame_size(&self, width: u32, height: u32) -> Option<usize> {
        if *self == Self::None {
            return None;
        }
        let mut total = 0usize;
        for plane in 0..self.plane_count() {
            total += self.plane_linesize(plane, width)? * self.plane_height(plane, height)?;
        }
        Some(total)
    }

    /// 由名称解析像素格式 (与 `Display` 输出一致)
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "yuv420p" => Self::Yuv420p,
            "yuv422p" => Self::Yuv422p,
            "yuv444p" => Self::Yuv444p,
            "yuv420p16le" => Self::Yuv420p16le,
            "yuv422p16le" => Self::Yuv422p16le,
            "yuv444p16le" => Self::Yuv444p16le,
            "nv12" => Self::Nv12,
            "rgb24" => Self::Rgb24,
            "bgr24" => Self::Bgr24,
            "rgba" => Self::Rgba,
            "bgra" => Self::Bgra,
            "rgb48le" => Self::Rgb48le,
            "cmyk" => Self::Cmyk,
            "gray8" | "gray" => Self::Gray8,
            "gray16le" => Self::Gray16le,
            _ => return None,
        })
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Yuv420p => "yuv420p",
            Self::Yuv422p => "yuv422p",
            Self::Yuv444p => "yuv444p",
            Self::Yuv420p16le => "yuv420p16le",
            Self::Yuv422p16le => "yuv422p16le",
            Self::Yuv444p16le => "yuv444p16le",
            Self::Nv12 => "nv12",
            Self::Rgb24 => "rgb24",
            Self::Bgr24 => "bgr24",
            Self::Rgba => "rgba",
            Self::Bgra => "bgra",
            Self::Rgb48le => "rgb48le",
            Self::Cmyk => "cmyk",
            Self::Gray8 => "gray8",
            Self::Gray16le => "gray16le",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuv420p_frame_size() {
        let pf = PixelFormat::Yuv420p;
        assert_eq!(pf.frame_size(352, 288), Some(352 * 288 * 3 / 2));
        assert_eq!(pf.plane_linesize(1, 352), Some(176));
        assert_eq!(pf.plane_height(2, 288), Some(144));
    }

    #[test]
    fn test_odd_dimensions_round_up() {
        let pf = PixelFormat::Yuv420p;
        assert_eq!(pf.plane_linesize(1, 35), Some(18));
        assert_eq!(pf.plane_height(1, 35), Some(18));
        assert_eq!(PixelFormat::Nv12.plane_linesize(1, 35), Some(36));
    }

    #[test]
    fn test_16bit_container() {
        let pf = PixelFormat::Yuv422p.to_16bit().unwrap();
        assert_eq!(pf, PixelFormat::Yuv422p16le);
        assert_eq!(pf.plane_linesize(0, 64), Some(128));
        assert_eq!(pf.plane_linesize(1, 64), Some(64));
        assert_eq!(pf.plane_height(1, 48), Some(48));
        assert_eq!(PixelFormat::Nv12.to_16bit(), None);
    }

    #[test]
    fn test_packed_formats() {
        assert_eq!(PixelFormat::Bgra.frame_size(16, 8), Some(16 * 8 * 4));
        assert_eq!(PixelFormat::Rgb48le.plane_linesize(0, 10), Some(60));
        assert_eq!(PixelFormat::Cmyk.plane_count(), 1);
        assert_eq!(PixelFormat::Rgb24.plane_linesize(1, 10), None);
    }

    #[test]
    fn test_name_roundtrip() {
        for pf in [
            PixelFormat::Yuv420p,
            PixelFormat::Nv12,
            PixelFormat::Bgra,
            PixelFormat::Gray16le,
        ] {
            assert_eq!(PixelFormat::from_name(&pf.to_string()), Some(pf));
        }
        assert_eq!(PixelFormat::from_name("p010"), None);
        assert_eq!(PixelFormat::None.frame_size(16, 16), None);
    }
}
