//! 色彩转换与输出格式分派
//!
//! 分量先按采样因子复制上采样到图像分辨率, 再按 (色彩空间, 目标格式) 写出.
//! 分派表之外的组合返回 `NotImplemented`, 不做近似.

use swdec_core::{PixelFormat, SwdecError, SwdecResult};

use super::reconstruct::SamplePlane;
use super::types::{CodingProcess, ColorSpace, FrameHeader};
use crate::frame::VideoFrame;

/// 8 位及以下精度时各色彩空间可直接写出的格式
///
/// 表中格式的 16 位容器形式同样可用.
fn formats_for(color: ColorSpace) -> &'static [PixelFormat] {
    use PixelFormat::*;
    match color {
        ColorSpace::Gray => &[Gray8, Rgb24, Bgr24, Bgra],
        ColorSpace::YCbCr => &[Rgb24, Bgr24, Bgra, Rgba, Yuv444p, Yuv420p, Nv12, Gray8],
        ColorSpace::Rgb => &[Rgb24, Bgr24, Bgra],
        ColorSpace::Cmyk | ColorSpace::Ycck => &[Cmyk],
    }
}

/// 亮度 2x2, 两个色度 1x1
fn is_420(frame: &FrameHeader) -> bool {
    match frame.components.as_slice() {
        [y, cb, cr] => {
            (cb.h, cb.v) == (cr.h, cr.v) && y.h == 2 * cb.h && y.v == 2 * cb.v
        }
        _ => false,
    }
}

/// 未请求格式时的输出格式
pub(super) fn default_format(color: ColorSpace, frame: &FrameHeader) -> PixelFormat {
    let high = frame.precision > 8;
    match color {
        ColorSpace::Gray if high => PixelFormat::Gray16le,
        ColorSpace::Gray => PixelFormat::Gray8,
        ColorSpace::YCbCr | ColorSpace::Rgb if high => PixelFormat::Rgb48le,
        ColorSpace::YCbCr if is_420(frame) => PixelFormat::Yuv420p,
        ColorSpace::YCbCr => PixelFormat::Yuv444p,
        ColorSpace::Rgb => PixelFormat::Rgb24,
        ColorSpace::Cmyk | ColorSpace::Ycck => PixelFormat::Cmyk,
    }
}

/// 确定实际输出格式
pub(super) fn resolve_format(
    color: ColorSpace,
    frame: &FrameHeader,
    requested: Option<PixelFormat>,
    bit_depth: u8,
) -> SwdecResult<PixelFormat> {
    let base = requested.unwrap_or_else(|| default_format(color, frame));
    let supported = if frame.precision > 8 {
        matches!(
            (color, base),
            (ColorSpace::Gray, PixelFormat::Gray16le)
                | (ColorSpace::YCbCr | ColorSpace::Rgb, PixelFormat::Rgb48le)
        )
    } else {
        formats_for(color)
            .iter()
            .any(|&f| f == base || f.to_16bit() == Some(base))
    };
    if !supported {
        return Err(SwdecError::NotImplemented(format!(
            "JPEG: 不支持 {color} ({} 位) -> {base} 的色彩转换",
            frame.precision
        )));
    }
    let format = if bit_depth == 16 && base.bytes_per_sample() == 1 {
        base.to_16bit().ok_or_else(|| {
            SwdecError::NotImplemented(format!("JPEG: {base} 没有 16 位容器形式"))
        })?
    } else {
        base
    };
    if frame.process == CodingProcess::Progressive && format.bytes_per_sample() == 2 {
        return Err(SwdecError::NotImplemented(
            "JPEG: 渐进图像不支持 16 位输出".into(),
        ));
    }
    Ok(format)
}

/// 复制上采样: 输出像素 (x, y) 取分量样本 (x * h / Hmax, y * v / Vmax)
pub(super) fn upsample(
    planes: &[SamplePlane],
    frame: &FrameHeader,
    width: usize,
    height: usize,
) -> Vec<Vec<u16>> {
    let (max_h, max_v) = (frame.max_h() as usize, frame.max_v() as usize);
    planes
        .iter()
        .zip(&frame.components)
        .map(|(plane, comp)| {
            let (h, v) = (usize::from(comp.h), usize::from(comp.v));
            let xs: Vec<usize> = (0..width).map(|x| x * h / max_h).collect();
            let mut out = Vec::with_capacity(width * height);
            for y in 0..height {
                let sy = y * v / max_v;
                out.extend(xs.iter().map(|&sx| plane.at(sx, sy)));
            }
            out
        })
        .collect()
}

/// JFIF YCbCr -> RGB, 16 位定点
#[inline]
fn ycc_to_rgb(y: i32, cb: i32, cr: i32, center: i32, max: i32) -> [i32; 3] {
    let (cb, cr) = (cb - center, cr - center);
    let r = y + ((91881 * cr + 32768) >> 16);
    let g = y + ((32768 - 22554 * cb - 46802 * cr) >> 16);
    let b = y + ((116130 * cb + 32768) >> 16);
    [r.clamp(0, max), g.clamp(0, max), b.clamp(0, max)]
}

#[inline]
fn store(buf: &mut [u8], off: usize, value: i32, wide: bool) {
    if wide {
        buf[off..off + 2].copy_from_slice(&(value as u16).to_le_bytes());
    } else {
        buf[off] = value as u8;
    }
}

/// 2x2 平均 (图像边缘只取存在的样本)
fn chroma_420(channel: &[u16], width: usize, height: usize, cx: usize, cy: usize) -> i32 {
    let (mut sum, mut n) = (0i32, 0i32);
    for y in 2 * cy..(2 * cy + 2).min(height) {
        for x in 2 * cx..(2 * cx + 2).min(width) {
            sum += i32::from(channel[y * width + x]);
            n += 1;
        }
    }
    if n == 0 { 0 } else { (sum + n / 2) / n }
}

/// 把上采样后的分量写成输出帧
pub(super) fn convert(
    channels: &[Vec<u16>],
    color: ColorSpace,
    precision: u8,
    format: PixelFormat,
    width: u32,
    height: u32,
) -> SwdecResult<VideoFrame> {
    let mut frame = VideoFrame::new(width, height, format);
    frame.bit_depth = precision.max(8);
    let (w, h) = (width as usize, height as usize);
    let wide = format.bytes_per_sample() == 2;
    let bps = format.bytes_per_sample();
    let max = (1i32 << precision) - 1;
    let center = 1i32 << (precision - 1);
    let need = match color {
        ColorSpace::Gray => 1,
        ColorSpace::Cmyk | ColorSpace::Ycck => 4,
        _ => 3,
    };
    if channels.len() < need || channels.iter().any(|c| c.len() < w * h) {
        return Err(SwdecError::Internal(format!(
            "JPEG: 色彩转换输入分量不足 ({} 个)",
            channels.len()
        )));
    }
    let sample = |c: usize, i: usize| i32::from(channels[c][i]);
    let rgb = |i: usize| -> [i32; 3] {
        match color {
            ColorSpace::Gray => [sample(0, i); 3],
            ColorSpace::YCbCr | ColorSpace::Ycck => {
                ycc_to_rgb(sample(0, i), sample(1, i), sample(2, i), center, max)
            }
            _ => [sample(0, i), sample(1, i), sample(2, i)],
        }
    };

    match format {
        PixelFormat::Gray8 | PixelFormat::Gray16le => {
            let stride = frame.linesize[0];
            for y in 0..h {
                for x in 0..w {
                    store(&mut frame.data[0], y * stride + x * bps, sample(0, y * w + x), wide);
                }
            }
        }
        PixelFormat::Rgb24
        | PixelFormat::Rgb48le
        | PixelFormat::Bgr24
        | PixelFormat::Rgba
        | PixelFormat::Bgra => {
            let spp = format.samples_per_pixel();
            let stride = frame.linesize[0];
            for y in 0..h {
                for x in 0..w {
                    let [r, g, b] = rgb(y * w + x);
                    let px: [i32; 4] = match format {
                        PixelFormat::Bgr24 | PixelFormat::Bgra => [b, g, r, max],
                        _ => [r, g, b, max],
                    };
                    let off = y * stride + x * spp * bps;
                    for (k, &value) in px.iter().take(spp).enumerate() {
                        store(&mut frame.data[0], off + k * bps, value, wide);
                    }
                }
            }
        }
        PixelFormat::Yuv444p | PixelFormat::Yuv444p16le => {
            for plane in 0..3 {
                let stride = frame.linesize[plane];
                for y in 0..h {
                    for x in 0..w {
                        let value = sample(plane, y * w + x);
                        store(&mut frame.data[plane], y * stride + x * bps, value, wide);
                    }
                }
            }
        }
        PixelFormat::Yuv420p | PixelFormat::Yuv420p16le | PixelFormat::Nv12 => {
            let stride = frame.linesize[0];
            for y in 0..h {
                for x in 0..w {
                    store(&mut frame.data[0], y * stride + x * bps, sample(0, y * w + x), wide);
                }
            }
            let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
            for cy in 0..ch {
                for cx in 0..cw {
                    let u = chroma_420(&channels[1], w, h, cx, cy);
                    let v = chroma_420(&channels[2], w, h, cx, cy);
                    if format == PixelFormat::Nv12 {
                        let off = cy * frame.linesize[1] + 2 * cx;
                        frame.data[1][off] = u as u8;
                        frame.data[1][off + 1] = v as u8;
                    } else {
                        store(&mut frame.data[1], cy * frame.linesize[1] + cx * bps, u, wide);
                        store(&mut frame.data[2], cy * frame.linesize[2] + cx * bps, v, wide);
                    }
                }
            }
        }
        PixelFormat::Cmyk => {
            let stride = frame.linesize[0];
            for y in 0..h {
                for x in 0..w {
                    let i = y * w + x;
                    let cmy = if color == ColorSpace::Ycck {
                        rgb(i).map(|c| max - c)
                    } else {
                        [sample(0, i), sample(1, i), sample(2, i)]
                    };
                    let off = y * stride + x * 4;
                    for (k, &value) in cmy.iter().chain([sample(3, i)].iter()).enumerate() {
                        store(&mut frame.data[0], off + k, value, false);
                    }
                }
            }
        }
        other => {
            return Err(SwdecError::NotImplemented(format!(
                "JPEG: 输出格式 {other} 未实现"
            )));
        }
    }
    Ok(frame)
}
