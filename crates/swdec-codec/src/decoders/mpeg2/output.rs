//! 输出帧构建
//!
//! 把宏块对齐的内部缓冲裁剪为显示尺寸, 并按请求的格式写出.
//! 只支持不需要重采样的目标格式, 其余组合报告未实现.

use swdec_core::{PixelFormat, SwdecError, SwdecResult};

use super::picture::PictureBuffer;
use super::types::ChromaFormat;
use crate::frame::VideoFrame;

/// 码流的原生输出格式
pub(super) fn native_format(chroma: ChromaFormat) -> PixelFormat {
    match chroma {
        ChromaFormat::Yuv420 => PixelFormat::Yuv420p,
        ChromaFormat::Yuv422 => PixelFormat::Yuv422p,
        ChromaFormat::Yuv444 => PixelFormat::Yuv444p,
    }
}

/// 确定实际输出格式, 不支持的组合返回 `NotImplemented`
pub(super) fn resolve_format(
    chroma: ChromaFormat,
    requested: Option<PixelFormat>,
    bit_depth: u8,
) -> SwdecResult<PixelFormat> {
    let native = native_format(chroma);
    let base = requested.unwrap_or(native);
    let supported = base == native
        || base == PixelFormat::Gray8
        || (base == PixelFormat::Nv12 && chroma == ChromaFormat::Yuv420)
        || native.to_16bit() == Some(base)
        || base == PixelFormat::Gray16le;
    if !supported {
        return Err(SwdecError::NotImplemented(format!(
            "MPEG-2: 不支持 {native} -> {base} 的输出转换"
        )));
    }
    if bit_depth == 16 && base.bytes_per_sample() == 1 {
        return base.to_16bit().ok_or_else(|| {
            SwdecError::NotImplemented(format!("MPEG-2: {base} 没有 16 位容器形式"))
        });
    }
    Ok(base)
}

/// 将内部缓冲写成输出帧
pub(super) fn build_frame(
    buffer: &PictureBuffer,
    width: u32,
    height: u32,
    format: PixelFormat,
) -> SwdecResult<VideoFrame> {
    let mut frame = VideoFrame::new(width, height, format);
    frame.bit_depth = 8;
    let wide = format.bytes_per_sample() == 2;

    match format {
        PixelFormat::Nv12 => {
            copy_plane(buffer, 0, &mut frame, 0, width, height, false);
            let cw = width.div_ceil(2) as usize;
            let ch = height.div_ceil(2) as usize;
            let stride = frame.linesize[1];
            for y in 0..ch.min(buffer.heights[1]) {
                let u = &buffer.planes[1][y * buffer.strides[1]..];
                let v = &buffer.planes[2][y * buffer.strides[2]..];
                let dst = &mut frame.data[1][y * stride..];
                for x in 0..cw.min(buffer.strides[1]) {
                    dst[2 * x] = u[x];
                    dst[2 * x + 1] = v[x];
                }
            }
        }
        PixelFormat::Gray8 | PixelFormat::Gray16le => {
            copy_plane(buffer, 0, &mut frame, 0, width, height, wide);
        }
        _ => {
            for plane in 0..3 {
                copy_plane(buffer, plane, &mut frame, plane, width, height, wide);
            }
        }
    }
    Ok(frame)
}

fn copy_plane(
    buffer: &PictureBuffer,
    src_plane: usize,
    frame: &mut VideoFrame,
    dst_plane: usize,
    width: u32,
    height: u32,
    wide: bool,
) {
    let Some(rows) = frame.pixel_format.plane_height(dst_plane, height) else {
        return;
    };
    let Some(bytes) = frame.pixel_format.plane_linesize(dst_plane, width) else {
        return;
    };
    let cols = if wide { bytes / 2 } else { bytes };
    let stride = frame.linesize[dst_plane];
    let src_stride = buffer.strides[src_plane];
    let rows = rows.min(buffer.heights[src_plane]);
    let cols = cols.min(src_stride);
    for y in 0..rows {
        let src = &buffer.planes[src_plane][y * src_stride..y * src_stride + cols];
        let dst = &mut frame.data[dst_plane][y * stride..];
        if wide {
            for (x, &s) in src.iter().enumerate() {
                dst[2 * x..2 * x + 2].copy_from_slice(&u16::from(s).to_le_bytes());
            }
        } else {
            dst[..cols].copy_from_slice(src);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::SequenceHeader;
    use super::*;

    fn buffer(chroma: ChromaFormat) -> PictureBuffer {
        let seq = SequenceHeader {
            width: 40,
            height: 24,
            progressive_sequence: true,
            chroma_format: chroma,
            ..SequenceHeader::default()
        };
        let mut buf = PictureBuffer::new(&seq).unwrap();
        buf.planes[0].fill(200);
        buf.planes[1].fill(60);
        buf.planes[2].fill(90);
        buf
    }

    #[test]
    fn test_native_output_is_cropped() {
        let buf = buffer(ChromaFormat::Yuv420);
        let frame = build_frame(&buf, 40, 24, PixelFormat::Yuv420p).unwrap();
        assert_eq!(frame.linesize, vec![40, 20, 20]);
        assert_eq!(frame.data[0].len(), 40 * 24);
        assert_eq!(frame.plane_average(0), 200.0);
        assert_eq!(frame.plane_average(2), 90.0);
    }

    #[test]
    fn test_nv12_interleaves_chroma() {
        let buf = buffer(ChromaFormat::Yuv420);
        let frame = build_frame(&buf, 40, 24, PixelFormat::Nv12).unwrap();
        assert_eq!(frame.data.len(), 2);
        assert_eq!(&frame.data[1][..4], &[60, 90, 60, 90]);
    }

    #[test]
    fn test_sixteen_bit_container() {
        let format = resolve_format(ChromaFormat::Yuv422, None, 16).unwrap();
        assert_eq!(format, PixelFormat::Yuv422p16le);
        let buf = buffer(ChromaFormat::Yuv422);
        let frame = build_frame(&buf, 40, 24, format).unwrap();
        assert_eq!(frame.bit_depth, 8);
        assert_eq!(frame.sample(0, 3, 3), 200);
        assert_eq!(frame.sample(1, 3, 3), 60);
    }

    #[test]
    fn test_unsupported_conversion() {
        assert!(matches!(
            resolve_format(ChromaFormat::Yuv422, Some(PixelFormat::Nv12), 8),
            Err(SwdecError::NotImplemented(_))
        ));
        assert!(matches!(
            resolve_format(ChromaFormat::Yuv420, Some(PixelFormat::Rgb24), 8),
            Err(SwdecError::NotImplemented(_))
        ));
    }
}
