//! 图片样本存储, 参考帧只读视图与按行切分的可写区域

use swdec_core::{SwdecError, SwdecResult};

use super::types::{ChromaFormat, SequenceHeader};

/// 一帧的三个样本平面, 尺寸按宏块对齐
#[derive(Debug, Clone)]
pub(super) struct PictureBuffer {
    pub planes: [Vec<u8>; 3],
    pub strides: [usize; 3],
    pub heights: [usize; 3],
    pub chroma: ChromaFormat,
}

impl PictureBuffer {
    /// 按序列参数分配, 样本初始化为中灰
    pub(super) fn new(seq: &SequenceHeader) -> SwdecResult<Self> {
        let luma_w = seq.mb_width() * 16;
        let luma_h = seq.mb_height() * 16;
        let (sx, sy) = seq.chroma_format.shift();
        let strides = [luma_w, luma_w >> sx, luma_w >> sx];
        let heights = [luma_h, luma_h >> sy, luma_h >> sy];
        let mut planes: [Vec<u8>; 3] = Default::default();
        for (plane, buf) in planes.iter_mut().enumerate() {
            let size = strides[plane]
                .checked_mul(heights[plane])
                .ok_or_else(|| SwdecError::OutOfMemory("帧缓冲尺寸溢出".into()))?;
            buf.try_reserve_exact(size)
                .map_err(|e| SwdecError::OutOfMemory(format!("帧缓冲分配失败: {e}")))?;
            buf.resize(size, 128);
        }
        Ok(Self {
            planes,
            strides,
            heights,
            chroma: seq.chroma_format,
        })
    }

    /// 是否与当前序列参数一致
    pub(super) fn matches(&self, seq: &SequenceHeader) -> bool {
        self.chroma == seq.chroma_format
            && self.strides[0] == seq.mb_width() * 16
            && self.heights[0] == seq.mb_height() * 16
    }

    pub(super) fn reference(&self) -> RefFrame<'_> {
        RefFrame {
            planes: std::array::from_fn(|p| RefPlane {
                data: &self.planes[p],
                stride: self.strides[p],
                height: self.heights[p],
            }),
        }
    }

    /// 按宏块行区间切分为互不重叠的可写区域
    ///
    /// `bands` 为连续且覆盖全部宏块行的 `[first_row, end_row)`;
    /// 场图片的一个宏块行占 32 帧行.
    pub(super) fn split_rows(
        &mut self,
        bands: &[(usize, usize)],
        field_picture: bool,
    ) -> Vec<PictureRegion<'_>> {
        let rows_per_mb = if field_picture { 32 } else { 16 };
        let (_, sy) = self.chroma.shift();
        let mut regions: Vec<[Option<PlaneRegion<'_>>; 3]> =
            bands.iter().map(|_| [None, None, None]).collect();

        for (plane, buf) in self.planes.iter_mut().enumerate() {
            let stride = self.strides[plane];
            let height = self.heights[plane];
            let shift = if plane == 0 { 0 } else { sy };
            let mut rest: &mut [u8] = buf.as_mut_slice();
            let mut consumed = 0usize;
            for (band_index, &(_, end_row)) in bands.iter().enumerate() {
                let end_line = if band_index + 1 == bands.len() {
                    height
                } else {
                    ((end_row * rows_per_mb) >> shift).min(height)
                };
                let lines = end_line.saturating_sub(consumed);
                let (head, tail) = std::mem::take(&mut rest).split_at_mut(lines * stride);
                regions[band_index][plane] = Some(PlaneRegion {
                    data: head,
                    stride,
                    first_line: consumed,
                    lines,
                });
                rest = tail;
                consumed += lines;
            }
        }

        regions
            .into_iter()
            .zip(bands)
            .map(|([y, u, v], &(first_row, end_row))| PictureRegion {
                planes: [
                    y.unwrap_or_default(),
                    u.unwrap_or_default(),
                    v.unwrap_or_default(),
                ],
                first_row,
                end_row,
            })
            .collect()
    }
}

/// 参考平面只读视图
#[derive(Debug, Clone, Copy)]
pub(super) struct RefPlane<'a> {
    pub data: &'a [u8],
    pub stride: usize,
    pub height: usize,
}

impl RefPlane<'_> {
    /// 取样, 坐标越界时截断到边缘
    ///
    /// `field` 为 `Some(parity)` 时 `y` 为场行号.
    #[inline]
    pub(super) fn sample(&self, x: i32, y: i32, field: Option<usize>) -> u8 {
        let x = x.clamp(0, self.stride as i32 - 1) as usize;
        let line = match field {
            Some(parity) => {
                let field_lines = (self.height / 2).max(1) as i32;
                2 * y.clamp(0, field_lines - 1) as usize + parity
            }
            None => y.clamp(0, self.height as i32 - 1) as usize,
        };
        self.data.get(line * self.stride + x).copied().unwrap_or(128)
    }
}

/// 参考帧只读视图
#[derive(Debug, Clone, Copy)]
pub(super) struct RefFrame<'a> {
    pub planes: [RefPlane<'a>; 3],
}

/// 单个平面的可写行区间
#[derive(Debug, Default)]
pub(super) struct PlaneRegion<'a> {
    data: &'a mut [u8],
    stride: usize,
    first_line: usize,
    lines: usize,
}

impl PlaneRegion<'_> {
    /// 写入一行样本, 行号为整帧行号; 区间外的行被忽略并返回 false
    pub(super) fn write_line(&mut self, line: usize, x: usize, samples: &[u8]) -> bool {
        if line < self.first_line || line >= self.first_line + self.lines {
            return false;
        }
        let start = (line - self.first_line) * self.stride + x;
        let end = (start + samples.len()).min((line - self.first_line + 1) * self.stride);
        if start >= end {
            return false;
        }
        self.data[start..end].copy_from_slice(&samples[..end - start]);
        true
    }
}

/// 一个工作线程独占的宏块行区间
#[derive(Debug)]
pub(super) struct PictureRegion<'a> {
    pub planes: [PlaneRegion<'a>; 3],
    pub first_row: usize,
    pub end_row: usize,
}

impl PictureRegion<'_> {
    pub(super) fn contains_row(&self, row: usize) -> bool {
        (self.first_row..self.end_row).contains(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cif() -> SequenceHeader {
        SequenceHeader {
            width: 352,
            height: 288,
            progressive_sequence: true,
            ..SequenceHeader::default()
        }
    }

    #[test]
    fn test_buffer_dimensions() {
        let pic = PictureBuffer::new(&cif()).unwrap();
        assert_eq!(pic.strides, [352, 176, 176]);
        assert_eq!(pic.heights, [288, 144, 144]);
        assert!(pic.matches(&cif()));
    }

    #[test]
    fn test_split_rows_are_disjoint() {
        let mut pic = PictureBuffer::new(&cif()).unwrap();
        {
            let mut regions = pic.split_rows(&[(0, 5), (5, 18)], false);
            assert_eq!(regions.len(), 2);
            assert!(regions[0].planes[0].write_line(79, 0, &[1; 16]));
            assert!(!regions[0].planes[0].write_line(80, 0, &[1; 16]));
            assert!(regions[1].planes[0].write_line(80, 0, &[2; 16]));
            assert!(regions[1].planes[1].write_line(40, 8, &[3; 8]));
            assert!(regions[1].contains_row(17));
        }
        assert_eq!(pic.planes[0][79 * 352], 1);
        assert_eq!(pic.planes[0][80 * 352], 2);
        assert_eq!(pic.planes[1][40 * 176 + 8], 3);
    }

    #[test]
    fn test_field_sampling_clamps() {
        let mut pic = PictureBuffer::new(&cif()).unwrap();
        pic.planes[0][352] = 7; // 第 1 行 = 底场第 0 行
        let r = pic.reference();
        assert_eq!(r.planes[0].sample(-5, -3, Some(1)), 7);
        assert_eq!(r.planes[0].sample(0, 1, None), 7);
    }
}
