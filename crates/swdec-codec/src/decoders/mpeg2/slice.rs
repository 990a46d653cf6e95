//! Slice 与宏块层解码
//!
//! 每个 slice 从自己的起始码之后独立解码, 只写入所属宏块行区间.
//! 宏块先在 [`PredBuffer`] 中组装 (预测 + 残差), 再整块写回图片.

use log::{debug, trace};
use swdec_core::bitreader::BitReader;
use swdec_core::{SwdecError, SwdecResult};

use super::block::{BlockParams, decode_intra_block, decode_non_intra_block};
use super::motion::{
    BlockTarget, MotionInfo, MotionType, PredBuffer, dual_prime_vectors, predict_block,
    reconstruct_component,
};
use super::picture::{PictureRegion, RefFrame};
use super::tables::{
    MB_BACKWARD, MB_FORWARD, MB_INTRA, MB_PATTERN, MB_QUANT, MBA_ESCAPE, MBA_STUFFING, Mpeg2Vlc,
    quantiser_scale, vlc,
};
use super::types::{
    ChromaFormat, PictureCodingType, PictureHeader, QuantMatrices, SLICE_START_CODE_MAX,
    SLICE_START_CODE_MIN, SequenceHeader,
};
use crate::dsp::clip_u8;
use crate::dsp::idct::idct_8x8_sparse;

/// 图片级解码上下文, 所有工作线程只读共享
#[derive(Debug, Clone, Copy)]
pub(super) struct PictureContext<'a> {
    pub seq: &'a SequenceHeader,
    pub pic: &'a PictureHeader,
    pub quant: &'a QuantMatrices,
    /// 前向参考, 按参考场奇偶索引; 帧图片两项相同
    pub forward: [Option<RefFrame<'a>>; 2],
    /// 后向参考
    pub backward: [Option<RefFrame<'a>>; 2],
}

impl PictureContext<'_> {
    pub(super) fn mb_width(&self) -> usize {
        self.seq.mb_width()
    }

    /// 图片内宏块行数, 场图片为帧的一半
    pub(super) fn mb_rows(&self) -> usize {
        if self.pic.picture_structure.is_field() {
            self.seq.mb_height() / 2
        } else {
            self.seq.mb_height()
        }
    }

    fn field_parity(&self) -> Option<usize> {
        self.pic
            .picture_structure
            .is_field()
            .then(|| self.pic.picture_structure.parity())
    }
}

/// slice 在图片数据中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct SliceUnit {
    pub code: u32,
    /// 起始码之后的第一个字节
    pub start: usize,
    /// 下一个起始码 (或数据末尾) 的位置
    pub end: usize,
}

impl SliceUnit {
    /// 由 slice_vertical_position 得到的宏块行 (不含 2800 行以上的扩展位)
    pub(super) fn row_hint(&self) -> usize {
        ((self.code & 0xFF) as usize).saturating_sub(1)
    }
}

/// 扫描 `[start, end)` 中的所有 slice 起始码
pub(super) fn find_slices(data: &[u8], start: usize, end: usize) -> Vec<SliceUnit> {
    let end = end.min(data.len());
    let mut units = Vec::new();
    let mut current: Option<(u32, usize)> = None;
    let mut pos = start;
    while pos + 3 < end {
        if data[pos] != 0 || data[pos + 1] != 0 || data[pos + 2] != 1 {
            pos += 1;
            continue;
        }
        if let Some((code, first)) = current.take() {
            units.push(SliceUnit {
                code,
                start: first,
                end: pos,
            });
        }
        let code = 0x100 | u32::from(data[pos + 3]);
        if (SLICE_START_CODE_MIN..=SLICE_START_CODE_MAX).contains(&code) {
            current = Some((code, pos + 4));
        }
        pos += 4;
    }
    if let Some((code, first)) = current {
        units.push(SliceUnit {
            code,
            start: first,
            end,
        });
    }
    units
}

/// 一组 slice 的解码统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct SliceStats {
    pub slices: usize,
    pub macroblocks: usize,
    pub corrupted: bool,
}

impl SliceStats {
    pub(super) fn merge(&mut self, other: SliceStats) {
        self.slices += other.slices;
        self.macroblocks += other.macroblocks;
        self.corrupted |= other.corrupted;
    }
}

/// 解码属于 `region` 的 slice
///
/// 单个 slice 出错只放弃该 slice 的剩余部分并标记损坏.
pub(super) fn decode_slices(
    ctx: &PictureContext<'_>,
    data: &[u8],
    slices: &[SliceUnit],
    region: &mut PictureRegion<'_>,
) -> SliceStats {
    let mut stats = SliceStats::default();
    for unit in slices {
        let result = BitReader::with_range(data, unit.start, unit.end).and_then(|mut br| {
            let mut decoder = SliceDecoder::new(ctx);
            decoder.decode(&mut br, unit.code, region, &mut stats)
        });
        if let Err(e) = result {
            debug!("slice 0x{:03X} 解码失败: {e}", unit.code);
            stats.corrupted = true;
        }
    }
    stats
}

/// 单个 slice 的解码状态
struct SliceDecoder<'c, 'a> {
    ctx: &'c PictureContext<'a>,
    vlc: &'static Mpeg2Vlc,
    luma: BlockParams<'c>,
    chroma: BlockParams<'c>,
    frame_picture: bool,
    parity: Option<usize>,
    quantiser_scale: i32,
    dc_pred: [i32; 3],
    /// PMV[r][s][t]
    pmv: [[[i32; 2]; 2]; 2],
    last_motion: MotionInfo,
    last_intra: bool,
    block: [i32; 64],
}

impl<'c, 'a> SliceDecoder<'c, 'a> {
    fn new(ctx: &'c PictureContext<'a>) -> Self {
        let pic = ctx.pic;
        let luma = BlockParams {
            alternate_scan: pic.alternate_scan,
            intra_vlc_format: pic.intra_vlc_format,
            intra_dc_precision: pic.intra_dc_precision,
            intra_matrix: &ctx.quant.intra,
            non_intra_matrix: &ctx.quant.non_intra,
        };
        let chroma = BlockParams {
            intra_matrix: &ctx.quant.chroma_intra,
            non_intra_matrix: &ctx.quant.chroma_non_intra,
            ..luma
        };
        Self {
            ctx,
            vlc: vlc(),
            luma,
            chroma,
            frame_picture: !pic.picture_structure.is_field(),
            parity: ctx.field_parity(),
            quantiser_scale: 0,
            dc_pred: [0; 3],
            pmv: [[[0; 2]; 2]; 2],
            last_motion: MotionInfo::default(),
            last_intra: false,
            block: [0; 64],
        }
    }

    fn reset_dc(&mut self) {
        self.dc_pred = [128 << self.ctx.pic.intra_dc_precision; 3];
    }

    fn reset_pmv(&mut self) {
        self.pmv = [[[0; 2]; 2]; 2];
    }

    fn decode(
        &mut self,
        br: &mut BitReader<'_>,
        code: u32,
        region: &mut PictureRegion<'_>,
        stats: &mut SliceStats,
    ) -> SwdecResult<()> {
        let mut row = ((code & 0xFF) as usize).saturating_sub(1);
        if self.ctx.seq.height > 2800 {
            row += (br.read_bits(3)? as usize) << 7;
        }
        if row >= self.ctx.mb_rows() {
            return Err(SwdecError::Corrupted(format!("slice 行号越界: {row}")));
        }
        if !region.contains_row(row) {
            return Ok(());
        }
        stats.slices += 1;

        self.set_quantiser(br.read_bits(5)?, stats);
        if br.read_flag()? {
            // intra_slice_flag, intra_slice, reserved_bits
            br.skip_bits(8)?;
            while br.read_flag()? {
                br.skip_bits(8)?;
            }
        }
        self.reset_dc();
        self.reset_pmv();
        self.last_intra = false;
        self.last_motion = MotionInfo::default();

        let mb_width = self.ctx.mb_width();
        let mut mb_x = self.read_address_increment(br)? - 1;
        loop {
            if mb_x >= mb_width {
                return Err(SwdecError::Corrupted(format!(
                    "宏块地址越过行尾: 行 {row} 列 {mb_x}"
                )));
            }
            self.decode_macroblock(br, mb_x, row, region, stats)?;
            stats.macroblocks += 1;

            // slice 结束于下一个起始码前的 23 个零位
            if br.bits_left() == 0 || br.peek_bits_padded(23) == 0 {
                break;
            }
            let increment = self.read_address_increment(br)?;
            for _ in 1..increment {
                mb_x += 1;
                if mb_x >= mb_width {
                    return Err(SwdecError::Corrupted("跳过宏块越过行尾".into()));
                }
                self.skip_macroblock(mb_x, row, region, stats)?;
                stats.macroblocks += 1;
            }
            mb_x += 1;
        }
        trace!("slice 行 {row} 解码完成, 结束于列 {mb_x}");
        Ok(())
    }

    fn set_quantiser(&mut self, code: u32, stats: &mut SliceStats) {
        if code == 0 {
            debug!("quantiser_scale_code 为 0");
            stats.corrupted = true;
        }
        self.quantiser_scale = quantiser_scale(code, self.ctx.pic.q_scale_type);
    }

    fn read_address_increment(&self, br: &mut BitReader<'_>) -> SwdecResult<usize> {
        let mut increment = 0usize;
        loop {
            match self.vlc.mba.decode(br)? {
                MBA_ESCAPE => increment += 33,
                MBA_STUFFING => {}
                n => return Ok(increment + usize::from(n)),
            }
        }
    }

    // ========================================================================
    // 宏块
    // ========================================================================

    fn decode_macroblock(
        &mut self,
        br: &mut BitReader<'_>,
        mb_x: usize,
        row: usize,
        region: &mut PictureRegion<'_>,
        stats: &mut SliceStats,
    ) -> SwdecResult<()> {
        let pic = self.ctx.pic;
        let flags = match pic.coding_type {
            PictureCodingType::I => self.vlc.mb_type_i.decode(br)?,
            PictureCodingType::P => self.vlc.mb_type_p.decode(br)?,
            PictureCodingType::B => self.vlc.mb_type_b.decode(br)?,
        };
        let intra = flags & MB_INTRA != 0;
        let mut info = MotionInfo {
            forward: flags & MB_FORWARD != 0,
            backward: flags & MB_BACKWARD != 0,
            ..MotionInfo::default()
        };

        info.motion_type = if info.forward || info.backward {
            self.read_motion_type(br)?
        } else if self.frame_picture {
            MotionType::Frame
        } else {
            MotionType::Field
        };
        if info.motion_type == MotionType::DualPrime && pic.coding_type != PictureCodingType::P {
            return Err(SwdecError::Corrupted("双基预测只能用于 P 图片".into()));
        }

        let field_dct = self.frame_picture
            && !pic.frame_pred_frame_dct
            && flags & (MB_INTRA | MB_PATTERN) != 0
            && br.read_flag()?;

        if flags & MB_QUANT != 0 {
            let code = br.read_bits(5)?;
            self.set_quantiser(code, stats);
        }

        if intra {
            if pic.concealment_motion_vectors {
                self.read_motion_vectors(br, &mut info, 0)?;
                // marker_bit
                br.skip_bits(1)?;
            } else {
                self.reset_pmv();
            }
        } else {
            self.reset_dc();
            if info.forward {
                self.read_motion_vectors(br, &mut info, 0)?;
            }
            if info.backward {
                self.read_motion_vectors(br, &mut info, 1)?;
            }
            if pic.coding_type == PictureCodingType::P && !info.forward {
                // P 图片无运动补偿: 零向量同奇偶预测
                self.reset_pmv();
                info = self.zero_motion();
            }
        }

        let block_count = self.ctx.seq.chroma_format.block_count();
        let cbp = if flags & MB_PATTERN != 0 {
            let mut cbp = u32::from(self.vlc.cbp.decode(br)?);
            match self.ctx.seq.chroma_format {
                ChromaFormat::Yuv420 => {}
                ChromaFormat::Yuv422 => cbp = (cbp << 2) | br.read_bits(2)?,
                ChromaFormat::Yuv444 => cbp = (cbp << 6) | br.read_bits(6)?,
            }
            cbp
        } else if intra {
            (1 << block_count) - 1
        } else {
            0
        };

        let mut pixels = PredBuffer::default();
        if !intra && !self.predict(&info, mb_x, row, &mut pixels) {
            stats.corrupted = true;
        }
        self.add_residual(br, intra, cbp, field_dct, &mut pixels)?;
        self.write_macroblock(region, mb_x, row, &pixels);

        self.last_intra = intra;
        if !intra {
            self.last_motion = info;
        }
        Ok(())
    }

    /// 跳过的宏块: P 图片零向量预测, B 图片沿用前一宏块的运动
    fn skip_macroblock(
        &mut self,
        mb_x: usize,
        row: usize,
        region: &mut PictureRegion<'_>,
        stats: &mut SliceStats,
    ) -> SwdecResult<()> {
        self.reset_dc();
        let info = match self.ctx.pic.coding_type {
            PictureCodingType::I => {
                return Err(SwdecError::Corrupted("I 图片中出现跳过宏块".into()));
            }
            PictureCodingType::P => {
                self.reset_pmv();
                self.zero_motion()
            }
            PictureCodingType::B => {
                if self.last_intra {
                    return Err(SwdecError::Corrupted("帧内宏块之后的 B 跳过宏块".into()));
                }
                self.last_motion
            }
        };
        let mut pixels = PredBuffer::default();
        if !self.predict(&info, mb_x, row, &mut pixels) {
            stats.corrupted = true;
        }
        self.write_macroblock(region, mb_x, row, &pixels);
        self.last_motion = info;
        Ok(())
    }

    fn zero_motion(&self) -> MotionInfo {
        let parity = self.parity.unwrap_or(0);
        MotionInfo {
            forward: true,
            motion_type: if self.frame_picture {
                MotionType::Frame
            } else {
                MotionType::Field
            },
            field_select: [[parity; 2]; 2],
            ..MotionInfo::default()
        }
    }

    // ========================================================================
    // 运动向量
    // ========================================================================

    fn read_motion_type(&self, br: &mut BitReader<'_>) -> SwdecResult<MotionType> {
        if self.frame_picture && self.ctx.pic.frame_pred_frame_dct {
            return Ok(MotionType::Frame);
        }
        let code = br.read_bits(2)?;
        match (self.frame_picture, code) {
            (_, 1) => Ok(MotionType::Field),
            (true, 2) => Ok(MotionType::Frame),
            (false, 2) => Ok(MotionType::Mc16x8),
            (_, 3) => Ok(MotionType::DualPrime),
            _ => Err(SwdecError::Corrupted("运动类型为保留值 0".into())),
        }
    }

    /// (向量个数, 是否场格式, 是否双基)
    fn vector_layout(&self, motion_type: MotionType) -> (usize, bool, bool) {
        match (self.frame_picture, motion_type) {
            (true, MotionType::Frame) => (1, false, false),
            (true, MotionType::Field) => (2, true, false),
            (false, MotionType::Mc16x8) => (2, true, false),
            (_, MotionType::DualPrime) => (1, true, true),
            _ => (1, true, false),
        }
    }

    fn read_motion_vectors(
        &mut self,
        br: &mut BitReader<'_>,
        info: &mut MotionInfo,
        s: usize,
    ) -> SwdecResult<()> {
        let (count, field_format, dual) = self.vector_layout(info.motion_type);
        let mut dmv = [0i32; 2];
        if count == 1 {
            if field_format && !dual {
                info.field_select[0][s] = br.read_bit()? as usize;
            }
            self.read_motion_vector(br, info, 0, s, field_format, dual.then_some(&mut dmv))?;
            self.pmv[1][s] = self.pmv[0][s];
            info.vectors[1][s] = info.vectors[0][s];
            if dual {
                info.dual = dual_prime_vectors(
                    info.vectors[0][0],
                    dmv,
                    self.frame_picture,
                    self.ctx.pic.top_field_first,
                    self.parity == Some(1),
                );
            }
        } else {
            for r in 0..2 {
                info.field_select[r][s] = br.read_bit()? as usize;
                self.read_motion_vector(br, info, r, s, field_format, None)?;
            }
        }
        Ok(())
    }

    fn read_motion_vector(
        &mut self,
        br: &mut BitReader<'_>,
        info: &mut MotionInfo,
        r: usize,
        s: usize,
        field_format: bool,
        mut dmv: Option<&mut [i32; 2]>,
    ) -> SwdecResult<()> {
        for t in 0..2 {
            let f_code = self.ctx.pic.f_code[s][t];
            let magnitude = i32::from(self.vlc.motion_code.decode(br)?);
            let motion_code = if magnitude != 0 && br.read_flag()? {
                -magnitude
            } else {
                magnitude
            };
            let residual = if f_code > 1 && motion_code != 0 {
                br.read_bits(u32::from(f_code) - 1)? as i32
            } else {
                0
            };
            if let Some(dmv) = dmv.as_deref_mut() {
                dmv[t] = i32::from(self.vlc.dmvector.decode(br)?);
            }
            // 帧图片中的场向量: 垂直预测值以场行为单位
            let halve = t == 1 && field_format && self.frame_picture;
            let prediction = if halve {
                self.pmv[r][s][t] >> 1
            } else {
                self.pmv[r][s][t]
            };
            let vector = reconstruct_component(prediction, motion_code, residual, f_code);
            info.vectors[r][s][t] = vector;
            self.pmv[r][s][t] = if halve { vector * 2 } else { vector };
        }
        Ok(())
    }

    // ========================================================================
    // 预测
    // ========================================================================

    /// 组装运动补偿预测, 参考缺失时返回 false
    fn predict(&self, info: &MotionInfo, mb_x: usize, row: usize, out: &mut PredBuffer) -> bool {
        let mut complete = true;
        let mut first = true;
        let mut scratch = PredBuffer::default();
        for s in 0..2 {
            let used = if s == 0 { info.forward } else { info.backward };
            if !used {
                continue;
            }
            if first {
                complete &= self.predict_direction(info, s, mb_x, row, out);
                first = false;
            } else {
                complete &= self.predict_direction(info, s, mb_x, row, &mut scratch);
                out.average(&scratch);
            }
        }
        complete
    }

    fn fetch(
        &self,
        s: usize,
        field: Option<usize>,
        target: BlockTarget,
        vector: [i32; 2],
        out: &mut PredBuffer,
    ) -> bool {
        let refs = if s == 0 {
            &self.ctx.forward
        } else {
            &self.ctx.backward
        };
        let reference = refs[field.unwrap_or(0)].as_ref();
        predict_block(
            reference,
            field,
            self.ctx.seq.chroma_format,
            target,
            vector,
            out,
        );
        reference.is_some()
    }

    fn predict_direction(
        &self,
        info: &MotionInfo,
        s: usize,
        mb_x: usize,
        row: usize,
        out: &mut PredBuffer,
    ) -> bool {
        let x = (mb_x * 16) as i32;
        let full = BlockTarget {
            x,
            y: (row * 16) as i32,
            width: 16,
            height: 16,
            dst_row: 0,
            dst_parity: 0,
            dst_step: 1,
        };
        // 帧图片的场预测: 每个目标场 8 行, 隔行写入
        let half_field = |parity: usize| BlockTarget {
            y: (row * 8) as i32,
            height: 8,
            dst_parity: parity,
            dst_step: 2,
            ..full
        };

        match (self.frame_picture, info.motion_type) {
            (true, MotionType::Frame) => self.fetch(s, None, full, info.vectors[0][s], out),
            (true, MotionType::Field) => (0..2).fold(true, |ok, p| {
                let select = info.field_select[p][s];
                self.fetch(s, Some(select), half_field(p), info.vectors[p][s], out) && ok
            }),
            (true, MotionType::DualPrime) => {
                let mut opposite = PredBuffer::default();
                let mut ok = true;
                for p in 0..2 {
                    ok &= self.fetch(s, Some(p), half_field(p), info.vectors[0][0], out);
                    ok &= self.fetch(s, Some(1 - p), half_field(p), info.dual[p], &mut opposite);
                }
                out.average(&opposite);
                ok
            }
            (false, MotionType::Mc16x8) => (0..2).fold(true, |ok, r| {
                let target = BlockTarget {
                    y: (row * 16 + 8 * r) as i32,
                    height: 8,
                    dst_row: 8 * r,
                    ..full
                };
                let select = info.field_select[r][s];
                self.fetch(s, Some(select), target, info.vectors[r][s], out) && ok
            }),
            (false, MotionType::DualPrime) => {
                let parity = self.parity.unwrap_or(0);
                let mut opposite = PredBuffer::default();
                let ok = self.fetch(s, Some(parity), full, info.vectors[0][0], out);
                let ok = self.fetch(s, Some(1 - parity), full, info.dual[0], &mut opposite) && ok;
                out.average(&opposite);
                ok
            }
            (_, _) => {
                let select = info.field_select[0][s];
                self.fetch(s, Some(select), full, info.vectors[0][s], out)
            }
        }
    }

    // ========================================================================
    // 残差与写回
    // ========================================================================

    fn add_residual(
        &mut self,
        br: &mut BitReader<'_>,
        intra: bool,
        cbp: u32,
        field_dct: bool,
        pixels: &mut PredBuffer,
    ) -> SwdecResult<()> {
        let chroma = self.ctx.seq.chroma_format;
        let (sx, _) = chroma.shift();
        let count = chroma.block_count();
        for index in 0..count {
            if (cbp >> (count - 1 - index)) & 1 == 0 {
                continue;
            }
            let luma = index < 4;
            let component = if luma { 0 } else { 1 + ((index - 4) & 1) };
            let params = if luma { &self.luma } else { &self.chroma };
            let sparsity = if intra {
                decode_intra_block(
                    br,
                    self.vlc,
                    params,
                    luma,
                    self.quantiser_scale,
                    &mut self.dc_pred[component],
                    &mut self.block,
                )?
            } else {
                decode_non_intra_block(br, self.vlc, params, self.quantiser_scale, &mut self.block)?
            };
            idct_8x8_sparse(&mut self.block, sparsity);

            let (plane, x, first_row, step) = block_position(index, chroma, field_dct);
            let stride = if plane == 0 { 16 } else { 16 >> sx };
            let buf = &mut pixels.planes[plane];
            for k in 0..8 {
                let base = (first_row + k * step) * stride + x;
                for (dst, &v) in buf[base..base + 8]
                    .iter_mut()
                    .zip(&self.block[k * 8..k * 8 + 8])
                {
                    *dst = if intra {
                        clip_u8(v)
                    } else {
                        clip_u8(i32::from(*dst) + v)
                    };
                }
            }
        }
        Ok(())
    }

    fn write_macroblock(
        &self,
        region: &mut PictureRegion<'_>,
        mb_x: usize,
        row: usize,
        pixels: &PredBuffer,
    ) {
        let (sx, sy) = self.ctx.seq.chroma_format.shift();
        for plane in 0..3 {
            let (shift_x, shift_y) = if plane == 0 { (0, 0) } else { (sx, sy) };
            let width = 16 >> shift_x;
            let height = 16 >> shift_y;
            for k in 0..height {
                let line = match self.parity {
                    Some(parity) => 2 * (row * height + k) + parity,
                    None => row * height + k,
                };
                region.planes[plane].write_line(
                    line,
                    mb_x * width,
                    &pixels.planes[plane][k * width..(k + 1) * width],
                );
            }
        }
    }
}

/// 块在宏块缓冲中的位置: (平面, 列, 首行, 行步长)
///
/// 场 DCT 时亮度块按场交织; 色度只有高度为 16 时才交织.
fn block_position(
    index: usize,
    chroma: ChromaFormat,
    field_dct: bool,
) -> (usize, usize, usize, usize) {
    if index < 4 {
        let x = (index & 1) * 8;
        let by = index >> 1;
        return if field_dct {
            (0, x, by, 2)
        } else {
            (0, x, by * 8, 1)
        };
    }
    let plane = 1 + ((index - 4) & 1);
    let j = (index - 4) >> 1;
    let (sx, sy) = chroma.shift();
    let per_row = (16 >> sx) / 8;
    let x = (j % per_row) * 8;
    let by = j / per_row;
    if field_dct && sy == 0 {
        (plane, x, by, 2)
    } else {
        (plane, x, by * 8, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::super::picture::PictureBuffer;
    use super::super::types::PictureStructure;
    use super::*;
    use swdec_core::bitwriter::BitWriter;

    fn sequence(width: u32, height: u32) -> SequenceHeader {
        SequenceHeader {
            width,
            height,
            progressive_sequence: true,
            ..SequenceHeader::default()
        }
    }

    fn picture(coding_type: PictureCodingType) -> PictureHeader {
        PictureHeader {
            coding_type,
            picture_structure: PictureStructure::Frame,
            frame_pred_frame_dct: true,
            progressive_frame: true,
            f_code: [[1, 1], [1, 1]],
            ..PictureHeader::default()
        }
    }

    #[test]
    fn test_find_slices() {
        let data = [
            0, 0, 1, 0x00, 0xAA, 0, 0, 1, 0x01, 0x11, 0x22, 0, 0, 1, 0x02, 0x33, 0, 0, 1, 0xB7,
        ];
        let units = find_slices(&data, 0, data.len());
        assert_eq!(
            units,
            vec![
                SliceUnit {
                    code: 0x101,
                    start: 9,
                    end: 11
                },
                SliceUnit {
                    code: 0x102,
                    start: 15,
                    end: 16
                },
            ]
        );
        assert_eq!(units[1].row_hint(), 1);
    }

    #[test]
    fn test_block_positions() {
        assert_eq!(block_position(3, ChromaFormat::Yuv420, false), (0, 8, 8, 1));
        assert_eq!(block_position(2, ChromaFormat::Yuv420, true), (0, 0, 1, 2));
        assert_eq!(block_position(5, ChromaFormat::Yuv420, true), (2, 0, 0, 1));
        assert_eq!(block_position(6, ChromaFormat::Yuv422, false), (1, 0, 8, 1));
        assert_eq!(block_position(6, ChromaFormat::Yuv422, true), (1, 0, 1, 2));
        assert_eq!(block_position(9, ChromaFormat::Yuv444, false), (2, 0, 8, 1));
        assert_eq!(block_position(7, ChromaFormat::Yuv444, false), (2, 8, 0, 1));
    }

    #[test]
    fn test_intra_macroblock_dc_only() {
        let seq = sequence(16, 16);
        let pic = picture(PictureCodingType::I);
        let quant = QuantMatrices::default();
        let ctx = PictureContext {
            seq: &seq,
            pic: &pic,
            quant: &quant,
            forward: [None, None],
            backward: [None, None],
        };

        let mut bw = BitWriter::new();
        bw.write_start_code(0x01);
        bw.write_bits(8, 5); // quantiser_scale_code
        bw.write_bits(0, 1); // extra_bit_slice
        bw.write_bits(1, 1); // address increment 1
        bw.write_bits(1, 1); // macroblock_type: intra
        // 第一个亮度块 dc_size=3, 差值 7
        bw.write_bits(0b101, 3);
        bw.write_bits(0b111, 3);
        bw.write_bits(0b10, 2);
        for _ in 0..3 {
            bw.write_bits(0b100, 3);
            bw.write_bits(0b10, 2);
        }
        for _ in 0..2 {
            bw.write_bits(0b00, 2);
            bw.write_bits(0b10, 2);
        }
        bw.write_start_code(0xB7);
        let data = bw.finish();

        let mut buffer = PictureBuffer::new(&seq).unwrap();
        buffer.planes[0].fill(0);
        let slices = find_slices(&data, 0, data.len());
        assert_eq!(slices.len(), 1);
        let stats = {
            let mut regions = buffer.split_rows(&[(0, 1)], false);
            decode_slices(&ctx, &data, &slices, &mut regions[0])
        };
        assert_eq!(
            stats,
            SliceStats {
                slices: 1,
                macroblocks: 1,
                corrupted: false
            }
        );
        assert!(
            buffer.planes[0]
                .iter()
                .all(|&v| (i32::from(v) - 135).abs() <= 1)
        );
        assert!(
            buffer.planes[1]
                .iter()
                .all(|&v| (i32::from(v) - 128).abs() <= 1)
        );
    }

    #[test]
    fn test_p_skipped_macroblock_copies_reference() {
        let seq = sequence(48, 16);
        let pic = picture(PictureCodingType::P);
        let quant = QuantMatrices::default();
        let mut reference = PictureBuffer::new(&seq).unwrap();
        for (i, v) in reference.planes[0].iter_mut().enumerate() {
            *v = (i % 251) as u8;
        }
        let refs = reference.reference();
        let ctx = PictureContext {
            seq: &seq,
            pic: &pic,
            quant: &quant,
            forward: [Some(refs), Some(refs)],
            backward: [None, None],
        };

        let mut bw = BitWriter::new();
        bw.write_start_code(0x01);
        bw.write_bits(4, 5);
        bw.write_bits(0, 1);
        // 宏块 0: 运动补偿, 无残差, 零向量
        bw.write_bits(1, 1);
        bw.write_bits(0b001, 3);
        bw.write_bits(0b11, 2);
        // 宏块 2: 地址增量 2, 宏块 1 被跳过
        bw.write_bits(0b011, 3);
        bw.write_bits(0b001, 3);
        bw.write_bits(0b11, 2);
        bw.write_start_code(0xB7);
        let data = bw.finish();

        let mut current = PictureBuffer::new(&seq).unwrap();
        current.planes[0].fill(0);
        let slices = find_slices(&data, 0, data.len());
        let stats = {
            let mut regions = current.split_rows(&[(0, 1)], false);
            decode_slices(&ctx, &data, &slices, &mut regions[0])
        };
        assert_eq!(stats.macroblocks, 3);
        assert!(!stats.corrupted);
        assert_eq!(current.planes[0], reference.planes[0]);
    }

    #[test]
    fn test_missing_reference_marks_corruption() {
        let seq = sequence(16, 16);
        let pic = picture(PictureCodingType::P);
        let quant = QuantMatrices::default();
        let ctx = PictureContext {
            seq: &seq,
            pic: &pic,
            quant: &quant,
            forward: [None, None],
            backward: [None, None],
        };
        let mut bw = BitWriter::new();
        bw.write_start_code(0x01);
        bw.write_bits(4, 5);
        bw.write_bits(0, 1);
        bw.write_bits(1, 1);
        bw.write_bits(0b001, 3);
        bw.write_bits(0b11, 2);
        bw.write_start_code(0xB7);
        let data = bw.finish();

        let mut current = PictureBuffer::new(&seq).unwrap();
        current.planes[0].fill(0);
        let slices = find_slices(&data, 0, data.len());
        let stats = {
            let mut regions = current.split_rows(&[(0, 1)], false);
            decode_slices(&ctx, &data, &slices, &mut regions[0])
        };
        assert!(stats.corrupted);
        assert!(current.planes[0].iter().all(|&v| v == 128));
    }

    /// 一个 16 像素宽的 intra slice: 单个宏块, 亮度 DC 差值 7, 其余为 0
    fn write_intra_slice(bw: &mut BitWriter, code: u8, quantiser_code: u32) {
        bw.write_start_code(code);
        bw.write_bits(quantiser_code, 5);
        bw.write_bits(0, 1);
        bw.write_bits(1, 1);
        bw.write_bits(1, 1);
        bw.write_bits(0b101, 3);
        bw.write_bits(0b111, 3);
        bw.write_bits(0b10, 2);
        for _ in 0..3 {
            bw.write_bits(0b100, 3);
            bw.write_bits(0b10, 2);
        }
        for _ in 0..2 {
            bw.write_bits(0b00, 2);
            bw.write_bits(0b10, 2);
        }
    }

    #[test]
    fn test_vertical_position_beyond_picture_marks_corruption() {
        let seq = sequence(16, 32);
        let pic = picture(PictureCodingType::I);
        let quant = QuantMatrices::default();
        let ctx = PictureContext {
            seq: &seq,
            pic: &pic,
            quant: &quant,
            forward: [None, None],
            backward: [None, None],
        };
        let mut bw = BitWriter::new();
        write_intra_slice(&mut bw, 0x01, 8);
        write_intra_slice(&mut bw, 0x03, 8);
        write_intra_slice(&mut bw, 0x02, 8);
        bw.write_start_code(0xB7);
        let data = bw.finish();

        let mut buffer = PictureBuffer::new(&seq).unwrap();
        buffer.planes[0].fill(0);
        let slices = find_slices(&data, 0, data.len());
        assert_eq!(slices.len(), 3);
        let stats = {
            let mut regions = buffer.split_rows(&[(0, 2)], false);
            decode_slices(&ctx, &data, &slices, &mut regions[0])
        };
        assert_eq!(
            stats,
            SliceStats {
                slices: 2,
                macroblocks: 2,
                corrupted: true
            }
        );
        assert!(
            buffer.planes[0]
                .iter()
                .all(|&v| (i32::from(v) - 135).abs() <= 1)
        );
    }

    #[test]
    fn test_zero_quantiser_scale_marks_corruption() {
        let seq = sequence(16, 16);
        let pic = picture(PictureCodingType::I);
        let quant = QuantMatrices::default();
        let ctx = PictureContext {
            seq: &seq,
            pic: &pic,
            quant: &quant,
            forward: [None, None],
            backward: [None, None],
        };
        let mut bw = BitWriter::new();
        write_intra_slice(&mut bw, 0x01, 0);
        bw.write_start_code(0xB7);
        let data = bw.finish();

        let mut buffer = PictureBuffer::new(&seq).unwrap();
        buffer.planes[0].fill(0);
        let slices = find_slices(&data, 0, data.len());
        let stats = {
            let mut regions = buffer.split_rows(&[(0, 1)], false);
            decode_slices(&ctx, &data, &slices, &mut regions[0])
        };
        assert!(stats.corrupted);
        assert_eq!((stats.slices, stats.macroblocks), (1, 1));
        assert!(
            buffer.planes[0]
                .iter()
                .all(|&v| (i32::from(v) - 135).abs() <= 1)
        );
    }

    #[test]
    fn test_slice_outside_region_is_ignored() {
        let seq = sequence(16, 32);
        let pic = picture(PictureCodingType::I);
        let quant = QuantMatrices::default();
        let ctx = PictureContext {
            seq: &seq,
            pic: &pic,
            quant: &quant,
            forward: [None, None],
            backward: [None, None],
        };
        let mut bw = BitWriter::new();
        bw.write_start_code(0x02);
        bw.write_bits(8, 5);
        bw.write_bits(0, 1);
        bw.write_start_code(0xB7);
        let data = bw.finish();
        let mut current = PictureBuffer::new(&seq).unwrap();
        let slices = find_slices(&data, 0, data.len());
        let stats = {
            let mut regions = current.split_rows(&[(0, 1), (1, 2)], false);
            decode_slices(&ctx, &data, &slices, &mut regions[0])
        };
        assert_eq!(stats, SliceStats::default());
    }
}
