//! 语法单元切分与图片级控制流程

use bytes::{Buf, Bytes};
use log::{debug, info, trace, warn};
use swdec_core::bitreader::BitReader;
use swdec_core::{ErrorKind, SwdecError, SwdecResult};

use super::accel::{self, AccelStatus};
use super::dpb::DPB_SIZE;
use super::header::{self, HeaderStatus};
use super::picture::PictureBuffer;
use super::slice::{PictureContext, SliceStats, find_slices};
use super::timing::picture_duration;
use super::types::*;
use super::{Mpeg2Decoder, TaskInfo, UserData};
use crate::codec_parameters::{DecodeFlags, SkipLevel};

// ============================================================================
// 起始码扫描
// ============================================================================

/// 从 `from` 开始查找起始码前缀 00 00 01, 返回前缀位置与完整起始码
///
/// 前缀之后的码值字节尚未到达时视为未找到.
pub(super) fn next_start_code(data: &[u8], from: usize) -> Option<(usize, u32)> {
    let mut i = from;
    while i + 3 < data.len() {
        if data[i + 2] > 1 {
            i += 3;
        } else if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            return Some((i, 0x100 | u32::from(data[i + 3])));
        } else {
            i += 1;
        }
    }
    None
}

/// 能结束一个图片单元的起始码
fn ends_picture(code: u32) -> bool {
    matches!(
        code,
        PICTURE_START_CODE
            | SEQUENCE_HEADER_CODE
            | GROUP_START_CODE
            | SEQUENCE_END_CODE
            | SEQUENCE_ERROR_CODE
    )
}

fn unit_reader(unit: &[u8]) -> SwdecResult<BitReader<'_>> {
    BitReader::with_range(unit, 4.min(unit.len()), unit.len())
}

/// 图片单元中第一个 slice 之前的内容
struct PictureUnit {
    header: PictureHeader,
    /// 图片级量化矩阵扩展更新后的矩阵
    quant: Option<QuantMatrices>,
    user_data: Vec<Vec<u8>>,
    /// 第一个 slice 起始码的位置
    slice_start: usize,
}

/// 解析图片头及其扩展, 不修改解码器状态
fn parse_picture_unit(
    seq: &SequenceHeader,
    quant: &QuantMatrices,
    unit: &[u8],
) -> SwdecResult<PictureUnit> {
    let mut br = unit_reader(unit)?;
    let mut header = header::parse_picture_header(&mut br)?;
    let mut matrices: Option<QuantMatrices> = None;
    let mut user_data = Vec::new();
    let mut slice_start = unit.len();

    let mut cursor = next_start_code(unit, 4);
    while let Some((pos, code)) = cursor {
        if is_slice_code(code) {
            slice_start = pos;
            break;
        }
        let next = next_start_code(unit, pos + 3);
        let end = next.map_or(unit.len(), |(p, _)| p);
        match code {
            EXTENSION_START_CODE => {
                let mut br = BitReader::with_range(unit, pos + 4, end)?;
                match br.read_bits(4)? {
                    EXT_PICTURE_CODING => {
                        header::parse_picture_coding_extension(&mut br, &mut header)?
                    }
                    EXT_PICTURE_DISPLAY => {
                        header::parse_picture_display_extension(&mut br, seq, &mut header)?
                    }
                    EXT_QUANT_MATRIX => {
                        let m = matrices.get_or_insert_with(|| quant.clone());
                        header::parse_quant_matrix_extension(&mut br, m)?;
                    }
                    EXT_PICTURE_SPATIAL_SCALABLE | EXT_PICTURE_TEMPORAL_SCALABLE => {
                        return Err(SwdecError::Unsupported("MPEG-2 可分级图片扩展".into()));
                    }
                    id => trace!("MPEG-2: 跳过图片扩展 {id}"),
                }
            }
            USER_DATA_START_CODE => user_data.push(unit[pos + 4..end].to_vec()),
            other => trace!("MPEG-2: 图片单元中忽略起始码 0x{other:03X}"),
        }
        cursor = next;
    }

    Ok(PictureUnit {
        header,
        quant: matrices,
        user_data,
        slice_start,
    })
}

// ============================================================================
// 控制循环
// ============================================================================

impl Mpeg2Decoder {
    /// 处理缓冲中所有完整的语法单元, 返回是否有进展
    ///
    /// DPB 没有空闲槽位时停在当前图片之前, 等待调用方释放显示帧.
    pub(super) fn run(&mut self) -> SwdecResult<bool> {
        let mut progress = false;
        while let Some((end, code)) = self.next_unit() {
            let offset = self.consumed;
            let result = if code == PICTURE_START_CODE {
                let parsed = parse_picture_unit(&self.seq, &self.quant, &self.input[..end]);
                if let Ok(unit) = &parsed {
                    if self.must_wait_for_slot(&unit.header) {
                        debug!("MPEG-2: DPB 已满, 等待显示释放");
                        break;
                    }
                }
                let data = self.take(end);
                parsed.and_then(|unit| self.on_picture(unit, &data, offset))
            } else {
                let data = self.take(end);
                self.on_unit(code, &data)
            };
            progress = true;
            if let Err(err) = result {
                self.handle_unit_error(err)?;
            }
        }

        if self.end_of_stream && self.input.is_empty() && !self.eos_flushed {
            let reorder = self.reorder();
            self.frames.flush(reorder, &mut self.clock);
            self.eos_flushed = true;
            progress = true;
            debug!("MPEG-2: 流结束, 已送出缓存的参考图片");
        }
        Ok(progress)
    }

    /// 定位下一个完整的语法单元, 返回 (结束位置, 起始码)
    ///
    /// 单元之前的无效字节被丢弃. 图片单元包含其扩展与全部 slice.
    fn next_unit(&mut self) -> Option<(usize, u32)> {
        let Some((start, code)) = next_start_code(&self.input, 0) else {
            // 末尾最多 3 字节可能是被截断的起始码前缀
            let keep = if self.end_of_stream { 0 } else { 3 };
            let garbage = self.input.len().saturating_sub(keep);
            self.discard(garbage);
            return None;
        };
        if start > 0 {
            trace!("MPEG-2: 丢弃 {start} 字节无效数据");
            self.discard(start);
        }

        let mut from = 4;
        let end = loop {
            match next_start_code(&self.input, from) {
                Some((pos, next)) if code != PICTURE_START_CODE || ends_picture(next) => {
                    break Some(pos);
                }
                Some((pos, _)) => from = pos + 3,
                None => break None,
            }
        };
        match end {
            Some(end) => Some((end, code)),
            None if self.end_of_stream => Some((self.input.len(), code)),
            None => None,
        }
    }

    fn take(&mut self, len: usize) -> Bytes {
        self.consumed += len;
        self.input.split_to(len).freeze()
    }

    fn discard(&mut self, len: usize) {
        if len > 0 {
            self.input.advance(len);
            self.consumed += len;
        }
    }

    /// 按错误类别决定继续还是终止
    fn handle_unit_error(&mut self, err: SwdecError) -> SwdecResult<()> {
        match err.kind() {
            ErrorKind::NeedMoreData | ErrorKind::RecoverableCorruption => {
                warn!("MPEG-2: 丢弃无法解析的语法单元: {err}");
                Ok(())
            }
            ErrorKind::UnsupportedFeature => Err(err),
            ErrorKind::FatalConfiguration => {
                warn!("MPEG-2: 致命错误, 清空显示队列: {err}");
                self.failed = true;
                self.frames.reset();
                Err(err)
            }
        }
    }

    /// 当前图片需要新槽位而 DPB 已满
    fn must_wait_for_slot(&self, pic: &PictureHeader) -> bool {
        if self.frames.find_free_task().is_some() {
            return false;
        }
        let structure = pic.picture_structure;
        if !structure.is_field() {
            return true;
        }
        let pairs_pending = self
            .frames
            .pending_field()
            .and_then(|task| self.tasks[task].as_ref())
            .is_some_and(|first| first.header.picture_structure != structure);
        let dropped_second = self.skip_second_field == Some(structure.parity());
        !(pairs_pending || dropped_second)
    }

    /// 消耗不晚于 `offset` 的外部时间, 返回其中最新的一个
    fn take_time(&mut self, offset: usize) -> Option<f64> {
        let mut found = None;
        while let Some(&(pos, time)) = self.times.front() {
            if pos > offset {
                break;
            }
            found = Some(time);
            self.times.pop_front();
        }
        found
    }

    fn push_user_data(&mut self, data: Vec<u8>, time: f64) {
        if self.user_data.len() >= USER_DATA_QUEUE_LIMIT {
            self.user_data.pop_front();
            trace!("MPEG-2: 用户数据队列已满, 丢弃最早的一条");
        }
        self.user_data.push_back(UserData { time, data });
    }

    // ------------------------------------------------------------------------
    // 非图片单元
    // ------------------------------------------------------------------------

    fn on_unit(&mut self, code: u32, unit: &[u8]) -> SwdecResult<()> {
        match code {
            SEQUENCE_HEADER_CODE => self.on_sequence_header(unit),
            EXTENSION_START_CODE => self.on_extension(unit),
            GROUP_START_CODE => {
                let mut br = unit_reader(unit)?;
                self.seq.gop = header::parse_gop_header(&mut br)?;
                self.after_sequence = false;
                Ok(())
            }
            USER_DATA_START_CODE => {
                let payload = unit.get(4..).unwrap_or_default().to_vec();
                let time = self.clock.stream_time();
                self.push_user_data(payload, time);
                Ok(())
            }
            SEQUENCE_END_CODE => {
                debug!("MPEG-2: 序列结束");
                let reorder = self.reorder();
                self.frames.drain_references(reorder, &mut self.clock);
                Ok(())
            }
            SEQUENCE_ERROR_CODE => {
                warn!("MPEG-2: 码流中出现 sequence_error_code");
                Ok(())
            }
            c if is_slice_code(c) => {
                trace!("MPEG-2: 图片之外的 slice 0x{c:03X}, 丢弃");
                Ok(())
            }
            other => {
                trace!("MPEG-2: 忽略起始码 0x{other:03X}");
                Ok(())
            }
        }
    }

    fn on_sequence_header(&mut self, unit: &[u8]) -> SwdecResult<()> {
        let mut br = unit_reader(unit)?;
        let mut seq = self.seq.clone();
        let mut quant = self.quant.clone();
        let status = header::parse_sequence_header(&mut br, &mut seq, &mut quant)?;
        if status == HeaderStatus::ResolutionChanged {
            info!(
                "MPEG-2: 序列头尺寸变化 {}x{} -> {}x{}",
                self.seq.width, self.seq.height, seq.width, seq.height
            );
        }
        self.seq = seq;
        self.quant = quant;
        self.has_sequence = true;
        self.after_sequence = true;
        self.sequence_bytes.clear();
        self.sequence_bytes.extend_from_slice(unit);
        Ok(())
    }

    fn on_extension(&mut self, unit: &[u8]) -> SwdecResult<()> {
        let mut br = unit_reader(unit)?;
        let id = br.read_bits(4)?;
        if !self.after_sequence {
            trace!("MPEG-2: 忽略 GOP 之后的扩展 {id}");
            return Ok(());
        }
        match id {
            EXT_SEQUENCE => {
                let mut seq = self.seq.clone();
                if header::parse_sequence_extension(&mut br, &mut seq)? {
                    info!("MPEG-2: 序列扩展改变了尺寸或色度格式");
                }
                self.seq = seq;
            }
            EXT_SEQUENCE_DISPLAY => {
                header::parse_sequence_display_extension(&mut br, &mut self.seq)?
            }
            EXT_QUANT_MATRIX => header::parse_quant_matrix_extension(&mut br, &mut self.quant)?,
            EXT_SEQUENCE_SCALABLE => {
                return Err(SwdecError::Unsupported("MPEG-2 可分级序列扩展".into()));
            }
            other => trace!("MPEG-2: 跳过序列扩展 {other}"),
        }
        self.sequence_bytes.extend_from_slice(unit);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // 图片单元
    // ------------------------------------------------------------------------

    fn on_picture(&mut self, unit: PictureUnit, data: &[u8], offset: usize) -> SwdecResult<()> {
        let PictureUnit {
            header: pic,
            quant,
            user_data,
            slice_start,
        } = unit;
        let time = self.take_time(offset);
        if !self.has_sequence {
            debug!("MPEG-2: 尚未收到序列头, 丢弃图片");
            return Ok(());
        }
        if !self.seq.has_extension {
            return Err(SwdecError::Unsupported(
                "MPEG-1 码流 (缺少序列扩展)".into(),
            ));
        }
        self.after_sequence = false;
        if let Some(quant) = quant {
            self.quant = quant;
        }

        let structure = pic.picture_structure;
        if let Some(parity) = self.skip_second_field.take() {
            if structure.is_field() && structure.parity() == parity {
                trace!("MPEG-2: 首场已跳过, 丢弃第二场");
                return Ok(());
            }
        }
        if structure.is_field() && pic.progressive_frame {
            warn!("MPEG-2: 场图片标记为逐行帧, 跳过");
            return Ok(());
        }
        if !pic.has_coding_extension {
            warn!("MPEG-2: 图片缺少编码扩展, 标记为损坏");
        }

        let second_field = self.pair_field(&pic)?;
        let task = match second_field {
            Some(task) => task,
            None => {
                self.check_geometry()?;
                if self.should_skip(pic.coding_type) {
                    self.skip_picture(&pic);
                    return Ok(());
                }
                let task = self
                    .frames
                    .find_free_task()
                    .ok_or_else(|| SwdecError::Internal("DPB 没有空闲槽位".into()))?;
                self.begin_frame(task, &pic, time)?;
                task
            }
        };
        let curr = if second_field.is_some() {
            task + DPB_SIZE
        } else {
            task
        };
        self.frames.link(curr, pic.coding_type, second_field.is_none());

        let corrupted = match self.decode_picture(&pic, data, slice_start, task, curr) {
            Ok(stats) => stats.corrupted,
            Err(err) if err.is_recoverable() => {
                warn!("MPEG-2: 槽位 {task} 解码失败: {err}");
                true
            }
            Err(err) => return Err(err),
        };
        if corrupted {
            if let Some(slot) = self.frames.slot_mut(task) {
                slot.is_corrupted = true;
            }
        }
        self.decoded_pictures += 1;

        let user_time = time.unwrap_or_else(|| self.clock.stream_time());
        for payload in user_data {
            self.push_user_data(payload, user_time);
        }

        if structure.is_field() && second_field.is_none() {
            self.frames.set_pending_field(Some(task));
            return Ok(());
        }
        self.frames.set_pending_field(None);
        let coding = self.tasks[task]
            .as_ref()
            .map_or(pic.coding_type, |t| t.header.coding_type);
        let reorder = self.reorder();
        self.frames.complete(task, coding, reorder, &mut self.clock);
        trace!("MPEG-2: 槽位 {task} ({coding:?}) 解码完成");
        Ok(())
    }

    /// 判定场图片是否为等待中首场的第二场
    ///
    /// 首场得不到匹配的第二场时, 该帧标记为损坏后直接完成.
    fn pair_field(&mut self, pic: &PictureHeader) -> SwdecResult<Option<usize>> {
        let Some(task) = self.frames.pending_field() else {
            return Ok(None);
        };
        let Some((first_structure, first_coding)) = self.tasks[task]
            .as_ref()
            .map(|t| (t.header.picture_structure, t.header.coding_type))
        else {
            self.abandon_pending();
            return Ok(None);
        };
        if !pic.picture_structure.is_field() || pic.picture_structure == first_structure {
            warn!("MPEG-2: 槽位 {task} 的首场没有对应的第二场");
            self.abandon_pending();
            return Ok(None);
        }
        let compatible = pic.coding_type == first_coding
            || (first_coding == PictureCodingType::I && pic.coding_type == PictureCodingType::P);
        if !compatible {
            self.abandon_pending();
            return Err(SwdecError::InvalidData(format!(
                "第二场类型 {:?} 与首场 {first_coding:?} 不匹配",
                pic.coding_type
            )));
        }
        Ok(Some(task))
    }

    fn abandon_pending(&mut self) {
        let Some(task) = self.frames.pending_field() else {
            return;
        };
        self.frames.set_pending_field(None);
        if let Some(slot) = self.frames.slot_mut(task) {
            slot.is_corrupted = true;
        }
        let coding = self.tasks[task]
            .as_ref()
            .map_or(PictureCodingType::I, |t| t.header.coding_type);
        let reorder = self.reorder();
        self.frames.complete(task, coding, reorder, &mut self.clock);
    }

    /// 检查尺寸上限; 尺寸或色度格式变化时先送出旧参考图片
    fn check_geometry(&mut self) -> SwdecResult<()> {
        let (width, height) = (self.seq.width, self.seq.height);
        let (max_w, max_h) = (self.params.width, self.params.height);
        if max_w > 0 && max_h > 0 && (width > max_w || height > max_h) {
            return Err(SwdecError::Unsupported(format!(
                "码流尺寸 {width}x{height} 超出配置上限 {max_w}x{max_h}"
            )));
        }
        let geometry = (width, height, self.seq.chroma_format);
        if self.geometry != Some(geometry) {
            if let Some((w, h, chroma)) = self.geometry {
                info!(
                    "MPEG-2: 分辨率变化 {w}x{h} {chroma:?} -> {width}x{height} {:?}",
                    self.seq.chroma_format
                );
                let reorder = self.reorder();
                self.frames.drain_references(reorder, &mut self.clock);
            }
            self.geometry = Some(geometry);
        }
        Ok(())
    }

    /// 跳帧判定, 同时记录已见过的参考图片
    ///
    /// 第二个参考图片出现之前的 B 图片缺少后向参考, 总是跳过.
    fn should_skip(&mut self, coding: PictureCodingType) -> bool {
        match coding {
            PictureCodingType::I => {
                if self.first_i_seen {
                    self.first_p_seen = true;
                }
                self.first_i_seen = true;
                self.skip_level >= SkipLevel::All
            }
            PictureCodingType::P => {
                self.first_p_seen = true;
                self.skip_level >= SkipLevel::PB
            }
            PictureCodingType::B => {
                if !self.first_p_seen {
                    debug!("MPEG-2: B 图片之前只有一个参考图片, 跳过");
                    return true;
                }
                self.skip_level >= SkipLevel::B
            }
        }
    }

    fn picture_duration(&self, pic: &PictureHeader) -> (f64, bool) {
        let rate = self.params.frame_rate.map(|r| r.to_f64());
        let telecine = self.params.flags.contains(DecodeFlags::TELECINE_PTS);
        picture_duration(&self.seq, pic, rate, telecine)
    }

    /// 跳过一张图片: 不占用槽位, 只推进流时钟
    fn skip_picture(&mut self, pic: &PictureHeader) {
        let (duration, _) = self.picture_duration(pic);
        let is_anchor = pic.coding_type != PictureCodingType::B;
        let reorder = self.reorder();
        self.clock.skip(duration, is_anchor, reorder);
        self.skipped_frames += 1;
        if pic.picture_structure.is_field() {
            self.skip_second_field = Some(1 - pic.picture_structure.parity());
        }
        trace!(
            "MPEG-2: 跳过 {:?} 图片 (级别 {:?})",
            pic.coding_type, self.skip_level
        );
    }

    /// 锁定槽位并初始化帧级簿记
    fn begin_frame(&mut self, task: usize, pic: &PictureHeader, time: Option<f64>) -> SwdecResult<()> {
        self.frames.lock_task(task)?;
        let (duration, adjusted) = self.picture_duration(pic);
        let va_index = self.accel.is_some().then_some(task);
        if let Some(slot) = self.frames.slot_mut(task) {
            slot.frame_type = pic.coding_type.picture_type();
            slot.duration = duration;
            slot.frame_time = time.unwrap_or(-1.0);
            slot.is_original_time = time.is_some() && !adjusted;
            slot.is_corrupted = !pic.has_coding_extension;
            slot.top_field_first = pic.top_field_first;
            slot.repeat_first_field = pic.repeat_first_field;
            slot.progressive_frame = pic.progressive_frame;
            slot.va_index = va_index;
        }
        if !self.buffers[task]
            .as_ref()
            .is_some_and(|b| b.matches(&self.seq))
        {
            self.buffers[task] = Some(PictureBuffer::new(&self.seq)?);
        }
        self.tasks[task] = Some(TaskInfo {
            header: pic.clone(),
            width: self.seq.width,
            height: self.seq.height,
            chroma: self.seq.chroma_format,
            sample_aspect_ratio: self.sample_aspect_ratio(),
        });
        Ok(())
    }

    /// 解码一张图片 (或一场) 的全部 slice
    fn decode_picture(
        &mut self,
        pic: &PictureHeader,
        data: &[u8],
        slice_start: usize,
        task: usize,
        curr: usize,
    ) -> SwdecResult<SliceStats> {
        let slices = find_slices(data, slice_start, data.len());
        let second_field = curr >= DPB_SIZE;
        let (prev, next) = self.frames.slot(curr).map_or((None, None), |s| {
            (
                s.prev_index.map(|i| i % DPB_SIZE),
                s.next_index.map(|i| i % DPB_SIZE),
            )
        });

        if let Some(hook) = self.accel.as_mut() {
            let params = accel::picture_params(&self.seq, pic, task, (prev, next), second_field);
            let slice_params = accel::slice_params(data, &slices);
            hook.submit(&params, &slice_params, &accel::matrix_params(&self.quant))?;
            let status = hook.query_status(task)?;
            trace!("MPEG-2: 表面 {task} 加速解码状态 {status:?}");
            return Ok(SliceStats {
                slices: slices.len(),
                macroblocks: 0,
                corrupted: matches!(status, AccelStatus::Corrupted | AccelStatus::Failed),
            });
        }

        let mut current = self.buffers[task]
            .take()
            .ok_or_else(|| SwdecError::Internal(format!("槽位 {task} 缺少帧缓冲")))?;
        // 第二场 P 以本帧首场为反奇偶参考
        let snapshot =
            (second_field && pic.coding_type == PictureCodingType::P).then(|| current.clone());
        let mut stats = {
            let seq = &self.seq;
            let buffers = &self.buffers;
            let reference = |index: Option<usize>| {
                index
                    .and_then(|i| buffers[i].as_ref())
                    .filter(|b| b.matches(seq))
                    .map(PictureBuffer::reference)
            };
            let mut forward = match pic.coding_type {
                PictureCodingType::I => [None, None],
                _ => [reference(prev); 2],
            };
            let backward = match pic.coding_type {
                PictureCodingType::B => [reference(next); 2],
                _ => [None, None],
            };
            if let Some(frame) = &snapshot {
                forward[1 - pic.picture_structure.parity()] = Some(frame.reference());
            }
            let ctx = PictureContext {
                seq,
                pic,
                quant: &self.quant,
                forward,
                backward,
            };
            self.pool.decode_picture(&ctx, data, &slices, &mut current)
        };
        self.buffers[task] = Some(current);

        let rows = if pic.picture_structure.is_field() {
            self.seq.mb_height() / 2
        } else {
            self.seq.mb_height()
        };
        let expected = self.seq.mb_width() * rows;
        if stats.macroblocks < expected {
            debug!(
                "MPEG-2: 槽位 {task} 只解码了 {}/{expected} 个宏块",
                stats.macroblocks
            );
            stats.corrupted = true;
        }
        Ok(stats)
    }
}
