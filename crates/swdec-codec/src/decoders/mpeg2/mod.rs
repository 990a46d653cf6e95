//! MPEG-2 视频 (ISO/IEC 13818-2) 软件解码器.
//!
//! 支持 Main/High profile 的 4:2:0, 4:2:2, 4:4:4 码流, 帧图片与场图片.
//!
//! 控制循环在调用线程上串行执行: 切分语法单元, 解析头部, 跳帧判定,
//! 分配 DPB 槽位并建立参考, 然后把 slice 交给工作线程池或硬件加速钩子.
//! 所有工作线程结束后才会更新显示队列.

mod accel;
mod block;
mod control;
mod dpb;
mod header;
mod motion;
mod output;
mod picture;
mod slice;
mod tables;
mod threading;
mod timing;
mod types;

use std::collections::VecDeque;

use bytes::BytesMut;
use log::debug;
use swdec_core::{PixelFormat, Rational, SwdecError, SwdecResult};

use crate::codec_id::CodecId;
use crate::codec_parameters::{DecodeFlags, DecoderParams, SkipLevel};
use crate::decoder::Decoder;
use crate::frame::{PictureType, VideoFrame};
use crate::media_data::MediaData;

use dpb::{FrameBuffer, FrameSlot};
use picture::PictureBuffer;
use threading::WorkerPool;
use timing::DisplayClock;
use types::{ChromaFormat, PictureHeader, QuantMatrices, SequenceHeader};

pub use accel::{AccelHook, AccelStatus, PictureParams, QuantMatrixParams, SliceParams};
pub use dpb::{DPB_SIZE, TASK_COUNT};
pub use types::{GopTimeCode, SignalInfo};

// ============================================================================
// 公共类型
// ============================================================================

/// 码流中的用户数据 (user_data), 附带所属图片的显示时间
#[derive(Debug, Clone, PartialEq)]
pub struct UserData {
    /// 显示时间 (秒)
    pub time: f64,
    pub data: Vec<u8>,
}

/// 当前序列的码流信息
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    /// 原生输出格式
    pub pixel_format: PixelFormat,
    /// 帧率 (帧/秒)
    pub frame_rate: f64,
    pub sample_aspect_ratio: Rational,
    pub profile: u8,
    pub level: u8,
    pub progressive_sequence: bool,
    pub low_delay: bool,
    /// 码率 (比特/秒)
    pub bit_rate: u32,
    pub signal: SignalInfo,
    /// 最近一个 GOP 头的时间码
    pub time_code: GopTimeCode,
}

/// 槽位上图片的几何信息, 输出时使用
#[derive(Debug, Clone)]
struct TaskInfo {
    header: PictureHeader,
    width: u32,
    height: u32,
    chroma: ChromaFormat,
    sample_aspect_ratio: Rational,
}

// ============================================================================
// 解码器
// ============================================================================

/// MPEG-2 视频解码器
pub struct Mpeg2Decoder {
    params: DecoderParams,
    opened: bool,
    /// 发生致命错误后拒绝继续调用, 直到 reset
    failed: bool,
    /// 尚未处理的码流
    input: BytesMut,
    /// 已从 `input` 前端移出的字节总数
    consumed: usize,
    /// (绝对偏移, 时间), 偏移递增
    times: VecDeque<(usize, f64)>,
    end_of_stream: bool,
    eos_flushed: bool,
    seq: SequenceHeader,
    has_sequence: bool,
    quant: QuantMatrices,
    /// 最近的序列头及其扩展的原始字节
    sequence_bytes: Vec<u8>,
    /// 上一个头部单元是序列头, 随后的扩展属于序列级
    after_sequence: bool,
    /// 当前帧缓冲对应的 (宽, 高, 色度格式)
    geometry: Option<(u32, u32, ChromaFormat)>,
    frames: FrameBuffer,
    buffers: Vec<Option<PictureBuffer>>,
    tasks: Vec<Option<TaskInfo>>,
    clock: DisplayClock,
    pool: WorkerPool,
    accel: Option<Box<dyn AccelHook>>,
    skip_level: SkipLevel,
    skipped_frames: u64,
    decoded_pictures: u64,
    first_i_seen: bool,
    first_p_seen: bool,
    /// 首场被跳过后, 待丢弃的第二场奇偶性
    skip_second_field: Option<usize>,
    user_data: VecDeque<UserData>,
}

impl Mpeg2Decoder {
    /// 创建单线程解码器, `open` 时按参数重建线程池
    pub fn new() -> SwdecResult<Self> {
        Ok(Self {
            params: DecoderParams::new(CodecId::Mpeg2Video),
            opened: false,
            failed: false,
            input: BytesMut::new(),
            consumed: 0,
            times: VecDeque::new(),
            end_of_stream: false,
            eos_flushed: false,
            seq: SequenceHeader::default(),
            has_sequence: false,
            quant: QuantMatrices::default(),
            sequence_bytes: Vec::new(),
            after_sequence: false,
            geometry: None,
            frames: FrameBuffer::new(),
            buffers: vec![None; DPB_SIZE],
            tasks: vec![None; DPB_SIZE],
            clock: DisplayClock::new(),
            pool: WorkerPool::new(1)?,
            accel: None,
            skip_level: SkipLevel::None,
            skipped_frames: 0,
            decoded_pictures: 0,
            first_i_seen: false,
            first_p_seen: false,
            skip_second_field: None,
            user_data: VecDeque::new(),
        })
    }

    /// 创建解码器实例
    pub fn create() -> SwdecResult<Box<dyn Decoder>> {
        Ok(Box::new(Self::new()?))
    }

    /// 安装硬件加速钩子, 之后的图片不再经过软件引擎
    pub fn set_accel_hook(&mut self, hook: Box<dyn AccelHook>) {
        self.accel = Some(hook);
    }

    // ------------------------------------------------------------------------
    // 显示接口
    // ------------------------------------------------------------------------

    /// 取出下一个待显示的槽位号
    ///
    /// 取出后可以用槽位号查询时间, 类型与损坏标记, 或用 [`Self::frame`]
    /// 取得图像. 使用完毕后必须调用 [`Self::release_displayed`].
    pub fn display_index(&mut self) -> Option<usize> {
        self.frames.pop_display()
    }

    /// 槽位的显示时间 (秒)
    pub fn decoded_time(&self, index: usize) -> Option<f64> {
        self.locked_slot(index).map(|slot| slot.frame_time)
    }

    /// 槽位的图片类型
    pub fn frame_type(&self, index: usize) -> Option<PictureType> {
        self.locked_slot(index).map(|slot| slot.frame_type)
    }

    /// 槽位是否检测到损坏
    pub fn corruption_flag(&self, index: usize) -> Option<bool> {
        self.locked_slot(index).map(|slot| slot.is_corrupted)
    }

    /// 按输出参数生成槽位的图像
    pub fn frame(&self, index: usize) -> SwdecResult<VideoFrame> {
        let task = index % DPB_SIZE;
        let slot = self
            .locked_slot(task)
            .ok_or_else(|| SwdecError::InvalidArgument(format!("槽位 {index} 未被占用")))?;
        let info = self.tasks[task]
            .as_ref()
            .ok_or_else(|| SwdecError::Internal(format!("槽位 {task} 缺少图片信息")))?;
        let buffer = self.buffers[task]
            .as_ref()
            .ok_or_else(|| SwdecError::Internal(format!("槽位 {task} 缺少帧缓冲")))?;
        let format = output::resolve_format(
            info.chroma,
            self.params.output_format,
            self.params.output_bit_depth,
        )?;
        let mut frame = output::build_frame(buffer, info.width, info.height, format)?;
        frame.time = slot.frame_time;
        frame.duration = slot.duration;
        frame.is_original_time = slot.is_original_time;
        frame.picture_type = slot.frame_type;
        frame.corrupted = slot.is_corrupted;
        frame.sample_aspect_ratio = info.sample_aspect_ratio;
        frame.top_field_first = slot.top_field_first;
        frame.repeat_first_field = slot.repeat_first_field;
        frame.progressive = slot.progressive_frame;
        frame.surface_index = slot.va_index.unwrap_or(task);
        Ok(frame)
    }

    /// 显示完毕, 按释放规则解锁不再需要的槽位
    pub fn release_displayed(&mut self, index: usize) {
        let reorder = self.reorder();
        self.frames.release_displayed(index, reorder);
    }

    /// 强制释放一个槽位 (两场一起)
    pub fn unlock_task(&mut self, index: usize) {
        self.frames.unlock_task(index);
    }

    fn locked_slot(&self, index: usize) -> Option<&FrameSlot> {
        if index >= TASK_COUNT || !self.frames.is_locked(index) {
            return None;
        }
        self.frames.slot(index % DPB_SIZE)
    }

    // ------------------------------------------------------------------------
    // 跳帧控制
    // ------------------------------------------------------------------------

    /// 设置跳帧级别, 从下一张图片开始生效
    pub fn set_skip_level(&mut self, level: SkipLevel) {
        if level != self.skip_level {
            debug!("MPEG-2: 跳帧级别 {:?} -> {level:?}", self.skip_level);
        }
        self.skip_level = level;
    }

    pub fn skip_level(&self) -> SkipLevel {
        self.skip_level
    }

    /// 按增量调整跳帧级别, 结果截断到 [None, All]
    pub fn change_decoding_speed(&mut self, delta: i32) -> SkipLevel {
        let level = SkipLevel::from_level(self.skip_level.level().saturating_add(delta));
        self.set_skip_level(level);
        level
    }

    /// 被跳过的图片数
    pub fn skipped_frames(&self) -> u64 {
        self.skipped_frames
    }

    /// 已解码的图片数 (场图片按场计)
    pub fn decoded_pictures(&self) -> u64 {
        self.decoded_pictures
    }

    // ------------------------------------------------------------------------
    // 码流信息
    // ------------------------------------------------------------------------

    /// 取出最早的一条用户数据
    pub fn pop_user_data(&mut self) -> Option<UserData> {
        self.user_data.pop_front()
    }

    /// 最近的序列头 (含序列级扩展) 原始字节
    pub fn sequence_header_bytes(&self) -> &[u8] {
        &self.sequence_bytes
    }

    /// 当前序列的信息, 尚未收到完整序列头时返回 `None`
    pub fn stream_info(&self) -> Option<StreamInfo> {
        if !self.has_sequence || !self.seq.has_extension {
            return None;
        }
        let seq = &self.seq;
        Some(StreamInfo {
            width: seq.width,
            height: seq.height,
            pixel_format: output::native_format(seq.chroma_format),
            frame_rate: self.frame_rate(),
            sample_aspect_ratio: self.sample_aspect_ratio(),
            profile: seq.profile,
            level: seq.level,
            progressive_sequence: seq.progressive_sequence,
            low_delay: seq.low_delay,
            bit_rate: seq.bit_rate,
            signal: seq.signal,
            time_code: seq.gop,
        })
    }

    /// 当前被锁定的帧级槽位数
    pub fn locked_slots(&self) -> usize {
        self.frames.locked_count()
    }

    /// DPB 结构是否自洽 (链接只指向被锁槽位, 显示队列无重复)
    pub fn is_consistent(&self) -> bool {
        self.frames.check_invariants()
    }

    /// 流结束: 送出所有缓存的图片
    pub fn flush(&mut self) -> SwdecResult<()> {
        self.ensure_usable()?;
        self.end_of_stream = true;
        self.run().map(|_| ())
    }

    fn reorder(&self) -> bool {
        self.params.flags.contains(DecodeFlags::REORDER)
    }

    fn frame_rate(&self) -> f64 {
        self.params
            .frame_rate
            .map(|r| r.to_f64())
            .filter(|r| *r > 0.0)
            .unwrap_or_else(|| self.seq.frame_rate())
    }

    /// 像素宽高比; 覆盖值为显示宽高比, 按帧尺寸换算
    fn sample_aspect_ratio(&self) -> Rational {
        let (w, h) = (self.seq.width, self.seq.height);
        match self.params.aspect_ratio {
            Some(dar) if w > 0 && h > 0 => {
                let num = i64::from(dar.num) * i64::from(h);
                let den = i64::from(dar.den) * i64::from(w);
                match (i32::try_from(num), i32::try_from(den)) {
                    (Ok(num), Ok(den)) => Rational::new(num, den).reduce(),
                    _ => Rational::UNDEFINED,
                }
            }
            _ => header::sample_aspect_ratio(self.seq.aspect_ratio_code, w, h),
        }
    }

    fn ensure_usable(&self) -> SwdecResult<()> {
        if !self.opened {
            return Err(SwdecError::InvalidArgument("MPEG-2 解码器未打开".into()));
        }
        if self.failed {
            return Err(SwdecError::Internal(
                "MPEG-2 解码器发生过致命错误, 需要 reset".into(),
            ));
        }
        Ok(())
    }

    /// 丢弃所有码流与帧, 保留参数, 线程池与加速钩子
    fn reset_state(&mut self) {
        self.failed = false;
        self.input.clear();
        self.consumed = 0;
        self.times.clear();
        self.end_of_stream = false;
        self.eos_flushed = false;
        self.seq = SequenceHeader::default();
        self.has_sequence = false;
        self.quant = QuantMatrices::default();
        self.sequence_bytes.clear();
        self.after_sequence = false;
        self.geometry = None;
        self.frames.reset();
        self.buffers.iter_mut().for_each(|b| *b = None);
        self.tasks.iter_mut().for_each(|t| *t = None);
        self.clock.reset();
        self.skipped_frames = 0;
        self.decoded_pictures = 0;
        self.first_i_seen = false;
        self.first_p_seen = false;
        self.skip_second_field = None;
        self.user_data.clear();
    }
}

// ============================================================================
// Decoder trait 实现
// ============================================================================

impl Decoder for Mpeg2Decoder {
    fn codec_id(&self) -> CodecId {
        CodecId::Mpeg2Video
    }

    fn name(&self) -> &str {
        "mpeg2video"
    }

    fn open(&mut self, params: &DecoderParams) -> SwdecResult<()> {
        params.validate()?;
        if params.codec_id != CodecId::Mpeg2Video {
            return Err(SwdecError::InvalidArgument(format!(
                "MPEG-2 解码器不能处理 {}",
                params.codec_id
            )));
        }
        let threads = params.thread_count();
        if self.pool.threads() != threads {
            self.pool = WorkerPool::new(threads)?;
        }
        self.params = params.clone();
        self.skip_level = params.skip_level;
        self.reset_state();
        self.opened = true;
        debug!(
            "MPEG-2 解码器已打开: threads={threads}, flags={:?}, skip={:?}",
            params.flags, params.skip_level
        );
        Ok(())
    }

    fn send_data(&mut self, data: &MediaData) -> SwdecResult<()> {
        self.ensure_usable()?;
        let payload = data.payload();
        if !payload.is_empty() {
            if data.has_time() {
                self.times
                    .push_back((self.consumed + self.input.len(), data.time));
            }
            self.input.extend_from_slice(payload);
            if self.end_of_stream {
                // 流结束后又送入数据, 重新允许冲刷
                self.end_of_stream = false;
                self.eos_flushed = false;
                self.frames.rearm_flush();
            }
        }
        if data.end_of_stream {
            self.end_of_stream = true;
        }
        self.run().map(|_| ())
    }

    fn receive_frame(&mut self) -> SwdecResult<VideoFrame> {
        self.ensure_usable()?;
        loop {
            if let Some(index) = self.frames.pop_display() {
                let frame = self.frame(index);
                self.release_displayed(index);
                return frame;
            }
            if !self.run()? {
                return Err(if self.end_of_stream && self.eos_flushed {
                    SwdecError::Eof
                } else {
                    SwdecError::NeedMoreData
                });
            }
        }
    }

    fn reset(&mut self) {
        self.reset_state();
        debug!("MPEG-2 解码器已重置");
    }
}
