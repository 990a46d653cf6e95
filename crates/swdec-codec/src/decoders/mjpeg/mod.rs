//! Motion JPEG / JPEG 图像解码器
//!
//! 输入是 JPEG 图像的串联 (字节流可以任意切块), 每幅 SOI..EOI 独立解码为
//! 一个输出帧. 支持基线, 扩展 (8/12 位), 渐进与无损编码过程, 1/2, 1/4,
//! 1/8 缩放输出, 以及重启区间级别的错误隔离.
//!
//! 量化表与 Huffman 表在图像之间保留: MJPEG 帧常常省略 DHT, 此时沿用上一次
//! 的定义, 从未定义过的表使用 JPEG 标准表.

mod color;
mod header;
mod huffman;
mod image;
mod lossless;
mod markers;
mod progressive;
mod reconstruct;
mod scan;
mod tables;
mod types;


use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};
use log::{debug, trace, warn};
use rayon::ThreadPool;
use swdec_core::{ErrorKind, Rational, SwdecError, SwdecResult};

use crate::codec_id::CodecId;
use crate::codec_parameters::{DecoderParams, SkipLevel};
use crate::decoder::Decoder;
use crate::frame::VideoFrame;
use crate::media_data::MediaData;

use header::TableSet;
use image::{ImageDecoder, OutputParams};

pub use types::{CodingProcess, ColorSpace, ImageInfo, JfifInfo};

/// 输出队列中最多缓存的帧数, 超过后等待 `receive_frame`
const MAX_QUEUED_FRAMES: usize = 4;

/// 未给出帧率时推算时间戳使用的帧率
const DEFAULT_FRAME_RATE: f64 = 30.0;

/// MJPEG 解码器
pub struct MjpegDecoder {
    params: DecoderParams,
    opened: bool,
    /// 发生致命错误后拒绝继续调用, 直到 reset
    failed: bool,
    input: BytesMut,
    /// 已从 `input` 前端移出的字节总数
    consumed: usize,
    /// (绝对偏移, 时间), 偏移递增
    times: VecDeque<(usize, f64)>,
    end_of_stream: bool,
    tables: TableSet,
    pool: Option<ThreadPool>,
    frames: VecDeque<VideoFrame>,
    /// 没有外部时间时下一帧的推算时间
    next_time: f64,
    info: Option<ImageInfo>,
    skip_level: SkipLevel,
    skipped_frames: u64,
    decoded_images: u64,
    corrupted_images: u64,
}

impl MjpegDecoder {
    pub fn new() -> Self {
        Self {
            params: DecoderParams::new(CodecId::Mjpeg),
            opened: false,
            failed: false,
            input: BytesMut::new(),
            consumed: 0,
            times: VecDeque::new(),
            end_of_stream: false,
            tables: TableSet::default(),
            pool: None,
            frames: VecDeque::new(),
            next_time: 0.0,
            info: None,
            skip_level: SkipLevel::None,
            skipped_frames: 0,
            decoded_images: 0,
            corrupted_images: 0,
        }
    }

    /// 创建解码器实例
    pub fn create() -> SwdecResult<Box<dyn Decoder>> {
        Ok(Box::new(Self::new()))
    }

    /// 最近一幅成功解码的图像信息
    pub fn image_info(&self) -> Option<&ImageInfo> {
        self.info.as_ref()
    }

    pub fn set_skip_level(&mut self, level: SkipLevel) {
        self.skip_level = level;
    }

    pub fn skip_level(&self) -> SkipLevel {
        self.skip_level
    }

    /// 按增量调整跳帧等级, 返回新等级
    pub fn change_decoding_speed(&mut self, delta: i32) -> SkipLevel {
        self.skip_level = SkipLevel::from_level(self.skip_level.level().saturating_add(delta));
        self.skip_level
    }

    pub fn skipped_frames(&self) -> u64 {
        self.skipped_frames
    }

    pub fn decoded_images(&self) -> u64 {
        self.decoded_images
    }

    /// 输出时带有损坏标志的图像, 以及整幅丢弃的图像
    pub fn corrupted_images(&self) -> u64 {
        self.corrupted_images
    }

    /// 流结束: 不完整的尾部图像也尝试解码
    pub fn flush(&mut self) -> SwdecResult<()> {
        self.ensure_usable()?;
        self.end_of_stream = true;
        self.run().map(|_| ())
    }

    fn frame_rate(&self) -> f64 {
        self.params
            .frame_rate
            .map(|r| r.to_f64())
            .filter(|r| *r > 0.0)
            .unwrap_or(DEFAULT_FRAME_RATE)
    }

    fn ensure_usable(&self) -> SwdecResult<()> {
        if !self.opened {
            return Err(SwdecError::InvalidArgument("MJPEG 解码器未打开".into()));
        }
        if self.failed {
            return Err(SwdecError::Internal(
                "MJPEG 解码器发生过致命错误, 需要 reset".into(),
            ));
        }
        Ok(())
    }

    fn reset_state(&mut self) {
        self.failed = false;
        self.input.clear();
        self.consumed = 0;
        self.times.clear();
        self.end_of_stream = false;
        self.tables = TableSet::default();
        self.frames.clear();
        self.next_time = 0.0;
        self.info = None;
        self.skipped_frames = 0;
        self.decoded_images = 0;
        self.corrupted_images = 0;
    }

    // ------------------------------------------------------------------------
    // 图像切分
    // ------------------------------------------------------------------------

    /// 切出并解码缓冲中的完整图像, 返回是否有进展
    fn run(&mut self) -> SwdecResult<bool> {
        let mut progress = false;
        while self.frames.len() < MAX_QUEUED_FRAMES {
            let Some(start) = find_soi(&self.input) else {
                // 末尾的 0xFF 可能是下一个 SOI 的前半
                let keep = usize::from(!self.end_of_stream && self.input.last() == Some(&0xFF));
                let junk = self.input.len() - keep;
                if junk > 0 {
                    trace!("MJPEG: 丢弃 {junk} 字节非图像数据");
                    self.discard(junk);
                }
                break;
            };
            if start > 0 {
                trace!("MJPEG: 跳过 SOI 之前的 {start} 字节");
                self.discard(start);
            }
            let end = match markers::find_image_end(&self.input) {
                Ok(Some(end)) => end,
                Ok(None) if self.end_of_stream => {
                    warn!("MJPEG: 流结束时图像不完整, 尝试解码 {} 字节", self.input.len());
                    self.input.len()
                }
                Ok(None) => break,
                Err(err) => {
                    // 标记结构损坏, 越过这个 SOI 寻找下一幅图像
                    warn!("MJPEG: 无法定位图像结尾: {err}");
                    self.discard(2);
                    self.corrupted_images += 1;
                    progress = true;
                    continue;
                }
            };
            let offset = self.consumed;
            let data = self.take(end);
            progress = true;
            if let Err(err) = self.on_image(&data, offset) {
                self.handle_image_error(err)?;
            }
        }
        Ok(progress)
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

    /// 按错误类别决定继续还是终止
    fn handle_image_error(&mut self, err: SwdecError) -> SwdecResult<()> {
        match err.kind() {
            ErrorKind::NeedMoreData | ErrorKind::RecoverableCorruption => {
                warn!("MJPEG: 丢弃无法解码的图像: {err}");
                self.corrupted_images += 1;
                Ok(())
            }
            ErrorKind::UnsupportedFeature => Err(err),
            ErrorKind::FatalConfiguration => {
                warn!("MJPEG: 致命错误, 清空输出队列: {err}");
                self.failed = true;
                self.frames.clear();
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------------
    // 单幅图像
    // ------------------------------------------------------------------------

    fn on_image(&mut self, data: &[u8], offset: usize) -> SwdecResult<()> {
        let time = self.take_time(offset);
        let duration = 1.0 / self.frame_rate();
        if self.skip_level == SkipLevel::All {
            self.skipped_frames += 1;
            self.next_time = time.unwrap_or(self.next_time) + duration;
            trace!("MJPEG: 跳过图像 ({} 字节)", data.len());
            return Ok(());
        }

        let out = OutputParams {
            scale: self.params.jpeg_scale,
            format: self.params.output_format,
            bit_depth: self.params.output_bit_depth,
            pool: self.pool.as_ref(),
        };
        let decoded = ImageDecoder::new(&mut self.tables).decode(data, &out)?;
        let mut frame = decoded.frame;

        let (frame_time, original) = match time {
            Some(t) => (t, true),
            None => (self.next_time, false),
        };
        frame.time = frame_time;
        frame.duration = duration;
        frame.is_original_time = original;
        if let Some(aspect) = self.params.aspect_ratio {
            frame.sample_aspect_ratio = display_to_sample_aspect(aspect, &decoded.info);
        }
        self.next_time = frame_time + duration;

        if let Some(prev) = &self.info {
            if (prev.width, prev.height) != (decoded.info.width, decoded.info.height) {
                debug!(
                    "MJPEG: 图像尺寸变化 {}x{} -> {}x{}",
                    prev.width, prev.height, decoded.info.width, decoded.info.height
                );
            }
        }
        if frame.corrupted {
            self.corrupted_images += 1;
        }
        frame.surface_index = (self.decoded_images % MAX_QUEUED_FRAMES as u64) as usize;
        self.decoded_images += 1;
        self.info = Some(decoded.info);
        self.frames.push_back(frame);
        Ok(())
    }
}

impl Default for MjpegDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn find_soi(data: &[u8]) -> Option<usize> {
    data.windows(2)
        .position(|w| w[0] == 0xFF && w[1] == markers::SOI)
}

/// 覆盖的显示宽高比换算为像素宽高比
fn display_to_sample_aspect(dar: Rational, info: &ImageInfo) -> Rational {
    let num = i64::from(dar.num) * i64::from(info.height);
    let den = i64::from(dar.den) * i64::from(info.width);
    match (i32::try_from(num), i32::try_from(den)) {
        (Ok(num), Ok(den)) if den != 0 => Rational::new(num, den).reduce(),
        _ => Rational::UNDEFINED,
    }
}

// ============================================================================
// Decoder trait 实现
// ============================================================================

impl Decoder for MjpegDecoder {
    fn codec_id(&self) -> CodecId {
        CodecId::Mjpeg
    }

    fn name(&self) -> &str {
        "mjpeg"
    }

    fn open(&mut self, params: &DecoderParams) -> SwdecResult<()> {
        params.validate()?;
        if params.codec_id != CodecId::Mjpeg {
            return Err(SwdecError::InvalidArgument(format!(
                "MJPEG 解码器不能处理 {}",
                params.codec_id
            )));
        }
        let threads = params.thread_count();
        let current = self.pool.as_ref().map_or(1, |p| p.current_num_threads());
        if current != threads {
            self.pool = if threads > 1 {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("swdec-mjpeg-{i}"))
                    .build()
                    .map_err(|e| SwdecError::Internal(format!("创建解码线程池失败: {e}")))?;
                Some(pool)
            } else {
                None
            };
        }
        self.params = params.clone();
        self.skip_level = params.skip_level;
        self.reset_state();
        self.opened = true;
        debug!(
            "MJPEG 解码器已打开: threads={threads}, scale=1/{}, format={:?}",
            params.jpeg_scale.denominator(),
            params.output_format
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
            self.end_of_stream = false;
        }
        if data.end_of_stream {
            self.end_of_stream = true;
        }
        self.run().map(|_| ())
    }

    fn receive_frame(&mut self) -> SwdecResult<VideoFrame> {
        self.ensure_usable()?;
        loop {
            if let Some(frame) = self.frames.pop_front() {
                return Ok(frame);
            }
            if !self.run()? {
                return Err(if self.end_of_stream && self.input.is_empty() {
                    SwdecError::Eof
                } else {
                    SwdecError::NeedMoreData
                });
            }
        }
    }

    fn reset(&mut self) {
        self.reset_state();
        debug!("MJPEG 解码器已重置");
    }
}
