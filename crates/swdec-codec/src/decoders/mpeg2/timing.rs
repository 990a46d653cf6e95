//! 显示时间推算
//!
//! 显示时间按显示顺序在入队时分配: 带外部时间的帧直接使用该时间并重设流时钟,
//! 其余帧取当前流时钟后按帧时长推进.

use super::dpb::FrameSlot;
use super::types::{PictureHeader, SequenceHeader};

/// 流时钟
#[derive(Debug, Clone, Default)]
pub(super) struct DisplayClock {
    stream_time: f64,
    /// 被跳过的参考图片 (及其后的 B 图片) 的时长, 在下一个参考图片入队后计入
    deferred: f64,
}

impl DisplayClock {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn reset(&mut self) {
        *self = Self::default();
    }

    /// 下一个无外部时间的帧将获得的显示时间
    pub(super) fn stream_time(&self) -> f64 {
        self.stream_time
    }

    /// 为即将入队的槽位确定显示时间
    pub(super) fn stamp(&mut self, slot: &mut FrameSlot) {
        if slot.is_original_time && slot.frame_time >= 0.0 {
            self.stream_time = slot.frame_time + slot.duration;
        } else {
            slot.frame_time = self.stream_time;
            slot.is_original_time = false;
            self.stream_time += slot.duration;
        }
    }

    /// 记录一个被跳过的图片
    ///
    /// 重排模式下被跳过的 I/P 在显示顺序上位于尚未入队的参考图片之后,
    /// 其时长延迟到该参考图片入队后再计入.
    pub(super) fn skip(&mut self, duration: f64, is_anchor: bool, reorder: bool) {
        if reorder && (is_anchor || self.deferred > 0.0) {
            self.deferred += duration;
        } else {
            self.stream_time += duration;
        }
    }

    /// 参考图片入队后计入延迟的时长
    pub(super) fn flush_deferred(&mut self) {
        self.stream_time += self.deferred;
        self.deferred = 0.0;
    }
}

/// 图片时长 (秒) 与是否按 3:2 下拉修正过
///
/// 只有设置 `TELECINE_PTS` 时 repeat_first_field 才会拉长时长:
/// 逐行序列多一帧 (顶场优先时再多一帧), 隔行序列为 1.5 帧.
pub(super) fn picture_duration(
    seq: &SequenceHeader,
    pic: &PictureHeader,
    frame_rate_override: Option<f64>,
    telecine: bool,
) -> (f64, bool) {
    let rate = frame_rate_override
        .filter(|r| *r > 0.0)
        .unwrap_or_else(|| seq.frame_rate());
    let delta = 1.0 / rate;
    if !(pic.repeat_first_field && telecine) {
        return (delta, false);
    }
    let duration = if seq.progressive_sequence {
        if pic.top_field_first {
            3.0 * delta
        } else {
            2.0 * delta
        }
    } else {
        1.5 * delta
    };
    (duration, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(duration: f64) -> FrameSlot {
        FrameSlot {
            duration,
            ..FrameSlot::default()
        }
    }

    #[test]
    fn test_derived_times_are_spaced_by_duration() {
        let mut clock = DisplayClock::new();
        let times: Vec<f64> = (0..3)
            .map(|_| {
                let mut s = slot(0.04);
                clock.stamp(&mut s);
                s.frame_time
            })
            .collect();
        assert_eq!(times.len(), 3);
        assert!((times[2] - 0.08).abs() < 1e-9);
    }

    #[test]
    fn test_original_time_resets_clock() {
        let mut clock = DisplayClock::new();
        let mut s = slot(0.04);
        s.frame_time = 10.0;
        s.is_original_time = true;
        clock.stamp(&mut s);
        assert_eq!(s.frame_time, 10.0);
        assert!((clock.stream_time() - 10.04).abs() < 1e-9);
    }

    #[test]
    fn test_skipped_anchor_time_is_deferred() {
        let mut clock = DisplayClock::new();
        clock.skip(0.04, true, true);
        clock.skip(0.04, false, true);
        assert_eq!(clock.stream_time(), 0.0);
        let mut s = slot(0.04);
        clock.stamp(&mut s);
        clock.flush_deferred();
        assert_eq!(s.frame_time, 0.0);
        assert!((clock.stream_time() - 0.12).abs() < 1e-9);
    }

    #[test]
    fn test_telecine_duration() {
        let seq = SequenceHeader {
            frame_rate_code: 1,
            progressive_sequence: true,
            ..SequenceHeader::default()
        };
        let pic = PictureHeader {
            repeat_first_field: true,
            top_field_first: true,
            ..PictureHeader::default()
        };
        let delta = 1001.0 / 24000.0;
        let (d, adjusted) = picture_duration(&seq, &pic, None, true);
        assert!(adjusted);
        assert!((d - 3.0 * delta).abs() < 1e-9);
        let (d, adjusted) = picture_duration(&seq, &pic, None, false);
        assert!(!adjusted);
        assert!((d - delta).abs() < 1e-9);
    }
}
