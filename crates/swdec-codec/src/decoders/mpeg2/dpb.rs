//! 解码图片缓冲 (DPB) 管理
//!
//! 固定容量的槽位环. 帧级槽位 `0..DPB_SIZE` 对应样本存储, 第二场使用
//! `task + DPB_SIZE` 的槽位号记录自己的链接, 与首场共享样本存储和锁.
//!
//! 槽位状态: 空闲 -> 解码中 -> 参考 -> 等待显示 -> 空闲.
//! 锁位图只由控制循环修改, 工作线程从不触碰本结构.

use std::collections::VecDeque;

use log::{trace, warn};
use swdec_core::{SwdecError, SwdecResult};

use super::timing::DisplayClock;
use super::types::PictureCodingType;
use crate::frame::PictureType;

/// 帧级槽位数
pub const DPB_SIZE: usize = 10;

/// 任务号空间, 每帧两场
pub const TASK_COUNT: usize = 2 * DPB_SIZE;

/// 单个槽位的簿记信息
#[derive(Debug, Clone)]
pub(super) struct FrameSlot {
    pub frame_type: PictureType,
    /// 显示时间 (秒), 小于 0 表示尚未确定
    pub frame_time: f64,
    pub duration: f64,
    pub is_original_time: bool,
    /// 前向 (较早) 参考槽位
    pub prev_index: Option<usize>,
    /// 后向 (较晚) 参考槽位
    pub next_index: Option<usize>,
    /// 硬件表面号
    pub va_index: Option<usize>,
    /// 损坏标记, 一旦置位不再清除
    pub is_corrupted: bool,
    /// 已进入过显示队列
    pub queued: bool,
    pub top_field_first: bool,
    pub repeat_first_field: bool,
    pub progressive_frame: bool,
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self {
            frame_type: PictureType::None,
            frame_time: -1.0,
            duration: 0.0,
            is_original_time: false,
            prev_index: None,
            next_index: None,
            va_index: None,
            is_corrupted: false,
            queued: false,
            top_field_first: false,
            repeat_first_field: false,
            progressive_frame: true,
        }
    }
}

/// DPB 管理器
#[derive(Debug)]
pub(super) struct FrameBuffer {
    slots: Vec<FrameSlot>,
    locked: [bool; DPB_SIZE],
    /// 显示队列, 按显示顺序排列的帧级槽位
    ret_array: VecDeque<usize>,
    /// 最近的两个参考图片 (按解码顺序)
    latest_prev: Option<usize>,
    latest_next: Option<usize>,
    /// 等待第二场的帧级槽位
    pending_field: Option<usize>,
    /// 流结束时是否已送出最后的参考图片
    last_frame_flushed: bool,
}

impl FrameBuffer {
    pub(super) fn new() -> Self {
        Self {
            slots: vec![FrameSlot::default(); TASK_COUNT],
            locked: [false; DPB_SIZE],
            ret_array: VecDeque::with_capacity(DPB_SIZE),
            latest_prev: None,
            latest_next: None,
            pending_field: None,
            last_frame_flushed: false,
        }
    }

    /// 清空所有槽位与队列
    pub(super) fn reset(&mut self) {
        *self = Self::new();
    }

    pub(super) fn slot(&self, index: usize) -> Option<&FrameSlot> {
        self.slots.get(index)
    }

    pub(super) fn slot_mut(&mut self, index: usize) -> Option<&mut FrameSlot> {
        self.slots.get_mut(index)
    }

    /// 查找未加锁的帧级槽位, 全部占用时返回 `None` (调用方需要等待显示释放)
    pub(super) fn find_free_task(&self) -> Option<usize> {
        self.locked.iter().position(|&l| !l)
    }

    /// 锁定槽位, 重复锁定视为内部错误
    pub(super) fn lock_task(&mut self, task: usize) -> SwdecResult<()> {
        let task = task % DPB_SIZE;
        if self.locked[task] {
            return Err(SwdecError::Internal(format!("DPB 槽位 {task} 已被占用")));
        }
        self.locked[task] = true;
        self.slots[task] = FrameSlot::default();
        self.slots[task + DPB_SIZE] = FrameSlot::default();
        trace!("MPEG-2 DPB: 锁定槽位 {task}");
        Ok(())
    }

    /// 释放槽位 (两场一起), 并清除其他槽位指向它的链接
    pub(super) fn unlock_task(&mut self, index: usize) {
        let task = index % DPB_SIZE;
        if !self.locked[task] {
            return;
        }
        self.locked[task] = false;
        self.slots[task] = FrameSlot::default();
        self.slots[task + DPB_SIZE] = FrameSlot::default();
        for slot in &mut self.slots {
            if slot.prev_index.is_some_and(|p| p % DPB_SIZE == task) {
                slot.prev_index = None;
            }
            if slot.next_index.is_some_and(|n| n % DPB_SIZE == task) {
                slot.next_index = None;
            }
        }
        if self.latest_prev == Some(task) {
            self.latest_prev = None;
        }
        if self.latest_next == Some(task) {
            self.latest_next = None;
        }
        if self.pending_field == Some(task) {
            self.pending_field = None;
        }
        self.ret_array.retain(|&i| i != task);
        trace!("MPEG-2 DPB: 释放槽位 {task}");
    }

    pub(super) fn is_locked(&self, index: usize) -> bool {
        self.locked[index % DPB_SIZE]
    }

    pub(super) fn locked_count(&self) -> usize {
        self.locked.iter().filter(|&&l| l).count()
    }

    pub(super) fn pending_field(&self) -> Option<usize> {
        self.pending_field
    }

    pub(super) fn set_pending_field(&mut self, task: Option<usize>) {
        self.pending_field = task;
    }

    /// 当前的前向/后向参考 (按解码顺序最近的两个 I/P)
    pub(super) fn latest_references(&self) -> (Option<usize>, Option<usize>) {
        (self.latest_prev, self.latest_next)
    }

    /// 为新图片建立参考链接
    ///
    /// `curr` 为槽位号 (第二场为 `task + DPB_SIZE`). 只有帧图片或首场会推进
    /// I/P 参考窗口.
    pub(super) fn link(&mut self, curr: usize, coding_type: PictureCodingType, first_field: bool) {
        let task = curr % DPB_SIZE;
        match coding_type {
            PictureCodingType::I | PictureCodingType::P => {
                if first_field {
                    self.latest_prev = self.latest_next;
                    self.latest_next = Some(task);
                }
                self.slots[curr].prev_index = self.latest_prev;
                self.slots[curr].next_index = None;
            }
            PictureCodingType::B => {
                let mut prev = self.latest_prev;
                let mut next = self.latest_next;
                if next.is_none() {
                    next = prev;
                }
                if prev.is_none() {
                    prev = next;
                }
                self.slots[curr].prev_index = prev;
                self.slots[curr].next_index = next;
            }
        }
        trace!(
            "MPEG-2 DPB: 槽位 {curr} ({coding_type:?}) prev={:?} next={:?}",
            self.slots[curr].prev_index, self.slots[curr].next_index
        );
    }

    /// 一帧 (帧图片或第二场) 解码完成, 按显示顺序入队
    pub(super) fn complete(
        &mut self,
        task: usize,
        coding_type: PictureCodingType,
        reorder: bool,
        clock: &mut DisplayClock,
    ) {
        let task = task % DPB_SIZE;
        match coding_type {
            PictureCodingType::I | PictureCodingType::P if reorder => {
                if let Some(prev) = self.latest_prev {
                    self.push_display(prev, clock);
                    clock.flush_deferred();
                }
            }
            _ => self.push_display(task, clock),
        }
    }

    /// 流结束: 送出最后一个尚未显示的参考图片
    pub(super) fn flush(&mut self, reorder: bool, clock: &mut DisplayClock) {
        if let Some(task) = self.pending_field.take() {
            warn!("MPEG-2 DPB: 流结束时槽位 {task} 缺少第二场");
            self.slots[task].is_corrupted = true;
            if !reorder || self.slots[task].frame_type == PictureType::B {
                self.push_display(task, clock);
            }
        }
        if reorder && !self.last_frame_flushed {
            if let Some(next) = self.latest_next {
                self.push_display(next, clock);
                clock.flush_deferred();
            }
            self.last_frame_flushed = true;
        }
    }

    /// 分辨率变化: 送出尚未显示的参考图片并切断参考链
    pub(super) fn drain_references(&mut self, reorder: bool, clock: &mut DisplayClock) {
        self.flush(reorder, clock);
        self.latest_prev = None;
        self.latest_next = None;
        self.last_frame_flushed = false;
    }

    /// 新数据到来后允许再次冲刷
    pub(super) fn rearm_flush(&mut self) {
        self.last_frame_flushed = false;
    }

    fn push_display(&mut self, task: usize, clock: &mut DisplayClock) {
        if !self.locked[task] || self.slots[task].queued {
            return;
        }
        self.slots[task].queued = true;
        clock.stamp(&mut self.slots[task]);
        trace!(
            "MPEG-2 DPB: 槽位 {task} 进入显示队列, time={:.3}",
            self.slots[task].frame_time
        );
        self.ret_array.push_back(task);
    }

    /// 取出下一个待显示的槽位
    pub(super) fn pop_display(&mut self) -> Option<usize> {
        self.ret_array.pop_front()
    }

    pub(super) fn display_queue_len(&self) -> usize {
        self.ret_array.len()
    }

    /// 槽位显示后的释放规则
    ///
    /// B 图片直接释放; I/P 图片释放其前向参考 (解码顺序输出时为前向参考的前向参考).
    pub(super) fn release_displayed(&mut self, index: usize, reorder: bool) {
        let task = index % DPB_SIZE;
        if !self.locked[task] {
            return;
        }
        let (frame_type, prev) = {
            let slot = &self.slots[task];
            (slot.frame_type, slot.prev_index)
        };
        if frame_type == PictureType::B {
            self.unlock_task(task);
            return;
        }
        let target = if reorder {
            prev
        } else {
            prev.and_then(|p| self.slots[p % DPB_SIZE].prev_index)
        };
        if let Some(target) = target {
            if Some(target % DPB_SIZE) != self.latest_next {
                self.unlock_task(target);
            }
        }
    }

    /// 检查结构不变量: 被锁槽位的参考链接只指向被锁槽位,
    /// 显示队列中的槽位都被锁定且不重复.
    pub(super) fn check_invariants(&self) -> bool {
        let links_ok = (0..TASK_COUNT)
            .filter(|&i| self.locked[i % DPB_SIZE])
            .all(|i| {
                let slot = &self.slots[i];
                [slot.prev_index, slot.next_index]
                    .into_iter()
                    .flatten()
                    .all(|r| self.locked[r % DPB_SIZE])
            });
        let queue_ok = self.ret_array.len() <= DPB_SIZE
            && self.ret_array.iter().all(|&i| self.locked[i])
            && self
                .ret_array
                .iter()
                .enumerate()
                .all(|(k, i)| !self.ret_array.iter().skip(k + 1).any(|j| j == i));
        links_ok && queue_ok && self.locked_count() <= DPB_SIZE
    }
}
