//! 输入码流数据 (MediaData).
//!
//! 原始字节缓冲区加偏移/长度视图. 解码器只读取, 从不修改.

use bytes::Bytes;

/// 输入数据块
///
/// 一个数据块可以包含任意多个完整或不完整的语法单元,
/// 解码器会缓存跨块的残余数据.
#[derive(Debug, Clone)]
pub struct MediaData {
    /// 压缩数据
    pub data: Bytes,
    /// 有效数据在 `data` 中的起始偏移
    pub offset: usize,
    /// 外部提供的显示时间 (秒), 负数表示未知
    pub time: f64,
    /// 码流结束标记, 解码器应输出所有缓存帧
    pub end_of_stream: bool,
}

impl MediaData {
    /// 从数据创建, 时间未知
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            offset: 0,
            time: -1.0,
            end_of_stream: false,
        }
    }

    /// 码流结束标记 (不携带数据)
    pub fn end_of_stream() -> Self {
        Self {
            end_of_stream: true,
            ..Self::from_data(Bytes::new())
        }
    }

    /// 附带外部时间
    pub fn with_time(mut self, time: f64) -> Self {
        self.time = time;
        self
    }

    /// 有效数据视图
    pub fn payload(&self) -> &[u8] {
        self.data.get(self.offset..).unwrap_or(&[])
    }

    /// 有效数据大小 (字节)
    pub fn size(&self) -> usize {
        self.payload().len()
    }

    /// 是否不含有效数据
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// 是否携带外部时间
    pub fn has_time(&self) -> bool {
        self.time >= 0.0
    }
}
