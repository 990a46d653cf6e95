//! 解码器 trait 定义.

use swdec_core::SwdecResult;

use crate::codec_id::CodecId;
use crate::codec_parameters::DecoderParams;
use crate::frame::VideoFrame;
use crate::media_data::MediaData;

/// 解码器 trait
///
/// 协作式调用, 没有隐式后台线程:
/// 1. 调用 `send_data()` 送入码流
/// 2. 反复调用 `receive_frame()` 直到返回 `NeedMoreData`
/// 3. 码流结束时送入 [`MediaData::end_of_stream`], 取出所有缓存帧, 最后得到 `Eof`
///
/// 返回致命错误 (`ErrorKind::FatalConfiguration`) 后, 显示队列已被清空,
/// 需要 `reset()` 后才能继续使用.
pub trait Decoder: Send {
    /// 获取解码器标识
    fn codec_id(&self) -> CodecId;

    /// 获取解码器名称
    fn name(&self) -> &str;

    /// 使用参数配置解码器
    fn open(&mut self, params: &DecoderParams) -> SwdecResult<()>;

    /// 送入一块码流数据
    ///
    /// 数据会被内部缓存, 不完整的语法单元留待下一次调用补全.
    fn send_data(&mut self, data: &MediaData) -> SwdecResult<()>;

    /// 取出下一帧显示顺序的图像
    ///
    /// # 返回
    /// - `Ok(frame)`: 成功取出一帧 (可能被标记为损坏)
    /// - `Err(NeedMoreData)`: 需要送入更多数据
    /// - `Err(Eof)`: 流已结束且所有帧已取出
    fn receive_frame(&mut self) -> SwdecResult<VideoFrame>;

    /// 丢弃所有缓存数据与帧, 回到 `open` 之后的状态
    ///
    /// 会等待正在进行的并行解码结束后才释放共享表.
    fn reset(&mut self);
}
