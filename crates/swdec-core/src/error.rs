//! 统一错误类型定义.
//!
//! 所有 swdec crate 共用的错误类型. 解码器的每个阶段都返回 [`SwdecResult`],
//! 由控制循环根据 [`SwdecError::kind`] 决定继续下一个单元还是终止流.

use thiserror::Error;

/// 解码器统一错误类型
#[derive(Debug, Error)]
pub enum SwdecError {
    /// 无效参数 (空参数, 越界配置等)
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的码流特性 (profile, level, 编码方式)
    #[error("不支持的特性: {0}")]
    Unsupported(String),

    /// 功能未实现 (重建/色彩转换分派中缺失的组合)
    #[error("功能未实现: {0}")]
    NotImplemented(String),

    /// 无效数据 (无法跳过的头部组合)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 码流损坏, 可在下一个 slice / restart 区间继续
    #[error("码流损坏: {0}")]
    Corrupted(String),

    /// 数据不足, 需要更多输入
    #[error("数据不足, 需要更多输入")]
    NeedMoreData,

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 内存分配失败
    #[error("内存分配失败: {0}")]
    OutOfMemory(String),

    /// 未找到指定的解码器
    #[error("未找到解码器: {0}")]
    CodecNotFound(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误类别
///
/// 调用方只需要区分这四类即可决定下一步动作.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 继续送入数据后重试同一调用
    NeedMoreData,
    /// 码流局部损坏, 已尽力解码, 相应帧被标记为损坏
    RecoverableCorruption,
    /// 不支持的格式组合, 不会被近似处理
    UnsupportedFeature,
    /// 致命错误, 实例需要 reset 后才能继续使用
    FatalConfiguration,
}

impl SwdecError {
    /// 获取错误类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NeedMoreData | Self::Eof => ErrorKind::NeedMoreData,
            Self::InvalidData(_) | Self::Corrupted(_) => ErrorKind::RecoverableCorruption,
            Self::Unsupported(_) | Self::NotImplemented(_) => ErrorKind::UnsupportedFeature,
            Self::InvalidArgument(_)
            | Self::OutOfMemory(_)
            | Self::CodecNotFound(_)
            | Self::Io(_)
            | Self::Internal(_) => ErrorKind::FatalConfiguration,
        }
    }

    /// 是否可以在不 reset 的情况下继续解码
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NeedMoreData | ErrorKind::RecoverableCorruption
        )
    }
}

/// 解码器统一 Result 类型
pub type SwdecResult<T> = Result<T, SwdecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(SwdecError::NeedMoreData.kind(), ErrorKind::NeedMoreData);
        assert_eq!(SwdecError::Eof.kind(), ErrorKind::NeedMoreData);
        assert_eq!(
            SwdecError::Corrupted("vlc".into()).kind(),
            ErrorKind::RecoverableCorruption
        );
        assert_eq!(
            SwdecError::NotImplemented("cmyk->nv12".into()).kind(),
            ErrorKind::UnsupportedFeature
        );
        assert_eq!(
            SwdecError::OutOfMemory("dpb".into()).kind(),
            ErrorKind::FatalConfiguration
        );
    }

    #[test]
    fn test_recoverable() {
        assert!(SwdecError::InvalidData("second field".into()).is_recoverable());
        assert!(!SwdecError::InvalidArgument("threads".into()).is_recoverable());
        assert!(!SwdecError::Unsupported("mpeg1".into()).is_recoverable());
    }

    #[test]
    fn test_io_error_conversion() {
        let err: SwdecError = std::io::Error::other("disk").into();
        assert_eq!(err.kind(), ErrorKind::FatalConfiguration);
        assert!(err.to_string().contains("disk"));
    }
}
