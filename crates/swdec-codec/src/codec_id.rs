//! 解码器标识符.

use std::fmt;

/// 解码器标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    /// MPEG-2 Video (ISO/IEC 13818-2)
    Mpeg2Video,
    /// Motion JPEG / 单张 JPEG (ISO/IEC 10918-1)
    Mjpeg,
}

impl CodecId {
    /// 短名称, 用于命令行与配置文件
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Mpeg2Video => "mpeg2video",
            Self::Mjpeg => "mjpeg",
        }
    }

    /// 按名称查找, 接受常见别名
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "mpeg2video" | "mpeg2" | "m2v" => Some(Self::Mpeg2Video),
            "mjpeg" | "jpeg" | "jpg" => Some(Self::Mjpeg),
            _ => None,
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_id_names() {
        assert_eq!(CodecId::from_name("M2V"), Some(CodecId::Mpeg2Video));
        assert_eq!(CodecId::from_name("jpg"), Some(CodecId::Mjpeg));
        assert_eq!(CodecId::from_name("h264"), None);
        assert_eq!(CodecId::Mjpeg.to_string(), "mjpeg");
    }
}
