//! JPEG 标记段切分
//!
//! 标记段格式: `FF xx [长度 2 字节, 含自身] [负载]`. 独立标记 (SOI, EOI, RSTn, TEM)
//! 没有长度字段. SOS 之后紧跟熵编码数据, 直到下一个非 RST 标记为止;
//! 熵编码数据中的 0xFF 以 `FF 00` 填充.

use log::trace;
use swdec_core::{SwdecError, SwdecResult};

pub(super) const TEM: u8 = 0x01;
pub(super) const SOF0: u8 = 0xC0;
pub(super) const SOF1: u8 = 0xC1;
pub(super) const SOF2: u8 = 0xC2;
pub(super) const SOF3: u8 = 0xC3;
pub(super) const DHT: u8 = 0xC4;
pub(super) const DAC: u8 = 0xCC;
pub(super) const RST0: u8 = 0xD0;
pub(super) const SOI: u8 = 0xD8;
pub(super) const EOI: u8 = 0xD9;
pub(super) const SOS: u8 = 0xDA;
pub(super) const DQT: u8 = 0xDB;
pub(super) const DNL: u8 = 0xDC;
pub(super) const DRI: u8 = 0xDD;
pub(super) const APP0: u8 = 0xE0;
pub(super) const APP14: u8 = 0xEE;
pub(super) const COM: u8 = 0xFE;

pub(super) fn is_rst(marker: u8) -> bool {
    (RST0..=RST0 + 7).contains(&marker)
}

/// SOF0..SOF15 (不含 DHT, JPG, DAC)
pub(super) fn is_sof(marker: u8) -> bool {
    (0xC0..=0xCF).contains(&marker) && marker != DHT && marker != 0xC8 && marker != DAC
}

fn is_standalone(marker: u8) -> bool {
    marker == SOI || marker == EOI || marker == TEM || is_rst(marker)
}

/// 一个标记段
#[derive(Debug, Clone, Copy)]
pub(super) struct Segment<'a> {
    pub marker: u8,
    /// 长度字段之后的负载
    pub payload: &'a [u8],
    /// 仅 SOS: 熵编码数据 (含 RST 标记, 未去除填充)
    pub entropy: &'a [u8],
}

/// 顺序读取标记段
pub(super) struct MarkerReader<'a> {
    data: &'a [u8],
    pos: usize,
    /// 数据已完整: 截断的熵编码数据延伸到末尾而不是报告数据不足
    at_end: bool,
}

impl<'a> MarkerReader<'a> {
    pub fn new(data: &'a [u8], at_end: bool) -> Self {
        Self {
            data,
            pos: 0,
            at_end,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// 读取下一个标记段, 数据用尽时返回 `None`
    ///
    /// 标记之前的无效字节与填充的 0xFF 被跳过.
    pub fn next_segment(&mut self) -> SwdecResult<Option<Segment<'a>>> {
        let data = self.data;
        let marker_pos = loop {
            let Some(rel) = data[self.pos..].iter().position(|&b| b == 0xFF) else {
                self.pos = data.len();
                return Ok(None);
            };
            if rel > 0 {
                trace!("JPEG: 跳过 {rel} 字节无效数据");
            }
            let mut p = self.pos + rel;
            while p + 1 < data.len() && data[p + 1] == 0xFF {
                p += 1;
            }
            if p + 1 >= data.len() {
                self.pos = p;
                return self.incomplete();
            }
            if data[p + 1] == 0x00 {
                self.pos = p + 2;
                continue;
            }
            break p;
        };

        let marker = data[marker_pos + 1];
        let body = marker_pos + 2;
        if is_standalone(marker) {
            self.pos = body;
            return Ok(Some(Segment {
                marker,
                payload: &[],
                entropy: &[],
            }));
        }

        if body + 2 > data.len() {
            return self.incomplete();
        }
        let len = usize::from(u16::from_be_bytes([data[body], data[body + 1]]));
        if len < 2 {
            return Err(SwdecError::InvalidData(format!(
                "JPEG: 标记 0x{marker:02X} 长度 {len} 无效"
            )));
        }
        let end = body + len;
        if end > data.len() {
            return self.incomplete();
        }
        let payload = &data[body + 2..end];
        self.pos = end;

        let entropy = if marker == SOS {
            let stop = match entropy_end(&data[end..]) {
                Some(n) => end + n,
                None if self.at_end => data.len(),
                None => return Err(SwdecError::NeedMoreData),
            };
            self.pos = stop;
            &data[end..stop]
        } else {
            &[]
        };
        Ok(Some(Segment {
            marker,
            payload,
            entropy,
        }))
    }

    fn incomplete(&mut self) -> SwdecResult<Option<Segment<'a>>> {
        if self.at_end {
            self.pos = self.data.len();
            Ok(None)
        } else {
            Err(SwdecError::NeedMoreData)
        }
    }
}

/// 熵编码数据的长度: 到第一个既不是填充也不是 RST 的标记为止
fn entropy_end(data: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i + 1 < data.len() {
        if data[i] != 0xFF {
            i += 1;
            continue;
        }
        // 连续的 0xFF 是填充, 结尾位置取填充的第一个字节
        let fill_start = i;
        while i + 1 < data.len() && data[i + 1] == 0xFF {
            i += 1;
        }
        let next = *data.get(i + 1)?;
        if next == 0x00 || is_rst(next) {
            i += 2;
        } else {
            return Some(fill_start);
        }
    }
    None
}

/// 在缓冲中定位一幅完整图像 (SOI..EOI)
///
/// `data` 必须以 SOI 开头. 返回 EOI 之后的位置; 数据不完整时返回 `None`.
pub(super) fn find_image_end(data: &[u8]) -> SwdecResult<Option<usize>> {
    let mut reader = MarkerReader::new(data, false);
    loop {
        match reader.next_segment() {
            Ok(Some(seg)) if seg.marker == EOI => return Ok(Some(reader.position())),
            Ok(Some(_)) => {}
            Ok(None) | Err(SwdecError::NeedMoreData) => return Ok(None),
            Err(err) => return Err(err),
        }
    }
}

/// 一个重启区间的熵编码数据 (已去除字节填充)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(super) struct RestartSegment {
    /// 区间之前的 RST 编号; 第一个区间为 `None`
    pub marker: Option<u8>,
    pub data: Vec<u8>,
}

/// 在 RSTn 处切分熵编码数据并去除 `FF 00` 填充
pub(super) fn split_restart_segments(entropy: &[u8]) -> Vec<RestartSegment> {
    let mut segments = vec![RestartSegment::default()];
    let mut i = 0;
    while i < entropy.len() {
        let b = entropy[i];
        if b != 0xFF {
            if let Some(seg) = segments.last_mut() {
                seg.data.push(b);
            }
            i += 1;
            continue;
        }
        match entropy.get(i + 1) {
            Some(0x00) => {
                if let Some(seg) = segments.last_mut() {
                    seg.data.push(0xFF);
                }
                i += 2;
            }
            Some(&m) if is_rst(m) => {
                segments.push(RestartSegment {
                    marker: Some(m - RST0),
                    data: Vec::new(),
                });
                i += 2;
            }
            _ => i += 1,
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_and_entropy() {
        let data = [
            0xFF, SOI, // SOI
            0xFF, COM, 0x00, 0x04, b'h', b'i', // COM
            0xFF, SOS, 0x00, 0x02, // SOS (空负载)
            0x12, 0xFF, 0x00, 0x34, 0xFF, 0xD0, 0x56, // 熵编码数据
            0xFF, 0xFF, EOI,
        ];
        let mut reader = MarkerReader::new(&data, false);
        assert_eq!(reader.next_segment().unwrap().unwrap().marker, SOI);
        let com = reader.next_segment().unwrap().unwrap();
        assert_eq!(com.payload, b"hi");
        let sos = reader.next_segment().unwrap().unwrap();
        assert_eq!(sos.entropy, &[0x12, 0xFF, 0x00, 0x34, 0xFF, 0xD0, 0x56]);
        assert_eq!(reader.next_segment().unwrap().unwrap().marker, EOI);
        assert!(reader.next_segment().unwrap().is_none());
        assert_eq!(find_image_end(&data).unwrap(), Some(data.len()));
    }

    #[test]
    fn test_entropy_end_skips_fill_runs() {
        assert_eq!(entropy_end(&[0x12, 0xFF, 0xFF, 0xFF, EOI]), Some(1));
        assert_eq!(entropy_end(&[0x12, 0xFF, EOI]), Some(1));
        assert_eq!(entropy_end(&[0xFF, 0xD1, 0x34, 0xFF, 0xFF, 0xDA]), Some(3));
        assert_eq!(entropy_end(&[0x12, 0xFF, 0xFF]), None);
    }

    #[test]
    fn test_incomplete_image() {
        let data = [0xFF, SOI, 0xFF, DQT, 0x00, 0x43, 0x00];
        assert_eq!(find_image_end(&data).unwrap(), None);
        let mut reader = MarkerReader::new(&data, true);
        assert_eq!(reader.next_segment().unwrap().unwrap().marker, SOI);
        assert!(reader.next_segment().unwrap().is_none());
    }

    #[test]
    fn test_split_restart_segments() {
        let entropy = [0x12, 0xFF, 0x00, 0xFF, 0xD3, 0x34, 0xFF, 0xD4];
        let segments = split_restart_segments(&entropy);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].data, vec![0x12, 0xFF]);
        assert_eq!(segments[1].marker, Some(3));
        assert_eq!(segments[1].data, vec![0x34]);
        assert_eq!(segments[2].marker, Some(4));
        assert!(segments[2].data.is_empty());
    }

    #[test]
    fn test_marker_classes() {
        assert!(is_sof(SOF0) && is_sof(SOF3) && is_sof(0xC9));
        assert!(!is_sof(DHT) && !is_sof(DAC));
        assert!(is_rst(0xD7) && !is_rst(SOI));
    }
}
