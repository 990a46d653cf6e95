//! 两级查表 VLC 解码器.
//!
//! 一级表以 `primary_bits` 位前瞻直接索引, 更长的码字落入按前缀分组的二级表.
//! 表在构建后只读, 由各解码器以 `OnceLock` 在首次使用时构建一次.

use swdec_core::bitreader::BitReader;
use swdec_core::{SwdecError, SwdecResult};

#[derive(Debug, Clone, Copy)]
enum Entry<T: Copy> {
    Empty,
    Leaf { symbol: T, len: u8 },
    Link { offset: u32, bits: u8 },
}

/// VLC 查找表
#[derive(Debug, Clone)]
pub struct VlcTable<T: Copy> {
    primary_bits: u32,
    max_len: u32,
    entries: Vec<Entry<T>>,
}

impl<T: Copy> VlcTable<T> {
    /// 由 `(码长, 码字, 符号)` 列表构建
    ///
    /// 码字右对齐. 码表必须是前缀码, 重复或冲突的条目以后者为准.
    pub fn new(codes: &[(u8, u32, T)], primary_bits: u32) -> Self {
        let max_len = codes.iter().map(|c| u32::from(c.0)).max().unwrap_or(1).max(1);
        let primary_bits = primary_bits.clamp(1, max_len);
        let mut entries = vec![Entry::Empty; 1 << primary_bits];

        // 一级表: 码长不超过 primary_bits 的码字展开填充
        for &(len, code, symbol) in codes {
            let len32 = u32::from(len);
            if len32 == 0 || len32 > primary_bits {
                continue;
            }
            let shift = primary_bits - len32;
            let first = (code << shift) as usize;
            for slot in &mut entries[first..first + (1 << shift)] {
                *slot = Entry::Leaf { symbol, len };
            }
        }

        // 二级表: 按 primary_bits 位前缀分组, 子表宽度取组内最长余码
        let mut sub_bits = vec![0u32; 1 << primary_bits];
        for &(len, code, _) in codes {
            let len32 = u32::from(len);
            if len32 > primary_bits {
                let prefix = (code >> (len32 - primary_bits)) as usize;
                sub_bits[prefix] = sub_bits[prefix].max(len32 - primary_bits);
            }
        }
        for (prefix, &bits) in sub_bits.iter().enumerate() {
            if bits == 0 {
                continue;
            }
            let offset = entries.len() as u32;
            entries.extend(std::iter::repeat_n(Entry::Empty, 1 << bits));
            entries[prefix] = Entry::Link {
                offset,
                bits: bits as u8,
            };
        }
        for &(len, code, symbol) in codes {
            let len32 = u32::from(len);
            if len32 <= primary_bits {
                continue;
            }
            let rem_len = len32 - primary_bits;
            let prefix = (code >> rem_len) as usize;
            let Entry::Link { offset, bits } = entries[prefix] else {
                continue;
            };
            let shift = u32::from(bits) - rem_len;
            let rem = (code & ((1 << rem_len) - 1)) as usize;
            let first = offset as usize + (rem << shift);
            for slot in &mut entries[first..first + (1 << shift)] {
                *slot = Entry::Leaf { symbol, len };
            }
        }

        Self {
            primary_bits,
            max_len,
            entries,
        }
    }

    /// 最长码长
    pub fn max_len(&self) -> u32 {
        self.max_len
    }

    /// 对左对齐于 `max_len` 位的前瞻值查表, 返回 `(符号, 消耗位数)`
    pub fn lookup(&self, bits: u32) -> Option<(T, u32)> {
        let idx = (bits >> (self.max_len - self.primary_bits)) as usize;
        match self.entries[idx] {
            Entry::Leaf { symbol, len } => Some((symbol, u32::from(len))),
            Entry::Link { offset, bits: sub } => {
                let rest = self.max_len - self.primary_bits;
                let sub_idx = (bits >> (rest - u32::from(sub))) & ((1 << sub) - 1);
                match self.entries[offset as usize + sub_idx as usize] {
                    Entry::Leaf { symbol, len } => Some((symbol, u32::from(len))),
                    _ => None,
                }
            }
            Entry::Empty => None,
        }
    }

    /// 从读取器解码一个符号
    ///
    /// 无效码字: 剩余位数不足最长码长时视为数据不足, 否则为码流损坏.
    pub fn decode(&self, br: &mut BitReader<'_>) -> SwdecResult<T> {
        let bits = br.peek_bits_padded(self.max_len);
        match self.lookup(bits) {
            Some((symbol, len)) => {
                br.skip_bits(len)?;
                Ok(symbol)
            }
            None if br.bits_left() < self.max_len as usize => Err(SwdecError::NeedMoreData),
            None => Err(SwdecError::Corrupted(format!(
                "无效 VLC 码字: 0x{bits:0width$X}",
                width = self.max_len.div_ceil(4) as usize
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> VlcTable<i32> {
        // 1, 01, 001, 0001 1, 0001 0, 0000 11 (长码落入二级表)
        VlcTable::new(
            &[
                (1, 0b1, 0),
                (2, 0b01, 1),
                (3, 0b001, 2),
                (5, 0b00011, 3),
                (5, 0b00010, 4),
                (6, 0b000011, 5),
            ],
            3,
        )
    }

    #[test]
    fn test_decode_short_and_long_codes() {
        let table = sample_table();
        // 1 01 001 00011 00010 000011 -> 0 1 2 3 4 5
        let data = [0b1010_0100, 0b0110_0010, 0b0000_1100];
        let mut br = BitReader::new(&data);
        let symbols: Vec<i32> = (0..6).map(|_| table.decode(&mut br).unwrap()).collect();
        assert_eq!(symbols, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(br.bits_read(), 22);
    }

    #[test]
    fn test_invalid_code_reports_corruption() {
        let table = sample_table();
        let data = [0b0000_0000, 0xFF];
        let mut br = BitReader::new(&data);
        assert!(matches!(
            table.decode(&mut br),
            Err(SwdecError::Corrupted(_))
        ));
    }

    #[test]
    fn test_truncated_code_needs_more_data() {
        let table = sample_table();
        let data = [0b0000_0000];
        let mut br = BitReader::with_range(&data, 0, 1).unwrap();
        br.skip_bits(4).unwrap();
        assert!(matches!(
            table.decode(&mut br),
            Err(SwdecError::NeedMoreData)
        ));
    }

    #[test]
    fn test_lookup_returns_consumed_bits() {
        let table = sample_table();
        assert_eq!(table.lookup(0b000011), Some((5, 6)));
        assert_eq!(table.lookup(0b010000), Some((1, 2)));
        assert_eq!(table.lookup(0b000000), None);
    }
}
