//! 比特流读取器.
//!
//! 在不可变字节区间 `[start, end)` 上按位读取数据, 使用大端位序 (MSB first).
//! MPEG-2 头部/slice 解析与 JPEG 头部解析共用此游标.
//!
//! 所有读取操作在数据不足时返回 [`SwdecError::NeedMoreData`], 绝不越过 `end` 读取.
//! 游标只前进, 唯一的例外是 [`BitReader::rewind_bits`], 用于在前瞻中发现起始码后回退.

use crate::{SwdecError, SwdecResult};

/// 起始码前缀 `00 00 01` 之后的码值偏移
///
/// [`BitReader::find_start_code`] 返回 `START_CODE_BASE + 后续字节`.
pub const START_CODE_BASE: u32 = 0x100;

/// 比特流读取器
///
/// # 示例
/// ```
/// use swdec_core::bitreader::BitReader;
///
/// let data = [0b10110001, 0b01010101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.peek_bits(4).unwrap(), 0b1011);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// assert_eq!(br.read_bits(12).unwrap(), 0b0001_0101_0101);
/// ```
#[derive(Clone)]
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 区间起点 (字节)
    start: usize,
    /// 区间终点 (字节, 不含)
    end: usize,
    /// 当前位位置 (相对 data[0])
    pos: usize,
}

impl<'a> BitReader<'a> {
    /// 在整个缓冲区上创建读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            start: 0,
            end: data.len(),
            pos: 0,
        }
    }

    /// 在 `[start, end)` 字节区间上创建读取器
    pub fn with_range(data: &'a [u8], start: usize, end: usize) -> SwdecResult<Self> {
        if start > end || end > data.len() {
            return Err(SwdecError::InvalidArgument(format!(
                "读取区间 [{start}, {end}) 超出缓冲区长度 {}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            start,
            end,
            pos: start * 8,
        })
    }

    /// 已读取的位数 (相对区间起点)
    pub fn bits_read(&self) -> usize {
        self.pos - self.start * 8
    }

    /// 剩余可读位数
    pub fn bits_left(&self) -> usize {
        (self.end * 8).saturating_sub(self.pos)
    }

    /// 是否已到达末尾
    pub fn is_eof(&self) -> bool {
        self.bits_left() == 0
    }

    /// 是否位于字节边界
    pub fn is_aligned(&self) -> bool {
        self.pos & 7 == 0
    }

    /// 当前字节位置 (相对 data[0], 向下取整)
    pub fn byte_position(&self) -> usize {
        self.pos >> 3
    }

    /// 区间终点
    pub fn end(&self) -> usize {
        self.end
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> SwdecResult<u32> {
        self.read_bits(1)
    }

    /// 读取 1 个位作为布尔值
    pub fn read_flag(&mut self) -> SwdecResult<bool> {
        Ok(self.read_bits(1)? != 0)
    }

    /// 窥视 N 个位 (不移动位置, 最多 32 位)
    ///
    /// 返回值的低 N 位有效.
    pub fn peek_bits(&self, n: u32) -> SwdecResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(SwdecError::InvalidArgument(format!(
                "peek_bits: n={n} 超过 32 位"
            )));
        }
        if n as usize > self.bits_left() {
            return Err(SwdecError::NeedMoreData);
        }
        Ok(self.window(n))
    }

    /// 窥视 N 个位, 超出区间部分以 0 填充
    ///
    /// 供 VLC 查表前瞻使用: 码字本身可能短于查表宽度.
    pub fn peek_bits_padded(&self, n: u32) -> u32 {
        if n == 0 || n > 32 {
            return 0;
        }
        self.window(n)
    }

    /// 读取 N 个位 (最多 32 位)
    pub fn read_bits(&mut self, n: u32) -> SwdecResult<u32> {
        let value = self.peek_bits(n)?;
        self.pos += n as usize;
        Ok(value)
    }

    /// 读取有符号整数 (二进制补码)
    pub fn read_bits_signed(&mut self, n: u32) -> SwdecResult<i32> {
        let val = self.read_bits(n)?;
        if n == 0 {
            return Ok(0);
        }
        if n >= 32 {
            return Ok(val as i32);
        }
        let shift = 32 - n;
        Ok(((val << shift) as i32) >> shift)
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: u32) -> SwdecResult<()> {
        if n as usize > self.bits_left() {
            return Err(SwdecError::NeedMoreData);
        }
        self.pos += n as usize;
        Ok(())
    }

    /// 回退 N 个位
    ///
    /// 仅用于前瞻中发现起始码的场景, 不能回退到区间起点之前.
    pub fn rewind_bits(&mut self, n: u32) -> SwdecResult<()> {
        if (n as usize) > self.bits_read() {
            return Err(SwdecError::Internal(format!(
                "rewind_bits: 回退 {n} 位超过已读取的 {} 位",
                self.bits_read()
            )));
        }
        self.pos -= n as usize;
        Ok(())
    }

    /// 对齐到下一个字节边界
    pub fn align_to_byte(&mut self) {
        self.pos = (self.pos + 7) & !7;
        self.pos = self.pos.min(self.end * 8);
    }

    /// 查找下一个起始码 `00 00 01 xx`
    ///
    /// 先对齐到字节边界, 然后向后扫描. 找到时游标停在前缀的第一个字节上,
    /// 返回 `0x100 + xx`. 区间内没有完整起始码时返回 `NeedMoreData`,
    /// 游标停在最后 3 个字节之前, 以便补充数据后重新扫描.
    pub fn find_start_code(&mut self) -> SwdecResult<u32> {
        self.align_to_byte();
        let mut i = self.pos >> 3;
        while i + 3 < self.end {
            if self.data[i] == 0 && self.data[i + 1] == 0 && self.data[i + 2] == 1 {
                self.pos = i * 8;
                return Ok(START_CODE_BASE + u32::from(self.data[i + 3]));
            }
            i += 1;
        }
        self.pos = self.pos.max(self.end.saturating_sub(3) * 8);
        Err(SwdecError::NeedMoreData)
    }

    /// 查找并越过下一个起始码, 返回其码值
    pub fn next_start_code(&mut self) -> SwdecResult<u32> {
        let code = self.find_start_code()?;
        self.pos += 32;
        Ok(code)
    }

    /// 从当前位置读取原始字节切片
    ///
    /// 仅在字节对齐时可用.
    pub fn read_bytes(&mut self, n: usize) -> SwdecResult<&'a [u8]> {
        if !self.is_aligned() {
            return Err(SwdecError::InvalidArgument("read_bytes 需要字节对齐".into()));
        }
        let from = self.pos >> 3;
        if from + n > self.end {
            return Err(SwdecError::NeedMoreData);
        }
        self.pos += n * 8;
        Ok(&self.data[from..from + n])
    }

    /// 从当前字节位置 (向上对齐) 到区间终点的剩余字节
    pub fn remaining(&self) -> &'a [u8] {
        let from = ((self.pos + 7) >> 3).min(self.end);
        &self.data[from..self.end]
    }

    /// 获取底层数据的引用
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// 以当前位位置为起点取出 n 位, 区间外按 0 处理
    fn window(&self, n: u32) -> u32 {
        let byte = self.pos >> 3;
        let mut acc: u64 = 0;
        for i in 0..8 {
            let b = if byte + i < self.end {
                self.data[byte + i]
            } else {
                0
            };
            acc = (acc << 8) | u64::from(b);
        }
        let shifted = acc << (self.pos & 7);
        (shifted >> (64 - n)) as u32
    }
}
