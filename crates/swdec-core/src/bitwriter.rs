//! 比特流写入器.
//!
//! 按大端位序向字节缓冲区写入数据, 与 [`BitReader`](crate::bitreader::BitReader) 对应.
//! 测试和基准用它合成 MPEG-2 基本流与 JPEG 熵编码段.
//!
//! JPEG 熵编码段需要字节填充: 每个 0xFF 字节之后插入 0x00,
//! 通过 [`BitWriter::with_byte_stuffing`] 开启.

/// 比特流写入器
///
/// # 示例
/// ```
/// use swdec_core::bitwriter::BitWriter;
///
/// let mut bw = BitWriter::new();
/// bw.write_start_code(0xB3);
/// bw.write_bits(0b1011, 4);
/// let data = bw.finish();
/// assert_eq!(data, vec![0x00, 0x00, 0x01, 0xB3, 0b1011_0000]);
/// ```
pub struct BitWriter {
    /// 输出缓冲区
    data: Vec<u8>,
    /// 当前字节 (正在填充)
    current_byte: u8,
    /// 当前字节中已填充的位数 (0-7)
    bit_count: u8,
    /// 是否在 0xFF 之后插入 0x00
    byte_stuffing: bool,
}

impl BitWriter {
    /// 创建新的比特流写入器
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            current_byte: 0,
            bit_count: 0,
            byte_stuffing: false,
        }
    }

    /// 创建带 JPEG 字节填充的写入器
    pub fn with_byte_stuffing() -> Self {
        Self {
            byte_stuffing: true,
            ..Self::new()
        }
    }

    /// 获取已写入的总位数 (不含填充字节)
    pub fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.bit_count as usize
    }

    /// 写入 1 个位
    pub fn write_bit(&mut self, bit: u32) {
        self.current_byte = (self.current_byte << 1) | (bit & 1) as u8;
        self.bit_count += 1;
        if self.bit_count == 8 {
            self.flush_byte();
        }
    }

    /// 写入 1 个布尔位
    pub fn write_flag(&mut self, flag: bool) {
        self.write_bit(u32::from(flag));
    }

    /// 写入 N 个位 (最多 32 位), 值的低 N 位被写入
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32, "write_bits: n={} 超过 32 位", n);
        for i in (0..n).rev() {
            self.write_bit((value >> i) & 1);
        }
    }

    /// 写入有符号整数 (二进制补码, 取低 N 位)
    pub fn write_bits_signed(&mut self, value: i32, n: u32) {
        let mask = if n >= 32 { u32::MAX } else { (1u32 << n) - 1 };
        self.write_bits((value as u32) & mask, n);
    }

    /// 写入 VLC 码字, `code` 为右对齐的 `len` 位
    pub fn write_code(&mut self, code: (u32, u32)) {
        self.write_bits(code.0, code.1);
    }

    /// 以 0 对齐到字节边界
    pub fn align_to_byte(&mut self) {
        while self.bit_count != 0 {
            self.write_bit(0);
        }
    }

    /// 以 1 对齐到字节边界 (JPEG 熵编码段结尾)
    pub fn align_with_ones(&mut self) {
        while self.bit_count != 0 {
            self.write_bit(1);
        }
    }

    /// 写入 MPEG 起始码 `00 00 01 code`, 先以 0 对齐
    pub fn write_start_code(&mut self, code: u8) {
        self.align_to_byte();
        self.data.extend_from_slice(&[0x00, 0x00, 0x01, code]);
    }

    /// 写入 JPEG 标记 `FF xx`, 不做字节填充
    pub fn write_marker(&mut self, marker: u8) {
        self.align_with_ones();
        self.data.extend_from_slice(&[0xFF, marker]);
    }

    /// 写入完整字节, 不做字节填充
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.bit_count == 0 {
            self.data.extend_from_slice(bytes);
        } else {
            let stuffing = std::mem::replace(&mut self.byte_stuffing, false);
            for &b in bytes {
                self.write_bits(u32::from(b), 8);
            }
            self.byte_stuffing = stuffing;
        }
    }

    /// 获取当前已完成的字节数据引用 (不包括正在填充的当前字节)
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// 完成写入, 不足一个字节时以 0 填充
    pub fn finish(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.data
    }

    fn flush_byte(&mut self) {
        let byte = self.current_byte;
        self.data.push(byte);
        if self.byte_stuffing && byte == 0xFF {
            self.data.push(0x00);
        }
        self.current_byte = 0;
        self.bit_count = 0;
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}
