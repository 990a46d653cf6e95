//! JPEG Huffman 表
//!
//! DHT 只给出各码长的码字个数与符号, 码字按规范 Huffman 规则逐长度递增分配.

use swdec_core::bitreader::BitReader;
use swdec_core::{SwdecError, SwdecResult};

use super::tables::HuffmanSpec;
use crate::dsp::VlcTable;

/// 一级查表宽度
const PRIMARY_BITS: u32 = 9;

/// 由码长计数分配规范码字, 返回 `(码长, 码字, 符号)`
pub(super) fn canonical_codes(bits: &[u8; 16], values: &[u8]) -> SwdecResult<Vec<(u8, u32, u8)>> {
    let total: usize = bits.iter().map(|&b| usize::from(b)).sum();
    if total > 256 || total > values.len() {
        return Err(SwdecError::InvalidData(format!(
            "JPEG: Huffman 表码字数 {total} 无效 (符号 {})",
            values.len()
        )));
    }
    let mut codes = Vec::with_capacity(total);
    let mut code = 0u32;
    let mut k = 0usize;
    for (i, &count) in bits.iter().enumerate() {
        let len = i as u32 + 1;
        for _ in 0..count {
            if code >= (1 << len) {
                return Err(SwdecError::InvalidData(
                    "JPEG: Huffman 表码长计数溢出".into(),
                ));
            }
            codes.push((len as u8, code, values[k]));
            code += 1;
            k += 1;
        }
        code <<= 1;
    }
    Ok(codes)
}

/// 解码用 Huffman 表
#[derive(Debug, Clone)]
pub(super) struct HuffmanTable {
    vlc: VlcTable<u8>,
}

impl HuffmanTable {
    pub fn new(bits: &[u8; 16], values: &[u8]) -> SwdecResult<Self> {
        let codes = canonical_codes(bits, values)?;
        if codes.is_empty() {
            return Err(SwdecError::InvalidData("JPEG: 空 Huffman 表".into()));
        }
        Ok(Self {
            vlc: VlcTable::new(&codes, PRIMARY_BITS),
        })
    }

    pub fn from_spec(spec: &HuffmanSpec) -> SwdecResult<Self> {
        Self::new(&spec.bits, spec.values)
    }

    /// 解码一个符号
    #[inline]
    pub fn decode(&self, br: &mut BitReader<'_>) -> SwdecResult<u8> {
        self.vlc.decode(br)
    }
}

/// 读取 `size` 位附加值并按 T.81 F.2.2.1 扩展符号
#[inline]
pub(super) fn receive_extend(br: &mut BitReader<'_>, size: u8) -> SwdecResult<i32> {
    if size == 0 {
        return Ok(0);
    }
    let size = u32::from(size.min(16));
    let v = br.read_bits(size)? as i32;
    if v < (1 << (size - 1)) {
        Ok(v - (1 << size) + 1)
    } else {
        Ok(v)
    }
}
