//! 8x8 块层: DCT 系数解码, 反量化与失配控制

use swdec_core::bitreader::BitReader;
use swdec_core::{SwdecError, SwdecResult};

use super::tables::{ALTERNATE_SCAN, Coeff, Mpeg2Vlc, ZIGZAG_SCAN};
use crate::dsp::{Sparsity, VlcTable};

/// 块解码所需的图片级参数
#[derive(Debug, Clone, Copy)]
pub(super) struct BlockParams<'a> {
    pub alternate_scan: bool,
    /// 帧内块使用表 B.15
    pub intra_vlc_format: bool,
    pub intra_dc_precision: u8,
    pub intra_matrix: &'a [u8; 64],
    pub non_intra_matrix: &'a [u8; 64],
}

impl BlockParams<'_> {
    fn scan(&self) -> &'static [usize; 64] {
        if self.alternate_scan {
            &ALTERNATE_SCAN
        } else {
            &ZIGZAG_SCAN
        }
    }
}

/// 解码 dct_dc_differential
fn decode_dc_diff(br: &mut BitReader<'_>, vlc: &Mpeg2Vlc, luma: bool) -> SwdecResult<i32> {
    let size = if luma {
        vlc.dc_size_luma.decode(br)?
    } else {
        vlc.dc_size_chroma.decode(br)?
    };
    if size == 0 {
        return Ok(0);
    }
    let size = u32::from(size);
    let bits = br.read_bits(size)? as i32;
    let half = 1i32 << (size - 1);
    Ok(if bits < half {
        bits - (1 << size) + 1
    } else {
        bits
    })
}

/// 读取一个 (run, level), 块结束返回 `None`
fn decode_run_level(
    br: &mut BitReader<'_>,
    table: &VlcTable<Coeff>,
    first_non_intra: bool,
) -> SwdecResult<Option<(usize, i32)>> {
    // 非帧内块的首系数 '1s' 表示 (0, ±1)
    if first_non_intra && br.peek_bits_padded(1) == 1 {
        br.skip_bits(1)?;
        let level = if br.read_flag()? { -1 } else { 1 };
        return Ok(Some((0, level)));
    }
    match table.decode(br)? {
        Coeff::EndOfBlock => Ok(None),
        Coeff::Escape => {
            let run = br.read_bits(6)? as usize;
            let level = br.read_bits_signed(12)?;
            if level == 0 || level == -2048 {
                return Err(SwdecError::Corrupted(format!("转义系数 level 无效: {level}")));
            }
            Ok(Some((run, level)))
        }
        Coeff::RunLevel(run, level) => {
            let level = i32::from(level);
            let level = if br.read_flag()? { -level } else { level };
            Ok(Some((usize::from(run), level)))
        }
    }
}

/// 解码并反量化一个帧内块
///
/// `dc_pred` 为该分量的 DC 预测值, 解码后更新. 系数按自然顺序写入 `block`.
pub(super) fn decode_intra_block(
    br: &mut BitReader<'_>,
    vlc: &Mpeg2Vlc,
    params: &BlockParams<'_>,
    luma: bool,
    quantiser_scale: i32,
    dc_pred: &mut i32,
    block: &mut [i32; 64],
) -> SwdecResult<Sparsity> {
    block.fill(0);
    *dc_pred += decode_dc_diff(br, vlc, luma)?;
    let dc = *dc_pred * (8 >> params.intra_dc_precision);
    block[0] = dc;
    let mut sum = dc;
    let scan = params.scan();
    let table = if params.intra_vlc_format {
        &vlc.dct_coeff_intra
    } else {
        &vlc.dct_coeff
    };
    let mut bound = RowBound::default();
    let mut i = 0usize;

    while let Some((run, level)) = decode_run_level(br, table, false)? {
        i += run + 1;
        if i > 63 {
            return Err(SwdecError::Corrupted("帧内块系数越界".into()));
        }
        let pos = scan[i];
        let value = (level * quantiser_scale * i32::from(params.intra_matrix[pos]) * 2 / 32)
            .clamp(-2048, 2047);
        block[pos] = value;
        sum += value;
        bound.add(pos);
    }
    Ok(mismatch_control(block, sum, bound))
}

/// 解码并反量化一个非帧内块
pub(super) fn decode_non_intra_block(
    br: &mut BitReader<'_>,
    vlc: &Mpeg2Vlc,
    params: &BlockParams<'_>,
    quantiser_scale: i32,
    block: &mut [i32; 64],
) -> SwdecResult<Sparsity> {
    block.fill(0);
    let scan = params.scan();
    let mut bound = RowBound::default();
    let mut sum = 0i32;
    let mut next = 0usize;
    let mut first = true;

    while let Some((run, level)) = decode_run_level(br, &vlc.dct_coeff, first)? {
        first = false;
        let i = next + run;
        if i > 63 {
            return Err(SwdecError::Corrupted("非帧内块系数越界".into()));
        }
        next = i + 1;
        let pos = scan[i];
        let value = ((2 * level + level.signum())
            * quantiser_scale
            * i32::from(params.non_intra_matrix[pos])
            / 32)
            .clamp(-2048, 2047);
        block[pos] = value;
        sum += value;
        bound.add(pos);
    }
    Ok(mismatch_control(block, sum, bound))
}

/// 非零系数所在的最大行, 用于选择 IDCT 行数
#[derive(Debug, Default, Clone, Copy)]
struct RowBound {
    max_row: usize,
    ac: bool,
}

impl RowBound {
    fn add(&mut self, pos: usize) {
        if pos != 0 {
            self.ac = true;
        }
        self.max_row = self.max_row.max(pos >> 3);
    }
}

/// 系数和为偶数时翻转 F[7][7] 的最低位
fn mismatch_control(block: &mut [i32; 64], sum: i32, mut bound: RowBound) -> Sparsity {
    if sum & 1 == 0 {
        block[63] ^= 1;
        bound.add(63);
    }
    if !bound.ac {
        Sparsity::Dc
    } else if bound.max_row < 2 {
        Sparsity::Low2
    } else if bound.max_row < 4 {
        Sparsity::Low4
    } else {
        Sparsity::Full
    }
}

#[cfg(test)]
mod tests {
    use super::super::tables::{DEFAULT_INTRA_MATRIX, DEFAULT_NON_INTRA_MATRIX, vlc};
    use super::*;
    use swdec_core::bitwriter::BitWriter;

    fn params() -> BlockParams<'static> {
        BlockParams {
            alternate_scan: false,
            intra_vlc_format: false,
            intra_dc_precision: 0,
            intra_matrix: &DEFAULT_INTRA_MATRIX,
            non_intra_matrix: &DEFAULT_NON_INTRA_MATRIX,
        }
    }

    #[test]
    fn test_intra_dc_only_block() {
        // dc_size=0 ('100'), 紧接 EOB ('10')
        let mut bw = BitWriter::new();
        bw.write_bits(0b100, 3);
        bw.write_bits(0b10, 2);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let mut block = [0i32; 64];
        let mut dc_pred = 128;
        let sparsity =
            decode_intra_block(&mut br, vlc(), &params(), true, 2, &mut dc_pred, &mut block)
                .unwrap();
        assert_eq!(dc_pred, 128);
        assert_eq!(block[0], 1024);
        // 和为偶数, F[7][7] 被置 1
        assert_eq!(block[63], 1);
        assert_eq!(sparsity, Sparsity::Full);
        assert_eq!(br.bits_read(), 5);
    }

    #[test]
    fn test_intra_dc_differential() {
        // 亮度 dc_size=2 ('01'), 差值位 '01' -> -2
        let mut bw = BitWriter::new();
        bw.write_bits(0b01, 2);
        bw.write_bits(0b01, 2);
        bw.write_bits(0b10, 2);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let mut block = [0i32; 64];
        let mut dc_pred = 128;
        decode_intra_block(&mut br, vlc(), &params(), true, 2, &mut dc_pred, &mut block).unwrap();
        assert_eq!(dc_pred, 126);
        assert_eq!(block[0], 126 * 8);
    }

    #[test]
    fn test_intra_vlc_format_table() {
        // dc_size=0, 表 B.15 的 '110'+'0' -> (0, +2), EOB '0110'
        let mut bw = BitWriter::new();
        bw.write_bits(0b100, 3);
        bw.write_bits(0b1100, 4);
        bw.write_bits(0b0110, 4);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let mut block = [0i32; 64];
        let mut dc_pred = 128;
        let params = BlockParams {
            intra_vlc_format: true,
            ..params()
        };
        decode_intra_block(&mut br, vlc(), &params, true, 2, &mut dc_pred, &mut block).unwrap();
        // 2 * 2 * 16 * 2 / 32 = 4, 位于扫描位置 1
        assert_eq!(block[ZIGZAG_SCAN[1]], 4);
        assert_eq!(br.bits_read(), 11);
    }

    #[test]
    fn test_non_intra_first_coefficient() {
        // '1' + 符号 0 -> (0, +1); 然后 '011'+'1' -> (1, -1); EOB
        let mut bw = BitWriter::new();
        bw.write_bits(0b10, 2);
        bw.write_bits(0b0111, 4);
        bw.write_bits(0b10, 2);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let mut block = [0i32; 64];
        let sparsity = decode_non_intra_block(&mut br, vlc(), &params(), 4, &mut block).unwrap();
        // (2*1 + 1) * 4 * 16 / 32 = 6
        assert_eq!(block[0], 6);
        // 扫描位置 2 -> 自然位置 8
        assert_eq!(block[8], -6);
        // 和为 0, 偶数
        assert_eq!(block[63], 1);
        assert_eq!(sparsity, Sparsity::Full);
    }

    #[test]
    fn test_escape_coefficient() {
        // 非帧内首系数使用转义: '000001' run=3 level=-100
        let mut bw = BitWriter::new();
        bw.write_bits(0b000001, 6);
        bw.write_bits(3, 6);
        bw.write_bits_signed(-100, 12);
        bw.write_bits(0b10, 2);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let mut block = [0i32; 64];
        decode_non_intra_block(&mut br, vlc(), &params(), 2, &mut block).unwrap();
        // (2*-100 - 1) * 2 * 16 / 32 = -201, 和为奇数不做失配控制
        assert_eq!(block[ZIGZAG_SCAN[3]], -201);
        assert_eq!(block[63], 0);
    }

    #[test]
    fn test_run_overflow_is_corruption() {
        let mut bw = BitWriter::new();
        bw.write_bits(0b000001, 6);
        bw.write_bits(63, 6);
        bw.write_bits(1, 12);
        bw.write_bits(0b000001, 6);
        bw.write_bits(5, 6);
        bw.write_bits(1, 12);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let mut block = [0i32; 64];
        assert!(matches!(
            decode_non_intra_block(&mut br, vlc(), &params(), 2, &mut block),
            Err(SwdecError::Corrupted(_))
        ));
    }
}
