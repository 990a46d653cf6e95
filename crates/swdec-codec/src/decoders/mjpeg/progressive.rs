//! 渐进模式的块解码 (T.81 G.1.2)
//!
//! DC 首次扫描与顺序模式相同但结果左移 Al 位; DC 细化每块读 1 位.
//! AC 扫描只覆盖频谱区间 `Ss..=Se`, 并用 EOB 游程跳过一串全零的块.
//! 细化扫描为已有非零系数追加校正位, 新系数的幅值只能是 ±(1 << Al).

use std::ops::RangeInclusive;

use swdec_core::bitreader::BitReader;
use swdec_core::{SwdecError, SwdecResult};

use super::huffman::{HuffmanTable, receive_extend};
use super::scan::{decode_dc_diff, table};
use crate::dsp::ZIGZAG_SCAN;

pub(super) fn decode_dc_first(
    br: &mut BitReader<'_>,
    block: &mut [i32; 64],
    dc: Option<&HuffmanTable>,
    pred: &mut i32,
    al: u32,
) -> SwdecResult<()> {
    *pred += decode_dc_diff(br, table(dc)?)?;
    block[0] = *pred << al;
    Ok(())
}

pub(super) fn decode_dc_refine(
    br: &mut BitReader<'_>,
    block: &mut [i32; 64],
    al: u32,
) -> SwdecResult<()> {
    if br.read_flag()? {
        block[0] |= 1 << al;
    }
    Ok(())
}

/// 读取 EOB 游程: 2^r 加 r 位附加值, 当前块计入其中
fn read_eobrun(br: &mut BitReader<'_>, r: u32) -> SwdecResult<u32> {
    let mut run = 1u32 << r;
    if r > 0 {
        run += br.read_bits(r)?;
    }
    Ok(run - 1)
}

pub(super) fn decode_ac_first(
    br: &mut BitReader<'_>,
    block: &mut [i32; 64],
    ac: Option<&HuffmanTable>,
    band: RangeInclusive<usize>,
    al: u32,
    eobrun: &mut u32,
) -> SwdecResult<()> {
    if *eobrun > 0 {
        *eobrun -= 1;
        return Ok(());
    }
    let ac = table(ac)?;
    let (mut k, end) = (*band.start(), *band.end());
    while k <= end {
        let rs = ac.decode(br)?;
        let (r, s) = (u32::from(rs >> 4), rs & 0x0F);
        if s == 0 {
            if r < 15 {
                *eobrun = read_eobrun(br, r)?;
                break;
            }
            k += 16;
            continue;
        }
        k += r as usize;
        if k > end {
            return Err(SwdecError::Corrupted(format!(
                "JPEG: 渐进 AC 系数位置 {k} 超出频谱 {end}"
            )));
        }
        block[ZIGZAG_SCAN[k]] = receive_extend(br, s)? * (1 << al);
        k += 1;
    }
    Ok(())
}

/// 为已有非零系数读取校正位
fn refine_nonzero(br: &mut BitReader<'_>, coef: &mut i32, p1: i32) -> SwdecResult<()> {
    if br.read_flag()? && (*coef & p1) == 0 {
        if *coef >= 0 {
            *coef += p1;
        } else {
            *coef -= p1;
        }
    }
    Ok(())
}

pub(super) fn decode_ac_refine(
    br: &mut BitReader<'_>,
    block: &mut [i32; 64],
    ac: Option<&HuffmanTable>,
    band: RangeInclusive<usize>,
    al: u32,
    eobrun: &mut u32,
) -> SwdecResult<()> {
    let p1 = 1i32 << al;
    let (mut k, end) = (*band.start(), *band.end());

    if *eobrun == 0 {
        let ac = table(ac)?;
        while k <= end {
            let rs = ac.decode(br)?;
            let (mut r, s) = (i32::from(rs >> 4), rs & 0x0F);
            let value = match s {
                0 if r < 15 => {
                    *eobrun = read_eobrun(br, r as u32)? + 1;
                    break;
                }
                0 => 0,
                1 => {
                    if br.read_flag()? {
                        p1
                    } else {
                        -p1
                    }
                }
                _ => {
                    return Err(SwdecError::Corrupted(format!(
                        "JPEG: 细化扫描系数类别 {s} 无效"
                    )));
                }
            };
            // 跳过 r 个零系数, 途经的非零系数读取校正位
            while k <= end {
                let pos = ZIGZAG_SCAN[k];
                if block[pos] != 0 {
                    refine_nonzero(br, &mut block[pos], p1)?;
                } else {
                    if r == 0 {
                        break;
                    }
                    r -= 1;
                }
                k += 1;
            }
            if value != 0 {
                if k > end {
                    return Err(SwdecError::Corrupted(
                        "JPEG: 细化扫描新系数超出频谱".into(),
                    ));
                }
                block[ZIGZAG_SCAN[k]] = value;
            }
            k += 1;
        }
    }

    if *eobrun > 0 {
        // EOB 游程内的块只剩校正位
        while k <= end {
            let pos = ZIGZAG_SCAN[k];
            if block[pos] != 0 {
                refine_nonzero(br, &mut block[pos], p1)?;
            }
            k += 1;
        }
        *eobrun -= 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::huffman::canonical_codes;
    use super::*;
    use swdec_core::bitwriter::BitWriter;

    /// 2 位定长码: EOB, (0,1), EOBRUN r=1, ZRL
    const SYMBOLS: [u8; 4] = [0x00, 0x01, 0x10, 0xF0];

    fn bits() -> [u8; 16] {
        let mut bits = [0u8; 16];
        bits[1] = 4;
        bits
    }

    fn ac_table() -> HuffmanTable {
        HuffmanTable::new(&bits(), &SYMBOLS).unwrap()
    }

    fn write_symbol(bw: &mut BitWriter, symbol: u8) {
        let codes = canonical_codes(&bits(), &SYMBOLS).unwrap();
        let &(len, code, _) = codes.iter().find(|c| c.2 == symbol).unwrap();
        bw.write_bits(code, u32::from(len));
    }

    #[test]
    fn test_ac_first_with_eob_run() {
        let mut bw = BitWriter::new();
        // 块 0: 位置 1 的系数 -1 (类别 1, 附加位 0), 然后 EOB 游程 r=1, 附加位 1 -> 共 3 块
        write_symbol(&mut bw, 0x01);
        bw.write_bit(0);
        write_symbol(&mut bw, 0x10);
        bw.write_bit(1);
        let data = bw.finish();
        let table = ac_table();
        let mut br = BitReader::new(&data);
        let mut eobrun = 0;
        let mut blocks = [[0i32; 64]; 3];
        for block in &mut blocks {
            decode_ac_first(&mut br, block, Some(&table), 1..=63, 1, &mut eobrun).unwrap();
        }
        assert_eq!(blocks[0][ZIGZAG_SCAN[1]], -2);
        assert_eq!(eobrun, 0);
        assert_eq!(br.bits_read(), 6);
        assert!(blocks[1..].iter().all(|b| b.iter().all(|&c| c == 0)));
    }

    #[test]
    fn test_ac_refine_corrects_and_adds() {
        let mut block = [0i32; 64];
        block[ZIGZAG_SCAN[1]] = 2;
        block[ZIGZAG_SCAN[3]] = -2;
        let mut bw = BitWriter::new();
        // 新系数 +1 放在第 1 个零位置 (k=2): 符号位 1, 途经 k=1 的校正位 1
        write_symbol(&mut bw, 0x01);
        bw.write_bit(1);
        bw.write_bit(1);
        // EOB (r=0): 剩余的 k=3 校正位 1
        write_symbol(&mut bw, 0x00);
        bw.write_bit(1);
        let data = bw.finish();
        let table = ac_table();
        let mut br = BitReader::new(&data);
        let mut eobrun = 0;
        decode_ac_refine(&mut br, &mut block, Some(&table), 1..=63, 0, &mut eobrun).unwrap();
        assert_eq!(block[ZIGZAG_SCAN[1]], 3);
        assert_eq!(block[ZIGZAG_SCAN[2]], 1);
        assert_eq!(block[ZIGZAG_SCAN[3]], -3);
        assert_eq!(eobrun, 0);
    }

    #[test]
    fn test_ac_refine_zrl_skips_sixteen_zeros() {
        let mut block = [0i32; 64];
        let mut bw = BitWriter::new();
        write_symbol(&mut bw, 0xF0);
        write_symbol(&mut bw, 0x01);
        bw.write_bit(0);
        write_symbol(&mut bw, 0x00);
        let data = bw.finish();
        let table = ac_table();
        let mut br = BitReader::new(&data);
        let mut eobrun = 0;
        decode_ac_refine(&mut br, &mut block, Some(&table), 1..=63, 2, &mut eobrun).unwrap();
        assert_eq!(block[ZIGZAG_SCAN[17]], -4);
        assert_eq!(block.iter().filter(|&&c| c != 0).count(), 1);
    }

    #[test]
    fn test_dc_refine_sets_bit() {
        let data = [0b1000_0000];
        let mut br = BitReader::new(&data);
        let mut block = [0i32; 64];
        block[0] = 8;
        decode_dc_refine(&mut br, &mut block, 2).unwrap();
        assert_eq!(block[0], 12);
    }
}
