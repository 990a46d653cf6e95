//! MPEG-2 视频常量表
//!
//! 扫描顺序, 默认量化矩阵, 量化尺度, 帧率以及附录 B 的全部 VLC 码表.
//! VLC 码表格式: (位数, 码字, 符号), 码字右对齐, 不含符号位.

use std::sync::OnceLock;

use crate::dsp::VlcTable;

// ============================================================================
// 扫描与量化
// ============================================================================

pub(super) use crate::dsp::ZIGZAG_SCAN;

/// 交替扫描 (alternate_scan = 1)
pub(super) const ALTERNATE_SCAN: [usize; 64] = [
    0, 8, 16, 24, 1, 9, 2, 10, 17, 25, 32, 40, 48, 56, 57, 49, 41, 33, 26, 18, 3, 11, 4, 12, 19,
    27, 34, 42, 50, 58, 35, 43, 51, 59, 20, 28, 5, 13, 6, 14, 21, 29, 36, 44, 52, 60, 37, 45, 53,
    61, 22, 30, 7, 15, 23, 31, 38, 46, 54, 62, 39, 47, 55, 63,
];

/// 默认帧内量化矩阵 (自然顺序)
pub(super) const DEFAULT_INTRA_MATRIX: [u8; 64] = [
    8, 16, 19, 22, 26, 27, 29, 34, //
    16, 16, 22, 24, 27, 29, 34, 37, //
    19, 22, 26, 27, 29, 34, 34, 38, //
    22, 22, 26, 27, 29, 34, 37, 40, //
    22, 26, 27, 29, 32, 35, 40, 48, //
    26, 27, 29, 32, 35, 40, 48, 58, //
    26, 27, 29, 34, 38, 46, 56, 69, //
    27, 29, 35, 38, 46, 56, 69, 83,
];

/// 默认非帧内量化矩阵
pub(super) const DEFAULT_NON_INTRA_MATRIX: [u8; 64] = [16; 64];

/// 非线性量化尺度 (q_scale_type = 1)
const NON_LINEAR_QSCALE: [u8; 32] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 12, 14, 16, 18, 20, 22, 24, 28, 32, 36, 40, 44, 48, 52, 56, 64,
    72, 80, 88, 96, 104, 112,
];

/// 由 quantiser_scale_code 计算量化尺度
pub(super) fn quantiser_scale(code: u32, q_scale_type: bool) -> i32 {
    let code = (code & 31) as usize;
    if q_scale_type {
        i32::from(NON_LINEAR_QSCALE[code])
    } else {
        2 * code as i32
    }
}

/// 由 frame_rate_code 与扩展字段计算帧率 (帧/秒)
///
/// 未定义的码值按 30 处理.
pub(super) fn frame_rate(code: u8, ext_n: u8, ext_d: u8) -> f64 {
    let base = match code {
        1 => 24000.0 / 1001.0,
        2 => 24.0,
        3 => 25.0,
        4 => 30000.0 / 1001.0,
        5 => 30.0,
        6 => 50.0,
        7 => 60000.0 / 1001.0,
        8 => 60.0,
        _ => 30.0,
    };
    base * f64::from(ext_n + 1) / f64::from(ext_d + 1)
}

// ============================================================================
// 宏块层 VLC
// ============================================================================

/// macroblock_type 标志位
pub(super) const MB_INTRA: u8 = 0x01;
pub(super) const MB_PATTERN: u8 = 0x02;
pub(super) const MB_BACKWARD: u8 = 0x04;
pub(super) const MB_FORWARD: u8 = 0x08;
pub(super) const MB_QUANT: u8 = 0x10;

/// macroblock_address_increment 转义 (+33)
pub(super) const MBA_ESCAPE: u8 = 0xFF;
/// macroblock_stuffing
pub(super) const MBA_STUFFING: u8 = 0xFE;

/// macroblock_address_increment (表 B.1)
pub(super) const MBA_VLC: &[(u8, u32, u8)] = &[
    (1, 0b1, 1),
    (3, 0b011, 2),
    (3, 0b010, 3),
    (4, 0b0011, 4),
    (4, 0b0010, 5),
    (5, 0b00011, 6),
    (5, 0b00010, 7),
    (7, 0b0000111, 8),
    (7, 0b0000110, 9),
    (8, 0b00001011, 10),
    (8, 0b00001010, 11),
    (8, 0b00001001, 12),
    (8, 0b00001000, 13),
    (8, 0b00000111, 14),
    (8, 0b00000110, 15),
    (10, 0b0000010111, 16),
    (10, 0b0000010110, 17),
    (10, 0b0000010101, 18),
    (10, 0b0000010100, 19),
    (10, 0b0000010011, 20),
    (10, 0b0000010010, 21),
    (11, 0b00000100011, 22),
    (11, 0b00000100010, 23),
    (11, 0b00000100001, 24),
    (11, 0b00000100000, 25),
    (11, 0b00000011111, 26),
    (11, 0b00000011110, 27),
    (11, 0b00000011101, 28),
    (11, 0b00000011100, 29),
    (11, 0b00000011011, 30),
    (11, 0b00000011010, 31),
    (11, 0b00000011001, 32),
    (11, 0b00000011000, 33),
    (11, 0b00000001000, MBA_ESCAPE),
    (11, 0b00000001111, MBA_STUFFING),
];

/// I 图片 macroblock_type (表 B.2)
pub(super) const MB_TYPE_I_VLC: &[(u8, u32, u8)] = &[(1, 0b1, 0x01), (2, 0b01, 0x11)];

/// P 图片 macroblock_type (表 B.3)
pub(super) const MB_TYPE_P_VLC: &[(u8, u32, u8)] = &[
    (1, 0b1, 0x0a),
    (2, 0b01, 0x02),
    (3, 0b001, 0x08),
    (5, 0b00011, 0x01),
    (5, 0b00010, 0x1a),
    (5, 0b00001, 0x12),
    (6, 0b000001, 0x11),
];

/// B 图片 macroblock_type (表 B.4)
pub(super) const MB_TYPE_B_VLC: &[(u8, u32, u8)] = &[
    (2, 0b10, 0x0c),
    (2, 0b11, 0x0e),
    (3, 0b010, 0x04),
    (3, 0b011, 0x06),
    (4, 0b0010, 0x08),
    (4, 0b0011, 0x0a),
    (5, 0b00011, 0x01),
    (5, 0b00010, 0x1e),
    (6, 0b000011, 0x1a),
    (6, 0b000010, 0x16),
    (6, 0b000001, 0x11),
];

/// motion_code 幅度 (表 B.10), 非零值后跟 1 位符号
pub(super) const MOTION_CODE_VLC: &[(u8, u32, u8)] = &[
    (1, 0b1, 0),
    (2, 0b01, 1),
    (3, 0b001, 2),
    (4, 0b0001, 3),
    (6, 0b000011, 4),
    (7, 0b0000101, 5),
    (7, 0b0000100, 6),
    (7, 0b0000011, 7),
    (9, 0b000001011, 8),
    (9, 0b000001010, 9),
    (9, 0b000001001, 10),
    (10, 0b0000010001, 11),
    (10, 0b0000010000, 12),
    (10, 0b0000001111, 13),
    (10, 0b0000001110, 14),
    (10, 0b0000001101, 15),
    (10, 0b0000001100, 16),
];

/// dmvector (表 B.11)
pub(super) const DMVECTOR_VLC: &[(u8, u32, i8)] = &[(1, 0b0, 0), (2, 0b10, 1), (2, 0b11, -1)];

// ============================================================================
// 块层 VLC
// ============================================================================

/// 亮度 dct_dc_size (表 B.12)
pub(super) const DC_SIZE_LUMA_VLC: &[(u8, u32, u8)] = &[
    (3, 0b100, 0),
    (2, 0b00, 1),
    (2, 0b01, 2),
    (3, 0b101, 3),
    (3, 0b110, 4),
    (4, 0b1110, 5),
    (5, 0b11110, 6),
    (6, 0b111110, 7),
    (7, 0b1111110, 8),
    (8, 0b11111110, 9),
    (9, 0b111111110, 10),
    (9, 0b111111111, 11),
];

/// 色度 dct_dc_size (表 B.13)
pub(super) const DC_SIZE_CHROMA_VLC: &[(u8, u32, u8)] = &[
    (2, 0b00, 0),
    (2, 0b01, 1),
    (2, 0b10, 2),
    (3, 0b110, 3),
    (4, 0b1110, 4),
    (5, 0b11110, 5),
    (6, 0b111110, 6),
    (7, 0b1111110, 7),
    (8, 0b11111110, 8),
    (9, 0b111111110, 9),
    (10, 0b1111111110, 10),
    (10, 0b1111111111, 11),
];

/// DCT 系数符号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Coeff {
    /// 块结束
    EndOfBlock,
    /// 转义: 6 位 run + 12 位有符号 level
    Escape,
    /// (run, |level|), 后跟 1 位符号
    RunLevel(u8, u8),
}

/// coded_block_pattern (表 B.9)
pub(super) const CBP_VLC: &[(u8, u32, u8)] = &[
    (3, 0b111, 60),
    (4, 0b1010, 32),
    (4, 0b1011, 16),
    (4, 0b1100, 8),
    (4, 0b1101, 4),
    (5, 0b01000, 62),
    (5, 0b01001, 2),
    (5, 0b01010, 61),
    (5, 0b01011, 1),
    (5, 0b01100, 56),
    (5, 0b01101, 52),
    (5, 0b01110, 44),
    (5, 0b01111, 28),
    (5, 0b10000, 40),
    (5, 0b10001, 20),
    (5, 0b10010, 48),
    (5, 0b10011, 12),
    (6, 0b001100, 63),
    (6, 0b001101, 3),
    (6, 0b001110, 36),
    (6, 0b001111, 24),
    (7, 0b0010000, 34),
    (7, 0b0010001, 18),
    (7, 0b0010010, 10),
    (7, 0b0010011, 6),
    (7, 0b0010100, 33),
    (7, 0b0010101, 17),
    (7, 0b0010110, 9),
    (7, 0b0010111, 5),
    (8, 0b00000100, 58),
    (8, 0b00000101, 54),
    (8, 0b00000110, 46),
    (8, 0b00000111, 30),
    (8, 0b00001000, 57),
    (8, 0b00001001, 53),
    (8, 0b00001010, 45),
    (8, 0b00001011, 29),
    (8, 0b00001100, 38),
    (8, 0b00001101, 26),
    (8, 0b00001110, 37),
    (8, 0b00001111, 25),
    (8, 0b00010000, 43),
    (8, 0b00010001, 23),
    (8, 0b00010010, 51),
    (8, 0b00010011, 15),
    (8, 0b00010100, 42),
    (8, 0b00010101, 22),
    (8, 0b00010110, 50),
    (8, 0b00010111, 14),
    (8, 0b00011000, 41),
    (8, 0b00011001, 21),
    (8, 0b00011010, 49),
    (8, 0b00011011, 13),
    (8, 0b00011100, 35),
    (8, 0b00011101, 19),
    (8, 0b00011110, 11),
    (8, 0b00011111, 7),
    (9, 0b000000001, 0),
    (9, 0b000000010, 39),
    (9, 0b000000011, 27),
    (9, 0b000000100, 59),
    (9, 0b000000101, 55),
    (9, 0b000000110, 47),
    (9, 0b000000111, 31),
];

/// DCT 系数表 B.14, 不含符号位, 格式: (位数, 码字, 符号)
pub(super) const DCT_COEFF_VLC: &[(u8, u32, Coeff)] = &[
    (2, 0b10, Coeff::EndOfBlock),
    (6, 0b000001, Coeff::Escape),
    (2, 0b11, Coeff::RunLevel(0, 1)),
    (3, 0b011, Coeff::RunLevel(1, 1)),
    (4, 0b0100, Coeff::RunLevel(0, 2)),
    (4, 0b0101, Coeff::RunLevel(2, 1)),
    (5, 0b00101, Coeff::RunLevel(0, 3)),
    (5, 0b00110, Coeff::RunLevel(4, 1)),
    (5, 0b00111, Coeff::RunLevel(3, 1)),
    (6, 0b000100, Coeff::RunLevel(7, 1)),
    (6, 0b000101, Coeff::RunLevel(6, 1)),
    (6, 0b000110, Coeff::RunLevel(1, 2)),
    (6, 0b000111, Coeff::RunLevel(5, 1)),
    (7, 0b0000100, Coeff::RunLevel(2, 2)),
    (7, 0b0000101, Coeff::RunLevel(9, 1)),
    (7, 0b0000110, Coeff::RunLevel(0, 4)),
    (7, 0b0000111, Coeff::RunLevel(8, 1)),
    (8, 0b00100000, Coeff::RunLevel(13, 1)),
    (8, 0b00100001, Coeff::RunLevel(0, 6)),
    (8, 0b00100010, Coeff::RunLevel(12, 1)),
    (8, 0b00100011, Coeff::RunLevel(11, 1)),
    (8, 0b00100100, Coeff::RunLevel(3, 2)),
    (8, 0b00100101, Coeff::RunLevel(1, 3)),
    (8, 0b00100110, Coeff::RunLevel(0, 5)),
    (8, 0b00100111, Coeff::RunLevel(10, 1)),
    (10, 0b0000001000, Coeff::RunLevel(16, 1)),
    (10, 0b0000001001, Coeff::RunLevel(5, 2)),
    (10, 0b0000001010, Coeff::RunLevel(0, 7)),
    (10, 0b0000001011, Coeff::RunLevel(2, 3)),
    (10, 0b0000001100, Coeff::RunLevel(1, 4)),
    (10, 0b0000001101, Coeff::RunLevel(15, 1)),
    (10, 0b0000001110, Coeff::RunLevel(14, 1)),
    (10, 0b0000001111, Coeff::RunLevel(4, 2)),
    (12, 0b000000010000, Coeff::RunLevel(0, 11)),
    (12, 0b000000010001, Coeff::RunLevel(8, 2)),
    (12, 0b000000010010, Coeff::RunLevel(4, 3)),
    (12, 0b000000010011, Coeff::RunLevel(0, 10)),
    (12, 0b000000010100, Coeff::RunLevel(2, 4)),
    (12, 0b000000010101, Coeff::RunLevel(7, 2)),
    (12, 0b000000010110, Coeff::RunLevel(21, 1)),
    (12, 0b000000010111, Coeff::RunLevel(20, 1)),
    (12, 0b000000011000, Coeff::RunLevel(0, 9)),
    (12, 0b000000011001, Coeff::RunLevel(19, 1)),
    (12, 0b000000011010, Coeff::RunLevel(18, 1)),
    (12, 0b000000011011, Coeff::RunLevel(1, 5)),
    (12, 0b000000011100, Coeff::RunLevel(3, 3)),
    (12, 0b000000011101, Coeff::RunLevel(0, 8)),
    (12, 0b000000011110, Coeff::RunLevel(6, 2)),
    (12, 0b000000011111, Coeff::RunLevel(17, 1)),
    (13, 0b0000000010000, Coeff::RunLevel(10, 2)),
    (13, 0b0000000010001, Coeff::RunLevel(9, 2)),
    (13, 0b0000000010010, Coeff::RunLevel(5, 3)),
    (13, 0b0000000010011, Coeff::RunLevel(3, 4)),
    (13, 0b0000000010100, Coeff::RunLevel(2, 5)),
    (13, 0b0000000010101, Coeff::RunLevel(1, 7)),
    (13, 0b0000000010110, Coeff::RunLevel(1, 6)),
    (13, 0b0000000010111, Coeff::RunLevel(0, 15)),
    (13, 0b0000000011000, Coeff::RunLevel(0, 14)),
    (13, 0b0000000011001, Coeff::RunLevel(0, 13)),
    (13, 0b0000000011010, Coeff::RunLevel(0, 12)),
    (13, 0b0000000011011, Coeff::RunLevel(26, 1)),
    (13, 0b0000000011100, Coeff::RunLevel(25, 1)),
    (13, 0b0000000011101, Coeff::RunLevel(24, 1)),
    (13, 0b0000000011110, Coeff::RunLevel(23, 1)),
    (13, 0b0000000011111, Coeff::RunLevel(22, 1)),
    (14, 0b00000000010000, Coeff::RunLevel(0, 31)),
    (14, 0b00000000010001, Coeff::RunLevel(0, 30)),
    (14, 0b00000000010010, Coeff::RunLevel(0, 29)),
    (14, 0b00000000010011, Coeff::RunLevel(0, 28)),
    (14, 0b00000000010100, Coeff::RunLevel(0, 27)),
    (14, 0b00000000010101, Coeff::RunLevel(0, 26)),
    (14, 0b00000000010110, Coeff::RunLevel(0, 25)),
    (14, 0b00000000010111, Coeff::RunLevel(0, 24)),
    (14, 0b00000000011000, Coeff::RunLevel(0, 23)),
    (14, 0b00000000011001, Coeff::RunLevel(0, 22)),
    (14, 0b00000000011010, Coeff::RunLevel(0, 21)),
    (14, 0b00000000011011, Coeff::RunLevel(0, 20)),
    (14, 0b00000000011100, Coeff::RunLevel(0, 19)),
    (14, 0b00000000011101, Coeff::RunLevel(0, 18)),
    (14, 0b00000000011110, Coeff::RunLevel(0, 17)),
    (14, 0b00000000011111, Coeff::RunLevel(0, 16)),
    (15, 0b000000000010000, Coeff::RunLevel(0, 40)),
    (15, 0b000000000010001, Coeff::RunLevel(0, 39)),
    (15, 0b000000000010010, Coeff::RunLevel(0, 38)),
    (15, 0b000000000010011, Coeff::RunLevel(0, 37)),
    (15, 0b000000000010100, Coeff::RunLevel(0, 36)),
    (15, 0b000000000010101, Coeff::RunLevel(0, 35)),
    (15, 0b000000000010110, Coeff::RunLevel(0, 34)),
    (15, 0b000000000010111, Coeff::RunLevel(0, 33)),
    (15, 0b000000000011000, Coeff::RunLevel(0, 32)),
    (15, 0b000000000011001, Coeff::RunLevel(1, 14)),
    (15, 0b000000000011010, Coeff::RunLevel(1, 13)),
    (15, 0b000000000011011, Coeff::RunLevel(1, 12)),
    (15, 0b000000000011100, Coeff::RunLevel(1, 11)),
    (15, 0b000000000011101, Coeff::RunLevel(1, 10)),
    (15, 0b000000000011110, Coeff::RunLevel(1, 9)),
    (15, 0b000000000011111, Coeff::RunLevel(1, 8)),
    (16, 0b0000000000010000, Coeff::RunLevel(1, 18)),
    (16, 0b0000000000010001, Coeff::RunLevel(1, 17)),
    (16, 0b0000000000010010, Coeff::RunLevel(1, 16)),
    (16, 0b0000000000010011, Coeff::RunLevel(1, 15)),
    (16, 0b0000000000010100, Coeff::RunLevel(6, 3)),
    (16, 0b0000000000010101, Coeff::RunLevel(16, 2)),
    (16, 0b0000000000010110, Coeff::RunLevel(15, 2)),
    (16, 0b0000000000010111, Coeff::RunLevel(14, 2)),
    (16, 0b0000000000011000, Coeff::RunLevel(13, 2)),
    (16, 0b0000000000011001, Coeff::RunLevel(12, 2)),
    (16, 0b0000000000011010, Coeff::RunLevel(11, 2)),
    (16, 0b0000000000011011, Coeff::RunLevel(31, 1)),
    (16, 0b0000000000011100, Coeff::RunLevel(30, 1)),
    (16, 0b0000000000011101, Coeff::RunLevel(29, 1)),
    (16, 0b0000000000011110, Coeff::RunLevel(28, 1)),
    (16, 0b0000000000011111, Coeff::RunLevel(27, 1)),
];

/// DCT 系数表 B.15 (intra_vlc_format = 1) 的 (位数, 码字), 按 run 递增, 同一 run 内 level 递增
const INTRA_DCT_CODES: [(u8, u32); 111] = [
    (2, 0x02), (3, 0x06), (4, 0x07), (5, 0x1c), (5, 0x1d), (6, 0x05), (6, 0x04), (7, 0x7b),
    (7, 0x7c), (8, 0x23), (8, 0x22), (8, 0xfa), (8, 0xfb), (8, 0xfe), (8, 0xff), (14, 0x1f),
    (14, 0x1e), (14, 0x1d), (14, 0x1c), (14, 0x1b), (14, 0x1a), (14, 0x19), (14, 0x18), (14, 0x17),
    (14, 0x16), (14, 0x15), (14, 0x14), (14, 0x13), (14, 0x12), (14, 0x11), (14, 0x10), (15, 0x18),
    (15, 0x17), (15, 0x16), (15, 0x15), (15, 0x14), (15, 0x13), (15, 0x12), (15, 0x11), (15, 0x10),
    (3, 0x02), (5, 0x06), (7, 0x79), (8, 0x27), (8, 0x20), (13, 0x16), (13, 0x15), (15, 0x1f),
    (15, 0x1e), (15, 0x1d), (15, 0x1c), (15, 0x1b), (15, 0x1a), (15, 0x19), (16, 0x13), (16, 0x12),
    (16, 0x11), (16, 0x10), (5, 0x05), (7, 0x07), (8, 0xfc), (10, 0x0c), (13, 0x14), (5, 0x07),
    (8, 0x26), (12, 0x1c), (13, 0x13), (6, 0x06), (8, 0xfd), (12, 0x12), (6, 0x07), (9, 0x04),
    (13, 0x12), (7, 0x06), (12, 0x1e), (16, 0x14), (7, 0x04), (12, 0x15), (7, 0x05), (12, 0x11),
    (7, 0x78), (13, 0x11), (7, 0x7a), (13, 0x10), (8, 0x21), (16, 0x1a), (8, 0x25), (16, 0x19),
    (8, 0x24), (16, 0x18), (9, 0x05), (16, 0x17), (9, 0x07), (16, 0x16), (10, 0x0d), (16, 0x15),
    (12, 0x1f), (12, 0x1a), (12, 0x19), (12, 0x17), (12, 0x16), (13, 0x1f), (13, 0x1e), (13, 0x1d),
    (13, 0x1c), (13, 0x1b), (16, 0x1f), (16, 0x1e), (16, 0x1d), (16, 0x1c), (16, 0x1b),
];

/// 每个 run 可由码表直接表示的最大 level
const RUN_MAX_LEVEL: [u8; 32] = [
    40, 18, 5, 4, 3, 3, 3, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1,
];

/// 构造表 B.15
pub(super) fn intra_dct_coeff_codes() -> Vec<(u8, u32, Coeff)> {
    let symbols = RUN_MAX_LEVEL
        .iter()
        .enumerate()
        .flat_map(|(run, &max)| (1..=max).map(move |level| Coeff::RunLevel(run as u8, level)));
    let mut codes: Vec<(u8, u32, Coeff)> = INTRA_DCT_CODES
        .iter()
        .zip(symbols)
        .map(|(&(len, code), symbol)| (len, code, symbol))
        .collect();
    codes.push((4, 0b0110, Coeff::EndOfBlock));
    codes.push((6, 0b000001, Coeff::Escape));
    codes
}

// ============================================================================
// 查找表缓存
// ============================================================================

/// 所有 MPEG-2 VLC 查找表, 进程内只构建一次, 之后只读共享
pub(super) struct Mpeg2Vlc {
    pub mba: VlcTable<u8>,
    pub mb_type_i: VlcTable<u8>,
    pub mb_type_p: VlcTable<u8>,
    pub mb_type_b: VlcTable<u8>,
    pub cbp: VlcTable<u8>,
    pub motion_code: VlcTable<u8>,
    pub dmvector: VlcTable<i8>,
    pub dc_size_luma: VlcTable<u8>,
    pub dc_size_chroma: VlcTable<u8>,
    pub dct_coeff: VlcTable<Coeff>,
    /// 表 B.15, 仅用于 intra_vlc_format = 1 的帧内块
    pub dct_coeff_intra: VlcTable<Coeff>,
}

/// 获取共享的 VLC 查找表
pub(super) fn vlc() -> &'static Mpeg2Vlc {
    static TABLES: OnceLock<Mpeg2Vlc> = OnceLock::new();
    TABLES.get_or_init(|| Mpeg2Vlc {
        mba: VlcTable::new(MBA_VLC, 8),
        mb_type_i: VlcTable::new(MB_TYPE_I_VLC, 2),
        mb_type_p: VlcTable::new(MB_TYPE_P_VLC, 6),
        mb_type_b: VlcTable::new(MB_TYPE_B_VLC, 6),
        cbp: VlcTable::new(CBP_VLC, 9),
        motion_code: VlcTable::new(MOTION_CODE_VLC, 7),
        dmvector: VlcTable::new(DMVECTOR_VLC, 2),
        dc_size_luma: VlcTable::new(DC_SIZE_LUMA_VLC, 9),
        dc_size_chroma: VlcTable::new(DC_SIZE_CHROMA_VLC, 10),
        dct_coeff: VlcTable::new(DCT_COEFF_VLC, 9),
        dct_coeff_intra: VlcTable::new(&intra_dct_coeff_codes(), 9),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_prefix_free<T: Copy>(codes: &[(u8, u32, T)]) -> bool {
        let strings: Vec<String> = codes
            .iter()
            .map(|&(len, code, _)| format!("{code:0width$b}", width = len as usize))
            .collect();
        strings.iter().enumerate().all(|(i, a)| {
            strings
                .iter()
                .enumerate()
                .all(|(j, b)| i == j || !b.starts_with(a.as_str()))
        })
    }

    #[test]
    fn test_vlc_tables_are_prefix_free() {
        assert!(is_prefix_free(MBA_VLC));
        assert!(is_prefix_free(MB_TYPE_P_VLC));
        assert!(is_prefix_free(MB_TYPE_B_VLC));
        assert!(is_prefix_free(CBP_VLC));
        assert!(is_prefix_free(MOTION_CODE_VLC));
        assert!(is_prefix_free(DC_SIZE_LUMA_VLC));
        assert!(is_prefix_free(DC_SIZE_CHROMA_VLC));
        assert!(is_prefix_free(DCT_COEFF_VLC));
        assert!(is_prefix_free(&intra_dct_coeff_codes()));
    }

    #[test]
    fn test_intra_coeff_table_layout() {
        let codes = intra_dct_coeff_codes();
        assert_eq!(codes.len(), 113);
        assert_eq!(codes[0], (2, 0b10, Coeff::RunLevel(0, 1)));
        assert_eq!(codes[40], (3, 0b010, Coeff::RunLevel(1, 1)));
        assert_eq!(codes[110], (16, 0x1b, Coeff::RunLevel(31, 1)));
    }

    #[test]
    fn test_cbp_table_covers_all_patterns() {
        let mut seen = [false; 64];
        for &(_, _, cbp) in CBP_VLC {
            seen[cbp as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_scans_are_permutations() {
        for scan in [ZIGZAG_SCAN, ALTERNATE_SCAN] {
            let mut seen = [false; 64];
            for &pos in &scan {
                seen[pos] = true;
            }
            assert!(seen.iter().all(|&s| s));
        }
    }

    #[test]
    fn test_quantiser_scale_types() {
        assert_eq!(quantiser_scale(1, false), 2);
        assert_eq!(quantiser_scale(31, false), 62);
        assert_eq!(quantiser_scale(9, true), 10);
        assert_eq!(quantiser_scale(31, true), 112);
    }

    #[test]
    fn test_frame_rate_codes() {
        assert_eq!(frame_rate(3, 0, 0), 25.0);
        assert!((frame_rate(4, 0, 0) - 29.97).abs() < 0.01);
        assert_eq!(frame_rate(5, 1, 0), 60.0);
        assert_eq!(frame_rate(0, 0, 0), 30.0);
    }
}
