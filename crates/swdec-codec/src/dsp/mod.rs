//! MPEG-2 与 JPEG 共用的信号处理基础: VLC 查表与反 DCT.

pub mod idct;
pub mod vlc;

pub use idct::{Sparsity, idct_8x8, idct_scaled};
pub use vlc::VlcTable;

/// zig-zag 扫描 (扫描位置 -> 自然顺序下标), MPEG-2 与 JPEG 相同
pub const ZIGZAG_SCAN: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27, 20,
    13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58, 59,
    52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

/// 8 位样本截断
#[inline]
pub fn clip_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}
