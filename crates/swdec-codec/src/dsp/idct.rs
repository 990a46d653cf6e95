//! 8x8 反 DCT 与缩放重建.
//!
//! 全尺寸输出使用定点 simple IDCT (W 常量按 2^14 缩放, 兼容 IEEE 1180),
//! 行变换按稀疏度只处理含非零系数的行.
//! 1/2, 1/4 缩放直接对左上角 NxN 系数做 N 点 IDCT; 1/8 缩放只取 DC.
//!
//! 输入为已反量化的系数 (自然顺序), 输出写回同一数组的左上角 NxN 区域,
//! 不含电平偏移.

use std::sync::OnceLock;

const W1: i64 = 22725;
const W2: i64 = 21407;
const W3: i64 = 19266;
const W4: i64 = 16383;
const W5: i64 = 12873;
const W6: i64 = 8867;
const W7: i64 = 4520;

const ROW_SHIFT: u32 = 11;
const COL_SHIFT: u32 = 20;

/// 系数稀疏度, 由 zig-zag 顺序下最后一个非零系数的位置决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Sparsity {
    /// 只有 DC
    Dc,
    /// 非零系数都在左上 2x2 内
    Low2,
    /// 非零系数都在左上 4x4 内
    Low4,
    /// 任意
    Full,
}

impl Sparsity {
    /// 由 zig-zag 扫描中最后一个非零系数的下标分类
    ///
    /// zig-zag 前 3 个位置落在 2x2 内, 前 10 个位置落在 4x4 内.
    pub fn from_last_index(last: usize) -> Self {
        match last {
            0 => Self::Dc,
            1..=2 => Self::Low2,
            3..=9 => Self::Low4,
            _ => Self::Full,
        }
    }

    /// 行变换需要处理的行数
    fn rows(self) -> usize {
        match self {
            Self::Dc => 1,
            Self::Low2 => 2,
            Self::Low4 => 4,
            Self::Full => 8,
        }
    }
}

/// 一维 8 点行变换
fn idct_row(block: &mut [i32; 64], row: usize) {
    let r = &mut block[row * 8..row * 8 + 8];
    let x: [i64; 8] = std::array::from_fn(|i| i64::from(r[i]));

    if x[1..].iter().all(|&v| v == 0) {
        let dc = (x[0] << 3) as i32;
        r.fill(dc);
        return;
    }

    let round = 1i64 << (ROW_SHIFT - 1);
    let a = even_part(&x, W4 * x[0] + round);
    let b = odd_part(&x);
    for i in 0..4 {
        r[i] = ((a[i] + b[i]) >> ROW_SHIFT) as i32;
        r[7 - i] = ((a[i] - b[i]) >> ROW_SHIFT) as i32;
    }
}

/// 一维 8 点列变换
fn idct_col(block: &mut [i32; 64], col: usize) {
    let x: [i64; 8] = std::array::from_fn(|i| i64::from(block[col + i * 8]));
    let round = 1i64 << (COL_SHIFT - 1);
    let a = even_part(&x, W4 * x[0] + round);
    let b = odd_part(&x);
    for i in 0..4 {
        block[col + i * 8] = ((a[i] + b[i]) >> COL_SHIFT) as i32;
        block[col + (7 - i) * 8] = ((a[i] - b[i]) >> COL_SHIFT) as i32;
    }
}

fn even_part(x: &[i64; 8], base: i64) -> [i64; 4] {
    [
        base + W2 * x[2] + W4 * x[4] + W6 * x[6],
        base + W6 * x[2] - W4 * x[4] - W2 * x[6],
        base - W6 * x[2] - W4 * x[4] + W2 * x[6],
        base - W2 * x[2] + W4 * x[4] - W6 * x[6],
    ]
}

fn odd_part(x: &[i64; 8]) -> [i64; 4] {
    [
        W1 * x[1] + W3 * x[3] + W5 * x[5] + W7 * x[7],
        W3 * x[1] - W7 * x[3] - W1 * x[5] - W5 * x[7],
        W5 * x[1] - W1 * x[3] + W7 * x[5] + W3 * x[7],
        W7 * x[1] - W5 * x[3] + W3 * x[5] - W1 * x[7],
    ]
}

/// 完整 8x8 IDCT
pub fn idct_8x8(block: &mut [i32; 64]) {
    idct_8x8_sparse(block, Sparsity::Full);
}

/// 按稀疏度选择行数的 8x8 IDCT
///
/// 稀疏度以外的行必须全为零.
pub fn idct_8x8_sparse(block: &mut [i32; 64], sparsity: Sparsity) {
    if sparsity == Sparsity::Dc {
        let dc = ((i64::from(block[0]) * 8 * W4 + (1i64 << (COL_SHIFT - 1))) >> COL_SHIFT) as i32;
        block.fill(dc);
        return;
    }
    for row in 0..sparsity.rows() {
        idct_row(block, row);
    }
    for col in 0..8 {
        idct_col(block, col);
    }
}

/// N 点缩减 IDCT 的基函数, 已包含 sqrt(N/8) 的幅度校正
fn reduced_basis(n: usize) -> &'static [[f32; 4]; 4] {
    static BASIS2: OnceLock<[[f32; 4]; 4]> = OnceLock::new();
    static BASIS4: OnceLock<[[f32; 4]; 4]> = OnceLock::new();
    let cell = if n == 2 { &BASIS2 } else { &BASIS4 };
    cell.get_or_init(|| {
        let mut basis = [[0f32; 4]; 4];
        let nf = n as f64;
        let gain = (nf / 8.0).sqrt();
        for (k, row) in basis.iter_mut().enumerate().take(n) {
            let ck = if k == 0 {
                (1.0 / nf).sqrt()
            } else {
                (2.0 / nf).sqrt()
            };
            for (x, v) in row.iter_mut().enumerate().take(n) {
                let angle = (2 * x + 1) as f64 * k as f64 * std::f64::consts::PI / (2.0 * nf);
                *v = (ck * gain * angle.cos()) as f32;
            }
        }
        basis
    })
}

fn idct_reduced(block: &mut [i32; 64], n: usize) {
    let basis = reduced_basis(n);
    // 先对行 (v) 做变换, 再对列 (u)
    let mut tmp = [[0f32; 4]; 4];
    for v in 0..n {
        for x in 0..n {
            let mut acc = 0f32;
            for u in 0..n {
                acc += block[v * 8 + u] as f32 * basis[u][x];
            }
            tmp[v][x] = acc;
        }
    }
    let mut out = [[0i32; 4]; 4];
    for y in 0..n {
        for x in 0..n {
            let mut acc = 0f32;
            for v in 0..n {
                acc += tmp[v][x] * basis[v][y];
            }
            out[y][x] = acc.round() as i32;
        }
    }
    for y in 0..n {
        block[y * 8..y * 8 + n].copy_from_slice(&out[y][..n]);
    }
}

/// 按输出边长 (8, 4, 2, 1) 重建
///
/// 结果写入 `block[y * 8 + x]`, `x, y < size`.
pub fn idct_scaled(block: &mut [i32; 64], size: usize, sparsity: Sparsity) {
    match size {
        8 => idct_8x8_sparse(block, sparsity),
        4 | 2 => idct_reduced(block, size),
        _ => {
            // DC / 8 并四舍五入
            let dc = block[0];
            block[0] = (dc + if dc >= 0 { 4 } else { -4 }) / 8;
        }
    }
}
