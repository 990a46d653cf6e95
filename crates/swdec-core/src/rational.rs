//! 有理数类型, 用于帧率与宽高比.

use std::fmt;

/// 有理数, 由分子和分母组成
///
/// 帧率 30000/1001 表示 29.97fps; 像素宽高比 12/11 表示 PAL 4:3 的非方形像素.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    /// 分子
    pub num: i32,
    /// 分母
    pub den: i32,
}

impl Rational {
    /// 创建新的有理数
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// 零值
    pub const ZERO: Self = Self { num: 0, den: 1 };

    /// 未定义 (分母为 0)
    pub const UNDEFINED: Self = Self { num: 0, den: 0 };

    /// 判断是否有效 (分子分母均为正)
    pub const fn is_valid(&self) -> bool {
        self.den > 0 && self.num > 0
    }

    /// 转换为 f64, 分母为 0 时返回 `f64::NAN`
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            return f64::NAN;
        }
        f64::from(self.num) / f64::from(self.den)
    }

    /// 约分, 并保证分母为正
    pub fn reduce(self) -> Self {
        let g = gcd(self.num.unsigned_abs(), self.den.unsigned_abs());
        if g == 0 || self.den == 0 {
            return self;
        }
        let g = g as i64;
        let sign = if self.den < 0 { -1 } else { 1 };
        Self {
            num: (sign * i64::from(self.num) / g) as i32,
            den: (sign * i64::from(self.den) / g) as i32,
        }
    }

    /// 求倒数
    pub const fn invert(self) -> Self {
        Self {
            num: self.den,
            den: self.num,
        }
    }
}

impl std::ops::Mul for Rational {
    type Output = Self;

    /// 相乘后约分, 中间结果用 i64 防止溢出
    fn mul(self, other: Self) -> Self {
        let num = i64::from(self.num) * i64::from(other.num);
        let den = i64::from(self.den) * i64::from(other.den);
        let g = gcd64(num.unsigned_abs(), den.unsigned_abs()).max(1) as i64;
        Self {
            num: (num / g) as i32,
            den: (den / g) as i32,
        }
        .reduce()
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl From<(i32, i32)> for Rational {
    fn from((num, den): (i32, i32)) -> Self {
        Self { num, den }
    }
}

/// 求最大公约数 (欧几里得算法)
fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

fn gcd64(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}
