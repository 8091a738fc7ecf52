//! 三维二值图像的 Minkowski 泛函.
//!
//! 前景体素被视为闭立方体, 它们的并构成一个立方体复形. 复形的
//! 顶点数 `n0`, 棱数 `n1`, 面数 `n2` 与立方体数 `n3` (按方向区分) 通过
//! 2×2×2 cell 查表精确得到, 四个泛函由这些计数直接给出:
//!
//! - 体积 `V = n3 · v`;
//! - 表面积 `S = Σ_a A_a (2 n2[a] - 2 n3)`;
//! - 积分平均曲率 `M = π Σ_a s_a (n1[a] - Σ_{b≠a} n2[b] + n3)`,
//!   其中平均曲率取 `(κ1 + κ2) / 2`, 边长为 `a` 的立方体 `M = 3πa`;
//! - Euler 示性数 `χ = n0 - n1 + n2 - n3` (前景 26-连通).
//!
//! `s_a` 是 `a` 方向的体素间距, `A_a` 是法向为 `a` 的体素面面积, `v` 是体素体积.
//!
//! # 边界约定
//!
//! 网格之外一律视为背景 (闭边界), 即网格四周填充一层背景体素后再枚举全部 cell.
//! 全局计算与局部窗口计算使用同一约定, 因此窗口覆盖整个网格时两者结果逐位相同.

mod table;

use ndarray::ArrayView3;
use std::f64::consts::PI;
use std::ops::Index;

use crate::Spacing;
use table::CELL_TABLE;

/// 四个 Minkowski 泛函 (密度形式).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Functional {
    /// 体积分数, 无量纲.
    VolumeFraction,

    /// 表面积密度, mm⁻¹.
    SurfaceDensity,

    /// 积分平均曲率密度, mm⁻².
    CurvatureDensity,

    /// Euler 示性数密度, mm⁻³.
    EulerDensity,
}

impl Functional {
    /// 按固定顺序排列的全部泛函.
    pub const ALL: [Functional; 4] = [
        Functional::VolumeFraction,
        Functional::SurfaceDensity,
        Functional::CurvatureDensity,
        Functional::EulerDensity,
    ];

    /// 在 `[0, 4)` 内的下标.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// 输出文件名中使用的短名.
    pub const fn short_name(self) -> &'static str {
        match self {
            Functional::VolumeFraction => "vol",
            Functional::SurfaceDensity => "surf",
            Functional::CurvatureDensity => "curv",
            Functional::EulerDensity => "euler",
        }
    }
}

/// 一组 Minkowski 泛函密度, 顺序与 [`Functional::ALL`] 一致.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Functionals {
    /// 前景体素数 / 网格体素数.
    pub volume_fraction: f64,

    /// 表面积 / 网格实际体积.
    pub surface_density: f64,

    /// 积分平均曲率 / 网格实际体积.
    pub curvature_density: f64,

    /// Euler 示性数 / 网格实际体积.
    pub euler_density: f64,
}

impl Functionals {
    /// 全零.
    pub const ZERO: Functionals = Functionals {
        volume_fraction: 0.0,
        surface_density: 0.0,
        curvature_density: 0.0,
        euler_density: 0.0,
    };

    /// 按 [`Functional::ALL`] 顺序构造.
    #[inline]
    pub const fn from_array([v, s, c, e]: [f64; 4]) -> Self {
        Self {
            volume_fraction: v,
            surface_density: s,
            curvature_density: c,
            euler_density: e,
        }
    }

    /// 按 [`Functional::ALL`] 顺序展开.
    #[inline]
    pub const fn to_array(self) -> [f64; 4] {
        [
            self.volume_fraction,
            self.surface_density,
            self.curvature_density,
            self.euler_density,
        ]
    }
}

impl Index<Functional> for Functionals {
    type Output = f64;

    #[inline]
    fn index(&self, f: Functional) -> &Self::Output {
        match f {
            Functional::VolumeFraction => &self.volume_fraction,
            Functional::SurfaceDensity => &self.surface_density,
            Functional::CurvatureDensity => &self.curvature_density,
            Functional::EulerDensity => &self.euler_density,
        }
    }
}

/// 未归一化的 Minkowski 泛函.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Measures {
    /// 体积, 立方毫米.
    pub volume: f64,

    /// 表面积, 平方毫米.
    pub surface: f64,

    /// 积分平均曲率, 毫米.
    pub curvature: f64,

    /// Euler 示性数.
    pub euler: i64,
}

/// 闭体素复形中各类单元的个数.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
struct ComplexCounts {
    n0: i64,
    n1: [i64; 3],
    n2: [i64; 3],
    n3: i64,
}

impl ComplexCounts {
    /// 枚举零填充后的全部 `(nz + 1) (nh + 1) (nw + 1)` 个 cell.
    fn of(img: &ArrayView3<bool>) -> Self {
        let (nz, nh, nw) = img.dim();

        // 先统计占据模式直方图, 再统一查表. 整数累加与遍历顺序无关.
        let mut hist = [0u64; 256];
        for (z, h, w) in itertools::iproduct!(0..=nz, 0..=nh, 0..=nw) {
            hist[cell_code(img, z, h, w) as usize] += 1;
        }

        let mut acc = ComplexCounts::default();
        for (code, &n) in hist.iter().enumerate().skip(1).filter(|(_, n)| **n != 0) {
            let w = &CELL_TABLE[code];
            let n = n as i64;
            acc.n0 += n * w.n0;
            acc.n3 += n * w.n3;
            for a in 0..3 {
                acc.n1[a] += n * w.n1[a];
                acc.n2[a] += n * w.n2[a];
            }
        }

        // 表中权重乘了 8.
        debug_assert!(acc.n0 % 8 == 0 && acc.n3 % 8 == 0);
        acc.n0 /= 8;
        acc.n3 /= 8;
        for a in 0..3 {
            debug_assert!(acc.n1[a] % 8 == 0 && acc.n2[a] % 8 == 0);
            acc.n1[a] /= 8;
            acc.n2[a] /= 8;
        }
        acc
    }

    fn measures(&self, spacing: Spacing) -> Measures {
        let s = spacing.as_array();
        let area = [s[1] * s[2], s[0] * s[2], s[0] * s[1]];
        let n2_sum: i64 = self.n2.iter().sum();

        let surface = (0..3)
            .map(|a| area[a] * (2 * self.n2[a] - 2 * self.n3) as f64)
            .sum::<f64>();
        let breadth = (0..3)
            .map(|a| s[a] * (self.n1[a] - (n2_sum - self.n2[a]) + self.n3) as f64)
            .sum::<f64>();

        Measures {
            volume: self.n3 as f64 * spacing.voxel(),
            surface,
            curvature: PI * breadth,
            euler: self.n0 - self.n1.iter().sum::<i64>() + n2_sum - self.n3,
        }
    }
}

/// 以零填充坐标 `(z, h, w)` 为中心格点的 cell 占据模式.
#[inline]
fn cell_code(img: &ArrayView3<bool>, z: usize, h: usize, w: usize) -> u8 {
    let mut code = 0u8;
    for bit in 0..8u8 {
        let (dz, dh, dw) = ((bit >> 2) & 1, (bit >> 1) & 1, bit & 1);
        // 越界 (包括 wrapping 得到的 usize::MAX) 即背景.
        let pos = (
            (z + dz as usize).wrapping_sub(1),
            (h + dh as usize).wrapping_sub(1),
            (w + dw as usize).wrapping_sub(1),
        );
        if img.get(pos).copied().unwrap_or(false) {
            code |= 1 << bit;
        }
    }
    code
}

/// 网格是否太小, 无法构成一个完整的 cell?
#[inline]
fn is_degenerate(img: &ArrayView3<bool>) -> bool {
    let (z, h, w) = img.dim();
    z < 2 || h < 2 || w < 2
}

/// 计算未归一化的 Minkowski 泛函.
///
/// 任一方向不足 2 个体素时返回全零.
pub fn measures(img: ArrayView3<bool>, spacing: Spacing) -> Measures {
    if is_degenerate(&img) {
        return Measures::default();
    }
    ComplexCounts::of(&img).measures(spacing)
}

/// 计算 Minkowski 泛函密度.
///
/// 体积分数除以网格体素数; 其余三项除以网格的实际体积 (体素数 × 体素体积).
/// 任一方向不足 2 个体素时返回全零. 函数无内部状态, 相同输入总是得到逐位相同的结果.
pub fn functionals(img: ArrayView3<bool>, spacing: Spacing) -> Functionals {
    if is_degenerate(&img) {
        return Functionals::ZERO;
    }
    let counts = ComplexCounts::of(&img);
    let m = counts.measures(spacing);
    let voxels = img.len() as f64;
    let physical = voxels * spacing.voxel();
    Functionals {
        volume_fraction: counts.n3 as f64 / voxels,
        surface_density: m.surface / physical,
        curvature_density: m.curvature / physical,
        euler_density: m.euler as f64 / physical,
    }
}
