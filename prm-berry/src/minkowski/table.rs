//! 2×2×2 cell 占据模式到闭体素复形计数的查找表.
//!
//! cell 以网格 (零填充后) 的一个格点为中心, 包含该格点周围的 8 个体素.
//! 体素 `(dz, dh, dw)` (各分量取 0 或 1) 对应模式的第 `dz << 2 | dh << 1 | dw` 位.
//!
//! 闭体素复形中的每个单元都被若干个 cell 平分:
//!
//! - 立方体 (体素) 有 8 个顶点, 每个 cell 分到 1/8;
//! - 面有 4 个顶点, 每个 cell 分到 1/4;
//! - 棱有 2 个端点, 每个 cell 分到 1/2;
//! - 顶点只属于以它为中心的 cell.
//!
//! 为了让累加保持精确, 表中所有权重都乘以 8 存储为整数.

use once_cell::sync::Lazy;

/// 单个 cell 对复形各类单元计数的贡献 (×8).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct CellWeights {
    /// 顶点.
    pub n0: i64,

    /// 沿 z/h/w 方向的棱.
    pub n1: [i64; 3],

    /// 法向为 z/h/w 的面.
    pub n2: [i64; 3],

    /// 立方体.
    pub n3: i64,
}

/// 进程内唯一的查找表. 第一次使用时构建, 之后只读.
pub(crate) static CELL_TABLE: Lazy<[CellWeights; 256]> = Lazy::new(|| {
    let mut table = [CellWeights::default(); 256];
    for (code, w) in table.iter_mut().enumerate() {
        *w = CellWeights::of(code as u8);
    }
    table
});

/// 模式中第 `bit` 位体素在 `axis` 方向上的坐标 (0 或 1).
#[inline]
const fn coord(bit: u32, axis: usize) -> u32 {
    (bit >> (2 - axis)) & 1
}

impl CellWeights {
    /// 由占据模式计算贡献.
    fn of(code: u8) -> Self {
        let occupied = |bit: u32| (code >> bit) & 1 == 1;
        let mut w = CellWeights {
            n0: if code != 0 { 8 } else { 0 },
            n3: code.count_ones() as i64,
            ..Default::default()
        };

        for axis in 0..3 {
            // 从中心格点沿 -axis / +axis 出发的两条半棱.
            // 半棱存在当且仅当它那一侧的 4 个体素中有前景.
            for side in 0..2 {
                if (0..8).any(|b| coord(b, axis) == side && occupied(b)) {
                    w.n1[axis] += 4;
                }
            }
            // 法向为 axis 的 4 个四分之一面, 各自夹在一对体素之间.
            let step = 1 << (2 - axis);
            for b in (0..8).filter(|b| coord(*b, axis) == 0) {
                if occupied(b) || occupied(b | step) {
                    w.n2[axis] += 2;
                }
            }
        }
        w
    }
}

#[cfg(test)]
mod tests {
    use super::{CellWeights, CELL_TABLE};

    #[test]
    fn test_empty_and_full_cells() {
        assert_eq!(CELL_TABLE[0], CellWeights::default());

        // 完全被占据的 cell 位于复形内部: 1 个顶点, 6 条半棱, 12 个四分之一面, 8 个八分之一体.
        let full = CELL_TABLE[0xff];
        assert_eq!(full.n0, 8);
        assert_eq!(full.n1, [8; 3]);
        assert_eq!(full.n2, [8; 3]);
        assert_eq!(full.n3, 8);
    }

    #[test]
    fn test_single_voxel_cells_sum_to_cube() {
        // 单个体素出现在 8 个 cell 中, 每次是不同的一位.
        let mut sum = CellWeights::default();
        for bit in 0..8 {
            let w = CELL_TABLE[1 << bit];
            sum.n0 += w.n0;
            sum.n3 += w.n3;
            for a in 0..3 {
                sum.n1[a] += w.n1[a];
                sum.n2[a] += w.n2[a];
            }
        }
        // 8 个顶点, 每个方向 4 条棱, 每个方向 2 个面, 1 个立方体.
        assert_eq!(sum.n0, 8 * 8);
        assert_eq!(sum.n1, [4 * 8; 3]);
        assert_eq!(sum.n2, [2 * 8; 3]);
        assert_eq!(sum.n3, 8);
    }

    #[test]
    fn test_euler_weight_of_corner_pair() {
        // 对角两体素只共享中心格点: 6 条半棱, 6 个四分之一面,
        // cell 内的 Euler 贡献 (×8) 为 8 - 6 * 4 + 6 * 2 - 2 = -6.
        // 两个孤立体素各自的贡献为 1, 合并后少了一个连通分量.
        let w = CELL_TABLE[0b1000_0001];
        let euler = w.n0 - w.n1.iter().sum::<i64>() + w.n2.iter().sum::<i64>() - w.n3;
        assert_eq!(euler, -6);

        let single = CELL_TABLE[0b0000_0001];
        let euler1 =
            single.n0 - single.n1.iter().sum::<i64>() + single.n2.iter().sum::<i64>() - single.n3;
        assert_eq!(euler1, 1);
        assert_eq!(euler - 2 * euler1, -8);
    }
}
