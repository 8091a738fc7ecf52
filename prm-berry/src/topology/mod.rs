//! 各 PRM 类别的全局与局部拓扑.

pub mod global;
pub mod local;

pub use global::{class_functionals, global_functionals};
pub use local::{LocalMapper, LocalTopology};

use crate::classify::ClassCounts;
use crate::consts::PrmClass;
use crate::minkowski::Functionals;

/// 单个类别的统计量.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ClassStats {
    /// 所属类别.
    pub class: PrmClass,

    /// 肺实质内属于该类别的体素数.
    pub voxels: usize,

    /// 体素数 / 肺实质体素数.
    pub voxel_fraction: f64,

    /// 全局泛函.
    pub global: Functionals,

    /// 局部密度图的平均值. 只计算全局泛函时为 `None`.
    pub mean_local: Option<Functionals>,
}

/// 一个受试者的统计汇总.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Summary {
    /// 参与分类的肺实质体素数.
    pub parenchyma_voxels: usize,

    /// 按 [`PrmClass::ALL`] 排列的各类别统计量.
    pub classes: [ClassStats; 4],
}

impl Summary {
    /// 汇总体素计数, 全局泛函与可选的局部密度图平均值.
    ///
    /// `global` 与 `mean_local` 均按 [`PrmClass::ALL`] 排列.
    pub fn new(
        counts: &ClassCounts,
        global: &[Functionals; 4],
        mean_local: Option<&[Functionals; 4]>,
    ) -> Self {
        let classes = PrmClass::ALL.map(|class| {
            let i = class.index();
            ClassStats {
                class,
                voxels: counts.get(class),
                voxel_fraction: counts.fraction(class),
                global: global[i],
                mean_local: mean_local.map(|m| m[i]),
            }
        });
        Self {
            parenchyma_voxels: counts.total(),
            classes,
        }
    }

    /// `class` 的统计量.
    #[inline]
    pub fn get(&self, class: PrmClass) -> &ClassStats {
        &self.classes[class.index()]
    }
}
