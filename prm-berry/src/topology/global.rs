//! 全局 Minkowski 泛函: 每个 PRM 类别对整个网格计算一次.

use crate::consts::PrmClass;
use crate::mask::binary_mask;
use crate::minkowski::{functionals, Functionals};
use crate::{GridAttr, LabelGrid, ParenchymaMask};

/// 单个类别在整个网格上的泛函. 该类别没有体素时为全零.
pub fn class_functionals(
    labels: &LabelGrid,
    parenchyma: &ParenchymaMask,
    class: PrmClass,
) -> Functionals {
    let mask = binary_mask(labels, parenchyma, class);
    let f = functionals(mask.data(), mask.spacing());
    log::debug!("类别 {class} 的全局泛函: {f:?}");
    f
}

/// 全部四个类别的全局泛函, 按 [`PrmClass::ALL`] 排列.
///
/// 各类别互相独立, 开启 `rayon` 时并行计算.
pub fn global_functionals(labels: &LabelGrid, parenchyma: &ParenchymaMask) -> [Functionals; 4] {
    let mut out = [Functionals::ZERO; 4];

    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            use rayon::iter::{
                IndexedParallelIterator, IntoParallelRefIterator, IntoParallelRefMutIterator,
                ParallelIterator,
            };
            out.par_iter_mut()
                .zip(PrmClass::ALL.par_iter())
                .for_each(|(f, &c)| *f = class_functionals(labels, parenchyma, c));
        } else {
            for (f, c) in out.iter_mut().zip(PrmClass::ALL) {
                *f = class_functionals(labels, parenchyma, c);
            }
        }
    }
    out
}
