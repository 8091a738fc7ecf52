//! 局部 Minkowski 泛函密度图.
//!
//! 以每个肺实质体素为中心取边长为 `W` 的立方窗口 (在网格边界处截断),
//! 对窗口内的类别掩膜计算泛函, 结果写在中心位置. 肺实质之外的位置保持 `NaN`.

use ndarray::{s, Array3, ArrayView3, ArrayViewMut2, Axis, Zip};

use crate::consts::{PrmClass, DEFAULT_WINDOW};
use crate::mask::binary_mask;
use crate::minkowski::{functionals, Functional, Functionals};
use crate::{
    BinaryMask, DensityMap, GridAttr, LabelGrid, ParenchymaMask, PrmError, PrmResult, Spacing,
};

/// 单个类别的四张密度图.
#[derive(Debug, Clone)]
pub struct LocalTopology {
    /// 所属类别.
    pub class: PrmClass,

    /// 按 [`Functional::ALL`] 排列的密度图.
    pub maps: [DensityMap; 4],
}

impl LocalTopology {
    /// 泛函 `f` 的密度图.
    #[inline]
    pub fn map(&self, f: Functional) -> &DensityMap {
        &self.maps[f.index()]
    }

    /// 各密度图在有定义位置上的平均值. 没有任何有定义的位置时为 0.
    pub fn mean(&self) -> Functionals {
        Functionals::from_array(Functional::ALL.map(|f| {
            let (sum, n) = self
                .map(f)
                .data()
                .iter()
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            if n == 0 {
                0.0
            } else {
                sum / n as f64
            }
        }))
    }
}

/// 滑动窗口密度图生成器.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LocalMapper {
    window: usize,
}

impl Default for LocalMapper {
    #[inline]
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
        }
    }
}

impl LocalMapper {
    /// 以窗口边长 `window` 构造. `window` 必须为正奇数.
    pub fn new(window: usize) -> PrmResult<Self> {
        if window == 0 || window % 2 == 0 {
            return Err(PrmError::Configuration(format!(
                "局部窗口边长 `analysis.window` 必须为正奇数, 但发现了 `{window}`"
            )));
        }
        Ok(Self { window })
    }

    /// 窗口边长.
    #[inline]
    pub fn window(&self) -> usize {
        self.window
    }

    /// 窗口半径, 即 `window / 2`.
    #[inline]
    pub fn radius(&self) -> usize {
        self.window / 2
    }

    /// 对一个二值掩膜生成四张密度图, 按 [`Functional::ALL`] 排列.
    /// 只在 `parenchyma` 为真的位置计算.
    ///
    /// 结果直接写入预先分配的四张图, 每张水平切片由一个任务独占.
    /// 两者形状必须一致, 否则 panic.
    pub fn map_mask(&self, mask: &BinaryMask, parenchyma: &ParenchymaMask) -> [DensityMap; 4] {
        assert_eq!(mask.shape(), parenchyma.shape(), "掩膜与肺实质形状不一致");
        let img = mask.data();
        let inside = parenchyma.data();
        let spacing = mask.spacing();
        let r = self.radius();

        let shape = mask.shape();
        let [mut vol, mut surf, mut curv, mut euler] =
            [(); 4].map(|_| Array3::from_elem(shape, f64::NAN));
        let op = |z: usize, rows: [ArrayViewMut2<f64>; 4]| {
            fill_slab(img, inside, spacing, r, z, rows);
        };
        let slabs = Zip::indexed(vol.axis_iter_mut(Axis(0)))
            .and(surf.axis_iter_mut(Axis(0)))
            .and(curv.axis_iter_mut(Axis(0)))
            .and(euler.axis_iter_mut(Axis(0)));

        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                slabs.par_for_each(|z, v, s, m, e| op(z, [v, s, m, e]));
            } else {
                slabs.for_each(|z, v, s, m, e| op(z, [v, s, m, e]));
            }
        }

        [vol, surf, curv, euler].map(|data| mask.with_data(data))
    }

    /// 单个类别的密度图.
    pub fn map_class(
        &self,
        labels: &LabelGrid,
        parenchyma: &ParenchymaMask,
        class: PrmClass,
    ) -> LocalTopology {
        let mask = binary_mask(labels, parenchyma, class);
        let maps = self.map_mask(&mask, parenchyma);
        log::debug!("类别 {class} 的局部密度图已生成 (窗口 {})", self.window);
        LocalTopology { class, maps }
    }

    /// 按 [`PrmClass::ALL`] 的顺序逐个类别生成密度图, 并立即交给 `sink`.
    ///
    /// 同一时刻只保留一个类别的密度图. 返回各类别密度图的平均值;
    /// `sink` 出错时立即停止.
    pub fn map_classes<F>(
        &self,
        labels: &LabelGrid,
        parenchyma: &ParenchymaMask,
        mut sink: F,
    ) -> PrmResult<[Functionals; 4]>
    where
        F: FnMut(LocalTopology) -> PrmResult<()>,
    {
        let mut means = [Functionals::ZERO; 4];
        for class in PrmClass::ALL {
            let t = self.map_class(labels, parenchyma, class);
            means[class.index()] = t.mean();
            sink(t)?;
        }
        Ok(means)
    }
}

/// 计算第 `z` 层水平切片上所有肺实质体素的局部泛函.
fn fill_slab(
    img: ArrayView3<bool>,
    inside: ArrayView3<bool>,
    spacing: Spacing,
    r: usize,
    z: usize,
    mut rows: [ArrayViewMut2<f64>; 4],
) {
    let (nz, nh, nw) = img.dim();
    let (z0, z1) = (z.saturating_sub(r), (z + r + 1).min(nz));
    for (h, w) in itertools::iproduct!(0..nh, 0..nw) {
        if !inside[(z, h, w)] {
            continue;
        }
        let (h0, h1) = (h.saturating_sub(r), (h + r + 1).min(nh));
        let (w0, w1) = (w.saturating_sub(r), (w + r + 1).min(nw));
        let window = img.slice(s![z0..z1, h0..h1, w0..w1]);
        let values = functionals(window, spacing).to_array();
        for (row, v) in rows.iter_mut().zip(values) {
            row[(h, w)] = v;
        }
    }
}
