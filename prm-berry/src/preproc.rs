//! 分类前的图像预处理.
//!
//! 依次执行:
//!
//! 1. 将肺实质之外的体素压暗为 `dim_outside`;
//! 2. 对每张水平切片做边长为 `median_kernel` 的二维中值滤波, 切片边界外按 0 填充;
//! 3. 滤波后吸气或呼气 HU 落在 `[exclude_lower, exclude_upper]` 之外的体素
//!    (血管与气道) 从肺实质掩膜中剔除.

use ndarray::{Array3, ArrayView2, ArrayViewMut2, ArrayView3, Axis, Zip};
use ordered_float::OrderedFloat;
use serde::Deserialize;

use crate::consts::hu::{DIM_OUTSIDE, EXCLUDE_LOWER, EXCLUDE_UPPER, MEDIAN_KERNEL};
use crate::data::check_geometry;
use crate::{CtVolume, ParenchymaMask, PrmError, PrmResult};

/// 预处理参数.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreprocessOptions {
    /// 肺实质之外的体素被设置成的 HU 值.
    pub dim_outside: f32,

    /// 中值滤波窗口边长, 必须为正奇数.
    pub median_kernel: usize,

    /// 剔除下限.
    pub exclude_lower: f32,

    /// 剔除上限.
    pub exclude_upper: f32,
}

impl Default for PreprocessOptions {
    #[inline]
    fn default() -> Self {
        Self {
            dim_outside: DIM_OUTSIDE,
            median_kernel: MEDIAN_KERNEL,
            exclude_lower: EXCLUDE_LOWER,
            exclude_upper: EXCLUDE_UPPER,
        }
    }
}

impl PreprocessOptions {
    /// 检查参数是否合法.
    pub fn validate(&self) -> PrmResult<()> {
        if self.median_kernel == 0 || self.median_kernel % 2 == 0 {
            return Err(PrmError::Configuration(format!(
                "中值滤波窗口 `preprocess.median_kernel` 必须为正奇数, 但发现了 `{}`",
                self.median_kernel
            )));
        }
        if !(self.exclude_lower <= self.exclude_upper) {
            return Err(PrmError::Configuration(format!(
                "剔除区间 `[{}, {}]` 为空",
                self.exclude_lower, self.exclude_upper
            )));
        }
        Ok(())
    }

    #[inline]
    fn keeps(&self, hu: f32) -> bool {
        !(hu < self.exclude_lower || hu > self.exclude_upper)
    }
}

/// 预处理结果.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// 滤波后的吸气扫描.
    pub insp: CtVolume,

    /// 滤波后的呼气扫描.
    pub exp: CtVolume,

    /// 剔除血管与气道之后的肺实质掩膜.
    pub mask: ParenchymaMask,

    /// 被剔除的体素个数.
    pub excluded: usize,
}

/// 对配准后的扫描与掩膜执行完整的预处理流程.
pub fn preprocess(
    insp: &CtVolume,
    exp: &CtVolume,
    mask: &ParenchymaMask,
    opts: &PreprocessOptions,
) -> PrmResult<Preprocessed> {
    opts.validate()?;
    check_geometry("insp", insp, "exp", exp)?;
    check_geometry("exp", exp, "mask", mask)?;

    let dim = |scan: &CtVolume| {
        let mut out = scan.data().to_owned();
        Zip::from(&mut out)
            .and(mask.data())
            .for_each(|p, &inside| {
                if !inside {
                    *p = opts.dim_outside;
                }
            });
        median_filter_2d(out.view(), opts.median_kernel)
    };
    let insp_filt = dim(insp);
    let exp_filt = dim(exp);

    let kept = Zip::from(mask.data())
        .and(&insp_filt)
        .and(&exp_filt)
        .map_collect(|&m, &i, &e| m && opts.keeps(i) && opts.keeps(e));
    let before = mask.count();
    let mask = mask.with_data(kept);
    let excluded = before - mask.count();
    log::debug!("预处理剔除了 {excluded} / {before} 个肺实质体素");

    Ok(Preprocessed {
        insp: insp.with_data(insp_filt),
        exp: exp.with_data(exp_filt),
        mask,
        excluded,
    })
}

/// 对每张水平切片做二维中值滤波. 切片边界之外视为 0.
///
/// `kernel` 必须为正奇数, 否则 panic.
pub fn median_filter_2d(src: ArrayView3<f32>, kernel: usize) -> Array3<f32> {
    assert!(kernel % 2 == 1, "中值滤波窗口必须为正奇数");
    let mut out = Array3::<f32>::zeros(src.dim());
    let op = |z: usize, dst: ArrayViewMut2<f32>| {
        median_slice(src.index_axis(Axis(0), z), dst, kernel);
    };

    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
            out.axis_iter_mut(Axis(0))
                .into_par_iter()
                .enumerate()
                .for_each(|(z, dst)| op(z, dst));
        } else {
            out.axis_iter_mut(Axis(0))
                .enumerate()
                .for_each(|(z, dst)| op(z, dst));
        }
    }
    out
}

fn median_slice(src: ArrayView2<f32>, mut dst: ArrayViewMut2<f32>, kernel: usize) {
    let r = (kernel / 2) as isize;
    let (h, w) = src.dim();
    let mut buf = Vec::with_capacity(kernel * kernel);
    for ((y, x), p) in dst.indexed_iter_mut() {
        buf.clear();
        for (dy, dx) in itertools::iproduct!(-r..=r, -r..=r) {
            let (yy, xx) = (y as isize + dy, x as isize + dx);
            let v = if (0..h as isize).contains(&yy) && (0..w as isize).contains(&xx) {
                src[(yy as usize, xx as usize)]
            } else {
                0.0
            };
            buf.push(OrderedFloat(v));
        }
        let mid = buf.len() / 2;
        let (_, median, _) = buf.select_nth_unstable(mid);
        *p = median.0;
    }
}
