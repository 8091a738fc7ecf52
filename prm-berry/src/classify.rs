//! PRM 体素分类.
//!
//! 吸气阈值 `insp` 与呼气阈值 `exp` 把肺实质体素分为四类:
//!
//! | 吸气 | 呼气 | 类别 |
//! |---|---|---|
//! | `> insp` | `> exp` | 正常 |
//! | `> insp` | `<= exp` | fSAD |
//! | `<= insp` | `<= exp_emptying` | 肺气肿 |
//! | `<= insp` | `> exp_emptying` | 排空型肺气肿 |
//!
//! 恰好等于阈值的体素总是归入密度更低的一侧. 四种情况互斥且完备,
//! 因此肺实质内每个体素都会得到 1 到 4 之间的标签, 肺实质之外恒为 0.

use ndarray::{Array3, Zip};
use serde::Deserialize;

use crate::consts::hu::{GALBAN_EXP, GALBAN_INSP};
use crate::consts::label::*;
use crate::consts::PrmClass;
use crate::data::check_geometry;
use crate::{CtVolume, GridAttr, LabelGrid, ParenchymaMask, PrmError, PrmResult};

/// PRM 分类阈值, 以 HU 为单位.
///
/// 这是分类规则中唯一需要调整的部分, 因此总是作为配置传入.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrmThresholds {
    /// 吸气相阈值.
    pub insp: f32,

    /// 呼气相阈值, 用于区分正常与 fSAD.
    pub exp: f32,

    /// 呼气相第二阈值, 用于区分肺气肿与排空型肺气肿.
    pub exp_emptying: f32,
}

impl Default for PrmThresholds {
    /// Galbán 等人的阈值: 吸气 -950 HU, 呼气 -856 HU, 第二呼气阈值同呼气阈值.
    #[inline]
    fn default() -> Self {
        Self {
            insp: GALBAN_INSP,
            exp: GALBAN_EXP,
            exp_emptying: GALBAN_EXP,
        }
    }
}

impl PrmThresholds {
    /// 检查阈值是否为有限值.
    pub fn validate(&self) -> PrmResult<()> {
        for (name, v) in [
            ("insp", self.insp),
            ("exp", self.exp),
            ("exp_emptying", self.exp_emptying),
        ] {
            if !v.is_finite() {
                return Err(PrmError::Configuration(format!(
                    "阈值 `thresholds.{name}` 必须是有限值, 但发现了 `{v}`"
                )));
            }
        }
        Ok(())
    }

    /// 对单个肺实质体素分类.
    ///
    /// `NaN` 参与比较时结果为假, 因此会落入 "`<=`" 的一侧.
    #[inline]
    pub fn classify(&self, insp: f32, exp: f32) -> u8 {
        if insp > self.insp {
            if exp > self.exp {
                PRM_NORMAL
            } else {
                PRM_FSAD
            }
        } else if exp > self.exp_emptying {
            PRM_EMPT_EMPH
        } else {
            PRM_EMPH
        }
    }
}

/// 每个 PRM 类别在肺实质内的体素个数.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ClassCounts {
    counts: [usize; 4],
}

impl ClassCounts {
    /// 统计 `labels` 在 `parenchyma` 内的各类别体素数.
    ///
    /// 两者形状必须一致, 否则 panic.
    pub fn within(labels: &LabelGrid, parenchyma: &ParenchymaMask) -> Self {
        assert_eq!(labels.shape(), parenchyma.shape(), "标签图与肺实质形状不一致");
        let mut counts = [0usize; 4];
        Zip::from(labels.data())
            .and(parenchyma.data())
            .for_each(|&p, &inside| {
                if let (true, Some(c)) = (inside, PrmClass::from_label(p)) {
                    counts[c.index()] += 1;
                }
            });
        Self { counts }
    }

    /// 属于 `class` 的体素数.
    #[inline]
    pub fn get(&self, class: PrmClass) -> usize {
        self.counts[class.index()]
    }

    /// 四个类别的体素总数, 即参与分类的肺实质体素数.
    #[inline]
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// `class` 的体素分数. 肺实质为空时为 0.
    #[inline]
    pub fn fraction(&self, class: PrmClass) -> f64 {
        match self.total() {
            0 => 0.0,
            t => self.get(class) as f64 / t as f64,
        }
    }
}

/// 分类结果.
#[derive(Debug, Clone)]
pub struct Classified {
    /// PRM 标签图.
    pub labels: LabelGrid,

    /// 各类别体素数.
    pub counts: ClassCounts,
}

/// 对配准后的吸气、呼气扫描在肺实质掩膜内逐体素分类.
///
/// 三个输入的形状或体素间距不一致时返回 `PrmError::ShapeMismatch`.
/// 输出网格沿用呼气扫描的 header.
pub fn classify(
    insp: &CtVolume,
    exp: &CtVolume,
    mask: &ParenchymaMask,
    thresholds: &PrmThresholds,
) -> PrmResult<Classified> {
    check_geometry("insp", insp, "exp", exp)?;
    check_geometry("exp", exp, "mask", mask)?;

    let mut out = Array3::<u8>::zeros(exp.shape());
    let zip = Zip::from(&mut out)
        .and(insp.data())
        .and(exp.data())
        .and(mask.data());
    let op = |o: &mut u8, &i: &f32, &e: &f32, &m: &bool| {
        if m {
            *o = thresholds.classify(i, e);
        }
    };
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            zip.par_for_each(op);
        } else {
            zip.for_each(op);
        }
    }

    let labels = LabelGrid::new_unchecked(exp.with_data(out));
    let counts = ClassCounts::within(&labels, mask);
    debug_assert_eq!(counts.total(), mask.count());
    log::debug!(
        "PRM 分类完成: {} 个肺实质体素, 正常 {}, fSAD {}, 肺气肿 {}, 排空型肺气肿 {}",
        counts.total(),
        counts.get(PrmClass::Normal),
        counts.get(PrmClass::FSad),
        counts.get(PrmClass::Emphysema),
        counts.get(PrmClass::EmptyingEmphysema),
    );
    Ok(Classified { labels, counts })
}

#[cfg(test)]
mod tests {
    use super::{classify, PrmThresholds};
    use crate::consts::label::*;
    use crate::consts::PrmClass;
    use crate::{Grid, GridAttr, PrmError, Spacing};
    use ndarray::{s, Array3};

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_rule_and_tie_break() {
        let t = PrmThresholds::default();
        assert_eq!(t.classify(-800.0, -700.0), PRM_NORMAL);
        assert_eq!(t.classify(-800.0, -900.0), PRM_FSAD);
        assert_eq!(t.classify(-980.0, -900.0), PRM_EMPH);
        assert_eq!(t.classify(-980.0, -700.0), PRM_EMPT_EMPH);

        // 恰好等于阈值的体素归入低密度一侧.
        assert_eq!(t.classify(-950.0, -700.0), PRM_EMPT_EMPH);
        assert_eq!(t.classify(-800.0, -856.0), PRM_FSAD);
        assert_eq!(t.classify(-950.0, -856.0), PRM_EMPH);

        // 第二呼气阈值只影响吸气低密度的体素.
        let t = PrmThresholds {
            exp_emptying: -600.0,
            ..Default::default()
        };
        assert_eq!(t.classify(-980.0, -700.0), PRM_EMPH);
        assert_eq!(t.classify(-980.0, -500.0), PRM_EMPT_EMPH);
        assert_eq!(t.classify(-800.0, -700.0), PRM_NORMAL);
    }

    #[test]
    fn test_thresholds_validation() {
        assert!(PrmThresholds::default().validate().is_ok());
        let t = PrmThresholds {
            exp: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(t.validate(), Err(PrmError::Configuration(_))));
    }

    /// 10×10×10 网格, 中心 2×2×2 立方体为正常密度, 其他为低密度.
    #[test]
    fn test_central_cube_scenario() {
        let shape = (10, 10, 10);
        let mut insp = Array3::<f32>::from_elem(shape, -1000.0);
        let mut exp = Array3::<f32>::from_elem(shape, -1000.0);
        insp.slice_mut(s![4..6, 4..6, 4..6]).fill(-800.0);
        exp.slice_mut(s![4..6, 4..6, 4..6]).fill(-700.0);
        let insp = Grid::new(insp, Spacing::UNIT);
        let exp = Grid::new(exp, Spacing::UNIT);
        let mask = Grid::new(Array3::from_elem(shape, true), Spacing::UNIT);

        let out = classify(&insp, &exp, &mask, &PrmThresholds::default()).unwrap();
        for ((z, h, w), &p) in out.labels.data().indexed_iter() {
            let inside = (4..6).contains(&z) && (4..6).contains(&h) && (4..6).contains(&w);
            if inside {
                assert_eq!(p, PRM_NORMAL);
            } else {
                assert!(matches!(p, PRM_FSAD | PRM_EMPH | PRM_EMPT_EMPH));
            }
        }
        assert_eq!(out.counts.get(PrmClass::Normal), 8);
        assert!(f64_eq(out.counts.fraction(PrmClass::Normal), 0.008));
        assert_eq!(out.counts.total(), 1000);
    }

    #[test]
    fn test_outside_mask_is_background_and_fractions_sum_to_one() {
        let shape = (4, 5, 6);
        let insp = Array3::from_shape_fn(shape, |(z, h, w)| {
            -1100.0 + (z * 97 + h * 31 + w * 7) as f32 * 2.0
        });
        let exp = Array3::from_shape_fn(shape, |(z, h, w)| {
            -1000.0 + (z * 13 + h * 59 + w * 17) as f32 * 1.5
        });
        let mask = Array3::from_shape_fn(shape, |(z, h, w)| (z + h + w) % 3 != 0);
        let sp = Spacing::new(1.5, 0.7, 0.7).unwrap();
        let (insp, exp, mask) = (Grid::new(insp, sp), Grid::new(exp, sp), Grid::new(mask, sp));

        let t = PrmThresholds::default();
        let a = classify(&insp, &exp, &mask, &t).unwrap();
        let b = classify(&insp, &exp, &mask, &t).unwrap();
        assert_eq!(a.labels.data(), b.labels.data());
        assert_eq!(a.counts, b.counts);

        for (pos, &p) in a.labels.data().indexed_iter() {
            if mask[pos] {
                assert!(is_classified(p));
            } else {
                assert_eq!(p, PRM_BACKGROUND);
            }
        }
        let sum: f64 = PrmClass::ALL.iter().map(|c| a.counts.fraction(*c)).sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert_eq!(a.labels.spacing(), sp);
    }

    #[test]
    fn test_geometry_mismatch() {
        let insp = Grid::new(Array3::<f32>::zeros((3, 3, 3)), Spacing::UNIT);
        let exp = Grid::new(Array3::<f32>::zeros((3, 3, 4)), Spacing::UNIT);
        let mask = Grid::new(Array3::from_elem((3, 3, 3), true), Spacing::UNIT);
        let e = classify(&insp, &exp, &mask, &PrmThresholds::default()).unwrap_err();
        assert!(matches!(
            e,
            PrmError::ShapeMismatch {
                left: "insp",
                right: "exp",
                ..
            }
        ));

        let exp = Grid::new(Array3::<f32>::zeros((3, 3, 3)), Spacing::new(2.0, 1.0, 1.0).unwrap());
        let e = classify(&insp, &exp, &mask, &PrmThresholds::default()).unwrap_err();
        assert!(matches!(e, PrmError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_empty_parenchyma() {
        let insp = Grid::new(Array3::<f32>::zeros((2, 2, 2)), Spacing::UNIT);
        let mask = Grid::new(Array3::from_elem((2, 2, 2), false), Spacing::UNIT);
        let out = classify(&insp, &insp, &mask, &PrmThresholds::default()).unwrap();
        assert_eq!(out.counts.total(), 0);
        assert_eq!(out.counts.fraction(PrmClass::Normal), 0.0);
    }
}
