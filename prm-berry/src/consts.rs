//! 通用常量.

/// PRM 标签值.
pub mod label {
    /// 背景, 或者肺实质之外的体素.
    pub const PRM_BACKGROUND: u8 = 0;

    /// 正常肺组织.
    pub const PRM_NORMAL: u8 = 1;

    /// 功能性小气道病变 (fSAD), 即非肺气肿性空气潴留.
    pub const PRM_FSAD: u8 = 2;

    /// 肺气肿.
    pub const PRM_EMPH: u8 = 3;

    /// 排空型肺气肿.
    pub const PRM_EMPT_EMPH: u8 = 4;

    /// 体素是否属于某个 PRM 类别?
    #[inline]
    pub const fn is_classified(p: u8) -> bool {
        matches!(p, PRM_NORMAL..=PRM_EMPT_EMPH)
    }

    /// 是否是合法的标签值?
    #[inline]
    pub const fn is_valid(p: u8) -> bool {
        p <= PRM_EMPT_EMPH
    }
}

/// HU 阈值与预处理常量.
pub mod hu {
    /// 吸气相阈值 (Galbán et al., 2012).
    pub const GALBAN_INSP: f32 = -950.0;

    /// 呼气相阈值 (Galbán et al., 2012).
    pub const GALBAN_EXP: f32 = -856.0;

    /// 掩膜外体素被压暗后的 HU 值.
    pub const DIM_OUTSIDE: f32 = -2000.0;

    /// 中值滤波窗口边长.
    pub const MEDIAN_KERNEL: usize = 3;

    /// 低于该 HU 的体素从掩膜中剔除.
    pub const EXCLUDE_LOWER: f32 = -1000.0;

    /// 高于该 HU 的体素从掩膜中剔除 (血管与气道).
    pub const EXCLUDE_UPPER: f32 = -500.0;
}

/// 局部拓扑默认窗口边长 (体素).
pub const DEFAULT_WINDOW: usize = 15;

/// 四个 PRM 类别.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum PrmClass {
    /// [`label::PRM_NORMAL`].
    Normal,

    /// [`label::PRM_FSAD`].
    FSad,

    /// [`label::PRM_EMPH`].
    Emphysema,

    /// [`label::PRM_EMPT_EMPH`].
    EmptyingEmphysema,
}

impl PrmClass {
    /// 按标签值升序排列的全部类别.
    pub const ALL: [PrmClass; 4] = [
        PrmClass::Normal,
        PrmClass::FSad,
        PrmClass::Emphysema,
        PrmClass::EmptyingEmphysema,
    ];

    /// 对应的标签值.
    #[inline]
    pub const fn label(self) -> u8 {
        match self {
            PrmClass::Normal => label::PRM_NORMAL,
            PrmClass::FSad => label::PRM_FSAD,
            PrmClass::Emphysema => label::PRM_EMPH,
            PrmClass::EmptyingEmphysema => label::PRM_EMPT_EMPH,
        }
    }

    /// 由标签值得到类别. 背景或非法值返回 `None`.
    #[inline]
    pub const fn from_label(p: u8) -> Option<Self> {
        match p {
            label::PRM_NORMAL => Some(PrmClass::Normal),
            label::PRM_FSAD => Some(PrmClass::FSad),
            label::PRM_EMPH => Some(PrmClass::Emphysema),
            label::PRM_EMPT_EMPH => Some(PrmClass::EmptyingEmphysema),
            _ => None,
        }
    }

    /// 在 `[0, 4)` 内的下标.
    #[inline]
    pub const fn index(self) -> usize {
        self.label() as usize - 1
    }

    /// 输出文件名中使用的短名.
    pub const fn short_name(self) -> &'static str {
        match self {
            PrmClass::Normal => "norm",
            PrmClass::FSad => "fsad",
            PrmClass::Emphysema => "emph",
            PrmClass::EmptyingEmphysema => "emptemph",
        }
    }

    /// 彩色 PRM 切片中的颜色.
    pub const fn rgb(self) -> [u8; 3] {
        match self {
            PrmClass::Normal => [0, 255, 0],
            PrmClass::FSad => [255, 255, 0],
            PrmClass::Emphysema => [255, 0, 0],
            PrmClass::EmptyingEmphysema => [160, 32, 240],
        }
    }
}

impl std::fmt::Display for PrmClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.short_name())
    }
}

#[cfg(test)]
mod tests {
    use super::{label::*, PrmClass};

    #[test]
    fn test_class_label_round_trip() {
        for (i, c) in PrmClass::ALL.into_iter().enumerate() {
            assert_eq!(c.index(), i);
            assert_eq!(PrmClass::from_label(c.label()), Some(c));
            assert!(is_classified(c.label()));
        }
        assert_eq!(PrmClass::from_label(PRM_BACKGROUND), None);
        assert_eq!(PrmClass::from_label(5), None);
        assert!(is_valid(PRM_EMPT_EMPH));
        assert!(!is_valid(5));
    }
}
