//! 单个受试者的 TOML 配置.
//!
//! ```toml
//! [subject]
//! id = "000001"
//!
//! [io]
//! insp = "insp_reg.nii.gz"
//! exp = "exp.nii.gz"
//! mask = "mask.nii.gz"
//! out_dir = "out"
//!
//! [analysis]
//! mode = "full"
//! window = 15
//! ```
//!
//! 提供 `io.label_map` 时直接使用现成的标签图, 此时 `insp`/`exp` 不再需要,
//! `mask` 可选. 相对路径相对于配置文件所在目录解析.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::classify::PrmThresholds;
use crate::consts::DEFAULT_WINDOW;
use crate::pipeline::{AnalysisInput, AnalysisOptions, RunMode};
use crate::preproc::PreprocessOptions;
use crate::topology::LocalMapper;
use crate::{CtVolume, GridAttr, LabelGrid, ParenchymaMask, PrmError, PrmResult};

/// 受试者信息.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubjectSection {
    /// 受试者编号, 同时用于输出目录与文件名.
    pub id: String,
}

/// 输入输出路径.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IoSection {
    /// 配准到呼气相的吸气扫描.
    pub insp: Option<PathBuf>,

    /// 呼气扫描.
    pub exp: Option<PathBuf>,

    /// 肺实质掩膜.
    pub mask: Option<PathBuf>,

    /// 现成的 PRM 标签图 (`.nii`, `.nii.gz` 或 `.npy`).
    pub label_map: Option<PathBuf>,

    /// 输出根目录. 结果写入 `{out_dir}/{id}/`.
    pub out_dir: PathBuf,
}

/// 分析参数.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisSection {
    /// 运行模式.
    pub mode: RunMode,

    /// 局部窗口边长.
    pub window: usize,

    /// 输出 png 使用的冠状面 (h 方向) 索引. 缺省为中间一层.
    pub slice: Option<usize>,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            mode: RunMode::Full,
            window: DEFAULT_WINDOW,
            slice: None,
        }
    }
}

/// 单个受试者的完整配置.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubjectConfig {
    /// `[subject]`.
    pub subject: SubjectSection,

    /// `[io]`.
    pub io: IoSection,

    /// `[analysis]`.
    #[serde(default)]
    pub analysis: AnalysisSection,

    /// `[thresholds]`.
    #[serde(default)]
    pub thresholds: PrmThresholds,

    /// `[preprocess]`. 缺省时不做预处理.
    #[serde(default)]
    pub preprocess: Option<PreprocessOptions>,
}

impl SubjectConfig {
    /// 读取并校验配置文件. 相对路径相对于配置文件所在目录解析.
    pub fn from_file<P: AsRef<Path>>(path: P) -> PrmResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut cfg: Self = toml::from_str(&content)?;
        if let Some(base) = path.parent() {
            cfg.io.resolve_against(base);
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// 解析并校验 TOML 字符串. 路径保持原样.
    pub fn from_toml_str(content: &str) -> PrmResult<Self> {
        let cfg: Self = toml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 受试者编号.
    #[inline]
    pub fn id(&self) -> &str {
        &self.subject.id
    }

    /// 是否直接使用现成的标签图?
    #[inline]
    pub fn uses_label_map(&self) -> bool {
        self.io.label_map.is_some()
    }

    /// 在任何计算开始之前检查配置.
    pub fn validate(&self) -> PrmResult<()> {
        let id = self.id();
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(PrmError::Configuration(format!(
                "受试者编号 `{id}` 不能为空, 不能包含路径分隔符, 也不能以 `.` 开头"
            )));
        }
        if !self.uses_label_map() {
            for (key, p) in [
                ("io.insp", &self.io.insp),
                ("io.exp", &self.io.exp),
                ("io.mask", &self.io.mask),
            ] {
                if p.is_none() {
                    return Err(PrmError::Configuration(format!(
                        "未提供 `io.label_map` 时必须提供 `{key}`"
                    )));
                }
            }
        }
        LocalMapper::new(self.analysis.window)?;
        self.thresholds.validate()?;
        if let Some(p) = &self.preprocess {
            p.validate()?;
        }
        Ok(())
    }

    /// 分析参数.
    pub fn analysis_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            mode: self.analysis.mode,
            window: self.analysis.window,
            thresholds: self.thresholds,
            preprocess: self.preprocess,
        }
    }

    /// 结果目录 `{out_dir}/{id}`.
    #[inline]
    pub fn output_dir(&self) -> PathBuf {
        self.io.out_dir.join(self.id())
    }

    /// 按配置读取输入数据.
    ///
    /// `.npy` 标签图不含体素间距, 提供掩膜时沿用掩膜的体素间距.
    pub fn load_input(&self) -> PrmResult<AnalysisInput> {
        let io = &self.io;
        if let Some(label_map) = &io.label_map {
            let mask = io.mask.as_ref().map(ParenchymaMask::open).transpose()?;
            let is_npy = label_map.extension().is_some_and(|e| e == "npy");
            let labels = match (&mask, is_npy) {
                (Some(m), true) => LabelGrid::open_npy(label_map, m.spacing())?,
                _ => LabelGrid::open(label_map)?,
            };
            return Ok(AnalysisInput::FromLabelGrid { labels, mask });
        }

        let required = |p: &Option<PathBuf>, key: &str| {
            p.clone().ok_or_else(|| {
                PrmError::Configuration(format!("未提供 `io.label_map` 时必须提供 `{key}`"))
            })
        };
        Ok(AnalysisInput::FromVolumes {
            insp: CtVolume::open(required(&io.insp, "io.insp")?)?,
            exp: CtVolume::open(required(&io.exp, "io.exp")?)?,
            mask: ParenchymaMask::open(required(&io.mask, "io.mask")?)?,
        })
    }
}

impl IoSection {
    fn resolve_against(&mut self, base: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        for p in [
            &mut self.insp,
            &mut self.exp,
            &mut self.mask,
            &mut self.label_map,
        ]
        .into_iter()
        .flatten()
        {
            fix(p);
        }
        fix(&mut self.out_dir);
    }
}
