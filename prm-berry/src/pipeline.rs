//! 单个受试者的分析流水线.
//!
//! (可选的预处理) → 分类 → 各类别二值掩膜 → 全局泛函 / 局部密度图 → 汇总.
//! 现成的标签图跳过前两步.

use serde::Deserialize;

use crate::classify::{classify, ClassCounts, Classified, PrmThresholds};
use crate::config::SubjectConfig;
use crate::consts::DEFAULT_WINDOW;
use crate::data::check_geometry;
use crate::preproc::{preprocess, PreprocessOptions};
use crate::save::SubjectWriter;
use crate::topology::{global_functionals, LocalMapper, LocalTopology, Summary};
use crate::{CtVolume, GridAttr, LabelGrid, ParenchymaMask, PrmResult};

/// 流水线输入.
#[derive(Debug, Clone)]
pub enum AnalysisInput {
    /// 配准后的吸气、呼气扫描与肺实质掩膜.
    FromVolumes {
        /// 吸气扫描.
        insp: CtVolume,
        /// 呼气扫描.
        exp: CtVolume,
        /// 肺实质掩膜.
        mask: ParenchymaMask,
    },

    /// 现成的 PRM 标签图. 未提供掩膜时, 非背景体素即肺实质.
    FromLabelGrid {
        /// 标签图.
        labels: LabelGrid,
        /// 可选的肺实质掩膜.
        mask: Option<ParenchymaMask>,
    },
}

/// 运行模式.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// 全局泛函与局部密度图.
    #[default]
    Full,

    /// 只计算全局泛函.
    GlobalOnly,
}

/// 分析参数.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AnalysisOptions {
    /// 运行模式.
    pub mode: RunMode,

    /// 局部窗口边长. 只在 [`RunMode::Full`] 下使用, 但总会被校验.
    pub window: usize,

    /// 分类阈值.
    pub thresholds: PrmThresholds,

    /// 预处理参数. `None` 表示不做预处理.
    pub preprocess: Option<PreprocessOptions>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            mode: RunMode::Full,
            window: DEFAULT_WINDOW,
            thresholds: PrmThresholds::default(),
            preprocess: None,
        }
    }
}

/// 单个受试者的分析结果.
#[derive(Debug, Clone)]
pub struct SubjectAnalysis {
    /// PRM 标签图.
    pub labels: LabelGrid,

    /// 参与分析的肺实质.
    pub parenchyma: ParenchymaMask,

    /// 统计汇总.
    pub summary: Summary,

    /// 各类别局部密度图, 按 `PrmClass::ALL` 排列.
    ///
    /// 只由 [`analyze`] 在 `full` 模式下收集; [`analyze_with`] 把密度图交给调用方, 此处为 `None`.
    pub local: Option<Vec<LocalTopology>>,

    /// 可视化底图 (未经预处理的呼气扫描). 输入为标签图时为 `None`.
    pub backdrop: Option<CtVolume>,
}

/// 分析单个受试者, 并在结果中保留全部局部密度图.
///
/// 大体积数据请使用 [`analyze_with`] 逐个类别处理密度图.
pub fn analyze(input: AnalysisInput, opts: &AnalysisOptions) -> PrmResult<SubjectAnalysis> {
    let mut local = Vec::new();
    let mut analysis = analyze_with(input, opts, |t| {
        local.push(t);
        Ok(())
    })?;
    if opts.mode == RunMode::Full {
        analysis.local = Some(local);
    }
    Ok(analysis)
}

/// 分析单个受试者. `full` 模式下每个类别的密度图生成后立即交给 `sink`,
/// 不在结果中保留.
///
/// 所有参数在计算开始之前校验. 输入在函数开头一次性分派.
pub fn analyze_with<F>(
    input: AnalysisInput,
    opts: &AnalysisOptions,
    sink: F,
) -> PrmResult<SubjectAnalysis>
where
    F: FnMut(LocalTopology) -> PrmResult<()>,
{
    let mapper = LocalMapper::new(opts.window)?;
    opts.thresholds.validate()?;
    if let Some(p) = &opts.preprocess {
        p.validate()?;
    }

    let (classified, parenchyma, backdrop) = match input {
        AnalysisInput::FromVolumes { insp, exp, mask } => {
            let (classified, parenchyma) = match &opts.preprocess {
                Some(p) => {
                    log::info!(
                        "预处理: 掩膜外压暗, {0}×{0} 中值滤波, HU 范围剔除",
                        p.median_kernel
                    );
                    let pre = preprocess(&insp, &exp, &mask, p)?;
                    log::info!("PRM 分类");
                    let classified = classify(&pre.insp, &pre.exp, &pre.mask, &opts.thresholds)?;
                    (classified, pre.mask)
                }
                None => {
                    log::info!("PRM 分类");
                    (classify(&insp, &exp, &mask, &opts.thresholds)?, mask)
                }
            };
            (classified, parenchyma, Some(exp))
        }
        AnalysisInput::FromLabelGrid { labels, mask } => {
            if opts.preprocess.is_some() {
                log::warn!("输入为现成标签图, 忽略预处理配置");
            }
            let parenchyma = match mask {
                Some(m) => {
                    check_geometry("labels", &labels, "mask", &m)?;
                    m
                }
                None => labels.parenchyma(),
            };
            let counts = ClassCounts::within(&labels, &parenchyma);
            (Classified { labels, counts }, parenchyma, None)
        }
    };
    finish(classified, parenchyma, backdrop, &mapper, opts.mode, sink)
}

fn finish<F>(
    classified: Classified,
    parenchyma: ParenchymaMask,
    backdrop: Option<CtVolume>,
    mapper: &LocalMapper,
    mode: RunMode,
    sink: F,
) -> PrmResult<SubjectAnalysis>
where
    F: FnMut(LocalTopology) -> PrmResult<()>,
{
    let Classified { labels, counts } = classified;
    if counts.total() == 0 {
        log::warn!("肺实质为空, 所有泛函均为 0");
    }

    log::info!("全局 Minkowski 泛函 ({} 个肺实质体素)", counts.total());
    let global = global_functionals(&labels, &parenchyma);

    let mean_local = match mode {
        RunMode::Full => {
            log::info!(
                "局部 Minkowski 泛函 (窗口 {}, {} 张水平切片)",
                mapper.window(),
                labels.len_z()
            );
            Some(mapper.map_classes(&labels, &parenchyma, sink)?)
        }
        RunMode::GlobalOnly => None,
    };

    let summary = Summary::new(&counts, &global, mean_local.as_ref());
    Ok(SubjectAnalysis {
        labels,
        parenchyma,
        summary,
        local: None,
        backdrop,
    })
}

/// 按配置完整处理一个受试者: 校验, 读取, 分析, 写出结果.
///
/// 返回统计汇总. 所有错误都附带受试者编号.
pub fn run_subject(cfg: &SubjectConfig) -> PrmResult<Summary> {
    let id = cfg.id();
    let run = || -> PrmResult<Summary> {
        cfg.validate()?;
        log::info!("读取输入");
        let input = cfg.load_input()?;

        let writer = SubjectWriter::new(&cfg.io.out_dir, id)?.with_slice(cfg.analysis.slice);
        let analysis = analyze_with(input, &cfg.analysis_options(), |t| writer.write_local(&t))?;
        log::info!("写出结果");
        writer.write(&analysis)?;
        let dir = writer.commit()?;
        log::info!("结果已写入 {}", dir.display());
        Ok(analysis.summary)
    };
    run().map_err(|e| e.for_subject(id))
}
