//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;

pub use crate::{
    BinaryMask, CtVolume, DensityMap, Grid, GridAttr, LabelGrid, ParenchymaMask, PrmError,
    PrmResult, Spacing,
};

pub use crate::consts::label::{PRM_BACKGROUND, PRM_EMPH, PRM_EMPT_EMPH, PRM_FSAD, PRM_NORMAL};
pub use crate::consts::{PrmClass, DEFAULT_WINDOW};

pub use crate::classify::{classify, ClassCounts, PrmThresholds};
pub use crate::config::SubjectConfig;
pub use crate::minkowski::{functionals, Functional, Functionals};
pub use crate::pipeline::{
    analyze, analyze_with, run_subject, AnalysisInput, AnalysisOptions, RunMode,
};
pub use crate::preproc::PreprocessOptions;
pub use crate::save::{ImgWriteVis, SubjectWriter, WriteNii};
pub use crate::topology::{ClassStats, LocalMapper, LocalTopology, Summary};
