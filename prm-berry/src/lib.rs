#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 对配准后的吸气/呼气肺部 CT 做逐体素参数响应图 (PRM) 分类,
//! 并计算各 PRM 类别的全局与局部 Minkowski 泛函.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 输入的吸气、呼气扫描与肺实质掩膜必须已经配准, 且形状、体素间距一致.
//!   本 crate 不做配准, 也不做肺实质分割.
//! 2. 所有网格一律按 `(z, h, w)` 访问, 体素间距以毫米为单位.
//!
//! # 开发计划
//!
//! ### PRM 体素分类 ✅
//!
//! 吸气阈值与呼气阈值把肺实质划分为正常 / fSAD / 肺气肿 / 排空型肺气肿四类.
//! 阈值全部作为配置暴露, 默认值取 Galbán 等人的 -950 HU / -856 HU.
//!
//! 实现位于 `prm-berry/src/classify.rs`.
//!
//! ### 分类前预处理 ✅
//!
//! 掩膜外体素压暗, 水平切片 2D 中值滤波, 以及按 HU 范围剔除血管/气道体素.
//!
//! 实现位于 `prm-berry/src/preproc.rs`.
//!
//! ### Minkowski 泛函 ✅
//!
//! 以 2×2×2 体素邻域 (cell) 的 256 种占据模式查表, 对闭体素复形精确计数
//! 顶点/棱/面/立方体, 得到体积分数、表面积密度、平均曲率密度与 Euler 示性数密度.
//!
//! 实现位于 `prm-berry/src/minkowski`.
//!
//! ### 全局 / 局部拓扑 ✅
//!
//! 全局: 每个类别对整个网格计算一次. 局部: 以奇数边长滑动窗口扫过每个肺实质体素,
//! 生成每类别每泛函一张密度图. 局部计算按水平切片并行.
//!
//! 实现位于 `prm-berry/src/topology`.
//!
//! ### 流水线与输出 ✅
//!
//! 两种输入 (体积 / 现成标签图) 与两种运行模式 (`full` / `global-only`),
//! 以及 nii, png, csv 输出.
//!
//! 实现位于 `prm-berry/src/pipeline.rs`, `prm-berry/src/save`.

/// 三维索引, 按 `(z, h, w)` 排列.
pub type Idx3d = (usize, usize, usize);

pub mod consts;

mod data;

pub use data::{
    BinaryMask, CtVolume, DensityMap, Grid, GridAttr, LabelGrid, ParenchymaMask, Spacing,
};

pub mod classify;

pub mod config;

mod error;

pub use error::{PrmError, PrmResult};

pub mod mask;

pub mod minkowski;

pub mod pipeline;

pub mod preproc;

pub mod save;

pub mod topology;

pub mod prelude;
