//! 分析结果的持久化存储.
//!
//! 一个受试者的全部结果位于 `{out_dir}/{id}/`:
//!
//! - `prm_all_{id}.nii.gz`: 标签图;
//! - `prm_{class}_{id}.nii.gz`: 各类别 0/1 掩膜;
//! - `prm_all_color_{id}.png`: 冠状面彩色 PRM 切片;
//! - `prm_stats_{id}.csv`: 统计汇总;
//! - `topo_{class}_{functional}_{id}.nii.gz` 与同名 `.png`: 局部密度图 (只在 `full` 模式下).
//!
//! 文件先写入隐藏的暂存目录 `{out_dir}/.{id}.partial`, 全部写完后才改名为最终目录.
//! 失败的受试者不会留下残缺的输出.

mod nii;
mod stats;
mod vis;

pub use nii::WriteNii;
pub use stats::write_stats;
pub use vis::{CtWindow, DensitySlice, ImgWriteVis, PrmSlice};

use std::fs;
use std::path::{Path, PathBuf};

use crate::consts::PrmClass;
use crate::mask::binary_mask;
use crate::minkowski::Functional;
use crate::pipeline::SubjectAnalysis;
use crate::topology::LocalTopology;
use crate::{GridAttr, PrmResult};

/// 标签图文件名.
pub fn label_file(id: &str) -> String {
    format!("prm_all_{id}.nii.gz")
}

/// 类别掩膜文件名.
pub fn class_file(id: &str, class: PrmClass) -> String {
    format!("prm_{class}_{id}.nii.gz")
}

/// 彩色 PRM 切片文件名.
pub fn color_file(id: &str) -> String {
    format!("prm_all_color_{id}.png")
}

/// 统计汇总文件名.
pub fn stats_file(id: &str) -> String {
    format!("prm_stats_{id}.csv")
}

/// 密度图文件名主干, 不含扩展名.
pub fn topo_stem(id: &str, class: PrmClass, f: Functional) -> String {
    format!("topo_{class}_{}_{id}", f.short_name())
}

/// 单个受试者的结果写出器.
///
/// 未调用 [`Self::commit`] 就被丢弃时, 暂存目录会被删除.
#[derive(Debug)]
pub struct SubjectWriter {
    id: String,
    staging: PathBuf,
    target: PathBuf,
    slice: Option<usize>,
    committed: bool,
}

impl SubjectWriter {
    /// 在 `out_dir` 下为 `id` 创建一个空的暂存目录.
    pub fn new<P: AsRef<Path>>(out_dir: P, id: &str) -> PrmResult<Self> {
        let out_dir = out_dir.as_ref();
        let staging = out_dir.join(format!(".{id}.partial"));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;
        Ok(Self {
            id: id.to_owned(),
            staging,
            target: out_dir.join(id),
            slice: None,
            committed: false,
        })
    }

    /// 指定 png 使用的冠状面索引. `None` 表示中间一层.
    pub fn with_slice(mut self, slice: Option<usize>) -> Self {
        self.slice = slice;
        self
    }

    /// 暂存目录.
    #[inline]
    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    /// 冠状面索引. 越界时退回中间一层.
    fn coronal_index(&self, height: usize) -> usize {
        match self.slice {
            Some(s) if s < height => s,
            _ => height / 2,
        }
    }

    /// 写出标签图, 类别掩膜, 彩色切片与统计汇总到暂存目录.
    /// `a.local` 中的密度图 (如果有) 一并写出.
    pub fn write(&self, a: &SubjectAnalysis) -> PrmResult<()> {
        let id = self.id.as_str();
        let dir = &self.staging;

        a.labels.write_nii(dir.join(label_file(id)))?;
        for class in PrmClass::ALL {
            let mask = binary_mask(&a.labels, &a.parenchyma, class);
            mask.write_nii(dir.join(class_file(id, class)))?;
        }

        let file = fs::File::create(dir.join(stats_file(id)))?;
        write_stats(file, &a.summary)?;

        let (_, height, _) = a.labels.shape();
        if let Some(s) = self.slice.filter(|s| *s >= height) {
            log::warn!("冠状面索引 {s} 越界 (高度 {height}), 改用中间一层");
        }
        if a.labels.size() > 0 {
            let h = self.coronal_index(height);
            let backdrop = a.backdrop.as_ref().map(|b| b.coronal_at(h));
            let slice = PrmSlice::new(a.labels.grid().coronal_at(h), backdrop);
            slice.save(dir.join(color_file(id)))?;
        } else {
            log::warn!("网格为空, 跳过 png 输出");
        }

        for t in a.local.iter().flatten() {
            self.write_local(t)?;
        }
        Ok(())
    }

    /// 写出一个类别的四张密度图及其冠状面切片到暂存目录.
    pub fn write_local(&self, t: &LocalTopology) -> PrmResult<()> {
        let id = self.id.as_str();
        for f in Functional::ALL {
            let stem = topo_stem(id, t.class, f);
            let map = t.map(f);
            map.write_nii(self.staging.join(format!("{stem}.nii.gz")))?;
            if map.size() > 0 {
                let h = self.coronal_index(map.shape().1);
                DensitySlice(map.coronal_at(h)).save(self.staging.join(format!("{stem}.png")))?;
            }
        }
        Ok(())
    }

    /// 把暂存目录改名为 `{out_dir}/{id}`. 已存在的旧结果会被替换.
    pub fn commit(mut self) -> PrmResult<PathBuf> {
        if self.target.exists() {
            fs::remove_dir_all(&self.target)?;
        }
        fs::rename(&self.staging, &self.target)?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for SubjectWriter {
    fn drop(&mut self) {
        if !self.committed && self.staging.exists() {
            if let Err(e) = fs::remove_dir_all(&self.staging) {
                log::warn!("无法删除暂存目录 {}: {e}", self.staging.display());
            }
        }
    }
}
