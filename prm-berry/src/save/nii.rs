//! nii 文件写出.

use nifti::writer::WriterOptions;
use nifti::NiftiHeader;
use std::path::Path;

use crate::{DensityMap, Grid, GridAttr, LabelGrid, PrmResult};

/// 表明一个可以写成 nii 文件的网格. 路径以 `.gz` 结尾时自动压缩.
pub trait WriteNii {
    /// 写出到 `path`.
    fn write_nii<P: AsRef<Path>>(&self, path: P) -> PrmResult<()>;
}

/// 输出文件使用的 header: 沿用输入的仿射信息, 体素间距与网格一致, 不做数值缩放.
fn output_header<G: GridAttr>(grid: &G) -> NiftiHeader {
    let mut h = grid.header().cloned().unwrap_or_default();
    let s = grid.spacing();
    // pixdim: [_, W, H, z, ..]
    h.pixdim[1] = s.width_mm() as f32;
    h.pixdim[2] = s.height_mm() as f32;
    h.pixdim[3] = s.z_mm() as f32;
    h.scl_slope = 1.0;
    h.scl_inter = 0.0;
    h
}

macro_rules! impl_write_nii {
    ($($t: ty),+) => {
        $(
            /// 数据按 `(W, H, z)` 写出.
            impl WriteNii for Grid<$t> {
                fn write_nii<P: AsRef<Path>>(&self, path: P) -> PrmResult<()> {
                    let header = output_header(self);
                    WriterOptions::new(path.as_ref())
                        .reference_header(&header)
                        .write_nifti(&self.data().permuted_axes([2, 1, 0]))?;
                    Ok(())
                }
            }
        )+
    };
}

impl_write_nii!(u8, f32);

impl WriteNii for LabelGrid {
    #[inline]
    fn write_nii<P: AsRef<Path>>(&self, path: P) -> PrmResult<()> {
        self.grid().write_nii(path)
    }
}

/// 二值掩膜写成 0/1 的 `u8`.
impl WriteNii for Grid<bool> {
    fn write_nii<P: AsRef<Path>>(&self, path: P) -> PrmResult<()> {
        self.map(|&p| p as u8).write_nii(path)
    }
}

/// 密度图写成 `f32`, 保留 `NaN`.
impl WriteNii for DensityMap {
    fn write_nii<P: AsRef<Path>>(&self, path: P) -> PrmResult<()> {
        self.map(|&v| v as f32).write_nii(path)
    }
}
