//! 切片的可视化存储.

use image::{GrayImage, ImageResult, Luma, Rgb, RgbImage};
use ndarray::ArrayView2;
use std::path::Path;

use crate::consts::PrmClass;

/// 表明一个可以通过 **可视化友好** 模式持久化存储的图像对象.
///
/// 对于 PRM 标签切片, 四个类别映射为四种颜色, 叠加在肺窗下的呼气扫描上;
/// 对于密度切片, 有定义的值按切片内的最小/最大值线性映射到灰度.
pub trait ImgWriteVis {
    /// 按照一定的可视化规则将图片保存到 `path` 路径.
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// CT 窗口, 包含窗位和窗宽.
#[derive(Copy, Clone, Debug)]
pub struct CtWindow {
    level: f32,
    width: f32,
}

impl CtWindow {
    /// 构建 CT 窗. `width` 必须为正的有限值, 否则返回 `None`.
    pub fn new(level: f32, width: f32) -> Option<CtWindow> {
        (level.is_finite() && width.is_finite() && width > 0.0).then_some(Self { level, width })
    }

    /// 便于展示肺实质的 CT 窗口. 窗位 -600, 窗宽 1500.
    #[inline]
    pub const fn from_lung_visual() -> CtWindow {
        Self {
            level: -600.0,
            width: 1500.0,
        }
    }

    /// 窗下限.
    #[inline]
    pub fn lower_bound(&self) -> f32 {
        self.level - self.width / 2.0
    }

    /// `hu` 对应的灰度值. `hu` 无意义 (如 inf, NaN) 时为黑色.
    pub fn eval(&self, hu: f32) -> u8 {
        if !hu.is_finite() {
            return u8::MIN;
        }
        // 255, not 256.
        let g = (hu - self.lower_bound()) / self.width * 255.0;
        num::clamp(g, 0.0, 255.0) as u8
    }
}

/// 冠状面 PRM 切片, 形状 `(z, w)`. z 较大的一端画在图像上方.
pub struct PrmSlice<'a> {
    labels: ArrayView2<'a, u8>,
    backdrop: Option<ArrayView2<'a, f32>>,
}

impl<'a> PrmSlice<'a> {
    /// `backdrop` 的形状必须与 `labels` 相同, 否则 panic.
    pub fn new(labels: ArrayView2<'a, u8>, backdrop: Option<ArrayView2<'a, f32>>) -> Self {
        if let Some(b) = &backdrop {
            assert_eq!(b.dim(), labels.dim(), "底图与标签切片形状不一致");
        }
        Self { labels, backdrop }
    }

    /// 坐标 `(z, w)` 处的颜色.
    fn color(&self, z: usize, w: usize) -> [u8; 3] {
        match PrmClass::from_label(self.labels[(z, w)]) {
            Some(c) => c.rgb(),
            None => {
                const WINDOW: CtWindow = CtWindow::from_lung_visual();
                let g = self.backdrop.map_or(0, |b| WINDOW.eval(b[(z, w)]));
                [g; 3]
            }
        }
    }
}

impl ImgWriteVis for PrmSlice<'_> {
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let (nz, nw) = self.labels.dim();
        let mut buf = RgbImage::new(nw as u32, nz as u32);
        for (z, w) in itertools::iproduct!(0..nz, 0..nw) {
            buf.put_pixel(w as u32, (nz - 1 - z) as u32, Rgb(self.color(z, w)));
        }
        buf.save(path)
    }
}

/// 冠状面密度切片, 形状 `(z, w)`. `NaN` 画为黑色.
pub struct DensitySlice<'a>(pub ArrayView2<'a, f64>);

impl DensitySlice<'_> {
    /// 有定义值的最小值与最大值.
    fn range(&self) -> Option<(f64, f64)> {
        self.0
            .iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

impl ImgWriteVis for DensitySlice<'_> {
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let (nz, nw) = self.0.dim();
        let mut buf = GrayImage::new(nw as u32, nz as u32);
        let range = self.range();
        for ((z, w), &v) in self.0.indexed_iter() {
            let gray = match range {
                Some((lo, hi)) if v.is_finite() => {
                    if hi > lo {
                        ((v - lo) / (hi - lo) * 255.0) as u8
                    } else {
                        u8::MAX
                    }
                }
                _ => u8::MIN,
            };
            buf.put_pixel(w as u32, (nz - 1 - z) as u32, Luma([gray]));
        }
        buf.save(path)
    }
}

#[cfg(test)]
mod tests {
    use super::{CtWindow, DensitySlice, ImgWriteVis, PrmSlice};
    use crate::consts::PrmClass;
    use ndarray::{array, Array2};

    #[test]
    fn test_lung_window() {
        let ct = CtWindow::from_lung_visual();
        assert_eq!(ct.lower_bound(), -1350.0);
        assert_eq!(ct.eval(-2000.0), 0);
        assert_eq!(ct.eval(500.0), 255);
        assert_eq!(ct.eval(-600.0), 127);
        assert_eq!(ct.eval(f32::NAN), 0);
        assert!(CtWindow::new(0.0, 0.0).is_none());
        assert_eq!(CtWindow::new(80.0, 40.0).unwrap().eval(70.0), (255.0 * 0.25) as u8);
    }

    #[test]
    fn test_prm_colors() {
        let labels = array![[0u8, 1], [3, 4]];
        let backdrop = Array2::<f32>::from_elem((2, 2), 500.0);
        let s = PrmSlice::new(labels.view(), Some(backdrop.view()));
        assert_eq!(s.color(0, 0), [255; 3]);
        assert_eq!(s.color(0, 1), PrmClass::Normal.rgb());
        assert_eq!(s.color(1, 1), PrmClass::EmptyingEmphysema.rgb());
        assert_eq!(PrmSlice::new(labels.view(), None).color(0, 0), [0; 3]);
    }

    #[test]
    fn test_save_slices() {
        let dir = std::env::temp_dir().join(format!("prm-berry-vis-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let labels = array![[0u8, 1, 2], [3, 4, 0]];
        PrmSlice::new(labels.view(), None).save(dir.join("prm.png")).unwrap();
        let img = image::open(dir.join("prm.png")).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (3, 2));
        // z = 0 位于图像底部.
        assert_eq!(img.get_pixel(1, 1).0, PrmClass::Normal.rgb());

        let d = array![[f64::NAN, 0.5, 1.0], [0.0, 0.25, f64::NAN]];
        let s = DensitySlice(d.view());
        assert_eq!(s.range(), Some((0.0, 1.0)));
        s.save(dir.join("d.png")).unwrap();
        let img = image::open(dir.join("d.png")).unwrap().to_luma8();
        assert_eq!(img.get_pixel(2, 1).0, [255]);
        assert_eq!(img.get_pixel(1, 1).0, [127]);
        assert_eq!(img.get_pixel(2, 0).0, [0]);
        assert_eq!(img.get_pixel(0, 0).0, [0]);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
