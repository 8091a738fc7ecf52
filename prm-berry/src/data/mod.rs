//! 带体素间距的三维网格. 所有分析数据 (扫描, 掩膜, 标签图, 密度图) 都以它为载体.

use std::ops::Index;
use std::path::Path;

use ndarray::{Array3, ArrayD, ArrayView2, ArrayView3, Axis, Ix3};
use nifti::{DataElement, IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::consts::label::*;
use crate::consts::PrmClass;
use crate::{Idx3d, PrmError, PrmResult};

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
pub(crate) type BoxedHeader = Box<NiftiHeader>;

/// 体素间距, 以毫米为单位. 分别代表空间 (相邻切片方向), 高和宽.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Spacing([f64; 3]);

impl Spacing {
    /// 各向同性的 1 毫米间距.
    pub const UNIT: Spacing = Spacing([1.0; 3]);

    /// 按 `(z, h, w)` 构造体素间距. 任一分量非有限或不为正时返回 `None`.
    pub fn new(z_mm: f64, height_mm: f64, width_mm: f64) -> Option<Self> {
        let v = [z_mm, height_mm, width_mm];
        v.iter()
            .all(|d| d.is_finite() && *d > 0.0)
            .then_some(Self(v))
    }

    /// 从 nii header 读取体素间距. header 中非正或非有限的分量按 1 毫米处理, 并给出警告.
    pub fn from_header(h: &NiftiHeader) -> Self {
        // pixdim: [_, W, H, z, ..]
        let [_, w, h, z, ..] = h.pixdim;
        let fix = |axis: &str, d: f32| {
            if d.is_finite() && d > 0.0 {
                d as f64
            } else {
                log::warn!("nii header 中 {axis} 方向的体素间距 `{d}` 非法, 按 1 毫米处理");
                1.0
            }
        };
        Self([fix("z", z), fix("height", h), fix("width", w)])
    }

    /// 空间方向 (相邻 2D 切片的方向) 体素分辨率.
    #[inline]
    pub fn z_mm(&self) -> f64 {
        self.0[0]
    }

    /// height 方向体素分辨率.
    #[inline]
    pub fn height_mm(&self) -> f64 {
        self.0[1]
    }

    /// width 方向体素分辨率.
    #[inline]
    pub fn width_mm(&self) -> f64 {
        self.0[2]
    }

    /// `[z, h, w]`.
    #[inline]
    pub fn as_array(&self) -> [f64; 3] {
        self.0
    }

    /// 单个体素的实际体积, 以立方毫米为单位.
    #[inline]
    pub fn voxel(&self) -> f64 {
        self.0.iter().product()
    }

    /// 两个体素间距是否 (在 nii header 的 `f32` 精度下) 相同.
    pub fn approx_eq(&self, other: &Spacing) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| (a - b).abs() <= 1e-5 * a.abs().max(b.abs()).max(1.0))
    }
}

impl Default for Spacing {
    #[inline]
    fn default() -> Self {
        Self::UNIT
    }
}

/// 三维网格的共用几何属性.
pub trait GridAttr {
    /// 数据形状 `(z, h, w)`.
    fn shape(&self) -> Idx3d;

    /// 体素间距.
    fn spacing(&self) -> Spacing;

    /// 创建者提供的 nii header (如果有). 输出文件会沿用它的仿射信息.
    fn header(&self) -> Option<&NiftiHeader>;

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 网格的实际体积, 以立方毫米为单位.
    #[inline]
    fn physical_volume(&self) -> f64 {
        self.size() as f64 * self.spacing().voxel()
    }
}

/// 检查两个网格的形状与体素间距是否一致. 不一致时返回 `PrmError::ShapeMismatch`.
pub(crate) fn check_geometry<A: GridAttr + ?Sized, B: GridAttr + ?Sized>(
    left: &'static str,
    a: &A,
    right: &'static str,
    b: &B,
) -> PrmResult<()> {
    let detail = if a.shape() != b.shape() {
        format!("形状 {:?} != {:?}", a.shape(), b.shape())
    } else if !a.spacing().approx_eq(&b.spacing()) {
        format!(
            "体素间距 {:?} != {:?}",
            a.spacing().as_array(),
            b.spacing().as_array()
        )
    } else {
        return Ok(());
    };
    Err(PrmError::ShapeMismatch {
        left,
        right,
        detail,
    })
}

/// 三维网格, 包括按 `(z, h, w)` 存储的数据、体素间距和可选的 nii header.
///
/// 网格由创建者一次性构造, 之后只通过视图读取.
#[derive(Debug, Clone)]
pub struct Grid<T> {
    data: Array3<T>,
    spacing: Spacing,
    header: Option<BoxedHeader>,
}

/// HU 值扫描.
pub type CtVolume = Grid<f32>;

/// 肺实质掩膜.
pub type ParenchymaMask = Grid<bool>;

/// 单个 PRM 类别的二值指示网格, 已限制在肺实质内.
pub type BinaryMask = Grid<bool>;

/// 局部 Minkowski 泛函密度图. 肺实质之外为 `NaN`.
pub type DensityMap = Grid<f64>;

impl<T> GridAttr for Grid<T> {
    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    #[inline]
    fn spacing(&self) -> Spacing {
        self.spacing
    }

    #[inline]
    fn header(&self) -> Option<&NiftiHeader> {
        self.header.as_deref()
    }
}

impl<T> Index<Idx3d> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl<T> Grid<T> {
    /// 由 `(z, h, w)` 排列的数据与体素间距构造网格.
    #[inline]
    pub fn new(data: Array3<T>, spacing: Spacing) -> Self {
        Self {
            data,
            spacing,
            header: None,
        }
    }

    pub(crate) fn from_parts(
        data: Array3<T>,
        spacing: Spacing,
        header: Option<BoxedHeader>,
    ) -> Self {
        Self {
            data,
            spacing,
            header,
        }
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, T> {
        self.data.view()
    }

    /// 获取第 `h_index` 行所在的冠状面切片视图, 形状为 `(z, w)`.
    ///
    /// 当 `h_index` 越界时 panic.
    #[inline]
    pub fn coronal_at(&self, h_index: usize) -> ArrayView2<'_, T> {
        self.data.index_axis(Axis(1), h_index)
    }

    /// 逐体素映射, 保持几何信息与 header 不变.
    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> Grid<U> {
        Grid {
            data: self.data.map(f),
            spacing: self.spacing,
            header: self.header.clone(),
        }
    }

    /// 以另一个数组替换数据, 保持几何信息与 header. 形状必须一致, 否则 panic.
    pub(crate) fn with_data<U>(&self, data: Array3<U>) -> Grid<U> {
        assert_eq!(self.data.dim(), data.dim(), "替换数据形状不一致");
        Grid {
            data,
            spacing: self.spacing,
            header: self.header.clone(),
        }
    }
}

impl Grid<bool> {
    /// 值为 `true` 的体素个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|p| **p).count()
    }
}

/// 将 nifti 的 (W, H, z) 数组转换成 (z, H, W). 以后均按照该模式访问.
fn into_zhw<T: Clone>(data: ArrayD<T>) -> PrmResult<Array3<T>> {
    // hint: 原第一维向下增长, 原第二维向右增长.
    let data = data.into_dimensionality::<Ix3>()?.permuted_axes([2, 1, 0]);
    Ok(if data.is_standard_layout() {
        data
    } else {
        data.as_standard_layout().into_owned()
    })
}

/// 去掉 4D nii 中长度为 1 的时间维.
fn squeeze_time<T>(mut data: ArrayD<T>) -> ArrayD<T> {
    while data.ndim() > 3 && data.shape()[data.ndim() - 1] == 1 {
        let last = data.ndim() - 1;
        data = data.index_axis_move(Axis(last), 0);
    }
    data
}

/// 打开 nii 文件, 返回 header 与按 `(z, h, w)` 排列, 转换为 `T` 的数据.
///
/// 转换按 `as` 语义进行, 因此标签图应当以能无损容纳原始值的类型读取.
fn open_nii<T: DataElement>(path: &Path) -> PrmResult<(BoxedHeader, Array3<T>)> {
    let obj = ReaderOptions::new().read_file(path)?;
    let header = Box::new(obj.header().clone());
    let data = obj.into_volume().into_ndarray::<T>()?;
    Ok((header, into_zhw(squeeze_time(data))?))
}

/// 按原始数值校验标签, 全部合法后才收窄为 `u8`.
///
/// 非有限值, 非整数以及 `{0..=4}` 之外的值都返回 `PrmError::InvalidLabel`.
fn narrow_labels(data: Array3<f64>) -> PrmResult<Array3<u8>> {
    let max = PRM_EMPT_EMPH as f64;
    let bad = |v: f64| !(v.is_finite() && v.fract() == 0.0 && (0.0..=max).contains(&v));
    if let Some((pos, &value)) = data.indexed_iter().find(|(_, v)| bad(**v)) {
        return Err(PrmError::InvalidLabel { pos, value });
    }
    Ok(data.mapv(|v| v as u8))
}

impl Grid<f32> {
    /// 打开 nii 文件格式的 3D CT 扫描. `path` 为 nii 文件的本地路径.
    pub fn open<P: AsRef<Path>>(path: P) -> PrmResult<Self> {
        let (header, data) = open_nii::<f32>(path.as_ref())?;
        Ok(Self::from_parts(data, Spacing::from_header(&header), Some(header)))
    }
}

impl Grid<bool> {
    /// 打开 nii 文件格式的肺实质掩膜. 体素值 `>= 1` 视为肺实质.
    pub fn open<P: AsRef<Path>>(path: P) -> PrmResult<Self> {
        let (header, data) = open_nii::<f32>(path.as_ref())?;
        let data = data.mapv(|p| p >= 1.0);
        Ok(Self::from_parts(data, Spacing::from_header(&header), Some(header)))
    }
}

/// PRM 标签图, 体素值只能为 `{0, 1, 2, 3, 4}`.
///
/// 由分类器生成, 或由外部直接提供 (构造时校验).
#[derive(Debug, Clone)]
pub struct LabelGrid(Grid<u8>);

impl GridAttr for LabelGrid {
    #[inline]
    fn shape(&self) -> Idx3d {
        self.0.shape()
    }

    #[inline]
    fn spacing(&self) -> Spacing {
        self.0.spacing()
    }

    #[inline]
    fn header(&self) -> Option<&NiftiHeader> {
        self.0.header()
    }
}

impl Index<Idx3d> for LabelGrid {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.0[index]
    }
}

impl LabelGrid {
    /// 校验并包装标签网格. 出现 `{0..=4}` 之外的值时返回 `PrmError::InvalidLabel`,
    /// 其中携带按行优先序遇到的第一个非法体素.
    pub fn new(grid: Grid<u8>) -> PrmResult<Self> {
        if let Some((pos, &value)) = grid.data.indexed_iter().find(|(_, p)| !is_valid(**p)) {
            return Err(PrmError::InvalidLabel {
                pos,
                value: value as f64,
            });
        }
        Ok(Self(grid))
    }

    /// 由分类器使用. 调用方保证数据合法.
    pub(crate) fn new_unchecked(grid: Grid<u8>) -> Self {
        debug_assert!(grid.data.iter().all(|p| is_valid(*p)));
        Self(grid)
    }

    /// 打开标签图. 支持 `.nii`, `.nii.gz` 与 `.npy`.
    ///
    /// nii 数据先按原始数值 (任意存储类型) 校验, 不会因类型转换把非法值变成合法标签.
    /// `.npy` 文件按 `(z, h, w)` 存储 `u8`, 不含体素间距信息, 因此使用 1 毫米间距;
    /// 需要真实间距时请使用 [`Self::open_npy`].
    pub fn open<P: AsRef<Path>>(path: P) -> PrmResult<Self> {
        let path = path.as_ref();
        if path.extension().is_some_and(|e| e == "npy") {
            return Self::open_npy(path, Spacing::UNIT);
        }
        let (header, data) = open_nii::<f64>(path)?;
        let data = narrow_labels(data)?;
        Ok(Self(Grid::from_parts(
            data,
            Spacing::from_header(&header),
            Some(header),
        )))
    }

    /// 打开 `(z, h, w)` 排列的 `u8` npy 标签图, 使用给定的体素间距.
    pub fn open_npy<P: AsRef<Path>>(path: P, spacing: Spacing) -> PrmResult<Self> {
        let data: Array3<u8> = ndarray_npy::read_npy(path.as_ref())?;
        Self::new(Grid::new(data, spacing))
    }

    /// 底层网格.
    #[inline]
    pub fn grid(&self) -> &Grid<u8> {
        &self.0
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, u8> {
        self.0.data()
    }

    /// 获取值为 `label` 的体素个数.
    #[inline]
    pub fn count(&self, label: u8) -> usize {
        self.0.data.iter().filter(|p| **p == label).count()
    }

    /// 获取属于 `class` 的体素个数.
    #[inline]
    pub fn class_count(&self, class: PrmClass) -> usize {
        self.count(class.label())
    }

    /// 由标签本身推出的肺实质: 所有非背景体素.
    pub fn parenchyma(&self) -> ParenchymaMask {
        self.0.map(|p| is_classified(*p))
    }
}

#[cfg(test)]
mod tests {
    use super::{check_geometry, Grid, GridAttr, LabelGrid, Spacing};
    use crate::PrmError;
    use ndarray::Array3;
    use nifti::writer::WriterOptions;
    use nifti::NiftiHeader;

    #[test]
    fn test_spacing_init() {
        assert!(Spacing::new(1.0, 0.7, 0.7).is_some());
        assert!(Spacing::new(0.0, 0.7, 0.7).is_none());
        assert!(Spacing::new(1.0, f64::NAN, 0.7).is_none());

        let s = Spacing::new(2.0, 0.5, 0.25).unwrap();
        assert_eq!(s.voxel(), 0.25);
        assert!(s.approx_eq(&Spacing::new(2.0, 0.5, 0.25 + 1e-9).unwrap()));
        assert!(!s.approx_eq(&Spacing::UNIT));
    }

    #[test]
    fn test_geometry_check() {
        let a = Grid::new(Array3::<f32>::zeros((2, 3, 4)), Spacing::UNIT);
        let b = Grid::new(Array3::<bool>::from_elem((2, 3, 4), true), Spacing::UNIT);
        assert!(check_geometry("insp", &a, "mask", &b).is_ok());

        let c = Grid::new(Array3::<f32>::zeros((2, 4, 3)), Spacing::UNIT);
        let e = check_geometry("insp", &a, "exp", &c).unwrap_err();
        assert!(matches!(
            e,
            PrmError::ShapeMismatch {
                left: "insp",
                right: "exp",
                ..
            }
        ));

        let d = Grid::new(
            Array3::<f32>::zeros((2, 3, 4)),
            Spacing::new(1.0, 1.0, 2.0).unwrap(),
        );
        assert!(check_geometry("insp", &a, "exp", &d).is_err());
    }

    #[test]
    fn test_label_grid_validation() {
        let mut data = Array3::<u8>::zeros((2, 2, 2));
        data[(0, 1, 1)] = 4;
        let labels = LabelGrid::new(Grid::new(data.clone(), Spacing::UNIT)).unwrap();
        assert_eq!(labels.count(4), 1);
        assert_eq!(labels.parenchyma().count(), 1);
        assert_eq!(labels.physical_volume(), 8.0);

        data[(1, 0, 1)] = 7;
        data[(1, 1, 0)] = 9;
        match LabelGrid::new(Grid::new(data, Spacing::UNIT)) {
            Err(PrmError::InvalidLabel { pos, value }) => {
                assert_eq!(pos, (1, 0, 1));
                assert_eq!(value, 7.0);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_npy_label_grid() {
        let dir = std::env::temp_dir().join(format!("prm-berry-npy-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("labels.npy");

        let mut data = Array3::<u8>::zeros((3, 2, 2));
        data[(2, 1, 0)] = 2;
        ndarray_npy::write_npy(&path, &data).unwrap();

        let labels = LabelGrid::open(&path).unwrap();
        assert_eq!(labels.shape(), (3, 2, 2));
        assert_eq!(labels[(2, 1, 0)], 2);
        assert_eq!(labels.spacing(), Spacing::UNIT);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_spacing_from_header_replaces_bad_axes() {
        let mut h = NiftiHeader::default();
        h.pixdim = [1.0, 0.7, 0.0, f32::NAN, 1.0, 1.0, 1.0, 1.0];
        let s = Spacing::from_header(&h);
        assert_eq!(s.z_mm(), 1.0);
        assert_eq!(s.height_mm(), 1.0);
        assert_eq!(s.width_mm(), 0.7f32 as f64);
    }

    #[test]
    fn test_nii_labels_checked_before_narrowing() {
        let dir = std::env::temp_dir().join(format!("prm-berry-nii-labels-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        // 文件中按 (W, H, z) 存储, 读入后为 (z, h, w).
        let mut wide = Array3::<i16>::zeros((2, 2, 2));
        wide[(1, 0, 0)] = 257;
        let path = dir.join("i16.nii");
        WriterOptions::new(&path).write_nifti(&wide).unwrap();
        match LabelGrid::open(&path) {
            Err(PrmError::InvalidLabel { pos, value }) => {
                assert_eq!(pos, (0, 0, 1));
                assert_eq!(value, 257.0);
            }
            r => panic!("257 不应被接受: {r:?}"),
        }

        let mut float = Array3::<f32>::zeros((2, 2, 2));
        float[(0, 0, 1)] = -1.0;
        float[(1, 1, 1)] = 2.6;
        let path = dir.join("f32.nii");
        WriterOptions::new(&path).write_nifti(&float).unwrap();
        match LabelGrid::open(&path) {
            Err(PrmError::InvalidLabel { pos, value }) => {
                assert_eq!(pos, (1, 0, 0));
                assert_eq!(value, -1.0);
            }
            r => panic!("-1.0 不应被接受: {r:?}"),
        }

        float[(0, 0, 1)] = 0.0;
        WriterOptions::new(&path).write_nifti(&float).unwrap();
        match LabelGrid::open(&path) {
            Err(PrmError::InvalidLabel { value, .. }) => assert!((value - 2.6).abs() < 1e-6),
            r => panic!("2.6 不应被接受: {r:?}"),
        }

        // 非 u8 存储的合法标签照常读取.
        float[(1, 1, 1)] = 3.0;
        wide[(1, 0, 0)] = 4;
        WriterOptions::new(&path).write_nifti(&float).unwrap();
        assert_eq!(LabelGrid::open(&path).unwrap()[(1, 1, 1)], 3);
        let path = dir.join("i16.nii");
        WriterOptions::new(&path).write_nifti(&wide).unwrap();
        let labels = LabelGrid::open(&path).unwrap();
        assert_eq!(labels[(0, 0, 1)], 4);
        assert_eq!(labels.count(0), 7);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
