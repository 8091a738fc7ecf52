//! 运行时错误.

use crate::Idx3d;
use thiserror::Error;

/// 单个受试者处理过程中可能出现的错误.
///
/// 所有错误对 **当前受试者** 都是致命的; 批处理层负责捕获并继续处理其他受试者.
/// 类别体素为空、窗口小于单个 cell 这类退化情况不是错误,
/// 它们产生全零或哨兵值输出.
#[derive(Debug, Error)]
pub enum PrmError {
    /// 两个输入网格的形状或体素间距不一致.
    #[error("`{left}` 与 `{right}` 的几何信息不一致: {detail}")]
    ShapeMismatch {
        /// 第一个输入的名称.
        left: &'static str,
        /// 第二个输入的名称.
        right: &'static str,
        /// 具体差异.
        detail: String,
    },

    /// 标签图中出现了 `{0, 1, 2, 3, 4}` 之外的值.
    #[error("标签图在 {pos:?} 处出现非法标签 `{value}`")]
    InvalidLabel {
        /// 第一个非法体素的位置 `(z, h, w)`.
        pos: Idx3d,
        /// 非法值, 按文件中的原始数值报告.
        value: f64,
    },

    /// 配置缺失或取值非法. 在任何计算开始之前报告.
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 附带受试者编号的错误.
    #[error("受试者 `{id}`: {source}")]
    Subject {
        /// 受试者编号.
        id: String,
        /// 底层错误.
        #[source]
        source: Box<PrmError>,
    },

    /// 读取 nii 文件错误.
    #[error(transparent)]
    Nifti(#[from] nifti::NiftiError),

    /// 读取 npy 文件错误.
    #[error(transparent)]
    Npy(#[from] ndarray_npy::ReadNpyError),

    /// 数组维度不是三维.
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    /// 底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// 保存 png 错误.
    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// 写 csv 错误.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// 解析 toml 配置错误.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl PrmError {
    /// 为错误附加受试者编号. 已经附加过的错误保持不变.
    pub fn for_subject(self, id: &str) -> Self {
        match self {
            e @ PrmError::Subject { .. } => e,
            e => PrmError::Subject {
                id: id.to_owned(),
                source: Box::new(e),
            },
        }
    }
}

/// 流水线运行时结果.
pub type PrmResult<T> = Result<T, PrmError>;

#[cfg(test)]
mod tests {
    use super::PrmError;

    #[test]
    fn test_subject_wrapping_is_idempotent() {
        let e = PrmError::Configuration("缺少 `io.exp`".into()).for_subject("000001");
        let e = e.for_subject("000002");
        match &e {
            PrmError::Subject { id, source } => {
                assert_eq!(id, "000001");
                assert!(matches!(**source, PrmError::Configuration(_)));
            }
            _ => unreachable!(),
        }
        assert!(e.to_string().contains("000001"));
    }
}
