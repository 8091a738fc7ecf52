//! 由 PRM 标签图得到各类别的二值掩膜.

use ndarray::Zip;

use crate::consts::PrmClass;
use crate::{BinaryMask, GridAttr, LabelGrid, ParenchymaMask};

/// `class` 的二值掩膜: `label == class` 且位于肺实质内.
///
/// 形状由调用方保证一致, 否则 panic.
pub fn binary_mask(
    labels: &LabelGrid,
    parenchyma: &ParenchymaMask,
    class: PrmClass,
) -> BinaryMask {
    assert_eq!(labels.shape(), parenchyma.shape(), "标签图与肺实质形状不一致");
    let target = class.label();
    let data = Zip::from(labels.data())
        .and(parenchyma.data())
        .map_collect(|&p, &inside| inside && p == target);
    labels.grid().with_data(data)
}

#[cfg(test)]
mod tests {
    use super::binary_mask;
    use crate::consts::label::PRM_FSAD;
    use crate::consts::PrmClass;
    use crate::{Grid, LabelGrid, Spacing};
    use ndarray::Array3;

    #[test]
    fn test_masks_partition_parenchyma() {
        let data = Array3::from_shape_fn((3, 4, 5), |(z, h, w)| ((z + 2 * h + 3 * w) % 5) as u8);
        let labels = LabelGrid::new(Grid::new(data, Spacing::UNIT)).unwrap();
        let parenchyma = labels.parenchyma();

        let masks = PrmClass::ALL.map(|c| binary_mask(&labels, &parenchyma, c));
        let total: usize = masks.iter().map(|m| m.count()).sum();
        assert_eq!(total, parenchyma.count());
        for (c, m) in PrmClass::ALL.into_iter().zip(masks.iter()) {
            assert_eq!(m.count(), labels.class_count(c));
        }
    }

    #[test]
    fn test_mask_restricted_to_parenchyma() {
        let data = Array3::from_elem((2, 2, 2), PRM_FSAD);
        let labels = LabelGrid::new(Grid::new(data, Spacing::UNIT)).unwrap();
        let mut p = Array3::from_elem((2, 2, 2), true);
        p[(0, 0, 0)] = false;
        let parenchyma = Grid::new(p, Spacing::UNIT);
        let m = binary_mask(&labels, &parenchyma, PrmClass::FSad);
        assert_eq!(m.count(), 7);
        assert!(!m[(0, 0, 0)]);
        assert_eq!(binary_mask(&labels, &parenchyma, PrmClass::Normal).count(), 0);
    }
}
