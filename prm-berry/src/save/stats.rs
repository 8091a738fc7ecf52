//! 统计汇总的 csv 输出. 每个类别一行.

use serde::Serialize;
use std::io;

use crate::topology::{ClassStats, Summary};
use crate::PrmResult;

#[derive(Serialize)]
struct StatsRow<'a> {
    class: &'a str,
    voxels: usize,
    parenchyma_voxels: usize,
    voxel_fraction: f64,
    global_vol: f64,
    global_surf: f64,
    global_curv: f64,
    global_euler: f64,
    local_vol: Option<f64>,
    local_surf: Option<f64>,
    local_curv: Option<f64>,
    local_euler: Option<f64>,
}

impl<'a> StatsRow<'a> {
    fn new(s: &ClassStats, parenchyma_voxels: usize) -> StatsRow<'a> {
        let [global_vol, global_surf, global_curv, global_euler] = s.global.to_array();
        let local = s.mean_local.map(|f| f.to_array());
        let at = |i: usize| local.map(|l| l[i]);
        StatsRow {
            class: s.class.short_name(),
            voxels: s.voxels,
            parenchyma_voxels,
            voxel_fraction: s.voxel_fraction,
            global_vol,
            global_surf,
            global_curv,
            global_euler,
            local_vol: at(0),
            local_surf: at(1),
            local_curv: at(2),
            local_euler: at(3),
        }
    }
}

/// 把 `summary` 以 csv 格式写进 `w`. 只计算全局泛函时局部列为空.
pub fn write_stats<W: io::Write>(w: W, summary: &Summary) -> PrmResult<()> {
    let mut wtr = csv::Writer::from_writer(w);
    for s in summary.classes.iter() {
        wtr.serialize(StatsRow::new(s, summary.parenchyma_voxels))?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::write_stats;
    use crate::consts::PrmClass;
    use crate::minkowski::Functionals;
    use crate::topology::{ClassStats, Summary};

    fn summary(local: bool) -> Summary {
        let classes = PrmClass::ALL.map(|class| ClassStats {
            class,
            voxels: class.label() as usize,
            voxel_fraction: class.label() as f64 / 10.0,
            global: Functionals::from_array([0.5, 1.0, 2.0, -0.25]),
            mean_local: local.then_some(Functionals::from_array([0.25; 4])),
        });
        Summary {
            parenchyma_voxels: 10,
            classes,
        }
    }

    #[test]
    fn test_row_layout() {
        let mut buf = Vec::new();
        write_stats(&mut buf, &summary(true)).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(
            lines[0],
            "class,voxels,parenchyma_voxels,voxel_fraction,\
             global_vol,global_surf,global_curv,global_euler,\
             local_vol,local_surf,local_curv,local_euler"
        );
        assert_eq!(lines[1], "norm,1,10,0.1,0.5,1.0,2.0,-0.25,0.25,0.25,0.25,0.25");
        assert!(lines[4].starts_with("emptemph,4,10,0.4,"));
    }

    #[test]
    fn test_global_only_leaves_local_columns_empty() {
        let mut buf = Vec::new();
        write_stats(&mut buf, &summary(false)).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().nth(2), Some("fsad,2,10,0.2,0.5,1.0,2.0,-0.25,,,,"));
    }
}
