//! 程序运行函数.

use crate::result::{BatchResult, Record};
use prm_berry::config::SubjectConfig;
use prm_berry::consts::PrmClass;
use prm_berry::pipeline::run_subject;
use prm_berry::PrmResult;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use utils::loader;

/// 处理一个受试者. 错误被记录下来, 不会向上传播.
fn run_one(config: PathBuf, cfg: PrmResult<SubjectConfig>) -> Record {
    let cfg = match cfg {
        Ok(c) => c,
        Err(e) => {
            log::error!("无法读取配置 {}: {e}", config.display());
            return Record {
                config,
                id: None,
                outcome: Err(e.to_string()),
            };
        }
    };

    let id = cfg.id().to_owned();
    log::info!("*****Processing subject {id}*****");
    let start = Instant::now();
    let outcome = match run_subject(&cfg) {
        Ok(summary) => {
            for c in PrmClass::ALL {
                let s = summary.get(c);
                log::info!("{c}: {} 个体素 ({:.4})", s.voxels, s.voxel_fraction);
            }
            Ok(start.elapsed())
        }
        Err(e) => {
            log::error!("{e}");
            Err(e.to_string())
        }
    };
    Record {
        config,
        id: Some(id),
        outcome,
    }
}

/// 处理单个配置文件.
pub fn run_single(path: &Path) -> BatchResult {
    let mut result = BatchResult::default();
    result.push(run_one(path.to_path_buf(), SubjectConfig::from_file(path)));
    result
}

/// 按文件名顺序处理目录下的全部 `*.toml` 配置.
pub fn run_batch(dir: &Path) -> io::Result<BatchResult> {
    let mut result = BatchResult::default();
    let configs = loader::config_loader(dir)?;
    for (path, cfg) in configs {
        result.push(run_one(path, cfg));
    }
    if result.succeeded() + result.failed() == 0 {
        log::warn!("目录 {} 下没有 `*.toml` 配置", dir.display());
    }
    Ok(result)
}
