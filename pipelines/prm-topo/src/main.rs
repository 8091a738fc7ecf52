//! PRM 分类与 Minkowski 拓扑分析的命令行入口.
//!
//! ```text
//! prm-topo --config subject.toml
//! prm-topo --config configs/ --batch
//! ```

mod result;
mod runner;

use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "prm-topo", version, about = "配对吸气/呼气肺部 CT 的 PRM 分类与 Minkowski 拓扑分析")]
struct Args {
    /// 受试者配置文件; 批处理模式下为配置目录 (缺省为 `$PRM_CONFIG_DIR` 或 `./config`).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 批处理目录下的全部 `*.toml` 配置.
    #[arg(short, long)]
    batch: bool,

    /// 并行线程数. 缺省使用全部可用核心.
    #[arg(short, long)]
    jobs: Option<usize>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = simple_logger::SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()
    {
        eprintln!("无法初始化日志: {e}");
    }

    let jobs = args.jobs.unwrap_or_else(utils::cpus).max(1);
    if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(jobs).build_global() {
        log::warn!("无法设置线程池: {e}");
    }

    let result = if args.batch {
        let dir = utils::loader::config_dir_from_arg_or_env(args.config.as_deref());
        log::info!("批处理目录 {}, {jobs} 个线程", dir.display());
        match runner::run_batch(&dir) {
            Ok(r) => r,
            Err(e) => {
                log::error!("无法读取配置目录 {}: {e}", dir.display());
                return ExitCode::FAILURE;
            }
        }
    } else {
        let Some(path) = args.config else {
            log::error!("单个受试者模式需要 `--config <FILE>`");
            return ExitCode::from(2);
        };
        runner::run_single(&path)
    };

    if let Err(e) = result.analyze() {
        log::error!("无法输出运行结果: {e}");
    }
    if result.all_failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
