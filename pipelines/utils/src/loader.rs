//! 受试者配置文件的加载器.

use prm_berry::config::SubjectConfig;
use prm_berry::PrmResult;
use std::path::{Path, PathBuf};
use std::{env, fs, io};

/// 获取配置文件目录.
///
/// 1. 若 `arg` 非空, 则返回其值;
/// 2. 否则若环境变量 `$PRM_CONFIG_DIR` 非空, 则返回其值;
/// 3. 否则, 返回当前目录下的 `config`.
pub fn config_dir_from_arg_or_env(arg: Option<&Path>) -> PathBuf {
    match arg {
        Some(p) => p.to_path_buf(),
        None => env::var_os("PRM_CONFIG_DIR")
            .map_or_else(|| PathBuf::from("config"), PathBuf::from),
    }
}

/// 目录 `dir` 下的全部 `*.toml` 文件, 按文件名排序.
pub fn config_files<P: AsRef<Path>>(dir: P) -> io::Result<Vec<PathBuf>> {
    let mut files = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "toml"))
        .collect::<Vec<_>>();
    files.sort();
    Ok(files)
}

/// 逐个读取目录下的配置. 单个配置的错误不影响其他配置.
pub fn config_loader<P: AsRef<Path>>(
    dir: P,
) -> io::Result<impl Iterator<Item = (PathBuf, PrmResult<SubjectConfig>)>> {
    Ok(config_files(dir)?.into_iter().map(|p| {
        let cfg = SubjectConfig::from_file(&p);
        (p, cfg)
    }))
}

#[cfg(test)]
mod tests {
    use super::{config_dir_from_arg_or_env, config_files, config_loader};
    use std::path::Path;

    #[test]
    fn test_sorted_toml_discovery() {
        let dir = std::env::temp_dir().join(format!("prm-utils-loader-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("nested.toml")).unwrap();
        let good = "[subject]\nid = \"a\"\n[io]\nlabel_map = \"a.npy\"\nout_dir = \"out\"\n";
        std::fs::write(dir.join("b.toml"), good.replace("\"a\"", "\"b\"")).unwrap();
        std::fs::write(dir.join("a.toml"), good).unwrap();
        std::fs::write(dir.join("c.toml"), "[subject]\n").unwrap();
        std::fs::write(dir.join("notes.txt"), "").unwrap();

        let files = config_files(&dir).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.toml", "b.toml", "c.toml"]);

        let loaded: Vec<_> = config_loader(&dir).unwrap().collect();
        assert_eq!(loaded[0].1.as_ref().unwrap().id(), "a");
        assert_eq!(loaded[1].1.as_ref().unwrap().id(), "b");
        assert!(loaded[2].1.is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_explicit_dir_wins() {
        assert_eq!(config_dir_from_arg_or_env(Some(Path::new("/x"))), Path::new("/x"));
    }
}
