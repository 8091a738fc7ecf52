//! 批处理结果.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

/// 单个受试者的运行记录.
#[derive(Debug)]
pub struct Record {
    /// 配置文件路径.
    pub config: PathBuf,

    /// 受试者编号. 配置无法读取时为 `None`.
    pub id: Option<String>,

    /// 成功时为耗时, 失败时为错误信息.
    pub outcome: Result<Duration, String>,
}

/// 将 `r` 的结果写进 `w` 中.
fn describe_into<W: Write>(r: &Record, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    writeln!(w, "Subject `{}`:", r.id.as_deref().unwrap_or("/"))?;
    writeln!(w, "{S4}Config: {}", r.config.display())?;
    match &r.outcome {
        Ok(d) => write!(w, "{S4}Succeeded in {:.3} s", d.as_secs_f64()),
        Err(e) => write!(w, "{S4}Failed: {e}"),
    }
}

/// 批处理最终结果.
#[derive(Debug, Default)]
pub struct BatchResult {
    records: Vec<Record>,
}

impl BatchResult {
    /// 追加一条记录.
    pub fn push(&mut self, r: Record) {
        self.records.push(r);
    }

    /// 成功的受试者数.
    pub fn succeeded(&self) -> usize {
        self.records.iter().filter(|r| r.outcome.is_ok()).count()
    }

    /// 失败的受试者数.
    pub fn failed(&self) -> usize {
        self.records.len() - self.succeeded()
    }

    /// 是否有受试者, 且全部失败?
    pub fn all_failed(&self) -> bool {
        !self.records.is_empty() && self.succeeded() == 0
    }

    /// 把全部记录与汇总写进 `w` 中, 记录之间以分隔线隔开.
    pub fn write_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        utils::sep_to(&mut *w)?;
        for r in self.records.iter() {
            describe_into(r, w)?;
            writeln!(w)?;
            utils::sep_to(&mut *w)?;
        }
        writeln!(
            w,
            "{} subject(s): {} succeeded, {} failed",
            self.records.len(),
            self.succeeded(),
            self.failed()
        )
    }

    /// 打印运行结果.
    pub fn analyze(&self) -> io::Result<()> {
        let stdout = io::stdout();
        self.write_into(&mut stdout.lock())
    }
}
