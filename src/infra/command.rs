//! # Command Execution Module / 命令执行模块
//!
//! Helpers for turning configured command templates into argument vectors and
//! for running external processes while capturing their combined output.
//!
//! 将配置的命令模板转换为参数向量，并在捕获合并输出的同时运行外部进程的工具函数。

use std::fmt;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_stream::wrappers::SplitStream;
use tokio_stream::{Stream, StreamExt};

/// A command line ready to be spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.as_str());
        parts.extend(self.args.iter().map(String::as_str));
        match shlex::try_join(parts.iter().copied()) {
            Ok(joined) => f.write_str(&joined),
            Err(_) => f.write_str(&parts.join(" ")),
        }
    }
}

/// Renders a command template.
///
/// Environment variables and `~` are expanded first, the result is split with
/// shell quoting rules, and `{name}` placeholders are then replaced inside each
/// token, so substituted values never split into several arguments.
/// Unknown placeholders are left untouched.
///
/// 渲染命令模板：先展开环境变量与 `~`，再按 shell 规则拆分，最后在每个片段中替换
/// `{name}` 占位符，因此替换值不会被拆分成多个参数。
///
/// # Errors
/// A message describing why the template could not be expanded or split, or
/// that it produced no program.
pub fn render_command(template: &str, vars: &[(&str, &str)]) -> Result<CommandLine, String> {
    let expanded = shellexpand::full(template)
        .map_err(|e| format!("failed to expand command '{template}': {e}"))?;
    let parts = shlex::split(&expanded)
        .ok_or_else(|| format!("failed to parse command: {expanded}"))?;

    let mut parts = parts.into_iter().map(|part| substitute(&part, vars));
    let program = parts
        .next()
        .ok_or_else(|| "empty command after parsing".to_string())?;
    Ok(CommandLine {
        program,
        args: parts.collect(),
    })
}

fn substitute(token: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(token.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{name}}}"), value)
    })
}

/// Spawns a command, captures its stdout and stderr.
/// The output streams are read concurrently and combined into a single string
/// in arrival order. Bytes that are not valid UTF-8 are replaced, and both
/// pipes are drained to the end so the child never blocks on a full pipe.
///
/// # Arguments
/// * `cmd` - The `tokio::process::Command` to execute.
///
/// # Returns
/// A tuple containing:
/// - The `ExitStatus` of the process wrapped in an `io::Result`.
/// - The combined stdout and stderr as a `String`.
///
/// 派生一个命令，捕获其 stdout 和 stderr。
/// 输出流被并发读取，并按到达顺序合并到一个字符串中。
pub async fn spawn_and_capture(
    mut cmd: tokio::process::Command,
) -> (std::io::Result<ExitStatus>, String) {
    let mut child = match cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return (Err(e), String::new()),
    };

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return (
            Err(std::io::Error::other("failed to capture process output")),
            String::new(),
        );
    };

    let mut merged = lossy_lines(stdout).merge(lossy_lines(stderr));

    let collect = async {
        let mut output = String::new();
        while let Some(line) = merged.next().await {
            output.push_str(&line);
            output.push('\n');
        }
        output
    };

    let (status, output) = tokio::join!(child.wait(), collect);
    (status, output)
}

/// Splits `reader` on newlines without requiring UTF-8. A read error ends the
/// stream.
fn lossy_lines<R>(reader: R) -> impl Stream<Item = String> + Unpin
where
    R: AsyncRead + Unpin,
{
    SplitStream::new(BufReader::new(reader).split(b'\n')).map_while(|segment| match segment {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).trim_end_matches('\r').to_string()),
        Err(e) => {
            tracing::debug!(error = %e, "stopped reading process output");
            None
        }
    })
}

/// Returns the last `max_lines` lines of `output`, for compact error reports.
pub fn tail_lines(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
