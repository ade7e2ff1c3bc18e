use std::fmt;
use std::io;
use std::io::Write;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

/// Compilation target level for generated JavaScript.
/// 產生 JavaScript 時採用的目標語法版本。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetVersion {
    Es5,
    Es2015,
    Es2020,
    #[default]
    EsNext,
}

impl TargetVersion {
    pub const ALL: [TargetVersion; 4] = [
        TargetVersion::Es5,
        TargetVersion::Es2015,
        TargetVersion::Es2020,
        TargetVersion::EsNext,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TargetVersion::Es5 => "es5",
            TargetVersion::Es2015 => "es2015",
            TargetVersion::Es2020 => "es2020",
            TargetVersion::EsNext => "esnext",
        }
    }

    /// Parses the wire value (`es5`, `es2015`, `es2020`, `esnext`).
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|version| version.as_str() == value)
    }
}

impl fmt::Display for TargetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Seam to the external transpiler. Pure text-to-text and synchronous;
/// implementations degrade on their own diagnostics instead of failing the
/// caller.
/// 外部轉譯器的介面。純文字對文字且同步；失敗時自行降級，不把錯誤拋給呼叫端。
pub trait Compile {
    fn compile(&self, source: &str, target: TargetVersion) -> String;
}

/// Identity compiler used when no external toolchain is configured: the
/// source is already valid for the target.
/// 未設定外部工具鏈時使用的恆等編譯器。
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCompiler;

impl Compile for PassthroughCompiler {
    fn compile(&self, source: &str, _target: TargetVersion) -> String {
        source.to_string()
    }
}

/// Runs an external transpiler command, feeding the source on stdin and
/// reading the lowered output from stdout. Any spawn or exit failure
/// degrades to the input text.
/// 執行外部轉譯指令：來源文字走標準輸入、結果讀自標準輸出；啟動或結束失敗時
/// 直接回傳原始文字。
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    program: String,
    args: Vec<String>,
    target_flag: String,
}

impl CommandCompiler {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            target_flag: "--target".to_string(),
        }
    }

    /// Appends a fixed argument placed before the target flag.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Overrides the flag used to pass the target version.
    pub fn target_flag(mut self, flag: impl Into<String>) -> Self {
        self.target_flag = flag.into();
        self
    }

    fn run(&self, source: &str, target: TargetVersion) -> io::Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&self.target_flag)
            .arg(target.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(source.as_bytes())?;
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("compiler exited with {}", output.status),
            ));
        }
        String::from_utf8(output.stdout).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "compiler produced non-UTF-8 output",
            )
        })
    }
}

impl Compile for CommandCompiler {
    fn compile(&self, source: &str, target: TargetVersion) -> String {
        match self.run(source, target) {
            Ok(output) => output,
            Err(err) => {
                log::warn!(
                    "external compiler '{}' failed ({err}); passing source through",
                    self.program
                );
                source.to_string()
            }
        }
    }
}
