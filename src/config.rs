// ABOUTME: Version/banner constants and sandbox configuration

pub const VERSION: &str = "0.1.0";
pub const WELCOME_MESSAGE: &str = "nix-core REPL";
pub const WELCOME_SUBTITLE: &str = "A lazy, pure, functional expression-language interpreter";

pub const NIX_VERSION: &str = "2.18.1-core";
pub const LANG_VERSION: i64 = 6;
pub const STORE_DIR: &str = "/nix/store";

pub const HELP_TEXT: &str = r#"
Available commands:
  :quit or :q          - Exit the REPL
  :help                - Show this help message
  :lex <expr>          - Print the token stream for an expression
  :parse <expr>        - Print the parsed AST for an expression

Type any expression to evaluate it. Use Ctrl-D to exit.
"#;

/// Filesystem sandbox configuration: the single allowed root and a
/// per-file size ceiling for `readFile`/`import`.
#[derive(Debug, Clone)]
pub struct FsConfig {
    pub max_file_size: usize,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self { max_file_size: 64 * 1024 * 1024 }
    }
}

/// Returns `<arch>-<os>` for the host the interpreter is running on, per
/// spec §6, or `"unknown"` if either axis isn't recognised.
pub fn current_system() -> String {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "x86_64",
        "aarch64" => "aarch64",
        "x86" => "i686",
        "arm" => "armv7l",
        "riscv64" => "riscv64",
        _ => return "unknown".to_string(),
    };
    let os = match std::env::consts::OS {
        "linux" => "linux",
        "macos" => "darwin",
        "freebsd" => "freebsd",
        "windows" => "windows",
        _ => return "unknown".to_string(),
    };
    format!("{arch}-{os}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_system_is_nonempty() {
        assert!(!current_system().is_empty());
    }
}
