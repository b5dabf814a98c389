//! Composing the shell invocation for a stored command
//!
//! A command runs as `<interpreter> -c <composed>` where the composed script
//! bootstraps the environment, changes into the project root and then runs the
//! user's script verbatim:
//!
//! ```text
//! export PATH='/opt/homebrew/bin:/usr/local/bin':"$PATH"
//! [ -r '/home/me/.bash_profile' ] && . '/home/me/.bash_profile' 2>/dev/null || true
//! [ -r '/home/me/.bashrc' ] && . '/home/me/.bashrc' 2>/dev/null || true && cd '/srv/demo' && make
//! ```

use command_executor::Command;
use project_store::ShellKind;
use std::path::{Path, PathBuf};

/// Tool directories prepended to `PATH` by default
pub const DEFAULT_PATH_PREFIX: [&str; 2] = ["/opt/homebrew/bin", "/usr/local/bin"];

/// Quote `s` for a POSIX shell.
///
/// The result is wrapped in single quotes, and every `'` inside becomes
/// `'"'"'` (close quote, double-quoted quote, reopen quote).
pub fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', r#"'"'"'"#))
}

/// Environment bootstrap applied before every run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellEnvironment {
    /// Directories prepended to `PATH`, in order
    pub path_prefix: Vec<String>,
    /// Whether to source the shell's profile files
    pub source_profiles: bool,
    /// Directory the profile files live in
    pub home: Option<PathBuf>,
}

impl Default for ShellEnvironment {
    fn default() -> Self {
        Self {
            path_prefix: DEFAULT_PATH_PREFIX.iter().map(|d| d.to_string()).collect(),
            source_profiles: true,
            home: dirs::home_dir(),
        }
    }
}

impl ShellEnvironment {
    /// An environment that changes nothing
    pub fn bare() -> Self {
        Self {
            path_prefix: Vec::new(),
            source_profiles: false,
            home: None,
        }
    }

    /// Bootstrap lines for `shell`. Every line succeeds even when a profile
    /// is missing or fails.
    pub fn bootstrap(&self, shell: ShellKind) -> Vec<String> {
        let mut lines = Vec::new();

        if !self.path_prefix.is_empty() {
            lines.push(format!(
                "export PATH={}:\"$PATH\"",
                shell_escape(&self.path_prefix.join(":"))
            ));
        }

        if let (true, Some(home)) = (self.source_profiles, &self.home) {
            for file in shell.profile_files() {
                let profile = shell_escape(&home.join(file).to_string_lossy());
                lines.push(format!(
                    "[ -r {profile} ] && . {profile} 2>/dev/null || true"
                ));
            }
        }

        lines
    }

    /// The full script: bootstrap, `cd` into `root`, then `script`
    pub fn compose(&self, shell: ShellKind, root: &Path, script: &str) -> String {
        let cd = format!("cd {}", shell_escape(&root.to_string_lossy()));
        let bootstrap = self.bootstrap(shell);

        if bootstrap.is_empty() {
            format!("{cd} && {script}")
        } else {
            format!("{} && {cd} && {script}", bootstrap.join("\n"))
        }
    }

    /// The process to launch for `script` under `shell`
    pub fn invocation(&self, shell: ShellKind, root: &Path, script: &str) -> Command {
        Command::builder(shell.interpreter())
            .arg("-c")
            .arg(self.compose(shell, root, script))
            .build()
    }
}
