//! Platform command launching
//!
//! One-shot commands arrive over SSH without a terminal attached, so
//! anything that stops to ask a question hangs forever. Known package
//! managers get their non-interactive flags appended before the command
//! runs; everything else is passed through untouched. This is a
//! convenience for interactive prompts, not a sandbox.

use tokio::process::Command;

/// Builds the platform's shell and one-shot commands
pub trait CommandLauncher: Send + Sync {
    /// Command spawning an interactive shell
    fn shell_command(&self) -> Command;

    /// Command running a one-shot command line through the shell
    fn exec_command(&self, command_line: &str) -> Command;

    /// Rewrite a command line so known package managers cannot prompt
    fn adapt(&self, command_line: &str) -> String;
}

/// Launcher for Unix-like hosts
pub struct PosixLauncher;

impl CommandLauncher for PosixLauncher {
    fn shell_command(&self) -> Command {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        Command::new(shell)
    }

    fn exec_command(&self, command_line: &str) -> Command {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(self.adapt(command_line));
        cmd
    }

    fn adapt(&self, command_line: &str) -> String {
        let trimmed = command_line.trim();
        let mut tokens = trimmed.split_whitespace();
        let (Some(program), Some(verb)) = (tokens.next(), tokens.next()) else {
            return trimmed.to_string();
        };

        let package_managers = ["apt-get", "apt", "yum", "dnf"];
        if package_managers.contains(&program)
            && verb == "install"
            && !trimmed.split_whitespace().any(|t| t == "-y")
        {
            return format!("{} -y", trimmed);
        }

        trimmed.to_string()
    }
}

/// Launcher for Windows hosts
pub struct WindowsLauncher;

const WINGET_FLAGS: &str =
    "--accept-source-agreements --accept-package-agreements --disable-interactivity";

impl CommandLauncher for WindowsLauncher {
    fn shell_command(&self) -> Command {
        Command::new("cmd.exe")
    }

    fn exec_command(&self, command_line: &str) -> Command {
        let mut cmd = Command::new("cmd.exe");
        cmd.arg("/C").arg(self.adapt(command_line));
        cmd
    }

    fn adapt(&self, command_line: &str) -> String {
        let trimmed = command_line.trim();
        let mut tokens = trimmed.split_whitespace();
        let (Some(program), Some(verb)) = (tokens.next(), tokens.next()) else {
            return trimmed.to_string();
        };

        if program.eq_ignore_ascii_case("winget")
            && (verb == "install" || verb == "upgrade")
            && !trimmed.contains("--accept-source-agreements")
        {
            return format!("{} {}", trimmed, WINGET_FLAGS);
        }

        if program.eq_ignore_ascii_case("choco")
            && verb == "install"
            && !trimmed.split_whitespace().any(|t| t == "-y")
        {
            return format!("{} -y", trimmed);
        }

        trimmed.to_string()
    }
}

/// Launcher matching the host platform
pub fn platform_launcher() -> std::sync::Arc<dyn CommandLauncher> {
    if cfg!(windows) {
        std::sync::Arc::new(WindowsLauncher)
    } else {
        std::sync::Arc::new(PosixLauncher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posix_apt_install_gets_assume_yes() {
        let launcher = PosixLauncher;
        assert_eq!(launcher.adapt("apt-get install htop"), "apt-get install htop -y");
        assert_eq!(launcher.adapt("apt install htop"), "apt install htop -y");
        assert_eq!(launcher.adapt("yum install htop"), "yum install htop -y");
        assert_eq!(launcher.adapt("dnf install htop"), "dnf install htop -y");
    }

    #[test]
    fn test_posix_existing_flag_not_duplicated() {
        let launcher = PosixLauncher;
        assert_eq!(
            launcher.adapt("apt-get install -y htop"),
            "apt-get install -y htop"
        );
    }

    #[test]
    fn test_posix_non_install_commands_untouched() {
        let launcher = PosixLauncher;
        assert_eq!(launcher.adapt("apt-get update"), "apt-get update");
        assert_eq!(launcher.adapt("ls -la /tmp"), "ls -la /tmp");
        assert_eq!(launcher.adapt("echo install"), "echo install");
    }

    #[test]
    fn test_posix_empty_and_single_token() {
        let launcher = PosixLauncher;
        assert_eq!(launcher.adapt(""), "");
        assert_eq!(launcher.adapt("   "), "");
        assert_eq!(launcher.adapt("uptime"), "uptime");
    }

    #[test]
    fn test_windows_winget_gets_agreement_flags() {
        let launcher = WindowsLauncher;
        let adapted = launcher.adapt("winget install Git.Git");
        assert!(adapted.starts_with("winget install Git.Git"));
        assert!(adapted.contains("--accept-source-agreements"));
        assert!(adapted.contains("--accept-package-agreements"));
        assert!(adapted.contains("--disable-interactivity"));

        let upgraded = launcher.adapt("winget upgrade Git.Git");
        assert!(upgraded.contains("--accept-source-agreements"));
    }

    #[test]
    fn test_windows_winget_flags_not_duplicated() {
        let launcher = WindowsLauncher;
        let already = format!("winget install Git.Git {}", WINGET_FLAGS);
        assert_eq!(launcher.adapt(&already), already);
    }

    #[test]
    fn test_windows_choco_install_gets_assume_yes() {
        let launcher = WindowsLauncher;
        assert_eq!(launcher.adapt("choco install git"), "choco install git -y");
        assert_eq!(launcher.adapt("choco install -y git"), "choco install -y git");
    }

    #[test]
    fn test_windows_other_commands_untouched() {
        let launcher = WindowsLauncher;
        assert_eq!(launcher.adapt("winget list"), "winget list");
        assert_eq!(launcher.adapt("dir C:\\"), "dir C:\\");
    }
}
