// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Platform package managers.
//!
//! Every supported platform is served by exactly one package manager. The
//! managers differ only in the command lines they need, so they are modeled
//! as a closed set of variants behind one interface: check whether a package
//! is installed, install it, refresh the package index, and remove it again
//! during rollback.

use crate::{
    config::Platform,
    rollback::Uninstall,
    syscall::{Invocation, SyscallError},
};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::{info, instrument};

/// Package manager of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Winget,
    Brew,
    Apt,
    Dnf,
    Pacman,
}

impl PackageManager {
    /// Select package manager serving target platform.
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Windows => Self::Winget,
            Platform::MacOs => Self::Brew,
            Platform::Ubuntu | Platform::Debian => Self::Apt,
            Platform::Fedora => Self::Dnf,
            Platform::Arch => Self::Pacman,
        }
    }

    /// Name of package manager executable.
    pub fn program(&self) -> &'static str {
        match self {
            Self::Winget => "winget",
            Self::Brew => "brew",
            Self::Apt => "apt-get",
            Self::Dnf => "dnf",
            Self::Pacman => "pacman",
        }
    }

    /// Maximum number of installs that may run at once.
    ///
    /// System package managers on Linux hold a global lock for the duration
    /// of an install, so running them side by side only produces lock errors.
    pub fn install_parallelism(&self, jobs: usize) -> usize {
        match self {
            Self::Apt | Self::Dnf | Self::Pacman => 1,
            Self::Winget | Self::Brew => jobs.max(1),
        }
    }

    /// Command line that probes whether package manager is usable.
    pub fn version_invocation(&self) -> Invocation {
        Invocation::new(self.program(), ["--version"])
    }

    /// Command line that exits cleanly only if package is installed.
    pub fn check_invocation(&self, package: &str) -> Invocation {
        match self {
            Self::Winget => Invocation::new(
                "winget",
                ["list", "--id", package, "--exact", "--accept-source-agreements"],
            ),
            Self::Brew => Invocation::new("brew", ["list", package]),
            Self::Apt => Invocation::new("dpkg", ["-s", package]),
            Self::Dnf => Invocation::new("rpm", ["-q", package]),
            Self::Pacman => Invocation::new("pacman", ["-Q", package]),
        }
    }

    /// Command line that installs package.
    pub fn install_invocation(&self, package: &str) -> Invocation {
        match self {
            Self::Winget => Invocation::new(
                "winget",
                [
                    "install",
                    "--id",
                    package,
                    "--exact",
                    "--silent",
                    "--accept-package-agreements",
                    "--accept-source-agreements",
                ],
            ),
            Self::Brew => Invocation::new("brew", ["install", package]),
            Self::Apt => Invocation::new("apt-get", ["install", "-y", package]).elevated(),
            Self::Dnf => Invocation::new("dnf", ["install", "-y", package]).elevated(),
            Self::Pacman => {
                Invocation::new("pacman", ["-S", "--noconfirm", "--needed", package]).elevated()
            }
        }
    }

    /// Command line that removes package.
    pub fn uninstall_invocation(&self, package: &str) -> Invocation {
        match self {
            Self::Winget => {
                Invocation::new("winget", ["uninstall", "--id", package, "--exact", "--silent"])
            }
            Self::Brew => Invocation::new("brew", ["uninstall", package]),
            Self::Apt => Invocation::new("apt-get", ["remove", "-y", package]).elevated(),
            Self::Dnf => Invocation::new("dnf", ["remove", "-y", package]).elevated(),
            Self::Pacman => Invocation::new("pacman", ["-R", "--noconfirm", package]).elevated(),
        }
    }

    /// Command line that refreshes package index.
    pub fn update_invocation(&self) -> Invocation {
        match self {
            Self::Winget => Invocation::new("winget", ["source", "update"]),
            Self::Brew => Invocation::new("brew", ["update"]),
            Self::Apt => Invocation::new("apt-get", ["update"]).elevated(),
            Self::Dnf => Invocation::new("dnf", ["makecache"]).elevated(),
            Self::Pacman => Invocation::new("pacman", ["-Sy"]).elevated(),
        }
    }

    /// Check if package manager can be run at all.
    pub fn is_available(&self) -> bool {
        self.version_invocation().succeeds().unwrap_or(false)
    }

    /// Check if package is installed.
    ///
    /// # Errors
    ///
    /// - Return [`PackageError::Syscall`] if probe cannot be started.
    pub async fn is_installed(&self, package: &str) -> Result<bool> {
        Ok(self.check_invocation(package).succeeds_async().await?)
    }

    /// Install package.
    ///
    /// # Errors
    ///
    /// - Return [`PackageError::Syscall`] if install fails.
    pub async fn install(&self, package: &str) -> Result<()> {
        info!("install {package} with {self}");
        self.install_invocation(package).run_async().await?;
        Ok(())
    }

    /// Refresh package index.
    ///
    /// # Errors
    ///
    /// - Return [`PackageError::Syscall`] if refresh fails.
    #[instrument(level = "debug")]
    pub fn update(&self) -> Result<()> {
        self.update_invocation().run()?;
        Ok(())
    }

    /// Remove package.
    ///
    /// # Errors
    ///
    /// - Return [`PackageError::Syscall`] if removal fails.
    pub fn uninstall(&self, package: &str) -> Result<()> {
        info!("uninstall {package} with {self}");
        self.uninstall_invocation(package).run()?;
        Ok(())
    }
}

impl Display for PackageManager {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Winget => "winget",
            Self::Brew => "brew",
            Self::Apt => "apt",
            Self::Dnf => "dnf",
            Self::Pacman => "pacman",
        })
    }
}

/// Removes packages through the real package managers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemUninstaller;

impl Uninstall for SystemUninstaller {
    fn uninstall(&self, manager: PackageManager, package: &str) -> Result<()> {
        manager.uninstall(package)
    }
}

/// Package manager error types.
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    /// Package manager command failed.
    #[error(transparent)]
    Syscall(#[from] SyscallError),
}

/// Friendly result alias :3
pub type Result<T, E = PackageError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test_case(Platform::Windows, PackageManager::Winget; "windows")]
    #[test_case(Platform::MacOs, PackageManager::Brew; "macos")]
    #[test_case(Platform::Ubuntu, PackageManager::Apt; "ubuntu")]
    #[test_case(Platform::Debian, PackageManager::Apt; "debian")]
    #[test_case(Platform::Fedora, PackageManager::Dnf; "fedora")]
    #[test_case(Platform::Arch, PackageManager::Pacman; "arch")]
    #[test]
    fn manager_for_platform(platform: Platform, expect: PackageManager) {
        pretty_assertions::assert_eq!(PackageManager::for_platform(platform), expect);
    }

    #[test_case(PackageManager::Brew, "brew install ripgrep"; "brew")]
    #[test_case(PackageManager::Apt, "sudo apt-get install -y ripgrep"; "apt")]
    #[test_case(PackageManager::Dnf, "sudo dnf install -y ripgrep"; "dnf")]
    #[test_case(PackageManager::Pacman, "sudo pacman -S --noconfirm --needed ripgrep"; "pacman")]
    #[test_case(
        PackageManager::Winget,
        "winget install --id ripgrep --exact --silent --accept-package-agreements --accept-source-agreements";
        "winget"
    )]
    #[test]
    fn install_command_lines(manager: PackageManager, expect: &str) {
        pretty_assertions::assert_eq!(manager.install_invocation("ripgrep").to_string(), expect);
    }

    #[test_case(PackageManager::Brew, "brew uninstall ripgrep"; "brew")]
    #[test_case(PackageManager::Apt, "sudo apt-get remove -y ripgrep"; "apt")]
    #[test_case(PackageManager::Winget, "winget uninstall --id ripgrep --exact --silent"; "winget")]
    #[test]
    fn uninstall_command_lines(manager: PackageManager, expect: &str) {
        pretty_assertions::assert_eq!(manager.uninstall_invocation("ripgrep").to_string(), expect);
    }

    #[test]
    fn linux_managers_install_one_at_a_time() {
        assert_eq!(PackageManager::Apt.install_parallelism(8), 1);
        assert_eq!(PackageManager::Pacman.install_parallelism(8), 1);
        assert_eq!(PackageManager::Brew.install_parallelism(8), 8);
        assert_eq!(PackageManager::Winget.install_parallelism(0), 1);
    }

    #[test]
    fn managers_serialize_by_name() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_string(&PackageManager::Apt)?, r#""apt""#);
        let result: PackageManager = serde_json::from_str(r#""winget""#)?;
        assert_eq!(result, PackageManager::Winget);

        Ok(())
    }
}
