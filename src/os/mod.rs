//! OS variants and the polymorphic `OperatingSystem` contract.
//!
//! The deep vendor trees real distros form (Fedora -> Red Hat ->
//! CentOS/Oracle) are flattened into one tagged variant set; shared
//! behavior lives in the per-family strategy modules under
//! [`crate::pkg`] and is selected by dispatch here, not by
//! inheritance.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Capability, HostError, Result};
use crate::pkg::{
    ADD_REPOSITORY_RETRY, INDEX_REFRESH_RETRY, INSTALL_RETRY, InstallOptions, Installable,
    PackageFamily, RepositoryInfo, Retry, RpmTool, apt, rpm, zypper,
};
use crate::remote::{Connection, ExecuteOptions, FileTransfer};
use crate::version::VersionInfo;

pub mod classify;
pub mod information;
pub mod registry;

pub use classify::classify;
pub use information::{KernelInformation, OsInformation};

/// Flat set of supported OS variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsKind {
    Windows,
    // BSD branch
    FreeBSD,
    OpenBSD,
    MacOS,
    // Linux branch
    Linux,
    CoreOS,
    Debian,
    Ubuntu,
    Fedora,
    RedHat,
    CentOS,
    Oracle,
    CBLMariner,
    Suse,
    SLES,
    NixOS,
    OtherLinux,
}

impl OsKind {
    pub fn name(&self) -> &'static str {
        match self {
            OsKind::Windows => "Windows",
            OsKind::FreeBSD => "FreeBSD",
            OsKind::OpenBSD => "OpenBSD",
            OsKind::MacOS => "macOS",
            OsKind::Linux => "Linux",
            OsKind::CoreOS => "CoreOS",
            OsKind::Debian => "Debian",
            OsKind::Ubuntu => "Ubuntu",
            OsKind::Fedora => "Fedora",
            OsKind::RedHat => "Red Hat",
            OsKind::CentOS => "CentOS",
            OsKind::Oracle => "Oracle Linux",
            OsKind::CBLMariner => "CBL-Mariner",
            OsKind::Suse => "SUSE",
            OsKind::SLES => "SLES",
            OsKind::NixOS => "NixOS",
            OsKind::OtherLinux => "Other Linux",
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, OsKind::Windows)
    }

    pub fn is_posix(&self) -> bool {
        !self.is_windows()
    }

    pub fn is_bsd(&self) -> bool {
        matches!(self, OsKind::FreeBSD | OsKind::OpenBSD | OsKind::MacOS)
    }

    pub fn is_linux(&self) -> bool {
        self.is_posix() && !self.is_bsd()
    }

    pub fn is_debian_based(&self) -> bool {
        matches!(self, OsKind::Debian | OsKind::Ubuntu)
    }

    /// The dnf/yum lineage, Fedora included.
    pub fn is_fedora_based(&self) -> bool {
        matches!(
            self,
            OsKind::Fedora | OsKind::RedHat | OsKind::CentOS | OsKind::Oracle
        )
    }

    pub fn is_redhat_based(&self) -> bool {
        matches!(self, OsKind::RedHat | OsKind::CentOS | OsKind::Oracle)
    }

    pub fn is_suse_based(&self) -> bool {
        matches!(self, OsKind::Suse | OsKind::SLES)
    }

    /// Native package-manager family, `None` for variants without a
    /// supported one.
    pub fn package_family(&self) -> Option<PackageFamily> {
        if self.is_debian_based() {
            Some(PackageFamily::Apt)
        } else if self.is_fedora_based() || matches!(self, OsKind::CBLMariner) {
            Some(PackageFamily::Rpm)
        } else if self.is_suse_based() {
            Some(PackageFamily::Zypper)
        } else {
            None
        }
    }
}

impl std::fmt::Display for OsKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Options for [`OperatingSystem::add_repository`].
#[derive(Debug, Clone)]
pub struct AddRepositoryOptions {
    pub no_gpgcheck: bool,
    /// Repository alias, required by zypper.
    pub repo_name: Option<String>,
    /// Signing keys to import before adding the repository (apt only).
    pub key_urls: Vec<String>,
}

impl Default for AddRepositoryOptions {
    fn default() -> Self {
        Self {
            no_gpgcheck: true,
            repo_name: None,
            key_urls: Vec::new(),
        }
    }
}

// menuentry 'Ubuntu, with Linux 5.11.0-1011-azure' --class ubuntu ...
//   $menuentry_id_option 'gnulinux-5.11.0-1011-azure-advanced-3fdd...' {
static GRUB_MENU_ENTRY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^.*?menuentry '(?P<title>[^']*)'.*?\$menuentry_id_option '(?P<menu_id>[^']*)'.*$")
        .unwrap()
});

// gnulinux-5.11.0-1011-azure-advanced-3fdd2548-1430-450b-b16d-9191404598fb
// prefix: gnulinux
// postfix: advanced-3fdd2548-1430-450b-b16d-9191404598fb
static GRUB_MENU_ID_PARTS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<prefix>.*?)-.*-(?P<postfix>.*?-.*?-.*?-.*?-.*?-.*?)?$").unwrap()
});

/// One classified host: exactly one connection, one fixed variant, and
/// the instance-local caches (resolved information, per-package
/// versions, the one-shot package-index initialization flag).
///
/// Instances come from [`classify`] and live as long as their
/// connection. Methods take `&mut self`; the caches are not
/// synchronized, so an instance must not be shared across threads.
impl std::fmt::Debug for OperatingSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatingSystem")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

pub struct OperatingSystem {
    conn: Box<dyn Connection>,
    kind: OsKind,
    information: Option<OsInformation>,
    package_versions: HashMap<String, VersionInfo>,
    first_time_installation: bool,
    mariner_tool: Option<RpmTool>,
    index_retry: Retry,
    install_retry: Retry,
    add_repository_retry: Retry,
}

impl OperatingSystem {
    /// Wrap a connection in an already-decided variant. [`classify`]
    /// is the normal entry point; this exists for callers that already
    /// know what they are talking to.
    pub fn new(conn: Box<dyn Connection>, kind: OsKind) -> Self {
        Self {
            conn,
            kind,
            information: None,
            package_versions: HashMap::new(),
            first_time_installation: true,
            mariner_tool: None,
            index_retry: INDEX_REFRESH_RETRY,
            install_retry: INSTALL_RETRY,
            add_repository_retry: ADD_REPOSITORY_RETRY,
        }
    }

    /// Override the retry schedules. Mostly useful in tests where the
    /// default delays are an eternity.
    pub fn with_retry_policies(mut self, index: Retry, install: Retry, add_repository: Retry) -> Self {
        self.index_retry = index;
        self.install_retry = install;
        self.add_repository_retry = add_repository;
        self
    }

    pub fn kind(&self) -> OsKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn is_posix(&self) -> bool {
        self.kind.is_posix()
    }

    pub fn is_windows(&self) -> bool {
        self.kind.is_windows()
    }

    /// Whether this variant implements a capability. Calling an
    /// unsupported capability fails with `CapabilityNotImplemented`;
    /// checking here first avoids error-driven control flow.
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Information => true,
            Capability::KernelInformation | Capability::CaptureSystemInformation => {
                self.kind.is_posix()
            }
            Capability::InstallPackages
            | Capability::UpdatePackages
            | Capability::PackageExists
            | Capability::PackageInRepo
            | Capability::Repositories
            | Capability::AddRepository => self.kind.package_family().is_some(),
            Capability::PackageInformation => matches!(
                self.kind.package_family(),
                Some(PackageFamily::Apt | PackageFamily::Rpm)
            ),
            Capability::GroupInstall => self.kind.is_redhat_based(),
            Capability::ReplaceBootKernel => {
                self.kind == OsKind::Ubuntu || self.kind.is_redhat_based()
            }
        }
    }

    fn not_implemented(&self, capability: Capability) -> HostError {
        HostError::CapabilityNotImplemented {
            capability,
            os: self.kind.name(),
        }
    }

    /// Distro identity, resolved on first access and memoized for the
    /// lifetime of the instance.
    pub fn information(&mut self) -> Result<OsInformation> {
        if let Some(information) = &self.information {
            return Ok(information.clone());
        }
        let information = self.fetch_information()?;
        self.information = Some(information.clone());
        Ok(information)
    }

    fn fetch_information(&self) -> Result<OsInformation> {
        let conn = self.conn.as_ref();
        match self.kind {
            OsKind::Windows => information::fetch_windows(conn),
            OsKind::Debian => information::fetch_debian(conn),
            OsKind::Ubuntu => information::fetch_ubuntu(conn),
            OsKind::Fedora => information::fetch_fedora(conn),
            kind if kind.is_redhat_based() => information::fetch_redhat(conn),
            _ => information::fetch_generic_posix(conn),
        }
    }

    pub fn kernel_information(&mut self) -> Result<KernelInformation> {
        if !self.kind.is_posix() {
            return Err(self.not_implemented(Capability::KernelInformation));
        }
        let mut kernel = information::fetch_kernel_information(self.conn.as_ref())?;
        if self.kind.is_fedora_based() {
            kernel.version_parts = information::decompose_kernel_trailer(&kernel.version_parts)?;
        }
        Ok(kernel)
    }

    fn resolve_packages<P: Installable + ?Sized>(&self, packages: &[&P]) -> Vec<String> {
        packages.iter().map(|p| p.package_name()).collect()
    }

    /// Run the one-time package-index initialization if it has not run
    /// yet. The flag flips before the work happens, so a failing first
    /// operation does not re-trigger initialization forever.
    fn ensure_initialized(&mut self) -> Result<()> {
        if self.first_time_installation {
            self.first_time_installation = false;
            self.initialize_package_index()?;
        }
        Ok(())
    }

    fn initialize_package_index(&mut self) -> Result<()> {
        match self.kind.package_family() {
            Some(PackageFamily::Apt) => {
                let retry = self.index_retry;
                retry.run(|| apt::update_index(self.conn.as_ref()))
            }
            Some(PackageFamily::Rpm) => self.initialize_rpm_index(),
            Some(PackageFamily::Zypper) => zypper::refresh_index(self.conn.as_ref()),
            None => Ok(()),
        }
    }

    fn initialize_rpm_index(&mut self) -> Result<()> {
        match self.kind {
            OsKind::RedHat | OsKind::Oracle => {
                let information = self.information()?;
                // out-of-date rhui packages break every subsequent yum
                // run on marketplace images; refresh them from the
                // trusted vendor repo first
                if information.vendor == "Red Hat" {
                    let retry = self.index_retry;
                    return retry.run(|| {
                        let result = self.conn.execute(
                            "yum update -y --disablerepo='*' --enablerepo='*microsoft*'",
                            &ExecuteOptions::new().shell().sudo(),
                        )?;
                        result.assert_exit_code("failed to refresh trusted repo packages")
                    });
                }
                Ok(())
            }
            OsKind::CentOS => {
                let information = self.information()?;
                // CentOS 8 is EOL and its mirrors moved to the vault;
                // stale repo files would fail every install without
                // skip_if_unavailable
                if information.version.major == 8 {
                    let repolist = self.conn.execute(
                        "yum repolist -v",
                        &ExecuteOptions::new().shell().sudo().quiet(),
                    )?;
                    if !repolist.succeeded() {
                        self.conn.execute(
                            "yum-config-manager --save --setopt=skip_if_unavailable=true",
                            &ExecuteOptions::new().shell().sudo(),
                        )?;
                    }
                }
                Ok(())
            }
            OsKind::CBLMariner => {
                self.rpm_tool()?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn rpm_tool(&mut self) -> Result<RpmTool> {
        match self.kind {
            OsKind::Fedora => Ok(RpmTool::Dnf),
            OsKind::RedHat | OsKind::CentOS | OsKind::Oracle => Ok(RpmTool::Yum),
            OsKind::CBLMariner => {
                if let Some(tool) = self.mariner_tool {
                    return Ok(tool);
                }
                let tool = rpm::resolve_mariner_tool(self.conn.as_ref())?;
                self.mariner_tool = Some(tool);
                Ok(tool)
            }
            _ => Ok(RpmTool::Dnf),
        }
    }

    /// Install packages through the variant's native package manager.
    ///
    /// Accepts anything [`Installable`]: plain names, unit values, or
    /// local `.deb` paths on the Debian family.
    pub fn install_packages<P: Installable + ?Sized>(
        &mut self,
        packages: &[&P],
        options: InstallOptions,
    ) -> Result<()> {
        let names = self.resolve_packages(packages);
        self.ensure_initialized()?;
        match self.kind.package_family() {
            Some(PackageFamily::Apt) => {
                let retry = self.install_retry;
                retry.run(|| apt::install(self.conn.as_ref(), &names, &options))
            }
            Some(PackageFamily::Rpm) => {
                let tool = self.rpm_tool()?;
                rpm::install(self.conn.as_ref(), tool, &names, &options)
            }
            Some(PackageFamily::Zypper) => zypper::install(self.conn.as_ref(), &names, &options),
            None => Err(self.not_implemented(Capability::InstallPackages)),
        }
    }

    /// Upgrade the given packages, or everything when the list is
    /// empty.
    pub fn update_packages<P: Installable + ?Sized>(&mut self, packages: &[&P]) -> Result<()> {
        let names = self.resolve_packages(packages);
        self.ensure_initialized()?;
        match self.kind.package_family() {
            Some(PackageFamily::Apt) => apt::update(self.conn.as_ref(), &names),
            Some(PackageFamily::Rpm) => {
                let tool = self.rpm_tool()?;
                rpm::update(self.conn.as_ref(), tool, &names)
            }
            Some(PackageFamily::Zypper) => zypper::update(self.conn.as_ref(), &names),
            None => Err(self.not_implemented(Capability::UpdatePackages)),
        }
    }

    /// Whether a package is currently installed on the host.
    pub fn package_exists<P: Installable + ?Sized>(&mut self, package: &P) -> Result<bool> {
        let name = package.package_name();
        self.ensure_initialized()?;
        match self.kind.package_family() {
            Some(PackageFamily::Apt) => apt::package_exists(self.conn.as_ref(), &name),
            Some(PackageFamily::Rpm) => {
                let tool = self.rpm_tool()?;
                rpm::package_exists(self.conn.as_ref(), tool, &name)
            }
            Some(PackageFamily::Zypper) => zypper::package_exists(self.conn.as_ref(), &name),
            None => Err(self.not_implemented(Capability::PackageExists)),
        }
    }

    /// Whether a package is available from the configured
    /// repositories.
    pub fn is_package_in_repo<P: Installable + ?Sized>(&mut self, package: &P) -> Result<bool> {
        let name = package.package_name();
        self.ensure_initialized()?;
        match self.kind.package_family() {
            Some(PackageFamily::Apt) => apt::is_package_in_repo(self.conn.as_ref(), &name),
            Some(PackageFamily::Rpm) => {
                let tool = self.rpm_tool()?;
                rpm::is_package_in_repo(self.conn.as_ref(), tool, &name)
            }
            Some(PackageFamily::Zypper) => zypper::is_package_in_repo(self.conn.as_ref(), &name),
            None => Err(self.not_implemented(Capability::PackageInRepo)),
        }
    }

    /// Installed version of a package, memoized per package name.
    /// `use_cached = false` forces a fresh query and refreshes the
    /// cache.
    pub fn package_information(&mut self, package_name: &str, use_cached: bool) -> Result<VersionInfo> {
        if use_cached {
            if let Some(found) = self.package_versions.get(package_name) {
                return Ok(found.clone());
            }
        }
        let version = match self.kind.package_family() {
            Some(PackageFamily::Apt) => apt::package_information(self.conn.as_ref(), package_name)?,
            Some(PackageFamily::Rpm) => rpm::package_information(self.conn.as_ref(), package_name)?,
            _ => return Err(self.not_implemented(Capability::PackageInformation)),
        };
        self.package_versions
            .insert(package_name.to_string(), version.clone());
        Ok(version)
    }

    /// Configured repositories as a fresh list; never cached.
    pub fn repositories(&mut self) -> Result<Vec<RepositoryInfo>> {
        match self.kind.package_family() {
            Some(PackageFamily::Apt) => {
                // listing goes through apt-get update, so make sure the
                // index machinery is sane first
                self.initialize_package_index()?;
                apt::repositories(self.conn.as_ref())
            }
            Some(PackageFamily::Rpm) => {
                let tool = self.rpm_tool()?;
                rpm::repositories(self.conn.as_ref(), tool)
            }
            Some(PackageFamily::Zypper) => {
                zypper::refresh_index(self.conn.as_ref())?;
                zypper::repositories(self.conn.as_ref())
            }
            None => Err(self.not_implemented(Capability::Repositories)),
        }
    }

    /// Register an extra package repository with the native manager.
    pub fn add_repository(&mut self, repo: &str, options: AddRepositoryOptions) -> Result<()> {
        match self.kind.package_family() {
            Some(PackageFamily::Apt) => {
                let retry = self.add_repository_retry;
                let working_path = self.conn.working_path();
                retry.run(|| {
                    apt::add_repository(self.conn.as_ref(), repo, &options.key_urls, &working_path)
                })
            }
            Some(PackageFamily::Rpm) => {
                rpm::add_repository(self.conn.as_ref(), repo, options.no_gpgcheck)
            }
            Some(PackageFamily::Zypper) => zypper::add_repository(
                self.conn.as_ref(),
                repo,
                options.repo_name.as_deref().unwrap_or(""),
                options.no_gpgcheck,
            ),
            None => Err(self.not_implemented(Capability::AddRepository)),
        }
    }

    /// Install a yum package group, e.g. "Development Tools". Red Hat
    /// branch only.
    pub fn group_install_packages(&mut self, group_name: &str) -> Result<()> {
        if !self.kind.is_redhat_based() {
            return Err(self.not_implemented(Capability::GroupInstall));
        }
        self.ensure_initialized()?;
        rpm::group_install(self.conn.as_ref(), group_name)
    }

    /// Download a package file from a URL into the connection's
    /// working directory, then install it like a local package.
    pub fn install_package_from_url(
        &mut self,
        package_url: &str,
        package_name: Option<&str>,
        options: InstallOptions,
    ) -> Result<()> {
        let file_name = package_name
            .map(str::to_string)
            .unwrap_or_else(|| {
                package_url
                    .rsplit('/')
                    .next()
                    .unwrap_or(package_url)
                    .to_string()
            });
        let destination = format!("{}/{}", self.conn.working_path(), file_name);
        let wget = self.conn.execute(
            &format!("wget {} -O {}", package_url, destination),
            &ExecuteOptions::new().shell(),
        )?;
        wget.assert_exit_code(format!("failed to download {}", package_url))?;
        self.install_packages(&[destination.as_str()], options)
    }

    /// Capture a diagnostic snapshot of the host into `saved_path`:
    /// kernel identity, uptime, the hv_netvsc module state and the
    /// release files. Missing sources are skipped, not fatal.
    pub fn capture_system_information(
        &mut self,
        files: &dyn FileTransfer,
        saved_path: &Path,
    ) -> Result<()> {
        if !self.kind.is_posix() {
            return Err(self.not_implemented(Capability::CaptureSystemInformation));
        }
        std::fs::create_dir_all(saved_path)?;

        self.save_command_output("uname -vrio", &saved_path.join("uname.txt"))?;
        self.save_command_output(
            "uptime -s || last reboot -F | head -1 | awk '{print $9,$6,$7,$8}'",
            &saved_path.join("uptime.txt"),
        )?;
        self.save_command_output("modinfo hv_netvsc", &saved_path.join("modinfo-hv_netvsc.txt"))?;

        // release files are copied back verbatim; absent ones are fine
        let _ = files.copy_back("/etc/os-release", &saved_path.join("os-release.txt"));
        if self.kind.is_redhat_based() {
            let _ = files.copy_back("/etc/redhat-release", &saved_path.join("redhat-release.txt"));
        }
        if self.kind == OsKind::CentOS {
            let _ = files.copy_back("/etc/centos-release", &saved_path.join("centos-release.txt"));
        }
        Ok(())
    }

    fn save_command_output(&self, command: &str, path: &Path) -> Result<()> {
        let result = self
            .conn
            .execute(command, &ExecuteOptions::new().shell().quiet())?;
        std::fs::write(path, result.stdout)?;
        Ok(())
    }

    /// Make an installed kernel the default boot entry.
    ///
    /// On Ubuntu this rewrites the grub default to the matching
    /// non-recovery menu entry and refreshes grub. On the Red Hat
    /// branch installing the kernel RPM already updated the boot
    /// entry, so this is a no-op.
    pub fn replace_boot_kernel(&mut self, kernel_version: &str) -> Result<()> {
        match self.kind {
            OsKind::Ubuntu => self.replace_ubuntu_boot_kernel(kernel_version),
            kind if kind.is_redhat_based() => Ok(()),
            _ => Err(self.not_implemented(Capability::ReplaceBootKernel)),
        }
    }

    fn replace_ubuntu_boot_kernel(&mut self, kernel_version: &str) -> Result<()> {
        let grub = self.conn.execute(
            "cat /boot/grub/grub.cfg",
            &ExecuteOptions::new().shell().sudo(),
        )?;
        grub.assert_exit_code("error reading grub config")?;

        let submenu_id = GRUB_MENU_ENTRY_PATTERN
            .captures_iter(&grub.stdout)
            .filter(|captures| {
                let title = captures.name("title").map_or("", |m| m.as_str());
                title.contains(kernel_version) && !title.contains("(recovery mode)")
            })
            .filter_map(|captures| captures.name("menu_id").map(|m| m.as_str().to_string()))
            .next()
            .ok_or_else(|| HostError::ParseError {
                text: kernel_version.to_string(),
                expected: "grub menu entry for kernel",
            })?;

        // first-level menu id: drop the kernel-specific middle part
        // gnulinux-5.11.0-1011-azure-advanced-<uuid> ->
        // gnulinux-advanced-<uuid>
        let menu_id = GRUB_MENU_ID_PARTS_PATTERN
            .replace(&submenu_id, "$prefix-$postfix")
            .into_owned();
        if menu_id.is_empty() {
            return Err(HostError::ParseError {
                text: submenu_id,
                expected: "grub menu id",
            });
        }

        let menu_entry = format!("{}>{}", menu_id, submenu_id);
        let sed = self.conn.execute(
            &format!(
                "sed -i -E \"s|GRUB_DEFAULT=.*|GRUB_DEFAULT='{}'|\" /etc/default/grub",
                menu_entry
            ),
            &ExecuteOptions::new().shell().sudo(),
        )?;
        sed.assert_exit_code("failed to set default grub entry")?;

        let update_grub = self
            .conn
            .execute("update-grub", &ExecuteOptions::new().shell().sudo())?;
        update_grub.assert_exit_code("failed to update grub")?;

        // matching tool/header packages, best effort: a missing flavor
        // package must not fail the kernel switch
        let tool_packages = [
            format!("linux-tools-{}", kernel_version),
            format!("linux-cloud-tools-{}", kernel_version),
            format!("linux-headers-{}", kernel_version),
        ];
        let refs: Vec<&str> = tool_packages.iter().map(String::as_str).collect();
        let _ = self.install_packages(&refs, InstallOptions::new());
        Ok(())
    }
}
