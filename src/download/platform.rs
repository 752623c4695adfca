//! Platform detection and artifact selection

use std::fmt;

use log::{info, warn};
use once_cell::sync::OnceCell;

use crate::release::Artifact;

/// Operating system, named the way release artifacts usually name it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    Darwin,
    Windows,
    FreeBsd,
    OpenBsd,
    NetBsd,
    /// No alias table; matched by raw name
    Other(String),
}

/// CPU architecture, named the way release artifacts usually name it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Arch {
    Amd64,
    I386,
    Arm,
    Arm64,
    Mips,
    Mipsle,
    Mips64,
    Mips64le,
    Ppc64,
    Ppc64le,
    S390x,
    /// No alias table; matched by raw name
    Other(String),
}

impl Os {
    /// Map a Rust `target_os` value
    pub fn from_target(os: &str) -> Self {
        match os {
            "linux" | "android" => Os::Linux,
            "macos" | "ios" => Os::Darwin,
            "windows" => Os::Windows,
            "freebsd" => Os::FreeBsd,
            "openbsd" => Os::OpenBsd,
            "netbsd" => Os::NetBsd,
            other => Os::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Os::Linux => "linux",
            Os::Darwin => "darwin",
            Os::Windows => "windows",
            Os::FreeBsd => "freebsd",
            Os::OpenBsd => "openbsd",
            Os::NetBsd => "netbsd",
            Os::Other(name) => name,
        }
    }

    fn aliases(&self) -> Option<&'static [&'static str]> {
        match self {
            Os::Linux => Some(&["linux", "gnu", "gnulinux"]),
            Os::Darwin => Some(&["darwin", "mac", "osx"]),
            Os::Windows => Some(&["windows", "win"]),
            Os::FreeBsd => Some(&["freebsd", "bsd"]),
            Os::OpenBsd => Some(&["openbsd", "bsd"]),
            Os::NetBsd => Some(&["netbsd", "bsd"]),
            Os::Other(_) => None,
        }
    }
}

impl Arch {
    /// Map a Rust `target_arch` value; `little_endian` picks the le variants
    pub fn from_target(arch: &str, little_endian: bool) -> Self {
        match (arch, little_endian) {
            ("x86_64", _) => Arch::Amd64,
            ("x86", _) => Arch::I386,
            ("arm", _) => Arch::Arm,
            ("aarch64", _) => Arch::Arm64,
            ("mips", true) => Arch::Mipsle,
            ("mips", false) => Arch::Mips,
            ("mips64", true) => Arch::Mips64le,
            ("mips64", false) => Arch::Mips64,
            ("powerpc64", true) => Arch::Ppc64le,
            ("powerpc64", false) => Arch::Ppc64,
            ("s390x", _) => Arch::S390x,
            (other, _) => Arch::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::I386 => "386",
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
            Arch::Mips => "mips",
            Arch::Mipsle => "mipsle",
            Arch::Mips64 => "mips64",
            Arch::Mips64le => "mips64le",
            Arch::Ppc64 => "ppc64",
            Arch::Ppc64le => "ppc64le",
            Arch::S390x => "s390x",
            Arch::Other(name) => name,
        }
    }

    fn aliases(&self) -> Option<&'static [&'static str]> {
        match self {
            Arch::Amd64 => Some(&["amd64", "x86_64", "64bit"]),
            Arch::I386 => Some(&["386", "i386", "x86", "32bit"]),
            Arch::Arm => Some(&["arm", "armv5", "armv6", "armv7"]),
            Arch::Arm64 => Some(&["arm64", "aarch64"]),
            Arch::Mips => Some(&["mips"]),
            Arch::Mipsle => Some(&["mipsle", "mips32le"]),
            Arch::Mips64 => Some(&["mips64"]),
            Arch::Mips64le => Some(&["mips64le"]),
            Arch::Ppc64 => Some(&["ppc64", "powerpc64"]),
            Arch::Ppc64le => Some(&["ppc64le", "powerpc64le"]),
            Arch::S390x => Some(&["s390x", "s390"]),
            Arch::Other(_) => None,
        }
    }
}

/// (operating system, CPU architecture) pair used to pick artifacts
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlatformKey {
    pub os: Os,
    pub arch: Arch,
}

/// Global cache for platform detection (initialized once, used everywhere)
static PLATFORM_CACHE: OnceCell<PlatformKey> = OnceCell::new();

impl PlatformKey {
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Platform of the running process (cached after first call)
    pub fn current() -> &'static PlatformKey {
        PLATFORM_CACHE.get_or_init(|| {
            PlatformKey::new(
                Os::from_target(std::env::consts::OS),
                Arch::from_target(std::env::consts::ARCH, cfg!(target_endian = "little")),
            )
        })
    }

    /// Whether an artifact name matches both the OS and the architecture
    pub fn matches(&self, artifact_name: &str) -> bool {
        let name = artifact_name.to_lowercase();
        contains_any(&name, self.os.aliases(), self.os.name())
            && contains_any(&name, self.arch.aliases(), self.arch.name())
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os.name(), self.arch.name())
    }
}

fn contains_any(name: &str, aliases: Option<&[&str]>, raw: &str) -> bool {
    match aliases {
        Some(aliases) => aliases.iter().any(|alias| name.contains(alias)),
        None => name.contains(&raw.to_lowercase()),
    }
}

/// Artifacts picked for a platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub artifacts: Vec<Artifact>,
    /// Nothing matched and the first artifact was returned as a default
    pub fallback: bool,
}

/// Narrow a release's artifacts to those matching `platform`
///
/// Zero or one artifact is returned unchanged. Otherwise every artifact whose
/// name contains an OS alias and an architecture alias is kept; when none
/// does, the first artifact is returned and `fallback` is set. This is a
/// best-effort classifier and may pick the wrong file.
pub fn select(artifacts: &[Artifact], platform: &PlatformKey) -> Selection {
    if artifacts.len() <= 1 {
        return Selection {
            artifacts: artifacts.to_vec(),
            fallback: false,
        };
    }

    let matched: Vec<Artifact> = artifacts
        .iter()
        .filter(|artifact| platform.matches(&artifact.name))
        .cloned()
        .collect();

    if !matched.is_empty() {
        info!(
            "{} of {} artifacts match {platform}",
            matched.len(),
            artifacts.len()
        );
        return Selection {
            artifacts: matched,
            fallback: false,
        };
    }

    let first = artifacts[0].clone();
    warn!(
        "No artifact matches {platform}, falling back to {}",
        first.name
    );
    Selection {
        artifacts: vec![first],
        fallback: true,
    }
}
