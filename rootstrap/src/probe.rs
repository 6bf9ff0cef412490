//! Host architecture gate.
//!
//! Runs before any network or disk work: the bundle only ships 64-bit
//! x86 and ARM guest trees.

use crate::error::{Error, Result};

/// Host CPU architectures the bundle supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Arch {
    /// 64-bit x86.
    X86_64,
    /// 64-bit ARM.
    Aarch64,
}

impl Arch {
    /// Every supported architecture.
    pub const SUPPORTED: &'static [Self] = &[Self::X86_64, Self::Aarch64];

    /// The `uname -m` spelling.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Arch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::SUPPORTED
            .iter()
            .copied()
            .find(|a| a.as_str() == s.trim())
            .ok_or_else(|| Error::UnsupportedEnvironment(format!("unsupported architecture: {s:?}")))
    }
}

/// Reads the machine field of `uname(2)` and checks it against [`Arch::SUPPORTED`].
#[cfg(unix)]
pub fn host_arch() -> Result<Arch> {
    let uts = nix::sys::utsname::uname()
        .map_err(|e| Error::UnsupportedEnvironment(format!("cannot read architecture: {e}")))?;
    let machine = uts.machine().to_string_lossy();
    tracing::debug!(%machine, "detected host architecture");
    machine.parse()
}

/// Non-Unix hosts cannot run the sandbox binary at all.
#[cfg(not(unix))]
pub fn host_arch() -> Result<Arch> {
    Err(Error::UnsupportedEnvironment("not a Unix host".into()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn accepts_supported() {
        assert_eq!("x86_64".parse::<Arch>().unwrap(), Arch::X86_64);
        assert_eq!("aarch64\n".parse::<Arch>().unwrap(), Arch::Aarch64);
    }

    #[test]
    fn rejects_everything_else() {
        for s in ["", "i686", "armv7l", "arm64", "X86_64", "riscv64", "ppc64le"] {
            let err = s.parse::<Arch>().unwrap_err();
            assert!(matches!(err, Error::UnsupportedEnvironment(_)), "{s}");
        }
    }

    #[test]
    fn display_round_trips() {
        for a in Arch::SUPPORTED {
            assert_eq!(a.to_string().parse::<Arch>().unwrap(), *a);
        }
    }
}
