//! Which side of the single-writer/multi-reader split a process is
//! playing. This has no bearing on what `MvccStore` allows — that's
//! governed entirely by which tokens a process's handles manage to
//! acquire — it exists purely so a process can tag its own logs and
//! diagnostics with the role it believes it's filling.

/// A process's self-reported role against a region it has opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Brought the region into existence, or reopened it expecting to
    /// run the owner's sweep loop.
    Owner,
    /// Only ever acquires reader tokens against the region.
    Reader,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Owner => write!(f, "owner"),
            Role::Reader => write!(f, "reader"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_displays_lowercase() {
        assert_eq!(Role::Owner.to_string(), "owner");
        assert_eq!(Role::Reader.to_string(), "reader");
    }
}
