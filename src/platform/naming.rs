//! OS object name normalization shared by the memory map and the signal.

/// Naming rules for OS-wide shared objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingRules {
    /// Kernel object namespace names such as `Local\Name`, used verbatim.
    Windows,
    /// `shm_open`/`sem_open` names: one leading slash, no other separators.
    Posix,
}

impl NamingRules {
    /// Rules for the build target.
    pub const fn native() -> Self {
        if cfg!(windows) { NamingRules::Windows } else { NamingRules::Posix }
    }
}

/// Map a logical object name onto a name that is legal under `rules`.
///
/// The same logical name always maps to the same platform name, so the
/// producer and this reader agree on identity. Under POSIX rules a single
/// leading `/` is dropped, every other `\` or `/` becomes `_`, and `/` is prefixed:
/// `Local\IRSDKMemMapFileName` becomes `/Local_IRSDKMemMapFileName`.
pub fn normalize_name(name: &str, rules: NamingRules) -> String {
    match rules {
        NamingRules::Windows => name.to_owned(),
        NamingRules::Posix => {
            let trimmed = name.strip_prefix('/').unwrap_or(name);
            let mut normalized = String::with_capacity(trimmed.len() + 1);
            normalized.push('/');
            normalized.extend(trimmed.chars().map(|c| if c == '\\' || c == '/' { '_' } else { c }));
            normalized
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn producer_names_map_to_posix_names() {
        assert_eq!(
            normalize_name("Local\\IRSDKMemMapFileName", NamingRules::Posix),
            "/Local_IRSDKMemMapFileName"
        );
        assert_eq!(
            normalize_name("Local\\IRSDKDataValidEvent", NamingRules::Posix),
            "/Local_IRSDKDataValidEvent"
        );
        assert_eq!(normalize_name("/already", NamingRules::Posix), "/already");
        assert_eq!(normalize_name("", NamingRules::Posix), "/");
        assert_eq!(normalize_name("Local/Sub\\Name", NamingRules::Posix), "/Local_Sub_Name");
    }

    #[test]
    fn windows_names_are_unchanged() {
        assert_eq!(
            normalize_name("Local\\IRSDKMemMapFileName", NamingRules::Windows),
            "Local\\IRSDKMemMapFileName"
        );
    }

    #[test]
    fn native_rules_follow_target() {
        if cfg!(windows) {
            assert_eq!(NamingRules::native(), NamingRules::Windows);
        } else {
            assert_eq!(NamingRules::native(), NamingRules::Posix);
        }
    }

    proptest! {
        #[test]
        fn posix_names_are_legal_and_stable(name in "[A-Za-z0-9_\\\\/]{0,40}") {
            let normalized = normalize_name(&name, NamingRules::Posix);
            prop_assert!(normalized.starts_with('/'));
            prop_assert!(!normalized.contains('\\'));
            prop_assert!(!normalized[1..].contains('/'));
            prop_assert_eq!(normalize_name(&normalized, NamingRules::Posix), normalized.clone());
        }

        #[test]
        fn leading_slash_does_not_change_identity(name in "[A-Za-z0-9_\\\\]{1,40}") {
            prop_assert_eq!(
                normalize_name(&name, NamingRules::Posix),
                normalize_name(&format!("/{}", name), NamingRules::Posix)
            );
        }
    }
}
