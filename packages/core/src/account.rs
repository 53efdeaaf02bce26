//! Account (login profile) listing via `tailscale switch --list`.

/// One login profile known to the local client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountInfo {
    /// Profile id, as accepted by `switch <id>`.
    pub id: String,
    /// Account login name (e.g. `alice@example.com`).
    pub login_name: String,
    /// Tailnet the profile belongs to.
    pub tailnet_name: String,
    /// Whether this is the currently selected profile.
    pub active: bool,
}

/// Parses the table printed by `switch --list`.
///
/// ```text
/// ID    Tailnet             Account
/// 6b1f  example.com         alice@example.com*
/// 91c2  work.ts.net         alice@work.com
/// ```
///
/// The active profile is marked with a trailing `*`. Rows with fewer than
/// three columns are skipped.
pub fn parse_account_list(output: &str) -> Vec<AccountInfo> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [id, tailnet, account, ..] = fields.as_slice() else {
                return None;
            };
            if id.eq_ignore_ascii_case("id") {
                return None;
            }

            let (login_name, active) = match account.strip_suffix('*') {
                Some(name) => (name, true),
                None => (*account, false),
            };

            Some(AccountInfo {
                id: (*id).to_string(),
                login_name: login_name.to_string(),
                tailnet_name: (*tailnet).to_string(),
                active,
            })
        })
        .collect()
}

/// Returns the active profile, if any is marked.
pub fn active_account(accounts: &[AccountInfo]) -> Option<&AccountInfo> {
    accounts.iter().find(|a| a.active)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_SWITCH_LIST: &str = "\
ID    Tailnet             Account
6b1f  example.com         alice@example.com*
91c2  work.ts.net         alice@work.com
";

    #[test]
    fn test_parse_account_list() {
        let accounts = parse_account_list(SAMPLE_SWITCH_LIST);

        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].id, "6b1f");
        assert_eq!(accounts[0].login_name, "alice@example.com");
        assert_eq!(accounts[0].tailnet_name, "example.com");
        assert!(accounts[0].active);
        assert!(!accounts[1].active);
    }

    #[test]
    fn test_active_account() {
        let accounts = parse_account_list(SAMPLE_SWITCH_LIST);
        assert_eq!(active_account(&accounts).map(|a| a.id.as_str()), Some("6b1f"));
        assert!(active_account(&[]).is_none());
    }

    #[test]
    fn test_garbage_is_ignored() {
        assert!(parse_account_list("").is_empty());
        assert!(parse_account_list("no profiles\n\n").is_empty());
    }
}
