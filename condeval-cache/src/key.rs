/// The structured identity of a cached evaluation result.
///
/// Serialised as `campaign:<c>:branch:<b>:node:<n>` with `\` and `:`
/// escaped inside each component, so distinct tuples can never collide
/// and string-prefix matching coincides with tuple-prefix matching.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub campaign_id: String,
    pub branch_id: String,
    pub node_id: String,
}

impl CacheKey {
    pub fn new(
        campaign_id: impl Into<String>,
        branch_id: impl Into<String>,
        node_id: impl Into<String>,
    ) -> Self {
        CacheKey {
            campaign_id: campaign_id.into(),
            branch_id: branch_id.into(),
            node_id: node_id.into(),
        }
    }

    pub fn encode(&self) -> String {
        format!(
            "campaign:{}:branch:{}:node:{}",
            esc(&self.campaign_id),
            esc(&self.branch_id),
            esc(&self.node_id)
        )
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

/// The encoded prefix shared by every key under a campaign, optionally
/// narrowed to one branch. The trailing literal (`:branch:` / `:node:`)
/// keeps `camp` from matching `camp2`.
pub fn prefix(campaign_id: &str, branch_id: Option<&str>) -> String {
    match branch_id {
        Some(branch_id) => format!(
            "campaign:{}:branch:{}:node:",
            esc(campaign_id),
            esc(branch_id)
        ),
        None => format!("campaign:{}:branch:", esc(campaign_id)),
    }
}

fn esc(component: &str) -> String {
    component.replace('\\', "\\\\").replace(':', "\\:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_is_injective_across_delimiter_abuse() {
        let keys = [
            CacheKey::new("a:b", "c", "n"),
            CacheKey::new("a", "b:c", "n"),
            CacheKey::new("a", "b", "c:n"),
            CacheKey::new("a:b:c", "", "n"),
            CacheKey::new("a\\", ":b", "n"),
            CacheKey::new("a", "\\:b", "n"),
        ];
        for (i, left) in keys.iter().enumerate() {
            for (j, right) in keys.iter().enumerate() {
                if i != j {
                    assert_ne!(left.encode(), right.encode(), "{left:?} vs {right:?}");
                }
            }
        }
    }

    #[test]
    fn prefixes_match_exactly_their_scope() {
        let key = CacheKey::new("camp", "main", "CONDITION:c1").encode();
        assert!(key.starts_with(&prefix("camp", None)));
        assert!(key.starts_with(&prefix("camp", Some("main"))));
        assert!(!key.starts_with(&prefix("camp2", None)));
        assert!(!key.starts_with(&prefix("cam", None)));
        assert!(!key.starts_with(&prefix("camp", Some("mai"))));
    }

    #[test]
    fn node_ids_keep_their_delimiter_readably_escaped() {
        let key = CacheKey::new("camp", "main", "CONDITION:c1");
        assert_eq!(
            key.encode(),
            "campaign:camp:branch:main:node:CONDITION\\:c1"
        );
    }
}
