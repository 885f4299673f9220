//! Choosing the dedicated tab.
//!
//! Preference order: the cached tab if it is still an on-domain page, then a
//! tab this process dedicated earlier, then any on-domain tab (which becomes
//! dedicated), else a new tab.

use crate::targets::TargetInfo;
use std::collections::HashSet;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabChoice {
    Cached(String),
    Pinned(String),
    Promoted(String),
    Create,
}

impl TabChoice {
    pub fn target_id(&self) -> Option<&str> {
        match self {
            TabChoice::Cached(id) | TabChoice::Pinned(id) | TabChoice::Promoted(id) => Some(id),
            TabChoice::Create => None,
        }
    }
}

/// Whether `address` is on `domain` or one of its subdomains.
pub fn is_on_domain(address: &str, domain: &str) -> bool {
    let domain = domain.trim().trim_start_matches('.').to_ascii_lowercase();
    if domain.is_empty() {
        return false;
    }
    let Ok(url) = Url::parse(address) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    match url.host_str() {
        Some(host) => {
            let host = host.to_ascii_lowercase();
            host == domain || host.ends_with(&format!(".{}", domain))
        }
        None => false,
    }
}

pub fn choose_tab(
    targets: &[TargetInfo],
    cached: Option<&str>,
    pinned: &HashSet<String>,
    domain: &str,
) -> TabChoice {
    let usable = |t: &&TargetInfo| t.is_page() && is_on_domain(&t.url, domain);

    if let Some(cached) = cached {
        if targets.iter().filter(usable).any(|t| t.id == cached) {
            return TabChoice::Cached(cached.to_string());
        }
    }
    if let Some(t) = targets
        .iter()
        .filter(usable)
        .find(|t| pinned.contains(&t.id))
    {
        return TabChoice::Pinned(t.id.clone());
    }
    if let Some(t) = targets.iter().find(usable) {
        return TabChoice::Promoted(t.id.clone());
    }
    TabChoice::Create
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: &str, url: &str) -> TargetInfo {
        TargetInfo {
            id: id.into(),
            kind: "page".into(),
            title: String::new(),
            url: url.into(),
            web_socket_debugger_url: None,
        }
    }

    #[test]
    fn test_domain_matching() {
        assert!(is_on_domain("https://www.linkedin.com/feed/", "linkedin.com"));
        assert!(is_on_domain("https://linkedin.com/", "linkedin.com"));
        assert!(!is_on_domain("https://notlinkedin.com/", "linkedin.com"));
        assert!(!is_on_domain("https://linkedin.com.evil.io/", "linkedin.com"));
        assert!(!is_on_domain("chrome://newtab/", "linkedin.com"));
        assert!(!is_on_domain("about:blank", "linkedin.com"));
    }

    #[test]
    fn test_prefers_cached_then_pinned_then_any() {
        let targets = vec![
            page("T1", "https://news.example.com/"),
            page("T2", "https://www.linkedin.com/feed/"),
            page("T3", "https://www.linkedin.com/in/someone/"),
        ];
        let pinned: HashSet<String> = ["T3".to_string()].into_iter().collect();

        assert_eq!(
            choose_tab(&targets, Some("T2"), &pinned, "linkedin.com"),
            TabChoice::Cached("T2".into())
        );
        assert_eq!(
            choose_tab(&targets, Some("T1"), &pinned, "linkedin.com"),
            TabChoice::Pinned("T3".into())
        );
        assert_eq!(
            choose_tab(&targets, None, &HashSet::new(), "linkedin.com"),
            TabChoice::Promoted("T2".into())
        );
    }

    #[test]
    fn test_creates_when_nothing_on_domain() {
        let mut worker = page("W1", "https://www.linkedin.com/sw.js");
        worker.kind = "service_worker".into();
        let targets = vec![page("T1", "about:blank"), worker];
        let choice = choose_tab(&targets, Some("gone"), &HashSet::new(), "linkedin.com");
        assert_eq!(choice, TabChoice::Create);
        assert_eq!(choice.target_id(), None);
    }
}
