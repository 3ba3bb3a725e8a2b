/// Escape glob metacharacters so an owner id can sit inside a pattern.
pub fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Cache key layout for per-owner views.
pub struct CacheKeys;

impl CacheKeys {
    pub fn dashboard(owner_id: &str) -> String {
        format!("dashboard:{}", owner_id)
    }

    pub fn transactions(owner_id: &str, limit: Option<usize>) -> String {
        match limit {
            Some(limit) => format!("page:transactions:{}:{}", owner_id, limit),
            None => format!("page:transactions:{}:all", owner_id),
        }
    }

    pub fn insights(owner_id: &str) -> String {
        format!("page:ai-insights:{}", owner_id)
    }

    pub fn dashboard_patterns(owner_id: &str) -> Vec<String> {
        let owner = escape_glob(owner_id);
        vec![format!("dashboard:{}", owner), format!("dashboard:{}:*", owner)]
    }

    pub fn transactions_patterns(owner_id: &str) -> Vec<String> {
        vec![format!("page:transactions:{}:*", escape_glob(owner_id))]
    }

    pub fn insights_patterns(owner_id: &str) -> Vec<String> {
        let owner = escape_glob(owner_id);
        vec![
            format!("page:ai-insights:{}", owner),
            format!("page:ai-insights:{}:*", owner),
        ]
    }

    /// Every view derived from `owner_id`'s data.
    pub fn owner_patterns(owner_id: &str) -> Vec<String> {
        let mut patterns = Self::dashboard_patterns(owner_id);
        patterns.extend(Self::transactions_patterns(owner_id));
        patterns.extend(Self::insights_patterns(owner_id));
        patterns
    }
}
