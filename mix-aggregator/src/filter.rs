use interfaces::ArrayMixOpt;
use regex::{Regex, RegexBuilder};
use tracing::warn;

/// Patterns match case-insensitively; `(?-i)` opts back in to exact case.
/// Empty patterns mean "no filter". Invalid ones are logged and also mean
/// "no filter", so a typo widens a rule instead of failing the merge.
pub fn compile_pattern(pattern: &str) -> Option<Regex> {
    if pattern.is_empty() {
        return None;
    }
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Ignoring invalid filter pattern {:?}: {}", pattern, e);
            None
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Filter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl Filter {
    pub fn new(include: &str, exclude: &str) -> Self {
        Self {
            include: compile_pattern(include),
            exclude: compile_pattern(exclude),
        }
    }

    pub fn from_rule(rule: &ArrayMixOpt) -> Self {
        Self::new(&rule.include, &rule.exclude)
    }

    pub fn is_noop(&self) -> bool {
        self.include.is_none() && self.exclude.is_none()
    }

    pub fn test(&self, value: &str) -> bool {
        self.include.as_ref().is_none_or(|re| re.is_match(value))
            && !self.exclude.as_ref().is_some_and(|re| re.is_match(value))
    }
}
