use regex::{Regex, RegexBuilder};

use crate::error::{AppError, AppResult};

/// Screens user-visible text such as nicknames.
pub trait ContentFilter: Send + Sync {
    fn contains_sensitive(&self, text: &str) -> bool;

    fn check(&self, field: &str, text: &str) -> AppResult<()> {
        if self.contains_sensitive(text) {
            tracing::info!(field, "rejected text containing a sensitive word");
            return Err(AppError::bad_request(format!("{field} contains a sensitive word")));
        }
        Ok(())
    }
}

/// Case-insensitive substring match against a fixed word list.
#[derive(Debug, Clone)]
pub struct LexiconFilter {
    matcher: Option<Regex>,
}

impl LexiconFilter {
    pub fn new(words: &[String]) -> Result<Self, regex::Error> {
        let alternatives: Vec<String> = words
            .iter()
            .map(|w| w.trim())
            .filter(|w| !w.is_empty())
            .map(regex::escape)
            .collect();

        if alternatives.is_empty() {
            return Ok(Self { matcher: None });
        }

        let matcher = RegexBuilder::new(&alternatives.join("|"))
            .case_insensitive(true)
            .build()?;
        Ok(Self {
            matcher: Some(matcher),
        })
    }
}

impl ContentFilter for LexiconFilter {
    fn contains_sensitive(&self, text: &str) -> bool {
        self.matcher.as_ref().map_or(false, |m| m.is_match(text))
    }
}
