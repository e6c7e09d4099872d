//! Task id generation.
//!
//! An id is a short context built from the significant words of the title
//! plus a suffix: `fix-logi-race-1016` for "Fix the login race" created on
//! October 16th. Uniqueness is checked against every id currently in the
//! store; on collision the suffix is regenerated a bounded number of times,
//! then replaced by a fully random one.
//!
//! The check is check-then-act. The store closes the remaining window by
//! creating files with `create_new` and asking for a fresh id when it loses
//! the race.

pub mod sequence;

pub use sequence::{OVERVIEW_FILE, TASK_EXT, parse_subtask_file_name, subtask_file_name};

use crate::config::{IdSettings, IdStyle};
use crate::error::{ErrorCode, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use heck::ToKebabCase;
use rand::Rng;
use std::collections::HashSet;
use tracing::debug;

/// Context used when a title has no significant words.
pub const FALLBACK_CONTEXT: &str = "task";

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of the suffix used by the random id style.
const RANDOM_SUFFIX_LEN: usize = 4;

/// Extra random characters appended to the date on a collision.
const DATE_RETRY_LEN: usize = 3;

/// Length of the last-resort random suffix.
const FALLBACK_SUFFIX_LEN: usize = 8;

/// Attempts at the last-resort suffix before giving up.
const FALLBACK_ATTEMPTS: usize = 64;

fn random_token(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Builds ids according to per-project [`IdSettings`].
#[derive(Debug, Clone)]
pub struct IdGenerator {
    settings: IdSettings,
    stop_words: HashSet<String>,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(IdSettings::default())
    }
}

impl IdGenerator {
    pub fn new(settings: IdSettings) -> Self {
        let stop_words = settings
            .stop_words
            .iter()
            .map(|w| w.trim().to_lowercase())
            .collect();
        Self {
            settings,
            stop_words,
        }
    }

    pub fn settings(&self) -> &IdSettings {
        &self.settings
    }

    /// Abbreviated title words, joined with `-`.
    pub fn context(&self, title: &str) -> String {
        let width = self.settings.token_width.max(1);
        let tokens: Vec<String> = title
            .to_kebab_case()
            .split('-')
            .filter(|w| !w.is_empty() && !self.stop_words.contains(*w))
            .map(|w| {
                w.chars()
                    .filter(char::is_ascii_alphanumeric)
                    .take(width)
                    .collect::<String>()
            })
            .filter(|t| !t.is_empty())
            .take(self.settings.max_context_words.max(1))
            .collect();

        if tokens.is_empty() {
            FALLBACK_CONTEXT.to_string()
        } else {
            tokens.join("-")
        }
    }

    fn first_suffix(&self, now: DateTime<Utc>) -> String {
        match self.settings.style {
            IdStyle::Date => now.format("%m%d").to_string(),
            IdStyle::Random => random_token(RANDOM_SUFFIX_LEN),
        }
    }

    fn retry_suffix(&self, now: DateTime<Utc>) -> String {
        match self.settings.style {
            IdStyle::Date => format!("{}{}", now.format("%m%d"), random_token(DATE_RETRY_LEN)),
            IdStyle::Random => random_token(RANDOM_SUFFIX_LEN),
        }
    }

    /// Generate an id for `title` that is not in `existing`, dated now.
    pub fn generate(&self, title: &str, existing: &HashSet<String>) -> StoreResult<String> {
        self.generate_at(title, existing, Utc::now())
    }

    /// Generate an id for `title` that is not in `existing`.
    pub fn generate_at(
        &self,
        title: &str,
        existing: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> StoreResult<String> {
        let context = self.context(title);

        let candidate = format!("{}-{}", context, self.first_suffix(now));
        if !existing.contains(&candidate) {
            return Ok(candidate);
        }

        for attempt in 1..=self.settings.max_retries {
            let candidate = format!("{}-{}", context, self.retry_suffix(now));
            if !existing.contains(&candidate) {
                debug!(id = %candidate, attempt, "id collision resolved by new suffix");
                return Ok(candidate);
            }
        }

        for _ in 0..FALLBACK_ATTEMPTS {
            let candidate = format!("{}-{}", context, random_token(FALLBACK_SUFFIX_LEN));
            if !existing.contains(&candidate) {
                debug!(id = %candidate, "id collision resolved by random fallback");
                return Ok(candidate);
            }
        }

        Err(StoreError::Integrity {
            message: format!("Could not generate a unique id for '{}'", title),
            code: ErrorCode::DuplicateId,
        })
    }
}
