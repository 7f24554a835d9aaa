/// Option subscription filter
///
/// Auto mode follows every option except stop-listed ones. Explicit mode
/// follows only allow-listed options; the stop list still wins.
///
/// File format, one token per line:
///
/// ```text
/// # comment
/// 1234        subscribe
/// U5678       stop-list (also `u` or `!`)
/// 0x1a2b      hex ids are accepted too
/// ```
///
/// Any bare subscribe token switches the filter to explicit mode.

use crate::protocol::OptionId;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubscriptionError {
    #[error("failed to read subscription file '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: invalid option id '{token}'")]
    BadToken { line: usize, token: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionMode {
    #[default]
    Auto,
    Explicit,
}

#[derive(Debug, Clone, Default)]
pub struct Subscription {
    mode: SubscriptionMode,
    allow: HashSet<OptionId>,
    stop: HashSet<OptionId>,
}

fn parse_id(token: &str) -> Option<OptionId> {
    let v = match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok()?,
        None => token.parse().ok()?,
    };
    Some(OptionId(v))
}

impl Subscription {
    /// Everything not stop-listed
    pub fn auto() -> Self {
        Self::default()
    }

    /// Nothing until subscribed
    pub fn explicit() -> Self {
        Subscription {
            mode: SubscriptionMode::Explicit,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> SubscriptionMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SubscriptionMode) {
        self.mode = mode;
    }

    pub fn subscribe(&mut self, option: OptionId) {
        self.allow.insert(option);
    }

    pub fn unsubscribe(&mut self, option: OptionId) {
        self.stop.insert(option);
    }

    pub fn is_subscribed(&self, option: OptionId) -> bool {
        if self.stop.contains(&option) {
            return false;
        }
        match self.mode {
            SubscriptionMode::Auto => true,
            SubscriptionMode::Explicit => self.allow.contains(&option),
        }
    }

    /// `option` if followed, `OptionId::UNKNOWN` otherwise
    pub fn filter(&self, option: OptionId) -> OptionId {
        if self.is_subscribed(option) {
            option
        } else {
            OptionId::UNKNOWN
        }
    }

    pub fn parse(text: &str) -> Result<Self, SubscriptionError> {
        let mut sub = Subscription::auto();
        for (n, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let bad = || SubscriptionError::BadToken {
                line: n + 1,
                token: line.to_string(),
            };
            match line.strip_prefix(['U', 'u', '!']) {
                Some(rest) => sub.unsubscribe(parse_id(rest.trim()).ok_or_else(bad)?),
                None => {
                    sub.subscribe(parse_id(line).ok_or_else(bad)?);
                    sub.mode = SubscriptionMode::Explicit;
                }
            }
        }
        Ok(sub)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SubscriptionError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SubscriptionError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }
}
