/*!
 * dbus-send Reply Scraping
 * Flattens `--print-reply` output of property reads into key/value pairs
 */

use regex::Regex;
use std::collections::BTreeMap;
use thiserror::Error;

pub type ParsedReply = BTreeMap<String, String>;

/// Synthetic key for a leading value that arrives without its own key.
pub const META_KEY: &str = "Meta";

/// First tokens that mark a reply with no leading key. Seen on iOS players,
/// which answer `Status` and `Track` reads this way; other devices are
/// untested.
const KEYLESS_SENTINELS: [&str; 3] = ["Item", "playing", "paused"];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("no string or uint32 values found in reply")]
    NoTokens,
}

pub struct ReplyParser {
    preamble: Regex,
    token: Regex,
}

impl ReplyParser {
    pub fn new() -> Self {
        Self {
            preamble: Regex::new(r"(?m)^.*reply_serial=\d+[ \t]*\n\s*variant\s*(?:array)?")
                .expect("preamble regex must compile"),
            token: Regex::new(r#"string\s+"(.*)"|uint32\s+(\d+)"#)
                .expect("token regex must compile"),
        }
    }

    /// Values of every `string "..."` and `uint32 N` in order of appearance.
    pub fn tokens(&self, reply: &str) -> Vec<String> {
        let body = self.preamble.replace(reply, "");
        self.token
            .captures_iter(&body)
            .filter_map(|c| c.get(1).or_else(|| c.get(2)))
            .map(|m| m.as_str().trim().to_string())
            .collect()
    }

    /// Pair up tokens as alternating keys and values.
    ///
    /// When the first value is one of the keyless sentinels it is stored
    /// under [`META_KEY`] and the pairing shifts by one for the rest of the
    /// reply. Repeated keys keep their last value.
    pub fn parse(&self, reply: &str) -> Result<ParsedReply, ParseError> {
        let tokens = self.tokens(reply);
        let Some(first) = tokens.first() else {
            return Err(ParseError::NoTokens);
        };

        let keyless = KEYLESS_SENTINELS.contains(&first.as_str());
        let mut parsed = ParsedReply::new();
        let mut key = META_KEY.to_string();

        for (i, token) in tokens.into_iter().enumerate() {
            let is_key = (i % 2 == 1) == keyless;
            if is_key {
                key = token;
            } else {
                parsed.insert(key.clone(), token);
            }
        }

        Ok(parsed)
    }
}

impl Default for ReplyParser {
    fn default() -> Self {
        Self::new()
    }
}
