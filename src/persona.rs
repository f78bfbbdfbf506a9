//! Persona: the listener's voice
//!
//! A persona is the fixed system instruction plus the two canned utterances
//! the turn handler can answer with without consulting the model.

use serde::{Deserialize, Serialize};

use crate::config::file::PersonaFileConfig;

/// Default system instruction: a non-judgmental, non-corrective listener
pub const DEFAULT_SYSTEM_PROMPT: &str = "あなたは日本語教師ではありません。
ユーザーを評価・訂正・指導してはいけません。

日本語を使ったやりとりを通して、
「話してもいい」「間違えてもいい」
という安心感を与える存在です。

必ず守ること：
・否定しない
・正誤に触れない
・指導しない
・感情を肯定する
・返答は1〜2文
・優しく、温かみのある言葉を使う
・「うん」「そうだね」「いいね」など、受け止める言葉を使う";

/// Greeting used for the initial turn
pub const DEFAULT_GREETING: &str =
    "こんにちは。声を聴かせてくれてありがとう。日本語を私と勉強しよう。";

/// Reply used when the model returns no content
pub const DEFAULT_FALLBACK: &str = "うん、聞いてるよ。";

/// Persona texts used by the turn handler
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    /// System instruction sent ahead of every user utterance
    pub system_prompt: String,

    /// Canned utterance for the initial turn
    pub greeting: String,

    /// Canned utterance when the model returns nothing usable
    pub fallback: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            greeting: DEFAULT_GREETING.to_string(),
            fallback: DEFAULT_FALLBACK.to_string(),
        }
    }
}

impl Persona {
    /// Apply overrides from the config file; blank values keep the default
    #[must_use]
    pub fn with_overrides(mut self, overrides: PersonaFileConfig) -> Self {
        fn pick(slot: &mut String, value: Option<String>) {
            if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
                *slot = v;
            }
        }

        pick(&mut self.system_prompt, overrides.system_prompt);
        pick(&mut self.greeting, overrides.greeting);
        pick(&mut self.fallback, overrides.fallback);
        self
    }

    /// Choose the reply for a model completion, falling back when it is blank
    ///
    /// Non-blank content is returned as the model produced it.
    #[must_use]
    pub fn reply_or_fallback(&self, completion: Option<String>) -> String {
        completion
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| self.fallback.clone())
    }
}
