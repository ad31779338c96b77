//! Intent classification output.

use crate::types::Mode;
use serde::{Deserialize, Serialize};

/// What the intent classifier decided: the mode plus the named project, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub mode: Mode,
    #[serde(default)]
    pub project: String,
}

#[derive(Deserialize)]
struct RawIntent {
    mode: String,
    #[serde(default)]
    project: Option<String>,
}

/// Parse classifier output into an [`Intent`].
///
/// Accepts bare JSON, fenced code blocks, and JSON surrounded by prose. Returns
/// `None` when no object parses or the mode is not recognised; callers then
/// use [`Intent::default`].
pub fn parse_intent(text: &str) -> Option<Intent> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let raw: RawIntent = serde_json::from_str(&text[start..=end]).ok()?;
    let mode = raw.mode.trim().parse::<Mode>().ok()?;
    Some(Intent {
        mode,
        project: raw.project.unwrap_or_default().trim().to_string(),
    })
}
