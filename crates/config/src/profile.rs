//! Encoding profile structures
//!
//! A profile is the unit of policy: how a logical source path maps onto the
//! filesystem, which streams are carried into the output, and the rules that
//! decide how each carried stream is encoded.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;

/// Name of the profile used when a submission names none, or an unknown one
pub const DEFAULT_PROFILE: &str = "default";

/// Default output container extension
pub const DEFAULT_EXTENSION: &str = "mkv";

/// Longest admission delay a profile may ask for (one year)
pub const MAX_DELAY_MINUTES: f64 = 525_600.0;

/// Kind of a media stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
    #[serde(alias = "sub")]
    Subtitle,
}

impl StreamKind {
    /// All kinds, in the order selection processes them
    pub const ALL: [StreamKind; 3] = [StreamKind::Video, StreamKind::Audio, StreamKind::Subtitle];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
            StreamKind::Subtitle => "subtitle",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator of a rule clause
///
/// Parsing never fails: an unrecognised operator is kept as `Unknown` so the
/// rule it belongs to can be reported and skipped when it is evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
    Contains,
    Unknown(String),
}

impl Operator {
    pub fn as_str(&self) -> &str {
        match self {
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Contains => "contains",
            Operator::Unknown(op) => op,
        }
    }
}

impl From<String> for Operator {
    fn from(op: String) -> Self {
        match op.as_str() {
            ">" => Operator::Gt,
            ">=" => Operator::Ge,
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            "==" => Operator::Eq,
            "!=" => Operator::Ne,
            "contains" => Operator::Contains,
            _ => Operator::Unknown(op),
        }
    }
}

impl From<&str> for Operator {
    fn from(op: &str) -> Self {
        Operator::from(op.to_string())
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Literal on the right-hand side of a rule clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClauseValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl fmt::Display for ClauseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClauseValue::Bool(b) => write!(f, "{}", b),
            ClauseValue::Number(n) if n.is_finite() && n.fract() == 0.0 => {
                write!(f, "{}", *n as i64)
            }
            ClauseValue::Number(n) => write!(f, "{}", n),
            ClauseValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ClauseValue {
    fn from(s: &str) -> Self {
        ClauseValue::Text(s.to_string())
    }
}

impl From<f64> for ClauseValue {
    fn from(n: f64) -> Self {
        ClauseValue::Number(n)
    }
}

impl From<bool> for ClauseValue {
    fn from(b: bool) -> Self {
        ClauseValue::Bool(b)
    }
}

/// A single `property operator value` condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleClause {
    pub property: String,
    pub operator: Operator,
    pub value: ClauseValue,
}

impl RuleClause {
    pub fn new(property: &str, operator: &str, value: impl Into<ClauseValue>) -> Self {
        Self {
            property: property.to_string(),
            operator: Operator::from(operator),
            value: value.into(),
        }
    }
}

/// Conditions used to pick primary and secondary streams
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// All clauses must match; an empty list matches every stream
    #[serde(default, alias = "rules")]
    pub clauses: Vec<RuleClause>,
}

impl StreamCriteria {
    pub fn new(clauses: Vec<RuleClause>) -> Self {
        Self {
            description: None,
            clauses,
        }
    }
}

/// Partial output settings carried by an encoder rule
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutputSettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub crf: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub bitrate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tune: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tonemap: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<bool>,
}

/// Resolved encoding settings of one output stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    pub codec: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tune: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tonemap: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<bool>,
}

/// Codec name meaning "pass the stream through untouched"
pub const COPY_CODEC: &str = "copy";

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            codec: COPY_CODEC.to_string(),
            crf: None,
            bitrate: None,
            size: None,
            preset: None,
            tune: None,
            tonemap: None,
            skip: None,
        }
    }
}

impl OutputSettings {
    /// Overwrite every field the patch sets, leaving the others untouched
    pub fn apply(&mut self, patch: &OutputSettingsPatch) {
        if let Some(codec) = &patch.codec {
            self.codec = codec.clone();
        }
        if let Some(crf) = &patch.crf {
            self.crf = Some(crf.clone());
        }
        if let Some(bitrate) = &patch.bitrate {
            self.bitrate = Some(bitrate.clone());
        }
        if let Some(size) = &patch.size {
            self.size = Some(size.clone());
        }
        if let Some(preset) = &patch.preset {
            self.preset = Some(preset.clone());
        }
        if let Some(tune) = &patch.tune {
            self.tune = Some(tune.clone());
        }
        if let Some(tonemap) = patch.tonemap {
            self.tonemap = Some(tonemap);
        }
        if let Some(skip) = patch.skip {
            self.skip = Some(skip);
        }
    }

    pub fn is_copy(&self) -> bool {
        self.codec == COPY_CODEC
    }

    pub fn is_skipped(&self) -> bool {
        self.skip.unwrap_or(false)
    }
}

/// Conditional settings patch applied to destination streams of one kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderRule {
    #[serde(alias = "type")]
    pub kind: StreamKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, alias = "rules")]
    pub clauses: Vec<RuleClause>,
    pub result: OutputSettingsPatch,
}

/// Selection policy for video streams
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VideoSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<Vec<StreamCriteria>>,
}

/// Selection policy for audio and subtitle streams
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackSelection {
    #[serde(default, alias = "allowSecondary")]
    pub allow_secondary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<Vec<StreamCriteria>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<Vec<StreamCriteria>>,
}

/// Per-kind stream selection policy
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default)]
    pub video: VideoSelection,
    #[serde(default)]
    pub audio: TrackSelection,
    #[serde(default, alias = "sub")]
    pub subtitle: TrackSelection,
}

impl Selection {
    /// Primary criteria for a kind, if any were declared
    pub fn primary(&self, kind: StreamKind) -> Option<&[StreamCriteria]> {
        match kind {
            StreamKind::Video => self.video.primary.as_deref(),
            StreamKind::Audio => self.audio.primary.as_deref(),
            StreamKind::Subtitle => self.subtitle.primary.as_deref(),
        }
    }

    /// Secondary criteria for a kind, only when secondary streams are allowed
    pub fn secondary(&self, kind: StreamKind) -> Option<&[StreamCriteria]> {
        let track = match kind {
            StreamKind::Video => return None,
            StreamKind::Audio => &self.audio,
            StreamKind::Subtitle => &self.subtitle,
        };
        if track.allow_secondary {
            track.secondary.as_deref()
        } else {
            None
        }
    }
}

/// Prefix substitution applied to a logical source path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathMapping {
    pub from: String,
    pub to: String,
}

/// Regex substitution applied to the destination file stem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRename {
    #[serde(alias = "regex")]
    pub pattern: String,
    #[serde(alias = "substitution")]
    pub replacement: String,
}

/// A named, user-authored encoding policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingProfile {
    /// Output container extension
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Minutes to wait after submission before the job may start
    #[serde(default, alias = "delay")]
    pub delay_minutes: f64,
    #[serde(default, alias = "pathMappings")]
    pub path_mappings: Vec<PathMapping>,
    #[serde(default, alias = "fileRenames")]
    pub file_renames: Vec<FileRename>,
    #[serde(default)]
    pub selection: Selection,
    #[serde(default, alias = "encoder_rules")]
    pub encoder: Vec<EncoderRule>,
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

impl Default for EncodingProfile {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            delay_minutes: 0.0,
            path_mappings: Vec::new(),
            file_renames: Vec::new(),
            selection: Selection::default(),
            encoder: Vec::new(),
        }
    }
}

impl EncodingProfile {
    /// Admission delay; negative or non-finite values count as no delay
    ///
    /// Values above `MAX_DELAY_MINUTES` are clamped to it.
    pub fn delay(&self) -> Duration {
        if !self.delay_minutes.is_finite() || self.delay_minutes <= 0.0 {
            return Duration::ZERO;
        }
        let minutes = self.delay_minutes.min(MAX_DELAY_MINUTES);
        Duration::try_from_secs_f64(minutes * 60.0).unwrap_or(Duration::ZERO)
    }

    /// The profile written out when no configuration file exists yet:
    /// keep an English audio track, re-encode non-HEVC video and
    /// downscale anything above 1080p.
    pub fn starter() -> Self {
        Self {
            selection: Selection {
                video: VideoSelection::default(),
                audio: TrackSelection {
                    allow_secondary: false,
                    primary: Some(vec![StreamCriteria::new(vec![RuleClause::new(
                        "language", "==", "eng",
                    )])]),
                    secondary: None,
                },
                subtitle: TrackSelection {
                    allow_secondary: true,
                    primary: Some(vec![StreamCriteria::new(vec![RuleClause::new(
                        "language", "==", "eng",
                    )])]),
                    secondary: Some(vec![StreamCriteria::new(vec![RuleClause::new(
                        "title", "contains", "forced",
                    )])]),
                },
            },
            encoder: vec![
                EncoderRule {
                    kind: StreamKind::Video,
                    description: Some("Re-encode anything that is not already HEVC".to_string()),
                    clauses: vec![RuleClause::new("codec", "!=", "hevc")],
                    result: OutputSettingsPatch {
                        codec: Some("libx265".to_string()),
                        crf: Some("22".to_string()),
                        preset: Some("medium".to_string()),
                        ..Default::default()
                    },
                },
                EncoderRule {
                    kind: StreamKind::Video,
                    description: Some("Downscale to 1080p".to_string()),
                    clauses: vec![RuleClause::new("height", ">", 1080.0)],
                    result: OutputSettingsPatch {
                        size: Some("1920:-2".to_string()),
                        ..Default::default()
                    },
                },
            ],
            ..Self::default()
        }
    }
}

/// Accepts `crf = 20` as well as `crf = "20"`
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Int(i) => i.to_string(),
        Raw::Float(f) => f.to_string(),
    }))
}
