//! Content data model
//!
//! Wire shapes returned by the content service. Decoding is lenient: absent
//! or `null` sequences become empty sequences so callers can always iterate
//! without a presence check, and question ids accept both `id` and `_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Decode `null` (or an absent field, together with `#[serde(default)]`) as `T::default()`
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept an RFC 3339 timestamp; anything else becomes `None`
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

/// Accept a string or a number, keep it as text
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Difficulty tier of a question set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    L1,
    L2,
    L3,
}

impl Tier {
    /// All tiers in display order
    pub const ALL: [Tier; 3] = [Tier::L1, Tier::L2, Tier::L3];

    /// Human-readable difficulty name
    pub fn label(self) -> &'static str {
        match self {
            Tier::L1 => "Beginner",
            Tier::L2 => "Intermediate",
            Tier::L3 => "Advanced",
        }
    }

    /// Parse a tier key or label, case-insensitive
    pub fn parse(value: &str) -> Option<Tier> {
        match value.trim().to_ascii_lowercase().as_str() {
            "l1" | "beginner" => Some(Tier::L1),
            "l2" | "intermediate" => Some(Tier::L2),
            "l3" | "advanced" => Some(Tier::L3),
            _ => None,
        }
    }
}

/// Behaviour shared by both question kinds
pub trait QuestionBody {
    fn id(&self) -> &str;

    /// Whether the question can be displayed as-is
    fn is_well_formed(&self) -> bool;
}

/// Embedded reference from a question back to its set
///
/// Deployments send either the bare set id or the populated set object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SetLink {
    Id(String),
    Object {
        #[serde(alias = "_id")]
        id: String,
    },
}

impl SetLink {
    pub fn id(&self) -> &str {
        match self {
            SetLink::Id(id) => id,
            SetLink::Object { id } => id,
        }
    }
}

/// Multiple-choice question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveQuestion {
    #[serde(alias = "_id")]
    pub id: String,
    pub question: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub options: Vec<String>,
    /// Zero-based index into `options`
    pub correct_answer: usize,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_set: Option<SetLink>,
}

impl ObjectiveQuestion {
    /// Id of the set this question claims to belong to, if embedded
    pub fn set_id(&self) -> Option<&str> {
        self.question_set.as_ref().map(SetLink::id)
    }
}

impl QuestionBody for ObjectiveQuestion {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_well_formed(&self) -> bool {
        !self.question.trim().is_empty() && self.correct_answer < self.options.len()
    }
}

/// Free-text question with a model answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectiveQuestion {
    #[serde(alias = "_id")]
    pub id: String,
    pub question: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub answer: String,
    /// Comma-separated keywords
    #[serde(default)]
    pub keywords: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl SubjectiveQuestion {
    pub fn keyword_list(&self) -> Vec<&str> {
        self.keywords
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .collect()
    }
}

impl QuestionBody for SubjectiveQuestion {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_well_formed(&self) -> bool {
        !self.question.trim().is_empty()
    }
}

/// One element of a set's `questions` array
///
/// Variant order matters: serde tries them top to bottom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuestionEntry<Q> {
    /// Full question body
    Full(Q),
    /// Bare question id
    Reference(String),
    /// Anything else (e.g. an object with only an id)
    Opaque(serde_json::Value),
}

impl<Q: QuestionBody> QuestionEntry<Q> {
    pub fn as_full(&self) -> Option<&Q> {
        match self {
            QuestionEntry::Full(q) => Some(q),
            _ => None,
        }
    }

    /// Question id when one can be read from the entry
    pub fn id(&self) -> Option<&str> {
        match self {
            QuestionEntry::Full(q) => Some(q.id()),
            QuestionEntry::Reference(id) => Some(id),
            QuestionEntry::Opaque(value) => value
                .get("_id")
                .or_else(|| value.get("id"))
                .and_then(|v| v.as_str()),
        }
    }
}

/// Question set as listed in a bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    rename_all = "camelCase",
    bound(serialize = "Q: Serialize", deserialize = "Q: Deserialize<'de>")
)]
pub struct QuestionSetSummary<Q> {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    /// Raw level as sent by the service; see [`QuestionSetSummary::tier`]
    #[serde(default, deserialize_with = "null_as_default")]
    pub level: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_questions: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub questions: Vec<QuestionEntry<Q>>,
    /// Set after every question source came back empty
    #[serde(skip)]
    pub resolution_failed: bool,
}

pub type ObjectiveSet = QuestionSetSummary<ObjectiveQuestion>;
pub type SubjectiveSet = QuestionSetSummary<SubjectiveQuestion>;

impl<Q: QuestionBody> QuestionSetSummary<Q> {
    /// Every entry is a displayable full question, and there is at least one
    ///
    /// Checks the whole sequence, not just the first element: a mixed
    /// response counts as unpopulated.
    pub fn is_populated(&self) -> bool {
        !self.questions.is_empty()
            && self
                .questions
                .iter()
                .all(|entry| entry.as_full().is_some_and(QuestionBody::is_well_formed))
    }

    /// Full question bodies, skipping references
    pub fn full_questions(&self) -> impl Iterator<Item = &Q> {
        self.questions.iter().filter_map(QuestionEntry::as_full)
    }

    pub fn tier(&self) -> Option<Tier> {
        Tier::parse(&self.level)
    }

    /// Copy of this set with `questions` replaced by full bodies
    pub fn with_questions(&self, questions: Vec<Q>) -> Self
    where
        Q: Clone,
    {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            level: self.level.clone(),
            total_questions: self.total_questions,
            questions: questions.into_iter().map(QuestionEntry::Full).collect(),
            resolution_failed: false,
        }
    }

    /// Copy of this set with no questions and the failed flag raised
    pub fn as_exhausted(&self) -> Self
    where
        Q: Clone,
    {
        let mut set = self.with_questions(Vec::new());
        set.resolution_failed = true;
        set
    }
}

/// Question sets partitioned by difficulty
///
/// All three tier keys are always present on both decode and encode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "Q: Serialize", deserialize = "Q: Deserialize<'de>"))]
pub struct TieredSets<Q> {
    #[serde(rename = "L1", alias = "l1", default, deserialize_with = "null_as_default")]
    pub l1: Vec<QuestionSetSummary<Q>>,
    #[serde(rename = "L2", alias = "l2", default, deserialize_with = "null_as_default")]
    pub l2: Vec<QuestionSetSummary<Q>>,
    #[serde(rename = "L3", alias = "l3", default, deserialize_with = "null_as_default")]
    pub l3: Vec<QuestionSetSummary<Q>>,
}

impl<Q> Default for TieredSets<Q> {
    fn default() -> Self {
        Self {
            l1: Vec::new(),
            l2: Vec::new(),
            l3: Vec::new(),
        }
    }
}

impl<Q> TieredSets<Q> {
    pub fn tier(&self, tier: Tier) -> &[QuestionSetSummary<Q>] {
        match tier {
            Tier::L1 => &self.l1,
            Tier::L2 => &self.l2,
            Tier::L3 => &self.l3,
        }
    }

    /// Sets in L1 → L2 → L3 order, tagged with their tier
    pub fn iter(&self) -> impl Iterator<Item = (Tier, &QuestionSetSummary<Q>)> {
        Tier::ALL
            .into_iter()
            .flat_map(move |tier| self.tier(tier).iter().map(move |set| (tier, set)))
    }

    pub fn find_set(&self, set_id: &str) -> Option<(Tier, &QuestionSetSummary<Q>)> {
        self.iter().find(|(_, set)| set.id == set_id)
    }

    pub fn total_sets(&self) -> usize {
        self.l1.len() + self.l2.len() + self.l3.len()
    }
}

/// Title block of the resolved entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemMeta {
    #[serde(alias = "_id")]
    pub id: Option<String>,
    #[serde(alias = "name")]
    pub title: String,
    pub description: Option<String>,
    #[serde(alias = "image", alias = "coverImageUrl")]
    pub cover_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, alias = "summary", deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, alias = "videoUrl", deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Seconds
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub views: Option<u64>,
}

/// Previous-year question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pyq {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub question: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub answer: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub year: Option<String>,
    #[serde(default)]
    pub exam: Option<String>,
}

/// Top-level keys that mark a JSON object as a bundle, aliases included
pub const BUNDLE_KEYS: [&str; 8] = [
    "item",
    "summaries",
    "videos",
    "pyqs",
    "objectiveSets",
    "subjectiveSets",
    "objectiveQuestionSets",
    "subjectiveQuestionSets",
];

/// Everything attached to one hierarchy entity, in one payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetBundle {
    #[serde(default, deserialize_with = "null_as_default")]
    pub item: ItemMeta,
    #[serde(default, deserialize_with = "null_as_default")]
    pub summaries: Vec<Summary>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub videos: Vec<Video>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pyqs: Vec<Pyq>,
    #[serde(
        default,
        alias = "objectiveQuestionSets",
        deserialize_with = "null_as_default"
    )]
    pub objective_sets: TieredSets<ObjectiveQuestion>,
    #[serde(
        default,
        alias = "subjectiveQuestionSets",
        deserialize_with = "null_as_default"
    )]
    pub subjective_sets: TieredSets<SubjectiveQuestion>,
}

impl AssetBundle {
    pub fn find_objective_set(&self, set_id: &str) -> Option<&ObjectiveSet> {
        self.objective_sets.find_set(set_id).map(|(_, set)| set)
    }
}
