use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Guid = String;
pub type UserId = String;

pub const GUID_LEN: usize = 5;
const GUID_ALPHABET: &[u8] = b"23456789abcdefghjkmnpqrstuvwxyz";

pub const MAX_COMMENT_LENGTH: usize = 500;

pub fn new_guid() -> Guid {
    let mut rng = rand::thread_rng();
    (0..GUID_LEN)
        .map(|_| GUID_ALPHABET[rng.gen_range(0..GUID_ALPHABET.len())] as char)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferentKind {
    Node,
    Comment,
    File,
    User,
}

impl ReferentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferentKind::Node => "node",
            ReferentKind::Comment => "comment",
            ReferentKind::File => "file",
            ReferentKind::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "node" => Some(ReferentKind::Node),
            "comment" => Some(ReferentKind::Comment),
            "file" => Some(ReferentKind::File),
            "user" => Some(ReferentKind::User),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuidRecord {
    pub id: Guid,
    pub kind: ReferentKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CommentLevel {
    #[default]
    Public,
    Private,
}

impl CommentLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentLevel::Public => "public",
            CommentLevel::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(CommentLevel::Public),
            "private" => Some(CommentLevel::Private),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Node {
    pub id: Guid,
    pub title: String,
    pub is_public: bool,
    pub comment_level: CommentLevel,
    pub contributors: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Node {
    pub fn is_contributor(&self, user: &str) -> bool {
        self.contributors.contains(user)
    }

    pub fn can_view(&self, viewer: Option<&str>) -> bool {
        self.is_public || viewer.map(|u| self.is_contributor(u)).unwrap_or(false)
    }

    pub fn can_comment(&self, user: &str) -> bool {
        match self.comment_level {
            CommentLevel::Public => self.is_public || self.is_contributor(user),
            CommentLevel::Private => self.is_contributor(user),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewNode {
    pub title: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub comment_level: CommentLevel,
    #[serde(default)]
    pub contributors: Vec<UserId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReportCategory {
    Spam,
    Hate,
    Violence,
}

impl ReportCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportCategory::Spam => "spam",
            ReportCategory::Hate => "hate",
            ReportCategory::Violence => "violence",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "spam" => Some(ReportCategory::Spam),
            "hate" => Some(ReportCategory::Hate),
            "violence" => Some(ReportCategory::Violence),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReportCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub reporter_id: UserId,
    pub category: ReportCategory,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Guid,
    pub author: UserId,
    pub target_id: Guid,
    pub node_id: Guid,
    pub content: String,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub is_modified: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(default)]
    pub reports: HashMap<UserId, Report>,
    // bumped on every lifecycle commit
    #[serde(default)]
    pub version: i64,
}

impl Comment {
    pub fn new(author: UserId, target_id: Guid, node_id: Guid, content: String) -> Self {
        let now = Utc::now();
        Self {
            id: new_guid(),
            author,
            target_id,
            node_id,
            content,
            is_deleted: false,
            is_modified: false,
            created_at: now,
            modified_at: now,
            reports: HashMap::new(),
            version: 0,
        }
    }

    pub fn can_edit(&self, user: &str) -> bool {
        self.author == user
    }

    pub fn has_reported(&self, user: &str) -> bool {
        self.reports.contains_key(user)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    ContentContainer,
    Comment,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::ContentContainer => "content-container",
            TargetKind::Comment => "comment",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewComment {
    pub target_id: Guid,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateComment {
    pub content: Option<String>,
    pub deleted: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewReport {
    pub category: ReportCategory,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommentOut {
    pub id: Guid,
    pub author: UserId,
    pub node_id: Guid,
    pub target_id: Guid,
    pub target_type: TargetKind,
    // hidden from everyone but the author once deleted
    pub content: Option<String>,
    pub deleted: bool,
    pub modified: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl CommentOut {
    pub fn render(comment: &Comment, target_type: TargetKind, viewer: Option<&str>) -> Self {
        let show = !comment.is_deleted || viewer == Some(comment.author.as_str());
        Self {
            id: comment.id.clone(),
            author: comment.author.clone(),
            node_id: comment.node_id.clone(),
            target_id: comment.target_id.clone(),
            target_type,
            content: show.then(|| comment.content.clone()),
            deleted: comment.is_deleted,
            modified: comment.is_modified,
            created_at: comment.created_at,
            modified_at: comment.modified_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportOut {
    pub id: UserId,
    pub category: ReportCategory,
    pub message: String,
}

impl From<Report> for ReportOut {
    fn from(r: Report) -> Self {
        Self { id: r.reporter_id, category: r.category, message: r.message }
    }
}
