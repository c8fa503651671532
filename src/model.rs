// ABOUTME: Serde data models for GROWI and Knowledge API payloads
// ABOUTME: Tolerant parsing with optional fields, plus grant and visibility enums

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a request authenticates against the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthMode {
    /// API token as query parameter, form field or header.
    #[default]
    Token,
    /// Session cookie plus a scraped CSRF token on mutating calls.
    Session,
}

// ---------------------------------------------------------------------------
// GROWI
// ---------------------------------------------------------------------------

/// Page grant on GROWI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Grant {
    Public,
    Link,
    #[default]
    Private,
    /// Restricted to the named user group, resolved to an id at call time.
    Group(String),
}

impl Grant {
    pub fn code(&self) -> u8 {
        match self {
            Grant::Public => 1,
            Grant::Link => 2,
            Grant::Private => 4,
            Grant::Group(_) => 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub body: String,
}

/// Revision field of a page: populated on `pages.get`, a bare id elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RevisionRef {
    Populated(Revision),
    Id(String),
}

impl RevisionRef {
    pub fn id(&self) -> &str {
        match self {
            RevisionRef::Populated(rev) => &rev.id,
            RevisionRef::Id(id) => id,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            RevisionRef::Populated(rev) => Some(&rev.body),
            RevisionRef::Id(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowiPage {
    #[serde(rename = "_id")]
    pub id: String,
    pub path: String,
    #[serde(default)]
    pub revision: Option<RevisionRef>,
    #[serde(default)]
    pub grant: Option<u8>,
    #[serde(default, rename = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl GrowiPage {
    pub fn body(&self) -> &str {
        self.revision
            .as_ref()
            .and_then(RevisionRef::body)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageEnvelope {
    pub page: GrowiPage,
}

/// Identity of the page revision a mutation is based on.
///
/// Obtained from a read immediately before the mutating call and passed into
/// it explicitly. Another writer may commit between the two calls; the server
/// then rejects the stale revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRevision {
    pub page_id: String,
    pub revision_id: String,
}

impl PageRevision {
    pub fn of(page: &GrowiPage) -> Option<Self> {
        page.revision.as_ref().map(|rev| PageRevision {
            page_id: page.id.clone(),
            revision_id: rev.id().to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageList {
    #[serde(default)]
    pub pages: Vec<GrowiPage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRemoval {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default, rename = "isRecursively")]
    pub recursive: Option<bool>,
    #[serde(default, rename = "isCompletely")]
    pub complete: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowiAttachment {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, rename = "filePathProxied")]
    pub file_path_proxied: String,
    #[serde(default, rename = "originalName")]
    pub original_name: Option<String>,
    #[serde(default, rename = "fileFormat")]
    pub file_format: Option<String>,
    #[serde(default, rename = "fileSize")]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentEnvelope {
    pub attachment: GrowiAttachment,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadLimit {
    #[serde(rename = "isUploadable")]
    pub is_uploadable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowiUser {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserList {
    #[serde(default)]
    pub users: Vec<GrowiUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserGroup {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserGroupRelation {
    #[serde(rename = "relatedGroup")]
    pub related_group: UserGroup,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserGroupRelations {
    #[serde(default, rename = "userGroupRelations")]
    pub relations: Vec<UserGroupRelation>,
}

impl UserGroupRelations {
    pub fn group_id(&self, name: &str) -> Option<&str> {
        self.relations
            .iter()
            .map(|r| &r.related_group)
            .find(|g| g.name == name)
            .map(|g| g.id.as_str())
    }
}

// ---------------------------------------------------------------------------
// Knowledge
// ---------------------------------------------------------------------------

/// Page visibility (`publicFlag`) on Knowledge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    Public,
    #[default]
    Private,
    Protected,
}

impl Visibility {
    pub fn code(self) -> u8 {
        match self {
            Visibility::Public => 0,
            Visibility::Private => 1,
            Visibility::Protected => 2,
        }
    }
}

/// Visibility plus the explicit viewer lists of a Knowledge page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Access {
    pub visibility: Visibility,
    pub groups: Vec<u64>,
    pub users: Vec<u64>,
}

impl Access {
    pub fn new(visibility: Visibility) -> Self {
        Access {
            visibility,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRef {
    pub id: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewers {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<IdRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<IdRef>,
}

/// Request body for creating or replacing a Knowledge page.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeDraft {
    pub template: &'static str,
    pub title: String,
    pub content: String,
    #[serde(rename = "publicFlag")]
    pub public_flag: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewers: Option<Viewers>,
}

impl KnowledgeDraft {
    pub fn new(title: &str, content: &str, access: &Access) -> Self {
        let viewers = if access.groups.is_empty() && access.users.is_empty() {
            None
        } else {
            Some(Viewers {
                groups: access.groups.iter().map(|&id| IdRef { id }).collect(),
                users: access.users.iter().map(|&id| IdRef { id }).collect(),
            })
        };

        KnowledgeDraft {
            template: "knowledge",
            title: title.to_string(),
            content: content.to_string(),
            public_flag: access.visibility.code(),
            viewers,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeAttachment {
    #[serde(rename = "fileNo")]
    pub file_no: u64,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(default, rename = "fileSize")]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgePage {
    #[serde(rename = "knowledgeId")]
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "publicFlag")]
    pub public_flag: Option<u8>,
    #[serde(default)]
    pub attachments: Vec<KnowledgeAttachment>,
    #[serde(default)]
    pub viewers: Option<Viewers>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Response to a successful page creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedPage {
    pub id: u64,
    #[serde(default)]
    pub msg: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub msg: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub url: String,
    #[serde(default, rename = "fileNo")]
    pub file_no: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFiles {
    #[serde(default)]
    pub files: Vec<UploadedFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSummary {
    #[serde(rename = "knowledgeId")]
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "publicFlag")]
    pub public_flag: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeUser {
    #[serde(rename = "userId")]
    pub id: u64,
    #[serde(default, rename = "userName")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeGroup {
    #[serde(rename = "groupId")]
    pub id: u64,
    #[serde(default, rename = "groupName")]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_codes() {
        assert_eq!(Grant::Public.code(), 1);
        assert_eq!(Grant::Link.code(), 2);
        assert_eq!(Grant::Private.code(), 4);
        assert_eq!(Grant::Group("dev".into()).code(), 5);
        assert_eq!(Grant::default(), Grant::Private);
    }

    #[test]
    fn test_visibility_codes() {
        assert_eq!(Visibility::Public.code(), 0);
        assert_eq!(Visibility::Private.code(), 1);
        assert_eq!(Visibility::Protected.code(), 2);
    }

    #[test]
    fn test_growi_page_populated_revision() {
        let json = r##"{
            "ok": true,
            "page": {
                "_id": "p1",
                "path": "/test/page",
                "grant": 4,
                "updatedAt": "2024-03-01T10:00:00.000Z",
                "revision": {"_id": "r1", "body": "# Hello"}
            }
        }"##;
        let envelope: PageEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.page.body(), "# Hello");
        assert!(envelope.page.updated_at.is_some());

        let rev = PageRevision::of(&envelope.page).unwrap();
        assert_eq!(rev.page_id, "p1");
        assert_eq!(rev.revision_id, "r1");
    }

    #[test]
    fn test_growi_page_revision_id_only() {
        let json = r#"{"_id": "p1", "path": "/a", "revision": "r9", "extra": 1}"#;
        let page: GrowiPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.body(), "");
        assert_eq!(PageRevision::of(&page).unwrap().revision_id, "r9");
    }

    #[test]
    fn test_group_lookup() {
        let json = r#"{"userGroupRelations": [
            {"relatedGroup": {"_id": "g1", "name": "ops"}},
            {"relatedGroup": {"_id": "g2", "name": "dev"}}
        ]}"#;
        let relations: UserGroupRelations = serde_json::from_str(json).unwrap();
        assert_eq!(relations.group_id("dev"), Some("g2"));
        assert_eq!(relations.group_id("qa"), None);
    }

    #[test]
    fn test_knowledge_draft_without_viewers() {
        let draft = KnowledgeDraft::new("Title", "body", &Access::new(Visibility::Public));
        let value = serde_json::to_value(&draft).unwrap();
        assert_eq!(value["template"], "knowledge");
        assert_eq!(value["publicFlag"], 0);
        assert!(value.get("viewers").is_none());
    }

    #[test]
    fn test_knowledge_draft_with_group_viewers() {
        let access = Access {
            visibility: Visibility::Protected,
            groups: vec![3, 4],
            users: vec![],
        };
        let value = serde_json::to_value(KnowledgeDraft::new("T", "c", &access)).unwrap();
        assert_eq!(value["viewers"]["groups"][1]["id"], 4);
        assert!(value["viewers"].get("users").is_none());
    }

    #[test]
    fn test_knowledge_page_deserialize() {
        let json = r#"{
            "knowledgeId": 7,
            "title": "Guide",
            "content": "text",
            "publicFlag": 1,
            "attachments": [{"fileNo": 5, "fileName": "b.png", "fileSize": 12}]
        }"#;
        let page: KnowledgePage = serde_json::from_str(json).unwrap();
        assert_eq!(page.id, 7);
        assert_eq!(page.attachments[0].file_name, "b.png");
        assert!(page.tags.is_empty());
    }
}
