// ABOUTME: GROWI wiki client: page and attachment CRUD over the /_api endpoints
// ABOUTME: Plus Markdown import/export with attachment link rewriting

use crate::config::Connection;
use crate::markdown::{
    growi_attachment_ids, growi_attachment_ref, progress, rewrite_imported, skip_rejected,
    ExportDir, RemoteLinks,
};
use crate::model::{
    AttachmentEnvelope, AuthMode, Grant, GrowiAttachment, GrowiPage, GrowiUser, PageEnvelope,
    PageList, PageRemoval, PageRevision, UploadLimit, UserGroupRelations, UserList,
};
use crate::service::MarkdownService;
use crate::storage::{guess_content_type, local_file_name};
use crate::transport::Transport;
use crate::{Error, Outcome, Refusal, Result};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::RequestBuilder;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Body of the page created before assets are uploaded.
const IMPORT_PLACEHOLDER: &str = "markdown";

fn api_path(api: &str) -> String {
    format!("/_api/{}", api)
}

enum Credentials<'a> {
    Token,
    Session { cookie: &'a str, csrf: String },
}

pub struct GrowiClient {
    transport: Transport,
}

impl GrowiClient {
    pub fn new(connection: Connection) -> Result<Self> {
        Ok(GrowiClient {
            transport: Transport::new(connection)?,
        })
    }

    pub fn connection(&self) -> &Connection {
        self.transport.connection()
    }

    fn session_cookie(&self, auth: AuthMode) -> Option<&str> {
        match auth {
            AuthMode::Session => self.transport.cookie(),
            AuthMode::Token => None,
        }
    }

    /// Session credentials when asked for and a cookie is configured,
    /// otherwise the access token.
    fn credentials(&self, auth: AuthMode) -> Result<Credentials<'_>> {
        match self.session_cookie(auth) {
            Some(cookie) => Ok(Credentials::Session {
                cookie,
                csrf: self.transport.csrf_token("/")?,
            }),
            None => Ok(Credentials::Token),
        }
    }

    fn envelope<T: DeserializeOwned>(&self, api: &str, request: RequestBuilder) -> Result<T> {
        let value: Value = self.transport.send_json(api, request)?;

        if value.get("ok").and_then(Value::as_bool) == Some(false) {
            let message = match value.get("error") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => "ok: false".into(),
            };
            return Err(Error::Rejected {
                endpoint: api.into(),
                message,
            });
        }

        Ok(serde_json::from_value(value)?)
    }

    fn get<T: DeserializeOwned>(
        &self,
        api: &str,
        params: &[(&str, &str)],
        auth: AuthMode,
    ) -> Result<T> {
        let path = api_path(api);
        let request = match self.session_cookie(auth) {
            Some(cookie) => self
                .transport
                .session_request(Method::GET, &path, cookie)
                .query(params),
            None => self
                .transport
                .request(Method::GET, &path)
                .query(params)
                .query(&[("access_token", self.transport.token())]),
        };
        self.envelope(api, request)
    }

    fn post<T: DeserializeOwned>(
        &self,
        api: &str,
        mut data: Map<String, Value>,
        credentials: &Credentials<'_>,
    ) -> Result<T> {
        let path = api_path(api);
        let request = match credentials {
            Credentials::Session { cookie, csrf } => {
                data.insert("_csrf".into(), json!(csrf));
                self.transport.session_request(Method::POST, &path, cookie)
            }
            Credentials::Token => {
                data.insert("access_token".into(), json!(self.transport.token()));
                self.transport.request(Method::POST, &path)
            }
        };
        self.envelope(api, request.json(&data))
    }

    pub fn get_page(&self, page_path: &str, auth: AuthMode) -> Result<GrowiPage> {
        let envelope: PageEnvelope = self.get("pages.get", &[("path", page_path)], auth)?;
        Ok(envelope.page)
    }

    /// First half of every mutation: the revision the write will be based on.
    pub fn current_revision(&self, page_path: &str, auth: AuthMode) -> Result<PageRevision> {
        let page = self.get_page(page_path, auth)?;
        PageRevision::of(&page).ok_or_else(|| Error::Rejected {
            endpoint: "pages.get".into(),
            message: format!("page {} has no revision", page_path),
        })
    }

    /// `grant` plus, for group pages, the id of the named group.
    fn grant_fields(&self, grant: &Grant, auth: AuthMode) -> Result<Outcome<Map<String, Value>>> {
        let mut fields = Map::new();
        fields.insert("grant".into(), json!(grant.code()));

        if let Grant::Group(name) = grant {
            let groups = self.list_groups(auth)?;
            match groups.group_id(name) {
                Some(id) => {
                    fields.insert("grantUserGroupId".into(), json!(id));
                }
                None => return Ok(Err(Refusal::GroupNotFound(name.clone()))),
            }
        }

        Ok(Ok(fields))
    }

    pub fn create_page(
        &self,
        page_path: &str,
        body: &str,
        grant: &Grant,
        auth: AuthMode,
    ) -> Result<Outcome<GrowiPage>> {
        let mut data = match self.grant_fields(grant, auth)? {
            Ok(fields) => fields,
            Err(refusal) => return Ok(Err(refusal)),
        };
        data.insert("path".into(), json!(page_path));
        data.insert("body".into(), json!(body));

        let credentials = self.credentials(auth)?;
        let envelope: PageEnvelope = self.post("pages.create", data, &credentials)?;
        debug!(path = page_path, id = %envelope.page.id, "created page");
        Ok(Ok(envelope.page))
    }

    /// Second half of a mutation: writes `body` on top of `revision`.
    pub fn update_page_at(
        &self,
        revision: &PageRevision,
        body: &str,
        grant: &Grant,
        auth: AuthMode,
    ) -> Result<Outcome<GrowiPage>> {
        let mut data = match self.grant_fields(grant, auth)? {
            Ok(fields) => fields,
            Err(refusal) => return Ok(Err(refusal)),
        };
        data.insert("page_id".into(), json!(revision.page_id));
        data.insert("revision_id".into(), json!(revision.revision_id));
        data.insert("body".into(), json!(body));

        let credentials = self.credentials(auth)?;
        let envelope: PageEnvelope = self.post("pages.update", data, &credentials)?;
        Ok(Ok(envelope.page))
    }

    pub fn update_page(
        &self,
        page_path: &str,
        body: &str,
        grant: &Grant,
        auth: AuthMode,
    ) -> Result<Outcome<GrowiPage>> {
        let revision = self.current_revision(page_path, auth)?;
        self.update_page_at(&revision, body, grant, auth)
    }

    /// Removes a page. Needs session mode with a configured cookie; without
    /// one nothing is sent.
    ///
    /// `recursive` and `complete` are forwarded as `recursively` and
    /// `completely`; the latter only when set.
    pub fn delete_page(
        &self,
        page_path: &str,
        recursive: bool,
        complete: bool,
        auth: AuthMode,
    ) -> Result<Outcome<PageRemoval>> {
        let Some(cookie) = self.session_cookie(auth) else {
            return Ok(Err(Refusal::NotAuthorized));
        };

        let revision = self.current_revision(page_path, AuthMode::Token)?;
        let csrf = self.transport.csrf_token(page_path)?;
        if csrf.is_empty() {
            return Ok(Err(Refusal::CsrfTokenMissing));
        }

        let mut data = Map::new();
        data.insert("page_id".into(), json!(revision.page_id));
        data.insert("revision_id".into(), json!(revision.revision_id));
        data.insert("recursively".into(), json!(recursive));
        if complete {
            data.insert("completely".into(), json!(true));
        }

        let removal = self.post("pages.remove", data, &Credentials::Session { cookie, csrf })?;
        Ok(Ok(removal))
    }

    /// Raw attachment content. The download route only accepts sessions.
    pub fn get_attachment(&self, attachment_id: &str, auth: AuthMode) -> Result<Outcome<Vec<u8>>> {
        let Some(cookie) = self.session_cookie(auth) else {
            return Ok(Err(Refusal::NotAuthorized));
        };

        let path = format!("/download/{}", attachment_id);
        let request = self.transport.session_request(Method::GET, &path, cookie);
        Ok(Ok(self.transport.send_bytes(&path, request)?))
    }

    /// Uploads `file` to the page at `page_path` after checking the
    /// service's size limit.
    pub fn send_attachment(
        &self,
        page_path: &str,
        file: &Path,
        content_type: Option<&str>,
    ) -> Result<Outcome<GrowiAttachment>> {
        let size = fs::metadata(file)?.len();
        let size_param = size.to_string();
        let limit: UploadLimit = self.get(
            "attachments.limit",
            &[("fileSize", size_param.as_str())],
            AuthMode::Token,
        )?;
        if !limit.is_uploadable {
            return Ok(Err(Refusal::UploadTooLarge { size }));
        }

        let page = self.get_page(page_path, AuthMode::Token)?;

        let file_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();
        let content_type = content_type
            .map(str::to_string)
            .unwrap_or_else(|| guess_content_type(file));
        let part = Part::bytes(fs::read(file)?)
            .file_name(file_name)
            .mime_str(&content_type)?;
        let form = Form::new()
            .text("page_id", page.id)
            .text("access_token", self.transport.token().to_string())
            .part("file", part);

        let request = self
            .transport
            .request(Method::POST, &api_path("attachments.add"))
            .multipart(form);
        let envelope: AttachmentEnvelope = self.envelope("attachments.add", request)?;
        Ok(Ok(envelope.attachment))
    }

    pub fn delete_attachment(&self, attachment_id: &str) -> Result<()> {
        let mut data = Map::new();
        data.insert("attachment_id".into(), json!(attachment_id));
        let _: Value = self.post("attachments.remove", data, &Credentials::Token)?;
        Ok(())
    }

    pub fn list_pages(&self, page_path: &str) -> Result<Vec<GrowiPage>> {
        let list: PageList = self.get("pages.list", &[("path", page_path)], AuthMode::Token)?;
        Ok(list.pages)
    }

    pub fn list_users(&self) -> Result<Vec<GrowiUser>> {
        let list: UserList = self.get("users.list", &[], AuthMode::Token)?;
        Ok(list.users)
    }

    /// Groups the current user belongs to.
    pub fn list_groups(&self, auth: AuthMode) -> Result<UserGroupRelations> {
        self.get("me/user-group-relations", &[], auth)
    }

    /// Creates `page_path` from a local Markdown file, uploading every file
    /// under `image_dir` (relative to the Markdown file) and pointing the
    /// matching references at the uploaded attachments.
    pub fn create_markdown_page(
        &self,
        page_path: &str,
        markdown: &Path,
        image_dir: &str,
        grant: &Grant,
    ) -> Result<Outcome<GrowiPage>> {
        if let Err(refusal) = self.create_page(page_path, IMPORT_PLACEHOLDER, grant, AuthMode::Token)? {
            return Ok(Err(refusal));
        }

        let body = rewrite_imported(markdown, image_dir, |asset| {
            let content_type = asset.content_type();
            match skip_rejected(self.send_attachment(page_path, &asset.path, Some(&content_type)))? {
                Some(Ok(attachment)) => Ok(Some(attachment.file_path_proxied)),
                Some(Err(refusal)) => {
                    warn!(asset = %asset.path.display(), %refusal, "attachment not uploaded");
                    Ok(None)
                }
                None => Ok(None),
            }
        })?;

        self.update_page(page_path, &body, grant, AuthMode::Token)
    }

    /// Writes `<target_dir>/<last path segment>.md` plus `img/attachment_<id>`
    /// for every linked attachment that could be downloaded.
    ///
    /// Returns the page as fetched, before any rewriting.
    pub fn download_markdown_page(&self, page_path: &str, target_dir: &Path) -> Result<GrowiPage> {
        let page = self.get_page(page_path, AuthMode::Token)?;
        let mut export = ExportDir::prepare(target_dir, RemoteLinks::GrowiAttachment)?;

        let ids = growi_attachment_ids(page.body());
        let pb = progress(ids.len(), "downloading");
        for id in &ids {
            let reference = growi_attachment_ref(id);
            match skip_rejected(self.get_attachment(id, AuthMode::Session))? {
                Some(Ok(content)) => {
                    export.store(&reference, id, &format!("attachment_{}", id), &content)?;
                }
                Some(Err(refusal)) => warn!(reference = %reference, %refusal, "attachment not downloaded"),
                None => {}
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        export.finish(&local_file_name(page_path), page.body())?;
        Ok(page)
    }
}

impl MarkdownService for GrowiClient {
    type ImportTarget = str;
    type ExportTarget = str;
    type Access = Grant;
    type Imported = GrowiPage;
    type Exported = GrowiPage;

    fn create_markdown_page(
        &self,
        target: &str,
        markdown: &Path,
        image_dir: &str,
        access: &Grant,
    ) -> Result<Outcome<GrowiPage>> {
        GrowiClient::create_markdown_page(self, target, markdown, image_dir, access)
    }

    fn download_markdown_page(&self, target: &str, target_dir: &Path) -> Result<GrowiPage> {
        GrowiClient::download_markdown_page(self, target, target_dir)
    }
}
