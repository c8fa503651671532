// ABOUTME: Knowledge base client: JSON API with private tokens, file routes with sessions
// ABOUTME: Plus Markdown import/export with open.file download link rewriting

use crate::config::Connection;
use crate::markdown::{
    knowledge_download_ref, knowledge_file_numbers, progress, rewrite_imported, skip_rejected,
    ExportDir, RemoteLinks,
};
use crate::model::{
    Access, ApiMessage, CreatedPage, KnowledgeDraft, KnowledgeGroup, KnowledgePage,
    KnowledgeSummary, KnowledgeUser, UploadedFile, UploadedFiles,
};
use crate::service::MarkdownService;
use crate::storage::guess_content_type;
use crate::transport::Transport;
use crate::{Error, Outcome, Refusal, Result};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

const IMPORT_PLACEHOLDER: &str = "# markdown";
const TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const UPLOAD_PATH: &str = "/protect.file/upload";

fn api_path(api: &str) -> String {
    format!("/api/{}", api)
}

pub struct KnowledgeClient {
    transport: Transport,
}

impl KnowledgeClient {
    pub fn new(connection: Connection) -> Result<Self> {
        Ok(KnowledgeClient {
            transport: Transport::new(connection)?,
        })
    }

    pub fn connection(&self) -> &Connection {
        self.transport.connection()
    }

    fn get<T: DeserializeOwned>(&self, api: &str, params: &[(&str, &str)]) -> Result<T> {
        let request = self
            .transport
            .request(Method::GET, &api_path(api))
            .query(params)
            .query(&[("private_token", self.transport.token())]);
        self.transport.send_json(api, request)
    }

    fn send<T: DeserializeOwned, B: Serialize>(&self, method: Method, api: &str, body: &B) -> Result<T> {
        let request = self
            .transport
            .request(method, &api_path(api))
            .header(TOKEN_HEADER, self.transport.token())
            .json(body);
        self.transport.send_json(api, request)
    }

    pub fn get_page(&self, page_id: u64) -> Result<KnowledgePage> {
        self.get(&format!("knowledges/{}", page_id), &[])
    }

    pub fn create_page(&self, title: &str, body: &str, access: &Access) -> Result<CreatedPage> {
        let draft = KnowledgeDraft::new(title, body, access);
        let created: CreatedPage = self.send(Method::POST, "knowledges", &draft)?;
        debug!(id = created.id, title, "created page");
        Ok(created)
    }

    pub fn update_page(&self, page_id: u64, title: &str, body: &str, access: &Access) -> Result<ApiMessage> {
        let draft = KnowledgeDraft::new(title, body, access);
        self.send(Method::PUT, &format!("knowledges/{}", page_id), &draft)
    }

    pub fn delete_page(&self, page_id: u64) -> Result<ApiMessage> {
        let api = format!("knowledges/{}", page_id);
        let request = self
            .transport
            .request(Method::DELETE, &api_path(&api))
            .query(&[("private_token", self.transport.token())]);
        self.transport.send_json(&api, request)
    }

    pub fn get_attachment(&self, file_no: u64) -> Result<Vec<u8>> {
        let api = format!("attachments/{}", file_no);
        let request = self
            .transport
            .request(Method::GET, &api_path(&api))
            .query(&[("private_token", self.transport.token())]);
        self.transport.send_bytes(&api, request)
    }

    /// Uploads `file` through the browser upload route, which only accepts
    /// sessions. The route does not link files to a page; `page_id` is the
    /// page whose body will reference the returned URL.
    pub fn send_attachment(
        &self,
        page_id: u64,
        file: &Path,
        content_type: Option<&str>,
    ) -> Result<Outcome<UploadedFile>> {
        let Some(cookie) = self.transport.cookie() else {
            return Ok(Err(Refusal::NotAuthorized));
        };

        let file_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();
        let content_type = content_type
            .map(str::to_string)
            .unwrap_or_else(|| guess_content_type(file));
        debug!(page_id, file = %file_name, "uploading attachment");

        let part = Part::bytes(fs::read(file)?)
            .file_name(file_name)
            .mime_str(&content_type)?;
        let request = self
            .transport
            .session_request(Method::POST, UPLOAD_PATH, cookie)
            .multipart(Form::new().part("files[]", part));

        let uploaded: UploadedFiles = self.transport.send_json(UPLOAD_PATH, request)?;
        let file = uploaded.files.into_iter().next().ok_or_else(|| Error::Rejected {
            endpoint: UPLOAD_PATH.into(),
            message: "no file in upload response".into(),
        })?;
        Ok(Ok(file))
    }

    pub fn delete_attachment(&self, file_no: u64) -> Result<Outcome<ApiMessage>> {
        let Some(cookie) = self.transport.cookie() else {
            return Ok(Err(Refusal::NotAuthorized));
        };

        let path = format!("/protect.file/delete/{}", file_no);
        let request = self.transport.session_request(Method::DELETE, &path, cookie);
        Ok(Ok(self.transport.send_json(&path, request)?))
    }

    pub fn list_pages(&self, offset: u64) -> Result<Vec<KnowledgeSummary>> {
        self.get("knowledges", &[("offset", offset.to_string().as_str())])
    }

    pub fn list_users(&self) -> Result<Vec<KnowledgeUser>> {
        self.get("users", &[])
    }

    pub fn list_groups(&self) -> Result<Vec<KnowledgeGroup>> {
        self.get("groups", &[])
    }

    /// Creates a page titled `title` from a local Markdown file, uploading
    /// every file under `image_dir` and pointing references at the uploads.
    ///
    /// Returns the creation record of the new page.
    pub fn create_markdown_page(
        &self,
        title: &str,
        markdown: &Path,
        image_dir: &str,
        access: &Access,
    ) -> Result<CreatedPage> {
        let created = self.create_page(title, IMPORT_PLACEHOLDER, access)?;

        let body = rewrite_imported(markdown, image_dir, |asset| {
            let content_type = asset.content_type();
            match skip_rejected(self.send_attachment(created.id, &asset.path, Some(&content_type)))? {
                Some(Ok(file)) => Ok(Some(file.url)),
                Some(Err(refusal)) => {
                    warn!(asset = %asset.path.display(), %refusal, "attachment not uploaded");
                    Ok(None)
                }
                None => Ok(None),
            }
        })?;

        self.update_page(created.id, title, &body, access)?;
        Ok(created)
    }

    /// Writes `<target_dir>/<title>.md` plus the page's attachments under
    /// `img/`: listed attachments under their reported names, other
    /// `fileNo` links as `attachment_<n>`. Clashing names get a `<n>_` prefix.
    ///
    /// Returns the page as fetched, before any rewriting.
    pub fn download_markdown_page(&self, page_id: u64, target_dir: &Path) -> Result<KnowledgePage> {
        let page = self.get_page(page_id)?;
        let mut export = ExportDir::prepare(target_dir, RemoteLinks::KnowledgeDownload)?;

        let inline: Vec<u64> = knowledge_file_numbers(&page.content)
            .into_iter()
            .filter(|n| !page.attachments.iter().any(|a| a.file_no == *n))
            .collect();

        let pb = progress(page.attachments.len() + inline.len(), "downloading");
        for attachment in &page.attachments {
            let reference = knowledge_download_ref(attachment.file_no);
            if !export.is_mapped(&reference) {
                if let Some(content) = skip_rejected(self.get_attachment(attachment.file_no))? {
                    let id = attachment.file_no.to_string();
                    export.store(&reference, &id, &attachment.file_name, &content)?;
                }
            }
            pb.inc(1);
        }
        for file_no in inline {
            let reference = knowledge_download_ref(file_no);
            if let Some(content) = skip_rejected(self.get_attachment(file_no))? {
                let id = file_no.to_string();
                export.store(&reference, &id, &format!("attachment_{}", file_no), &content)?;
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        export.finish(&page.title, &page.content)?;
        Ok(page)
    }
}

impl MarkdownService for KnowledgeClient {
    type ImportTarget = str;
    type ExportTarget = u64;
    type Access = Access;
    type Imported = CreatedPage;
    type Exported = KnowledgePage;

    fn create_markdown_page(
        &self,
        target: &str,
        markdown: &Path,
        image_dir: &str,
        access: &Access,
    ) -> Result<Outcome<CreatedPage>> {
        KnowledgeClient::create_markdown_page(self, target, markdown, image_dir, access).map(Ok)
    }

    fn download_markdown_page(&self, target: &u64, target_dir: &Path) -> Result<KnowledgePage> {
        KnowledgeClient::download_markdown_page(self, *target, target_dir)
    }
}
