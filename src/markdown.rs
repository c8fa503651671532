// ABOUTME: Asset-reference rewriting shared by Markdown import and export
// ABOUTME: Reference maps, service link patterns, local asset scans and export trees

use crate::storage::{guess_content_type, list_files, local_file_name, page_file_stem, write_atomic};
use crate::Result;
use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Sub-directory of an export target that receives downloaded attachments.
pub const IMAGE_DIR: &str = "img";

static GROWI_ATTACHMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/attachment/([0-9a-f]+)").expect("valid attachment pattern"));

static KNOWLEDGE_DOWNLOAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/open\.file/download\?fileNo=([0-9]+)").expect("valid download pattern")
});

/// Shape of the remote links an export rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteLinks {
    GrowiAttachment,
    KnowledgeDownload,
}

impl RemoteLinks {
    pub fn pattern(self) -> &'static Regex {
        match self {
            RemoteLinks::GrowiAttachment => &*GROWI_ATTACHMENT,
            RemoteLinks::KnowledgeDownload => &*KNOWLEDGE_DOWNLOAD,
        }
    }
}

pub fn growi_attachment_ref(id: &str) -> String {
    format!("/attachment/{}", id)
}

pub fn knowledge_download_ref(file_no: u64) -> String {
    format!("/open.file/download?fileNo={}", file_no)
}

/// Attachment ids linked from a GROWI body, first occurrence order, no repeats.
pub fn growi_attachment_ids(body: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for caps in GROWI_ATTACHMENT.captures_iter(body) {
        let id = &caps[1];
        if !ids.iter().any(|seen| seen == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

/// File numbers linked from a Knowledge body, first occurrence order, no repeats.
pub fn knowledge_file_numbers(body: &str) -> Vec<u64> {
    let mut numbers = Vec::new();
    for caps in KNOWLEDGE_DOWNLOAD.captures_iter(body) {
        if let Ok(n) = caps[1].parse::<u64>() {
            if !numbers.contains(&n) {
                numbers.push(n);
            }
        }
    }
    numbers
}

/// One-call association between asset references on either side.
///
/// Rewriting is plain substring replacement over the whole body: text that
/// happens to equal a reference outside of a link is rewritten as well.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceMap {
    entries: Vec<(String, String)>,
}

impl ReferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mapping. Empty or already-mapped sources are ignored.
    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) -> bool {
        let from = from.into();
        if from.is_empty() || self.contains(&from) {
            return false;
        }
        self.entries.push((from, to.into()));
        true
    }

    pub fn contains(&self, from: &str) -> bool {
        self.entries.iter().any(|(f, _)| f == from)
    }

    pub fn get(&self, from: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(f, _)| f == from)
            .map(|(_, t)| t.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(f, t)| (f.as_str(), t.as_str()))
    }

    pub fn inverse(&self) -> ReferenceMap {
        let mut inverse = ReferenceMap::new();
        for (from, to) in self.iter() {
            inverse.insert(to, from);
        }
        inverse
    }

    /// Replaces every occurrence of each source with its target.
    ///
    /// Longer sources go first so `/attachment/ab` cannot eat the front of
    /// `/attachment/abc`.
    pub fn apply(&self, body: &str) -> String {
        let mut order: Vec<&(String, String)> = self.entries.iter().collect();
        order.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        order
            .into_iter()
            .fold(body.to_string(), |acc, (from, to)| acc.replace(from.as_str(), to))
    }

    /// Replaces whole matches of `links` that have a mapping. Unmapped
    /// matches are left as they are, even when a mapped link is their prefix.
    pub fn apply_links(&self, body: &str, links: &Regex) -> String {
        links
            .replace_all(body, |caps: &Captures| {
                let found = &caps[0];
                self.get(found).unwrap_or(found).to_string()
            })
            .into_owned()
    }
}

/// Reference a Markdown file uses for `file_name` under `relative_dir`.
pub fn local_reference(relative_dir: &str, file_name: &str) -> String {
    let dir = relative_dir.trim_end_matches(|c: char| c == '/' || c == '\\');
    if dir.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", dir, file_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAsset {
    pub path: PathBuf,
    pub reference: String,
}

impl LocalAsset {
    pub fn content_type(&self) -> String {
        guess_content_type(&self.path)
    }
}

/// Files next to `markdown` under `relative_dir`, with the reference each one
/// is expected to have inside the Markdown text.
pub fn scan_assets(markdown: &Path, relative_dir: &str) -> Result<Vec<LocalAsset>> {
    let base = markdown.parent().unwrap_or_else(|| Path::new("."));
    let image_dir = base.join(relative_dir);

    let assets = list_files(&image_dir)?
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_string();
            Some(LocalAsset {
                reference: local_reference(relative_dir, &name),
                path,
            })
        })
        .collect();
    Ok(assets)
}

/// Uploads every asset next to `markdown` and returns the Markdown text with
/// local references replaced by what `upload` reported.
///
/// `upload` returning `None` leaves that asset's references untouched.
pub fn rewrite_imported<F>(markdown: &Path, relative_dir: &str, mut upload: F) -> Result<String>
where
    F: FnMut(&LocalAsset) -> Result<Option<String>>,
{
    let assets = scan_assets(markdown, relative_dir)?;
    let mut map = ReferenceMap::new();

    let pb = progress(assets.len(), "uploading");
    for asset in &assets {
        match upload(asset)? {
            Some(remote) => {
                map.insert(asset.reference.clone(), remote);
            }
            None => debug!(asset = %asset.path.display(), "reference left as is"),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let body = fs::read_to_string(markdown)?;
    info!(
        markdown = %markdown.display(),
        uploaded = map.len(),
        found = assets.len(),
        "rewrote local asset references"
    );
    Ok(map.apply(&body))
}

/// Target directory of one export: `<root>/img/` plus the Markdown file.
pub struct ExportDir {
    root: PathBuf,
    images: PathBuf,
    links: RemoteLinks,
    map: ReferenceMap,
    names: HashSet<String>,
}

impl ExportDir {
    pub fn prepare(root: &Path, links: RemoteLinks) -> Result<Self> {
        let images = root.join(IMAGE_DIR);
        fs::create_dir_all(&images)?;

        Ok(ExportDir {
            root: root.to_path_buf(),
            images,
            links,
            map: ReferenceMap::new(),
            names: HashSet::new(),
        })
    }

    pub fn is_mapped(&self, remote: &str) -> bool {
        self.map.contains(remote)
    }

    /// Writes `content` under `img/` and maps `remote` to it.
    ///
    /// The file is named after `local_name`, or `<id>_<local_name>` when an
    /// earlier attachment of this export already took that name. Empty
    /// content is skipped: no file is written and `remote` stays in the body.
    pub fn store(&mut self, remote: &str, id: &str, local_name: &str, content: &[u8]) -> Result<bool> {
        if content.is_empty() {
            warn!(reference = remote, "download returned no content, skipped");
            return Ok(false);
        }

        let name = self.unique_name(id, &local_file_name(local_name));
        write_atomic(&self.images.join(&name), content)?;
        self.map.insert(remote, format!("{}/{}", IMAGE_DIR, name));
        self.names.insert(name);
        Ok(true)
    }

    fn unique_name(&self, id: &str, name: &str) -> String {
        if !self.names.contains(name) {
            return name.to_string();
        }

        let mut candidate = format!("{}_{}", id, name);
        let mut n = 1;
        while self.names.contains(&candidate) {
            n += 1;
            candidate = format!("{}_{}_{}", id, n, name);
        }
        candidate
    }

    /// Rewrites the downloaded links in `body` and writes it to
    /// `<root>/<stem>.md`.
    pub fn finish(self, stem: &str, body: &str) -> Result<PathBuf> {
        let path = self.root.join(format!("{}.md", page_file_stem(stem)));
        write_atomic(&path, self.map.apply_links(body, self.links.pattern()).as_bytes())?;

        info!(
            markdown = %path.display(),
            attachments = self.map.len(),
            "exported page"
        );
        Ok(path)
    }
}

/// Turns a per-asset rejection into `None` so the surrounding transfer can
/// carry on. Other failures still propagate.
pub(crate) fn skip_rejected<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_rejection() => {
            warn!(error = %e, "transfer rejected, reference left as is");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

pub(crate) fn progress(len: usize, message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::with_template("[{bar:40}] {pos}/{len} {msg}")
            .map(|style| style.progress_chars("##-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.set_message(message);
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_growi_attachment_ids_dedup() {
        let body = "![a](/attachment/abc123) ![b](/attachment/ff00) ![a](/attachment/abc123) /attachment/";
        assert_eq!(growi_attachment_ids(body), vec!["abc123", "ff00"]);
    }

    #[test]
    fn test_knowledge_file_numbers() {
        let body = "[x](/open.file/download?fileNo=42) /open.file/download?fileNo= \
                    /open.file/download?fileNo=7 /open.file/download?fileNo=42";
        assert_eq!(knowledge_file_numbers(body), vec![42, 7]);
    }

    #[test]
    fn test_apply_replaces_all_occurrences() {
        let mut map = ReferenceMap::new();
        map.insert("img/pic.png", "/attachment/a1");
        let out = map.apply("![x](img/pic.png)\n![y](img/pic.png)");
        assert_eq!(out, "![x](/attachment/a1)\n![y](/attachment/a1)");
    }

    #[test]
    fn test_apply_longest_first() {
        let mut map = ReferenceMap::new();
        map.insert(knowledge_download_ref(4), "img/attachment_4");
        map.insert(knowledge_download_ref(42), "img/attachment_42");
        let body = "/open.file/download?fileNo=42 /open.file/download?fileNo=4";
        assert_eq!(map.apply(body), "img/attachment_42 img/attachment_4");
    }

    #[test]
    fn test_round_trip_with_inverse() {
        let mut map = ReferenceMap::new();
        map.insert("img/a.png", "/attachment/aaa");
        map.insert("img/b.jpg", "/attachment/bbb");
        let body = "# Title\n![a](img/a.png) text ![b](img/b.jpg)\n";

        let remote = map.apply(body);
        assert!(!remote.contains("img/"));
        assert_eq!(map.inverse().apply(&remote), body);
    }

    #[test]
    fn test_insert_ignores_empty_and_duplicates() {
        let mut map = ReferenceMap::new();
        assert!(!map.insert("", "x"));
        assert!(map.insert("a", "b"));
        assert!(!map.insert("a", "c"));
        assert_eq!(map.get("a"), Some("b"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_empty_map_leaves_body() {
        assert_eq!(ReferenceMap::new().apply("same"), "same");
    }

    #[test]
    fn test_local_reference() {
        assert_eq!(local_reference("img/", "pic.png"), "img/pic.png");
        assert_eq!(local_reference("img", "pic.png"), "img/pic.png");
        assert_eq!(local_reference("", "pic.png"), "pic.png");
    }

    #[test]
    fn test_scan_assets() {
        let temp = TempDir::new().unwrap();
        let md = temp.path().join("page.md");
        fs::write(&md, "body").unwrap();
        fs::create_dir(temp.path().join("img")).unwrap();
        fs::write(temp.path().join("img").join("pic.png"), b"png").unwrap();

        let assets = scan_assets(&md, "img/").unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].reference, "img/pic.png");
        assert_eq!(assets[0].content_type(), "image/png");
    }

    #[test]
    fn test_rewrite_imported_partial() {
        let temp = TempDir::new().unwrap();
        let md = temp.path().join("page.md");
        fs::write(&md, "![a](img/a.png) ![b](img/b.png)").unwrap();
        fs::create_dir(temp.path().join("img")).unwrap();
        fs::write(temp.path().join("img").join("a.png"), b"a").unwrap();
        fs::write(temp.path().join("img").join("b.png"), b"b").unwrap();

        let out = rewrite_imported(&md, "img", |asset| {
            Ok(if asset.reference.ends_with("a.png") {
                Some("/attachment/aaa".to_string())
            } else {
                None
            })
        })
        .unwrap();
        assert_eq!(out, "![a](/attachment/aaa) ![b](img/b.png)");
    }

    #[test]
    fn test_rewrite_imported_without_image_dir() {
        let temp = TempDir::new().unwrap();
        let md = temp.path().join("page.md");
        fs::write(&md, "![x](img/pic.png)").unwrap();

        let mut calls = 0;
        let out = rewrite_imported(&md, "img", |_| {
            calls += 1;
            Ok(None)
        })
        .unwrap();
        assert_eq!(calls, 0);
        assert_eq!(out, "![x](img/pic.png)");
    }

    #[test]
    fn test_apply_links_skips_unmapped_longer_link() {
        let mut map = ReferenceMap::new();
        map.insert(knowledge_download_ref(4), "img/attachment_4");
        let body = "![a](/open.file/download?fileNo=4) ![b](/open.file/download?fileNo=42)";
        assert_eq!(
            map.apply_links(body, RemoteLinks::KnowledgeDownload.pattern()),
            "![a](img/attachment_4) ![b](/open.file/download?fileNo=42)"
        );

        let mut map = ReferenceMap::new();
        map.insert(growi_attachment_ref("ab"), "img/attachment_ab");
        assert_eq!(
            map.apply_links("/attachment/ab /attachment/abc", RemoteLinks::GrowiAttachment.pattern()),
            "img/attachment_ab /attachment/abc"
        );
    }

    #[test]
    fn test_export_dir_store_and_finish() {
        let temp = TempDir::new().unwrap();
        let mut export = ExportDir::prepare(temp.path(), RemoteLinks::GrowiAttachment).unwrap();

        assert!(export.store("/attachment/abc", "abc", "attachment_abc", b"data").unwrap());
        assert!(!export.store("/attachment/fff", "fff", "attachment_fff", b"").unwrap());
        assert!(export.is_mapped("/attachment/abc"));
        assert!(!export.is_mapped("/attachment/fff"));

        let path = export
            .finish("page", "![a](/attachment/abc) ![b](/attachment/fff)")
            .unwrap();
        assert_eq!(path, temp.path().join("page.md"));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "![a](img/attachment_abc) ![b](/attachment/fff)"
        );
        assert!(temp.path().join("img").join("attachment_abc").exists());
        assert!(!temp.path().join("img").join("attachment_fff").exists());
    }

    #[test]
    fn test_export_dir_store_keeps_names_unique() {
        let temp = TempDir::new().unwrap();
        let mut export = ExportDir::prepare(temp.path(), RemoteLinks::KnowledgeDownload).unwrap();

        export.store(&knowledge_download_ref(1), "1", "image.png", b"ONE").unwrap();
        export.store(&knowledge_download_ref(2), "2", "image.png", b"TWO").unwrap();
        export.store(&knowledge_download_ref(3), "3", "dir/image.png", b"THREE").unwrap();

        let path = export
            .finish(
                "Q1/Q2 report",
                "/open.file/download?fileNo=1 /open.file/download?fileNo=2 /open.file/download?fileNo=3",
            )
            .unwrap();
        assert_eq!(path, temp.path().join("Q1_Q2 report.md"));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "img/image.png img/2_image.png img/3_image.png"
        );

        let images = temp.path().join(IMAGE_DIR);
        assert_eq!(fs::read(images.join("image.png")).unwrap(), b"ONE");
        assert_eq!(fs::read(images.join("2_image.png")).unwrap(), b"TWO");
        assert_eq!(fs::read(images.join("3_image.png")).unwrap(), b"THREE");
    }

    #[test]
    fn test_export_dir_prepare_is_idempotent() {
        let temp = TempDir::new().unwrap();
        ExportDir::prepare(temp.path(), RemoteLinks::GrowiAttachment).unwrap();
        ExportDir::prepare(temp.path(), RemoteLinks::GrowiAttachment).unwrap();
        assert!(temp.path().join(IMAGE_DIR).is_dir());
    }
}
