// ABOUTME: Capability shared by the GROWI and Knowledge clients
// ABOUTME: Markdown import/export over service-specific identities and access settings

use crate::{Outcome, Result};
use std::path::Path;

/// Markdown round-trip of a page together with its embedded assets.
///
/// Page identities, access settings and returned records differ per service,
/// so each is an associated type rather than a common model.
pub trait MarkdownService {
    /// Identity a new page is created under (GROWI path, Knowledge title).
    type ImportTarget: ?Sized;
    /// Identity of an existing page (GROWI path, Knowledge id).
    type ExportTarget: ?Sized;
    type Access;
    type Imported;
    type Exported;

    /// Creates a page from `markdown`, uploading files under `image_dir`
    /// (relative to the Markdown file) and rewriting references to them.
    fn create_markdown_page(
        &self,
        target: &Self::ImportTarget,
        markdown: &Path,
        image_dir: &str,
        access: &Self::Access,
    ) -> Result<Outcome<Self::Imported>>;

    /// Writes the page body and its downloadable attachments under
    /// `target_dir`, returning the page as fetched.
    fn download_markdown_page(
        &self,
        target: &Self::ExportTarget,
        target_dir: &Path,
    ) -> Result<Self::Exported>;
}
