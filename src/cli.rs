// ABOUTME: Command-line interface definitions using clap
// ABOUTME: Defines subcommands, connection flags and access-setting conversion

use crate::config::{ConnectionSettings, ServiceKind};
use crate::model::{Access, Grant, Visibility};
use crate::{Error, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "wikiport")]
#[command(about = "Move Markdown pages and their images in and out of GROWI and Knowledge", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Service to talk to
    #[arg(long, global = true, value_enum, default_value = "growi")]
    pub service: ServiceKind,

    /// YAML settings file with per-service connections
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Host (and port) of the service
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// URL scheme
    #[arg(long, global = true, value_parser = ["http", "https"])]
    pub scheme: Option<String>,

    /// API token (overrides settings/env)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Session cookie for routes that need a logged-in browser session
    #[arg(long, global = true)]
    pub cookie: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,
}

impl Cli {
    pub fn connection_overrides(&self) -> ConnectionSettings {
        ConnectionSettings {
            host: self.host.clone(),
            scheme: self.scheme.clone(),
            token: self.token.clone(),
            cookie: self.cookie.clone(),
            verify_tls: self.insecure.then_some(false),
            timeout_secs: self.timeout_secs,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show a page (GROWI path or Knowledge id)
    Get {
        page: String,
        /// Authenticate with the session cookie (GROWI)
        #[arg(long)]
        session: bool,
    },

    /// Export a page as Markdown plus an img/ directory
    Export {
        page: String,
        /// Target directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Create a page from a Markdown file, uploading its images
    Import {
        /// GROWI path or Knowledge title of the new page
        page: String,
        markdown: PathBuf,
        /// Image directory, relative to the Markdown file
        #[arg(long, default_value = "img/")]
        images: String,
        #[arg(long, value_enum, default_value = "private")]
        grant: GrantArg,
        /// Group name for --grant group (GROWI)
        #[arg(long)]
        group: Option<String>,
        /// Viewer group id (Knowledge, repeatable)
        #[arg(long = "viewer-group")]
        viewer_groups: Vec<u64>,
        /// Viewer user id (Knowledge, repeatable)
        #[arg(long = "viewer-user")]
        viewer_users: Vec<u64>,
    },

    /// Delete a page (GROWI needs --cookie)
    Delete {
        page: String,
        /// Keep child pages (GROWI)
        #[arg(long)]
        no_recursive: bool,
        /// Delete permanently instead of moving to trash (GROWI)
        #[arg(long)]
        complete: bool,
    },

    /// List pages
    Pages {
        /// Parent path (GROWI)
        #[arg(long, default_value = "/")]
        path: String,
        /// Offset (Knowledge)
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },

    /// List users
    Users,

    /// List groups
    Groups,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GrantArg {
    Public,
    Link,
    Private,
    Group,
    Protected,
}

pub fn growi_grant(grant: GrantArg, group: Option<String>) -> Result<Grant> {
    match grant {
        GrantArg::Public => Ok(Grant::Public),
        GrantArg::Link => Ok(Grant::Link),
        GrantArg::Private => Ok(Grant::Private),
        GrantArg::Group => group
            .filter(|g| !g.is_empty())
            .map(Grant::Group)
            .ok_or_else(|| Error::Config("--grant group requires --group <name>".into())),
        GrantArg::Protected => Err(Error::Config("GROWI has no protected grant".into())),
    }
}

pub fn knowledge_access(grant: GrantArg, groups: Vec<u64>, users: Vec<u64>) -> Result<Access> {
    let visibility = match grant {
        GrantArg::Public => Visibility::Public,
        GrantArg::Private => Visibility::Private,
        GrantArg::Protected => Visibility::Protected,
        GrantArg::Link | GrantArg::Group => {
            return Err(Error::Config(format!(
                "Knowledge has no {:?} visibility",
                grant
            )))
        }
    };

    Ok(Access {
        visibility,
        groups,
        users,
    })
}

pub fn parse_page_id(page: &str) -> Result<u64> {
    page.parse()
        .map_err(|_| Error::Config(format!("Knowledge page ids are numeric, got {:?}", page)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_growi_grant_group_needs_name() {
        assert_eq!(
            growi_grant(GrantArg::Group, Some("dev".into())).unwrap(),
            Grant::Group("dev".into())
        );
        assert!(growi_grant(GrantArg::Group, None).is_err());
        assert!(growi_grant(GrantArg::Protected, None).is_err());
    }

    #[test]
    fn test_knowledge_access() {
        let access = knowledge_access(GrantArg::Protected, vec![2], vec![]).unwrap();
        assert_eq!(access.visibility, Visibility::Protected);
        assert_eq!(access.groups, vec![2]);
        assert!(knowledge_access(GrantArg::Link, vec![], vec![]).is_err());
    }

    #[test]
    fn test_parse_page_id() {
        assert_eq!(parse_page_id("42").unwrap(), 42);
        assert!(parse_page_id("/growi/path").is_err());
    }

    #[test]
    fn test_cli_parses_import() {
        let cli = Cli::parse_from([
            "wikiport",
            "--service",
            "knowledge",
            "--insecure",
            "import",
            "Title",
            "page.md",
            "--grant",
            "protected",
            "--viewer-group",
            "3",
        ]);
        assert_eq!(cli.service, ServiceKind::Knowledge);
        assert_eq!(cli.connection_overrides().verify_tls, Some(false));
        match cli.command {
            Commands::Import {
                images,
                grant,
                viewer_groups,
                ..
            } => {
                assert_eq!(images, "img/");
                assert_eq!(grant, GrantArg::Protected);
                assert_eq!(viewer_groups, vec![3]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
