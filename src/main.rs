// ABOUTME: CLI entrypoint for wikiport command
// ABOUTME: Handles logging setup, error exit codes and per-service dispatch

use clap::Parser;
use serde::Serialize;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use wikiport::{
    cli::{growi_grant, knowledge_access, parse_page_id, Cli, Commands},
    config::{load_settings, resolve_connection, ServiceKind},
    model::AuthMode,
    Error, GrowiClient, KnowledgeClient, MarkdownService, Result,
};

fn main() {
    init_tracing();

    if let Err(e) = run() {
        eprintln!("wikiport: [E{}] {}", e.exit_code(), e);
        std::process::exit(e.exit_code());
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(cli.config.as_deref())?;
    let connection = resolve_connection(cli.service, &settings, &cli.connection_overrides())?;

    match cli.service {
        ServiceKind::Growi => run_growi(&GrowiClient::new(connection)?, cli.command),
        ServiceKind::Knowledge => run_knowledge(&KnowledgeClient::new(connection)?, cli.command),
    }
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn export<S>(service: &S, target: &S::ExportTarget, out: &Path) -> Result<()>
where
    S: MarkdownService,
    S::Exported: Serialize,
{
    emit(&service.download_markdown_page(target, out)?)
}

fn import<S>(
    service: &S,
    target: &S::ImportTarget,
    markdown: &Path,
    images: &str,
    access: &S::Access,
) -> Result<()>
where
    S: MarkdownService,
    S::Imported: Serialize,
{
    let page = service
        .create_markdown_page(target, markdown, images, access)?
        .map_err(Error::from)?;
    emit(&page)
}

fn run_growi(growi: &GrowiClient, command: Commands) -> Result<()> {
    match command {
        Commands::Get { page, session } => {
            let auth = if session { AuthMode::Session } else { AuthMode::Token };
            emit(&growi.get_page(&page, auth)?)
        }
        Commands::Export { page, out } => export(growi, page.as_str(), &out),
        Commands::Import {
            page,
            markdown,
            images,
            grant,
            group,
            ..
        } => {
            let grant = growi_grant(grant, group)?;
            import(growi, page.as_str(), &markdown, &images, &grant)
        }
        Commands::Delete {
            page,
            no_recursive,
            complete,
        } => {
            let removal = growi
                .delete_page(&page, !no_recursive, complete, AuthMode::Session)?
                .map_err(Error::from)?;
            emit(&removal)
        }
        Commands::Pages { path, .. } => emit(&growi.list_pages(&path)?),
        Commands::Users => emit(&growi.list_users()?),
        Commands::Groups => emit(&growi.list_groups(AuthMode::Session)?),
    }
}

fn run_knowledge(knowledge: &KnowledgeClient, command: Commands) -> Result<()> {
    match command {
        Commands::Get { page, .. } => emit(&knowledge.get_page(parse_page_id(&page)?)?),
        Commands::Export { page, out } => export(knowledge, &parse_page_id(&page)?, &out),
        Commands::Import {
            page,
            markdown,
            images,
            grant,
            viewer_groups,
            viewer_users,
            ..
        } => {
            let access = knowledge_access(grant, viewer_groups, viewer_users)?;
            import(knowledge, page.as_str(), &markdown, &images, &access)
        }
        Commands::Delete { page, .. } => emit(&knowledge.delete_page(parse_page_id(&page)?)?),
        Commands::Pages { offset, .. } => emit(&knowledge.list_pages(offset)?),
        Commands::Users => emit(&knowledge.list_users()?),
        Commands::Groups => emit(&knowledge.list_groups()?),
    }
}
