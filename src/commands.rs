use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tokio::io::AsyncReadExt as _;

use crate::app::model::{ImportOptions, JobStatus};
use crate::app::service::ImportService;
use crate::catalog::{CatalogStore, LocalFsCatalogStore};
use crate::cli::{ExtractArgs, ImportArgs, NormalizeArgs, ResolveArgs, SeriesArgs};
use crate::config::{ImportConfig, ResolverConfig};
use crate::resolver::{MetadataResolver, ResolveOptions};

pub fn normalize(args: NormalizeArgs) -> anyhow::Result<()> {
    let isbn = crate::isbn::normalize(&args.isbn)?;
    println!("{isbn}");
    Ok(())
}

pub async fn extract(args: ExtractArgs) -> anyhow::Result<()> {
    let text = read_input(&args.input).await?;
    let isbns = crate::batch::extract_isbns(&text);
    tracing::info!(count = isbns.len(), "extracted isbns");
    for isbn in isbns {
        println!("{isbn}");
    }
    Ok(())
}

pub async fn resolve(args: ResolveArgs) -> anyhow::Result<()> {
    let config = ResolverConfig::from_env().context("load resolver config")?;
    let resolver = MetadataResolver::from_config(&config)?;
    let isbn = crate::isbn::normalize(&args.isbn)?;
    let record = resolver
        .resolve(
            &isbn,
            ResolveOptions {
                download_cover: args.download_cover,
            },
        )
        .await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&record).context("serialize record")?
    );
    Ok(())
}

pub async fn import(args: ImportArgs) -> anyhow::Result<()> {
    let text = read_input(&args.input).await?;
    let service = local_service(&args.data_dir)?;

    let started = service
        .start_import(
            &args.owner,
            &text,
            ImportOptions {
                download_covers: args.download_covers,
            },
        )
        .await?;
    tracing::info!(job_id = %started.job_id, total = started.total, "import started");

    let job = service
        .wait_for(
            &args.owner,
            &started.job_id,
            Duration::from_millis(args.poll_ms.max(10)),
            |job| {
                tracing::info!(
                    processed = job.progress.processed,
                    total = job.progress.total,
                    failed = job.progress.failed,
                    "import progress"
                );
            },
        )
        .await?;
    service.cleanup(&args.owner, &started.job_id).await;

    println!(
        "{}",
        serde_json::to_string_pretty(&job).context("serialize job")?
    );
    if job.status == JobStatus::Failed {
        anyhow::bail!("import job {} failed", job.job_id);
    }
    Ok(())
}

pub async fn series(args: SeriesArgs) -> anyhow::Result<()> {
    let store = LocalFsCatalogStore::new(&args.data_dir);
    let entries = store.list(&args.owner).await?;
    let groups = crate::series::group_by_series(&entries);
    for group in &groups {
        tracing::debug!(
            series = %group.series_name,
            summary = %crate::series::missing_volumes_summary(group),
            "series"
        );
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&groups).context("serialize series")?
    );
    Ok(())
}

fn local_service(data_dir: &std::path::Path) -> anyhow::Result<ImportService> {
    let resolver_config = ResolverConfig::from_env().context("load resolver config")?;
    let import_config = ImportConfig::from_env().context("load import config")?;
    let resolver = MetadataResolver::from_config(&resolver_config)?;
    let catalog: Arc<dyn CatalogStore> = Arc::new(LocalFsCatalogStore::new(data_dir));
    Ok(ImportService::new(catalog, Arc::new(resolver), import_config))
}

async fn read_input(input: &str) -> anyhow::Result<String> {
    if input == "-" {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context("read stdin")?;
        return Ok(text);
    }
    tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("read input: {input}"))
}
