//! Export strategy dispatch
//!
//! Every file-like item is written by exactly one [`Exporter`]:
//! - [`Exporter::Default`] turns one remote item into one local file, through
//!   the export call (or the media download for [`ExportFormat::Native`]).
//! - [`Exporter::Spreadsheet`] and [`Exporter::Presentation`] split a
//!   composite document into one file per sheet or slide, inside a directory
//!   named after the item. They are only chosen for primitive formats, which
//!   cannot hold more than one sub-part per file.
//!
//! All exporters share the fallback protocol: when the primary call fails at
//! the transport level, the output is rewound and the same content is fetched
//! once more through a time-limited export link (or the item's direct binary
//! URL for media downloads). A second failure is final.

mod composite;
mod default;
mod observed;

pub use observed::{ObservedFile, TransferObserver, cancelled_error};

use crate::error::{Error, ExportError, Result};
use crate::format::{ExportFormat, NativeKind};
use crate::naming::NameRegistry;
use crate::rate_limiter::RateLimiter;
use crate::remote::{ExportRequest, LinkFetcher, RemoteClient};
use crate::tree::RemoteItem;
use std::path::PathBuf;

/// Export strategy for one item
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exporter {
    /// One item, one file
    Default,
    /// One file per sheet
    Spreadsheet,
    /// One file per slide
    Presentation,
}

impl Exporter {
    /// Pick the exporter for a content type and output format
    ///
    /// Non-primitive formats always use [`Exporter::Default`]. Primitive
    /// formats use the composite exporter of the content type when there is
    /// one.
    pub fn select(content_type: &str, format: ExportFormat) -> Self {
        if !format.is_primitive() {
            return Exporter::Default;
        }
        match NativeKind::from_content_type(content_type) {
            Some(NativeKind::Spreadsheet) => Exporter::Spreadsheet,
            Some(NativeKind::Presentation) => Exporter::Presentation,
            _ => Exporter::Default,
        }
    }

    /// Whether the output is a directory of sub-part files
    pub fn produces_directory(&self) -> bool {
        !matches!(self, Exporter::Default)
    }

    fn part_label(&self) -> &'static str {
        match self {
            Exporter::Default => "Part",
            Exporter::Spreadsheet => "Sheet",
            Exporter::Presentation => "Slide",
        }
    }

    /// Export `item` as `format` into `destination`; returns bytes written
    pub async fn export(
        &self,
        ctx: &mut ExportContext<'_>,
        item: &RemoteItem,
        format: ExportFormat,
        destination: &mut Destination<'_>,
    ) -> Result<u64> {
        ctx.observer.on_phase("preparing");
        match (self, destination) {
            (Exporter::Default, Destination::File(sink)) => {
                default::export_file(ctx, item, format, sink).await
            }
            (Exporter::Spreadsheet | Exporter::Presentation, Destination::Directory(dir)) => {
                composite::export_parts(ctx, item, format, self.part_label(), dir.as_path()).await
            }
            (exporter, _) => Err(Error::Other(format!(
                "{:?} exporter cannot write to this destination",
                exporter
            ))),
        }
    }
}

/// Where an exporter writes
pub enum Destination<'o> {
    /// A single freshly created file
    File(ObservedFile<'o>),
    /// A freshly created directory for sub-part files
    Directory(PathBuf),
}

/// Collaborators an export runs with
pub struct ExportContext<'a> {
    /// Client checked out for this transfer
    pub client: &'a mut dyn RemoteClient,
    /// Bearer fetcher for export links and binary URLs
    pub fetcher: &'a dyn LinkFetcher,
    /// Limiter guarding the fallback path
    pub limiter: &'a RateLimiter,
    /// Name registry for sub-part files
    pub names: &'a NameRegistry,
    /// Progress sink for this transfer
    pub observer: &'a dyn TransferObserver,
}

/// Export call with the export-link fallback
async fn export_with_link_fallback(
    ctx: &mut ExportContext<'_>,
    request: &ExportRequest<'_>,
    sink: &mut ObservedFile<'_>,
) -> Result<u64> {
    ctx.observer.on_phase("exporting");
    let primary = ctx.client.export(request, sink).await.map_err(Error::from);

    match primary {
        Ok(written) => Ok(written),
        Err(e) if e.warrants_fallback() && !ctx.observer.is_cancelled() => {
            tracing::warn!(
                item_id = %request.item_id,
                mime_type = request.mime_type,
                error = %e,
                "Export failed, retrying through export link"
            );
            sink.rewind().await?;
            via_export_link(ctx, request, sink)
                .await
                .map_err(|fallback| fallback_failed(&e, &fallback))
        }
        Err(e) => Err(e),
    }
}

async fn via_export_link(
    ctx: &mut ExportContext<'_>,
    request: &ExportRequest<'_>,
    sink: &mut ObservedFile<'_>,
) -> Result<u64> {
    ctx.observer.on_phase("fetching export link");
    ctx.limiter.acquire().await;
    let url = ctx
        .client
        .export_link(request)
        .await?
        .ok_or_else(|| ExportError::NoExportLink {
            id: request.item_id.to_string(),
            mime_type: request.mime_type.to_string(),
        })?;

    fetch_authenticated(ctx, &url, sink).await
}

/// Bearer GET of `url` into `sink`, rate limited
async fn fetch_authenticated(
    ctx: &mut ExportContext<'_>,
    url: &str,
    sink: &mut ObservedFile<'_>,
) -> Result<u64> {
    let token = ctx.client.access_token().await?;
    ctx.limiter.acquire().await;
    ctx.observer.on_phase("downloading");
    ctx.fetcher.fetch(url, &token, sink).await
}

fn fallback_failed(primary: &Error, fallback: &Error) -> Error {
    Error::Export(ExportError::FallbackFailed {
        primary: primary.to_string(),
        fallback: fallback.to_string(),
    })
}
