//! Composite documents: one file per sub-part.

use super::{ExportContext, ObservedFile, cancelled_error, export_with_link_fallback};
use crate::error::{ExportError, Result};
use crate::format::ExportFormat;
use crate::naming::{claim_and_create_file, sanitize_filename};
use crate::remote::{ExportRequest, SubPart};
use crate::tree::RemoteItem;
use std::path::Path;

pub(super) async fn export_parts(
    ctx: &mut ExportContext<'_>,
    item: &RemoteItem,
    format: ExportFormat,
    label: &str,
    dir: &Path,
) -> Result<u64> {
    let parts = ctx.client.sub_parts(&item.id, &item.content_type).await?;
    let count = parts.len();
    tracing::debug!(item_id = %item.id, parts = count, "Exporting sub-parts");

    let mut total = 0u64;
    for (i, part) in parts.iter().enumerate() {
        if ctx.observer.is_cancelled() {
            return Err(cancelled_error().into());
        }
        ctx.observer.on_fraction(i as f64 / count as f64);

        total += export_part(ctx, item, format, label, dir, part)
            .await
            .map_err(|e| ExportError::SubPart {
                index: part.index,
                reason: e.to_string(),
            })?;

        ctx.observer.on_fraction((i + 1) as f64 / count as f64);
    }

    Ok(total)
}

async fn export_part(
    ctx: &mut ExportContext<'_>,
    item: &RemoteItem,
    format: ExportFormat,
    label: &str,
    dir: &Path,
    part: &SubPart,
) -> Result<u64> {
    let base = sanitize_filename(&part_name(label, part));
    let (path, file) = claim_and_create_file(ctx.names, dir, &base, format.extension()).await?;
    let mut sink = ObservedFile::new(file, ctx.observer);

    let request = ExportRequest {
        item_id: &item.id,
        mime_type: format.mime_type(),
        part: Some(part),
    };
    export_with_link_fallback(ctx, &request, &mut sink).await?;

    let written = sink.finish().await?;
    tracing::debug!(path = %path.display(), bytes = written, "Sub-part written");
    Ok(written)
}

/// Title of the sub-part, or `<label> NN` when it has none
fn part_name(label: &str, part: &SubPart) -> String {
    match part.title.as_deref().map(str::trim) {
        Some(title) if !title.is_empty() => title.to_string(),
        _ => format!("{} {:02}", label, part.index + 1),
    }
}
